//! The characteristic aggregation pipeline and its client-facing views.

use std::collections::BTreeMap;

use anyhow::anyhow;
use emberproto::msgsvr::{AccountStats, MsgSvr};
use emberproto::typ::{characteristic, item_pos, Characteristic, Effect};

use crate::error::SessionResult;
use crate::model::EffectOperator;
use crate::session::Session;

impl Session {
    /// Aggregate every characteristic from base values, worn equipment,
    /// mount effects, and item-set bonuses, then derive the dependent stats.
    pub async fn characteristics(&self) -> SessionResult<BTreeMap<i32, Characteristic>> {
        let character = self.server.repo.character(self.character_id).await?;

        let mut items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;
        items.retain(|_, v| item_pos::is_worn(v.position));

        let mut characteristics = BTreeMap::new();

        let level = character.level();
        for &id in characteristic::ALL {
            let base = match id {
                characteristic::AP => {
                    if level >= 100 {
                        7
                    } else {
                        6
                    }
                }
                characteristic::MP => 3,
                characteristic::MAX_SUMMONED_CREATURES_BOOST => 1,
                characteristic::PROSPECTING => {
                    if character.class_id == emberproto::typ::class::ENUTROF {
                        120
                    } else {
                        100
                    }
                }
                characteristic::VITALITY => character.stats.vitality,
                characteristic::WISDOM => character.stats.wisdom,
                characteristic::STRENGTH => character.stats.strength,
                characteristic::INTELLIGENCE => character.stats.intelligence,
                characteristic::CHANCE => character.stats.chance,
                characteristic::AGILITY => character.stats.agility,
                characteristic::MAX_WEIGHT => 1000 + level * 5,
                _ => 0,
            };
            characteristics.insert(
                id,
                Characteristic {
                    id,
                    base,
                    ..Default::default()
                },
            );
        }

        for item in items.values() {
            self.apply_effects(&mut characteristics, &item.item.effects)?;
        }

        if character.mounting {
            let mount = self.server.repo.mount(character.mount_id).await?;
            let mount_template = self
                .server
                .static_cache
                .mounts
                .get(&mount.template_id)
                .ok_or_else(|| anyhow!("mount template not found"))?;
            self.apply_effects(&mut characteristics, &mount_template.effects(mount.level()))?;
        }

        let mut item_set_counts: BTreeMap<i32, usize> = BTreeMap::new();
        for item in items.values() {
            let t = self
                .server
                .static_cache
                .items
                .get(&item.item.template_id)
                .ok_or_else(|| anyhow!("item template not found"))?;
            if t.item_set_id == 0 {
                continue;
            }
            *item_set_counts.entry(t.item_set_id).or_default() += 1;
        }

        for (id, count) in item_set_counts {
            let t = self
                .server
                .static_cache
                .item_sets
                .get(&id)
                .ok_or_else(|| anyhow!("item set template not found"))?;
            let effects = t
                .bonus
                .get(count - 1)
                .ok_or_else(|| anyhow!("invalid item set bonus index"))?;
            self.apply_effects(&mut characteristics, effects)?;
        }

        spill(
            &mut characteristics,
            characteristic::INITIATIVE,
            &[
                characteristic::STRENGTH,
                characteristic::INTELLIGENCE,
                characteristic::CHANCE,
                characteristic::AGILITY,
            ],
            1,
        );
        spill(
            &mut characteristics,
            characteristic::PROSPECTING,
            &[characteristic::CHANCE],
            10,
        );
        spill(
            &mut characteristics,
            characteristic::DODGE_AP,
            &[characteristic::WISDOM],
            4,
        );
        spill(
            &mut characteristics,
            characteristic::DODGE_MP,
            &[characteristic::WISDOM],
            4,
        );

        let strength_total = characteristics
            .get(&characteristic::STRENGTH)
            .map(Characteristic::total)
            .unwrap_or(0);
        if let Some(max_weight) = characteristics.get_mut(&characteristic::MAX_WEIGHT) {
            max_weight.base += strength_total * 5;
        }

        Ok(characteristics)
    }

    fn apply_effects(
        &self,
        characteristics: &mut BTreeMap<i32, Characteristic>,
        effects: &[Effect],
    ) -> SessionResult<()> {
        for effect in effects {
            let t = self
                .server
                .static_cache
                .effects
                .get(&effect.id)
                .ok_or_else(|| anyhow!("effect template not found: {}", effect.id))?;

            if t.characteristic_id <= 0 {
                continue;
            }

            let Some(v) = characteristics.get_mut(&t.characteristic_id) else {
                continue;
            };

            match t.operator {
                EffectOperator::Add => v.equipment += effect.dice_num,
                EffectOperator::Sub => v.equipment -= effect.dice_num,
            }
        }
        Ok(())
    }

    pub async fn proto_stats(&self) -> SessionResult<MsgSvr> {
        let character = self.server.repo.character(self.character_id).await?;
        let characteristics = self.characteristics().await?;

        let initiative = characteristics
            .get(&characteristic::INITIATIVE)
            .map(Characteristic::total)
            .unwrap_or(0);
        let prospecting = characteristics
            .get(&characteristic::PROSPECTING)
            .map(Characteristic::total)
            .unwrap_or(0);
        let vitality = characteristics
            .get(&characteristic::VITALITY)
            .map(Characteristic::total)
            .unwrap_or(0);

        let lp_max = 50 + character.level() * 5 + vitality;

        Ok(MsgSvr::AccountStats(Box::new(AccountStats {
            xp: character.xp,
            xp_low: character.xp_low(),
            xp_high: character.xp_high(),
            kamas: character.kamas,
            bonus_points: character.bonus_points,
            bonus_points_spell: character.bonus_points_spell,
            alignment: character.alignment,
            fake_alignment: character.alignment,
            alignment_level: 0,
            grade: character.grade(),
            honor: character.honor,
            disgrace: character.disgrace,
            alignment_enabled: character.alignment_enabled,
            lp: lp_max,
            lp_max,
            energy: 10_000,
            energy_max: 10_000,
            initiative,
            prospecting,
            characteristics,
        })))
    }

    pub async fn send_stats(&mut self) -> SessionResult<()> {
        let stats = self.proto_stats().await?;
        self.send(stats).await;
        Ok(())
    }

    pub async fn proto_weight(&self) -> SessionResult<MsgSvr> {
        let characteristics = self.characteristics().await?;

        let max_weight = characteristics
            .get(&characteristic::MAX_WEIGHT)
            .copied()
            .ok_or_else(|| anyhow!("max weight characteristic not found"))?;

        let items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;

        let mut current = 0;
        for item in items.values() {
            let t = self
                .server
                .static_cache
                .items
                .get(&item.item.template_id)
                .ok_or_else(|| anyhow!("item template not found"))?;
            current += t.weight * item.item.quantity;
        }

        Ok(MsgSvr::ItemsWeight {
            current,
            max: max_weight.total().max(0),
        })
    }

    pub async fn send_weight(&mut self) -> SessionResult<()> {
        let weight = self.proto_weight().await?;
        self.send(weight).await;
        Ok(())
    }
}

/// Add `sources`' buckets into `target`, each divided by `div`.
fn spill(
    characteristics: &mut BTreeMap<i32, Characteristic>,
    target: i32,
    sources: &[i32],
    div: i32,
) {
    let mut base = 0;
    let mut equipment = 0;
    let mut feat = 0;
    let mut boost = 0;
    for id in sources {
        if let Some(v) = characteristics.get(id) {
            base += v.base / div;
            equipment += v.equipment / div;
            feat += v.feat / div;
            boost += v.boost / div;
        }
    }
    if let Some(v) = characteristics.get_mut(&target) {
        v.base += base;
        v.equipment += equipment;
        v.feat += feat;
        v.boost += boost;
    }
}
