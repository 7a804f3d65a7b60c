//! Level, characteristic-point, and spell progression, plus riding state.

use anyhow::anyhow;
use emberproto::msgsvr::MsgSvr;
use emberproto::typ::{characteristic, item_pos, InfosChat, InfosMessageEntry, SpellEntry};

use crate::error::{SessionError, SessionResult};
use crate::model::{CharacterSpell, ClassBoostCost, CHARACTER_XP_FLOORS, EFFECT_MOUNT_ID};
use crate::session::Session;

/// Walk boost purchases one point of cost-tier at a time until at least
/// `add` bonus has been credited. Returns total cost and credited bonus.
pub fn calc_boost(mut current: i32, add: i32, tiers: &[ClassBoostCost]) -> (i32, i32) {
    let mut cost = 0;
    let mut bonus = 0;
    while bonus < add {
        let mut step_cost = 1;
        let mut step_bonus = 1;
        for tier in tiers {
            if tier.quantity > current {
                break;
            }
            step_cost = tier.cost;
            step_bonus = tier.bonus;
        }
        cost += step_cost;
        bonus += step_bonus;
        current += step_bonus;
    }
    (cost, bonus)
}

impl Session {
    pub async fn set_level(&mut self, level: i32) -> SessionResult<()> {
        if level < 1 || level as usize > CHARACTER_XP_FLOORS.len() + 1 {
            return Err(SessionError::Other(anyhow!("invalid level")));
        }

        let mut character = self.server.repo.character(self.character_id).await?;
        let original_level = character.level();

        character.xp = if level >= 2 {
            CHARACTER_XP_FLOORS[level as usize - 2]
        } else {
            0
        };
        self.server.repo.update_character(character.clone()).await?;

        if level >= original_level {
            character.bonus_points += (level - original_level) * 5;

            let class = self
                .server
                .static_cache
                .classes
                .get(&character.class_id)
                .ok_or_else(|| anyhow!("class not found"))?;

            for &id in &class.spells {
                let t = self
                    .server
                    .static_cache
                    .spells
                    .get(&id)
                    .ok_or_else(|| anyhow!("spell not found"))?;
                if let Some(first) = t.levels.first() {
                    if first.min_player_level <= level
                        && !character.spells.iter().any(|v| v.id == id)
                    {
                        character.spells.push(CharacterSpell {
                            id,
                            level: first.grade,
                            position: 0,
                        });
                    }
                }
            }
        } else {
            let max_bonus_points = (level - 1) * 5;
            let used_bonus_points = (original_level - 1) * 5 - character.bonus_points;

            if used_bonus_points > max_bonus_points {
                self.reset_characteristics().await?;
            } else {
                character.bonus_points = max_bonus_points - used_bonus_points;
                self.server.repo.update_character(character.clone()).await?;
            }

            character = self.server.repo.character(self.character_id).await?;

            let mut spells = Vec::new();
            for spell in &character.spells {
                let t = self
                    .server
                    .static_cache
                    .spells
                    .get(&spell.id)
                    .ok_or_else(|| anyhow!("spell not found"))?;
                if let Some(first) = t.levels.first() {
                    if first.min_player_level <= level {
                        spells.push(*spell);
                    }
                }
            }
            character.spells = spells;
        }

        for spell in &mut character.spells {
            let t = self
                .server
                .static_cache
                .spells
                .get(&spell.id)
                .ok_or_else(|| anyhow!("spell not found"))?;
            let mut max_spell_level = 0;
            for (i, spell_level) in t.levels.iter().enumerate() {
                if spell_level.min_player_level <= level {
                    max_spell_level = i as i32 + 1;
                } else {
                    break;
                }
            }
            spell.level = max_spell_level;
        }

        self.server.repo.update_character(character.clone()).await?;

        self.send(MsgSvr::AccountNewLevel { level }).await;

        self.send_spells_list(&character.spells).await;

        self.send_stats().await?;

        self.check_conditions().await?;

        Ok(())
    }

    pub async fn reset_characteristics(&mut self) -> SessionResult<()> {
        let mut character = self.server.repo.character(self.character_id).await?;

        character.stats.vitality = 101;
        character.stats.wisdom = 101;
        character.stats.strength = 101;
        character.stats.intelligence = 101;
        character.stats.chance = 101;
        character.stats.agility = 101;

        character.bonus_points = (character.level() - 1) * 5;

        self.server.repo.update_character(character).await?;

        self.send_weight().await?;
        self.send_stats().await?;
        self.check_conditions().await?;

        Ok(())
    }

    pub async fn forget_spell(&mut self, id: i32) -> SessionResult<()> {
        if id == -1 {
            self.send(MsgSvr::SpellsSpellForgetClose).await;
            return Ok(());
        }

        let mut character = self.server.repo.character(self.character_id).await?;

        let mut level = 0;
        let mut found = false;
        for spell in &mut character.spells {
            if spell.id != id {
                continue;
            }
            found = true;
            level = spell.level;
            spell.level = 1;
            break;
        }
        if !found {
            return Err(SessionError::Other(anyhow!("character doesn't know spell")));
        }

        self.server.repo.update_character(character).await?;

        self.send(MsgSvr::SpellsUpgradeSpellSuccess { id, level: 1 }).await;

        self.send_stats().await?;

        self.send_info_message(InfosMessageEntry::with_args(
            154,
            vec![level.to_string(), "0".to_string()],
        ))
        .await;

        Ok(())
    }

    pub async fn send_spells_list(&self, spells: &[CharacterSpell]) {
        self.send(MsgSvr::SpellsList {
            spells: spells
                .iter()
                .map(|v| SpellEntry {
                    id: v.id,
                    level: v.level,
                    position: v.position,
                })
                .collect(),
        })
        .await;
    }

    pub async fn handle_account_boost(&mut self, characteristic_id: i32) -> SessionResult<()> {
        let mut character = self.server.repo.character(self.character_id).await?;

        let class = self
            .server
            .static_cache
            .classes
            .get(&character.class_id)
            .ok_or_else(|| anyhow!("class not found"))?;

        let (current, tiers) = match characteristic_id {
            characteristic::VITALITY => {
                (character.stats.vitality, &class.boost_costs.vitality)
            }
            characteristic::WISDOM => (character.stats.wisdom, &class.boost_costs.wisdom),
            characteristic::STRENGTH => {
                (character.stats.strength, &class.boost_costs.strength)
            }
            characteristic::INTELLIGENCE => (
                character.stats.intelligence,
                &class.boost_costs.intelligence,
            ),
            characteristic::CHANCE => (character.stats.chance, &class.boost_costs.chance),
            characteristic::AGILITY => (character.stats.agility, &class.boost_costs.agility),
            _ => {
                return Err(SessionError::Other(anyhow!(
                    "characteristic id is invalid"
                )))
            }
        };

        let (cost, bonus) = calc_boost(current, 1, tiers);

        if character.bonus_points < cost {
            return Err(SessionError::Other(anyhow!(
                "bonus points are insufficient"
            )));
        }
        character.bonus_points -= cost;

        match characteristic_id {
            characteristic::VITALITY => character.stats.vitality += bonus,
            characteristic::WISDOM => character.stats.wisdom += bonus,
            characteristic::STRENGTH => character.stats.strength += bonus,
            characteristic::INTELLIGENCE => character.stats.intelligence += bonus,
            characteristic::CHANCE => character.stats.chance += bonus,
            characteristic::AGILITY => character.stats.agility += bonus,
            _ => {}
        }

        self.server.repo.update_character(character).await?;

        if characteristic_id == characteristic::STRENGTH {
            self.send_weight().await?;
        }

        self.send_stats().await?;

        self.check_conditions().await?;

        Ok(())
    }

    pub async fn handle_spells_boost(&mut self, id: i32) -> SessionResult<()> {
        let mut character = self.server.repo.character(self.character_id).await?;

        let mut level = 0;
        let mut found = false;
        let character_level = character.level();
        for spell in &mut character.spells {
            if spell.id != id {
                continue;
            }
            found = true;

            let t = self
                .server
                .static_cache
                .spells
                .get(&id)
                .ok_or_else(|| anyhow!("spell not found"))?;

            if spell.level as usize + 1 > t.levels.len() {
                return Err(SessionError::Other(anyhow!(
                    "wanted spell level doesn't exist"
                )));
            }

            if t.levels[spell.level as usize].min_player_level > character_level {
                self.send(MsgSvr::SpellsUpgradeSpellError).await;
                return Ok(());
            }

            spell.level += 1;
            level = spell.level;
            break;
        }
        if !found {
            return Err(SessionError::Other(anyhow!("character doesn't know spell")));
        }

        self.server.repo.update_character(character).await?;

        self.send(MsgSvr::SpellsUpgradeSpellSuccess { id, level }).await;

        self.send_stats().await?;

        Ok(())
    }

    pub async fn handle_spells_forget(&mut self, id: i32) -> SessionResult<()> {
        self.forget_spell(id).await
    }

    pub async fn handle_spells_move_to_used(
        &mut self,
        id: i32,
        position: i32,
    ) -> SessionResult<()> {
        if !(0..=28).contains(&position) {
            return Err(SessionError::Other(anyhow!("invalid position")));
        }

        let mut character = self.server.repo.character(self.character_id).await?;

        for spell in &mut character.spells {
            if spell.position == position {
                spell.position = 0;
                break;
            }
        }

        let mut found = false;
        for spell in &mut character.spells {
            if spell.id == id {
                found = true;
                spell.position = position;
                break;
            }
        }
        if !found {
            return Err(SessionError::Other(anyhow!("character doesn't know spell")));
        }

        self.server.repo.update_character(character).await?;

        self.send(MsgSvr::BasicsNothing).await;

        Ok(())
    }

    /// Mount or dismount, with the pre-checks and follow-up broadcasts.
    pub async fn mount_or_dismount(&mut self, mount: bool) -> SessionResult<()> {
        let mut character = self.server.repo.character(self.character_id).await?;

        if character.mounting == mount {
            return Ok(());
        }

        if mount && character.mount_id == 0 {
            self.send(MsgSvr::MountEquipError { reason: 'R' }).await;
            return Ok(());
        }

        if mount && character.level() < 60 {
            self.send(MsgSvr::MountEquipError { reason: 'R' }).await;
            return Ok(());
        }

        if mount {
            let items = self
                .server
                .repo
                .character_items_by_character_id(self.character_id)
                .await?;

            for v in items.values() {
                if v.position == item_pos::PET {
                    self.un_equip(v.id).await?;

                    self.send(MsgSvr::InfosMessage {
                        chat: InfosChat::Error,
                        messages: vec![InfosMessageEntry::new(88)],
                    })
                    .await;
                    break;
                }
            }
        }

        character.mounting = mount;

        self.server.repo.update_character(character.clone()).await?;

        self.send(MsgSvr::MountRidingState { riding: mount }).await;

        self.send_weight().await?;
        self.send_stats().await?;

        let sprite = self.server.character_sprite(&character, true).await?;
        self.server
            .send_to_map(
                character.game_map_id,
                MsgSvr::GameMovement {
                    sprites: vec![emberproto::typ::GameMovementSprite::Character(sprite)],
                },
            )
            .await?;

        self.check_conditions().await?;

        Ok(())
    }

    pub async fn handle_mount_request_data(
        &mut self,
        id: i32,
        validity_ms: i64,
    ) -> SessionResult<()> {
        let mount = match self.server.repo.mount(id).await {
            Ok(mount) => mount,
            Err(crate::repository::RepoError::NotFound) => {
                self.send(MsgSvr::InfosMessage {
                    chat: InfosChat::Error,
                    messages: vec![InfosMessageEntry::new(104)],
                })
                .await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mount_validity_ms = mount.validity.map(|t| t.timestamp_millis()).unwrap_or(0);
        if validity_ms != mount_validity_ms {
            return Err(SessionError::InvalidRequest);
        }

        let data = self.server.common_mount_data(&mount)?;
        self.send(MsgSvr::MountData { data }).await;

        Ok(())
    }

    pub async fn handle_mount_rename(&mut self, name: &str) -> SessionResult<()> {
        if name.is_empty() || name.len() > 16 || !name.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SessionError::InvalidRequest);
        }

        let character = self.server.repo.character(self.character_id).await?;

        if character.mount_id == 0 {
            return Err(SessionError::InvalidRequest);
        }

        let mut mount = self.server.repo.mount(character.mount_id).await?;
        mount.name = name.to_string();

        self.server.repo.update_mount(mount).await?;

        self.send(MsgSvr::MountName { name: name.to_string() }).await;

        Ok(())
    }

    pub async fn handle_mount_free(&mut self) -> SessionResult<()> {
        self.mount_or_dismount(false).await?;

        let mut character = self.server.repo.character(self.character_id).await?;

        let original_mount_id = character.mount_id;

        character.mount_id = 0;
        character.kamas += 1;
        self.server.repo.update_character(character).await?;

        self.server.repo.delete_mount(original_mount_id).await?;

        self.send(MsgSvr::MountUnequip).await;

        self.send_stats().await?;

        Ok(())
    }

    pub async fn handle_mount_ride(&mut self) -> SessionResult<()> {
        let character = self.server.repo.character(self.character_id).await?;
        self.mount_or_dismount(!character.mounting).await
    }
}

/// Effect id 995 payload of a certificate item, if present.
pub fn certificate_mount_id(effects: &[emberproto::typ::Effect]) -> Option<(i32, i64)> {
    effects
        .iter()
        .find(|e| e.id == EFFECT_MOUNT_ID)
        .map(|e| (e.dice_num, e.dice_side))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calc_boost_walks_cost_tiers() {
        let iop_strength = vec![
            ClassBoostCost { quantity: 0, cost: 1, bonus: 1 },
            ClassBoostCost { quantity: 100, cost: 2, bonus: 1 },
            ClassBoostCost { quantity: 200, cost: 3, bonus: 1 },
            ClassBoostCost { quantity: 300, cost: 4, bonus: 1 },
            ClassBoostCost { quantity: 400, cost: 5, bonus: 1 },
        ];
        let sacrier_vitality = vec![ClassBoostCost { quantity: 0, cost: 1, bonus: 2 }];
        let wisdom = vec![ClassBoostCost { quantity: 0, cost: 3, bonus: 1 }];

        assert_eq!(calc_boost(0, 1, &iop_strength), (1, 1));
        assert_eq!(calc_boost(100, 50, &iop_strength), (100, 50));
        assert_eq!(calc_boost(101, 99, &iop_strength), (198, 99));
        assert_eq!(calc_boost(101, 100, &iop_strength), (201, 100));
        assert_eq!(calc_boost(0, 1000, &sacrier_vitality), (500, 1000));
        assert_eq!(calc_boost(30, 100, &sacrier_vitality), (50, 100));
        assert_eq!(calc_boost(0, 100, &wisdom), (300, 100));
        assert_eq!(calc_boost(100, 100, &wisdom), (300, 100));
    }

    #[test]
    fn calc_boost_defaults_without_tiers() {
        assert_eq!(calc_boost(50, 3, &[]), (3, 3));
    }
}
