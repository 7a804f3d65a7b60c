//! The item engine: equip, unequip, moves, batching, destruction, and the
//! mount-certificate conversions that ride on the dragoturkey slot.

use std::collections::HashMap;

use anyhow::anyhow;
use emberproto::msgsvr::{MsgSvr, SelectedCharacterItem};
use emberproto::typ::{item_pos, item_type, Accessories, Effect, InfosChat, InfosMessageEntry};
use futures_util::future::BoxFuture;

use crate::error::{SessionError, SessionResult};
use crate::model::{
    certificate_id_by_mount_template_id, certificate_validity, CharacterItem, Item,
    EFFECT_MOUNT_ID,
};
use crate::session::Session;

/// The sprite-visible equipment of a character.
pub fn proto_accessories(items: &HashMap<i32, CharacterItem>) -> Accessories {
    let mut accessories = Accessories::default();
    for v in items.values() {
        match v.position {
            item_pos::WEAPON => accessories.weapon = v.item.template_id,
            item_pos::HAT => accessories.hat = v.item.template_id,
            item_pos::CLOAK => accessories.cloak = v.item.template_id,
            item_pos::PET => accessories.pet = v.item.template_id,
            item_pos::SHIELD => accessories.shield = v.item.template_id,
            _ => {}
        }
    }
    accessories
}

/// Two items join into one stack iff template and effects match exactly.
pub fn same_items(a: &Item, b: &Item) -> bool {
    a.template_id == b.template_id && a.effects == b.effects
}

/// Find an existing stack `item` would join among `others`.
pub fn item_batch(item: &Item, others: &HashMap<i32, Item>) -> Option<i32> {
    others
        .iter()
        .find(|(_, other)| same_items(item, other))
        .map(|(id, _)| *id)
}

fn proto_item(v: &CharacterItem) -> SelectedCharacterItem {
    SelectedCharacterItem {
        id: v.id,
        template_id: v.item.template_id,
        quantity: v.item.quantity,
        position: v.position,
        effects: v.item.effects.clone(),
    }
}

impl Session {
    pub async fn equip(&mut self, id: i32, position: i32) -> SessionResult<()> {
        if !item_pos::is_equipable(position) {
            return Err(SessionError::Other(anyhow!(
                "invalid desired position for item"
            )));
        }

        let char_items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;

        for v in char_items.values() {
            if v.position == position {
                self.un_equip(v.id).await?;
                break;
            }
        }

        let char_items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;

        let Some(item) = char_items.get(&id).cloned() else {
            return Err(SessionError::InvalidRequest);
        };

        let template = self
            .server
            .static_cache
            .items
            .get(&item.item.template_id)
            .cloned()
            .ok_or_else(|| anyhow!("item template not found"))?;

        let wrong_position = match template.item_type {
            item_type::AMULET => position != item_pos::AMULET,
            item_type::RING => {
                position != item_pos::RING_RIGHT && position != item_pos::RING_LEFT
            }
            item_type::BELT => position != item_pos::BELT,
            item_type::BOOTS => position != item_pos::BOOTS,
            item_type::HAT => position != item_pos::HAT,
            item_type::CLOAK | item_type::BACKPACK => position != item_pos::CLOAK,
            item_type::PET => position != item_pos::PET,
            item_type::DOFUS => {
                !(item_pos::DOFUS_1..=item_pos::DOFUS_6).contains(&position)
            }
            item_type::SHIELD => position != item_pos::SHIELD,
            item_type::CANDY => position != item_pos::BOOST_FOOD,
            item_type::MOUNT_CERTIFICATE => position != item_pos::DRAGOTURKEY,
            t if item_type::is_weapon(t) => position != item_pos::WEAPON,
            _ => return Err(SessionError::NotAllowed),
        };
        if wrong_position {
            return Err(SessionError::NotAllowed);
        }

        let mut character = self.server.repo.character(self.character_id).await?;

        if template.level > character.level() {
            self.send(MsgSvr::ItemsAddError { reason: 'L' }).await;
            return Ok(());
        }

        for v in char_items.values() {
            if !(item_pos::AMULET..=item_pos::SHIELD).contains(&v.position) {
                continue;
            }
            let t = self
                .server
                .static_cache
                .items
                .get(&v.item.template_id)
                .ok_or_else(|| anyhow!("item template not found"))?;
            if t.id == template.id
                && (template.item_set_id != 0 || template.item_type == item_type::DOFUS)
            {
                self.send(MsgSvr::ItemsAddError { reason: 'A' }).await;
                return Ok(());
            }
        }

        match position {
            item_pos::WEAPON if template.two_hands => {
                for v in char_items.values() {
                    if v.position == item_pos::SHIELD {
                        self.un_equip(v.id).await?;
                        self.send_info_message(InfosMessageEntry::new(79)).await;
                        break;
                    }
                }
            }
            item_pos::SHIELD => {
                for v in char_items.values() {
                    if v.position == item_pos::WEAPON {
                        let t = self
                            .server
                            .static_cache
                            .items
                            .get(&v.item.template_id)
                            .ok_or_else(|| anyhow!("item template not found"))?;
                        if t.two_hands {
                            self.un_equip(v.id).await?;
                            self.send_info_message(InfosMessageEntry::new(78)).await;
                        }
                        break;
                    }
                }
            }
            item_pos::PET => {
                if character.mounting {
                    self.mount_or_dismount(false).await?;
                }
            }
            _ => {}
        }

        if position == item_pos::DRAGOTURKEY {
            if character.mount_id != 0 {
                self.mount_or_dismount(false).await?;

                character = self.server.repo.character(self.character_id).await?;

                let mut mount = self.server.repo.mount(character.mount_id).await?;

                character.mount_id = 0;
                self.server.repo.update_character(character.clone()).await?;

                self.send(MsgSvr::MountUnequip).await;

                let certificate_template_id =
                    certificate_id_by_mount_template_id(mount.template_id)
                        .ok_or_else(|| anyhow!("mount certificate id not found"))?;

                let mount_template = self
                    .server
                    .static_cache
                    .mounts
                    .get(&mount.template_id)
                    .ok_or_else(|| anyhow!("mount template not found"))?;

                // The mount goes dormant inside the certificate.
                let validity = certificate_validity(chrono::Utc::now());
                mount.character_id = 0;
                mount.validity = Some(validity);
                self.server.repo.update_mount(mount.clone()).await?;

                let mut effects = mount_template.effects(mount.level());
                effects.push(Effect {
                    id: EFFECT_MOUNT_ID,
                    dice_num: mount.id,
                    dice_side: validity.timestamp_millis(),
                    param: String::new(),
                });

                let mut certificate = CharacterItem {
                    id: 0,
                    item: Item {
                        template_id: certificate_template_id,
                        quantity: 1,
                        effects,
                    },
                    position: item_pos::INVENTORY,
                    character_id: self.character_id,
                };

                let created = self
                    .server
                    .repo
                    .create_character_item(certificate.clone())
                    .await?;
                certificate.id = created;

                self.send(MsgSvr::ItemsAddSuccess {
                    items: vec![proto_item(&certificate)],
                })
                .await;
            }

            let mount_id = item
                .item
                .effects
                .iter()
                .find(|e| e.id == EFFECT_MOUNT_ID)
                .map(|e| e.dice_num)
                .unwrap_or(0);
            if mount_id == 0 {
                return Err(SessionError::Other(anyhow!(
                    "mount id was not found in mount certificate"
                )));
            }

            self.server.repo.delete_character_item(item.id).await?;
            self.send(MsgSvr::ItemsRemove { id: item.id }).await;

            self.send_weight().await?;

            let mut character = self.server.repo.character(self.character_id).await?;
            character.mount_id = mount_id;
            self.server.repo.update_character(character.clone()).await?;

            let mut mount = self.server.repo.mount(mount_id).await?;
            mount.character_id = self.character_id;
            mount.validity = None;
            self.server.repo.update_mount(mount.clone()).await?;

            let data = self.server.common_mount_data(&mount)?;
            self.send(MsgSvr::MountEquipSuccess { data }).await;

            if character.level() >= 60 {
                self.mount_or_dismount(true).await?;
            }
        } else {
            self.move_item_to_position(item.id, 1, position).await?;
        }

        if template.item_set_id != 0 {
            self.send_item_set_bonus(template.item_set_id).await?;
        }

        if item_pos::is_accessory(position) {
            self.send_accessories().await?;
        }

        self.send_stats().await?;

        Ok(())
    }

    /// Move an equipped (or boost-food) item back to the inventory and
    /// refresh everything that depended on it.
    pub fn un_equip(&mut self, id: i32) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            let item = self.server.repo.character_item(id).await?;

            if item.character_id != self.character_id {
                return Err(SessionError::InvalidRequest);
            }

            if !(item_pos::AMULET..=item_pos::DRAGOTURKEY).contains(&item.position)
                && item.position != item_pos::BOOST_FOOD
            {
                return Err(SessionError::NotAllowed);
            }

            self.move_item_to_position(item.id, item.item.quantity, item_pos::INVENTORY)
                .await?;

            let template = self
                .server
                .static_cache
                .items
                .get(&item.item.template_id)
                .ok_or_else(|| anyhow!("item template not found"))?;

            if template.item_set_id != 0 {
                self.send_item_set_bonus(template.item_set_id).await?;
            }

            if item_pos::is_accessory(item.position) {
                self.send_accessories().await?;
            }

            self.send_stats().await?;

            Ok(())
        })
    }

    /// The common move path: batching, slot eviction, splitting.
    pub fn move_item_to_position(
        &mut self,
        item_id: i32,
        quantity: i32,
        position: i32,
    ) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            if !(item_pos::INVENTORY..=item_pos::SHIELD).contains(&position)
                && !(item_pos::MUTATION_ITEM..=item_pos::FOLLOWING_CHARACTER).contains(&position)
                && !item_pos::is_hotbar(position)
            {
                return Err(SessionError::Other(anyhow!("invalid position")));
            }

            if quantity < 1 {
                return Err(SessionError::Other(anyhow!("invalid quantity")));
            }

            let char_items = self
                .server
                .repo
                .character_items_by_character_id(self.character_id)
                .await?;

            let Some(item) = char_items.get(&item_id).cloned() else {
                return Err(SessionError::Other(anyhow!("item not found")));
            };

            if quantity > item.item.quantity {
                return Err(SessionError::Other(anyhow!("invalid quantity")));
            }

            let mut other_items = HashMap::new();
            for v in char_items.values() {
                if v.position != position {
                    continue;
                }
                if v.id == item.id {
                    return Err(SessionError::Other(anyhow!(
                        "item is already in the position"
                    )));
                }
                other_items.insert(v.id, v.item.clone());
            }

            if let Some(batch_id) = item_batch(&item.item, &other_items) {
                self.remove_item(item.id, quantity).await?;

                let mut batch = char_items
                    .get(&batch_id)
                    .cloned()
                    .ok_or_else(|| anyhow!("batch item not found"))?;
                batch.item.quantity += quantity;

                self.server.repo.update_character_item(batch.clone()).await?;

                self.send(MsgSvr::ItemsQuantity {
                    id: batch.id,
                    quantity: batch.item.quantity,
                })
                .await;
            } else {
                if (item_pos::AMULET..=item_pos::SHIELD).contains(&position)
                    || (item_pos::MUTATION_ITEM..=item_pos::FOLLOWING_CHARACTER)
                        .contains(&position)
                {
                    for id in other_items.keys().copied().collect::<Vec<_>>() {
                        self.un_equip(id).await?;
                    }
                } else if position != item_pos::INVENTORY {
                    for (other_id, other) in other_items.clone() {
                        self.move_item_to_position(
                            other_id,
                            other.quantity,
                            item_pos::INVENTORY,
                        )
                        .await?;
                    }
                }

                let mut item = self.server.repo.character_item(item_id).await?;

                if quantity == item.item.quantity {
                    item.position = position;
                    self.server.repo.update_character_item(item.clone()).await?;

                    self.send(MsgSvr::ItemsMovement {
                        id: item.id,
                        position: item.position,
                    })
                    .await;
                } else {
                    self.remove_item(item.id, quantity).await?;

                    let mut new_item = CharacterItem {
                        id: 0,
                        item: Item {
                            template_id: item.item.template_id,
                            quantity,
                            effects: item.item.effects.clone(),
                        },
                        position,
                        character_id: self.character_id,
                    };

                    let created = self
                        .server
                        .repo
                        .create_character_item(new_item.clone())
                        .await?;
                    new_item.id = created;

                    self.send(MsgSvr::ItemsAddSuccess {
                        items: vec![proto_item(&new_item)],
                    })
                    .await;
                }
            }

            Ok(())
        })
    }

    /// Add an item into the inventory, joining an existing stack when one
    /// matches.
    pub async fn add_item_to_inventory(&mut self, item: Item) -> SessionResult<()> {
        let char_items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;

        let mut inventory_items = HashMap::new();
        for (k, v) in &char_items {
            if v.position != item_pos::INVENTORY {
                continue;
            }
            inventory_items.insert(*k, v.item.clone());
        }

        if let Some(batch_id) = item_batch(&item, &inventory_items) {
            let mut batch = char_items
                .get(&batch_id)
                .cloned()
                .ok_or_else(|| anyhow!("batch item not found"))?;
            batch.item.quantity += item.quantity;

            self.server.repo.update_character_item(batch.clone()).await?;

            self.send(MsgSvr::ItemsQuantity {
                id: batch.id,
                quantity: batch.item.quantity,
            })
            .await;
        } else {
            let mut char_item = CharacterItem {
                id: 0,
                item,
                position: item_pos::INVENTORY,
                character_id: self.character_id,
            };

            let created = self
                .server
                .repo
                .create_character_item(char_item.clone())
                .await?;
            char_item.id = created;

            self.send(MsgSvr::ItemsAddSuccess {
                items: vec![proto_item(&char_item)],
            })
            .await;
        }

        Ok(())
    }

    /// Decrease an item's quantity, deleting the row when it hits zero.
    pub async fn remove_item(&mut self, id: i32, quantity: i32) -> SessionResult<()> {
        if quantity < 1 {
            return Err(SessionError::InvalidRequest);
        }

        let mut item = self.server.repo.character_item(id).await?;

        if item.character_id != self.character_id {
            return Err(SessionError::Other(anyhow!("character doesn't own item")));
        }

        if quantity > item.item.quantity {
            return Err(SessionError::InvalidRequest);
        }

        if quantity == item.item.quantity {
            self.server.repo.delete_character_item(item.id).await?;
            self.send(MsgSvr::ItemsRemove { id: item.id }).await;
        } else {
            item.item.quantity -= quantity;
            self.server.repo.update_character_item(item.clone()).await?;
            self.send(MsgSvr::ItemsQuantity {
                id: item.id,
                quantity: item.item.quantity,
            })
            .await;
        }

        Ok(())
    }

    /// Report the bonus band for an item set at its current equipped count.
    pub async fn send_item_set_bonus(&mut self, id: i32) -> SessionResult<()> {
        if id == 0 {
            return Err(SessionError::Other(anyhow!("invalid item set id")));
        }

        let char_items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;

        let mut ids = Vec::new();
        for v in char_items.values() {
            if v.position == item_pos::INVENTORY {
                continue;
            }
            let t = self
                .server
                .static_cache
                .items
                .get(&v.item.template_id)
                .ok_or_else(|| anyhow!("item template not found"))?;
            if t.item_set_id == id {
                ids.push(v.item.template_id);
            }
        }
        ids.sort_unstable();

        let item_set = self
            .server
            .static_cache
            .item_sets
            .get(&id)
            .ok_or_else(|| anyhow!("item set template not found"))?;

        if ids.is_empty() {
            self.send(MsgSvr::ItemsItemSetRemove { id }).await;
        } else if item_set.bonus.len() < ids.len() - 1 {
            return Err(SessionError::Other(anyhow!("invalid item set bonus index")));
        } else {
            let effects = item_set
                .bonus
                .get(ids.len() - 1)
                .cloned()
                .unwrap_or_default();
            self.send(MsgSvr::ItemsItemSetAdd {
                id,
                item_template_ids: ids,
                effects,
            })
            .await;
        }

        Ok(())
    }

    /// Broadcast this character's accessories to its map.
    pub async fn send_accessories(&mut self) -> SessionResult<()> {
        let character = self.server.repo.character(self.character_id).await?;
        let items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;

        self.server
            .send_to_map(
                character.game_map_id,
                MsgSvr::ItemsAccessories {
                    id: character.id,
                    accessories: proto_accessories(&items),
                },
            )
            .await?;

        Ok(())
    }

    pub async fn send_info_message(&self, entry: InfosMessageEntry) {
        self.send(MsgSvr::InfosMessage {
            chat: InfosChat::Info,
            messages: vec![entry],
        })
        .await;
    }

    pub async fn handle_items_destroy(&mut self, id: i32, quantity: i32) -> SessionResult<()> {
        if quantity < 1 {
            return Err(SessionError::InvalidRequest);
        }

        let item = self.server.repo.character_item(id).await?;

        if item.character_id != self.character_id {
            return Err(SessionError::InvalidRequest);
        }

        if quantity > item.item.quantity {
            return Err(SessionError::InvalidRequest);
        }

        if !(item_pos::INVENTORY..=item_pos::SHIELD).contains(&item.position)
            && !item_pos::is_hotbar(item.position)
        {
            return Err(SessionError::InvalidRequest);
        }

        self.remove_item(item.id, quantity).await?;

        let mut character = self.server.repo.character(self.character_id).await?;
        character.kamas += i64::from(quantity);
        self.server.repo.update_character(character).await?;

        self.send_weight().await?;
        self.send_stats().await?;

        if item_pos::is_accessory(item.position) {
            self.send_accessories().await?;
        }

        if (item_pos::AMULET..=item_pos::SHIELD).contains(&item.position) {
            self.check_conditions().await?;
        }

        Ok(())
    }

    pub async fn handle_items_request_movement(
        &mut self,
        id: i32,
        position: i32,
        quantity: i32,
    ) -> SessionResult<()> {
        if quantity < 1 {
            return Err(SessionError::InvalidRequest);
        }

        let item = self.server.repo.character_item(id).await?;

        if item.character_id != self.character_id {
            return Err(SessionError::InvalidRequest);
        }

        if position == item.position {
            return Err(SessionError::InvalidRequest);
        }

        if quantity > item.item.quantity {
            return Err(SessionError::InvalidRequest);
        }

        if position == item_pos::INVENTORY {
            if (item_pos::AMULET..=item_pos::SHIELD).contains(&item.position) {
                self.un_equip(item.id).await?;
                self.check_conditions().await?;
            } else if item_pos::is_hotbar(item.position) {
                self.move_item_to_position(item.id, quantity, position).await?;
            } else {
                return Err(SessionError::InvalidRequest);
            }
        } else if (item_pos::AMULET..=item_pos::SHIELD).contains(&position) {
            self.equip(item.id, position).await?;
            self.check_conditions().await?;
        } else if item_pos::is_hotbar(position) {
            if item.position == item_pos::INVENTORY {
                let template = self
                    .server
                    .static_cache
                    .items
                    .get(&item.item.template_id)
                    .ok_or_else(|| anyhow!("invalid item template"))?;

                if !(template.can_use || template.can_target) {
                    return Err(SessionError::InvalidRequest);
                }

                if template.item_type == item_type::CANDY {
                    return Err(SessionError::NotAllowed);
                }

                self.move_item_to_position(item.id, quantity, position).await?;
            } else if item_pos::is_hotbar(item.position) {
                self.move_item_to_position(item.id, quantity, position).await?;
            } else {
                return Err(SessionError::InvalidRequest);
            }
        } else {
            return Err(SessionError::NotAllowed);
        }

        self.send_weight().await?;

        Ok(())
    }

    pub async fn handle_items_use_no_confirm(
        &mut self,
        id: i32,
        sprite_id: i32,
        cell: i32,
    ) -> SessionResult<()> {
        if id <= 0 {
            return Err(SessionError::InvalidRequest);
        }

        if sprite_id != 0 || cell != 0 {
            return Err(SessionError::NotImplemented);
        }

        let items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;

        let Some(item) = items.get(&id).cloned() else {
            return Err(SessionError::InvalidRequest);
        };

        if item.position != item_pos::INVENTORY && !item_pos::is_hotbar(item.position) {
            return Err(SessionError::InvalidRequest);
        }

        let template = self
            .server
            .static_cache
            .items
            .get(&item.item.template_id)
            .cloned()
            .ok_or_else(|| anyhow!("item template not found"))?;

        match template.item_type {
            item_type::CANDY => {
                self.equip(item.id, item_pos::BOOST_FOOD).await?;
                self.check_conditions().await?;
                self.send_weight().await?;
            }
            item_type::USABLE_ITEM => match template.id {
                7651 | 7799 => {
                    let character = self.server.repo.character(self.character_id).await?;
                    self.mount_or_dismount(!character.mounting).await?;
                }
                8626 => {
                    let character = self.server.repo.character(self.character_id).await?;
                    let mounts = self
                        .server
                        .repo
                        .mounts_by_character_id(self.character_id)
                        .await?;

                    let mut shed = Vec::new();
                    for mount in mounts {
                        if mount.id == character.mount_id {
                            continue;
                        }
                        shed.push(self.server.common_mount_data(&mount)?);
                    }

                    self.send(MsgSvr::ExchangeCreateSuccessPaddock { shed }).await;
                }
                _ => return Err(SessionError::NotImplemented),
            },
            _ => return Err(SessionError::NotImplemented),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(id: i32, dice_num: i32) -> Effect {
        Effect {
            id,
            dice_num,
            dice_side: 0,
            param: String::new(),
        }
    }

    fn item(template_id: i32, quantity: i32, effects: Vec<Effect>) -> Item {
        Item {
            template_id,
            quantity,
            effects,
        }
    }

    #[test]
    fn identical_items_join() {
        let a = item(40, 1, vec![effect(118, 10)]);
        let b = item(40, 3, vec![effect(118, 10)]);
        assert!(same_items(&a, &b));
    }

    #[test]
    fn different_effects_do_not_join() {
        let a = item(40, 1, vec![effect(118, 10)]);
        let b = item(40, 1, vec![effect(118, 11)]);
        let c = item(40, 1, vec![]);
        assert!(!same_items(&a, &b));
        assert!(!same_items(&a, &c));
    }

    #[test]
    fn batch_finds_matching_stack() {
        let incoming = item(40, 2, vec![]);
        let mut others = HashMap::new();
        others.insert(7, item(41, 1, vec![]));
        others.insert(9, item(40, 5, vec![]));
        assert_eq!(item_batch(&incoming, &others), Some(9));

        others.remove(&9);
        assert_eq!(item_batch(&incoming, &others), None);
    }

    #[test]
    fn accessories_pick_visible_slots() {
        let mut items = HashMap::new();
        items.insert(
            1,
            CharacterItem {
                id: 1,
                item: item(2001, 1, vec![]),
                position: item_pos::WEAPON,
                character_id: 42,
            },
        );
        items.insert(
            2,
            CharacterItem {
                id: 2,
                item: item(2002, 1, vec![]),
                position: item_pos::BELT,
                character_id: 42,
            },
        );
        let accessories = proto_accessories(&items);
        assert_eq!(accessories.weapon, 2001);
        assert_eq!(accessories.hat, 0);
    }
}
