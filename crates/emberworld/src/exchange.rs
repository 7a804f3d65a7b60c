//! NPC buy stores and the mount shed exchange.

use anyhow::anyhow;
use chrono::{TimeZone, Utc};
use emberproto::msgsvr::MsgSvr;
use emberproto::typ::{exchange, item_type, Effect};
use rand::Rng;

use crate::error::{SessionError, SessionResult};
use crate::model::{
    certificate_id_by_mount_template_id, certificate_validity, mount_template_id_by_certificate_id,
    Mount, EFFECT_MOUNT_ID, EFFECT_MOUNT_NAME, MOUNT_XP_FLOORS,
};
use crate::progression::certificate_mount_id;
use crate::session::Session;

impl Session {
    pub async fn handle_exchange_request(
        &mut self,
        exchange_type: i32,
        id: i32,
    ) -> SessionResult<()> {
        if exchange_type != exchange::NPC_BUY {
            return Err(SessionError::NotImplemented);
        }

        if id >= 0 {
            return Err(SessionError::InvalidRequest);
        }

        let character = self.server.repo.character(self.character_id).await?;

        let index = (-id - 1) as usize;
        let npcs = self.server.npcs_on_map(character.game_map_id).await;
        let Some(npc) = npcs.get(index) else {
            return Err(SessionError::InvalidRequest);
        };

        if npc.market_id.is_empty() {
            return Err(SessionError::InvalidRequest);
        }

        let market = self
            .server
            .market(&npc.market_id)
            .await
            .ok_or_else(|| anyhow!("market does not exist: {:?}", npc.market_id))?;

        self.send(MsgSvr::ExchangeCreateSuccessNpcBuy {
            quantity1: market.quantity1,
            quantity2: market.quantity2,
            quantity3: market.quantity3,
            types: market.types.clone(),
            fee: market.fee,
            max_level: market.max_level,
            max_per_account: market.max_per_account,
            npc_template_id: npc.template_id,
            max_hours: market.max_hours,
        })
        .await;

        self.exchange_market = Some(market);

        Ok(())
    }

    pub async fn handle_exchange_leave(&mut self) -> SessionResult<()> {
        self.exchange_market = None;
        self.send(MsgSvr::ExchangeLeaveSuccess).await;
        Ok(())
    }

    pub async fn handle_exchange_big_store_type(&mut self, item_type: i32) -> SessionResult<()> {
        let Some(market) = self.exchange_market.clone() else {
            return Err(SessionError::InvalidRequest);
        };

        let template_ids = self
            .server
            .market_template_ids_by_item_type(&market, item_type)
            .await?;

        self.send(MsgSvr::ExchangeBigStoreTypeItemsList {
            item_type,
            item_template_ids: template_ids,
        })
        .await;

        Ok(())
    }

    pub async fn handle_exchange_big_store_item_list(
        &mut self,
        template_id: i32,
    ) -> SessionResult<()> {
        let Some(market) = self.exchange_market.clone() else {
            return Err(SessionError::InvalidRequest);
        };

        let items = self
            .server
            .market_items_by_template_id(&market, template_id)
            .await?;

        self.send(MsgSvr::ExchangeBigStoreItemsList { template_id, items })
            .await;

        Ok(())
    }

    pub async fn handle_exchange_big_store_search(
        &mut self,
        item_type: i32,
        template_id: i32,
    ) -> SessionResult<()> {
        let Some(market) = self.exchange_market.clone() else {
            return Err(SessionError::InvalidRequest);
        };

        let template_ids = self
            .server
            .market_template_ids_by_item_type(&market, item_type)
            .await?;

        let items = self
            .server
            .market_items_by_template_id(&market, template_id)
            .await?;

        if items.is_empty() {
            self.send(MsgSvr::ExchangeSearchError).await;
            return Ok(());
        }

        self.send(MsgSvr::ExchangeSearchSuccess).await;

        self.send(MsgSvr::ExchangeBigStoreTypeItemsList {
            item_type,
            item_template_ids: template_ids,
        })
        .await;

        self.send(MsgSvr::ExchangeBigStoreItemsList { template_id, items })
            .await;

        Ok(())
    }

    pub async fn handle_exchange_get_item_middle_price(
        &mut self,
        template_id: i32,
    ) -> SessionResult<()> {
        if self.exchange_market.is_none() {
            return Err(SessionError::InvalidRequest);
        }

        self.send(MsgSvr::ExchangeBigStoreMiddlePrice {
            template_id,
            price: 1,
        })
        .await;

        Ok(())
    }

    pub async fn handle_exchange_big_store_buy(
        &mut self,
        item_id: i32,
        _quantity: i32,
    ) -> SessionResult<()> {
        let Some(market) = self.exchange_market.clone() else {
            return Err(SessionError::InvalidRequest);
        };

        let items = self.server.market_items(&market.id).await;

        let Some(mut market_item) = items.get(&item_id).cloned() else {
            return Err(SessionError::InvalidRequest);
        };

        let item_template = self
            .server
            .static_cache
            .items
            .get(&market_item.item.template_id)
            .ok_or_else(|| anyhow!("item template not found"))?;

        let mut character = self.server.repo.character(self.character_id).await?;

        if item_template.item_type == item_type::MOUNT_CERTIFICATE {
            let mount_template_id = mount_template_id_by_certificate_id(item_template.id)
                .ok_or_else(|| anyhow!("mount template id not found"))?;

            let validity = certificate_validity(Utc::now());
            let sex = rand::thread_rng().gen_range(0..2);

            let mount_id = self
                .server
                .repo
                .create_mount(Mount {
                    id: 0,
                    template_id: mount_template_id,
                    character_id: 0,
                    name: String::new(),
                    sex,
                    xp: MOUNT_XP_FLOORS[MOUNT_XP_FLOORS.len() - 1],
                    capacities: Vec::new(),
                    validity: Some(validity),
                })
                .await?;

            market_item.item.effects = vec![Effect {
                id: EFFECT_MOUNT_ID,
                dice_num: mount_id,
                dice_side: validity.timestamp_millis(),
                param: String::new(),
            }];
        }

        if market_item.price > character.kamas {
            self.send(MsgSvr::ExchangeBuyError).await;
            return Ok(());
        }

        character.kamas -= market_item.price;

        self.server.repo.update_character(character).await?;

        self.send_stats().await?;

        self.add_item_to_inventory(market_item.item).await?;

        self.send_weight().await?;

        self.send(MsgSvr::ExchangeBuySuccess).await;

        Ok(())
    }

    pub async fn handle_exchange_put_in_shed_from_certificate(
        &mut self,
        certificate_id: i32,
    ) -> SessionResult<()> {
        let char_item = self.server.repo.character_item(certificate_id).await?;

        if char_item.character_id != self.character_id {
            return Err(SessionError::InvalidRequest);
        }

        let Some((mount_id, validity_ms)) = certificate_mount_id(&char_item.item.effects) else {
            return Err(SessionError::InvalidRequest);
        };
        let validity = Utc
            .timestamp_millis_opt(validity_ms)
            .single()
            .ok_or_else(|| anyhow!("invalid certificate validity"))?;

        if validity < Utc::now() {
            return Err(SessionError::NotImplemented);
        }

        self.remove_item(char_item.id, 1).await?;

        let mut mount = self.server.repo.mount(mount_id).await?;
        mount.validity = None;
        mount.character_id = self.character_id;

        self.server.repo.update_mount(mount.clone()).await?;

        let data = self.server.common_mount_data(&mount)?;

        self.send(MsgSvr::ExchangeMountStorageAdd {
            data,
            new_born: false,
        })
        .await;

        Ok(())
    }

    pub async fn handle_exchange_put_in_shed_from_inventory(
        &mut self,
        mount_id: i32,
    ) -> SessionResult<()> {
        let character = self.server.repo.character(self.character_id).await?;

        let mut mount = self.server.repo.mount(mount_id).await?;

        if mount.id != character.mount_id {
            return Err(SessionError::InvalidRequest);
        }

        if character.mounting {
            self.mount_or_dismount(false).await?;
        }

        self.send(MsgSvr::MountUnequip).await;

        let mut character = self.server.repo.character(self.character_id).await?;
        character.mount_id = 0;

        self.server.repo.update_character(character).await?;

        // A stabled mount stays attached to its owner.
        mount.character_id = self.character_id;
        self.server.repo.update_mount(mount.clone()).await?;

        let data = self.server.common_mount_data(&mount)?;

        self.send(MsgSvr::ExchangeMountStorageAdd {
            data,
            new_born: false,
        })
        .await;

        Ok(())
    }

    pub async fn handle_exchange_put_in_certificate_from_shed(
        &mut self,
        mount_id: i32,
    ) -> SessionResult<()> {
        let character = self.server.repo.character(self.character_id).await?;

        let mut mount = self.server.repo.mount(mount_id).await?;

        if mount.character_id != character.id {
            return Err(SessionError::InvalidRequest);
        }

        if mount.id == character.mount_id {
            return Err(SessionError::InvalidRequest);
        }

        self.send(MsgSvr::ExchangeMountStorageRemove { mount_id: mount.id })
            .await;

        let certificate_template_id = certificate_id_by_mount_template_id(mount.template_id)
            .ok_or_else(|| anyhow!("certificate id not found"))?;

        mount.character_id = 0;
        mount.validity = Some(certificate_validity(Utc::now()));

        self.server.repo.update_mount(mount.clone()).await?;

        let validity_ms = mount
            .validity
            .map(|t| t.timestamp_millis())
            .unwrap_or_default();

        let mut effects = vec![Effect {
            id: EFFECT_MOUNT_ID,
            dice_num: mount.id,
            dice_side: validity_ms,
            param: String::new(),
        }];

        if !mount.name.is_empty() {
            effects.push(Effect {
                id: EFFECT_MOUNT_NAME,
                dice_num: 0,
                dice_side: 0,
                param: mount.name.clone(),
            });
        }

        self.add_item_to_inventory(crate::model::Item {
            template_id: certificate_template_id,
            quantity: 1,
            effects,
        })
        .await?;

        Ok(())
    }

    pub async fn handle_exchange_put_in_inventory_from_shed(
        &mut self,
        mount_id: i32,
    ) -> SessionResult<()> {
        let character = self.server.repo.character(self.character_id).await?;

        if character.mount_id != 0 {
            self.handle_exchange_put_in_shed_from_inventory(character.mount_id)
                .await?;
        }

        let mut character = self.server.repo.character(self.character_id).await?;

        let mut mount = self.server.repo.mount(mount_id).await?;

        if mount.character_id != character.id {
            return Err(SessionError::InvalidRequest);
        }

        if mount.id == character.mount_id {
            return Err(SessionError::InvalidRequest);
        }

        self.send(MsgSvr::ExchangeMountStorageRemove { mount_id: mount.id })
            .await;

        character.mount_id = mount.id;
        self.server.repo.update_character(character.clone()).await?;

        mount.validity = None;
        self.server.repo.update_mount(mount.clone()).await?;

        let data = self.server.common_mount_data(&mount)?;

        self.send(MsgSvr::MountEquipSuccess { data }).await;

        if character.level() >= 60 {
            self.mount_or_dismount(true).await?;
        }

        Ok(())
    }
}
