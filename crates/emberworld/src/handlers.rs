//! Login, character management, game entry, chat, dialogs, and the small
//! always-allowed messages.

use anyhow::anyhow;
use chrono::{Datelike, Timelike, Utc};
use emberproto::msgsvr::{CharactersListCharacter, MsgSvr, Restrictions, SelectedCharacterItem};
use emberproto::typ::{
    alignment, chat_channel, class, GameMovementSprite, InfosChat, InfosMessageEntry,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::items::proto_accessories;
use crate::model::{Character, CharacterSpell, CharacterStats};
use crate::session::{Phase, Session};

/// Spells every fresh character knows, `(id, bar position)`; position 0 is
/// off the bar.
const EXTRA_SPELLS: &[(i32, i32)] = &[
    (370, 5),
    (373, 6),
    (391, 7),
    (368, 8),
    (350, 9),
    (369, 10),
    (366, 11),
    (364, 12),
    (367, 13),
    (394, 14),
    (390, 0),
    (392, 0),
    (393, 0),
    (395, 0),
    (396, 0),
    (397, 0),
];

fn special_class_spell_id(class_id: i32) -> i32 {
    match class_id {
        class::FECA => 422,
        class::OSAMODAS => 420,
        class::ENUTROF => 425,
        class::SRAM => 416,
        class::XELOR => 424,
        class::ECAFLIP => 412,
        class::ENIRIPSA => 427,
        class::IOP => 410,
        class::CRA => 418,
        class::SADIDA => 426,
        class::SACRIER => 421,
        class::PANDAWA => 423,
        _ => 0,
    }
}

const NAME_HEADS: &[&str] = &[
    "Amber", "Bold", "Brisk", "Clever", "Dusty", "Eager", "Fancy", "Gentle", "Hazel", "Ivory",
    "Jolly", "Keen", "Lively", "Merry", "Noble", "Opal", "Proud", "Quiet", "Rusty", "Silent",
    "Swift", "Tidy", "Vivid", "Witty",
];

const NAME_TAILS: &[&str] = &[
    "acorn", "badger", "bramble", "cinder", "clover", "ember", "fennel", "flint", "heron",
    "juniper", "lantern", "maple", "meadow", "otter", "pebble", "quill", "raven", "sorrel",
    "sparrow", "thistle", "walnut", "willow", "wren", "yarrow",
];

fn valid_color(color: &str) -> bool {
    color == "-1"
        || (color.len() == 6 && color.chars().all(|c| c.is_ascii_hexdigit()))
}

fn valid_character_name(name: &str) -> bool {
    if name.len() < 3 || name.len() > 20 {
        return false;
    }
    let mut dashes = 0;
    for c in name.chars() {
        match c {
            'a'..='z' | 'A'..='Z' => {}
            '-' => dashes += 1,
            _ => return false,
        }
    }
    dashes <= 1 && !name.starts_with('-') && !name.ends_with('-')
}

impl Session {
    pub async fn handle_account_queue_position(&mut self) -> SessionResult<()> {
        self.send(MsgSvr::AccountQueue { position: 1 }).await;
        Ok(())
    }

    pub async fn handle_aks_ping(&mut self) -> SessionResult<()> {
        self.send(MsgSvr::AksPong).await;
        Ok(())
    }

    pub async fn handle_aks_quick_ping(&mut self) -> SessionResult<()> {
        self.send(MsgSvr::AksQuickPong).await;
        Ok(())
    }

    pub async fn handle_basics_request_average_ping(&mut self) -> SessionResult<()> {
        self.send(MsgSvr::BasicsAveragePing).await;
        Ok(())
    }

    pub async fn handle_basics_get_date(&mut self) -> SessionResult<()> {
        let now = Utc::now();
        self.send(MsgSvr::BasicsDate {
            year: now.year(),
            month: now.month(),
            day: now.day(),
        })
        .await;
        Ok(())
    }

    pub async fn handle_infos_send_screen_info(&mut self) -> SessionResult<()> {
        // Screen metrics are acknowledged and otherwise ignored.
        Err(SessionError::Noop)
    }

    pub async fn handle_account_send_ticket(&mut self, ticket: &str) -> SessionResult<()> {
        let t = self.server.repo.use_ticket(ticket).await?;

        if t.game_server_id != self.server.id {
            debug!(client_address = %self.addr, "different game server id");
            self.send(MsgSvr::AccountTicketResponseError).await;
            return Err(SessionError::InvalidRequest);
        }

        let ticket_dur = chrono::Duration::from_std(self.server.ticket_dur)
            .unwrap_or_else(|_| chrono::Duration::seconds(20));
        if t.created + ticket_dur < Utc::now() {
            debug!(client_address = %self.addr, "ticket is expired");
            self.send(MsgSvr::AccountTicketResponseError).await;
            return Err(SessionError::InvalidRequest);
        }

        if let Err(e) = self.server.control_account(&t.account_id, self.id).await {
            debug!(client_address = %self.addr, err = %e, "could not control account");
            self.send(MsgSvr::AccountLoginError { reason: 'c' }).await;
            return Err(SessionError::InvalidRequest);
        }
        self.account_id = t.account_id.clone();

        let account = self.server.repo.account(&self.account_id).await?;

        let user = self.server.repo.user(&account.user_id).await?;
        self.user_id = user.id;

        let ip = self.addr.ip().to_string();
        self.server
            .repo
            .set_account_last_access_and_last_ip(&self.account_id, Utc::now(), &ip)
            .await?;

        self.send(MsgSvr::AccountTicketResponseSuccess { key_id: 0 }).await;

        self.set_phase(Phase::ExpectingUseKey);
        Ok(())
    }

    pub async fn handle_account_use_key(&mut self, id: i32) -> SessionResult<()> {
        if id != 0 {
            debug!(client_address = %self.addr, key_id = id, "unexpected key id");
            return Err(SessionError::InvalidRequest);
        }
        self.send(MsgSvr::BasicsNothing).await;
        self.set_phase(Phase::ExpectingRequestRegionalVersion);
        Ok(())
    }

    pub async fn handle_account_request_regional_version(&mut self) -> SessionResult<()> {
        self.send(MsgSvr::AccountRegionalVersion { value: 0 }).await;
        self.set_phase(Phase::ExpectingGetGifts);
        Ok(())
    }

    pub async fn handle_account_get_gifts(&mut self) -> SessionResult<()> {
        self.send(MsgSvr::BasicsNothing).await;
        self.set_phase(Phase::ExpectingSetCharacter);
        Ok(())
    }

    pub async fn handle_account_send_identity(&mut self) -> SessionResult<()> {
        self.send(MsgSvr::BasicsNothing).await;
        Ok(())
    }

    pub async fn handle_account_get_characters(&mut self) -> SessionResult<()> {
        let all_characters = self
            .server
            .repo
            .all_characters_by_account_id(&self.account_id)
            .await?;

        let mut characters = Vec::new();
        for character in all_characters.values() {
            if character.game_server_id != self.server.id {
                continue;
            }

            let items = self
                .server
                .repo
                .character_items_by_character_id(character.id)
                .await?;

            characters.push(CharactersListCharacter {
                id: character.id,
                name: character.name.clone(),
                level: character.level(),
                gfx_id: character.gfx_id(),
                color1: character.color1.clone(),
                color2: character.color2.clone(),
                color3: character.color3.clone(),
                accessories: proto_accessories(&items),
                server_id: character.game_server_id,
            });
        }
        characters.sort_by_key(|c| c.id);

        let account = self.server.repo.account(&self.account_id).await?;
        let subscription_ms = (account.subscription - Utc::now()).num_milliseconds().max(0);

        self.send(MsgSvr::AccountCharactersListSuccess {
            subscription_ms,
            characters_count: all_characters.len(),
            characters,
        })
        .await;

        Ok(())
    }

    pub async fn handle_account_get_random_character_name(&mut self) -> SessionResult<()> {
        let name = {
            let mut rng = rand::thread_rng();
            let head = NAME_HEADS.choose(&mut rng).copied().unwrap_or("Quiet");
            let tail = NAME_TAILS.choose(&mut rng).copied().unwrap_or("wren");
            format!("{head}-{tail}")
        };
        self.send(MsgSvr::AccountCharacterNameGeneratedSuccess { name })
            .await;
        Ok(())
    }

    pub async fn handle_account_add_character(
        &mut self,
        name: String,
        class_id: i32,
        sex: i32,
        color1: String,
        color2: String,
        color3: String,
    ) -> SessionResult<()> {
        if !class::is_valid(class_id) {
            return Err(SessionError::InvalidRequest);
        }
        if sex != 0 && sex != 1 {
            return Err(SessionError::InvalidRequest);
        }
        if !valid_color(&color1) || !valid_color(&color2) || !valid_color(&color3) {
            return Err(SessionError::InvalidRequest);
        }

        let account = self.server.repo.account(&self.account_id).await?;

        if account.subscription < Utc::now() {
            self.send(MsgSvr::AccountCharacterAddError { reason: 's' }).await;
            return Ok(());
        }

        let account_characters = self
            .server
            .repo
            .all_characters_by_account_id(&self.account_id)
            .await?;

        if account_characters.len() >= 5 {
            self.send(MsgSvr::AccountCharacterAddError { reason: 'f' }).await;
            return Ok(());
        }

        if !valid_character_name(&name) {
            self.send(MsgSvr::AccountCharacterAddError { reason: 'n' }).await;
            return Ok(());
        }

        let mut spells = Vec::new();

        let class = self
            .server
            .static_cache
            .classes
            .get(&class_id)
            .ok_or_else(|| anyhow!("class not found"))?;
        for (i, &id) in class.spells.iter().take(3).enumerate() {
            spells.push(CharacterSpell {
                id,
                level: 5,
                position: i as i32 + 1,
            });
        }

        spells.push(CharacterSpell {
            id: special_class_spell_id(class_id),
            level: 5,
            position: 4,
        });
        for &(id, position) in EXTRA_SPELLS {
            spells.push(CharacterSpell {
                id,
                level: 5,
                position,
            });
        }

        let character = Character {
            id: 0,
            account_id: self.account_id.clone(),
            game_server_id: self.server.id,
            name,
            sex,
            class_id,
            color1,
            color2,
            color3,
            stats: CharacterStats {
                vitality: 101,
                wisdom: 101,
                strength: 101,
                intelligence: 101,
                chance: 101,
                agility: 101,
            },
            xp: 0,
            kamas: 100,
            bonus_points: 0,
            bonus_points_spell: 1000,
            alignment: alignment::NEUTRAL,
            disgrace: 0,
            honor: 0,
            alignment_enabled: false,
            game_map_id: 952,
            cell: 100 + rand::thread_rng().gen_range(0..=100),
            direction: 1,
            mount_id: 0,
            mounting: false,
            spells,
        };

        match self.server.repo.create_character(character).await {
            Ok(_) => {}
            Err(crate::repository::RepoError::NameTaken) => {
                self.send(MsgSvr::AccountCharacterAddError { reason: 'a' }).await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.handle_account_get_characters().await
    }

    pub async fn handle_account_delete_character(
        &mut self,
        id: i32,
        secret_answer: &str,
    ) -> SessionResult<()> {
        let character = self.server.repo.character(id).await?;
        if character.account_id != self.account_id {
            debug!(client_address = %self.addr, "account does not own character");
            return Err(SessionError::InvalidRequest);
        }

        if character.level() >= 20 {
            let user = self.server.repo.user(&self.user_id).await?;

            if !secret_answer
                .trim()
                .eq_ignore_ascii_case(user.secret_answer.trim())
            {
                debug!(client_address = %self.addr, "wrong secret answer");
                self.send(MsgSvr::AccountCharacterDeleteError).await;
                return Ok(());
            }
        }

        self.server.repo.delete_character(id).await?;

        self.handle_account_get_characters().await
    }

    pub async fn handle_account_set_character(&mut self, id: i32) -> SessionResult<()> {
        let character = self.server.repo.character(id).await?;
        if character.account_id != self.account_id {
            debug!(client_address = %self.addr, "account does not own character");
            return Err(SessionError::InvalidRequest);
        }

        self.character_id = character.id;
        self.server.bind_character(character.id, self.id).await;

        let character_items = self
            .server
            .repo
            .character_items_by_character_id(character.id)
            .await?;

        let mut items: Vec<SelectedCharacterItem> = character_items
            .values()
            .map(|v| SelectedCharacterItem {
                id: v.id,
                template_id: v.item.template_id,
                quantity: v.item.quantity,
                position: v.position,
                effects: v.item.effects.clone(),
            })
            .collect();
        items.sort_by_key(|v| v.id);

        self.send(MsgSvr::AccountCharacterSelectedSuccess {
            id: character.id,
            name: character.name.clone(),
            level: character.level(),
            class_id: character.class_id,
            sex: character.sex,
            gfx_id: character.gfx_id(),
            color1: character.color1.clone(),
            color2: character.color2.clone(),
            color3: character.color3.clone(),
            items,
        })
        .await;

        self.set_phase(Phase::ExpectingGameCreate);
        Ok(())
    }

    pub async fn handle_game_create(&mut self, create_type: i32) -> SessionResult<()> {
        if create_type != 1 {
            debug!(client_address = %self.addr, create_type, "wrong game create type");
            return Err(SessionError::InvalidRequest);
        }

        let character = self.server.repo.character(self.character_id).await?;

        let items = self
            .server
            .repo
            .character_items_by_character_id(self.character_id)
            .await?;

        let mut item_sets = Vec::new();
        for v in items.values() {
            if v.position == emberproto::typ::item_pos::INVENTORY
                || emberproto::typ::item_pos::is_hotbar(v.position)
            {
                continue;
            }
            let template = self
                .server
                .static_cache
                .items
                .get(&v.item.template_id)
                .ok_or_else(|| anyhow!("item template not found"))?;
            if template.item_set_id != 0 && !item_sets.contains(&template.item_set_id) {
                item_sets.push(template.item_set_id);
            }
        }
        for id in item_sets {
            self.send_item_set_bonus(id).await?;
        }

        if character.mount_id != 0 {
            let mount = self.server.repo.mount(character.mount_id).await?;
            let data = self.server.common_mount_data(&mount)?;
            self.send(MsgSvr::MountEquipSuccess { data }).await;
        }

        self.send(MsgSvr::MountXp { percent: 0 }).await;

        let specialization = match character.alignment {
            alignment::BONTARIAN => 1,
            alignment::BRAKMARIAN => 18,
            alignment::MERCENARY => 34,
            _ => 0,
        };
        self.send(MsgSvr::SpecializationSet {
            value: specialization,
        })
        .await;

        let user = self.server.repo.user(&self.user_id).await?;
        self.send(MsgSvr::ChatSubscribeChannel {
            add: true,
            channels: user.chat_channels.clone(),
        })
        .await;

        self.send(MsgSvr::SpellsChangeOption {
            can_use_see_all_spell: true,
        })
        .await;

        self.send_spells_list(&character.spells).await;

        self.send(MsgSvr::AccountRestrictions {
            restrictions: Restrictions {
                cant_attack: true,
                cant_attack_dungeon_monsters_when_mutant: true,
                cant_attack_monsters_anywhere_when_mutant: true,
                ..Default::default()
            },
        })
        .await;

        self.send_weight().await?;

        self.send(MsgSvr::FriendsNotifyChange { notify: true }).await;

        self.send(MsgSvr::InfosMessage {
            chat: InfosChat::Error,
            messages: vec![InfosMessageEntry::new(89)],
        })
        .await;

        let account = self.server.repo.account(&self.account_id).await?;

        if let Some(last_access) = account.last_access {
            self.send_info_message(InfosMessageEntry::with_args(
                152,
                vec![
                    last_access.year().to_string(),
                    last_access.month().to_string(),
                    last_access.day().to_string(),
                    last_access.hour().to_string(),
                    format!("{:02}", last_access.minute()),
                    account.last_ip.clone(),
                ],
            ))
            .await;
        }

        self.send_info_message(InfosMessageEntry::with_args(
            153,
            vec![self.addr.ip().to_string()],
        ))
        .await;

        self.send(MsgSvr::GameCreateSuccess { create_type: 1 }).await;

        self.send_stats().await?;

        self.send(MsgSvr::InfosLifeRestoreTimerStart { interval_s: 2 }).await;

        let game_map = self
            .server
            .static_cache
            .game_maps
            .get(&character.game_map_id)
            .ok_or_else(|| anyhow!("invalid game map"))?;

        self.send(MsgSvr::GameMapData {
            id: game_map.id,
            name: game_map.name.clone(),
            key: game_map.key.clone(),
        })
        .await;

        self.send(MsgSvr::BasicsTime {
            unix_ms: Utc::now().timestamp_millis(),
        })
        .await;

        self.send(MsgSvr::FightsCount { value: 0 }).await;

        self.send(MsgSvr::TutorialShowTip { id: 32 }).await;

        let sprite = self.server.character_sprite(&character, false).await?;
        self.server
            .send_to_map(
                character.game_map_id,
                MsgSvr::GameMovement {
                    sprites: vec![GameMovementSprite::Character(sprite)],
                },
            )
            .await?;

        self.set_phase(Phase::Idle);
        Ok(())
    }

    pub async fn handle_game_get_extra_informations(&mut self) -> SessionResult<()> {
        let character = self.server.repo.character(self.character_id).await?;

        let npcs = self.server.npcs_on_map(character.game_map_id).await;
        let mut sprites: Vec<GameMovementSprite> = npcs
            .iter()
            .enumerate()
            .map(|(i, npc)| GameMovementSprite::Npc(crate::server::Server::npc_sprite(i, npc)))
            .collect();

        let connected = self
            .server
            .connected_characters_on_map(character.game_map_id)
            .await?;
        for v in connected {
            let sprite = self.server.character_sprite(&v, false).await?;
            sprites.push(GameMovementSprite::Character(sprite));
        }

        self.send(MsgSvr::GameMovement { sprites }).await;

        self.send(MsgSvr::GameMapLoaded).await;

        Ok(())
    }

    pub async fn handle_chat_subscribe(
        &mut self,
        add: bool,
        channels: &[char],
    ) -> SessionResult<()> {
        if channels.is_empty() {
            return Err(SessionError::InvalidRequest);
        }

        for &c in channels {
            if c == chat_channel::ADMIN || !chat_channel::is_valid(c) {
                return Err(SessionError::InvalidRequest);
            }
        }

        if add {
            self.server
                .repo
                .user_add_chat_channels(&self.user_id, channels)
                .await?;
        } else {
            self.server
                .repo
                .user_remove_chat_channels(&self.user_id, channels)
                .await?;
        }

        self.send(MsgSvr::ChatSubscribeChannel {
            add,
            channels: channels.to_vec(),
        })
        .await;
        Ok(())
    }

    pub async fn handle_chat_send(
        &mut self,
        channel: char,
        message: &str,
        params: &str,
    ) -> SessionResult<()> {
        if !chat_channel::is_valid(channel) {
            return Err(SessionError::InvalidRequest);
        }

        if message.is_empty() {
            self.send(MsgSvr::BasicsNothing).await;
            return Ok(());
        }

        let account = self.server.repo.account(&self.account_id).await?;
        let character = self.server.repo.character(self.character_id).await?;

        match channel {
            chat_channel::ADMIN => {
                if !account.admin {
                    self.send(MsgSvr::BasicsNothing).await;
                    return Ok(());
                }

                self.send(MsgSvr::ChatMessageSuccess {
                    channel,
                    id: character.id,
                    name: character.name.clone(),
                    message: message.to_string(),
                    params: params.to_string(),
                })
                .await;
            }
            chat_channel::PUBLIC => {
                if account.admin && message.len() >= 2 && message.starts_with('.') {
                    return self.chat_command(&message[1..]).await;
                }

                self.send(MsgSvr::ChatMessageSuccess {
                    channel,
                    id: character.id,
                    name: character.name.clone(),
                    message: message.to_string(),
                    params: params.to_string(),
                })
                .await;
            }
            _ => {
                self.send_error_message("Not implemented.").await;
            }
        }

        Ok(())
    }

    async fn chat_command(&mut self, command: &str) -> SessionResult<()> {
        if command.is_empty() {
            return Err(SessionError::Other(anyhow!("command string is empty")));
        }

        let (name, extra) = command.split_once(' ').unwrap_or((command, ""));

        match name.to_ascii_lowercase().as_str() {
            "reset" => {
                self.reset_characteristics().await?;

                self.send(MsgSvr::ChatServerMessage {
                    message: "<b>Success</b>: Characteristics were reset.".to_string(),
                })
                .await;
            }
            "level" | "lvl" => {
                let level: i32 = match extra.trim().parse() {
                    Ok(v) => v,
                    Err(e) => {
                        self.send_error_message(&e.to_string()).await;
                        return Ok(());
                    }
                };

                self.set_level(level).await?;

                self.send(MsgSvr::ChatServerMessage {
                    message: format!("<b>Success</b>: Level set to {level}."),
                })
                .await;
            }
            "forget" => {
                self.send(MsgSvr::SpellsSpellForgetShow).await;
            }
            other => {
                self.send_error_message(&format!("Command {other:?} does not exist."))
                    .await;
            }
        }

        Ok(())
    }

    pub async fn handle_dialog_create(&mut self, npc_id: i32) -> SessionResult<()> {
        if npc_id >= 0 {
            return Err(SessionError::InvalidRequest);
        }

        let index = (-npc_id - 1) as usize;

        let character = self.server.repo.character(self.character_id).await?;

        let npcs = self.server.npcs_on_map(character.game_map_id).await;
        let Some(npc) = npcs.get(index) else {
            return Err(SessionError::InvalidRequest);
        };

        if npc.dialog_id <= 0 {
            return Err(SessionError::InvalidRequest);
        }

        let dialog = self
            .server
            .static_cache
            .npc_dialogs
            .get(&npc.dialog_id)
            .ok_or_else(|| anyhow!("dialog does not exist: {}", npc.dialog_id))?;

        self.send(MsgSvr::DialogCreateSuccess { npc_id }).await;

        self.send(MsgSvr::DialogQuestion {
            question: dialog.id,
            answers: dialog.responses.clone(),
        })
        .await;

        Ok(())
    }

    pub async fn handle_dialog_request_leave(&mut self) -> SessionResult<()> {
        self.send(MsgSvr::DialogLeave).await;
        Ok(())
    }

    pub async fn handle_dialog_response(&mut self, answer: i32) -> SessionResult<()> {
        let Some(response) = self.server.static_cache.npc_responses.get(&answer).cloned() else {
            return Err(SessionError::InvalidRequest);
        };

        match response.action {
            crate::model::NpcResponseAction::LeaveDialog => {
                self.send(MsgSvr::DialogLeave).await;
            }
            crate::model::NpcResponseAction::CreateDialog => {
                let argument = response
                    .arguments
                    .first()
                    .ok_or_else(|| anyhow!("missing response argument"))?;
                let dialog_id: i32 = argument
                    .parse()
                    .map_err(|_| anyhow!("invalid dialog id argument"))?;
                let dialog = self
                    .server
                    .static_cache
                    .npc_dialogs
                    .get(&dialog_id)
                    .ok_or_else(|| anyhow!("invalid dialog id"))?;
                self.send(MsgSvr::DialogQuestion {
                    question: dialog.id,
                    answers: dialog.responses.clone(),
                })
                .await;
            }
        }

        Ok(())
    }

    pub async fn handle_emotes_set_direction(&mut self, dir: i32) -> SessionResult<()> {
        if !(0..=7).contains(&dir) {
            return Err(SessionError::InvalidRequest);
        }

        let mut character = self.server.repo.character(self.character_id).await?;

        if dir == character.direction {
            self.send(MsgSvr::BasicsNothing).await;
            return Ok(());
        }

        character.direction = dir;

        self.server.repo.update_character(character.clone()).await?;

        self.server
            .send_to_map(
                character.game_map_id,
                MsgSvr::EmotesDirection {
                    id: character.id,
                    dir,
                },
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_name_rules() {
        assert!(valid_character_name("Toto"));
        assert!(valid_character_name("Swift-wren"));
        assert!(!valid_character_name("ab"));
        assert!(!valid_character_name("-Toto"));
        assert!(!valid_character_name("To-to-ta"));
        assert!(!valid_character_name("Toto7"));
        assert!(!valid_character_name("has space"));
    }

    #[test]
    fn color_rules() {
        assert!(valid_color("-1"));
        assert!(valid_color("7b3c1f"));
        assert!(!valid_color("7b3c1"));
        assert!(!valid_color("zzzzzz"));
    }

    #[test]
    fn every_class_has_a_special_spell() {
        for id in class::FECA..=class::PANDAWA {
            assert_ne!(special_class_spell_id(id), 0);
        }
    }
}
