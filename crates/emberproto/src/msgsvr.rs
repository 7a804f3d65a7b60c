//! Server messages: one enum, one wire id, one serializer each.
//!
//! `serialize` returns the payload only; the caller prepends the id from
//! [`MsgSvr::id`]. It is infallible for any value the server actually
//! constructs; the error path exists for values that cannot be framed
//! (embedded NUL or separator bytes in user-controlled strings).

use std::collections::BTreeMap;

use crate::id::MsgSvrId;
use crate::typ::{
    encode_effects, Accessories, Characteristic, DirAndCell, Effect, GameMovementSprite,
    InfosChat, InfosMessageEntry, MountData, SpellEntry,
};
use crate::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharactersListCharacter {
    pub id: i32,
    pub name: String,
    pub level: i32,
    pub gfx_id: i32,
    pub color1: String,
    pub color2: String,
    pub color3: String,
    pub accessories: Accessories,
    pub server_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCharacterItem {
    pub id: i32,
    pub template_id: i32,
    pub quantity: i32,
    pub position: i32,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigStoreItem {
    pub id: i32,
    pub effects: Vec<Effect>,
    pub price_set1: i64,
    pub price_set2: i64,
    pub price_set3: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Restrictions {
    pub cant_assault: bool,
    pub cant_challenge: bool,
    pub cant_exchange: bool,
    pub cant_attack: bool,
    pub cant_chat_to_all: bool,
    pub cant_be_merchant: bool,
    pub cant_use_object: bool,
    pub cant_interact_with_tax_collector: bool,
    pub cant_use_interactive_objects: bool,
    pub cant_speak_npc: bool,
    pub cant_attack_dungeon_monsters_when_mutant: bool,
    pub cant_move_in_all_directions: bool,
    pub cant_attack_monsters_anywhere_when_mutant: bool,
    pub cant_interact_with_prism: bool,
}

impl Restrictions {
    fn bits(&self) -> u32 {
        let flags = [
            self.cant_assault,
            self.cant_challenge,
            self.cant_exchange,
            self.cant_attack,
            self.cant_chat_to_all,
            self.cant_be_merchant,
            self.cant_use_object,
            self.cant_interact_with_tax_collector,
            self.cant_use_interactive_objects,
            self.cant_speak_npc,
            self.cant_attack_dungeon_monsters_when_mutant,
            self.cant_move_in_all_directions,
            self.cant_attack_monsters_anywhere_when_mutant,
            self.cant_interact_with_prism,
        ];
        flags
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &b)| acc | (u32::from(b) << i))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStats {
    pub xp: i64,
    pub xp_low: i64,
    pub xp_high: i64,
    pub kamas: i64,
    pub bonus_points: i32,
    pub bonus_points_spell: i32,
    pub alignment: i32,
    pub fake_alignment: i32,
    pub alignment_level: i32,
    pub grade: i32,
    pub honor: i32,
    pub disgrace: i32,
    pub alignment_enabled: bool,
    pub lp: i32,
    pub lp_max: i32,
    pub energy: i32,
    pub energy_max: i32,
    pub initiative: i32,
    pub prospecting: i32,
    pub characteristics: BTreeMap<i32, Characteristic>,
}

/// Server-issued game-action envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameActions {
    /// No action could be produced for the request.
    Default,
    Movement {
        id: i32,
        sprite_id: i32,
        dir_and_cells: Vec<DirAndCell>,
    },
    LoadGameMap {
        sprite_id: i32,
        cinematic: i32,
    },
    Challenge {
        challenger_id: i32,
        challenged_id: i32,
    },
    ChallengeJoinError {
        challenger_id: i32,
        /// 'b': you are busy, 'o': opponent busy.
        reason: char,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgSvr {
    AksHelloGame,
    AksServerMessage { value: String },
    AksPong,
    AksQuickPong,
    BasicsAveragePing,
    BasicsNothing,
    BasicsDate { year: i32, month: u32, day: u32 },
    BasicsTime { unix_ms: i64 },
    InfosMessage {
        chat: InfosChat,
        messages: Vec<InfosMessageEntry>,
    },

    AccountQueue { position: i32 },
    AccountTicketResponseSuccess { key_id: i32 },
    AccountTicketResponseError,
    AccountLoginError { reason: char },
    AccountRegionalVersion { value: i32 },
    AccountCharactersListSuccess {
        subscription_ms: i64,
        characters_count: usize,
        characters: Vec<CharactersListCharacter>,
    },
    AccountCharacterNameGeneratedSuccess { name: String },
    AccountCharacterAddError { reason: char },
    AccountCharacterDeleteError,
    AccountCharacterSelectedSuccess {
        id: i32,
        name: String,
        level: i32,
        class_id: i32,
        sex: i32,
        gfx_id: i32,
        color1: String,
        color2: String,
        color3: String,
        items: Vec<SelectedCharacterItem>,
    },
    AccountNewLevel { level: i32 },
    AccountStats(Box<AccountStats>),
    AccountRestrictions { restrictions: Restrictions },

    SpecializationSet { value: i32 },

    ChatSubscribeChannel { add: bool, channels: Vec<char> },
    ChatMessageSuccess {
        channel: char,
        id: i32,
        name: String,
        message: String,
        params: String,
    },
    ChatServerMessage { message: String },

    SpellsList { spells: Vec<SpellEntry> },
    SpellsChangeOption { can_use_see_all_spell: bool },
    SpellsUpgradeSpellSuccess { id: i32, level: i32 },
    SpellsUpgradeSpellError,
    SpellsSpellForgetShow,
    SpellsSpellForgetClose,

    ItemsAddSuccess { items: Vec<SelectedCharacterItem> },
    ItemsRemove { id: i32 },
    ItemsQuantity { id: i32, quantity: i32 },
    ItemsMovement { id: i32, position: i32 },
    ItemsAddError { reason: char },
    ItemsWeight { current: i32, max: i32 },
    ItemsItemSetAdd {
        id: i32,
        item_template_ids: Vec<i32>,
        effects: Vec<Effect>,
    },
    ItemsItemSetRemove { id: i32 },
    ItemsAccessories { id: i32, accessories: Accessories },

    GameCreateSuccess { create_type: i32 },
    GameMapData { id: i32, name: String, key: String },
    GameMapLoaded,
    GameMovement { sprites: Vec<GameMovementSprite> },
    GameMovementRemove { id: i32 },
    GameActions(GameActions),
    FightsCount { value: i32 },
    TutorialShowTip { id: i32 },
    InfosLifeRestoreTimerStart { interval_s: u64 },
    FriendsNotifyChange { notify: bool },

    EmotesDirection { id: i32, dir: i32 },

    DialogCreateSuccess { npc_id: i32 },
    DialogQuestion { question: i32, answers: Vec<i32> },
    DialogLeave,

    ExchangeCreateSuccessNpcBuy {
        quantity1: i32,
        quantity2: i32,
        quantity3: i32,
        types: Vec<i32>,
        fee: i32,
        max_level: i32,
        max_per_account: i32,
        npc_template_id: i32,
        max_hours: i32,
    },
    ExchangeCreateSuccessPaddock { shed: Vec<MountData> },
    ExchangeLeaveSuccess,
    ExchangeBigStoreTypeItemsList {
        item_type: i32,
        item_template_ids: Vec<i32>,
    },
    ExchangeBigStoreItemsList {
        template_id: i32,
        items: Vec<BigStoreItem>,
    },
    ExchangeSearchSuccess,
    ExchangeSearchError,
    ExchangeBigStoreMiddlePrice { template_id: i32, price: i64 },
    ExchangeBuySuccess,
    ExchangeBuyError,
    ExchangeMountStorageAdd { data: MountData, new_born: bool },
    ExchangeMountStorageRemove { mount_id: i32 },

    MountEquipSuccess { data: MountData },
    MountEquipError { reason: char },
    MountUnequip,
    MountRidingState { riding: bool },
    MountXp { percent: i32 },
    MountName { name: String },
    MountData { data: MountData },
}

fn join_ints(ids: &[i32], sep: char) -> String {
    ids.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&sep.to_string())
}

fn check_text(s: &str, what: &'static str) -> Result<(), ProtoError> {
    if s.contains('\x00') || s.contains('|') || s.contains(';') {
        return Err(ProtoError::Malformed(what));
    }
    Ok(())
}

impl MsgSvr {
    pub fn id(&self) -> MsgSvrId {
        match self {
            MsgSvr::AksHelloGame => MsgSvrId::AksHelloGame,
            MsgSvr::AksServerMessage { .. } => MsgSvrId::AksServerMessage,
            MsgSvr::AksPong => MsgSvrId::AksPong,
            MsgSvr::AksQuickPong => MsgSvrId::AksQuickPong,
            MsgSvr::BasicsAveragePing => MsgSvrId::BasicsAveragePing,
            MsgSvr::BasicsNothing => MsgSvrId::BasicsNothing,
            MsgSvr::BasicsDate { .. } => MsgSvrId::BasicsDate,
            MsgSvr::BasicsTime { .. } => MsgSvrId::BasicsTime,
            MsgSvr::InfosMessage { .. } => MsgSvrId::InfosMessage,
            MsgSvr::AccountQueue { .. } => MsgSvrId::AccountQueue,
            MsgSvr::AccountTicketResponseSuccess { .. } => MsgSvrId::AccountTicketResponseSuccess,
            MsgSvr::AccountTicketResponseError => MsgSvrId::AccountTicketResponseError,
            MsgSvr::AccountLoginError { .. } => MsgSvrId::AccountLoginError,
            MsgSvr::AccountRegionalVersion { .. } => MsgSvrId::AccountRegionalVersion,
            MsgSvr::AccountCharactersListSuccess { .. } => MsgSvrId::AccountCharactersListSuccess,
            MsgSvr::AccountCharacterNameGeneratedSuccess { .. } => {
                MsgSvrId::AccountCharacterNameGeneratedSuccess
            }
            MsgSvr::AccountCharacterAddError { .. } => MsgSvrId::AccountCharacterAddError,
            MsgSvr::AccountCharacterDeleteError => MsgSvrId::AccountCharacterDeleteError,
            MsgSvr::AccountCharacterSelectedSuccess { .. } => {
                MsgSvrId::AccountCharacterSelectedSuccess
            }
            MsgSvr::AccountNewLevel { .. } => MsgSvrId::AccountNewLevel,
            MsgSvr::AccountStats(_) => MsgSvrId::AccountStats,
            MsgSvr::AccountRestrictions { .. } => MsgSvrId::AccountRestrictions,
            MsgSvr::SpecializationSet { .. } => MsgSvrId::SpecializationSet,
            MsgSvr::ChatSubscribeChannel { .. } => MsgSvrId::ChatSubscribeChannel,
            MsgSvr::ChatMessageSuccess { .. } => MsgSvrId::ChatMessageSuccess,
            MsgSvr::ChatServerMessage { .. } => MsgSvrId::ChatServerMessage,
            MsgSvr::SpellsList { .. } => MsgSvrId::SpellsList,
            MsgSvr::SpellsChangeOption { .. } => MsgSvrId::SpellsChangeOption,
            MsgSvr::SpellsUpgradeSpellSuccess { .. } => MsgSvrId::SpellsUpgradeSpellSuccess,
            MsgSvr::SpellsUpgradeSpellError => MsgSvrId::SpellsUpgradeSpellError,
            MsgSvr::SpellsSpellForgetShow => MsgSvrId::SpellsSpellForgetShow,
            MsgSvr::SpellsSpellForgetClose => MsgSvrId::SpellsSpellForgetClose,
            MsgSvr::ItemsAddSuccess { .. } => MsgSvrId::ItemsAddSuccess,
            MsgSvr::ItemsRemove { .. } => MsgSvrId::ItemsRemove,
            MsgSvr::ItemsQuantity { .. } => MsgSvrId::ItemsQuantity,
            MsgSvr::ItemsMovement { .. } => MsgSvrId::ItemsMovement,
            MsgSvr::ItemsAddError { .. } => MsgSvrId::ItemsAddError,
            MsgSvr::ItemsWeight { .. } => MsgSvrId::ItemsWeight,
            MsgSvr::ItemsItemSetAdd { .. } => MsgSvrId::ItemsItemSetAdd,
            MsgSvr::ItemsItemSetRemove { .. } => MsgSvrId::ItemsItemSetRemove,
            MsgSvr::ItemsAccessories { .. } => MsgSvrId::ItemsAccessories,
            MsgSvr::GameCreateSuccess { .. } => MsgSvrId::GameCreateSuccess,
            MsgSvr::GameMapData { .. } => MsgSvrId::GameMapData,
            MsgSvr::GameMapLoaded => MsgSvrId::GameMapLoaded,
            MsgSvr::GameMovement { .. } => MsgSvrId::GameMovement,
            MsgSvr::GameMovementRemove { .. } => MsgSvrId::GameMovementRemove,
            MsgSvr::GameActions(_) => MsgSvrId::GameActions,
            MsgSvr::FightsCount { .. } => MsgSvrId::FightsCount,
            MsgSvr::TutorialShowTip { .. } => MsgSvrId::TutorialShowTip,
            MsgSvr::InfosLifeRestoreTimerStart { .. } => MsgSvrId::InfosLifeRestoreTimerStart,
            MsgSvr::FriendsNotifyChange { .. } => MsgSvrId::FriendsNotifyChange,
            MsgSvr::EmotesDirection { .. } => MsgSvrId::EmotesDirection,
            MsgSvr::DialogCreateSuccess { .. } => MsgSvrId::DialogCreateSuccess,
            MsgSvr::DialogQuestion { .. } => MsgSvrId::DialogQuestion,
            MsgSvr::DialogLeave => MsgSvrId::DialogLeave,
            MsgSvr::ExchangeCreateSuccessNpcBuy { .. } => MsgSvrId::ExchangeCreateSuccess,
            MsgSvr::ExchangeCreateSuccessPaddock { .. } => MsgSvrId::ExchangeCreateSuccess,
            MsgSvr::ExchangeLeaveSuccess => MsgSvrId::ExchangeLeaveSuccess,
            MsgSvr::ExchangeBigStoreTypeItemsList { .. } => MsgSvrId::ExchangeBigStoreTypeItemsList,
            MsgSvr::ExchangeBigStoreItemsList { .. } => MsgSvrId::ExchangeBigStoreItemsList,
            MsgSvr::ExchangeSearchSuccess => MsgSvrId::ExchangeSearchSuccess,
            MsgSvr::ExchangeSearchError => MsgSvrId::ExchangeSearchError,
            MsgSvr::ExchangeBigStoreMiddlePrice { .. } => MsgSvrId::ExchangeBigStoreMiddlePrice,
            MsgSvr::ExchangeBuySuccess => MsgSvrId::ExchangeBuySuccess,
            MsgSvr::ExchangeBuyError => MsgSvrId::ExchangeBuyError,
            MsgSvr::ExchangeMountStorageAdd { .. } => MsgSvrId::ExchangeMountStorageAdd,
            MsgSvr::ExchangeMountStorageRemove { .. } => MsgSvrId::ExchangeMountStorageRemove,
            MsgSvr::MountEquipSuccess { .. } => MsgSvrId::MountEquipSuccess,
            MsgSvr::MountEquipError { .. } => MsgSvrId::MountEquipError,
            MsgSvr::MountUnequip => MsgSvrId::MountUnequip,
            MsgSvr::MountRidingState { .. } => MsgSvrId::MountRidingState,
            MsgSvr::MountXp { .. } => MsgSvrId::MountXp,
            MsgSvr::MountName { .. } => MsgSvrId::MountName,
            MsgSvr::MountData { .. } => MsgSvrId::MountData,
        }
    }

    /// Serialize the payload (without the id prefix).
    pub fn serialize(&self) -> Result<String, ProtoError> {
        let payload = match self {
            MsgSvr::AksHelloGame
            | MsgSvr::AksPong
            | MsgSvr::AksQuickPong
            | MsgSvr::BasicsAveragePing
            | MsgSvr::BasicsNothing
            | MsgSvr::AccountTicketResponseError
            | MsgSvr::AccountCharacterDeleteError
            | MsgSvr::SpellsUpgradeSpellError
            | MsgSvr::SpellsSpellForgetShow
            | MsgSvr::SpellsSpellForgetClose
            | MsgSvr::GameMapLoaded
            | MsgSvr::DialogLeave
            | MsgSvr::ExchangeLeaveSuccess
            | MsgSvr::ExchangeSearchSuccess
            | MsgSvr::ExchangeSearchError
            | MsgSvr::ExchangeBuySuccess
            | MsgSvr::ExchangeBuyError
            | MsgSvr::MountUnequip => String::new(),

            MsgSvr::AksServerMessage { value } => value.clone(),
            MsgSvr::BasicsDate { year, month, day } => format!("{year}|{month}|{day}"),
            MsgSvr::BasicsTime { unix_ms } => unix_ms.to_string(),
            MsgSvr::InfosMessage { chat, messages } => {
                let body = messages
                    .iter()
                    .map(InfosMessageEntry::encode)
                    .collect::<Vec<_>>()
                    .join("|");
                format!("{}{}", chat.as_char(), body)
            }

            MsgSvr::AccountQueue { position } => position.to_string(),
            MsgSvr::AccountTicketResponseSuccess { key_id } => key_id.to_string(),
            MsgSvr::AccountLoginError { reason } => reason.to_string(),
            MsgSvr::AccountRegionalVersion { value } => value.to_string(),
            MsgSvr::AccountCharactersListSuccess {
                subscription_ms,
                characters_count,
                characters,
            } => {
                let mut out = format!("{subscription_ms}|{characters_count}");
                for c in characters {
                    check_text(&c.name, "character name")?;
                    out.push('|');
                    out.push_str(&format!(
                        "{};{};{};{};{};{};{};{};{}",
                        c.id,
                        c.name,
                        c.level,
                        c.gfx_id,
                        c.color1,
                        c.color2,
                        c.color3,
                        c.accessories.encode(),
                        c.server_id,
                    ));
                }
                out
            }
            MsgSvr::AccountCharacterNameGeneratedSuccess { name } => name.clone(),
            MsgSvr::AccountCharacterAddError { reason } => reason.to_string(),
            MsgSvr::AccountCharacterSelectedSuccess {
                id,
                name,
                level,
                class_id,
                sex,
                gfx_id,
                color1,
                color2,
                color3,
                items,
            } => {
                check_text(name, "character name")?;
                let items = items
                    .iter()
                    .map(encode_item)
                    .collect::<Vec<_>>()
                    .join(";");
                format!(
                    "{id}|{name}|{level}|{class_id}|{sex}|{gfx_id}|{color1}|{color2}|{color3}|{items}"
                )
            }
            MsgSvr::AccountNewLevel { level } => level.to_string(),
            MsgSvr::AccountStats(stats) => {
                let chars = stats
                    .characteristics
                    .values()
                    .map(Characteristic::encode)
                    .collect::<Vec<_>>()
                    .join(";");
                format!(
                    "{},{},{}|{}|{}|{}|{},{},{},{},{},{},{}|{},{}|{},{}|{}|{}|{}",
                    stats.xp,
                    stats.xp_low,
                    stats.xp_high,
                    stats.kamas,
                    stats.bonus_points,
                    stats.bonus_points_spell,
                    stats.alignment,
                    stats.fake_alignment,
                    stats.alignment_level,
                    stats.grade,
                    stats.honor,
                    stats.disgrace,
                    u8::from(stats.alignment_enabled),
                    stats.lp,
                    stats.lp_max,
                    stats.energy,
                    stats.energy_max,
                    stats.initiative,
                    stats.prospecting,
                    chars,
                )
            }
            MsgSvr::AccountRestrictions { restrictions } => {
                format!("{:x}", restrictions.bits())
            }

            MsgSvr::SpecializationSet { value } => value.to_string(),

            MsgSvr::ChatSubscribeChannel { add, channels } => {
                let sign = if *add { '+' } else { '-' };
                format!("{sign}{}", channels.iter().collect::<String>())
            }
            MsgSvr::ChatMessageSuccess {
                channel,
                id,
                name,
                message,
                params,
            } => {
                check_text(name, "chat name")?;
                format!("{channel}|{id}|{name}|{message}|{params}")
            }
            MsgSvr::ChatServerMessage { message } => message.clone(),

            MsgSvr::SpellsList { spells } => spells
                .iter()
                .map(SpellEntry::encode)
                .collect::<Vec<_>>()
                .join(";"),
            MsgSvr::SpellsChangeOption {
                can_use_see_all_spell,
            } => u8::from(*can_use_see_all_spell).to_string(),
            MsgSvr::SpellsUpgradeSpellSuccess { id, level } => format!("{id}~{level}"),

            MsgSvr::ItemsAddSuccess { items } => items
                .iter()
                .map(encode_item)
                .collect::<Vec<_>>()
                .join(";"),
            MsgSvr::ItemsRemove { id } => id.to_string(),
            MsgSvr::ItemsQuantity { id, quantity } => format!("{id}|{quantity}"),
            MsgSvr::ItemsMovement { id, position } => format!("{id}|{position}"),
            MsgSvr::ItemsAddError { reason } => reason.to_string(),
            MsgSvr::ItemsWeight { current, max } => format!("{current}|{max}"),
            MsgSvr::ItemsItemSetAdd {
                id,
                item_template_ids,
                effects,
            } => format!(
                "+{id}|{}|{}",
                join_ints(item_template_ids, ','),
                encode_effects(effects)
            ),
            MsgSvr::ItemsItemSetRemove { id } => format!("-{id}"),
            MsgSvr::ItemsAccessories { id, accessories } => {
                format!("{id}|{}", accessories.encode())
            }

            MsgSvr::GameCreateSuccess { create_type } => format!("|{create_type}"),
            MsgSvr::GameMapData { id, name, key } => format!("|{id}|{name}|{key}"),
            MsgSvr::GameMovement { sprites } => {
                let body = sprites
                    .iter()
                    .map(GameMovementSprite::encode)
                    .collect::<Vec<_>>()
                    .join("|");
                format!("|+{body}")
            }
            MsgSvr::GameMovementRemove { id } => format!("|-{id}"),
            MsgSvr::GameActions(actions) => actions.encode(),
            MsgSvr::FightsCount { value } => value.to_string(),
            MsgSvr::TutorialShowTip { id } => id.to_string(),
            MsgSvr::InfosLifeRestoreTimerStart { interval_s } => interval_s.to_string(),
            MsgSvr::FriendsNotifyChange { notify } => {
                if *notify { "+" } else { "-" }.to_string()
            }

            MsgSvr::EmotesDirection { id, dir } => format!("{id}|{dir}"),

            MsgSvr::DialogCreateSuccess { npc_id } => npc_id.to_string(),
            MsgSvr::DialogQuestion { question, answers } => {
                format!("{question}|{}", join_ints(answers, ';'))
            }

            MsgSvr::ExchangeCreateSuccessNpcBuy {
                quantity1,
                quantity2,
                quantity3,
                types,
                fee,
                max_level,
                max_per_account,
                npc_template_id,
                max_hours,
            } => format!(
                "{}|{quantity1};{quantity2};{quantity3}|{}|{fee}|{max_level}|{max_per_account}|{npc_template_id}|{max_hours}",
                crate::typ::exchange::NPC_BUY,
                join_ints(types, ','),
            ),
            MsgSvr::ExchangeCreateSuccessPaddock { shed } => {
                let body = shed
                    .iter()
                    .map(MountData::encode)
                    .collect::<Vec<_>>()
                    .join("|");
                format!("{}|{body}", crate::typ::exchange::PADDOCK)
            }
            MsgSvr::ExchangeBigStoreTypeItemsList {
                item_type,
                item_template_ids,
            } => format!("{item_type}|{}", join_ints(item_template_ids, ';')),
            MsgSvr::ExchangeBigStoreItemsList { template_id, items } => {
                let body = items
                    .iter()
                    .map(|v| {
                        format!(
                            "{};{};{};{};{}",
                            v.id,
                            encode_effects(&v.effects),
                            v.price_set1,
                            v.price_set2,
                            v.price_set3,
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("|");
                format!("{template_id}|{body}")
            }
            MsgSvr::ExchangeBigStoreMiddlePrice { template_id, price } => {
                format!("{template_id}|{price}")
            }
            MsgSvr::ExchangeMountStorageAdd { data, new_born } => {
                format!("+{}|{}", u8::from(*new_born), data.encode())
            }
            MsgSvr::ExchangeMountStorageRemove { mount_id } => format!("-{mount_id}"),

            MsgSvr::MountEquipSuccess { data } => data.encode(),
            MsgSvr::MountEquipError { reason } => reason.to_string(),
            MsgSvr::MountRidingState { riding } => u8::from(*riding).to_string(),
            MsgSvr::MountXp { percent } => percent.to_string(),
            MsgSvr::MountName { name } => name.clone(),
            MsgSvr::MountData { data } => data.encode(),
        };
        Ok(payload)
    }

    /// The full packet: id + payload.
    pub fn packet(&self) -> Result<String, ProtoError> {
        Ok(format!("{}{}", self.id().as_str(), self.serialize()?))
    }
}

fn encode_item(item: &SelectedCharacterItem) -> String {
    format!(
        "{}~{}~{}~{}~{}",
        item.id,
        item.template_id,
        item.quantity,
        item.position,
        encode_effects(&item.effects),
    )
}

impl GameActions {
    fn encode(&self) -> String {
        match self {
            GameActions::Default => ";0".to_string(),
            GameActions::Movement {
                id,
                sprite_id,
                dir_and_cells,
            } => format!(
                "{id};{};{sprite_id};{}",
                crate::typ::game_action::MOVEMENT,
                crate::typ::encode_path(dir_and_cells),
            ),
            GameActions::LoadGameMap {
                sprite_id,
                cinematic,
            } => format!(";2;{sprite_id};{cinematic}"),
            GameActions::Challenge {
                challenger_id,
                challenged_id,
            } => format!(
                ";{};{challenger_id};{challenged_id}",
                crate::typ::game_action::CHALLENGE
            ),
            GameActions::ChallengeJoinError {
                challenger_id,
                reason,
            } => format!(
                ";{};{challenger_id};{reason}",
                crate::typ::game_action::CHALLENGE_ACCEPT
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_game_packet() {
        assert_eq!(MsgSvr::AksHelloGame.packet().unwrap(), "HG");
    }

    #[test]
    fn server_message_packet() {
        let msg = MsgSvr::AksServerMessage {
            value: "01".into(),
        };
        assert_eq!(msg.packet().unwrap(), "M01");
    }

    #[test]
    fn infos_message_packet() {
        let msg = MsgSvr::InfosMessage {
            chat: InfosChat::Error,
            messages: vec![InfosMessageEntry::with_args(
                16,
                vec!["<b>Error</b>".into(), "Not implemented.".into()],
            )],
        };
        assert_eq!(msg.packet().unwrap(), "Ime16;<b>Error</b>,Not implemented.");
    }

    #[test]
    fn movement_action_packet() {
        let msg = MsgSvr::GameActions(GameActions::Movement {
            id: 0,
            sprite_id: 42,
            dir_and_cells: vec![
                DirAndCell { dir: 0, cell: 100 },
                DirAndCell { dir: 3, cell: 109 },
            ],
        });
        assert_eq!(msg.packet().unwrap(), "GA0;1;42;0,100;3,109");
    }

    #[test]
    fn stats_characteristics_are_sorted() {
        let mut characteristics = BTreeMap::new();
        for &id in &[50, 1, 11] {
            characteristics.insert(
                id,
                Characteristic {
                    id,
                    base: 1,
                    ..Default::default()
                },
            );
        }
        let msg = MsgSvr::AccountStats(Box::new(AccountStats {
            xp: 0,
            xp_low: 0,
            xp_high: 110,
            kamas: 100,
            bonus_points: 0,
            bonus_points_spell: 0,
            alignment: 0,
            fake_alignment: 0,
            alignment_level: 0,
            grade: 1,
            honor: 0,
            disgrace: 0,
            alignment_enabled: false,
            lp: 155,
            lp_max: 155,
            energy: 10000,
            energy_max: 10000,
            initiative: 1,
            prospecting: 100,
            characteristics,
        }));
        let payload = msg.serialize().unwrap();
        let chars = payload.rsplit('|').next().unwrap();
        assert_eq!(chars, "1:1,0,0,0;11:1,0,0,0;50:1,0,0,0");
    }

    #[test]
    fn serialization_refuses_separator_in_name() {
        let msg = MsgSvr::ChatMessageSuccess {
            channel: '*',
            id: 1,
            name: "bad|name".into(),
            message: "hi".into(),
            params: String::new(),
        };
        assert!(msg.serialize().is_err());
    }
}
