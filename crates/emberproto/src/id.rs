//! Message-id tables.
//!
//! Client ids are matched against the first 2 or 3 characters of a packet,
//! longest id first, so a 3-char id shadows a 2-char prefix (`ALF` vs `AL`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgCliId {
    AccountQueuePosition,
    AksPing,
    AksQuickPing,
    BasicsRequestAveragePing,
    BasicsGetDate,
    InfosSendScreenInfo,

    AccountSendTicket,
    AccountUseKey,
    AccountRequestRegionalVersion,
    AccountGetGifts,
    AccountSendIdentity,
    AccountGetCharacters,
    AccountGetCharactersForced,
    AccountGetRandomCharacterName,
    AccountSetCharacter,
    AccountAddCharacter,
    AccountDeleteCharacter,
    AccountBoost,

    GameCreate,
    GameGetExtraInformations,
    GameActionsSendActions,
    GameActionAck,
    GameActionCancel,

    ChatRequestSubscribeChannel,
    ChatSend,

    DialogCreate,
    DialogRequestLeave,
    DialogResponse,

    ExchangeRequest,
    ExchangeLeave,
    ExchangeBigStoreType,
    ExchangeBigStoreItemList,
    ExchangeBigStoreSearch,
    ExchangeGetItemMiddlePrice,
    ExchangeBigStoreBuy,
    ExchangePutInShedFromCertificate,
    ExchangePutInShedFromInventory,
    ExchangePutInCertificateFromShed,
    ExchangePutInInventoryFromShed,

    ItemsDestroy,
    ItemsDrop,
    ItemsRequestMovement,
    ItemsUseNoConfirm,

    SpellsBoost,
    SpellsForget,
    SpellsMoveToUsed,

    EmotesSetDirection,

    MountRequestData,
    MountRename,
    MountFree,
    MountRide,
}

const CLI_IDS: &[(&str, MsgCliId)] = &[
    // 3-char ids first: matching must prefer the longest id.
    ("ALF", MsgCliId::AccountGetCharactersForced),
    ("GKK", MsgCliId::GameActionAck),
    ("GKE", MsgCliId::GameActionCancel),
    ("EBT", MsgCliId::ExchangeBigStoreType),
    ("EBL", MsgCliId::ExchangeBigStoreItemList),
    ("EBS", MsgCliId::ExchangeBigStoreSearch),
    ("EBM", MsgCliId::ExchangeGetItemMiddlePrice),
    ("EBB", MsgCliId::ExchangeBigStoreBuy),
    ("EPC", MsgCliId::ExchangePutInShedFromCertificate),
    ("EPI", MsgCliId::ExchangePutInShedFromInventory),
    ("ECS", MsgCliId::ExchangePutInCertificateFromShed),
    ("EIS", MsgCliId::ExchangePutInInventoryFromShed),
    ("AT", MsgCliId::AccountSendTicket),
    ("Ak", MsgCliId::AccountUseKey),
    ("AV", MsgCliId::AccountRequestRegionalVersion),
    ("Ag", MsgCliId::AccountGetGifts),
    ("Ai", MsgCliId::AccountSendIdentity),
    ("AL", MsgCliId::AccountGetCharacters),
    ("AP", MsgCliId::AccountGetRandomCharacterName),
    ("AS", MsgCliId::AccountSetCharacter),
    ("AA", MsgCliId::AccountAddCharacter),
    ("AD", MsgCliId::AccountDeleteCharacter),
    ("AB", MsgCliId::AccountBoost),
    ("Af", MsgCliId::AccountQueuePosition),
    ("GC", MsgCliId::GameCreate),
    ("GI", MsgCliId::GameGetExtraInformations),
    ("GA", MsgCliId::GameActionsSendActions),
    ("BD", MsgCliId::BasicsGetDate),
    ("BM", MsgCliId::ChatSend),
    ("BA", MsgCliId::BasicsRequestAveragePing),
    ("cC", MsgCliId::ChatRequestSubscribeChannel),
    ("DC", MsgCliId::DialogCreate),
    ("DV", MsgCliId::DialogRequestLeave),
    ("DR", MsgCliId::DialogResponse),
    ("ER", MsgCliId::ExchangeRequest),
    ("EV", MsgCliId::ExchangeLeave),
    ("Od", MsgCliId::ItemsDestroy),
    ("Oj", MsgCliId::ItemsDrop),
    ("OM", MsgCliId::ItemsRequestMovement),
    ("OU", MsgCliId::ItemsUseNoConfirm),
    ("SB", MsgCliId::SpellsBoost),
    ("SF", MsgCliId::SpellsForget),
    ("SM", MsgCliId::SpellsMoveToUsed),
    ("eD", MsgCliId::EmotesSetDirection),
    ("Rd", MsgCliId::MountRequestData),
    ("Rn", MsgCliId::MountRename),
    ("Rf", MsgCliId::MountFree),
    ("Rr", MsgCliId::MountRide),
    ("PG", MsgCliId::AksPing),
    ("QP", MsgCliId::AksQuickPing),
    ("Ir", MsgCliId::InfosSendScreenInfo),
];

impl MsgCliId {
    /// Resolve the message id at the head of `pkt` and return it with the
    /// remaining payload. `None` for an unknown id.
    pub fn from_packet(pkt: &str) -> Option<(MsgCliId, &str)> {
        for (prefix, id) in CLI_IDS.iter().filter(|(p, _)| p.len() == 3) {
            if let Some(payload) = pkt.strip_prefix(prefix) {
                return Some((*id, payload));
            }
        }
        for (prefix, id) in CLI_IDS.iter().filter(|(p, _)| p.len() == 2) {
            if let Some(payload) = pkt.strip_prefix(prefix) {
                return Some((*id, payload));
            }
        }
        None
    }

    pub fn as_str(self) -> &'static str {
        CLI_IDS
            .iter()
            .find(|(_, id)| *id == self)
            .map(|(p, _)| *p)
            .unwrap_or("??")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgSvrId {
    AksHelloGame,
    AksServerMessage,
    AksPong,
    AksQuickPong,
    BasicsAveragePing,
    BasicsNothing,
    BasicsDate,
    BasicsTime,
    InfosMessage,

    AccountQueue,
    AccountTicketResponseSuccess,
    AccountTicketResponseError,
    AccountLoginError,
    AccountRegionalVersion,
    AccountCharactersListSuccess,
    AccountCharacterNameGeneratedSuccess,
    AccountCharacterAddError,
    AccountCharacterDeleteError,
    AccountCharacterSelectedSuccess,
    AccountNewLevel,
    AccountStats,
    AccountRestrictions,

    SpecializationSet,

    ChatSubscribeChannel,
    ChatMessageSuccess,
    ChatServerMessage,

    SpellsList,
    SpellsChangeOption,
    SpellsUpgradeSpellSuccess,
    SpellsUpgradeSpellError,
    SpellsSpellForgetShow,
    SpellsSpellForgetClose,

    ItemsAddSuccess,
    ItemsRemove,
    ItemsQuantity,
    ItemsMovement,
    ItemsAddError,
    ItemsWeight,
    ItemsItemSetAdd,
    ItemsItemSetRemove,
    ItemsAccessories,

    GameCreateSuccess,
    GameMapData,
    GameMapLoaded,
    GameMovement,
    GameMovementRemove,
    GameActions,
    FightsCount,
    TutorialShowTip,
    InfosLifeRestoreTimerStart,
    FriendsNotifyChange,

    EmotesDirection,

    DialogCreateSuccess,
    DialogQuestion,
    DialogLeave,

    ExchangeCreateSuccess,
    ExchangeLeaveSuccess,
    ExchangeBigStoreTypeItemsList,
    ExchangeBigStoreItemsList,
    ExchangeSearchSuccess,
    ExchangeSearchError,
    ExchangeBigStoreMiddlePrice,
    ExchangeBuySuccess,
    ExchangeBuyError,
    ExchangeMountStorageAdd,
    ExchangeMountStorageRemove,

    MountEquipSuccess,
    MountEquipError,
    MountUnequip,
    MountRidingState,
    MountXp,
    MountName,
    MountData,
}

impl MsgSvrId {
    pub fn as_str(self) -> &'static str {
        match self {
            MsgSvrId::AksHelloGame => "HG",
            MsgSvrId::AksServerMessage => "M",
            MsgSvrId::AksPong => "PGK",
            MsgSvrId::AksQuickPong => "QPK",
            MsgSvrId::BasicsAveragePing => "BAK",
            MsgSvrId::BasicsNothing => "BN",
            MsgSvrId::BasicsDate => "BDK",
            MsgSvrId::BasicsTime => "BT",
            MsgSvrId::InfosMessage => "Im",
            MsgSvrId::AccountQueue => "Af",
            MsgSvrId::AccountTicketResponseSuccess => "ATK",
            MsgSvrId::AccountTicketResponseError => "ATE",
            MsgSvrId::AccountLoginError => "AlE",
            MsgSvrId::AccountRegionalVersion => "AVK",
            MsgSvrId::AccountCharactersListSuccess => "ALK",
            MsgSvrId::AccountCharacterNameGeneratedSuccess => "APK",
            MsgSvrId::AccountCharacterAddError => "AAE",
            MsgSvrId::AccountCharacterDeleteError => "ADE",
            MsgSvrId::AccountCharacterSelectedSuccess => "ASK",
            MsgSvrId::AccountNewLevel => "AN",
            MsgSvrId::AccountStats => "As",
            MsgSvrId::AccountRestrictions => "AR",
            MsgSvrId::SpecializationSet => "Sp",
            MsgSvrId::ChatSubscribeChannel => "cC",
            MsgSvrId::ChatMessageSuccess => "cMK",
            MsgSvrId::ChatServerMessage => "cS",
            MsgSvrId::SpellsList => "SL",
            MsgSvrId::SpellsChangeOption => "SO",
            MsgSvrId::SpellsUpgradeSpellSuccess => "SUK",
            MsgSvrId::SpellsUpgradeSpellError => "SUE",
            MsgSvrId::SpellsSpellForgetShow => "SFS",
            MsgSvrId::SpellsSpellForgetClose => "SFC",
            MsgSvrId::ItemsAddSuccess => "OA",
            MsgSvrId::ItemsRemove => "OR",
            MsgSvrId::ItemsQuantity => "OQ",
            MsgSvrId::ItemsMovement => "OMK",
            MsgSvrId::ItemsAddError => "OAE",
            MsgSvrId::ItemsWeight => "Ow",
            MsgSvrId::ItemsItemSetAdd => "Oi",
            MsgSvrId::ItemsItemSetRemove => "Oj",
            MsgSvrId::ItemsAccessories => "Oa",
            MsgSvrId::GameCreateSuccess => "GCK",
            MsgSvrId::GameMapData => "GDM",
            MsgSvrId::GameMapLoaded => "GDK",
            MsgSvrId::GameMovement => "GM",
            MsgSvrId::GameMovementRemove => "GMR",
            MsgSvrId::GameActions => "GA",
            MsgSvrId::FightsCount => "Gf",
            MsgSvrId::TutorialShowTip => "TS",
            MsgSvrId::InfosLifeRestoreTimerStart => "ILF",
            MsgSvrId::FriendsNotifyChange => "FN",
            MsgSvrId::EmotesDirection => "eDK",
            MsgSvrId::DialogCreateSuccess => "DCK",
            MsgSvrId::DialogQuestion => "DQ",
            MsgSvrId::DialogLeave => "DV",
            MsgSvrId::ExchangeCreateSuccess => "ECK",
            MsgSvrId::ExchangeLeaveSuccess => "EVK",
            MsgSvrId::ExchangeBigStoreTypeItemsList => "ETL",
            MsgSvrId::ExchangeBigStoreItemsList => "EIL",
            MsgSvrId::ExchangeSearchSuccess => "ESK",
            MsgSvrId::ExchangeSearchError => "ESE",
            MsgSvrId::ExchangeBigStoreMiddlePrice => "EMP",
            MsgSvrId::ExchangeBuySuccess => "EBK",
            MsgSvrId::ExchangeBuyError => "EBE",
            MsgSvrId::ExchangeMountStorageAdd => "EMA",
            MsgSvrId::ExchangeMountStorageRemove => "EMR",
            MsgSvrId::MountEquipSuccess => "RK",
            MsgSvrId::MountEquipError => "RE",
            MsgSvrId::MountUnequip => "RU",
            MsgSvrId::MountRidingState => "Rg",
            MsgSvrId::MountXp => "Rx",
            MsgSvrId::MountName => "RN",
            MsgSvrId::MountData => "RD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_two_char_ids() {
        let (id, payload) = MsgCliId::from_packet("AT0123abc").unwrap();
        assert_eq!(id, MsgCliId::AccountSendTicket);
        assert_eq!(payload, "0123abc");
    }

    #[test]
    fn three_char_id_shadows_two_char_prefix() {
        let (id, payload) = MsgCliId::from_packet("ALF").unwrap();
        assert_eq!(id, MsgCliId::AccountGetCharactersForced);
        assert_eq!(payload, "");

        let (id, _) = MsgCliId::from_packet("AL").unwrap();
        assert_eq!(id, MsgCliId::AccountGetCharacters);

        let (id, payload) = MsgCliId::from_packet("GKK0").unwrap();
        assert_eq!(id, MsgCliId::GameActionAck);
        assert_eq!(payload, "0");
    }

    #[test]
    fn unknown_id_is_none() {
        assert!(MsgCliId::from_packet("ZZtop").is_none());
        assert!(MsgCliId::from_packet("").is_none());
    }

    #[test]
    fn cli_ids_are_unique() {
        for (i, (a, _)) in CLI_IDS.iter().enumerate() {
            for (b, _) in CLI_IDS.iter().skip(i + 1) {
                assert_ne!(a, b, "duplicate id {a}");
            }
        }
    }
}
