//! Client messages: payload decoding per message id.

use crate::id::MsgCliId;
use crate::typ::{decode_path, DirAndCell};
use crate::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgCli {
    AccountQueuePosition,
    AksPing,
    AksQuickPing,
    BasicsRequestAveragePing,
    BasicsGetDate,
    InfosSendScreenInfo {
        screen: String,
    },

    AccountSendTicket {
        ticket: String,
    },
    AccountUseKey {
        id: i32,
    },
    AccountRequestRegionalVersion,
    AccountGetGifts,
    AccountSendIdentity {
        identity: String,
    },
    AccountGetCharacters,
    AccountGetCharactersForced,
    AccountGetRandomCharacterName,
    AccountSetCharacter {
        id: i32,
    },
    AccountAddCharacter {
        name: String,
        class_id: i32,
        sex: i32,
        color1: String,
        color2: String,
        color3: String,
    },
    AccountDeleteCharacter {
        id: i32,
        secret_answer: String,
    },
    AccountBoost {
        characteristic_id: i32,
    },

    GameCreate {
        create_type: i32,
    },
    GameGetExtraInformations,
    GameActionsSendActions(GameActionCli),
    GameActionAck {
        id: i32,
    },
    GameActionCancel {
        id: i32,
        params: String,
    },

    ChatRequestSubscribeChannel {
        add: bool,
        channels: Vec<char>,
    },
    ChatSend {
        channel: char,
        message: String,
        params: String,
    },

    DialogCreate {
        npc_id: i32,
    },
    DialogRequestLeave,
    DialogResponse {
        question: i32,
        answer: i32,
    },

    ExchangeRequest {
        exchange_type: i32,
        id: i32,
    },
    ExchangeLeave,
    ExchangeBigStoreType {
        item_type: i32,
    },
    ExchangeBigStoreItemList {
        template_id: i32,
    },
    ExchangeBigStoreSearch {
        item_type: i32,
        template_id: i32,
    },
    ExchangeGetItemMiddlePrice {
        template_id: i32,
    },
    ExchangeBigStoreBuy {
        item_id: i32,
        quantity: i32,
    },
    ExchangePutInShedFromCertificate {
        certificate_id: i32,
    },
    ExchangePutInShedFromInventory {
        mount_id: i32,
    },
    ExchangePutInCertificateFromShed {
        mount_id: i32,
    },
    ExchangePutInInventoryFromShed {
        mount_id: i32,
    },

    ItemsDestroy {
        id: i32,
        quantity: i32,
    },
    ItemsDrop {
        id: i32,
        quantity: i32,
    },
    ItemsRequestMovement {
        id: i32,
        position: i32,
        quantity: i32,
    },
    ItemsUseNoConfirm {
        id: i32,
        sprite_id: i32,
        cell: i32,
    },

    SpellsBoost {
        id: i32,
    },
    SpellsForget {
        id: i32,
    },
    SpellsMoveToUsed {
        id: i32,
        position: i32,
    },

    EmotesSetDirection {
        dir: i32,
    },

    MountRequestData {
        id: i32,
        validity_ms: i64,
    },
    MountRename {
        name: String,
    },
    MountFree,
    MountRide,
}

/// The client half of a game-action request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameActionCli {
    Movement { legs: Vec<DirAndCell> },
    Challenge { challenged_id: i32 },
    ChallengeAccept { challenger_id: i32 },
    ChallengeRefuse { challenger_id: i32 },
}

fn int(s: &str) -> Result<i32, ProtoError> {
    s.parse().map_err(|_| ProtoError::BadNumber)
}

fn long(s: &str) -> Result<i64, ProtoError> {
    s.parse().map_err(|_| ProtoError::BadNumber)
}

fn split2(s: &str, what: &'static str) -> Result<(String, String), ProtoError> {
    let (a, b) = s.split_once('|').ok_or(ProtoError::Malformed(what))?;
    Ok((a.to_string(), b.to_string()))
}

impl MsgCli {
    /// Decode the payload for a resolved message id.
    pub fn decode(id: MsgCliId, payload: &str) -> Result<MsgCli, ProtoError> {
        let msg = match id {
            MsgCliId::AccountQueuePosition => MsgCli::AccountQueuePosition,
            MsgCliId::AksPing => MsgCli::AksPing,
            MsgCliId::AksQuickPing => MsgCli::AksQuickPing,
            MsgCliId::BasicsRequestAveragePing => MsgCli::BasicsRequestAveragePing,
            MsgCliId::BasicsGetDate => MsgCli::BasicsGetDate,
            MsgCliId::InfosSendScreenInfo => MsgCli::InfosSendScreenInfo {
                screen: payload.to_string(),
            },

            MsgCliId::AccountSendTicket => {
                if payload.is_empty() {
                    return Err(ProtoError::Malformed("empty ticket"));
                }
                MsgCli::AccountSendTicket {
                    ticket: payload.to_string(),
                }
            }
            MsgCliId::AccountUseKey => MsgCli::AccountUseKey { id: int(payload)? },
            MsgCliId::AccountRequestRegionalVersion => MsgCli::AccountRequestRegionalVersion,
            MsgCliId::AccountGetGifts => MsgCli::AccountGetGifts,
            MsgCliId::AccountSendIdentity => MsgCli::AccountSendIdentity {
                identity: payload.to_string(),
            },
            MsgCliId::AccountGetCharacters => MsgCli::AccountGetCharacters,
            MsgCliId::AccountGetCharactersForced => MsgCli::AccountGetCharactersForced,
            MsgCliId::AccountGetRandomCharacterName => MsgCli::AccountGetRandomCharacterName,
            MsgCliId::AccountSetCharacter => MsgCli::AccountSetCharacter { id: int(payload)? },
            MsgCliId::AccountAddCharacter => {
                let parts: Vec<&str> = payload.split('|').collect();
                if parts.len() != 6 {
                    return Err(ProtoError::Malformed("add character"));
                }
                let name = parts[0].to_string();
                let class_id = int(parts[1])?;
                let sex = int(parts[2])?;
                let color1 = parts[3].to_string();
                let color2 = parts[4].to_string();
                let color3 = parts[5].to_string();
                MsgCli::AccountAddCharacter {
                    name,
                    class_id,
                    sex,
                    color1,
                    color2,
                    color3,
                }
            }
            MsgCliId::AccountDeleteCharacter => {
                let (id, answer) = payload
                    .split_once('|')
                    .map(|(a, b)| (a, b.to_string()))
                    .unwrap_or((payload, String::new()));
                MsgCli::AccountDeleteCharacter {
                    id: int(id)?,
                    secret_answer: answer,
                }
            }
            MsgCliId::AccountBoost => MsgCli::AccountBoost {
                characteristic_id: int(payload)?,
            },

            MsgCliId::GameCreate => MsgCli::GameCreate {
                create_type: int(payload)?,
            },
            MsgCliId::GameGetExtraInformations => MsgCli::GameGetExtraInformations,
            MsgCliId::GameActionsSendActions => {
                MsgCli::GameActionsSendActions(GameActionCli::decode(payload)?)
            }
            MsgCliId::GameActionAck => MsgCli::GameActionAck { id: int(payload)? },
            MsgCliId::GameActionCancel => {
                let (id, params) = split2(payload, "action cancel")?;
                MsgCli::GameActionCancel {
                    id: int(&id)?,
                    params,
                }
            }

            MsgCliId::ChatRequestSubscribeChannel => {
                let mut chars = payload.chars();
                let add = match chars.next() {
                    Some('+') => true,
                    Some('-') => false,
                    _ => return Err(ProtoError::Malformed("subscribe sign")),
                };
                MsgCli::ChatRequestSubscribeChannel {
                    add,
                    channels: chars.collect(),
                }
            }
            MsgCliId::ChatSend => {
                let mut chars = payload.chars();
                let channel = chars.next().ok_or(ProtoError::Malformed("chat channel"))?;
                let rest: String = chars.collect();
                let rest = rest
                    .strip_prefix('|')
                    .ok_or(ProtoError::Malformed("chat separator"))?;
                let (message, params) = rest
                    .split_once('|')
                    .map(|(m, p)| (m.to_string(), p.to_string()))
                    .unwrap_or((rest.to_string(), String::new()));
                MsgCli::ChatSend {
                    channel,
                    message,
                    params,
                }
            }

            MsgCliId::DialogCreate => MsgCli::DialogCreate {
                npc_id: int(payload)?,
            },
            MsgCliId::DialogRequestLeave => MsgCli::DialogRequestLeave,
            MsgCliId::DialogResponse => {
                let (question, answer) = split2(payload, "dialog response")?;
                MsgCli::DialogResponse {
                    question: int(&question)?,
                    answer: int(&answer)?,
                }
            }

            MsgCliId::ExchangeRequest => {
                let (t, id) = split2(payload, "exchange request")?;
                MsgCli::ExchangeRequest {
                    exchange_type: int(&t)?,
                    id: int(&id)?,
                }
            }
            MsgCliId::ExchangeLeave => MsgCli::ExchangeLeave,
            MsgCliId::ExchangeBigStoreType => MsgCli::ExchangeBigStoreType {
                item_type: int(payload)?,
            },
            MsgCliId::ExchangeBigStoreItemList => MsgCli::ExchangeBigStoreItemList {
                template_id: int(payload)?,
            },
            MsgCliId::ExchangeBigStoreSearch => {
                let (t, template) = split2(payload, "store search")?;
                MsgCli::ExchangeBigStoreSearch {
                    item_type: int(&t)?,
                    template_id: int(&template)?,
                }
            }
            MsgCliId::ExchangeGetItemMiddlePrice => MsgCli::ExchangeGetItemMiddlePrice {
                template_id: int(payload)?,
            },
            MsgCliId::ExchangeBigStoreBuy => {
                let (id, qty) = split2(payload, "store buy")?;
                MsgCli::ExchangeBigStoreBuy {
                    item_id: int(&id)?,
                    quantity: int(&qty)?,
                }
            }
            MsgCliId::ExchangePutInShedFromCertificate => MsgCli::ExchangePutInShedFromCertificate {
                certificate_id: int(payload)?,
            },
            MsgCliId::ExchangePutInShedFromInventory => MsgCli::ExchangePutInShedFromInventory {
                mount_id: int(payload)?,
            },
            MsgCliId::ExchangePutInCertificateFromShed => MsgCli::ExchangePutInCertificateFromShed {
                mount_id: int(payload)?,
            },
            MsgCliId::ExchangePutInInventoryFromShed => MsgCli::ExchangePutInInventoryFromShed {
                mount_id: int(payload)?,
            },

            MsgCliId::ItemsDestroy => {
                let (id, qty) = split2(payload, "items destroy")?;
                MsgCli::ItemsDestroy {
                    id: int(&id)?,
                    quantity: int(&qty)?,
                }
            }
            MsgCliId::ItemsDrop => {
                let (id, qty) = split2(payload, "items drop")?;
                MsgCli::ItemsDrop {
                    id: int(&id)?,
                    quantity: int(&qty)?,
                }
            }
            MsgCliId::ItemsRequestMovement => {
                let parts: Vec<&str> = payload.split('|').collect();
                if parts.len() != 3 {
                    return Err(ProtoError::Malformed("items movement"));
                }
                let id = int(parts[0])?;
                let position = int(parts[1])?;
                let quantity = int(parts[2])?;
                MsgCli::ItemsRequestMovement {
                    id,
                    position,
                    quantity,
                }
            }
            MsgCliId::ItemsUseNoConfirm => {
                let mut parts = payload.split('|');
                let id = int(parts.next().ok_or(ProtoError::Malformed("items use"))?)?;
                let sprite_id = parts.next().map(int).transpose()?.unwrap_or(0);
                let cell = parts.next().map(int).transpose()?.unwrap_or(0);
                MsgCli::ItemsUseNoConfirm {
                    id,
                    sprite_id,
                    cell,
                }
            }

            MsgCliId::SpellsBoost => MsgCli::SpellsBoost { id: int(payload)? },
            MsgCliId::SpellsForget => MsgCli::SpellsForget { id: int(payload)? },
            MsgCliId::SpellsMoveToUsed => {
                let (id, position) = split2(payload, "spells move")?;
                MsgCli::SpellsMoveToUsed {
                    id: int(&id)?,
                    position: int(&position)?,
                }
            }

            MsgCliId::EmotesSetDirection => MsgCli::EmotesSetDirection { dir: int(payload)? },

            MsgCliId::MountRequestData => {
                let (id, validity) = split2(payload, "mount data")?;
                MsgCli::MountRequestData {
                    id: int(&id)?,
                    validity_ms: long(&validity)?,
                }
            }
            MsgCliId::MountRename => MsgCli::MountRename {
                name: payload.to_string(),
            },
            MsgCliId::MountFree => MsgCli::MountFree,
            MsgCliId::MountRide => MsgCli::MountRide,
        };
        Ok(msg)
    }
}

impl GameActionCli {
    fn decode(payload: &str) -> Result<Self, ProtoError> {
        let (action_type, args) = payload
            .split_once(';')
            .unwrap_or((payload, ""));
        let action_type = int(action_type)?;
        match action_type {
            crate::typ::game_action::MOVEMENT => Ok(GameActionCli::Movement {
                legs: decode_path(args)?,
            }),
            crate::typ::game_action::CHALLENGE => Ok(GameActionCli::Challenge {
                challenged_id: int(args)?,
            }),
            crate::typ::game_action::CHALLENGE_ACCEPT => Ok(GameActionCli::ChallengeAccept {
                challenger_id: int(args)?,
            }),
            crate::typ::game_action::CHALLENGE_REFUSE => Ok(GameActionCli::ChallengeRefuse {
                challenger_id: int(args)?,
            }),
            _ => Err(ProtoError::Malformed("unknown game action type")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_add_character() {
        let msg = MsgCli::decode(MsgCliId::AccountAddCharacter, "Toto|8|0|111111|222222|333333")
            .unwrap();
        assert_eq!(
            msg,
            MsgCli::AccountAddCharacter {
                name: "Toto".into(),
                class_id: 8,
                sex: 0,
                color1: "111111".into(),
                color2: "222222".into(),
                color3: "333333".into(),
            }
        );
    }

    #[test]
    fn decodes_movement_action() {
        let msg = MsgCli::decode(MsgCliId::GameActionsSendActions, "1;3,109;3,118").unwrap();
        let MsgCli::GameActionsSendActions(GameActionCli::Movement { legs }) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0], DirAndCell { dir: 3, cell: 109 });
    }

    #[test]
    fn decodes_chat_subscribe_sign() {
        let msg = MsgCli::decode(MsgCliId::ChatRequestSubscribeChannel, "+i*").unwrap();
        assert_eq!(
            msg,
            MsgCli::ChatRequestSubscribeChannel {
                add: true,
                channels: vec!['i', '*'],
            }
        );
        assert!(MsgCli::decode(MsgCliId::ChatRequestSubscribeChannel, "i").is_err());
    }

    #[test]
    fn decodes_chat_send_with_params() {
        let msg = MsgCli::decode(MsgCliId::ChatSend, "*|hello world|x").unwrap();
        assert_eq!(
            msg,
            MsgCli::ChatSend {
                channel: '*',
                message: "hello world".into(),
                params: "x".into(),
            }
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        assert_eq!(
            MsgCli::decode(MsgCliId::AccountUseKey, "abc"),
            Err(ProtoError::BadNumber)
        );
        assert_eq!(
            MsgCli::decode(MsgCliId::ItemsDestroy, "12"),
            Err(ProtoError::Malformed("items destroy"))
        );
    }
}
