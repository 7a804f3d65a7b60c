//! Per-connection session: phase machine, rate limiting, dispatch.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use emberproto::id::MsgCliId;
use emberproto::msgcli::MsgCli;
use emberproto::msgsvr::MsgSvr;
use emberproto::typ::{DirAndCell, InfosChat, InfosMessageEntry};
use futures_util::FutureExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::{SessionError, SessionResult};
use crate::model::Market;
use crate::server::{Server, SessionId};

const HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Packets per second a client may push, with a burst of one.
const RATE_LIMIT_PER_SECOND: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Phase {
    ExpectingSendTicket = 0,
    ExpectingUseKey = 1,
    ExpectingRequestRegionalVersion = 2,
    ExpectingGetGifts = 3,
    /// Listed for completeness; gating folds it into `ExpectingSetCharacter`.
    ExpectingSendIdentity = 4,
    ExpectingSetCharacter = 5,
    ExpectingGameCreate = 6,
    Idle = 7,
}

impl Phase {
    fn from_u32(v: u32) -> Phase {
        match v {
            0 => Phase::ExpectingSendTicket,
            1 => Phase::ExpectingUseKey,
            2 => Phase::ExpectingRequestRegionalVersion,
            3 => Phase::ExpectingGetGifts,
            4 => Phase::ExpectingSendIdentity,
            5 => Phase::ExpectingSetCharacter,
            6 => Phase::ExpectingGameCreate,
            _ => Phase::Idle,
        }
    }
}

/// The slice of session state other tasks may look at: the phase and busy
/// counter are atomics because peer sessions read them, and the kick handle
/// lets a duplicate login close this connection.
#[derive(Debug)]
pub struct SessionShared {
    phase: AtomicU32,
    busy: AtomicU32,
    kick: Notify,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            phase: AtomicU32::new(Phase::ExpectingSendTicket as u32),
            busy: AtomicU32::new(0),
            kick: Notify::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u32(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u32, Ordering::Release);
    }

    pub fn busy(&self) -> u32 {
        self.busy.load(Ordering::Acquire)
    }

    pub fn inc_busy(&self) {
        self.busy.fetch_add(1, Ordering::AcqRel);
    }

    pub fn dec_busy(&self) {
        self.busy.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn kick(&self) {
        self.kick.notify_one();
    }

    pub async fn kicked(&self) {
        self.kick.notified().await;
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Token-bucket with burst 1: each packet must be at least one interval
/// after the previous one.
struct Limiter {
    interval: Duration,
    next: Instant,
}

impl Limiter {
    fn new(per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / per_second,
            next: Instant::now(),
        }
    }

    async fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next {
            tokio::time::sleep_until(self.next).await;
        }
        self.next = self.next.max(now) + self.interval;
    }
}

/// A recorded in-flight movement, keyed by action id.
#[derive(Debug, Clone)]
pub struct MovementAction {
    pub legs: Vec<DirAndCell>,
}

pub struct Session {
    pub id: SessionId,
    pub server: Arc<Server>,
    pub addr: SocketAddr,
    out: mpsc::Sender<Bytes>,
    pub shared: Arc<SessionShared>,

    pub user_id: String,
    pub account_id: String,
    pub character_id: i32,

    pub exchange_market: Option<Market>,
    pub game_actions: HashMap<i32, MovementAction>,
}

impl Session {
    pub fn new(
        id: SessionId,
        server: Arc<Server>,
        addr: SocketAddr,
        out: mpsc::Sender<Bytes>,
        shared: Arc<SessionShared>,
    ) -> Self {
        Self {
            id,
            server,
            addr,
            out,
            shared,
            user_id: String::new(),
            account_id: String::new(),
            character_id: 0,
            exchange_market: None,
            game_actions: HashMap::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.shared.set_phase(phase);
    }

    /// Serialize and queue a message for this connection. A serialization
    /// failure is logged and the message dropped.
    pub async fn send(&self, msg: MsgSvr) {
        match msg.packet() {
            Ok(packet) => {
                debug!(
                    name = ?msg.id(),
                    packet = %packet,
                    client_address = %self.addr,
                    "sent packet to client"
                );
                let _ = self.out.send(Bytes::from(packet)).await;
            }
            Err(e) => {
                error!(name = ?msg.id(), err = %e, "could not serialize message");
            }
        }
    }

    pub async fn send_error_message(&self, text: &str) {
        self.send(MsgSvr::InfosMessage {
            chat: InfosChat::Error,
            messages: vec![InfosMessageEntry::with_args(
                16,
                vec!["<b>Error</b>".to_string(), text.to_string()],
            )],
        })
        .await;
    }

    /// The receive loop: read, gate, rate-limit, dispatch, classify.
    pub async fn receive_packets(
        &mut self,
        rd: OwnedReadHalf,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        let mut reader = emberio::PacketReader::new(rd);
        let mut limiter = Limiter::new(RATE_LIMIT_PER_SECOND);
        let shared = self.shared.clone();
        let conn_timeout = self.server.conn_timeout;

        enum Event {
            Kicked,
            Shutdown,
            Read(Result<std::io::Result<Option<Bytes>>, tokio::time::error::Elapsed>),
        }

        let res = loop {
            let event = tokio::select! {
                _ = shared.kicked() => Event::Kicked,
                _ = shutdown.changed() => Event::Shutdown,
                read = tokio::time::timeout(conn_timeout, reader.read_packet()) => Event::Read(read),
            };

            let packet = match event {
                Event::Kicked => break Err(SessionError::Kicked),
                Event::Shutdown => {
                    self.send(MsgSvr::AksServerMessage { value: "04".into() }).await;
                    break Ok(());
                }
                Event::Read(Err(_)) => {
                    self.send(MsgSvr::AksServerMessage { value: "01".into() }).await;
                    break Err(SessionError::Deadline);
                }
                Event::Read(Ok(Ok(None))) => break Ok(()),
                Event::Read(Ok(Ok(Some(packet)))) => packet,
                Event::Read(Ok(Err(e))) => break Err(SessionError::Io(e)),
            };

            limiter.wait().await;

            if packet.is_empty() {
                continue;
            }

            let Ok(packet) = std::str::from_utf8(&packet) else {
                debug!(client_address = %self.addr, "non-ascii packet");
                continue;
            };

            let dispatched = std::panic::AssertUnwindSafe(tokio::time::timeout(
                HANDLER_TIMEOUT,
                self.handle_packet(packet),
            ))
            .catch_unwind()
            .await;

            match dispatched {
                Err(_panic) => {
                    error!(client_address = %self.addr, packet, "recovered from panic in handler");
                }
                Ok(Err(_elapsed)) => {
                    break Err(SessionError::Other(anyhow::anyhow!(
                        "handler deadline exceeded"
                    )));
                }
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(SessionError::Noop))) => {
                    self.send(MsgSvr::BasicsNothing).await;
                }
                Ok(Ok(Err(SessionError::NotImplemented))) => {
                    self.send_error_message("Not implemented.").await;
                }
                Ok(Ok(Err(SessionError::NotAllowed))) => {
                    self.send_error_message("Not allowed.").await;
                }
                Ok(Ok(Err(e))) => break Err(e),
            }
        };

        self.despawn().await;
        res
    }

    /// Broadcast this character's removal to its map; runs on any exit from
    /// the receive loop once a character is bound.
    async fn despawn(&self) {
        if self.character_id == 0 {
            return;
        }
        let Ok(character) = self.server.repo.character(self.character_id).await else {
            return;
        };
        let _ = self
            .server
            .send_to_map(
                character.game_map_id,
                MsgSvr::GameMovementRemove { id: character.id },
            )
            .await;
    }

    async fn handle_packet(&mut self, packet: &str) -> SessionResult<()> {
        let Some((id, payload)) = MsgCliId::from_packet(packet) else {
            debug!(client_address = %self.addr, packet, "unknown packet");
            return Ok(());
        };

        info!(
            message_name = ?id,
            packet,
            client_address = %self.addr,
            "received packet from client"
        );

        if !self.admissible(id) {
            debug!(client_address = %self.addr, "invalid frame");
            return Err(SessionError::InvalidRequest);
        }

        let msg = match MsgCli::decode(id, payload) {
            Ok(msg) => msg,
            Err(emberproto::ProtoError::Malformed("unknown game action type")) => {
                // The protocol has more action types than this server serves.
                return Err(SessionError::NotImplemented);
            }
            Err(e) => {
                debug!(client_address = %self.addr, err = %e, "could not decode packet");
                return Err(SessionError::InvalidRequest);
            }
        };

        self.dispatch(msg).await
    }

    /// Phase gate. Always-allowed messages bypass it; the character
    /// management cluster is admissible while a character is being picked;
    /// in-world sessions accept everything but a second login ticket.
    fn admissible(&self, id: MsgCliId) -> bool {
        match id {
            MsgCliId::AccountQueuePosition
            | MsgCliId::AksPing
            | MsgCliId::AksQuickPing
            | MsgCliId::BasicsRequestAveragePing
            | MsgCliId::BasicsGetDate
            | MsgCliId::InfosSendScreenInfo => return true,
            _ => {}
        }

        match self.phase() {
            Phase::ExpectingSendTicket => id == MsgCliId::AccountSendTicket,
            Phase::ExpectingUseKey => id == MsgCliId::AccountUseKey,
            Phase::ExpectingRequestRegionalVersion => {
                id == MsgCliId::AccountRequestRegionalVersion
            }
            Phase::ExpectingGetGifts => id == MsgCliId::AccountGetGifts,
            Phase::ExpectingSendIdentity | Phase::ExpectingSetCharacter => matches!(
                id,
                MsgCliId::AccountSetCharacter
                    | MsgCliId::AccountSendIdentity
                    | MsgCliId::AccountGetCharacters
                    | MsgCliId::AccountGetCharactersForced
                    | MsgCliId::AccountAddCharacter
                    | MsgCliId::AccountGetRandomCharacterName
                    | MsgCliId::AccountDeleteCharacter
            ),
            Phase::ExpectingGameCreate => id == MsgCliId::GameCreate,
            Phase::Idle => id != MsgCliId::AccountSendTicket,
        }
    }

    async fn dispatch(&mut self, msg: MsgCli) -> SessionResult<()> {
        match msg {
            MsgCli::AccountQueuePosition => self.handle_account_queue_position().await,
            MsgCli::AksPing => self.handle_aks_ping().await,
            MsgCli::AksQuickPing => self.handle_aks_quick_ping().await,
            MsgCli::BasicsRequestAveragePing => self.handle_basics_request_average_ping().await,
            MsgCli::BasicsGetDate => self.handle_basics_get_date().await,
            MsgCli::InfosSendScreenInfo { .. } => self.handle_infos_send_screen_info().await,

            MsgCli::AccountSendTicket { ticket } => self.handle_account_send_ticket(&ticket).await,
            MsgCli::AccountUseKey { id } => self.handle_account_use_key(id).await,
            MsgCli::AccountRequestRegionalVersion => {
                self.handle_account_request_regional_version().await
            }
            MsgCli::AccountGetGifts => self.handle_account_get_gifts().await,
            MsgCli::AccountSendIdentity { .. } => self.handle_account_send_identity().await,
            MsgCli::AccountGetCharacters | MsgCli::AccountGetCharactersForced => {
                self.handle_account_get_characters().await
            }
            MsgCli::AccountGetRandomCharacterName => {
                self.handle_account_get_random_character_name().await
            }
            MsgCli::AccountSetCharacter { id } => self.handle_account_set_character(id).await,
            MsgCli::AccountAddCharacter {
                name,
                class_id,
                sex,
                color1,
                color2,
                color3,
            } => {
                self.handle_account_add_character(name, class_id, sex, color1, color2, color3)
                    .await
            }
            MsgCli::AccountDeleteCharacter { id, secret_answer } => {
                self.handle_account_delete_character(id, &secret_answer).await
            }
            MsgCli::AccountBoost { characteristic_id } => {
                self.handle_account_boost(characteristic_id).await
            }

            MsgCli::GameCreate { create_type } => self.handle_game_create(create_type).await,
            MsgCli::GameGetExtraInformations => self.handle_game_get_extra_informations().await,
            MsgCli::GameActionsSendActions(action) => self.handle_game_actions(action).await,
            MsgCli::GameActionAck { id } => self.handle_game_action_ack(id).await,
            MsgCli::GameActionCancel { id, params } => {
                self.handle_game_action_cancel(id, &params).await
            }

            MsgCli::ChatRequestSubscribeChannel { add, channels } => {
                self.handle_chat_subscribe(add, &channels).await
            }
            MsgCli::ChatSend {
                channel,
                message,
                params,
            } => self.handle_chat_send(channel, &message, &params).await,

            MsgCli::DialogCreate { npc_id } => self.handle_dialog_create(npc_id).await,
            MsgCli::DialogRequestLeave => self.handle_dialog_request_leave().await,
            MsgCli::DialogResponse { answer, .. } => self.handle_dialog_response(answer).await,

            MsgCli::ExchangeRequest { exchange_type, id } => {
                self.handle_exchange_request(exchange_type, id).await
            }
            MsgCli::ExchangeLeave => self.handle_exchange_leave().await,
            MsgCli::ExchangeBigStoreType { item_type } => {
                self.handle_exchange_big_store_type(item_type).await
            }
            MsgCli::ExchangeBigStoreItemList { template_id } => {
                self.handle_exchange_big_store_item_list(template_id).await
            }
            MsgCli::ExchangeBigStoreSearch {
                item_type,
                template_id,
            } => {
                self.handle_exchange_big_store_search(item_type, template_id)
                    .await
            }
            MsgCli::ExchangeGetItemMiddlePrice { template_id } => {
                self.handle_exchange_get_item_middle_price(template_id).await
            }
            MsgCli::ExchangeBigStoreBuy { item_id, quantity } => {
                self.handle_exchange_big_store_buy(item_id, quantity).await
            }
            MsgCli::ExchangePutInShedFromCertificate { certificate_id } => {
                self.handle_exchange_put_in_shed_from_certificate(certificate_id)
                    .await
            }
            MsgCli::ExchangePutInShedFromInventory { mount_id } => {
                self.handle_exchange_put_in_shed_from_inventory(mount_id)
                    .await
            }
            MsgCli::ExchangePutInCertificateFromShed { mount_id } => {
                self.handle_exchange_put_in_certificate_from_shed(mount_id)
                    .await
            }
            MsgCli::ExchangePutInInventoryFromShed { mount_id } => {
                self.handle_exchange_put_in_inventory_from_shed(mount_id)
                    .await
            }

            MsgCli::ItemsDestroy { id, quantity } | MsgCli::ItemsDrop { id, quantity } => {
                self.handle_items_destroy(id, quantity).await
            }
            MsgCli::ItemsRequestMovement {
                id,
                position,
                quantity,
            } => self.handle_items_request_movement(id, position, quantity).await,
            MsgCli::ItemsUseNoConfirm {
                id,
                sprite_id,
                cell,
            } => self.handle_items_use_no_confirm(id, sprite_id, cell).await,

            MsgCli::SpellsBoost { id } => self.handle_spells_boost(id).await,
            MsgCli::SpellsForget { id } => self.handle_spells_forget(id).await,
            MsgCli::SpellsMoveToUsed { id, position } => {
                self.handle_spells_move_to_used(id, position).await
            }

            MsgCli::EmotesSetDirection { dir } => self.handle_emotes_set_direction(dir).await,

            MsgCli::MountRequestData { id, validity_ms } => {
                self.handle_mount_request_data(id, validity_ms).await
            }
            MsgCli::MountRename { name } => self.handle_mount_rename(&name).await,
            MsgCli::MountFree => self.handle_mount_free().await,
            MsgCli::MountRide => self.handle_mount_ride().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limiter_enforces_spacing() {
        let mut limiter = Limiter::new(20);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        // Burst of one: four more waits cost four intervals.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn phase_round_trip() {
        for v in 0..=7 {
            assert_eq!(Phase::from_u32(v) as u32, v);
        }
    }
}
