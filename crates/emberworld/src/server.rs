//! The game server: listener, session indexes, per-map broadcast, and the
//! background mount-certificate maintenance task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use bytes::Bytes;
use chrono::Utc;
use emberio::PacketWriter;
use emberproto::msgsvr::MsgSvr;
use emberproto::typ::{CharacterSprite, MountData, NpcSprite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{self, MutableCache, StaticCache};
use crate::items::proto_accessories;
use crate::model::{
    Cell, Character, GameServerState, Market, MarketItem, Mount, Npc, MOUNT_CAPACITY_CHAMELEON,
};
use crate::repository::Repository;
use crate::session::{Session, SessionShared};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub id: i32,
    pub addr: String,
    pub conn_timeout: Duration,
    pub ticket_dur: Duration,
    pub system_market_id: Option<String>,
}

/// Per-session entry in the server indexes. Holds only handles, never the
/// session itself: the connection task owns that.
pub struct SessionHandle {
    pub out: mpsc::Sender<Bytes>,
    pub shared: Arc<SessionShared>,
    pub account_id: String,
    pub character_id: i32,
}

#[derive(Default)]
pub struct ServerState {
    pub sessions: HashMap<SessionId, SessionHandle>,
    pub session_by_account_id: HashMap<String, SessionId>,
    pub session_by_character_id: HashMap<i32, SessionId>,
    pub cache: MutableCache,
}

pub struct Server {
    pub id: i32,
    pub addr: String,
    pub conn_timeout: Duration,
    pub ticket_dur: Duration,
    pub system_market_id: Option<String>,
    pub repo: Repository,
    pub static_cache: StaticCache,
    /// The single mutation gate over the session indexes and mutable caches.
    pub state: Mutex<ServerState>,
}

impl Server {
    pub async fn new(cfg: Config, repo: Repository) -> anyhow::Result<Server> {
        if cfg.id <= 0 {
            bail!("invalid server id");
        }
        let conn_timeout = if cfg.conn_timeout.is_zero() {
            Duration::from_secs(30 * 60)
        } else {
            cfg.conn_timeout
        };
        let ticket_dur = if cfg.ticket_dur.is_zero() {
            Duration::from_secs(20)
        } else {
            cfg.ticket_dur
        };

        let (static_cache, mutable_cache) = cache::load(&repo).await?;

        Ok(Server {
            id: cfg.id,
            addr: cfg.addr,
            conn_timeout,
            ticket_dur,
            system_market_id: cfg.system_market_id,
            repo,
            static_cache,
            state: Mutex::new(ServerState {
                cache: mutable_cache,
                ..Default::default()
            }),
        })
    }

    pub async fn listen_and_serve(
        self: Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let game_server = self
            .repo
            .game_server(self.id)
            .await
            .context("unknown game server id")?;
        let id = game_server.id;

        self.repo
            .set_game_server_state(id, GameServerState::Starting)
            .await?;

        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("could not listen on {}", self.addr))?;
        info!(address = %listener.local_addr()?, "listening");

        self.repo
            .set_game_server_state(id, GameServerState::Online)
            .await?;

        let res = self.clone().serve(listener, shutdown).await;

        // Final state write happens even though shutdown is in progress.
        let offline = tokio::time::timeout(
            Duration::from_secs(1),
            self.repo.set_game_server_state(id, GameServerState::Offline),
        )
        .await;
        if let Err(e) = offline
            .map_err(|_| anyhow!("timed out"))
            .and_then(|r| r.map_err(anyhow::Error::new))
        {
            error!(err = %e, "could not set game server state to offline");
        }

        res
    }

    /// Accept connections until shutdown, then drain the live sessions.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut conns = JoinSet::new();
        let maintenance = {
            let server = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.maintain(shutdown).await })
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(err = %e, "could not accept connection");
                            continue;
                        }
                    };
                    let server = self.clone();
                    let shutdown = shutdown.clone();
                    conns.spawn(async move {
                        if let Err(e) = server.handle_client_conn(stream, addr, shutdown).await {
                            if e.benign() {
                                debug!(client_address = %addr, err = %e, "error while handling client connection");
                            } else {
                                error!(client_address = %addr, err = %e, "error while handling client connection");
                            }
                        }
                    });
                }
            }
        }

        drop(listener);
        info!("stopped listening");
        while conns.join_next().await.is_some() {}
        maintenance.abort();

        Ok(())
    }

    async fn handle_client_conn(
        self: &Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), crate::error::SessionError> {
        info!(client_address = %addr, "client connected");
        stream.set_nodelay(true).ok();

        let session_id = SessionId::next();
        let (rd, wr) = stream.into_split();

        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(128);
        let writer = tokio::spawn(async move {
            let mut pw = PacketWriter::new(wr);
            while let Some(payload) = out_rx.recv().await {
                if pw.write_packet(&payload).await.is_err() {
                    break;
                }
                if pw.flush().await.is_err() {
                    break;
                }
            }
        });

        let shared = Arc::new(SessionShared::new());
        {
            let mut st = self.state.lock().await;
            st.sessions.insert(
                session_id,
                SessionHandle {
                    out: out_tx.clone(),
                    shared: shared.clone(),
                    account_id: String::new(),
                    character_id: 0,
                },
            );
        }

        let mut session = Session::new(session_id, self.clone(), addr, out_tx, shared);
        session.send(MsgSvr::AksHelloGame).await;

        let res = session.receive_packets(rd, shutdown).await;

        {
            let mut st = self.state.lock().await;
            if let Some(handle) = st.sessions.remove(&session_id) {
                if !handle.account_id.is_empty() {
                    st.session_by_account_id.remove(&handle.account_id);
                }
                if handle.character_id != 0 {
                    st.session_by_character_id.remove(&handle.character_id);
                }
            }
        }

        drop(session);
        let _ = writer.await;
        info!(client_address = %addr, "client disconnected");
        res
    }

    /// Bind `account_id` to a session; an account may hold one live session,
    /// and a second login closes the first and is itself refused.
    pub async fn control_account(
        &self,
        account_id: &str,
        session_id: SessionId,
    ) -> anyhow::Result<()> {
        let mut st = self.state.lock().await;
        if let Some(existing) = st.session_by_account_id.get(account_id).copied() {
            if let Some(handle) = st.sessions.get(&existing) {
                handle.shared.kick();
            }
            bail!("account already logged in");
        }
        st.session_by_account_id
            .insert(account_id.to_string(), session_id);
        if let Some(handle) = st.sessions.get_mut(&session_id) {
            handle.account_id = account_id.to_string();
        }
        Ok(())
    }

    /// Bind a selected character to its session.
    pub async fn bind_character(&self, character_id: i32, session_id: SessionId) {
        let mut st = self.state.lock().await;
        st.session_by_character_id.insert(character_id, session_id);
        if let Some(handle) = st.sessions.get_mut(&session_id) {
            handle.character_id = character_id;
        }
    }

    pub async fn session_shared_by_character_id(
        &self,
        character_id: i32,
    ) -> Option<Arc<SessionShared>> {
        let st = self.state.lock().await;
        let sid = st.session_by_character_id.get(&character_id)?;
        st.sessions.get(sid).map(|h| h.shared.clone())
    }

    /// Fan a message out to every connected character on a map. Recipients
    /// are resolved under the mutation gate; the broadcast returns only after
    /// every delivery has been handed to its connection in order.
    pub async fn send_to_map(&self, map_id: i32, msg: MsgSvr) -> anyhow::Result<()> {
        let packet = match msg.packet() {
            Ok(p) => Bytes::from(p),
            Err(e) => {
                error!(err = %e, "could not serialize message for map broadcast");
                return Ok(());
            }
        };

        let outs = {
            let st = self.state.lock().await;
            let chars = self.repo.characters_by_game_map_id(map_id).await?;
            chars
                .keys()
                .filter_map(|id| st.session_by_character_id.get(id))
                .filter_map(|sid| st.sessions.get(sid))
                .map(|h| h.out.clone())
                .collect::<Vec<_>>()
        };

        let deliveries = outs.into_iter().map(|out| {
            let packet = packet.clone();
            tokio::spawn(async move {
                let _ = out.send(packet).await;
            })
        });
        futures_util::future::join_all(deliveries).await;

        Ok(())
    }

    /// Characters on a map whose session is live, resolved under the gate.
    pub async fn connected_characters_on_map(
        &self,
        map_id: i32,
    ) -> anyhow::Result<Vec<Character>> {
        let st = self.state.lock().await;
        let chars = self.repo.characters_by_game_map_id(map_id).await?;
        let mut connected: Vec<Character> = chars
            .into_values()
            .filter(|c| st.session_by_character_id.contains_key(&c.id))
            .collect();
        connected.sort_by_key(|c| c.id);
        Ok(connected)
    }

    async fn maintain(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(Duration::from_secs(6 * 60 * 60));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tick.tick() => {
                    if let Err(e) = self.delete_invalid_mounts().await {
                        error!(err = %e, "mount maintenance failed");
                    }
                }
            }
        }
    }

    pub async fn delete_invalid_mounts(&self) -> anyhow::Result<()> {
        let _gate = self.state.lock().await;
        let now = Utc::now();
        for mount in self.repo.mounts().await? {
            if let Some(validity) = mount.validity {
                if validity < now {
                    self.repo.delete_mount(mount.id).await?;
                    debug!(mount_id = mount.id, "deleted expired certificate mount");
                }
            }
        }
        Ok(())
    }

    /// Decoded cell array for a map, computed once and cached.
    pub async fn map_cells(&self, map_id: i32) -> anyhow::Result<Vec<Cell>> {
        {
            let st = self.state.lock().await;
            if let Some(cells) = st.cache.game_map_cells.get(&map_id) {
                return Ok(cells.clone());
            }
        }

        let map = self
            .static_cache
            .game_maps
            .get(&map_id)
            .ok_or_else(|| anyhow!("game map not found: {map_id}"))?;
        let cells = crate::map::decode_cells(map)?;

        let mut st = self.state.lock().await;
        st.cache.game_map_cells.insert(map_id, cells.clone());
        Ok(cells)
    }

    pub async fn npcs_on_map(&self, map_id: i32) -> Vec<Npc> {
        let st = self.state.lock().await;
        st.cache
            .npcs_by_map_id
            .get(&map_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn market(&self, id: &str) -> Option<Market> {
        let st = self.state.lock().await;
        st.cache.markets.get(id).cloned()
    }

    pub async fn market_items(&self, market_id: &str) -> HashMap<i32, MarketItem> {
        let st = self.state.lock().await;
        st.cache
            .market_items_by_market_id
            .get(market_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The unique, ascending template ids a store lists for an item type.
    pub async fn market_template_ids_by_item_type(
        &self,
        market: &Market,
        item_type: i32,
    ) -> Result<Vec<i32>, crate::error::SessionError> {
        if !market.types.contains(&item_type) {
            return Err(crate::error::SessionError::InvalidRequest);
        }

        let market_items = self.market_items(&market.id).await;
        let mut template_ids = Vec::new();
        for v in market_items.values() {
            let template = self
                .static_cache
                .items
                .get(&v.item.template_id)
                .ok_or_else(|| anyhow!("invalid item template: {}", v.item.template_id))?;
            if template.item_type != item_type {
                continue;
            }
            if !template_ids.contains(&v.item.template_id) {
                template_ids.push(v.item.template_id);
            }
        }
        template_ids.sort_unstable();
        Ok(template_ids)
    }

    /// Store rows for one template, ascending by item id.
    pub async fn market_items_by_template_id(
        &self,
        market: &Market,
        template_id: i32,
    ) -> Result<Vec<emberproto::msgsvr::BigStoreItem>, crate::error::SessionError> {
        if !self.static_cache.items.contains_key(&template_id) {
            return Err(crate::error::SessionError::InvalidRequest);
        }

        let market_items = self.market_items(&market.id).await;
        let mut items: Vec<_> = market_items
            .values()
            .filter(|v| v.item.template_id == template_id)
            .map(|v| emberproto::msgsvr::BigStoreItem {
                id: v.id,
                effects: v.item.effects.clone(),
                price_set1: v.price,
                price_set2: 0,
                price_set3: 0,
            })
            .collect();
        items.sort_by_key(|v| v.id);
        Ok(items)
    }

    /// The on-map movement sprite for a character.
    pub async fn character_sprite(
        &self,
        character: &Character,
        transition: bool,
    ) -> anyhow::Result<CharacterSprite> {
        let items = self
            .repo
            .character_items_by_character_id(character.id)
            .await?;

        let level = character.level();
        let aura = if level >= 200 {
            2
        } else if level >= 100 {
            1
        } else {
            0
        };

        let mut mount_model_id = 0;
        let mut mount_custom_color1 = String::new();
        let mut mount_custom_color2 = String::new();
        let mut mount_custom_color3 = String::new();
        if character.mounting {
            let mount = self.repo.mount(character.mount_id).await?;
            mount_model_id = mount.template_id;

            if mount.capacities.contains(&MOUNT_CAPACITY_CHAMELEON) {
                mount_custom_color1 = character.color2.clone();
                mount_custom_color2 = character.color3.clone();
                mount_custom_color3 = character.color3.clone();
            }
        }

        Ok(CharacterSprite {
            transition,
            id: character.id,
            cell: character.cell,
            direction: character.direction,
            class_id: character.class_id,
            name: character.name.clone(),
            sex: character.sex,
            gfx_id: character.gfx_id(),
            level,
            color1: character.color1.clone(),
            color2: character.color2.clone(),
            color3: character.color3.clone(),
            accessories: proto_accessories(&items),
            alignment: character.alignment,
            grade: character.grade(),
            aura,
            mount_model_id,
            mount_custom_color1,
            mount_custom_color2,
            mount_custom_color3,
        })
    }

    pub fn npc_sprite(index: usize, npc: &Npc) -> NpcSprite {
        NpcSprite {
            id: -(index as i32 + 1),
            cell: npc.cell_id,
            direction: npc.direction,
            template_id: npc.template_id,
            gfx_id: npc.gfx,
            sex: npc.sex,
            scale_x: npc.scale_x,
            scale_y: npc.scale_y,
            color1: npc.color1.clone(),
            color2: npc.color2.clone(),
            color3: npc.color3.clone(),
            extra_clip_id: npc.extra_clip,
            custom_artwork: npc.custom_artwork,
        }
    }

    pub fn common_mount_data(&self, mount: &Mount) -> anyhow::Result<MountData> {
        let template = self
            .static_cache
            .mounts
            .get(&mount.template_id)
            .ok_or_else(|| anyhow!("mount template not found: {}", mount.template_id))?;

        let level = mount.level();

        Ok(MountData {
            id: mount.id,
            model_id: mount.template_id,
            capacities: mount.capacities.clone(),
            name: mount.name.clone(),
            sex: mount.sex,
            xp: mount.xp,
            xp_min: mount.xp_low(),
            xp_max: mount.xp_high(),
            level,
            mountable: true,
            effects: template.effects(level),
        })
    }

}
