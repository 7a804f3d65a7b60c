//! End-to-end tests: a seeded server on a loopback listener, driven over the
//! real wire protocol.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use emberio::{PacketReader, PacketWriter};
use emberproto::typ::{item_pos, item_type, Effect};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::map::encode_cell;
use crate::model::{
    Account, Character, CharacterItem, CharacterSpell, CharacterStats, Class, ClassBoostCost,
    ClassBoostCosts, EffectOperator, EffectTemplate, GameMap, GameServer, GameServerState, Item,
    ItemSet, ItemTemplate, Market, MarketItem, Mount, Npc, NpcDialog, NpcResponse,
    NpcResponseAction, NpcTemplate, Spell, SpellLevel, Ticket, User, CHARACTER_XP_FLOORS,
};
use crate::repository::{Repository, Seed};
use crate::server::{Config, Server};

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn open_map_data(count: usize, inactive: &[i32]) -> String {
    (0..count)
        .map(|i| encode_cell(!inactive.contains(&(i as i32)), true, 4, 0))
        .collect()
}

fn character(id: i32, account_id: &str, name: &str, cell: i32) -> Character {
    Character {
        id,
        account_id: account_id.to_string(),
        game_server_id: 1,
        name: name.to_string(),
        sex: 0,
        class_id: 8,
        color1: "-1".into(),
        color2: "-1".into(),
        color3: "-1".into(),
        stats: CharacterStats {
            vitality: 101,
            wisdom: 101,
            strength: 101,
            intelligence: 101,
            chance: 101,
            agility: 101,
        },
        // Level 20.
        xp: CHARACTER_XP_FLOORS[18],
        kamas: 150,
        bonus_points: 0,
        bonus_points_spell: 1000,
        alignment: 0,
        disgrace: 0,
        honor: 0,
        alignment_enabled: false,
        game_map_id: 952,
        cell,
        direction: 1,
        mount_id: 0,
        mounting: false,
        spells: vec![CharacterSpell {
            id: 101,
            level: 3,
            position: 1,
        }],
    }
}

fn world_seed() -> Seed {
    let now = Utc::now();
    Seed {
        accounts: vec![
            Account {
                id: "A1".into(),
                user_id: "U1".into(),
                admin: true,
                subscription: now + chrono::Duration::days(30),
                last_access: None,
                last_ip: String::new(),
            },
            Account {
                id: "A2".into(),
                user_id: "U2".into(),
                admin: false,
                subscription: now + chrono::Duration::days(30),
                last_access: None,
                last_ip: String::new(),
            },
        ],
        users: vec![
            User {
                id: "U1".into(),
                secret_answer: "tofu".into(),
                chat_channels: vec!['i', '*'],
            },
            User {
                id: "U2".into(),
                secret_answer: "rice".into(),
                chat_channels: vec!['*'],
            },
        ],
        game_servers: vec![GameServer {
            id: 1,
            state: GameServerState::Offline,
        }],
        tickets: vec![
            Ticket {
                id: "T1".into(),
                account_id: "A1".into(),
                game_server_id: 1,
                created: now,
            },
            Ticket {
                id: "T2".into(),
                account_id: "A1".into(),
                game_server_id: 1,
                created: now,
            },
            Ticket {
                id: "T3".into(),
                account_id: "A2".into(),
                game_server_id: 1,
                created: now,
            },
        ],
        characters: vec![
            character(42, "A1", "Ashwood", 100),
            character(43, "A2", "Briar", 105),
        ],
        character_items: vec![
            CharacterItem {
                id: 7001,
                item: Item {
                    template_id: 2101,
                    quantity: 1,
                    effects: Vec::new(),
                },
                position: item_pos::SHIELD,
                character_id: 42,
            },
            CharacterItem {
                id: 7002,
                item: Item {
                    template_id: 2102,
                    quantity: 1,
                    effects: vec![Effect {
                        id: 118,
                        dice_num: 10,
                        dice_side: 0,
                        param: String::new(),
                    }],
                },
                position: item_pos::INVENTORY,
                character_id: 42,
            },
            CharacterItem {
                id: 7003,
                item: Item {
                    template_id: 2103,
                    quantity: 1,
                    effects: Vec::new(),
                },
                position: item_pos::INVENTORY,
                character_id: 42,
            },
            CharacterItem {
                id: 7004,
                item: Item {
                    template_id: 2104,
                    quantity: 1,
                    effects: Vec::new(),
                },
                position: item_pos::INVENTORY,
                character_id: 42,
            },
            CharacterItem {
                id: 7005,
                item: Item {
                    template_id: 2105,
                    quantity: 1,
                    effects: Vec::new(),
                },
                position: item_pos::RING_LEFT,
                character_id: 42,
            },
        ],
        mounts: Vec::new(),
        markets: vec![Market {
            id: "M1".into(),
            types: vec![item_type::MOUNT_CERTIFICATE],
            quantity1: 1,
            quantity2: 10,
            quantity3: 100,
            fee: 0,
            max_level: 200,
            max_per_account: 0,
            max_hours: 0,
        }],
        market_items: vec![MarketItem {
            id: 900,
            market_id: "M1".into(),
            item: Item {
                template_id: 7806,
                quantity: 1,
                effects: Vec::new(),
            },
            price: 100,
        }],
        triggers: Vec::new(),
        game_maps: vec![GameMap {
            id: 952,
            width: 10,
            name: "amakna".into(),
            key: "k952".into(),
            data: open_map_data(400, &[118]),
        }],
        effect_templates: vec![EffectTemplate {
            id: 118,
            characteristic_id: emberproto::typ::characteristic::STRENGTH,
            operator: EffectOperator::Add,
        }],
        item_sets: vec![ItemSet {
            id: 5,
            bonus: vec![
                Vec::new(),
                vec![Effect {
                    id: 118,
                    dice_num: 5,
                    dice_side: 0,
                    param: String::new(),
                }],
            ],
        }],
        item_templates: vec![
            ItemTemplate {
                id: 2101,
                item_type: item_type::SHIELD,
                level: 1,
                item_set_id: 0,
                two_hands: false,
                weight: 10,
                conditions: String::new(),
                can_use: false,
                can_target: false,
            },
            ItemTemplate {
                id: 2102,
                item_type: item_type::SWORD,
                level: 1,
                item_set_id: 0,
                two_hands: true,
                weight: 20,
                conditions: String::new(),
                can_use: false,
                can_target: false,
            },
            ItemTemplate {
                id: 2103,
                item_type: item_type::AMULET,
                level: 1,
                item_set_id: 5,
                two_hands: false,
                weight: 1,
                conditions: String::new(),
                can_use: false,
                can_target: false,
            },
            ItemTemplate {
                id: 2104,
                item_type: item_type::RING,
                level: 1,
                item_set_id: 5,
                two_hands: false,
                weight: 1,
                conditions: String::new(),
                can_use: false,
                can_target: false,
            },
            ItemTemplate {
                id: 2105,
                item_type: item_type::RING,
                level: 1,
                item_set_id: 0,
                two_hands: false,
                weight: 1,
                conditions: "PL>10".into(),
                can_use: false,
                can_target: false,
            },
            ItemTemplate {
                id: 7806,
                item_type: item_type::MOUNT_CERTIFICATE,
                level: 1,
                item_set_id: 0,
                two_hands: false,
                weight: 1,
                conditions: String::new(),
                can_use: false,
                can_target: false,
            },
        ],
        npc_templates: vec![NpcTemplate {
            id: 5001,
            name: "stablekeeper".into(),
        }],
        npc_dialogs: vec![
            NpcDialog {
                id: 10,
                responses: vec![201, 202],
            },
            NpcDialog {
                id: 11,
                responses: vec![202],
            },
        ],
        npc_responses: vec![
            NpcResponse {
                id: 201,
                action: NpcResponseAction::CreateDialog,
                arguments: vec!["11".into()],
            },
            NpcResponse {
                id: 202,
                action: NpcResponseAction::LeaveDialog,
                arguments: Vec::new(),
            },
        ],
        npcs: vec![
            Npc {
                id: 1,
                template_id: 5001,
                map_id: 952,
                cell_id: 150,
                direction: 1,
                dialog_id: 0,
                market_id: "M1".into(),
                gfx: 9001,
                sex: 0,
                scale_x: 100,
                scale_y: 100,
                color1: "-1".into(),
                color2: "-1".into(),
                color3: "-1".into(),
                extra_clip: -1,
                custom_artwork: 0,
            },
            Npc {
                id: 2,
                template_id: 5001,
                map_id: 952,
                cell_id: 160,
                direction: 1,
                dialog_id: 10,
                market_id: String::new(),
                gfx: 9001,
                sex: 0,
                scale_x: 100,
                scale_y: 100,
                color1: "-1".into(),
                color2: "-1".into(),
                color3: "-1".into(),
                extra_clip: -1,
                custom_artwork: 0,
            },
        ],
        classes: vec![Class {
            id: 8,
            spells: vec![101, 102, 103],
            boost_costs: ClassBoostCosts {
                strength: vec![
                    ClassBoostCost {
                        quantity: 0,
                        cost: 1,
                        bonus: 1,
                    },
                    ClassBoostCost {
                        quantity: 100,
                        cost: 2,
                        bonus: 1,
                    },
                ],
                ..Default::default()
            },
        }],
        spells: vec![
            Spell {
                id: 101,
                levels: vec![
                    SpellLevel {
                        grade: 1,
                        min_player_level: 1,
                    },
                    SpellLevel {
                        grade: 2,
                        min_player_level: 10,
                    },
                    SpellLevel {
                        grade: 3,
                        min_player_level: 30,
                    },
                ],
            },
            Spell {
                id: 102,
                levels: vec![SpellLevel {
                    grade: 1,
                    min_player_level: 1,
                }],
            },
            Spell {
                id: 103,
                levels: vec![SpellLevel {
                    grade: 1,
                    min_player_level: 3,
                }],
            },
        ],
        mount_templates: vec![crate::model::MountTemplate {
            id: 180,
            gfx_id: 9501,
            effects: vec![Effect {
                id: 118,
                dice_num: 100,
                dice_side: 0,
                param: String::new(),
            }],
        }],
    }
}

async fn start_server(seed: Seed) -> (Arc<Server>, std::net::SocketAddr, watch::Sender<bool>) {
    let repo = Repository::from_seed(seed);
    let server = Arc::new(
        Server::new(
            Config {
                id: 1,
                addr: "127.0.0.1:0".into(),
                conn_timeout: Duration::from_secs(60),
                ticket_dur: Duration::from_secs(20),
                system_market_id: None,
            },
            repo,
        )
        .await
        .unwrap(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.clone().serve(listener, shutdown_rx));

    (server, addr, shutdown_tx)
}

struct Client {
    reader: PacketReader<OwnedReadHalf>,
    writer: PacketWriter<OwnedWriteHalf>,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rd, wr) = stream.into_split();
        Client {
            reader: PacketReader::new(rd),
            writer: PacketWriter::new(wr),
        }
    }

    async fn send(&mut self, packet: &str) {
        self.writer.write_packet(packet.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next packet; `None` on a closed connection.
    async fn recv(&mut self) -> Option<String> {
        let res = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_packet())
            .await
            .expect("timed out waiting for packet");
        match res {
            Ok(Some(b)) => Some(String::from_utf8(b.to_vec()).unwrap()),
            _ => None,
        }
    }

    /// Skip packets until one starts with `prefix`.
    async fn recv_until(&mut self, prefix: &str) -> String {
        loop {
            let packet = self
                .recv()
                .await
                .unwrap_or_else(|| panic!("connection closed waiting for {prefix:?}"));
            if packet.starts_with(prefix) {
                return packet;
            }
        }
    }

    /// Run the login handshake through character selection and game entry.
    async fn login(&mut self, ticket: &str, character_id: i32) {
        assert_eq!(self.recv().await.unwrap(), "HG");
        self.send(&format!("AT{ticket}")).await;
        assert_eq!(self.recv().await.unwrap(), "ATK0");
        self.send("Ak0").await;
        assert_eq!(self.recv().await.unwrap(), "BN");
        self.send("AV").await;
        assert_eq!(self.recv().await.unwrap(), "AVK0");
        self.send("Ag").await;
        assert_eq!(self.recv().await.unwrap(), "BN");
        self.send("AL").await;
        self.recv_until("ALK").await;
        self.send(&format!("AS{character_id}")).await;
        self.recv_until("ASK").await;
        self.send("GC1").await;
        self.recv_until("GM|+").await;
    }
}

// S1: login handshake, happy path.
#[tokio::test]
async fn login_handshake_happy_path() {
    let (server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    let st = server.state.lock().await;
    let by_account = st.session_by_account_id.get("A1").copied();
    let by_character = st.session_by_character_id.get(&42).copied();
    assert!(by_account.is_some());
    assert_eq!(by_account, by_character);
}

// S2: duplicate login kicks the prior session and refuses the new one.
#[tokio::test]
async fn duplicate_login_kicks_prior() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut first = Client::connect(addr).await;
    first.login("T1", 42).await;

    let mut second = Client::connect(addr).await;
    assert_eq!(second.recv().await.unwrap(), "HG");
    second.send("ATT2").await;
    assert_eq!(second.recv_until("AlE").await, "AlEc");
    assert_eq!(second.recv().await, None);

    // The prior session despawns and its socket closes.
    while first.recv().await.is_some() {}
}

// Property 1: a frame outside the admissible set closes the connection.
#[tokio::test]
async fn phase_gate_rejects_out_of_phase_message() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    assert_eq!(client.recv().await.unwrap(), "HG");
    client.send("AV").await;
    assert_eq!(client.recv().await, None);
}

#[tokio::test]
async fn idle_session_rejects_second_ticket() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;
    client.send("ATT2").await;
    while client.recv().await.is_some() {}
}

#[tokio::test]
async fn always_allowed_messages_bypass_the_gate() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    assert_eq!(client.recv().await.unwrap(), "HG");
    client.send("PG").await;
    assert_eq!(client.recv().await.unwrap(), "PGK");
    client.send("BD").await;
    client.recv_until("BDK").await;
}

// S3: a blocker at leg two truncates the validated path.
#[tokio::test]
async fn validated_path_stops_at_blocker() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    client.send("GA1;3,109;3,118").await;
    let action = client.recv_until("GA0;").await;
    assert_eq!(action, "GA0;1;42;0,100;3,109");

    client.send("GKK0").await;
    client.recv_until("BN").await;
}

// S4: equipping a two-handed weapon displaces the shield.
#[tokio::test]
async fn two_handed_weapon_displaces_shield() {
    let (server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    client.send("OM7002|1|1").await;
    client.recv_until("OMK7001|-1").await;
    client.recv_until("Imi79").await;
    client.recv_until("OMK7002|1").await;
    client.recv_until("Ow").await;

    let shield = server.repo.character_item(7001).await.unwrap();
    let sword = server.repo.character_item(7002).await.unwrap();
    assert_eq!(shield.position, item_pos::INVENTORY);
    assert_eq!(sword.position, item_pos::WEAPON);
}

// Property 4b: the item-set band follows the equipped count.
#[tokio::test]
async fn item_set_bonus_band_follows_equipped_count() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    client.send("OM7003|0|1").await;
    assert_eq!(client.recv_until("Oi").await, "Oi+5|2103|");

    client.send("OM7004|2|1").await;
    assert_eq!(client.recv_until("Oi").await, "Oi+5|2103,2104|76#5#0#");
}

// S5: buying a mount certificate creates a live mount row.
#[tokio::test]
async fn mount_certificate_purchase_creates_mount() {
    let (server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    client.send("ER0|-1").await;
    client.recv_until("ECK0|").await;

    client.send("EBB900|1").await;
    client.recv_until("EBK").await;

    let character = server.repo.character(42).await.unwrap();
    assert_eq!(character.kamas, 50);

    let mounts = server.repo.mounts().await.unwrap();
    assert_eq!(mounts.len(), 1);
    let mount = &mounts[0];
    assert_eq!(mount.template_id, 180);
    let validity = mount.validity.expect("certificate mount carries validity");
    assert_eq!(validity.second(), 0);
    let expected = Utc::now() + chrono::Duration::hours(24 * 20);
    assert!((validity - expected).num_seconds().abs() < 120);

    let items = server.repo.character_items_by_character_id(42).await.unwrap();
    let certificate = items
        .values()
        .find(|v| v.item.template_id == 7806)
        .expect("certificate in inventory");
    assert_eq!(certificate.position, item_pos::INVENTORY);
    let effect = certificate
        .item
        .effects
        .iter()
        .find(|e| e.id == 995)
        .expect("certificate carries the mount effect");
    assert_eq!(effect.dice_num, mount.id);
    assert_eq!(effect.dice_side, validity.timestamp_millis());
}

// S6: levelling below the invested points resets the stats.
#[tokio::test]
async fn level_down_below_used_points_resets_stats() {
    let mut seed = world_seed();
    seed.characters[0].stats.vitality = 150;
    let (server, addr, _shutdown) = start_server(seed).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    client.send("BM*|.lvl 5").await;
    client.recv_until("AN5").await;
    client.recv_until("cS").await;

    let character = server.repo.character(42).await.unwrap();
    assert_eq!(character.xp, CHARACTER_XP_FLOORS[3]);
    assert_eq!(character.level(), 5);
    assert_eq!(character.stats.vitality, 101);
    assert_eq!(character.stats.wisdom, 101);
    assert_eq!(character.bonus_points, 20);
}

// Property 5: a failing condition forcibly unequips the item, and the
// cascade settles.
#[tokio::test]
async fn condition_cascade_unequips_on_level_down() {
    let (server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    client.send("BM*|.lvl 5").await;
    client.recv_until("Ime19|44").await;
    client.recv_until("OMK7005|-1").await;
    client.recv_until("cS").await;

    let ring = server.repo.character_item(7005).await.unwrap();
    assert_eq!(ring.position, item_pos::INVENTORY);
}

// Per-map broadcast reaches peers and despawn removes the sprite.
#[tokio::test]
async fn map_broadcast_reaches_peers() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut first = Client::connect(addr).await;
    first.login("T1", 42).await;

    let mut second = Client::connect(addr).await;
    second.login("T3", 43).await;

    // The peer's game entry broadcast lands on the first session.
    let movement = first.recv_until("GM|+").await;
    assert!(movement.contains(";43;"), "got {movement:?}");

    drop(second);
    assert_eq!(first.recv_until("GMR").await, "GMR|-43");
}

// NPC dialog walk: open, follow a response into a nested dialog, leave.
#[tokio::test]
async fn npc_dialog_walk() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    client.send("DC-2").await;
    assert_eq!(client.recv_until("DCK").await, "DCK-2");
    assert_eq!(client.recv_until("DQ").await, "DQ10|201;202");

    client.send("DR10|201").await;
    assert_eq!(client.recv_until("DQ").await, "DQ11|202");

    client.send("DR11|202").await;
    assert_eq!(client.recv_until("DV").await, "DV");
}

// Boundary: maintenance deletes only expired certificate mounts.
#[tokio::test]
async fn maintenance_deletes_only_expired_mounts() {
    let now = Utc::now();
    let mut seed = world_seed();
    seed.mounts = vec![
        Mount {
            id: 601,
            template_id: 180,
            character_id: 42,
            name: String::new(),
            sex: 0,
            xp: 0,
            capacities: Vec::new(),
            validity: None,
        },
        Mount {
            id: 602,
            template_id: 180,
            character_id: 0,
            name: String::new(),
            sex: 0,
            xp: 0,
            capacities: Vec::new(),
            validity: Some(now - chrono::Duration::hours(1)),
        },
        Mount {
            id: 603,
            template_id: 180,
            character_id: 0,
            name: String::new(),
            sex: 1,
            xp: 0,
            capacities: Vec::new(),
            validity: Some(now + chrono::Duration::hours(1)),
        },
    ];
    let (server, _addr, _shutdown) = start_server(seed).await;

    server.delete_invalid_mounts().await.unwrap();

    assert!(server.repo.mount(601).await.is_ok());
    assert!(server.repo.mount(602).await.is_err());
    assert!(server.repo.mount(603).await.is_ok());
}

// Admin channel cannot be toggled through the generic subscribe path.
#[tokio::test]
async fn admin_channel_subscription_is_rejected() {
    let (_server, addr, _shutdown) = start_server(world_seed()).await;

    let mut client = Client::connect(addr).await;
    client.login("T1", 42).await;

    client.send("cC+@").await;
    while client.recv().await.is_some() {}
}
