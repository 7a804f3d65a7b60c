//! The repository: the §-style backend surface the server mutates through.
//!
//! Backed by in-memory maps behind one async mutex and seedable from a JSON
//! world file. Tickets are one-shot rows consumed by `use_ticket`.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::model::{
    Account, Character, CharacterItem, Class, EffectTemplate, GameMap, GameServer,
    GameServerState, ItemSet, ItemTemplate, Market, MarketItem, Mount, MountTemplate, Npc,
    NpcDialog, NpcResponse, NpcTemplate, Spell, Ticket, Trigger, User,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    NotFound,
    NameTaken,
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::NotFound => write!(f, "not found"),
            RepoError::NameTaken => write!(f, "character name already exists on game server"),
        }
    }
}

impl std::error::Error for RepoError {}

pub type RepoResult<T> = Result<T, RepoError>;

/// The JSON world seed.
#[derive(Debug, Default, serde::Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub game_servers: Vec<GameServer>,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub character_items: Vec<CharacterItem>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub markets: Vec<Market>,
    #[serde(default)]
    pub market_items: Vec<MarketItem>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub game_maps: Vec<GameMap>,
    #[serde(default)]
    pub effect_templates: Vec<EffectTemplate>,
    #[serde(default)]
    pub item_sets: Vec<ItemSet>,
    #[serde(default)]
    pub item_templates: Vec<ItemTemplate>,
    #[serde(default)]
    pub npc_templates: Vec<NpcTemplate>,
    #[serde(default)]
    pub npc_dialogs: Vec<NpcDialog>,
    #[serde(default)]
    pub npc_responses: Vec<NpcResponse>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub spells: Vec<Spell>,
    #[serde(default)]
    pub mount_templates: Vec<MountTemplate>,
}

#[derive(Debug, Default)]
struct Store {
    accounts: HashMap<String, Account>,
    users: HashMap<String, User>,
    game_servers: HashMap<i32, GameServer>,
    tickets: HashMap<String, Ticket>,
    characters: HashMap<i32, Character>,
    character_items: HashMap<i32, CharacterItem>,
    mounts: HashMap<i32, Mount>,
    markets: HashMap<String, Market>,
    market_items: HashMap<i32, MarketItem>,
    triggers: HashMap<(i32, i32), Trigger>,
    game_maps: HashMap<i32, GameMap>,
    effect_templates: HashMap<i32, EffectTemplate>,
    item_sets: HashMap<i32, ItemSet>,
    item_templates: HashMap<i32, ItemTemplate>,
    npc_templates: HashMap<i32, NpcTemplate>,
    npc_dialogs: HashMap<i32, NpcDialog>,
    npc_responses: HashMap<i32, NpcResponse>,
    npcs: Vec<Npc>,
    classes: HashMap<i32, Class>,
    spells: HashMap<i32, Spell>,
    mount_templates: HashMap<i32, MountTemplate>,
    next_id: i32,
}

#[derive(Debug)]
pub struct Repository {
    inner: Mutex<Store>,
}

/// Auth ticket resolution result.
#[derive(Debug, Clone)]
pub struct UsedTicket {
    pub account_id: String,
    pub game_server_id: i32,
    pub created: DateTime<Utc>,
}

impl Repository {
    pub fn from_seed(seed: Seed) -> Self {
        let mut store = Store::default();
        let mut max_id = 0;
        for v in seed.accounts {
            store.accounts.insert(v.id.clone(), v);
        }
        for v in seed.users {
            store.users.insert(v.id.clone(), v);
        }
        for v in seed.game_servers {
            store.game_servers.insert(v.id, v);
        }
        for v in seed.tickets {
            store.tickets.insert(v.id.clone(), v);
        }
        for v in seed.characters {
            max_id = max_id.max(v.id);
            store.characters.insert(v.id, v);
        }
        for v in seed.character_items {
            max_id = max_id.max(v.id);
            store.character_items.insert(v.id, v);
        }
        for v in seed.mounts {
            max_id = max_id.max(v.id);
            store.mounts.insert(v.id, v);
        }
        for v in seed.markets {
            store.markets.insert(v.id.clone(), v);
        }
        for v in seed.market_items {
            max_id = max_id.max(v.id);
            store.market_items.insert(v.id, v);
        }
        for v in seed.triggers {
            store.triggers.insert((v.game_map_id, v.cell_id), v);
        }
        for v in seed.game_maps {
            store.game_maps.insert(v.id, v);
        }
        for v in seed.effect_templates {
            store.effect_templates.insert(v.id, v);
        }
        for v in seed.item_sets {
            store.item_sets.insert(v.id, v);
        }
        for v in seed.item_templates {
            store.item_templates.insert(v.id, v);
        }
        for v in seed.npc_templates {
            store.npc_templates.insert(v.id, v);
        }
        for v in seed.npc_dialogs {
            store.npc_dialogs.insert(v.id, v);
        }
        for v in seed.npc_responses {
            store.npc_responses.insert(v.id, v);
        }
        store.npcs = seed.npcs;
        for v in seed.classes {
            store.classes.insert(v.id, v);
        }
        for v in seed.spells {
            store.spells.insert(v.id, v);
        }
        for v in seed.mount_templates {
            store.mount_templates.insert(v.id, v);
        }
        store.next_id = max_id + 1;
        Self {
            inner: Mutex::new(store),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let seed: Seed = serde_json::from_str(&s)?;
        Ok(Self::from_seed(seed))
    }

    // Auth.

    pub async fn use_ticket(&self, ticket: &str) -> RepoResult<UsedTicket> {
        let mut store = self.inner.lock().await;
        let t = store.tickets.remove(ticket).ok_or(RepoError::NotFound)?;
        Ok(UsedTicket {
            account_id: t.account_id,
            game_server_id: t.game_server_id,
            created: t.created,
        })
    }

    // Accounts and users.

    pub async fn account(&self, id: &str) -> RepoResult<Account> {
        let store = self.inner.lock().await;
        store.accounts.get(id).cloned().ok_or(RepoError::NotFound)
    }

    pub async fn set_account_last_access_and_last_ip(
        &self,
        id: &str,
        last_access: DateTime<Utc>,
        last_ip: &str,
    ) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        let account = store.accounts.get_mut(id).ok_or(RepoError::NotFound)?;
        account.last_access = Some(last_access);
        account.last_ip = last_ip.to_string();
        Ok(())
    }

    pub async fn user(&self, id: &str) -> RepoResult<User> {
        let store = self.inner.lock().await;
        store.users.get(id).cloned().ok_or(RepoError::NotFound)
    }

    pub async fn user_add_chat_channels(&self, id: &str, channels: &[char]) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        let user = store.users.get_mut(id).ok_or(RepoError::NotFound)?;
        for c in channels {
            if !user.chat_channels.contains(c) {
                user.chat_channels.push(*c);
            }
        }
        Ok(())
    }

    pub async fn user_remove_chat_channels(&self, id: &str, channels: &[char]) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        let user = store.users.get_mut(id).ok_or(RepoError::NotFound)?;
        user.chat_channels.retain(|c| !channels.contains(c));
        Ok(())
    }

    // Server lifecycle.

    pub async fn game_server(&self, id: i32) -> RepoResult<GameServer> {
        let store = self.inner.lock().await;
        store
            .game_servers
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    pub async fn set_game_server_state(&self, id: i32, state: GameServerState) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        let server = store.game_servers.get_mut(&id).ok_or(RepoError::NotFound)?;
        server.state = state;
        Ok(())
    }

    // Characters.

    pub async fn character(&self, id: i32) -> RepoResult<Character> {
        let store = self.inner.lock().await;
        store.characters.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    pub async fn all_characters_by_account_id(
        &self,
        account_id: &str,
    ) -> RepoResult<HashMap<i32, Character>> {
        let store = self.inner.lock().await;
        Ok(store
            .characters
            .values()
            .filter(|c| c.account_id == account_id)
            .map(|c| (c.id, c.clone()))
            .collect())
    }

    pub async fn characters_by_game_map_id(
        &self,
        game_map_id: i32,
    ) -> RepoResult<HashMap<i32, Character>> {
        let store = self.inner.lock().await;
        Ok(store
            .characters
            .values()
            .filter(|c| c.game_map_id == game_map_id)
            .map(|c| (c.id, c.clone()))
            .collect())
    }

    pub async fn create_character(&self, mut character: Character) -> RepoResult<i32> {
        let mut store = self.inner.lock().await;
        let taken = store.characters.values().any(|c| {
            c.game_server_id == character.game_server_id
                && c.name.eq_ignore_ascii_case(&character.name)
        });
        if taken {
            return Err(RepoError::NameTaken);
        }
        let id = store.next_id;
        store.next_id += 1;
        character.id = id;
        store.characters.insert(id, character);
        Ok(id)
    }

    pub async fn update_character(&self, character: Character) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        if !store.characters.contains_key(&character.id) {
            return Err(RepoError::NotFound);
        }
        store.characters.insert(character.id, character);
        Ok(())
    }

    pub async fn delete_character(&self, id: i32) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        store.characters.remove(&id).ok_or(RepoError::NotFound)?;
        store.character_items.retain(|_, v| v.character_id != id);
        Ok(())
    }

    // Items.

    pub async fn character_item(&self, id: i32) -> RepoResult<CharacterItem> {
        let store = self.inner.lock().await;
        store
            .character_items
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    pub async fn character_items_by_character_id(
        &self,
        character_id: i32,
    ) -> RepoResult<HashMap<i32, CharacterItem>> {
        let store = self.inner.lock().await;
        Ok(store
            .character_items
            .values()
            .filter(|v| v.character_id == character_id)
            .map(|v| (v.id, v.clone()))
            .collect())
    }

    pub async fn create_character_item(&self, mut item: CharacterItem) -> RepoResult<i32> {
        let mut store = self.inner.lock().await;
        let id = store.next_id;
        store.next_id += 1;
        item.id = id;
        store.character_items.insert(id, item);
        Ok(id)
    }

    pub async fn update_character_item(&self, item: CharacterItem) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        if !store.character_items.contains_key(&item.id) {
            return Err(RepoError::NotFound);
        }
        store.character_items.insert(item.id, item);
        Ok(())
    }

    pub async fn delete_character_item(&self, id: i32) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        store
            .character_items
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    // Mounts.

    pub async fn mount(&self, id: i32) -> RepoResult<Mount> {
        let store = self.inner.lock().await;
        store.mounts.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    pub async fn mounts(&self) -> RepoResult<Vec<Mount>> {
        let store = self.inner.lock().await;
        Ok(store.mounts.values().cloned().collect())
    }

    pub async fn mounts_by_character_id(&self, character_id: i32) -> RepoResult<Vec<Mount>> {
        let store = self.inner.lock().await;
        let mut mounts: Vec<Mount> = store
            .mounts
            .values()
            .filter(|m| m.character_id == character_id)
            .cloned()
            .collect();
        mounts.sort_by_key(|m| m.id);
        Ok(mounts)
    }

    pub async fn create_mount(&self, mut mount: Mount) -> RepoResult<i32> {
        let mut store = self.inner.lock().await;
        let id = store.next_id;
        store.next_id += 1;
        mount.id = id;
        store.mounts.insert(id, mount);
        Ok(id)
    }

    pub async fn update_mount(&self, mount: Mount) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        if !store.mounts.contains_key(&mount.id) {
            return Err(RepoError::NotFound);
        }
        store.mounts.insert(mount.id, mount);
        Ok(())
    }

    pub async fn delete_mount(&self, id: i32) -> RepoResult<()> {
        let mut store = self.inner.lock().await;
        store.mounts.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }

    // Markets.

    pub async fn markets(&self) -> RepoResult<HashMap<String, Market>> {
        let store = self.inner.lock().await;
        Ok(store.markets.clone())
    }

    pub async fn market_items_by_market_id(
        &self,
        market_id: &str,
    ) -> RepoResult<HashMap<i32, MarketItem>> {
        let store = self.inner.lock().await;
        Ok(store
            .market_items
            .values()
            .filter(|v| v.market_id == market_id)
            .map(|v| (v.id, v.clone()))
            .collect())
    }

    // Triggers.

    pub async fn trigger_by_game_map_id_and_cell_id(
        &self,
        game_map_id: i32,
        cell_id: i32,
    ) -> RepoResult<Trigger> {
        let store = self.inner.lock().await;
        store
            .triggers
            .get(&(game_map_id, cell_id))
            .copied()
            .ok_or(RepoError::NotFound)
    }

    // Static data.

    pub async fn game_maps(&self) -> RepoResult<HashMap<i32, GameMap>> {
        Ok(self.inner.lock().await.game_maps.clone())
    }

    pub async fn effect_templates(&self) -> RepoResult<HashMap<i32, EffectTemplate>> {
        Ok(self.inner.lock().await.effect_templates.clone())
    }

    pub async fn item_sets(&self) -> RepoResult<HashMap<i32, ItemSet>> {
        Ok(self.inner.lock().await.item_sets.clone())
    }

    pub async fn item_templates(&self) -> RepoResult<HashMap<i32, ItemTemplate>> {
        Ok(self.inner.lock().await.item_templates.clone())
    }

    pub async fn npc_templates(&self) -> RepoResult<HashMap<i32, NpcTemplate>> {
        Ok(self.inner.lock().await.npc_templates.clone())
    }

    pub async fn npc_dialogs(&self) -> RepoResult<HashMap<i32, NpcDialog>> {
        Ok(self.inner.lock().await.npc_dialogs.clone())
    }

    pub async fn npc_responses(&self) -> RepoResult<HashMap<i32, NpcResponse>> {
        Ok(self.inner.lock().await.npc_responses.clone())
    }

    pub async fn npcs(&self) -> RepoResult<Vec<Npc>> {
        Ok(self.inner.lock().await.npcs.clone())
    }

    pub async fn classes(&self) -> RepoResult<HashMap<i32, Class>> {
        Ok(self.inner.lock().await.classes.clone())
    }

    pub async fn spells(&self) -> RepoResult<HashMap<i32, Spell>> {
        Ok(self.inner.lock().await.spells.clone())
    }

    pub async fn mount_templates(&self) -> RepoResult<HashMap<i32, MountTemplate>> {
        Ok(self.inner.lock().await.mount_templates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;

    fn item(template_id: i32, quantity: i32, effects: Vec<emberproto::typ::Effect>) -> Item {
        Item {
            template_id,
            quantity,
            effects,
        }
    }

    fn character(name: &str, server: i32) -> Character {
        Character {
            id: 0,
            account_id: "acc".into(),
            game_server_id: server,
            name: name.into(),
            sex: 0,
            class_id: 8,
            color1: "-1".into(),
            color2: "-1".into(),
            color3: "-1".into(),
            stats: Default::default(),
            xp: 0,
            kamas: 0,
            bonus_points: 0,
            bonus_points_spell: 0,
            alignment: 0,
            disgrace: 0,
            honor: 0,
            alignment_enabled: false,
            game_map_id: 952,
            cell: 100,
            direction: 1,
            mount_id: 0,
            mounting: false,
            spells: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_character_rejects_duplicate_name_on_same_server() {
        let repo = Repository::from_seed(Seed::default());
        repo.create_character(character("Toto", 1)).await.unwrap();
        assert_eq!(
            repo.create_character(character("toto", 1)).await,
            Err(RepoError::NameTaken)
        );
        repo.create_character(character("Toto", 2)).await.unwrap();
    }

    #[tokio::test]
    async fn tickets_are_one_shot() {
        let repo = Repository::from_seed(Seed {
            tickets: vec![Ticket {
                id: "T1".into(),
                account_id: "acc".into(),
                game_server_id: 1,
                created: Utc::now(),
            }],
            ..Default::default()
        });
        assert!(repo.use_ticket("T1").await.is_ok());
        assert_eq!(repo.use_ticket("T1").await.unwrap_err(), RepoError::NotFound);
    }

    #[tokio::test]
    async fn delete_character_drops_its_items() {
        let repo = Repository::from_seed(Seed::default());
        let id = repo.create_character(character("Solo", 1)).await.unwrap();
        let item_id = repo
            .create_character_item(CharacterItem {
                id: 0,
                item: item(1, 1, Vec::new()),
                position: -1,
                character_id: id,
            })
            .await
            .unwrap();
        repo.delete_character(id).await.unwrap();
        assert_eq!(
            repo.character_item(item_id).await.unwrap_err(),
            RepoError::NotFound
        );
    }
}
