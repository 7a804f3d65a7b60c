//! Server-side caches.
//!
//! The static cache is loaded once at startup and read-only afterwards. The
//! mutable cache lives inside the server state mutex: per-map NPC lists,
//! markets, market items by market, and lazily decoded map cell arrays.

use std::collections::HashMap;

use crate::model::{
    Cell, Class, EffectTemplate, GameMap, ItemSet, ItemTemplate, Market, MarketItem,
    MountTemplate, Npc, NpcDialog, NpcResponse, NpcTemplate, Spell,
};
use crate::repository::Repository;

#[derive(Debug, Default)]
pub struct StaticCache {
    pub game_maps: HashMap<i32, GameMap>,
    pub effects: HashMap<i32, EffectTemplate>,
    pub item_sets: HashMap<i32, ItemSet>,
    pub items: HashMap<i32, ItemTemplate>,
    pub npc_templates: HashMap<i32, NpcTemplate>,
    pub npc_dialogs: HashMap<i32, NpcDialog>,
    pub npc_responses: HashMap<i32, NpcResponse>,
    pub classes: HashMap<i32, Class>,
    pub spells: HashMap<i32, Spell>,
    pub mounts: HashMap<i32, MountTemplate>,
}

#[derive(Debug, Default)]
pub struct MutableCache {
    pub npcs_by_map_id: HashMap<i32, Vec<Npc>>,
    pub markets: HashMap<String, Market>,
    pub market_items_by_market_id: HashMap<String, HashMap<i32, MarketItem>>,
    pub game_map_cells: HashMap<i32, Vec<Cell>>,
}

pub async fn load(repo: &Repository) -> anyhow::Result<(StaticCache, MutableCache)> {
    let static_cache = StaticCache {
        game_maps: repo.game_maps().await?,
        effects: repo.effect_templates().await?,
        item_sets: repo.item_sets().await?,
        items: repo.item_templates().await?,
        npc_templates: repo.npc_templates().await?,
        npc_dialogs: repo.npc_dialogs().await?,
        npc_responses: repo.npc_responses().await?,
        classes: repo.classes().await?,
        spells: repo.spells().await?,
        mounts: repo.mount_templates().await?,
    };

    let markets = repo.markets().await?;
    let mut market_items_by_market_id = HashMap::with_capacity(markets.len());
    for id in markets.keys() {
        market_items_by_market_id.insert(id.clone(), repo.market_items_by_market_id(id).await?);
    }

    let mut npcs_by_map_id: HashMap<i32, Vec<Npc>> = HashMap::new();
    for npc in repo.npcs().await? {
        npcs_by_map_id.entry(npc.map_id).or_default().push(npc);
    }

    let mutable_cache = MutableCache {
        npcs_by_map_id,
        markets,
        market_items_by_market_id,
        game_map_cells: HashMap::new(),
    };

    Ok((static_cache, mutable_cache))
}
