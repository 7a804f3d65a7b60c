//! Wire types shared by client and server messages.

use serde::{Deserialize, Serialize};

use crate::ProtoError;

/// One item or mount effect. `dice_num`/`dice_side` carry the rolled range
/// for characteristic effects, and double as an id/timestamp pair for the
/// mount-certificate effect (id 995).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub id: i32,
    pub dice_num: i32,
    pub dice_side: i64,
    #[serde(default)]
    pub param: String,
}

impl Effect {
    pub fn encode(&self) -> String {
        format!(
            "{:x}#{:x}#{:x}#{}",
            self.id, self.dice_num, self.dice_side, self.param
        )
    }
}

/// Encode an effect list the way stores and inventories expect it.
pub fn encode_effects(effects: &[Effect]) -> String {
    effects
        .iter()
        .map(Effect::encode)
        .collect::<Vec<_>>()
        .join(",")
}

/// One leg of a movement path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirAndCell {
    pub dir: i32,
    pub cell: i32,
}

impl DirAndCell {
    pub fn decode(s: &str) -> Result<Self, ProtoError> {
        let (dir, cell) = s.split_once(',').ok_or(ProtoError::Malformed("leg"))?;
        Ok(Self {
            dir: dir.parse().map_err(|_| ProtoError::BadNumber)?,
            cell: cell.parse().map_err(|_| ProtoError::BadNumber)?,
        })
    }

    pub fn encode(&self) -> String {
        format!("{},{}", self.dir, self.cell)
    }
}

pub fn encode_path(legs: &[DirAndCell]) -> String {
    legs.iter()
        .map(DirAndCell::encode)
        .collect::<Vec<_>>()
        .join(";")
}

pub fn decode_path(s: &str) -> Result<Vec<DirAndCell>, ProtoError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(';').map(DirAndCell::decode).collect()
}

/// Characteristic ids as they appear on the wire.
pub mod characteristic {
    pub const AP: i32 = 1;
    pub const MP: i32 = 2;
    pub const STRENGTH: i32 = 10;
    pub const VITALITY: i32 = 11;
    pub const WISDOM: i32 = 12;
    pub const CHANCE: i32 = 13;
    pub const AGILITY: i32 = 14;
    pub const INTELLIGENCE: i32 = 15;
    pub const MAX_SUMMONED_CREATURES_BOOST: i32 = 26;
    pub const DODGE_AP: i32 = 27;
    pub const DODGE_MP: i32 = 28;
    pub const INITIATIVE: i32 = 44;
    pub const PROSPECTING: i32 = 48;
    pub const MAX_WEIGHT: i32 = 50;

    pub const ALL: &[i32] = &[
        AP,
        MP,
        STRENGTH,
        VITALITY,
        WISDOM,
        CHANCE,
        AGILITY,
        INTELLIGENCE,
        MAX_SUMMONED_CREATURES_BOOST,
        DODGE_AP,
        DODGE_MP,
        INITIATIVE,
        PROSPECTING,
        MAX_WEIGHT,
    ];
}

/// One characteristic with its four contribution buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Characteristic {
    pub id: i32,
    pub base: i32,
    pub equipment: i32,
    pub feat: i32,
    pub boost: i32,
}

impl Characteristic {
    pub fn total(&self) -> i32 {
        self.base + self.equipment + self.feat + self.boost
    }

    pub fn encode(&self) -> String {
        format!(
            "{}:{},{},{},{}",
            self.id, self.base, self.equipment, self.feat, self.boost
        )
    }
}

/// Item positions. Inventory is -1; equipment slots are 0..=16 plus the
/// 20..=27 blessing band; 35..=62 are the hotbar.
pub mod item_pos {
    pub const INVENTORY: i32 = -1;
    pub const AMULET: i32 = 0;
    pub const WEAPON: i32 = 1;
    pub const RING_RIGHT: i32 = 2;
    pub const BELT: i32 = 3;
    pub const RING_LEFT: i32 = 4;
    pub const BOOTS: i32 = 5;
    pub const HAT: i32 = 6;
    pub const CLOAK: i32 = 7;
    pub const PET: i32 = 8;
    pub const DOFUS_1: i32 = 9;
    pub const DOFUS_6: i32 = 14;
    pub const SHIELD: i32 = 15;
    pub const DRAGOTURKEY: i32 = 16;
    pub const MUTATION_ITEM: i32 = 20;
    pub const BOOST_FOOD: i32 = 21;
    pub const BLESSING_1: i32 = 22;
    pub const BLESSING_2: i32 = 23;
    pub const CURSE_1: i32 = 24;
    pub const CURSE_2: i32 = 25;
    pub const ROLEPLAY_BUFF: i32 = 26;
    pub const FOLLOWING_CHARACTER: i32 = 27;
    pub const HOTBAR_FIRST: i32 = 35;
    pub const HOTBAR_LAST: i32 = 62;

    /// Slots an equip request may target.
    pub fn is_equipable(pos: i32) -> bool {
        (AMULET..=DRAGOTURKEY).contains(&pos) || (MUTATION_ITEM..=FOLLOWING_CHARACTER).contains(&pos)
    }

    /// Worn slots that feed the characteristic pipeline.
    pub fn is_worn(pos: i32) -> bool {
        (AMULET..=FOLLOWING_CHARACTER).contains(&pos)
    }

    pub fn is_hotbar(pos: i32) -> bool {
        (HOTBAR_FIRST..=HOTBAR_LAST).contains(&pos)
    }

    /// Slots whose contents show on the map sprite.
    pub fn is_accessory(pos: i32) -> bool {
        matches!(pos, WEAPON | HAT | CLOAK | PET | SHIELD)
    }
}

/// Item-template type ids.
pub mod item_type {
    pub const AMULET: i32 = 1;
    pub const BOW: i32 = 2;
    pub const WAND: i32 = 3;
    pub const STAFF: i32 = 4;
    pub const DAGGER: i32 = 5;
    pub const SWORD: i32 = 6;
    pub const HAMMER: i32 = 7;
    pub const SHOVEL: i32 = 8;
    pub const RING: i32 = 9;
    pub const BELT: i32 = 10;
    pub const BOOTS: i32 = 11;
    pub const HAT: i32 = 16;
    pub const CLOAK: i32 = 17;
    pub const PET: i32 = 18;
    pub const AXE: i32 = 19;
    pub const TOOL: i32 = 20;
    pub const PICKAXE: i32 = 21;
    pub const SCYTHE: i32 = 22;
    pub const DOFUS: i32 = 23;
    pub const BACKPACK: i32 = 24;
    pub const SHIELD: i32 = 25;
    pub const SOUL_STONE: i32 = 26;
    pub const CROSSBOW: i32 = 27;
    pub const MAGIC_WEAPON: i32 = 28;
    pub const USABLE_ITEM: i32 = 33;
    pub const CANDY: i32 = 42;
    pub const MOUNT_CERTIFICATE: i32 = 82;

    pub fn is_weapon(t: i32) -> bool {
        matches!(
            t,
            BOW | WAND
                | STAFF
                | DAGGER
                | SWORD
                | HAMMER
                | SHOVEL
                | AXE
                | TOOL
                | PICKAXE
                | SCYTHE
                | SOUL_STONE
                | CROSSBOW
                | MAGIC_WEAPON
        )
    }
}

/// Class ids.
pub mod class {
    pub const FECA: i32 = 1;
    pub const OSAMODAS: i32 = 2;
    pub const ENUTROF: i32 = 3;
    pub const SRAM: i32 = 4;
    pub const XELOR: i32 = 5;
    pub const ECAFLIP: i32 = 6;
    pub const ENIRIPSA: i32 = 7;
    pub const IOP: i32 = 8;
    pub const CRA: i32 = 9;
    pub const SADIDA: i32 = 10;
    pub const SACRIER: i32 = 11;
    pub const PANDAWA: i32 = 12;

    pub fn is_valid(id: i32) -> bool {
        (FECA..=PANDAWA).contains(&id)
    }
}

/// Alignment ids.
pub mod alignment {
    pub const NEUTRAL: i32 = 0;
    pub const BONTARIAN: i32 = 1;
    pub const BRAKMARIAN: i32 = 2;
    pub const MERCENARY: i32 = 3;
}

/// Chat channel wire characters.
pub mod chat_channel {
    pub const ADMIN: char = '@';
    pub const INFO: char = 'i';
    pub const PUBLIC: char = '*';
    pub const PRIVATE: char = 'p';
    pub const GROUP: char = '$';
    pub const TEAM: char = '#';
    pub const GUILD: char = '%';
    pub const ALIGNMENT: char = '!';
    pub const RECRUITMENT: char = '?';
    pub const TRADING: char = ':';
    pub const NEWBIES: char = '^';

    pub const ALL: &[char] = &[
        ADMIN, INFO, PUBLIC, PRIVATE, GROUP, TEAM, GUILD, ALIGNMENT, RECRUITMENT, TRADING, NEWBIES,
    ];

    pub fn is_valid(c: char) -> bool {
        ALL.contains(&c)
    }
}

/// Game action type ids shared by client requests and server envelopes.
pub mod game_action {
    pub const MOVEMENT: i32 = 1;
    pub const CHALLENGE: i32 = 900;
    pub const CHALLENGE_ACCEPT: i32 = 901;
    pub const CHALLENGE_REFUSE: i32 = 902;
}

/// Exchange type ids.
pub mod exchange {
    pub const NPC_BUY: i32 = 0;
    pub const PADDOCK: i32 = 8;
}

/// The five sprite-visible equipment slots, as template ids (0 = empty).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accessories {
    pub weapon: i32,
    pub hat: i32,
    pub cloak: i32,
    pub pet: i32,
    pub shield: i32,
}

impl Accessories {
    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.weapon, self.hat, self.cloak, self.pet, self.shield
        )
    }
}

/// One entry of an `InfosMessage` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfosMessageEntry {
    pub id: i32,
    pub args: Vec<String>,
}

impl InfosMessageEntry {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            args: Vec::new(),
        }
    }

    pub fn with_args(id: i32, args: Vec<String>) -> Self {
        Self { id, args }
    }

    pub fn encode(&self) -> String {
        if self.args.is_empty() {
            format!("{}", self.id)
        } else {
            format!("{};{}", self.id, self.args.join(","))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfosChat {
    Info,
    Error,
}

impl InfosChat {
    pub fn as_char(self) -> char {
        match self {
            InfosChat::Info => 'i',
            InfosChat::Error => 'e',
        }
    }
}

/// On-map visual descriptor of a character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSprite {
    pub transition: bool,
    pub id: i32,
    pub cell: i32,
    pub direction: i32,
    pub class_id: i32,
    pub name: String,
    pub sex: i32,
    pub gfx_id: i32,
    pub level: i32,
    pub color1: String,
    pub color2: String,
    pub color3: String,
    pub accessories: Accessories,
    pub alignment: i32,
    pub grade: i32,
    pub aura: i32,
    pub mount_model_id: i32,
    pub mount_custom_color1: String,
    pub mount_custom_color2: String,
    pub mount_custom_color3: String,
}

/// On-map visual descriptor of an NPC. NPC client-facing ids are negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcSprite {
    pub id: i32,
    pub cell: i32,
    pub direction: i32,
    pub template_id: i32,
    pub gfx_id: i32,
    pub sex: i32,
    pub scale_x: i32,
    pub scale_y: i32,
    pub color1: String,
    pub color2: String,
    pub color3: String,
    pub extra_clip_id: i32,
    pub custom_artwork: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameMovementSprite {
    Character(CharacterSprite),
    Npc(NpcSprite),
}

impl GameMovementSprite {
    pub fn encode(&self) -> String {
        match self {
            GameMovementSprite::Character(c) => format!(
                "{};{};{};{};{};{};{};{};{};{};{};{};{};{};{};{};{};{};{};{}",
                u8::from(c.transition),
                c.id,
                c.cell,
                c.direction,
                c.class_id,
                c.name,
                c.sex,
                c.gfx_id,
                c.level,
                c.color1,
                c.color2,
                c.color3,
                c.accessories.encode(),
                c.alignment,
                c.grade,
                c.aura,
                c.mount_model_id,
                c.mount_custom_color1,
                c.mount_custom_color2,
                c.mount_custom_color3,
            ),
            GameMovementSprite::Npc(n) => format!(
                "0;{};{};{};npc;{};{};{};{};{};{};{};{};{};{}",
                n.id,
                n.cell,
                n.direction,
                n.template_id,
                n.gfx_id,
                n.sex,
                n.scale_x,
                n.scale_y,
                n.color1,
                n.color2,
                n.color3,
                n.extra_clip_id,
                n.custom_artwork,
            ),
        }
    }
}

/// Mount sheet data as sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountData {
    pub id: i32,
    pub model_id: i32,
    pub capacities: Vec<i32>,
    pub name: String,
    pub sex: i32,
    pub xp: i64,
    pub xp_min: i64,
    pub xp_max: i64,
    pub level: i32,
    pub mountable: bool,
    pub effects: Vec<Effect>,
}

impl MountData {
    pub fn encode(&self) -> String {
        let caps = self
            .capacities
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{};{};{};{};{};{};{};{};{};{};{}",
            self.id,
            self.model_id,
            caps,
            self.name,
            self.sex,
            self.xp,
            self.xp_min,
            self.xp_max,
            self.level,
            u8::from(self.mountable),
            encode_effects(&self.effects),
        )
    }
}

/// A spell as listed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpellEntry {
    pub id: i32,
    pub level: i32,
    pub position: i32,
}

impl SpellEntry {
    pub fn encode(&self) -> String {
        format!("{},{},{}", self.id, self.level, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_effects_in_hex() {
        let effects = vec![
            Effect {
                id: 118,
                dice_num: 25,
                dice_side: 0,
                param: String::new(),
            },
            Effect {
                id: 995,
                dice_num: 7,
                dice_side: 1_600_000_000_000,
                param: String::new(),
            },
        ];
        assert_eq!(encode_effects(&effects), "76#19#0#,3e3#7#174876e800#");
    }

    #[test]
    fn path_round_trip() {
        let legs = vec![DirAndCell { dir: 3, cell: 109 }, DirAndCell { dir: 3, cell: 118 }];
        let encoded = encode_path(&legs);
        assert_eq!(encoded, "3,109;3,118");
        assert_eq!(decode_path(&encoded).unwrap(), legs);
    }

    #[test]
    fn position_ranges() {
        assert!(item_pos::is_equipable(item_pos::AMULET));
        assert!(item_pos::is_equipable(item_pos::DRAGOTURKEY));
        assert!(item_pos::is_equipable(item_pos::FOLLOWING_CHARACTER));
        assert!(!item_pos::is_equipable(item_pos::INVENTORY));
        assert!(!item_pos::is_equipable(17));
        assert!(item_pos::is_hotbar(35));
        assert!(item_pos::is_hotbar(62));
        assert!(!item_pos::is_hotbar(63));
    }
}
