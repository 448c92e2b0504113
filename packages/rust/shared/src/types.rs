//! Core domain types for the enrichment table.

use serde::{Deserialize, Serialize};

/// Label used when an item has no named type tags.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Columns every input table must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["ID", "Name", "SpriteURL", "BallType"];

/// Column order of the enriched output table.
pub const OUTPUT_COLUMNS: [&str; 11] = [
    "ID", "Name", "SpriteURL", "BallType", "TYPE", "HP", "ATK", "DEF", "SPATK", "SPDEF", "SPD",
];

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One catalog item as read from the existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Unique, positive item ID.
    pub id: u32,
    pub name: String,
    pub sprite_url: String,
    /// Category column (`BallType`).
    pub category: String,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// The six fixed stat slots, in output column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Hp,
    Attack,
    Defense,
    SpecialAttack,
    SpecialDefense,
    Speed,
}

impl Stat {
    /// All stats in output column order.
    pub const ALL: [Stat; 6] = [
        Stat::Hp,
        Stat::Attack,
        Stat::Defense,
        Stat::SpecialAttack,
        Stat::SpecialDefense,
        Stat::Speed,
    ];

    /// Resolve an upstream stat identifier (`"special-attack"`, ...).
    pub fn from_identifier(name: &str) -> Option<Self> {
        match name {
            "hp" => Some(Self::Hp),
            "attack" => Some(Self::Attack),
            "defense" => Some(Self::Defense),
            "special-attack" => Some(Self::SpecialAttack),
            "special-defense" => Some(Self::SpecialDefense),
            "speed" => Some(Self::Speed),
            _ => None,
        }
    }

    /// Output column name.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Hp => "HP",
            Self::Attack => "ATK",
            Self::Defense => "DEF",
            Self::SpecialAttack => "SPATK",
            Self::SpecialDefense => "SPDEF",
            Self::Speed => "SPD",
        }
    }
}

/// Base stat values; absent stats are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    #[serde(rename = "HP", default)]
    pub hp: u32,
    #[serde(rename = "ATK", default)]
    pub attack: u32,
    #[serde(rename = "DEF", default)]
    pub defense: u32,
    #[serde(rename = "SPATK", default)]
    pub special_attack: u32,
    #[serde(rename = "SPDEF", default)]
    pub special_defense: u32,
    #[serde(rename = "SPD", default)]
    pub speed: u32,
}

impl StatBlock {
    pub fn get(&self, stat: Stat) -> u32 {
        match stat {
            Stat::Hp => self.hp,
            Stat::Attack => self.attack,
            Stat::Defense => self.defense,
            Stat::SpecialAttack => self.special_attack,
            Stat::SpecialDefense => self.special_defense,
            Stat::Speed => self.speed,
        }
    }

    pub fn set(&mut self, stat: Stat, value: u32) {
        let slot = match stat {
            Stat::Hp => &mut self.hp,
            Stat::Attack => &mut self.attack,
            Stat::Defense => &mut self.defense,
            Stat::SpecialAttack => &mut self.special_attack,
            Stat::SpecialDefense => &mut self.special_defense,
            Stat::Speed => &mut self.speed,
        };
        *slot = value;
    }

    /// Values in output column order.
    pub fn values(&self) -> [u32; 6] {
        Stat::ALL.map(|s| self.get(s))
    }
}

// ---------------------------------------------------------------------------
// DerivedAttributes
// ---------------------------------------------------------------------------

/// Attributes derived from one item's fetched detail.
///
/// This is also the persisted cache entry shape:
/// `{"TYPE": "grass/poison", "HP": 45, "ATK": 49, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAttributes {
    #[serde(rename = "TYPE", default = "unknown_type")]
    pub type_label: String,
    #[serde(flatten)]
    pub stats: StatBlock,
}

impl Default for DerivedAttributes {
    fn default() -> Self {
        Self {
            type_label: unknown_type(),
            stats: StatBlock::default(),
        }
    }
}

fn unknown_type() -> String {
    UNKNOWN_TYPE.into()
}

/// A row merged with its derived attributes, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRow {
    pub row: Row,
    pub attributes: DerivedAttributes,
}

impl EnrichedRow {
    /// Field values in [`OUTPUT_COLUMNS`] order.
    pub fn record(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(OUTPUT_COLUMNS.len());
        out.push(self.row.id.to_string());
        out.push(self.row.name.clone());
        out.push(self.row.sprite_url.clone());
        out.push(self.row.category.clone());
        out.push(self.attributes.type_label.clone());
        out.extend(self.attributes.stats.values().iter().map(u32::to_string));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_columns_match_output_order() {
        let columns: Vec<&str> = Stat::ALL.iter().map(Stat::column).collect();
        assert_eq!(columns, OUTPUT_COLUMNS[5..]);
    }

    #[test]
    fn cache_entry_json_shape() {
        let attrs = DerivedAttributes {
            type_label: "grass/poison".into(),
            stats: StatBlock {
                hp: 45,
                attack: 49,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["TYPE"], "grass/poison");
        assert_eq!(json["HP"], 45);
        assert_eq!(json["ATK"], 49);
        assert_eq!(json["SPD"], 0);
    }

    #[test]
    fn partial_cache_entry_uses_defaults() {
        let attrs: DerivedAttributes = serde_json::from_str(r#"{"HP": 10}"#).unwrap();
        assert_eq!(attrs.type_label, UNKNOWN_TYPE);
        assert_eq!(attrs.stats.hp, 10);
        assert_eq!(attrs.stats.speed, 0);
    }

    #[test]
    fn enriched_record_follows_column_order() {
        let enriched = EnrichedRow {
            row: Row {
                id: 1,
                name: "bulbasaur".into(),
                sprite_url: "https://img/1.png".into(),
                category: "pokeball".into(),
            },
            attributes: DerivedAttributes {
                type_label: "grass/poison".into(),
                stats: StatBlock {
                    hp: 45,
                    attack: 49,
                    defense: 49,
                    special_attack: 65,
                    special_defense: 65,
                    speed: 45,
                },
            },
        };
        assert_eq!(
            enriched.record(),
            vec![
                "1", "bulbasaur", "https://img/1.png", "pokeball", "grass/poison", "45", "49",
                "49", "65", "65", "45"
            ]
        );
    }
}
