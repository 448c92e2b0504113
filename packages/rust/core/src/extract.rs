//! Pure extraction of [`DerivedAttributes`] from an item's detail document.

use serde_json::Value;

use pokespin_shared::{DerivedAttributes, Stat, StatBlock, UNKNOWN_TYPE};

/// Slot assigned to tags that carry none, so they sort last.
const MISSING_SLOT: i64 = 999;

/// Raw detail document of one item, as returned by the API.
///
/// Only `types[]` (`{slot, type: {name}}`) and `stats[]`
/// (`{base_stat, stat: {name}}`) are read; everything else is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetail(Value);

impl ItemDetail {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// `(slot, name)` of each type tag, in document order.
    pub fn type_tags(&self) -> Vec<(i64, String)> {
        entries(&self.0, "types")
            .map(|tag| {
                let slot = tag.get("slot").and_then(Value::as_i64).unwrap_or(MISSING_SLOT);
                let name = tag
                    .get("type")
                    .and_then(|t| t.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (slot, name)
            })
            .collect()
    }

    /// Type label plus stat block.
    pub fn derive(&self) -> DerivedAttributes {
        DerivedAttributes {
            type_label: type_label(self.type_tags()),
            stats: stat_block(&self.0),
        }
    }
}

/// Join tag names ordered by slot with `/`; `"unknown"` when none survive.
///
/// Names are trimmed and empty names dropped. Equal slots keep input order.
pub fn type_label(mut tags: Vec<(i64, String)>) -> String {
    tags.sort_by_key(|(slot, _)| *slot);
    let names: Vec<&str> = tags
        .iter()
        .map(|(_, name)| name.trim())
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        UNKNOWN_TYPE.to_string()
    } else {
        names.join("/")
    }
}

/// Map known stat names to their slots.
///
/// Unknown names, non-integer values and values outside `u32` are skipped;
/// missing stats stay 0.
pub fn stat_block(detail: &Value) -> StatBlock {
    let mut block = StatBlock::default();
    for entry in entries(detail, "stats") {
        let Some(stat) = entry
            .get("stat")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .and_then(Stat::from_identifier)
        else {
            continue;
        };
        let Some(value) = entry
            .get("base_stat")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
        else {
            continue;
        };
        block.set(stat, value);
    }
    block
}

/// Elements of the array at `detail[key]`; nothing if absent or not an array.
fn entries<'a>(detail: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    detail
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}
