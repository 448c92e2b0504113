//! Persistent attribute cache keyed by item ID.
//!
//! The cache is a single JSON object mapping the string form of an item ID to
//! its [`DerivedAttributes`]. Entries are authoritative: once present they are
//! never refetched or expired. Loading never fails; a missing or corrupt file
//! yields an empty cache, and a single unusable entry is dropped on its own.
//! Saving goes through a [`StagedFile`], so a crash mid-write leaves the
//! previously saved file intact.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use pokespin_shared::{
    DerivedAttributes, PokespinError, Result, StagedFile, Stat, StatBlock, UNKNOWN_TYPE,
};

/// In-memory view of the cache file, owned by one run.
#[derive(Debug, Clone)]
pub struct Cache {
    path: PathBuf,
    entries: BTreeMap<String, DerivedAttributes>,
}

impl Cache {
    /// An empty cache that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the cache at `path`, degrading to empty if absent, unreadable or malformed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cache file, starting empty");
                return Self::empty(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache unreadable, starting empty");
                return Self::empty(path);
            }
        };

        let raw = match serde_json::from_str::<BTreeMap<String, Value>>(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache malformed, starting empty");
                return Self::empty(path);
            }
        };

        let mut entries = BTreeMap::new();
        let mut skipped = 0usize;
        for (key, value) in raw {
            match entry_from_value(&value) {
                Some(entry) => {
                    entries.insert(key, entry);
                }
                None => {
                    warn!(path = %path.display(), id = %key, "unusable cache entry, will refetch");
                    skipped += 1;
                }
            }
        }

        info!(path = %path.display(), entries = entries.len(), skipped, "loaded cache");
        Self { path, entries }
    }

    /// Look up the cached attributes of item `id`.
    pub fn get(&self, id: u32) -> Option<&DerivedAttributes> {
        self.entries.get(&id.to_string())
    }

    /// Record attributes for item `id` (in memory only).
    pub fn put(&mut self, id: u32, entry: DerivedAttributes) {
        self.entries.insert(id.to_string(), entry);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the whole mapping durably via `<path>.tmp` + rename.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string(&self.entries)
            .map_err(|e| PokespinError::parse(format!("failed to serialize cache: {e}")))?;

        let staged = StagedFile::new(&self.path);
        staged.write_all(json)?;
        staged.commit()?;

        debug!(path = %self.path.display(), entries = self.entries.len(), "saved cache");
        Ok(())
    }
}

/// Convert one stored entry, tolerating numbers written as floats or strings.
///
/// Empty objects, non-objects and stats that are not non-negative numbers
/// yield `None`.
fn entry_from_value(value: &Value) -> Option<DerivedAttributes> {
    let object = value.as_object().filter(|o| !o.is_empty())?;

    let type_label = match object.get("TYPE") {
        None | Some(Value::Null) => UNKNOWN_TYPE.to_string(),
        Some(Value::String(label)) => label.clone(),
        Some(_) => return None,
    };

    let mut stats = StatBlock::default();
    for stat in Stat::ALL {
        if let Some(value) = stat_value(object, stat.column())? {
            stats.set(stat, value);
        }
    }

    Some(DerivedAttributes { type_label, stats })
}

/// `Some(None)` when the stat is absent, `None` when it is present but unusable.
fn stat_value(object: &Map<String, Value>, column: &str) -> Option<Option<u32>> {
    let value = match object.get(column) {
        None | Some(Value::Null) => return Some(None),
        Some(value) => value,
    };
    let number = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(number).ok().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pokespin_shared::{StatBlock, UNKNOWN_TYPE};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pokespin-cache-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn bulbasaur() -> DerivedAttributes {
        DerivedAttributes {
            type_label: "grass/poison".into(),
            stats: StatBlock {
                hp: 45,
                attack: 49,
                defense: 49,
                special_attack: 65,
                special_defense: 65,
                speed: 45,
            },
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = temp_dir();
        let cache = Cache::load(dir.join("absent.json"));
        assert!(cache.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = temp_dir();
        let path = dir.join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = Cache::load(&path);
        assert!(cache.is_empty());

        // A structurally wrong document is treated the same way.
        std::fs::write(&path, r#"["1", "2"]"#).unwrap();
        assert!(Cache::load(&path).is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn put_get_save_load() {
        let dir = temp_dir();
        let path = dir.join("cache.json");

        let mut cache = Cache::load(&path);
        assert!(cache.get(1).is_none());
        cache.put(1, bulbasaur());
        assert_eq!(cache.get(1), Some(&bulbasaur()));

        // Nothing is durable until save.
        assert!(!path.exists());
        cache.save().unwrap();
        assert!(!dir.join("cache.json.tmp").exists());

        let reloaded = Cache::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(1), Some(&bulbasaur()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_format_is_keyed_by_string_id() {
        let dir = temp_dir();
        let path = dir.join("cache.json");

        let mut cache = Cache::empty(&path);
        cache.put(25, bulbasaur());
        cache.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["25"]["TYPE"], "grass/poison");
        assert_eq!(raw["25"]["SPATK"], 65);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn loads_files_written_by_other_tools() {
        let dir = temp_dir();
        let path = dir.join("cache.json");
        std::fs::write(
            &path,
            r#"{"4": {"TYPE": "fire", "HP": 39, "ATK": 52, "DEF": 43, "SPATK": 60, "SPDEF": 50, "SPD": 65},
                "132": {"HP": 48}}"#,
        )
        .unwrap();

        let cache = Cache::load(&path);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(4).unwrap().stats.speed, 65);
        let ditto = cache.get(132).unwrap();
        assert_eq!(ditto.type_label, UNKNOWN_TYPE);
        assert_eq!(ditto.stats.hp, 48);
        assert_eq!(ditto.stats.attack, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_entry_does_not_discard_the_rest() {
        let dir = temp_dir();
        let path = dir.join("cache.json");
        std::fs::write(
            &path,
            r#"{"1": {"TYPE": "grass/poison", "HP": 45, "ATK": 49, "DEF": 49, "SPATK": 65, "SPDEF": 65, "SPD": 45},
                "4": {"TYPE": "fire", "HP": 39.0, "ATK": "52", "SPD": 65},
                "7": {"TYPE": "water", "HP": -44},
                "9": {},
                "12": "butterfree"}"#,
        )
        .unwrap();

        let mut cache = Cache::load(&path);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(1), Some(&bulbasaur()));
        let charmander = cache.get(4).unwrap();
        assert_eq!(charmander.stats.hp, 39);
        assert_eq!(charmander.stats.attack, 52);
        assert!(!cache.contains(7));
        assert!(!cache.contains(9));
        assert!(!cache.contains(12));

        // The next save keeps the usable entries.
        cache.put(25, DerivedAttributes::default());
        cache.save().unwrap();
        let reloaded = Cache::load(&path);
        assert!(reloaded.contains(1));
        assert!(reloaded.contains(4));
        assert!(reloaded.contains(25));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_overwrites_previous_contents() {
        let dir = temp_dir();
        let path = dir.join("cache.json");

        let mut cache = Cache::empty(&path);
        cache.put(1, bulbasaur());
        cache.save().unwrap();

        cache.put(2, DerivedAttributes::default());
        cache.save().unwrap();

        let reloaded = Cache::load(&path);
        assert!(reloaded.contains(1));
        assert!(reloaded.contains(2));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
