//! Bulk enrichment from the published CSV dumps instead of per-item fetches.
//!
//! Four dump files are kept in a download directory and fetched only when
//! missing or empty. They are joined into per-item type labels and stat
//! blocks, and the table is rewritten through the same staged file and
//! publish step as the per-item pipeline.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, instrument};

use pokespin_fetch::{Fetcher, Sleeper};
use pokespin_shared::{
    BulkConfig, DerivedAttributes, EnrichedRow, PokespinError, Result, StagedFile, Stat, StatBlock,
};

use crate::extract::type_label;
use crate::pipeline::ProgressReporter;
use crate::publish::publish;
use crate::table::{TableWriter, open_staged, read_rows, sync_staged};

/// Per-item stat values: `pokemon_id,stat_id,base_stat,effort`.
pub const ITEM_STATS_FILE: &str = "pokemon_stats.csv";
/// Per-item type slots: `pokemon_id,type_id,slot`.
pub const ITEM_TYPES_FILE: &str = "pokemon_types.csv";
/// Type identifiers: `id,identifier,...`.
pub const TYPES_FILE: &str = "types.csv";
/// Stat identifiers: `id,...,identifier,...`.
pub const STATS_FILE: &str = "stats.csv";

/// Every dump the join needs.
pub const DUMP_FILES: [&str; 4] = [ITEM_STATS_FILE, ITEM_TYPES_FILE, TYPES_FILE, STATS_FILE];

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Make sure every dump exists in `dir`, downloading the missing or empty ones.
///
/// Returns the names of the files that were downloaded.
pub async fn ensure_dumps<S: Sleeper>(
    fetcher: &Fetcher<S>,
    base_url: &str,
    dir: &Path,
) -> Result<Vec<&'static str>> {
    let mut downloaded = Vec::new();
    for name in DUMP_FILES {
        let dest = dir.join(name);
        let present = std::fs::metadata(&dest)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);
        if present {
            debug!(file = name, "dump already present");
            continue;
        }

        let url = format!("{}/{name}", base_url.trim_end_matches('/'));
        let bytes = fetcher.fetch_bytes(&url).await?;

        let staged = StagedFile::new(&dest);
        staged.write_all(&bytes)?;
        staged.commit()?;
        info!(file = name, bytes = bytes.len(), "downloaded dump");
        downloaded.push(name);
    }
    Ok(downloaded)
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdentifierRecord {
    id: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct ItemTypeRecord {
    pokemon_id: String,
    type_id: String,
    slot: String,
}

#[derive(Debug, Deserialize)]
struct ItemStatRecord {
    pokemon_id: String,
    stat_id: String,
    base_stat: String,
}

/// Type tags and stat blocks of every item found in the dumps.
#[derive(Debug, Default)]
pub struct DumpIndex {
    types: HashMap<u32, Vec<(i64, String)>>,
    stats: HashMap<u32, StatBlock>,
}

impl DumpIndex {
    /// Load and join the four dumps in `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let open = |name: &str| {
            let path = dir.join(name);
            std::fs::File::open(&path).map_err(|e| PokespinError::io(path, e))
        };
        Self::from_readers(
            open(TYPES_FILE)?,
            open(STATS_FILE)?,
            open(ITEM_TYPES_FILE)?,
            open(ITEM_STATS_FILE)?,
        )
    }

    /// Join dumps from any readers. Records with unparsable numbers are skipped.
    pub fn from_readers(
        types: impl Read,
        stats: impl Read,
        item_types: impl Read,
        item_stats: impl Read,
    ) -> Result<Self> {
        let type_names = read_identifiers(types, TYPES_FILE)?;
        let stat_names = read_identifiers(stats, STATS_FILE)?;

        let mut index = Self::default();

        for record in records::<ItemTypeRecord>(item_types, ITEM_TYPES_FILE)? {
            let (Some(id), Some(type_id), Some(slot)) = (
                number::<u32>(&record.pokemon_id),
                number::<u32>(&record.type_id),
                number::<i64>(&record.slot),
            ) else {
                continue;
            };
            let Some(name) = type_names.get(&type_id) else {
                continue;
            };
            index.types.entry(id).or_default().push((slot, name.clone()));
        }

        for record in records::<ItemStatRecord>(item_stats, ITEM_STATS_FILE)? {
            let (Some(id), Some(stat_id), Some(value)) = (
                number::<u32>(&record.pokemon_id),
                number::<u32>(&record.stat_id),
                number::<u32>(&record.base_stat),
            ) else {
                continue;
            };
            let Some(stat) = stat_names.get(&stat_id).and_then(|s| Stat::from_identifier(s)) else {
                continue;
            };
            index.stats.entry(id).or_default().set(stat, value);
        }

        debug!(
            typed = index.types.len(),
            with_stats = index.stats.len(),
            "joined dumps"
        );
        Ok(index)
    }

    /// Attributes of item `id`; `"unknown"` and zeros when absent.
    pub fn attributes(&self, id: u32) -> DerivedAttributes {
        DerivedAttributes {
            type_label: type_label(self.types.get(&id).cloned().unwrap_or_default()),
            stats: self.stats.get(&id).copied().unwrap_or_default(),
        }
    }
}

fn read_identifiers(reader: impl Read, file: &str) -> Result<HashMap<u32, String>> {
    Ok(records::<IdentifierRecord>(reader, file)?
        .into_iter()
        .filter_map(|r| Some((number::<u32>(&r.id)?, r.identifier.trim().to_string())))
        .collect())
}

fn records<T: serde::de::DeserializeOwned>(reader: impl Read, file: &str) -> Result<Vec<T>> {
    csv::Reader::from_reader(reader)
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| PokespinError::parse(format!("{file}: {e}")))
}

fn number<T: std::str::FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Result of the `bulk` pipeline.
#[derive(Debug)]
pub struct BulkReport {
    pub rows: usize,
    /// Dumps downloaded during this run (the rest were already present).
    pub downloaded: Vec<&'static str>,
    /// Rows whose item was absent from the dumps.
    pub unmatched: usize,
    pub table: PathBuf,
    pub backup: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Enrich the table from the CSV dumps, downloading them as needed.
pub async fn enrich_from_dumps(
    config: &BulkConfig,
    progress: &dyn ProgressReporter,
) -> Result<BulkReport> {
    let fetcher = Fetcher::new(&config.fetch)?;
    enrich_from_dumps_with(config, &fetcher, progress).await
}

/// [`enrich_from_dumps`] with a caller-provided fetcher.
#[instrument(skip_all, fields(table = %config.table.display()))]
pub async fn enrich_from_dumps_with<S: Sleeper>(
    config: &BulkConfig,
    fetcher: &Fetcher<S>,
    progress: &dyn ProgressReporter,
) -> Result<BulkReport> {
    let start = Instant::now();

    progress.phase("Downloading dumps");
    let downloaded = ensure_dumps(fetcher, &config.csv_base_url, &config.download_dir).await?;

    progress.phase("Joining dumps");
    let index = DumpIndex::load(&config.download_dir)?;

    progress.phase("Reading table");
    let rows = read_rows(&config.table)?;

    progress.phase("Writing table");
    let staged = StagedFile::new(&config.table);
    let mut out = TableWriter::new(open_staged(&staged)?)?;
    let mut unmatched = 0;
    for (idx, row) in rows.iter().enumerate() {
        let attributes = index.attributes(row.id);
        if attributes == DerivedAttributes::default() {
            unmatched += 1;
        }
        out.write(&EnrichedRow {
            row: row.clone(),
            attributes,
        })?;
        progress.item_done(&row.name, idx + 1, rows.len());
    }
    sync_staged(out.finish()?, &staged)?;

    progress.phase("Publishing");
    let published = publish(staged, &config.backup)?;

    let report = BulkReport {
        rows: rows.len(),
        downloaded,
        unmatched,
        table: published.table,
        backup: published.backup,
        elapsed: start.elapsed(),
    };
    info!(
        rows = report.rows,
        unmatched = report.unmatched,
        downloaded = report.downloaded.len(),
        "bulk pipeline complete"
    );
    progress.done(&format!("{} rows ({} unmatched)", report.rows, report.unmatched));

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::tests::temp_dir;
    use crate::pipeline::SilentProgress;
    use pokespin_shared::FetchConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TYPES: &str = "id,identifier,generation_id,damage_class_id\n\
        4,poison,1,1\n\
        10,fire,1,2\n\
        12,grass,1,2\n\
        oops,broken,1,1\n";
    const STATS: &str = "id,damage_class_id,identifier,is_battle_only,game_index\n\
        1,,hp,0,1\n\
        2,2,attack,0,2\n\
        6,,speed,0,4\n\
        7,,accuracy,1,\n";
    const ITEM_TYPES: &str = "pokemon_id,type_id,slot\n\
        1,4,2\n\
        1,12,1\n\
        4,10,1\n\
        5,99,1\n";
    const ITEM_STATS: &str = "pokemon_id,stat_id,base_stat,effort\n\
        1,1,45,0\n\
        1,2,49,0\n\
        1,6,45,0\n\
        1,7,100,0\n\
        4,1,39,0\n\
        4,2,x,0\n";

    fn index() -> DumpIndex {
        DumpIndex::from_readers(
            TYPES.as_bytes(),
            STATS.as_bytes(),
            ITEM_TYPES.as_bytes(),
            ITEM_STATS.as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn joins_types_by_slot_and_known_stats() {
        let attrs = index().attributes(1);
        assert_eq!(attrs.type_label, "grass/poison");
        assert_eq!(attrs.stats.hp, 45);
        assert_eq!(attrs.stats.attack, 49);
        assert_eq!(attrs.stats.speed, 45);
        assert_eq!(attrs.stats.defense, 0);
    }

    #[test]
    fn unparsable_and_unknown_records_are_skipped() {
        let index = index();
        let charmander = index.attributes(4);
        assert_eq!(charmander.type_label, "fire");
        assert_eq!(charmander.stats.hp, 39);
        assert_eq!(charmander.stats.attack, 0);

        // Type 99 is not in types.csv.
        assert_eq!(index.attributes(5).type_label, "unknown");
        assert_eq!(index.attributes(999), DerivedAttributes::default());
    }

    #[test]
    fn missing_dump_columns_are_parse_errors() {
        let err = DumpIndex::from_readers(
            "id,name\n1,x\n".as_bytes(),
            STATS.as_bytes(),
            ITEM_TYPES.as_bytes(),
            ITEM_STATS.as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, PokespinError::Parse { .. }));
        assert!(err.to_string().contains("types.csv"));
    }

    async fn mount_dumps(server: &MockServer) {
        for (name, body) in [
            (TYPES_FILE, TYPES),
            (STATS_FILE, STATS),
            (ITEM_TYPES_FILE, ITEM_TYPES),
            (ITEM_STATS_FILE, ITEM_STATS),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/csv/{name}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(server)
                .await;
        }
    }

    fn config_in(dir: &Path, base: String) -> BulkConfig {
        BulkConfig {
            table: dir.join("pokeLIST.csv"),
            backup: dir.join("pokeLIST.csv.bak"),
            csv_base_url: base,
            download_dir: dir.join("dumps"),
            fetch: FetchConfig::default(),
        }
    }

    #[tokio::test]
    async fn downloads_only_missing_or_empty_dumps() {
        let server = MockServer::start().await;
        mount_dumps(&server).await;
        let dir = temp_dir();
        let dumps = dir.join("dumps");
        std::fs::create_dir_all(&dumps).unwrap();
        std::fs::write(dumps.join(TYPES_FILE), TYPES).unwrap();
        std::fs::write(dumps.join(STATS_FILE), "").unwrap();

        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let base = format!("{}/csv/", server.uri());
        let downloaded = ensure_dumps(&fetcher, &base, &dumps).await.unwrap();

        assert_eq!(downloaded, vec![ITEM_STATS_FILE, ITEM_TYPES_FILE, STATS_FILE]);
        assert_eq!(std::fs::read_to_string(dumps.join(STATS_FILE)).unwrap(), STATS);

        let again = ensure_dumps(&fetcher, &base, &dumps).await.unwrap();
        assert!(again.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bulk_pipeline_publishes_enriched_table() {
        let server = MockServer::start().await;
        mount_dumps(&server).await;
        let dir = temp_dir();
        let config = config_in(&dir, format!("{}/csv", server.uri()));
        let table = "ID,Name,SpriteURL,BallType\n\
            1,bulbasaur,https://img/1.png,pokeball\n\
            151,mew,https://img/151.png,masterball\n";
        std::fs::write(&config.table, table).unwrap();

        let report = enrich_from_dumps(&config, &SilentProgress).await.unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.downloaded.len(), 4);
        assert_eq!(std::fs::read_to_string(&config.backup).unwrap(), table);
        assert_eq!(
            std::fs::read_to_string(&config.table).unwrap(),
            "ID,Name,SpriteURL,BallType,TYPE,HP,ATK,DEF,SPATK,SPDEF,SPD\n\
             1,bulbasaur,https://img/1.png,pokeball,grass/poison,45,49,0,0,0,45\n\
             151,mew,https://img/151.png,masterball,unknown,0,0,0,0,0,0\n"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
