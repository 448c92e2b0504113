//! End-to-end `enrich` pipeline: table → cache/API → staged table → publish.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use pokespin_cache::Cache;
use pokespin_shared::{EnrichConfig, Result, Row, StagedFile};

use crate::driver::{DetailSource, Driver, DriverOptions, DriverSummary, RowObserver};
use crate::publish::publish;
use crate::table::{TableWriter, open_staged, read_rows, sync_staged};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each item is written.
    fn item_done(&self, name: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _summary: &str) {}
}

/// Forwards driver row events to a [`ProgressReporter`].
struct ReportRows<'a>(&'a dyn ProgressReporter);

impl RowObserver for ReportRows<'_> {
    fn row_done(&self, current: usize, total: usize, row: &Row, _cached: bool) {
        self.0.item_done(&row.name, current, total);
    }
}

/// Result of the `enrich` pipeline.
#[derive(Debug)]
pub struct EnrichReport {
    /// Identifier of this run, for correlating logs.
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub summary: DriverSummary,
    /// The published table.
    pub table: PathBuf,
    /// Copy of the table as it was before the run, if one existed.
    pub backup: Option<PathBuf>,
    pub cache: PathBuf,
}

/// Run the full `enrich` pipeline.
///
/// 1. Read and validate the item table
/// 2. Load the cache
/// 3. Enrich every row into `<table>.tmp`
/// 4. Back up the current table and publish the new one
///
/// Nothing is published unless every row was enriched; the cache keeps
/// whatever was fetched before a failure.
#[instrument(skip_all, fields(table = %config.table.display()))]
pub async fn enrich_table<D: DetailSource>(
    config: &EnrichConfig,
    source: &D,
    progress: &dyn ProgressReporter,
) -> Result<EnrichReport> {
    config.validate()?;
    let start = Instant::now();
    let run_id = Uuid::now_v7();

    info!(%run_id, "starting enrich pipeline");

    // --- Phase 1: Input ---
    progress.phase("Reading table");
    let rows = read_rows(&config.table)?;

    progress.phase("Loading cache");
    let mut cache = Cache::load(&config.cache);
    info!(rows = rows.len(), cached = cache.len(), "inputs ready");

    // --- Phase 2: Enrich into the staging file ---
    progress.phase("Enriching");
    let staged = StagedFile::new(&config.table);
    let mut out = TableWriter::new(open_staged(&staged)?)?;
    let summary = Driver::new(source, &mut cache, DriverOptions::from(config))
        .run(&rows, &mut out, &ReportRows(progress))
        .await?;
    sync_staged(out.finish()?, &staged)?;

    // --- Phase 3: Publish ---
    progress.phase("Publishing");
    let published = publish(staged, &config.backup)?;

    let report = EnrichReport {
        run_id,
        finished_at: Utc::now(),
        elapsed: start.elapsed(),
        summary,
        table: published.table,
        backup: published.backup,
        cache: config.cache.clone(),
    };

    info!(
        %run_id,
        rows = report.summary.rows,
        fetched = report.summary.fetched,
        cache_hits = report.summary.cache_hits,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "enrich pipeline complete"
    );
    progress.done(&format!(
        "{} rows ({} fetched, {} cached)",
        report.summary.rows, report.summary.fetched, report.summary.cache_hits
    ));

    Ok(report)
}
