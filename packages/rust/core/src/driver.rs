//! Enrichment driver: rows in, enriched rows out, cache consulted first.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

use pokespin_cache::Cache;
use pokespin_fetch::{Fetcher, Sleeper, TokioSleeper};
use pokespin_shared::{ApiConfig, EnrichConfig, EnrichedRow, FetchConfig, Result, Row};

use crate::extract::ItemDetail;
use crate::table::TableWriter;

// ---------------------------------------------------------------------------
// Detail source
// ---------------------------------------------------------------------------

/// Where item details come from on a cache miss.
pub trait DetailSource {
    fn fetch_detail(&self, id: u32) -> impl Future<Output = Result<ItemDetail>>;
}

/// Item details from the remote API (`{base}/pokemon/{id}`).
pub struct ApiSource<S = TokioSleeper> {
    fetcher: Fetcher<S>,
    base_url: Url,
}

impl ApiSource {
    /// Source with a default fetcher built from the `[api]` settings.
    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        let fetcher = Fetcher::new(&FetchConfig::from(api))?;
        Ok(Self::new(fetcher, api.base_url()?))
    }
}

impl<S: Sleeper> ApiSource<S> {
    pub fn new(fetcher: Fetcher<S>, base_url: Url) -> Self {
        Self { fetcher, base_url }
    }

    /// URL of the detail resource for item `id`.
    pub fn detail_url(&self, id: u32) -> String {
        format!("{}/pokemon/{id}", self.base_url.as_str().trim_end_matches('/'))
    }
}

impl<S: Sleeper> DetailSource for ApiSource<S> {
    async fn fetch_detail(&self, id: u32) -> Result<ItemDetail> {
        let url = self.detail_url(id);
        self.fetcher.fetch_json(&url).await.map(ItemDetail::new)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Pacing and persistence knobs of the driver.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Persist the cache every N processed rows (and after the last row).
    pub save_every: usize,
    /// Pause between rows.
    pub row_delay: Duration,
    /// Log progress every N rows.
    pub progress_every: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            save_every: 25,
            row_delay: Duration::from_millis(30),
            progress_every: 50,
        }
    }
}

impl From<&EnrichConfig> for DriverOptions {
    fn from(config: &EnrichConfig) -> Self {
        Self {
            save_every: config.save_every,
            row_delay: config.row_delay,
            progress_every: config.progress_every,
        }
    }
}

/// Outcome counters of one driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverSummary {
    /// Rows written to the output.
    pub rows: usize,
    /// Rows served from the cache.
    pub cache_hits: usize,
    /// Rows whose detail had to be fetched.
    pub fetched: usize,
    /// Number of cache saves performed.
    pub cache_saves: usize,
}

/// Observer of per-row progress.
pub trait RowObserver {
    fn row_done(&self, current: usize, total: usize, row: &Row, cached: bool);
}

impl RowObserver for () {
    fn row_done(&self, _current: usize, _total: usize, _row: &Row, _cached: bool) {}
}

/// Walks the rows in order, filling attributes from the cache or the source.
pub struct Driver<'a, D> {
    source: &'a D,
    cache: &'a mut Cache,
    options: DriverOptions,
}

impl<'a, D: DetailSource> Driver<'a, D> {
    pub fn new(source: &'a D, cache: &'a mut Cache, options: DriverOptions) -> Self {
        Self {
            source,
            cache,
            options,
        }
    }

    /// Enrich `rows` in input order, streaming each merged row to `out`.
    ///
    /// A fetch failure aborts the run with the row ID attached; entries
    /// gathered so far are saved before the error is returned.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub async fn run<W: Write>(
        &mut self,
        rows: &[Row],
        out: &mut TableWriter<W>,
        observer: &dyn RowObserver,
    ) -> Result<DriverSummary> {
        let total = rows.len();
        let save_every = self.options.save_every.max(1);
        let mut summary = DriverSummary::default();

        for (idx, row) in rows.iter().enumerate() {
            let position = idx + 1;

            let (attributes, cached) = match self.cache.get(row.id) {
                Some(hit) => (hit.clone(), true),
                None => {
                    let attributes = match self.source.fetch_detail(row.id).await {
                        Ok(detail) => detail.derive(),
                        Err(e) => {
                            warn!(id = row.id, name = %row.name, error = %e, "fetch failed, aborting run");
                            if let Err(save_err) = self.cache.save() {
                                warn!(error = %save_err, "could not save cache before aborting");
                            }
                            return Err(e.for_item(row.id));
                        }
                    };
                    self.cache.put(row.id, attributes.clone());
                    (attributes, false)
                }
            };

            if cached {
                summary.cache_hits += 1;
            } else {
                summary.fetched += 1;
            }
            debug!(id = row.id, cached, type_label = %attributes.type_label, "row enriched");

            out.write(&EnrichedRow {
                row: row.clone(),
                attributes,
            })?;
            summary.rows += 1;
            observer.row_done(position, total, row, cached);

            if position % save_every == 0 {
                self.cache.save()?;
                summary.cache_saves += 1;
            }
            if self.options.progress_every > 0
                && (position % self.options.progress_every == 0 || position == total)
            {
                info!(done = position, total, "enriched {position}/{total}");
            }
            if !self.options.row_delay.is_zero() && position < total {
                tokio::time::sleep(self.options.row_delay).await;
            }
        }

        self.cache.save()?;
        summary.cache_saves += 1;

        Ok(summary)
    }
}
