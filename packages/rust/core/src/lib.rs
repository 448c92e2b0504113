//! Core pipelines and domain logic for pokespin.
//!
//! This crate ties together table I/O, attribute extraction, the cached
//! enrichment driver, and atomic publishing into end-to-end workflows
//! (`enrich_table`, `enrich_from_dumps`, `discover_catalog`,
//! `download_sprites`).

pub mod bulk;
pub mod catalog;
pub mod driver;
pub mod extract;
pub mod pipeline;
pub mod publish;
pub mod sprites;
pub mod table;

pub use driver::{ApiSource, DetailSource, Driver, DriverOptions, DriverSummary, RowObserver};
pub use extract::{ItemDetail, stat_block, type_label};
pub use pipeline::{EnrichReport, ProgressReporter, SilentProgress, enrich_table};
pub use publish::{PublishReport, publish, publish_file};
pub use table::{TableWriter, parse_rows, read_rows};
