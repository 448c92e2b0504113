//! Shared types, error model, and configuration for pokespin.
//!
//! This crate is the foundation depended on by all other pokespin crates.
//! It provides:
//! - [`PokespinError`]: the unified error type
//! - Domain types ([`Row`], [`DerivedAttributes`], [`StatBlock`], [`EnrichedRow`])
//! - Configuration ([`AppConfig`] and the runtime configs derived from it, config loading)
//! - [`StagedFile`]: write-to-sibling, commit-by-rename file replacement

pub mod config;
pub mod error;
pub mod staged;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, BACKUP_SUFFIX, BulkConfig, BulkSettings, CatalogConfig, CatalogSettings,
    EnrichConfig, EnrichSettings, FetchConfig, SpriteConfig, SpriteSettings, config_dir,
    config_file_path, init_config, load_config, load_config_from, render_config,
};
pub use error::{PokespinError, Result};
pub use staged::{STAGING_SUFFIX, StagedFile, sibling_with_suffix};
pub use types::{
    DerivedAttributes, EnrichedRow, OUTPUT_COLUMNS, REQUIRED_COLUMNS, Row, Stat, StatBlock,
    UNKNOWN_TYPE,
};
