//! Application configuration for pokespin.
//!
//! User config lives at `~/.pokespin/pokespin.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PokespinError, Result};
use crate::staged::sibling_with_suffix;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pokespin.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pokespin";

/// Suffix of the backup written next to a published table.
pub const BACKUP_SUFFIX: &str = ".bak";

// ---------------------------------------------------------------------------
// Config structs (matching pokespin.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Per-item enrichment settings.
    #[serde(default)]
    pub enrich: EnrichSettings,

    /// Bulk (data dump) enrichment settings.
    #[serde(default)]
    pub bulk: BulkSettings,

    /// Catalog discovery settings.
    #[serde(default)]
    pub catalog: CatalogSettings,

    /// Ball sprite download settings.
    #[serde(default)]
    pub sprites: SpriteSettings,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the item API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per logical fetch.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ApiConfig {
    /// Parse and validate `base_url`.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            PokespinError::config(format!("invalid api.base_url '{}': {e}", self.base_url))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(PokespinError::config(format!(
                "api.base_url must be http or https, got '{other}'"
            ))),
        }
    }
}

fn default_base_url() -> String {
    "https://pokeapi.co/api/v2".into()
}
fn default_user_agent() -> String {
    concat!("pokespin-enricher/", env!("CARGO_PKG_VERSION")).into()
}
fn default_timeout_secs() -> u64 {
    12
}
fn default_max_retries() -> u32 {
    6
}

/// `[enrich]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichSettings {
    /// Table enriched in place.
    #[serde(default = "default_table")]
    pub table: String,

    /// Cache file of derived attributes.
    #[serde(default = "default_cache")]
    pub cache: String,

    /// Backup path; defaults to `<table>.bak`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,

    /// Persist the cache every N processed rows.
    #[serde(default = "default_save_every")]
    pub save_every: usize,

    /// Pause between rows, in milliseconds.
    #[serde(default = "default_row_delay_ms")]
    pub row_delay_ms: u64,

    /// Log progress every N rows.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            table: default_table(),
            cache: default_cache(),
            backup: None,
            save_every: default_save_every(),
            row_delay_ms: default_row_delay_ms(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_table() -> String {
    "pokeLIST.csv".into()
}
fn default_cache() -> String {
    ".pokeapi_stats_cache.json".into()
}
fn default_save_every() -> usize {
    25
}
fn default_row_delay_ms() -> u64 {
    30
}
fn default_progress_every() -> usize {
    50
}

/// `[bulk]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSettings {
    /// Base URL of the published CSV dumps.
    #[serde(default = "default_csv_base_url")]
    pub csv_base_url: String,

    /// Where dump files are kept between runs.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Per-request timeout for dump downloads.
    #[serde(default = "default_bulk_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            csv_base_url: default_csv_base_url(),
            download_dir: default_download_dir(),
            timeout_secs: default_bulk_timeout_secs(),
        }
    }
}

fn default_csv_base_url() -> String {
    "https://raw.githubusercontent.com/PokeAPI/pokeapi/master/data/v2/csv".into()
}
fn default_download_dir() -> String {
    ".pokeapi_csv_cache".into()
}
fn default_bulk_timeout_secs() -> u64 {
    60
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Output table of discovered items.
    #[serde(default = "default_catalog_output")]
    pub output: String,

    /// Size of the requested item list page.
    #[serde(default = "default_catalog_limit")]
    pub limit: u32,

    /// Form suffixes kept besides default forms.
    #[serde(default = "default_regional_suffixes")]
    pub regional_suffixes: Vec<String>,

    /// Pause between items, in milliseconds.
    #[serde(default = "default_catalog_delay_ms")]
    pub row_delay_ms: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            output: default_catalog_output(),
            limit: default_catalog_limit(),
            regional_suffixes: default_regional_suffixes(),
            row_delay_ms: default_catalog_delay_ms(),
        }
    }
}

fn default_catalog_output() -> String {
    "all_pokemon_with_ball.csv".into()
}
fn default_catalog_limit() -> u32 {
    2000
}
fn default_regional_suffixes() -> Vec<String> {
    ["alola", "galar", "hisui", "paldea"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_catalog_delay_ms() -> u64 {
    100
}

/// `[sprites]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteSettings {
    /// Item slugs whose default sprite is downloaded.
    #[serde(default = "default_sprite_items")]
    pub items: Vec<String>,

    /// Directory the resized sprites are saved to.
    #[serde(default = "default_sprite_dir")]
    pub output_dir: String,

    /// Edge length of the square output, in pixels.
    #[serde(default = "default_sprite_size")]
    pub size: u32,
}

impl Default for SpriteSettings {
    fn default() -> Self {
        Self {
            items: default_sprite_items(),
            output_dir: default_sprite_dir(),
            size: default_sprite_size(),
        }
    }
}

fn default_sprite_items() -> Vec<String> {
    ["poke-ball", "great-ball", "ultra-ball", "master-ball"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_sprite_dir() -> String {
    "ball_sprites_96".into()
}
fn default_sprite_size() -> u32 {
    96
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Attempts per logical fetch (at least 1).
    pub max_retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for FetchConfig {
    fn from(api: &ApiConfig) -> Self {
        Self {
            max_retries: api.max_retries,
            timeout: Duration::from_secs(api.timeout_secs),
            user_agent: api.user_agent.clone(),
        }
    }
}

/// Runtime configuration of one enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Table read as input and replaced on publish.
    pub table: PathBuf,
    /// Cache file.
    pub cache: PathBuf,
    /// Backup of the pre-run table.
    pub backup: PathBuf,
    /// Persist the cache every N processed rows.
    pub save_every: usize,
    /// Pause between rows.
    pub row_delay: Duration,
    /// Log progress every N rows.
    pub progress_every: usize,
}

impl From<&AppConfig> for EnrichConfig {
    fn from(config: &AppConfig) -> Self {
        let settings = &config.enrich;
        let table = PathBuf::from(&settings.table);
        let backup = settings
            .backup
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| sibling_with_suffix(&table, BACKUP_SUFFIX));
        Self {
            table,
            cache: PathBuf::from(&settings.cache),
            backup,
            save_every: settings.save_every,
            row_delay: Duration::from_millis(settings.row_delay_ms),
            progress_every: settings.progress_every,
        }
    }
}

impl EnrichConfig {
    /// Point the run at a different table; the backup follows it.
    pub fn with_table(mut self, table: impl Into<PathBuf>) -> Self {
        self.table = table.into();
        self.backup = sibling_with_suffix(&self.table, BACKUP_SUFFIX);
        self
    }

    /// Reject settings the driver cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.save_every == 0 {
            return Err(PokespinError::config("enrich.save_every must be at least 1"));
        }
        if self.backup == self.table {
            return Err(PokespinError::config(
                "enrich.backup must differ from enrich.table",
            ));
        }
        Ok(())
    }
}

/// Runtime configuration of a bulk (dump-based) enrichment run.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Table read as input and replaced on publish.
    pub table: PathBuf,
    /// Backup of the pre-run table.
    pub backup: PathBuf,
    /// Base URL the dump files are downloaded from.
    pub csv_base_url: String,
    /// Directory holding the downloaded dumps.
    pub download_dir: PathBuf,
    /// Fetch settings for dump downloads.
    pub fetch: FetchConfig,
}

impl From<&AppConfig> for BulkConfig {
    fn from(config: &AppConfig) -> Self {
        let enrich = EnrichConfig::from(config);
        let mut fetch = FetchConfig::from(&config.api);
        fetch.timeout = Duration::from_secs(config.bulk.timeout_secs);
        Self {
            table: enrich.table,
            backup: enrich.backup,
            csv_base_url: config.bulk.csv_base_url.clone(),
            download_dir: PathBuf::from(&config.bulk.download_dir),
            fetch,
        }
    }
}

impl BulkConfig {
    /// Point the run at a different table; the backup follows it.
    pub fn with_table(mut self, table: impl Into<PathBuf>) -> Self {
        self.table = table.into();
        self.backup = sibling_with_suffix(&self.table, BACKUP_SUFFIX);
        self
    }
}

/// Runtime configuration of a catalog discovery run.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Table written with the discovered items.
    pub output: PathBuf,
    /// Size of the requested item list page.
    pub limit: u32,
    /// Form suffixes kept besides default forms.
    pub regional_suffixes: Vec<String>,
    /// Pause between items.
    pub row_delay: Duration,
}

impl From<&AppConfig> for CatalogConfig {
    fn from(config: &AppConfig) -> Self {
        let settings = &config.catalog;
        Self {
            output: PathBuf::from(&settings.output),
            limit: settings.limit,
            regional_suffixes: settings
                .regional_suffixes
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            row_delay: Duration::from_millis(settings.row_delay_ms),
        }
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(PokespinError::config("catalog.limit must be at least 1"));
        }
        Ok(())
    }
}

/// Runtime configuration of a sprite download run.
#[derive(Debug, Clone)]
pub struct SpriteConfig {
    /// Item slugs, in download order.
    pub items: Vec<String>,
    pub output_dir: PathBuf,
    /// Edge length of the square output.
    pub size: u32,
}

impl From<&AppConfig> for SpriteConfig {
    fn from(config: &AppConfig) -> Self {
        let settings = &config.sprites;
        Self {
            items: settings
                .items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            output_dir: PathBuf::from(&settings.output_dir),
            size: settings.size,
        }
    }
}

impl SpriteConfig {
    /// Slugs become file names, so they may not contain path separators.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(PokespinError::config("sprites.size must be at least 1"));
        }
        if let Some(bad) = self
            .items
            .iter()
            .find(|slug| slug.contains(['/', '\\']) || slug.starts_with('.'))
        {
            return Err(PokespinError::config(format!(
                "sprites.items: '{bad}' is not a valid item slug"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pokespin/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PokespinError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pokespin/pokespin.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PokespinError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PokespinError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.api.base_url()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PokespinError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = render_config(&AppConfig::default())?;

    std::fs::write(&path, content).map_err(|e| PokespinError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Serialize a config as pretty TOML.
pub fn render_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| PokespinError::config(e.to_string()))
}
