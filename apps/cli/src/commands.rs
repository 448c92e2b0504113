//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use pokespin_core::bulk::enrich_from_dumps;
use pokespin_core::catalog::discover_catalog;
use pokespin_core::sprites::download_sprites;
use pokespin_core::{ApiSource, ProgressReporter, enrich_table};
use pokespin_shared::{
    AppConfig, BulkConfig, CatalogConfig, EnrichConfig, SpriteConfig, init_config, load_config,
    load_config_from, render_config,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pokespin: enrich an item table with types and base stats.
#[derive(Parser)]
#[command(
    name = "pokespin",
    version,
    about = "Enrich an item table with type labels and base stats from PokeAPI.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.pokespin/pokespin.toml.
    #[arg(long, global = true, env = "POKESPIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich the table item by item from the API, using the local cache.
    Enrich {
        /// Table to enrich in place.
        #[arg(short, long)]
        table: Option<PathBuf>,

        /// Cache file.
        #[arg(short, long)]
        cache: Option<PathBuf>,

        /// Where to keep the previous table (defaults to <table>.bak).
        #[arg(short, long)]
        backup: Option<PathBuf>,
    },

    /// Enrich the table from the published CSV dumps.
    Bulk {
        /// Table to enrich in place.
        #[arg(short, long)]
        table: Option<PathBuf>,

        /// Directory holding the downloaded dumps.
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },

    /// Build an item table from the remote item list.
    Catalog {
        /// Output table.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Number of list entries to request.
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Download item sprites scaled to a square PNG.
    Sprites {
        /// Output directory.
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Item slug to download (repeatable; replaces the configured list).
        #[arg(short, long = "item")]
        items: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pokespin=info",
        1 => "pokespin=debug",
        _ => "pokespin=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Enrich {
            table,
            cache,
            backup,
        } => cmd_enrich(config_path, table, cache, backup).await,
        Command::Bulk {
            table,
            download_dir,
        } => cmd_bulk(config_path, table, download_dir).await,
        Command::Catalog { out, limit } => cmd_catalog(config_path, out, limit).await,
        Command::Sprites { out_dir, items } => cmd_sprites(config_path, out_dir, items).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enrich(
    config_path: Option<&Path>,
    table: Option<PathBuf>,
    cache: Option<PathBuf>,
    backup: Option<PathBuf>,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut enrich = EnrichConfig::from(&config);
    if let Some(table) = table {
        enrich = enrich.with_table(table);
    }
    if let Some(cache) = cache {
        enrich.cache = cache;
    }
    if let Some(backup) = backup {
        enrich.backup = backup;
    }

    info!(
        table = %enrich.table.display(),
        cache = %enrich.cache.display(),
        "enriching table"
    );

    let source = ApiSource::from_config(&config.api)?;
    let reporter = CliProgress::new();
    let report = enrich_table(&enrich, &source, &reporter).await?;

    println!();
    println!("  Table enriched.");
    println!("  Run:     {}", report.run_id);
    println!("  Rows:    {}", report.summary.rows);
    println!("  Fetched: {}", report.summary.fetched);
    println!("  Cached:  {}", report.summary.cache_hits);
    println!("  Table:   {}", report.table.display());
    match &report.backup {
        Some(backup) => println!("  Backup:  {}", backup.display()),
        None => println!("  Backup:  (none, table was new)"),
    }
    println!("  Cache:   {}", report.cache.display());
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_bulk(
    config_path: Option<&Path>,
    table: Option<PathBuf>,
    download_dir: Option<PathBuf>,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut bulk = BulkConfig::from(&config);
    if let Some(table) = table {
        bulk = bulk.with_table(table);
    }
    if let Some(dir) = download_dir {
        bulk.download_dir = dir;
    }

    info!(
        table = %bulk.table.display(),
        download_dir = %bulk.download_dir.display(),
        "enriching table from dumps"
    );

    let reporter = CliProgress::new();
    let report = enrich_from_dumps(&bulk, &reporter).await?;

    println!();
    println!("  Table enriched from dumps.");
    println!("  Rows:       {}", report.rows);
    println!("  Unmatched:  {}", report.unmatched);
    println!("  Downloaded: {}", report.downloaded.len());
    println!("  Table:      {}", report.table.display());
    if let Some(backup) = &report.backup {
        println!("  Backup:     {}", backup.display());
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_catalog(
    config_path: Option<&Path>,
    out: Option<PathBuf>,
    limit: Option<u32>,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut catalog = CatalogConfig::from(&config);
    if let Some(out) = out {
        catalog.output = out;
    }
    if let Some(limit) = limit {
        catalog.limit = limit;
    }

    info!(
        output = %catalog.output.display(),
        limit = catalog.limit,
        "discovering catalog"
    );

    let reporter = CliProgress::new();
    let report = discover_catalog(&catalog, &config.api, &reporter).await?;

    let mut by_ball: Vec<_> = report.by_ball.iter().collect();
    by_ball.sort_by_key(|(ball, _)| ball.as_str());

    println!();
    println!("  Catalog written.");
    println!("  Listed:  {}", report.listed);
    println!("  Written: {}", report.written);
    println!("  Chains:  {}", report.chains_fetched);
    for (ball, count) in by_ball {
        println!("    {ball:<10} {count}");
    }
    println!("  Output:  {}", report.output.display());
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_sprites(
    config_path: Option<&Path>,
    out_dir: Option<PathBuf>,
    items: Vec<String>,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut sprites = SpriteConfig::from(&config);
    if let Some(dir) = out_dir {
        sprites.output_dir = dir;
    }
    if !items.is_empty() {
        sprites.items = items;
    }

    info!(
        output_dir = %sprites.output_dir.display(),
        items = sprites.items.len(),
        "downloading sprites"
    );

    let reporter = CliProgress::new();
    let report = download_sprites(&sprites, &config.api, &reporter).await?;

    println!();
    println!("  Sprites saved.");
    for path in &report.saved {
        println!("    {}", path.display());
    }
    if !report.missing.is_empty() {
        println!("  No sprite: {}", report.missing.join(", "));
    }
    println!("  Output:  {}", report.output_dir.display());
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    println!("{}", render_config(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_done(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {name}"));
    }

    fn done(&self, summary: &str) {
        self.spinner.finish_and_clear();
        info!(summary, "done");
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
