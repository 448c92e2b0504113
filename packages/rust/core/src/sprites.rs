//! Ball sprite download: fetch each item's default sprite, scale it to a
//! square with nearest-neighbour sampling, and save it as `<slug>.png`.

use std::io::Cursor;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use image::ImageFormat;
use image::imageops::{self, FilterType};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use url::Url;

use pokespin_fetch::{Fetcher, Sleeper};
use pokespin_shared::{ApiConfig, FetchConfig, PokespinError, Result, SpriteConfig, StagedFile};

use crate::pipeline::ProgressReporter;

#[derive(Debug, Default, Deserialize)]
struct ItemSprites {
    default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemDoc {
    #[serde(default)]
    sprites: ItemSprites,
}

/// Decode `bytes`, scale to `size`×`size` (nearest), and re-encode as PNG.
pub fn resize_sprite(bytes: &[u8], size: u32) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PokespinError::parse(format!("undecodable sprite: {e}")))?
        .to_rgba8();
    let scaled = imageops::resize(&decoded, size, size, FilterType::Nearest);

    let mut png = Cursor::new(Vec::new());
    scaled
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| PokespinError::parse(format!("failed to encode sprite: {e}")))?;
    Ok(png.into_inner())
}

/// Result of the `sprites` pipeline.
#[derive(Debug)]
pub struct SpriteReport {
    pub output_dir: PathBuf,
    /// Files written, in item order.
    pub saved: Vec<PathBuf>,
    /// Items without a default sprite.
    pub missing: Vec<String>,
    pub elapsed: Duration,
}

/// Download sprites using the `[api]` settings.
pub async fn download_sprites(
    config: &SpriteConfig,
    api: &ApiConfig,
    progress: &dyn ProgressReporter,
) -> Result<SpriteReport> {
    let fetcher = Fetcher::new(&FetchConfig::from(api))?;
    download_sprites_with(config, &fetcher, &api.base_url()?, progress).await
}

/// [`download_sprites`] with a caller-provided fetcher and base URL.
///
/// A fetch or decode failure aborts the run; sprites saved before it stay.
#[instrument(skip_all, fields(output_dir = %config.output_dir.display(), items = config.items.len()))]
pub async fn download_sprites_with<S: Sleeper>(
    config: &SpriteConfig,
    fetcher: &Fetcher<S>,
    base_url: &Url,
    progress: &dyn ProgressReporter,
) -> Result<SpriteReport> {
    config.validate()?;
    let start = Instant::now();
    let base = base_url.as_str().trim_end_matches('/');

    progress.phase("Downloading sprites");
    let mut saved = Vec::new();
    let mut missing = Vec::new();
    let total = config.items.len();

    for (idx, slug) in config.items.iter().enumerate() {
        let doc = fetcher.fetch_json(&format!("{base}/item/{slug}")).await?;
        let doc: ItemDoc = serde_json::from_value(doc)
            .map_err(|e| PokespinError::parse(format!("unexpected item document for {slug}: {e}")))?;

        match doc.sprites.default.filter(|url| !url.trim().is_empty()) {
            Some(sprite_url) => {
                let bytes = fetcher.fetch_bytes(&sprite_url).await?;
                let png = resize_sprite(&bytes, config.size)
                    .map_err(|e| PokespinError::parse(format!("{slug}: {e}")))?;

                let dest = config.output_dir.join(format!("{slug}.png"));
                let staged = StagedFile::new(&dest);
                staged.write_all(&png)?;
                staged.commit()?;
                info!(item = %slug, path = %dest.display(), "saved sprite");
                saved.push(dest);
            }
            None => {
                warn!(item = %slug, "item has no default sprite");
                missing.push(slug.clone());
            }
        }
        progress.item_done(slug, idx + 1, total);
    }

    let report = SpriteReport {
        output_dir: config.output_dir.clone(),
        saved,
        missing,
        elapsed: start.elapsed(),
    };
    info!(
        saved = report.saved.len(),
        missing = report.missing.len(),
        "sprite pipeline complete"
    );
    progress.done(&format!("{} of {total} sprites saved", report.saved.len()));

    Ok(report)
}
