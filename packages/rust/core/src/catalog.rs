//! Catalog discovery: build the item table (`ID,Name,SpriteURL,BallType`)
//! from the remote item list, classifying each item into a ball category.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use pokespin_fetch::{Fetcher, Sleeper};
use pokespin_shared::{
    ApiConfig, CatalogConfig, FetchConfig, PokespinError, REQUIRED_COLUMNS, Result, StagedFile,
};

use crate::pipeline::ProgressReporter;
use crate::table::{TableWriter, open_staged, sync_staged};

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// One entry of the item list page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    results: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedLink {
    #[serde(default)]
    name: String,
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct Sprites {
    front_default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailDoc {
    #[serde(default)]
    sprites: Sprites,
    species: NamedLink,
}

#[derive(Debug, Deserialize)]
struct Species {
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_legendary: bool,
    #[serde(default)]
    is_mythical: bool,
    #[serde(default)]
    is_baby: bool,
    evolution_chain: Option<NamedLink>,
}

/// A node of an evolution chain document.
#[derive(Debug, Deserialize)]
pub struct ChainLink {
    species: NamedLink,
    #[serde(default)]
    evolves_to: Vec<ChainLink>,
}

#[derive(Debug, Deserialize)]
struct EvolutionChain {
    chain: ChainLink,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Ball category written to the `BallType` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BallType {
    Master,
    Poke,
    Great,
    Ultra,
}

impl BallType {
    /// Column value. `GreatBall` keeps its historical casing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "masterball",
            Self::Poke => "pokeball",
            Self::Great => "GreatBall",
            Self::Ultra => "ultraball",
        }
    }
}

impl fmt::Display for BallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Species flags that decide the category before depth does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeciesFlags {
    pub legendary: bool,
    pub mythical: bool,
    pub baby: bool,
}

/// Legendary/mythical first, then baby or base stage, then final stage.
pub fn classify_ball(flags: SpeciesFlags, depth: usize, max_depth: usize) -> BallType {
    if flags.legendary || flags.mythical {
        BallType::Master
    } else if flags.baby || depth == 0 {
        BallType::Poke
    } else if depth == max_depth {
        BallType::Ultra
    } else {
        BallType::Great
    }
}

/// Depth of every species in one evolution chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthMap {
    depths: HashMap<String, usize>,
    max_depth: usize,
}

impl DepthMap {
    /// Walk the chain from its root; a species seen twice keeps its first depth.
    pub fn from_chain(root: &ChainLink) -> Self {
        let mut map = Self::default();
        map.visit(root, 0);
        map.max_depth = map.depths.values().copied().max().unwrap_or(0);
        map
    }

    fn visit(&mut self, node: &ChainLink, depth: usize) {
        self.depths
            .entry(node.species.name.clone())
            .or_insert(depth);
        for next in &node.evolves_to {
            self.visit(next, depth + 1);
        }
    }

    pub fn depth(&self, species: &str) -> Option<usize> {
        self.depths.get(species).copied()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Default forms (no `-`) and regional variants are kept; other forms are not.
pub fn is_wanted_form(name: &str, regional_suffixes: &[String]) -> bool {
    match name.split_once('-') {
        None => true,
        Some((_, suffix)) => regional_suffixes.iter().any(|s| s == suffix),
    }
}

/// Numeric ID at the end of a resource URL (`.../pokemon/25/` → 25).
pub fn item_id_from_url(url: &str) -> Option<u32> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .filter(|id| *id > 0)
}

// ---------------------------------------------------------------------------
// Discovery run
// ---------------------------------------------------------------------------

/// Result of the `catalog` pipeline.
#[derive(Debug)]
pub struct CatalogReport {
    pub output: PathBuf,
    /// Entries in the remote list.
    pub listed: usize,
    /// Entries written after form filtering.
    pub written: usize,
    /// Distinct evolution chains fetched.
    pub chains_fetched: usize,
    pub by_ball: HashMap<BallType, usize>,
    pub elapsed: Duration,
}

/// Discover the catalog using the `[api]` settings.
pub async fn discover_catalog(
    config: &CatalogConfig,
    api: &ApiConfig,
    progress: &dyn ProgressReporter,
) -> Result<CatalogReport> {
    let fetcher = Fetcher::new(&FetchConfig::from(api))?;
    discover_catalog_with(config, &fetcher, &api.base_url()?, progress).await
}

/// [`discover_catalog`] with a caller-provided fetcher and base URL.
#[instrument(skip_all, fields(output = %config.output.display(), limit = config.limit))]
pub async fn discover_catalog_with<S: Sleeper>(
    config: &CatalogConfig,
    fetcher: &Fetcher<S>,
    base_url: &Url,
    progress: &dyn ProgressReporter,
) -> Result<CatalogReport> {
    config.validate()?;
    let start = Instant::now();

    progress.phase("Listing items");
    let list_url = format!(
        "{}/pokemon?limit={}",
        base_url.as_str().trim_end_matches('/'),
        config.limit
    );
    let page: ListPage = fetch_as(fetcher, &list_url).await?;
    let listed = page.results.len();
    let wanted: Vec<CatalogEntry> = page
        .results
        .into_iter()
        .filter(|entry| is_wanted_form(&entry.name, &config.regional_suffixes))
        .collect();
    info!(listed, wanted = wanted.len(), "fetched item list");

    progress.phase("Classifying");
    let staged = StagedFile::new(&config.output);
    let mut out = TableWriter::with_header(open_staged(&staged)?, &REQUIRED_COLUMNS)?;
    let mut chains: HashMap<String, DepthMap> = HashMap::new();
    let mut by_ball: HashMap<BallType, usize> = HashMap::new();
    let total = wanted.len();

    for (idx, entry) in wanted.iter().enumerate() {
        let id = item_id_from_url(&entry.url).ok_or_else(|| {
            PokespinError::parse(format!("no item ID in URL '{}' of {}", entry.url, entry.name))
        })?;

        let (sprite, ball) = classify_entry(fetcher, entry, &mut chains)
            .await
            .map_err(|e| e.for_item(id))?;
        debug!(id, name = %entry.name, %ball, "classified");

        out.write_record([id.to_string(), entry.name.clone(), sprite, ball.to_string()])?;
        *by_ball.entry(ball).or_default() += 1;
        progress.item_done(&entry.name, idx + 1, total);

        if !config.row_delay.is_zero() && idx + 1 < total {
            tokio::time::sleep(config.row_delay).await;
        }
    }
    sync_staged(out.finish()?, &staged)?;
    staged.commit()?;

    let report = CatalogReport {
        output: config.output.clone(),
        listed,
        written: total,
        chains_fetched: chains.len(),
        by_ball,
        elapsed: start.elapsed(),
    };
    info!(
        written = report.written,
        chains = report.chains_fetched,
        "catalog pipeline complete"
    );
    progress.done(&format!("{} of {} items written", report.written, report.listed));

    Ok(report)
}

/// Sprite URL and ball category of one entry; chains are memoized by URL.
async fn classify_entry<S: Sleeper>(
    fetcher: &Fetcher<S>,
    entry: &CatalogEntry,
    chains: &mut HashMap<String, DepthMap>,
) -> Result<(String, BallType)> {
    let detail: DetailDoc = fetch_as(fetcher, &entry.url).await?;
    let species: Species = fetch_as(fetcher, &detail.species.url).await?;

    let depths = match &species.evolution_chain {
        Some(link) => {
            if !chains.contains_key(&link.url) {
                let chain: EvolutionChain = fetch_as(fetcher, &link.url).await?;
                chains.insert(link.url.clone(), DepthMap::from_chain(&chain.chain));
            }
            chains.get(&link.url)
        }
        None => None,
    };

    // Regional forms are not chain members themselves; their species is.
    let (depth, max_depth) = depths
        .map(|map| {
            let depth = map
                .depth(&entry.name)
                .or_else(|| map.depth(&species.name))
                .unwrap_or(0);
            (depth, map.max_depth())
        })
        .unwrap_or((0, 0));

    let flags = SpeciesFlags {
        legendary: species.is_legendary,
        mythical: species.is_mythical,
        baby: species.is_baby,
    };
    let sprite = detail.sprites.front_default.unwrap_or_default();
    Ok((sprite, classify_ball(flags, depth, max_depth)))
}

async fn fetch_as<T: DeserializeOwned, S: Sleeper>(fetcher: &Fetcher<S>, url: &str) -> Result<T> {
    let value = fetcher.fetch_json(url).await?;
    serde_json::from_value(value)
        .map_err(|e| PokespinError::parse(format!("unexpected document at {url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::tests::temp_dir;
    use crate::pipeline::SilentProgress;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn regional() -> Vec<String> {
        ["alola", "galar", "hisui", "paldea"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn chain(value: serde_json::Value) -> DepthMap {
        let chain: EvolutionChain = serde_json::from_value(value).unwrap();
        DepthMap::from_chain(&chain.chain)
    }

    fn link(name: &str, evolves_to: serde_json::Value) -> serde_json::Value {
        json!({"species": {"name": name, "url": format!("https://x/{name}")}, "evolves_to": evolves_to})
    }

    #[test]
    fn wanted_forms() {
        let suffixes = regional();
        assert!(is_wanted_form("bulbasaur", &suffixes));
        assert!(is_wanted_form("vulpix-alola", &suffixes));
        assert!(is_wanted_form("zigzagoon-galar", &suffixes));
        assert!(!is_wanted_form("charizard-mega-x", &suffixes));
        assert!(!is_wanted_form("pikachu-gmax", &suffixes));
        assert!(!is_wanted_form("vulpix-alola", &[]));
    }

    #[test]
    fn ids_from_resource_urls() {
        assert_eq!(item_id_from_url("https://pokeapi.co/api/v2/pokemon/25/"), Some(25));
        assert_eq!(item_id_from_url("https://pokeapi.co/api/v2/pokemon/10091"), Some(10091));
        assert_eq!(item_id_from_url("https://pokeapi.co/api/v2/pokemon/"), None);
        assert_eq!(item_id_from_url("https://pokeapi.co/api/v2/pokemon/0/"), None);
    }

    #[test]
    fn depth_map_of_linear_chain() {
        let map = chain(json!({
            "chain": link("bulbasaur", json!([link("ivysaur", json!([link("venusaur", json!([]))]))]))
        }));
        assert_eq!(map.depth("bulbasaur"), Some(0));
        assert_eq!(map.depth("ivysaur"), Some(1));
        assert_eq!(map.depth("venusaur"), Some(2));
        assert_eq!(map.max_depth(), 2);
        assert_eq!(map.depth("pikachu"), None);
    }

    #[test]
    fn depth_map_of_branching_chain_keeps_first_depth() {
        let map = chain(json!({
            "chain": link("eevee", json!([
                link("vaporeon", json!([])),
                link("jolteon", json!([link("eevee", json!([]))]))
            ]))
        }));
        assert_eq!(map.depth("eevee"), Some(0));
        assert_eq!(map.depth("jolteon"), Some(1));
        // The repeated eevee keeps depth 0, so it does not raise the maximum.
        assert_eq!(map.max_depth(), 1);
    }

    #[test]
    fn ball_classification_order() {
        let none = SpeciesFlags::default();
        let legendary = SpeciesFlags { legendary: true, ..none };
        let mythical = SpeciesFlags { mythical: true, ..none };
        let baby = SpeciesFlags { baby: true, ..none };

        assert_eq!(classify_ball(legendary, 2, 2), BallType::Master);
        assert_eq!(classify_ball(mythical, 0, 0), BallType::Master);
        assert_eq!(classify_ball(baby, 1, 2), BallType::Poke);
        assert_eq!(classify_ball(none, 0, 2), BallType::Poke);
        // A single-stage chain is depth 0, so base wins over final.
        assert_eq!(classify_ball(none, 0, 0), BallType::Poke);
        assert_eq!(classify_ball(none, 2, 2), BallType::Ultra);
        assert_eq!(classify_ball(none, 1, 2), BallType::Great);
        assert_eq!(BallType::Great.to_string(), "GreatBall");
    }

    async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value, times: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn discovers_and_classifies_catalog() {
        let server = MockServer::start().await;
        let base = server.uri();
        let entry = |name: &str, id: u32| json!({"name": name, "url": format!("{base}/pokemon/{id}/")});

        Mock::given(method("GET"))
            .and(path("/pokemon"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 5,
                "results": [
                    entry("bulbasaur", 1),
                    entry("ivysaur", 2),
                    entry("venusaur", 3),
                    entry("mewtwo", 150),
                    entry("venusaur-mega", 10033)
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        for (id, species) in [(1, "bulbasaur"), (2, "ivysaur"), (3, "venusaur"), (150, "mewtwo")] {
            let sprite = if id == 150 {
                serde_json::Value::Null
            } else {
                json!(format!("https://img/{id}.png"))
            };
            mount_json(
                &server,
                &format!("/pokemon/{id}/"),
                json!({
                    "sprites": {"front_default": sprite},
                    "species": {"name": species, "url": format!("{base}/pokemon-species/{id}/")}
                }),
                1,
            )
            .await;
            let chain_id = if id == 150 { 63 } else { 1 };
            mount_json(
                &server,
                &format!("/pokemon-species/{id}/"),
                json!({
                    "name": species,
                    "is_legendary": id == 150,
                    "is_mythical": false,
                    "is_baby": false,
                    "evolution_chain": {"url": format!("{base}/evolution-chain/{chain_id}/")}
                }),
                1,
            )
            .await;
        }
        mount_json(
            &server,
            "/evolution-chain/1/",
            json!({"chain": link("bulbasaur", json!([link("ivysaur", json!([link("venusaur", json!([]))]))]))}),
            1,
        )
        .await;
        mount_json(&server, "/evolution-chain/63/", json!({"chain": link("mewtwo", json!([]))}), 1).await;

        let dir = temp_dir();
        let config = CatalogConfig {
            output: dir.join("all.csv"),
            limit: 10,
            regional_suffixes: regional(),
            row_delay: Duration::ZERO,
        };
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let report = discover_catalog_with(&config, &fetcher, &Url::parse(&base).unwrap(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.listed, 5);
        assert_eq!(report.written, 4);
        assert_eq!(report.chains_fetched, 2);
        assert_eq!(report.by_ball.get(&BallType::Master), Some(&1));
        assert_eq!(
            std::fs::read_to_string(&config.output).unwrap(),
            "ID,Name,SpriteURL,BallType\n\
             1,bulbasaur,https://img/1.png,pokeball\n\
             2,ivysaur,https://img/2.png,GreatBall\n\
             3,venusaur,https://img/3.png,ultraball\n\
             150,mewtwo,,masterball\n"
        );
        assert!(!dir.join("all.csv.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn regional_form_takes_its_species_depth() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/pokemon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"name": "raichu", "url": format!("{base}/pokemon/26/")},
                    {"name": "raichu-alola", "url": format!("{base}/pokemon/10100/")}
                ]
            })))
            .mount(&server)
            .await;
        for id in [26, 10100] {
            mount_json(
                &server,
                &format!("/pokemon/{id}/"),
                json!({
                    "sprites": {"front_default": format!("https://img/{id}.png")},
                    "species": {"name": "raichu", "url": format!("{base}/pokemon-species/26/")}
                }),
                1,
            )
            .await;
        }
        mount_json(
            &server,
            "/pokemon-species/26/",
            json!({
                "name": "raichu",
                "evolution_chain": {"url": format!("{base}/evolution-chain/10/")}
            }),
            2,
        )
        .await;
        mount_json(
            &server,
            "/evolution-chain/10/",
            json!({"chain": link("pichu", json!([link("pikachu", json!([link("raichu", json!([]))]))]))}),
            1,
        )
        .await;

        let dir = temp_dir();
        let config = CatalogConfig {
            output: dir.join("all.csv"),
            limit: 2,
            regional_suffixes: regional(),
            row_delay: Duration::ZERO,
        };
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let report = discover_catalog_with(&config, &fetcher, &Url::parse(&base).unwrap(), &SilentProgress)
            .await
            .unwrap();

        // The alolan form is not a chain member; it is classified like raichu.
        assert_eq!(report.by_ball.get(&BallType::Ultra), Some(&2));
        assert_eq!(report.chains_fetched, 1);
        assert_eq!(
            std::fs::read_to_string(&config.output).unwrap(),
            "ID,Name,SpriteURL,BallType\n\
             26,raichu,https://img/26.png,ultraball\n\
             10100,raichu-alola,https://img/10100.png,ultraball\n"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unparsable_item_url_leaves_no_output() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/pokemon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"name": "missingno", "url": format!("{base}/pokemon/0000/")}]
            })))
            .mount(&server)
            .await;

        let dir = temp_dir();
        let config = CatalogConfig {
            output: dir.join("all.csv"),
            limit: 1,
            regional_suffixes: Vec::new(),
            row_delay: Duration::ZERO,
        };
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let err = discover_catalog_with(&config, &fetcher, &Url::parse(&base).unwrap(), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, PokespinError::Parse { .. }));
        assert!(!config.output.exists());
        assert!(!dir.join("all.csv.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
