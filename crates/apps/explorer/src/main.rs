use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use foundation::bounds::BoundingBox;
use foundation::geocell::{GeoCell, MAX_PRECISION, cells_covering};
use foundation::time::Time;
use runtime::notice::NoticeLevel;
use serde::Deserialize;
use streaming::coordinator::{CoordinatorError, FetchCoordinator, Resolution};
use streaming::pipeline::drive_batch;
use streaming::protocol::TileResponse;
use streaming::request::{BatchId, TileBatch};
use streaming::source::{FetchError, HttpTileSource, TileSource};
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use viewport::config::{ConfigError, MapConfig};
use viewport::picker::PickerError;
use viewport::session::{Effect, MapSession};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay map interactions against a spot tile endpoint")]
struct Args {
    /// Session config JSON (default: SPOTMAP_* environment overrides)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the geohash cells covering a bounding box
    Cells {
        /// Bounding box: south,west,north,east
        #[arg(long)]
        bbox: String,

        /// Geohash precision (default: from config)
        #[arg(long)]
        precision: Option<usize>,
    },

    /// Fetch the cells covering a bounding box and print per-cell record counts
    Fetch {
        /// Tile endpoint, queried as `?geohashes=c1,c2,...`
        #[arg(long)]
        endpoint: String,

        /// Bounding box: south,west,north,east
        #[arg(long)]
        bbox: String,

        /// Geohash precision (default: from config)
        #[arg(long)]
        precision: Option<usize>,
    },

    /// Replay a scripted session against a tile endpoint
    Replay {
        /// Tile endpoint, queried as `?geohashes=c1,c2,...`
        #[arg(long)]
        endpoint: String,

        /// Script JSON, e.g. {"steps": [{"at": 0.0, "event": "zoom", "zoom": 13}]}
        #[arg(long)]
        script: PathBuf,

        /// Initial page path
        #[arg(long, default_value = "/world")]
        path: String,

        /// Session poll interval in milliseconds
        #[arg(long, default_value_t = 50)]
        tick_ms: u64,
    },
}

#[derive(Debug, thiserror::Error)]
enum ExplorerError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid script: {0}")]
    Script(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("area save failed: {0}")]
    Picker(#[from] PickerError),
    #[error("invalid bbox {0:?}, expected south,west,north,east")]
    Bbox(String),
    #[error("precision must be within 1..={max}, got {0}", max = MAX_PRECISION)]
    Precision(usize),
    #[error("failed to start runtime: {0}")]
    Runtime(std::io::Error),
}

#[derive(Debug, Deserialize)]
struct Script {
    steps: Vec<Step>,
}

/// One scripted interaction, `at` seconds after the replay starts.
#[derive(Debug, Deserialize)]
struct Step {
    at: f64,
    #[serde(flatten)]
    event: Event,
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event {
    Move { bbox: [f64; 4] },
    Zoom { zoom: f64 },
    EnterArea,
    Districts { enabled: bool },
    EditArea { bbox: [f64; 4] },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main(Args::parse()) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn real_main(args: Args) -> Result<(), ExplorerError> {
    let config = match args.config.as_deref() {
        Some(path) => MapConfig::from_json(&read(path)?)?,
        None => MapConfig::from_env()?,
    };

    match args.command {
        Command::Cells { bbox, precision } => {
            let precision = precision.unwrap_or(config.precision);
            for cell in covering(&bbox, precision)? {
                println!("{cell}");
            }
            Ok(())
        }
        Command::Fetch {
            endpoint,
            bbox,
            precision,
        } => {
            let cells = covering_cells(&bbox, precision.unwrap_or(config.precision))?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(ExplorerError::Runtime)?;
            let mut coordinator = FetchCoordinator::new(config.coordinator());
            let source = HttpTileSource::new(endpoint);
            let resolutions = runtime.block_on(fetch_once(&mut coordinator, &source, cells))?;
            print_fetch(&coordinator, &resolutions);
            Ok(())
        }
        Command::Replay {
            endpoint,
            script,
            path,
            tick_ms,
        } => {
            let script: Script = serde_json::from_str(&read(&script)?)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(ExplorerError::Runtime)?;
            let session = MapSession::new(config, &path)?;
            LocalSet::new().block_on(
                &runtime,
                replay(session, HttpTileSource::new(endpoint), script, tick_ms),
            )
        }
    }
}

fn read(path: &Path) -> Result<String, ExplorerError> {
    fs::read_to_string(path).map_err(|source| ExplorerError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_bbox(raw: &str) -> Result<BoundingBox, ExplorerError> {
    let bad = || ExplorerError::Bbox(raw.to_string());
    let values: Vec<f64> = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| bad())?;
    let &[south, west, north, east] = values.as_slice() else {
        return Err(bad());
    };
    let bbox = BoundingBox::new(south, west, north, east);
    if bbox.is_degenerate() {
        return Err(bad());
    }
    Ok(bbox)
}

fn covering_cells(raw: &str, precision: usize) -> Result<BTreeSet<GeoCell>, ExplorerError> {
    if !(1..=MAX_PRECISION).contains(&precision) {
        return Err(ExplorerError::Precision(precision));
    }
    let bbox = parse_bbox(raw)?;
    Ok(cells_covering(&bbox, precision))
}

fn covering(raw: &str, precision: usize) -> Result<Vec<String>, ExplorerError> {
    Ok(covering_cells(raw, precision)?
        .into_iter()
        .map(String::from)
        .collect())
}

/// Request `cells` once and drive the batch, plus any chained overflow, to
/// completion.
async fn fetch_once<S: TileSource>(
    coordinator: &mut FetchCoordinator,
    source: &S,
    cells: BTreeSet<GeoCell>,
) -> Result<Vec<Resolution>, ExplorerError> {
    let Some(batch) = coordinator.request_cells(cells) else {
        return Ok(Vec::new());
    };
    Ok(drive_batch(coordinator, source, batch).await?)
}

fn print_fetch(coordinator: &FetchCoordinator, resolutions: &[Resolution]) {
    for resolution in resolutions {
        match resolution {
            Resolution::Merged { batch, cells, records, .. } => {
                info!(batch = batch.0, cells = cells.len(), records, "batch merged");
            }
            Resolution::Failed { batch, cells, error } => {
                warn!(batch = batch.0, cells = cells.len(), "batch failed: {error}");
            }
        }
    }
    let cache = coordinator.cache();
    for cell in cache.loaded() {
        println!("{cell}\t{}", cache.tile(cell).map_or(0, <[_]>::len));
    }
    let stats = coordinator.stats();
    println!(
        "batches: {} issued, {} failed; {} cells still deferred",
        stats.batches_issued,
        stats.batches_failed,
        coordinator.deferred().len()
    );
}

fn to_bbox([south, west, north, east]: [f64; 4]) -> BoundingBox {
    BoundingBox::new(south, west, north, east)
}

type FetchResult = (BatchId, Result<TileResponse, FetchError>);

/// Plays the map widget and the page around a `MapSession`.
struct Replay {
    session: MapSession,
    source: HttpTileSource,
    results: mpsc::UnboundedSender<FetchResult>,
    in_flight: usize,
    started: Instant,
}

impl Replay {
    fn now(&self) -> Time {
        Time(self.started.elapsed().as_secs_f64())
    }

    fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.session.next_deadline().is_none()
    }

    fn step(&mut self, event: Event) -> Result<(), ExplorerError> {
        let now = self.now();
        match event {
            Event::Move { bbox } => {
                let bbox = to_bbox(bbox);
                self.session.on_move_end(now, bbox, bbox.center());
            }
            Event::Zoom { zoom } => self.session.on_zoom_end(now, zoom),
            Event::EnterArea => {
                let effects = self.session.enter_area_mode();
                self.apply(effects)?;
            }
            Event::Districts { enabled } => {
                let effects = self.session.set_districts_enabled(enabled);
                self.apply(effects)?;
            }
            Event::EditArea { bbox } => match self.edit_area(to_bbox(bbox)) {
                Ok(effect) => self.apply(vec![effect])?,
                Err(e) => {
                    self.session.cancel_area_edit();
                    warn!("area edit rejected: {e}");
                }
            },
        }
        Ok(())
    }

    fn edit_area(&mut self, bounds: BoundingBox) -> Result<Effect, PickerError> {
        self.session.begin_area_edit()?;
        self.session.update_area_draft(bounds)?;
        self.session.save_area()
    }

    fn apply(&mut self, effects: Vec<Effect>) -> Result<(), ExplorerError> {
        for effect in effects {
            match effect {
                Effect::SetZoom(zoom) => {
                    // The widget reports its own zoom-end after a programmatic zoom.
                    info!(zoom, "zoom snapped");
                    let now = self.now();
                    self.session.on_zoom_end(now, zoom);
                }
                Effect::ReplacePath(path) => info!(%path, "path replaced"),
                Effect::Fetch(batch) => self.spawn_fetch(batch),
                Effect::LoadDistricts { level, url } => {
                    info!(level = level.as_str(), %url, "district overlay requested");
                }
                Effect::SaveArea { id, bounds } => {
                    // No area store behind the explorer; accept saves as-is.
                    let state = self.session.confirm_area_saved(id.unwrap_or(1))?;
                    info!(id = ?state.id, ?bounds, "area saved");
                }
            }
        }
        Ok(())
    }

    fn spawn_fetch(&mut self, batch: TileBatch) {
        info!(batch = batch.id.0, cells = %batch.cells_param(), "fetching");
        self.in_flight += 1;
        let source = self.source.clone();
        let results = self.results.clone();
        tokio::task::spawn_local(async move {
            let result = source.fetch(&batch).await;
            let _ = results.send((batch.id, result));
        });
    }

    fn report_notices(&mut self) {
        for notice in self.session.drain_notices() {
            match notice.level {
                NoticeLevel::Info => info!(kind = notice.kind, "{}", notice.message),
                NoticeLevel::Warning => warn!(kind = notice.kind, "{}", notice.message),
                NoticeLevel::Error => error!(kind = notice.kind, "{}", notice.message),
            }
        }
    }

    fn print_summary(&self) {
        let viewport = self.session.viewport();
        let cache = self.session.cache();
        let stats = self.session.coordinator().stats();
        info!(
            issued = stats.batches_issued,
            failed = stats.batches_failed,
            cells = stats.cells_merged,
            records = stats.records_merged,
            "replay finished"
        );
        println!("path: {}", self.session.path());
        println!("mode: {:?} at zoom {}", viewport.mode, viewport.zoom);
        println!(
            "cache: {} cells, {} records, {} loading",
            cache.len(),
            cache.record_count(),
            cache.loading().len()
        );
        println!(
            "batches: {} issued, {} failed",
            stats.batches_issued, stats.batches_failed
        );
    }
}

async fn replay(
    session: MapSession,
    source: HttpTileSource,
    script: Script,
    tick_ms: u64,
) -> Result<(), ExplorerError> {
    let mut steps = script.steps;
    steps.sort_by(|a, b| a.at.total_cmp(&b.at));
    let mut steps = VecDeque::from(steps);

    let (results, mut incoming) = mpsc::unbounded_channel();
    let mut replay = Replay {
        session,
        source,
        results,
        in_flight: 0,
        started: Instant::now(),
    };
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    info!(steps = steps.len(), endpoint = replay.source.endpoint(), "replay started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = replay.now();
                while let Some(step) = steps.pop_front() {
                    if step.at > now.seconds() {
                        steps.push_front(step);
                        break;
                    }
                    replay.step(step.event)?;
                }
                let effects = replay.session.poll(now);
                replay.apply(effects)?;
            }
            Some((batch, result)) = incoming.recv() => {
                replay.in_flight -= 1;
                let now = replay.now();
                let effects = replay.session.resolve(now, batch, result)?;
                replay.apply(effects)?;
            }
        }
        replay.report_notices();
        if steps.is_empty() && replay.is_idle() {
            break;
        }
    }

    replay.print_summary();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Event, ExplorerError, Script, covering, covering_cells, fetch_once, parse_bbox};
    use foundation::geocell::GeoCell;
    use streaming::coordinator::{CoordinatorConfig, FetchCoordinator};
    use streaming::protocol::{SpotRecord, TileResponse};
    use streaming::request::TileBatch;
    use streaming::source::{FetchError, TileSource};

    /// Serves `per_cell` empty records for every requested cell.
    struct StaticSource {
        per_cell: usize,
    }

    impl TileSource for StaticSource {
        async fn fetch(&self, batch: &TileBatch) -> Result<TileResponse, FetchError> {
            let mut resp = TileResponse::new();
            for cell in &batch.cells {
                resp.insert(cell.clone(), vec![SpotRecord::default(); self.per_cell]);
            }
            Ok(resp)
        }
    }

    #[test]
    fn parses_bbox_in_south_west_north_east_order() {
        let b = parse_bbox("24.97, 121.50, 25.00, 121.55").unwrap();
        assert_eq!((b.south, b.west, b.north, b.east), (24.97, 121.5, 25.0, 121.55));

        for bad in ["1,2,3", "a,b,c,d", "25,121,24,122", ""] {
            assert!(matches!(parse_bbox(bad), Err(ExplorerError::Bbox(_))), "{bad}");
        }
    }

    #[test]
    fn covering_lists_cells_in_order() {
        let cells = covering("25.0,121.5,25.2,121.55", 4).unwrap();
        assert_eq!(cells, vec!["wsqq", "wsqr"]);
        assert!(matches!(
            covering("25.0,121.5,25.2,121.55", 0),
            Err(ExplorerError::Precision(0))
        ));
    }

    #[test]
    fn precision_error_names_the_allowed_range() {
        let err = covering("25.0,121.5,25.2,121.55", 13).unwrap_err();
        assert_eq!(err.to_string(), "precision must be within 1..=12, got 13");
    }

    #[tokio::test]
    async fn fetch_once_follows_overflow_until_every_cell_is_loaded() {
        let mut coord = FetchCoordinator::new(CoordinatorConfig {
            batch_cap: 4,
            chain_overflow: true,
        });
        let cells = covering_cells("24.5,120.8,25.4,122.1", 4).unwrap();
        let total = cells.len();
        assert!(total > 4);

        let resolutions = fetch_once(&mut coord, &StaticSource { per_cell: 2 }, cells)
            .await
            .unwrap();
        assert_eq!(resolutions.len(), total.div_ceil(4));
        assert!(resolutions.iter().all(|r| r.is_merged()));
        assert_eq!(coord.cache().len(), total);
        assert_eq!(coord.cache().record_count(), total * 2);
        assert!(coord.deferred().is_empty());

        let again = covering_cells("24.5,120.8,25.4,122.1", 4).unwrap();
        let repeat = fetch_once(&mut coord, &StaticSource { per_cell: 2 }, again)
            .await
            .unwrap();
        assert!(repeat.is_empty());
        assert_eq!(coord.stats().batches_issued as usize, total.div_ceil(4));
    }

    #[test]
    fn covering_cells_are_geocells() {
        let cells = covering_cells("24.97,121.50,25.00,121.55", 4).unwrap();
        assert_eq!(cells.into_iter().collect::<Vec<_>>(), vec![GeoCell::parse("wsqq").unwrap()]);
    }

    #[test]
    fn script_steps_deserialize() {
        let script: Script = serde_json::from_str(
            r#"{"steps": [
                {"at": 0.0, "event": "zoom", "zoom": 13},
                {"at": 1.0, "event": "move", "bbox": [24.97, 121.5, 25.0, 121.55]},
                {"at": 2.0, "event": "enter_area"},
                {"at": 3.0, "event": "districts", "enabled": true}
            ]}"#,
        )
        .unwrap();
        assert_eq!(script.steps.len(), 4);
        assert_eq!(script.steps[0].event, Event::Zoom { zoom: 13.0 });
        assert_eq!(script.steps[2].event, Event::EnterArea);
        assert_eq!(script.steps[3].at, 3.0);
    }
}
