//! One map page session.
//!
//! `MapSession` is the single owner of all per-page mutable state: viewport
//! tracker, fetch coordinator (and through it the tile cache), path, area
//! picker, district overlay and pending notices. Hosts feed it map events and
//! a clock, and apply the [`Effect`]s it returns.

use foundation::bounds::{BoundingBox, LatLon};
use foundation::geocell::{GeoCell, cell_for};
use foundation::time::Time;
use runtime::notice::{Notice, NoticeBus, NoticeLevel};
use streaming::cache::TileCache;
use streaming::coordinator::{CoordinatorError, FetchCoordinator, Resolution};
use streaming::protocol::{SpotRecord, TileResponse};
use streaming::request::{BatchId, TileBatch};
use streaming::source::FetchError;
use tracing::{debug, info};

use crate::config::{ConfigError, MapConfig};
use crate::mode::{Mode, ModeDecision, Transition, ViewportState};
use crate::overlay::{DistrictLevel, DistrictOverlay};
use crate::path::{PathSync, parse_path};
use crate::picker::{AreaPicker, AreaPickerState, PickerError};
use crate::tracker::{Settled, ViewportTracker};

pub const NOTICE_AREA_PAUSED: &str = "area-paused";
pub const NOTICE_FETCH_FAILED: &str = "tile-fetch-failed";
pub const NOTICE_PICKER_CANCELLED: &str = "picker-cancelled";

/// Work the host must carry out on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Move the map widget to this zoom (mode snapping).
    SetZoom(f64),
    /// Replace the current URL path without a history entry.
    ReplacePath(String),
    /// Fetch this batch and report back through [`MapSession::resolve`].
    Fetch(TileBatch),
    /// Load the district polygons for `level` from `url`.
    LoadDistricts { level: DistrictLevel, url: String },
    /// Persist the area rectangle, then call [`MapSession::confirm_area_saved`].
    SaveArea {
        id: Option<u64>,
        bounds: BoundingBox,
    },
}

#[derive(Debug)]
pub struct MapSession {
    config: MapConfig,
    tracker: ViewportTracker,
    coordinator: FetchCoordinator,
    path: PathSync,
    picker: AreaPicker,
    districts: DistrictOverlay,
    notices: NoticeBus,
}

impl MapSession {
    /// Start a session from the page's initial path.
    ///
    /// The viewport is restored from the path: area mode starts at `Z_a`,
    /// world mode at the configured default zoom (kept below `Z_a`).
    pub fn new(config: MapConfig, initial_path: &str) -> Result<Self, ConfigError> {
        Self::with_area(config, initial_path, AreaPickerState::default())
    }

    pub fn with_area(
        config: MapConfig,
        initial_path: &str,
        area: AreaPickerState,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let parsed = parse_path(&config.base_path, initial_path);
        let zoom = match parsed.mode {
            Mode::Area => config.area_zoom,
            Mode::World => config.default_zoom.min(config.area_zoom - 1.0),
        };
        let initial = ViewportState {
            mode: parsed.mode,
            center: Some(parsed.center.unwrap_or(config.default_center)),
            zoom,
        };
        info!(path = initial_path, mode = ?initial.mode, zoom, "map session restored");

        Ok(Self {
            tracker: ViewportTracker::new(
                initial,
                config.area_zoom,
                config.precision,
                config.move_debounce_ms,
                config.zoom_debounce_ms,
            ),
            coordinator: FetchCoordinator::new(config.coordinator()),
            path: PathSync::new(
                config.base_path.clone(),
                config.area_zoom,
                config.coordinate_decimals,
                initial_path,
            ),
            picker: AreaPicker::new(config.picker_min_zoom, area),
            districts: DistrictOverlay::new(config.district_town_zoom),
            notices: NoticeBus::new(),
            config,
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn viewport(&self) -> &ViewportState {
        self.tracker.state()
    }

    pub fn path(&self) -> &str {
        self.path.current()
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &TileCache {
        self.coordinator.cache()
    }

    pub fn picker(&self) -> &AreaPicker {
        &self.picker
    }

    pub fn districts(&self) -> &DistrictOverlay {
        &self.districts
    }

    /// Cached records in cells touching the last settled viewport. Empty
    /// outside area mode, where spots are not shown.
    pub fn visible_records(&self) -> Vec<&SpotRecord> {
        if self.tracker.mode() != Mode::Area {
            return Vec::new();
        }
        match self.tracker.bbox().filter(|b| !b.is_degenerate()) {
            Some(bbox) => self.cache().records_within(&bbox),
            None => Vec::new(),
        }
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    pub fn next_deadline(&self) -> Option<Time> {
        self.tracker.next_deadline()
    }

    pub fn on_move_end(&mut self, now: Time, bbox: BoundingBox, center: LatLon) {
        self.tracker.on_move_end(now, bbox, center);
    }

    pub fn on_zoom_end(&mut self, now: Time, zoom: f64) {
        self.tracker.on_zoom_end(now, zoom);
    }

    /// Run whatever debounced events have settled by `now`.
    pub fn poll(&mut self, now: Time) -> Vec<Effect> {
        let mut effects = Vec::new();
        for settled in self.tracker.poll(now) {
            match settled {
                Settled::Moved(sample) => {
                    if let Some(p) = self.path.update(Some(sample.center), None) {
                        effects.push(Effect::ReplacePath(p));
                    }
                    self.plan_and_fetch(&mut effects);
                }
                Settled::Zoomed {
                    requested,
                    decision,
                } => self.settle_zoom(now, requested, decision, &mut effects),
            }
        }
        effects
    }

    fn settle_zoom(
        &mut self,
        now: Time,
        requested: f64,
        decision: ModeDecision,
        effects: &mut Vec<Effect>,
    ) {
        if decision.snapped_from(requested) {
            effects.push(Effect::SetZoom(decision.zoom));
        }

        match decision.transition {
            Some(Transition::EnteredArea) => {
                info!(zoom = decision.zoom, "entered area mode");
            }
            Some(Transition::LeftArea) => {
                info!(zoom = decision.zoom, "left area mode, tile loading paused");
                self.notices.emit(
                    now,
                    NoticeLevel::Info,
                    NOTICE_AREA_PAUSED,
                    "Area too large, paused loading spots. Zoom in to resume.",
                );
            }
            None => {}
        }

        if let Some(p) = self.path.update(None, Some(decision.zoom)) {
            effects.push(Effect::ReplacePath(p));
        }

        if self.picker.on_zoom(decision.zoom) {
            self.notices.emit(
                now,
                NoticeLevel::Warning,
                NOTICE_PICKER_CANCELLED,
                "Zoomed out too far, area editing cancelled.",
            );
        }

        if let Some(level) = self.districts.on_zoom(decision.zoom) {
            effects.push(self.district_effect(level));
        }

        if decision.transition == Some(Transition::EnteredArea) {
            self.plan_and_fetch(effects);
        }
    }

    fn plan_and_fetch(&mut self, effects: &mut Vec<Effect>) {
        let Some(plan) = self.tracker.plan_fetch(&self.coordinator) else {
            return;
        };
        if !plan.overflow.is_empty() {
            debug!(overflow = plan.overflow.len(), "viewport exceeds batch cap");
            self.coordinator.defer(plan.overflow);
        }
        if let Some(batch) = self.coordinator.request_cells(plan.batch) {
            effects.push(Effect::Fetch(batch));
        }
    }

    /// Report the outcome of a [`Effect::Fetch`].
    pub fn resolve(
        &mut self,
        now: Time,
        batch: BatchId,
        result: Result<TileResponse, FetchError>,
    ) -> Result<Vec<Effect>, CoordinatorError> {
        let mut effects = Vec::new();
        match self.coordinator.resolve(batch, result)? {
            Resolution::Merged { follow_up, .. } => {
                if let Some(next) = follow_up {
                    effects.push(Effect::Fetch(next));
                }
            }
            Resolution::Failed { error, .. } => {
                self.notices.emit(
                    now,
                    NoticeLevel::Error,
                    NOTICE_FETCH_FAILED,
                    format!("Failed to load spots: {error}"),
                );
            }
        }
        Ok(effects)
    }

    /// Explicitly switch to area mode (snaps zoom up to `Z_a` if below).
    ///
    /// After a snap nothing is fetched until the widget reports the zoomed-in
    /// viewport through `on_move_end`.
    pub fn enter_area_mode(&mut self) -> Vec<Effect> {
        let before = self.tracker.state().zoom;
        let decision = self.tracker.enter_area();
        let mut effects = Vec::new();
        if decision.snapped_from(before) {
            effects.push(Effect::SetZoom(decision.zoom));
        }
        if let Some(p) = self.path.update(None, Some(decision.zoom)) {
            effects.push(Effect::ReplacePath(p));
        }
        if let Some(level) = self.districts.on_zoom(decision.zoom) {
            effects.push(self.district_effect(level));
        }
        self.plan_and_fetch(&mut effects);
        effects
    }

    pub fn set_districts_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        let zoom = self.tracker.state().zoom;
        match self.districts.set_enabled(enabled, zoom) {
            Some(level) => vec![self.district_effect(level)],
            None => Vec::new(),
        }
    }

    fn district_effect(&self, level: DistrictLevel) -> Effect {
        Effect::LoadDistricts {
            level,
            url: self.config.district_url(level),
        }
    }

    pub fn begin_area_edit(&mut self) -> Result<(), PickerError> {
        self.picker.begin_edit(self.tracker.state().zoom)
    }

    pub fn update_area_draft(&mut self, bounds: BoundingBox) -> Result<(), PickerError> {
        self.picker.update_draft(bounds)
    }

    pub fn save_area(&mut self) -> Result<Effect, PickerError> {
        let (id, bounds) = self.picker.save()?;
        Ok(Effect::SaveArea { id, bounds })
    }

    pub fn confirm_area_saved(&mut self, id: u64) -> Result<AreaPickerState, PickerError> {
        self.picker.confirm_saved(id)
    }

    pub fn abort_area_save(&mut self) -> Result<(), PickerError> {
        self.picker.abort_save()
    }

    pub fn cancel_area_edit(&mut self) -> bool {
        self.picker.cancel()
    }

    /// Place a newly created record into the cache without refetching.
    ///
    /// Only lands when the record's cell is already cached; an uncached cell
    /// stays stale so its full content is fetched later.
    pub fn add_record(&mut self, lat: f64, lon: f64, record: SpotRecord) -> bool {
        let cell: GeoCell = cell_for(lat, lon, self.config.precision);
        self.coordinator.insert_record(&cell, record)
    }
}
