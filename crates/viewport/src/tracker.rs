use foundation::bounds::{BoundingBox, LatLon};
use foundation::geocell::{GeoCell, cells_covering};
use foundation::time::Time;
use runtime::debounce::Debounced;
use streaming::coordinator::FetchCoordinator;

use crate::mode::{self, Mode, ModeDecision, ViewportState};

/// A move-end report from the map widget.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MoveSample {
    pub bbox: BoundingBox,
    pub center: LatLon,
}

/// A debounced event that has settled.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Settled {
    Moved(MoveSample),
    Zoomed {
        requested: f64,
        decision: ModeDecision,
    },
}

/// Stale cells for the current viewport, split at the batch cap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchPlan {
    pub batch: Vec<GeoCell>,
    pub overflow: Vec<GeoCell>,
}

/// Debounces map move/zoom completion and owns the viewport state.
///
/// Move-end and zoom-end are debounced independently (trailing edge), so a
/// user who stops interacting gets exactly one evaluation of each.
#[derive(Debug)]
pub struct ViewportTracker {
    state: ViewportState,
    area_zoom: f64,
    precision: usize,
    bbox: Option<BoundingBox>,
    moves: Debounced<MoveSample>,
    zooms: Debounced<f64>,
}

impl ViewportTracker {
    pub fn new(
        initial: ViewportState,
        area_zoom: f64,
        precision: usize,
        move_debounce_ms: u64,
        zoom_debounce_ms: u64,
    ) -> Self {
        Self {
            state: initial,
            area_zoom,
            precision,
            bbox: None,
            moves: Debounced::from_millis(move_debounce_ms),
            zooms: Debounced::from_millis(zoom_debounce_ms),
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    pub fn area_zoom(&self) -> f64 {
        self.area_zoom
    }

    pub fn on_move_end(&mut self, now: Time, bbox: BoundingBox, center: LatLon) {
        self.moves.push(now, MoveSample { bbox, center });
    }

    pub fn on_zoom_end(&mut self, now: Time, zoom: f64) {
        self.zooms.push(now, zoom);
    }

    /// Earliest pending debounce deadline, for hosts scheduling a wake-up.
    pub fn next_deadline(&self) -> Option<Time> {
        match (self.moves.deadline(), self.zooms.deadline()) {
            (Some(a), Some(b)) => Some(if a <= b { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    /// Apply every settled event, earliest deadline first.
    pub fn poll(&mut self, now: Time) -> Vec<Settled> {
        let move_first = match (self.moves.deadline(), self.zooms.deadline()) {
            (Some(m), Some(z)) => m <= z,
            _ => true,
        };

        let mut out = Vec::new();
        if move_first {
            self.poll_move(now, &mut out);
            self.poll_zoom(now, &mut out);
        } else {
            self.poll_zoom(now, &mut out);
            self.poll_move(now, &mut out);
        }
        out
    }

    fn poll_move(&mut self, now: Time, out: &mut Vec<Settled>) {
        if let Some(sample) = self.moves.poll(now) {
            self.bbox = Some(sample.bbox);
            self.state.center = Some(sample.center);
            out.push(Settled::Moved(sample));
        }
    }

    fn poll_zoom(&mut self, now: Time, out: &mut Vec<Settled>) {
        if let Some(requested) = self.zooms.poll(now) {
            let decision = mode::decide(self.state.mode, requested, self.area_zoom);
            self.apply(decision);
            out.push(Settled::Zoomed {
                requested,
                decision,
            });
        }
    }

    /// Switch to area mode on request, snapping the zoom up if needed.
    ///
    /// A snap invalidates the settled bbox: it describes the zoomed-out view,
    /// and the widget reports the new one with its next move-end.
    pub fn enter_area(&mut self) -> ModeDecision {
        let decision = mode::enter_area(self.state.mode, self.state.zoom, self.area_zoom);
        if decision.snapped_from(self.state.zoom) {
            self.bbox = None;
        }
        self.apply(decision);
        decision
    }

    fn apply(&mut self, decision: ModeDecision) {
        self.state.mode = decision.mode;
        self.state.zoom = decision.zoom;
    }

    /// Cells the current viewport needs but the coordinator neither has nor
    /// is loading. Lexicographic, so the same viewport always yields the same
    /// batch. `None` outside area mode, before the first move, on a
    /// degenerate box, or when nothing is stale.
    pub fn plan_fetch(&self, coordinator: &FetchCoordinator) -> Option<FetchPlan> {
        if self.state.mode != Mode::Area {
            return None;
        }
        let mut batch: Vec<GeoCell> = coordinator
            .stale_cells(self.covering())
            .into_iter()
            .collect();
        if batch.is_empty() {
            return None;
        }
        let overflow = if batch.len() > coordinator.batch_cap() {
            batch.split_off(coordinator.batch_cap())
        } else {
            Vec::new()
        };
        Some(FetchPlan { batch, overflow })
    }

    /// Covering set of the last settled viewport.
    pub fn covering(&self) -> Vec<GeoCell> {
        match self.bbox.filter(|b| !b.is_degenerate()) {
            Some(b) => cells_covering(&b, self.precision).into_iter().collect(),
            None => Vec::new(),
        }
    }
}
