//! The world/area mode state machine.
//!
//! Area mode (tile loading active) holds at or above the area threshold
//! `Z_a`. Entering area mode explicitly snaps the zoom up to `Z_a`; leaving it
//! snaps the zoom to at most `Z_a - 1`, so the map never rests exactly on the
//! boundary and small scroll deltas cannot flap between modes.

use foundation::bounds::LatLon;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    World,
    Area,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transition {
    EnteredArea,
    LeftArea,
}

/// Outcome of evaluating a settled zoom.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ModeDecision {
    pub mode: Mode,
    /// Zoom the map should be at; differs from the input when snapped.
    pub zoom: f64,
    pub transition: Option<Transition>,
}

impl ModeDecision {
    pub fn snapped_from(&self, requested: f64) -> bool {
        self.zoom != requested
    }
}

/// Mode implied by a zoom level alone.
pub fn mode_for_zoom(zoom: f64, area_zoom: f64) -> Mode {
    if zoom >= area_zoom {
        Mode::Area
    } else {
        Mode::World
    }
}

/// Next mode after the map settles at `zoom`.
pub fn decide(current: Mode, zoom: f64, area_zoom: f64) -> ModeDecision {
    match (current, mode_for_zoom(zoom, area_zoom)) {
        (Mode::World, Mode::Area) => ModeDecision {
            mode: Mode::Area,
            zoom,
            transition: Some(Transition::EnteredArea),
        },
        (Mode::Area, Mode::World) => ModeDecision {
            mode: Mode::World,
            zoom: zoom.min(area_zoom - 1.0),
            transition: Some(Transition::LeftArea),
        },
        (mode, _) => ModeDecision {
            mode,
            zoom,
            transition: None,
        },
    }
}

/// Explicit request for area mode, e.g. restoring `/area` from the URL.
pub fn enter_area(current: Mode, zoom: f64, area_zoom: f64) -> ModeDecision {
    ModeDecision {
        mode: Mode::Area,
        zoom: zoom.max(area_zoom),
        transition: (current == Mode::World).then_some(Transition::EnteredArea),
    }
}

/// Mode, center and zoom of the map. Only ever persisted through the URL.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub mode: Mode,
    pub center: Option<LatLon>,
    pub zoom: f64,
}
