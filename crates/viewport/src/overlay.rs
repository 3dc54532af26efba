use serde::{Deserialize, Serialize};

/// Administrative detail of the district polygons.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistrictLevel {
    City,
    Town,
}

impl DistrictLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            DistrictLevel::City => "city",
            DistrictLevel::Town => "town",
        }
    }
}

/// Optional district polygon layer, toggled independently of tile loading.
///
/// Polygons are static GeoJSON left to the HTTP cache; the overlay only
/// decides when a level needs (re)loading.
#[derive(Debug, Clone)]
pub struct DistrictOverlay {
    enabled: bool,
    town_zoom: f64,
    shown: Option<DistrictLevel>,
}

impl DistrictOverlay {
    pub fn new(town_zoom: f64) -> Self {
        Self {
            enabled: false,
            town_zoom,
            shown: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn shown(&self) -> Option<DistrictLevel> {
        self.shown
    }

    pub fn level_for(&self, zoom: f64) -> DistrictLevel {
        if zoom >= self.town_zoom {
            DistrictLevel::Town
        } else {
            DistrictLevel::City
        }
    }

    /// Toggle the layer. Returns the level to load when switching on.
    pub fn set_enabled(&mut self, enabled: bool, zoom: f64) -> Option<DistrictLevel> {
        if enabled == self.enabled {
            return None;
        }
        self.enabled = enabled;
        if !enabled {
            self.shown = None;
            return None;
        }
        let level = self.level_for(zoom);
        self.shown = Some(level);
        Some(level)
    }

    /// Zoom-end hook. Returns a level to load when the detail changed.
    pub fn on_zoom(&mut self, zoom: f64) -> Option<DistrictLevel> {
        if !self.enabled {
            return None;
        }
        let level = self.level_for(zoom);
        if self.shown == Some(level) {
            return None;
        }
        self.shown = Some(level);
        Some(level)
    }
}

#[cfg(test)]
mod tests {
    use super::{DistrictLevel, DistrictOverlay};

    #[test]
    fn loads_once_per_toggle_and_level_change() {
        let mut o = DistrictOverlay::new(11.0);
        assert_eq!(o.on_zoom(12.0), None);
        assert_eq!(o.set_enabled(true, 8.0), Some(DistrictLevel::City));
        assert_eq!(o.set_enabled(true, 8.0), None);
        assert_eq!(o.on_zoom(9.0), None);
        assert_eq!(o.on_zoom(11.0), Some(DistrictLevel::Town));
        assert_eq!(o.on_zoom(14.0), None);
        assert_eq!(o.set_enabled(false, 14.0), None);
        assert_eq!(o.shown(), None);
        assert_eq!(o.set_enabled(true, 14.0), Some(DistrictLevel::Town));
    }
}
