//! Map session configuration.
//!
//! Every field has a default. Values can come from JSON
//! (`MapConfig::from_json`) and/or `SPOTMAP_*` environment variables
//! (`MapConfig::from_env`).

use std::env;
use std::str::FromStr;

use foundation::bounds::LatLon;
use foundation::geocell::MAX_PRECISION;
use serde::{Deserialize, Serialize};
use streaming::coordinator::{CoordinatorConfig, DEFAULT_BATCH_CAP};
use tracing::warn;

use crate::overlay::DistrictLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    pub base_path: String,
    pub precision: usize,
    pub batch_cap: usize,
    /// Zoom at or above which the map is in area mode and tiles load.
    pub area_zoom: f64,
    pub picker_min_zoom: f64,
    pub move_debounce_ms: u64,
    pub zoom_debounce_ms: u64,
    pub default_center: LatLon,
    pub default_zoom: f64,
    pub district_town_zoom: f64,
    /// `{level}` is replaced with `city` or `town`.
    pub district_url_template: String,
    pub chain_overflow: bool,
    pub coordinate_decimals: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            base_path: "/world".to_string(),
            precision: 4,
            batch_cap: DEFAULT_BATCH_CAP,
            area_zoom: 12.0,
            picker_min_zoom: 13.0,
            move_debounce_ms: 400,
            zoom_debounce_ms: 800,
            default_center: LatLon::new(23.7, 120.96),
            default_zoom: 8.0,
            district_town_zoom: 11.0,
            district_url_template: "/districts/{level}.geojson".to_string(),
            chain_overflow: true,
            coordinate_decimals: 6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

impl MapConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: MapConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `SPOTMAP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Overlay values from a key lookup. Unparseable values keep the current
    /// setting and log a warning.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("SPOTMAP_BASE_PATH") {
            self.base_path = v;
        }
        if let Some(v) = lookup("SPOTMAP_DISTRICT_URL_TEMPLATE") {
            self.district_url_template = v;
        }
        self.precision = parsed(&lookup, "SPOTMAP_PRECISION", self.precision);
        self.batch_cap = parsed(&lookup, "SPOTMAP_BATCH_CAP", self.batch_cap);
        self.area_zoom = parsed(&lookup, "SPOTMAP_AREA_ZOOM", self.area_zoom);
        self.picker_min_zoom = parsed(&lookup, "SPOTMAP_PICKER_MIN_ZOOM", self.picker_min_zoom);
        self.move_debounce_ms = parsed(&lookup, "SPOTMAP_MOVE_DEBOUNCE_MS", self.move_debounce_ms);
        self.zoom_debounce_ms = parsed(&lookup, "SPOTMAP_ZOOM_DEBOUNCE_MS", self.zoom_debounce_ms);
        self.default_center.lat = parsed(&lookup, "SPOTMAP_DEFAULT_LAT", self.default_center.lat);
        self.default_center.lon = parsed(&lookup, "SPOTMAP_DEFAULT_LON", self.default_center.lon);
        self.default_zoom = parsed(&lookup, "SPOTMAP_DEFAULT_ZOOM", self.default_zoom);
        self.district_town_zoom =
            parsed(&lookup, "SPOTMAP_DISTRICT_TOWN_ZOOM", self.district_town_zoom);
        self.chain_overflow = parsed(&lookup, "SPOTMAP_CHAIN_OVERFLOW", self.chain_overflow);
        self.coordinate_decimals =
            parsed(&lookup, "SPOTMAP_COORDINATE_DECIMALS", self.coordinate_decimals);

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_path.starts_with('/') {
            return Err(invalid("base_path", "must start with '/'"));
        }
        if self.base_path.len() > 1 && self.base_path.ends_with('/') {
            return Err(invalid("base_path", "must not end with '/'"));
        }
        if !(1..=MAX_PRECISION).contains(&self.precision) {
            return Err(invalid(
                "precision",
                format!("must be within 1..={}", MAX_PRECISION),
            ));
        }
        if self.batch_cap == 0 {
            return Err(invalid("batch_cap", "must be > 0"));
        }
        for (field, value) in [
            ("area_zoom", self.area_zoom),
            ("picker_min_zoom", self.picker_min_zoom),
            ("default_zoom", self.default_zoom),
            ("district_town_zoom", self.district_town_zoom),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, "must be a finite, non-negative zoom"));
            }
        }
        if self.area_zoom < 1.0 {
            return Err(invalid("area_zoom", "must be >= 1"));
        }
        if !self.default_center.is_valid() {
            return Err(invalid("default_center", "outside lat/lon range"));
        }
        if self.coordinate_decimals > 12 {
            return Err(invalid("coordinate_decimals", "must be <= 12"));
        }
        Ok(())
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            batch_cap: self.batch_cap,
            chain_overflow: self.chain_overflow,
        }
    }

    pub fn district_url(&self, level: DistrictLevel) -> String {
        self.district_url_template.replace("{level}", level.as_str())
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    let Some(raw) = lookup(key) else {
        return current;
    };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable config override");
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, MapConfig};
    use crate::overlay::DistrictLevel;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let c = MapConfig::default();
        c.validate().unwrap();
        assert_eq!(c.precision, 4);
        assert_eq!(c.batch_cap, 100);
        assert_eq!(c.area_zoom, 12.0);
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let c = MapConfig::from_json(r#"{"batch_cap": 20, "base_path": "/map"}"#).unwrap();
        assert_eq!(c.batch_cap, 20);
        assert_eq!(c.base_path, "/map");
        assert_eq!(c.move_debounce_ms, 400);
    }

    #[test]
    fn json_rejects_unknown_fields_and_bad_values() {
        assert!(matches!(
            MapConfig::from_json(r#"{"bogus": 1}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            MapConfig::from_json(r#"{"precision": 0}"#),
            Err(ConfigError::InvalidValue { field: "precision", .. })
        ));
        assert!(matches!(
            MapConfig::from_json(r#"{"base_path": "/world/"}"#),
            Err(ConfigError::InvalidValue { field: "base_path", .. })
        ));
    }

    #[test]
    fn overrides_apply_and_bad_numbers_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("SPOTMAP_BATCH_CAP", "50"),
            ("SPOTMAP_AREA_ZOOM", "thirteen"),
            ("SPOTMAP_CHAIN_OVERFLOW", "false"),
        ]
        .into_iter()
        .collect();
        let c = MapConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.batch_cap, 50);
        assert_eq!(c.area_zoom, 12.0);
        assert!(!c.chain_overflow);
    }

    #[test]
    fn district_url_substitutes_level() {
        let c = MapConfig::default();
        assert_eq!(c.district_url(DistrictLevel::Town), "/districts/town.geojson");
    }
}
