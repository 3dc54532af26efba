//! Viewport state <-> browser path.
//!
//! Layout: `{base}` (world), `{base}/area` (area), either optionally followed
//! by `/@{lat},{lon}`. Unrelated trailing segments are preserved on update.

use foundation::bounds::LatLon;

use crate::mode::{Mode, mode_for_zoom};

const AREA_SEGMENT: &str = "area";

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ParsedPath {
    pub mode: Mode,
    pub center: Option<LatLon>,
}

/// Segments after `base`, or `None` when `path` is not under `base`.
fn tail<'a>(base: &str, path: &'a str) -> Option<Vec<&'a str>> {
    let rest = if base == "/" {
        path.strip_prefix('/')?
    } else {
        let rest = path.strip_prefix(base)?;
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        rest
    };
    Some(rest.split('/').filter(|s| !s.is_empty()).collect())
}

fn parse_coords(segment: &str) -> Option<LatLon> {
    let (lat, lon) = segment.strip_prefix('@')?.split_once(',')?;
    let p = LatLon::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?);
    p.is_valid().then_some(p)
}

/// Parse a pathname against the map's base path.
///
/// Paths outside the base, or coordinates that do not parse, degrade to
/// world mode and/or no center rather than failing.
pub fn parse_path(base: &str, path: &str) -> ParsedPath {
    let Some(segments) = tail(base, path) else {
        return ParsedPath {
            mode: Mode::World,
            center: None,
        };
    };
    let mode = if segments.first() == Some(&AREA_SEGMENT) {
        Mode::Area
    } else {
        Mode::World
    };
    let center = segments
        .iter()
        .find(|s| s.starts_with('@'))
        .and_then(|s| parse_coords(s));
    ParsedPath { mode, center }
}

/// Keeps the current path and rewrites it in place as the viewport settles.
#[derive(Debug, Clone)]
pub struct PathSync {
    base: String,
    area_zoom: f64,
    decimals: usize,
    current: String,
}

impl PathSync {
    pub fn new(base: impl Into<String>, area_zoom: f64, decimals: usize, initial: &str) -> Self {
        Self {
            base: base.into(),
            area_zoom,
            decimals,
            current: initial.to_string(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn parse(&self) -> ParsedPath {
        parse_path(&self.base, &self.current)
    }

    /// Replace or append the `@lat,lon` segment and toggle `/area` to match
    /// `new_zoom`. Returns the new path when it changed; the host applies it
    /// without adding a history entry.
    pub fn update(&mut self, new_center: Option<LatLon>, new_zoom: Option<f64>) -> Option<String> {
        let mut segments: Vec<String> = tail(&self.base, &self.current)
            .unwrap_or_default()
            .into_iter()
            .map(str::to_string)
            .collect();

        if let Some(zoom) = new_zoom {
            let has_area = segments.first().map(String::as_str) == Some(AREA_SEGMENT);
            match (mode_for_zoom(zoom, self.area_zoom), has_area) {
                (Mode::Area, false) => segments.insert(0, AREA_SEGMENT.to_string()),
                (Mode::World, true) => {
                    segments.remove(0);
                }
                _ => {}
            }
        }

        if let Some(c) = new_center {
            let d = self.decimals;
            let coords = format!("@{:.*},{:.*}", d, c.lat, d, c.lon);
            match segments.iter().position(|s| s.starts_with('@')) {
                Some(i) => segments[i] = coords,
                None => segments.push(coords),
            }
        }

        let mut next = if self.base == "/" {
            String::new()
        } else {
            self.base.clone()
        };
        for s in &segments {
            next.push('/');
            next.push_str(s);
        }
        if next.is_empty() {
            next.push('/');
        }

        if next == self.current {
            return None;
        }
        self.current = next.clone();
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::{ParsedPath, PathSync, parse_path};
    use crate::mode::Mode;
    use foundation::bounds::LatLon;

    const ZA: f64 = 12.0;

    #[test]
    fn parses_mode_and_coordinates() {
        assert_eq!(
            parse_path("/world", "/world/area/@25.033,121.565"),
            ParsedPath {
                mode: Mode::Area,
                center: Some(LatLon::new(25.033, 121.565)),
            }
        );
        assert_eq!(
            parse_path("/world", "/world/@-33.5,151.25"),
            ParsedPath {
                mode: Mode::World,
                center: Some(LatLon::new(-33.5, 151.25)),
            }
        );
        assert_eq!(parse_path("/world", "/world").center, None);
        assert_eq!(parse_path("/world", "/world/").mode, Mode::World);
    }

    #[test]
    fn area_must_follow_base_directly() {
        assert_eq!(parse_path("/world", "/world/x/area").mode, Mode::World);
        assert_eq!(parse_path("/world", "/worldly/area").mode, Mode::World);
        assert_eq!(parse_path("/world", "/other/area").mode, Mode::World);
    }

    #[test]
    fn bad_coordinates_are_dropped() {
        for p in ["/world/@abc,1", "/world/@91,0", "/world/@1", "/world/@1,200"] {
            assert_eq!(parse_path("/world", p).center, None, "{p}");
        }
    }

    #[test]
    fn update_appends_then_replaces_center() {
        let mut sync = PathSync::new("/world", ZA, 6, "/world");
        let p = sync.update(Some(LatLon::new(25.0, 121.5)), None).unwrap();
        assert_eq!(p, "/world/@25.000000,121.500000");
        let p = sync.update(Some(LatLon::new(24.5, 121.0)), None).unwrap();
        assert_eq!(p, "/world/@24.500000,121.000000");
        assert_eq!(sync.update(Some(LatLon::new(24.5, 121.0)), None), None);
    }

    #[test]
    fn zoom_toggles_area_segment() {
        let mut sync = PathSync::new("/world", ZA, 6, "/world/@25.000000,121.500000");
        assert_eq!(
            sync.update(None, Some(13.0)).as_deref(),
            Some("/world/area/@25.000000,121.500000")
        );
        assert_eq!(sync.update(None, Some(14.0)), None);
        assert_eq!(
            sync.update(None, Some(11.0)).as_deref(),
            Some("/world/@25.000000,121.500000")
        );
    }

    #[test]
    fn unrelated_segments_survive() {
        let mut sync = PathSync::new("/world", ZA, 2, "/world/spots/42");
        let p = sync.update(Some(LatLon::new(1.0, 2.0)), Some(12.0)).unwrap();
        assert_eq!(p, "/world/area/spots/42/@1.00,2.00");
    }

    #[test]
    fn update_then_parse_round_trips() {
        let cases = [
            (Mode::Area, 25.033964, 121.564468),
            (Mode::World, -33.8688, 151.2093),
            (Mode::World, 0.0, 0.0),
            (Mode::Area, 89.9999, -179.9999),
        ];
        for (mode, lat, lon) in cases {
            let mut sync = PathSync::new("/world", ZA, 6, "/world");
            let zoom = if mode == Mode::Area { ZA } else { ZA - 1.0 };
            sync.update(Some(LatLon::new(lat, lon)), Some(zoom));
            let parsed = sync.parse();
            assert_eq!(parsed.mode, mode);
            let c = parsed.center.unwrap();
            assert!((c.lat - lat).abs() < 1e-6 && (c.lon - lon).abs() < 1e-6);
        }
    }

    #[test]
    fn root_base_path() {
        let mut sync = PathSync::new("/", ZA, 1, "/");
        assert_eq!(sync.update(None, Some(ZA)).as_deref(), Some("/area"));
        assert_eq!(sync.parse().mode, Mode::Area);
        assert_eq!(sync.update(None, Some(1.0)).as_deref(), Some("/"));
    }
}
