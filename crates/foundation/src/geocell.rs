//! Fixed-precision geohash cells.
//!
//! A geohash of precision `p` interleaves `5 * p` bits, longitude first, so
//! longitude receives `ceil(5p / 2)` bits and latitude `floor(5p / 2)`. At a
//! given precision the cells form a regular grid that partitions the globe,
//! which lets covering sets be computed by integer index ranges instead of
//! neighbor walking.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bounds::{BoundingBox, LatLon};

/// Longest supported geohash (60 bits fit comfortably in a `u64` per axis).
pub const MAX_PRECISION: usize = 12;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoCellError {
    #[error("geohash is empty")]
    Empty,
    #[error("geohash too long: {len} > {max}", max = MAX_PRECISION)]
    TooLong { len: usize },
    #[error("invalid geohash character {0:?}")]
    InvalidChar(char),
    #[error("geohash {cell:?} has precision {actual}, expected {expected}")]
    WrongPrecision {
        cell: String,
        expected: usize,
        actual: usize,
    },
}

/// A geohash cell identifier. Always lowercase and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoCell(String);

impl GeoCell {
    pub fn parse(s: &str) -> Result<Self, GeoCellError> {
        if s.is_empty() {
            return Err(GeoCellError::Empty);
        }
        if s.len() > MAX_PRECISION {
            return Err(GeoCellError::TooLong { len: s.len() });
        }
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            let lower = c.to_ascii_lowercase();
            if !lower.is_ascii() || !BASE32.contains(&(lower as u8)) {
                return Err(GeoCellError::InvalidChar(c));
            }
            out.push(lower);
        }
        Ok(GeoCell(out))
    }

    /// Parse and additionally require an exact precision.
    pub fn parse_with_precision(s: &str, precision: usize) -> Result<Self, GeoCellError> {
        let cell = Self::parse(s)?;
        if cell.precision() != precision {
            return Err(GeoCellError::WrongPrecision {
                cell: cell.0,
                expected: precision,
                actual: s.len(),
            });
        }
        Ok(cell)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn precision(&self) -> usize {
        self.0.len()
    }

    /// The rectangle this cell covers.
    pub fn bounds(&self) -> BoundingBox {
        let grid = Grid::new(self.precision());
        let (mut lat_idx, mut lon_idx) = (0u64, 0u64);
        let mut bit = 0usize;
        for b in self.0.bytes() {
            // Validated on construction.
            let value = BASE32.iter().position(|&c| c == b).unwrap_or(0) as u64;
            for shift in (0..5).rev() {
                let v = (value >> shift) & 1;
                if bit % 2 == 0 {
                    lon_idx = (lon_idx << 1) | v;
                } else {
                    lat_idx = (lat_idx << 1) | v;
                }
                bit += 1;
            }
        }
        grid.cell_bounds(lat_idx, lon_idx)
    }

    pub fn center(&self) -> LatLon {
        self.bounds().center()
    }
}

impl fmt::Display for GeoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GeoCell {
    type Error = GeoCellError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GeoCell::parse(&value)
    }
}

impl From<GeoCell> for String {
    fn from(cell: GeoCell) -> Self {
        cell.0
    }
}

impl AsRef<str> for GeoCell {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The regular index grid underlying one geohash precision.
#[derive(Debug, Copy, Clone)]
struct Grid {
    precision: usize,
    lon_bits: u32,
    lat_bits: u32,
}

impl Grid {
    fn new(precision: usize) -> Self {
        debug_assert!((1..=MAX_PRECISION).contains(&precision));
        let precision = precision.clamp(1, MAX_PRECISION);
        let total = 5 * precision as u32;
        Self {
            precision,
            lon_bits: total.div_ceil(2),
            lat_bits: total / 2,
        }
    }

    fn lon_cells(&self) -> u64 {
        1u64 << self.lon_bits
    }

    fn lat_cells(&self) -> u64 {
        1u64 << self.lat_bits
    }

    fn cell_width(&self) -> f64 {
        360.0 / self.lon_cells() as f64
    }

    fn cell_height(&self) -> f64 {
        180.0 / self.lat_cells() as f64
    }

    fn lon_index(&self, lon: f64) -> u64 {
        axis_index(lon + 180.0, self.cell_width(), self.lon_cells())
    }

    fn lat_index(&self, lat: f64) -> u64 {
        axis_index(lat + 90.0, self.cell_height(), self.lat_cells())
    }

    fn cell_bounds(&self, lat_idx: u64, lon_idx: u64) -> BoundingBox {
        let w = self.cell_width();
        let h = self.cell_height();
        BoundingBox::new(
            lat_idx as f64 * h - 90.0,
            lon_idx as f64 * w - 180.0,
            (lat_idx + 1) as f64 * h - 90.0,
            (lon_idx + 1) as f64 * w - 180.0,
        )
    }

    fn encode(&self, lat_idx: u64, lon_idx: u64) -> GeoCell {
        let mut out = String::with_capacity(self.precision);
        let (mut lon_left, mut lat_left) = (self.lon_bits, self.lat_bits);
        let mut acc = 0usize;
        for bit in 0..5 * self.precision {
            let v = if bit % 2 == 0 {
                lon_left -= 1;
                (lon_idx >> lon_left) & 1
            } else {
                lat_left -= 1;
                (lat_idx >> lat_left) & 1
            };
            acc = (acc << 1) | v as usize;
            if bit % 5 == 4 {
                out.push(BASE32[acc] as char);
                acc = 0;
            }
        }
        GeoCell(out)
    }
}

fn axis_index(offset: f64, cell_size: f64, cells: u64) -> u64 {
    let i = (offset / cell_size).floor();
    if i <= 0.0 {
        0
    } else {
        (i as u64).min(cells - 1)
    }
}

/// The cell containing a single coordinate.
///
/// Points on a shared edge belong to the cell to the north/east, matching
/// the usual bisection encoding. Latitude 90 and longitude 180 fold into the
/// last row/column.
pub fn cell_for(lat: f64, lon: f64, precision: usize) -> GeoCell {
    let grid = Grid::new(precision);
    grid.encode(grid.lat_index(lat), grid.lon_index(lon))
}

/// Every cell whose rectangle intersects `bbox`.
///
/// The result is a covering: cells merely touching the box edge may be
/// included, but no cell overlapping it is ever left out. Iteration order is
/// lexicographic.
pub fn cells_covering(bbox: &BoundingBox, precision: usize) -> BTreeSet<GeoCell> {
    let grid = Grid::new(precision);
    let (lat_lo, lat_hi) = (grid.lat_index(bbox.south), grid.lat_index(bbox.north));
    let (lon_lo, lon_hi) = (grid.lon_index(bbox.west), grid.lon_index(bbox.east));

    let mut out = BTreeSet::new();
    for lat_idx in lat_lo..=lat_hi {
        for lon_idx in lon_lo..=lon_hi {
            out.insert(grid.encode(lat_idx, lon_idx));
        }
    }
    out
}
