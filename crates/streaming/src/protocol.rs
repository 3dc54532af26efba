//! Wire format of the tile fetch endpoint.
//!
//! Request: `GET <endpoint>?geohashes=c1,c2,...` (see [`TileBatch::cells_param`]).
//! Response: a JSON object mapping each requested cell to an array of spot
//! records, e.g. `{"wsqq": [{...}, {...}]}`.
//!
//! Responses are validated in full before anything is merged: one bad key or
//! record fails the whole batch.
//!
//! [`TileBatch::cells_param`]: crate::request::TileBatch::cells_param

use std::collections::{BTreeMap, BTreeSet};

use foundation::geocell::{GeoCell, GeoCellError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A geotagged record as served by the tile endpoint.
///
/// The cache treats records as opaque; the only structural requirement is
/// that each one is a JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpotRecord(pub Map<String, Value>);

impl SpotRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }
}

impl From<Map<String, Value>> for SpotRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed tile response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tile response key {key:?} is not a geohash: {source}")]
    InvalidCell { key: String, source: GeoCellError },
    #[error("tile response contains unrequested cell {0}")]
    UnrequestedCell(GeoCell),
}

/// A validated tile response, keyed by cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileResponse {
    tiles: BTreeMap<GeoCell, Vec<SpotRecord>>,
}

impl TileResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a response from already-typed tiles. Use [`TileResponse::validate`]
    /// before trusting it against a batch.
    pub fn from_tiles(tiles: BTreeMap<GeoCell, Vec<SpotRecord>>) -> Self {
        Self { tiles }
    }

    /// Decode and validate a response body against the cells that were asked for.
    pub fn from_slice(body: &[u8], requested: &[GeoCell]) -> Result<Self, ProtocolError> {
        let raw: BTreeMap<String, Vec<SpotRecord>> = serde_json::from_slice(body)?;

        let mut tiles = BTreeMap::new();
        for (key, records) in raw {
            let cell = GeoCell::parse(&key)
                .map_err(|source| ProtocolError::InvalidCell { key, source })?;
            tiles.insert(cell, records);
        }

        let response = Self { tiles };
        response.validate(requested)?;
        Ok(response)
    }

    /// Rejects responses carrying cells outside the requested set.
    pub fn validate(&self, requested: &[GeoCell]) -> Result<(), ProtocolError> {
        let requested: BTreeSet<&GeoCell> = requested.iter().collect();
        match self.tiles.keys().find(|c| !requested.contains(c)) {
            Some(extra) => Err(ProtocolError::UnrequestedCell(extra.clone())),
            None => Ok(()),
        }
    }

    pub fn insert(&mut self, cell: GeoCell, records: Vec<SpotRecord>) {
        self.tiles.insert(cell, records);
    }

    pub fn tile(&self, cell: &GeoCell) -> Option<&[SpotRecord]> {
        self.tiles.get(cell).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.tiles.values().map(Vec::len).sum()
    }

    pub fn into_tiles(self) -> BTreeMap<GeoCell, Vec<SpotRecord>> {
        self.tiles
    }
}
