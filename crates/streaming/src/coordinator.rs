use std::collections::{BTreeMap, BTreeSet};

use foundation::geocell::GeoCell;
use tracing::{debug, info, warn};

use crate::cache::TileCache;
use crate::protocol::{SpotRecord, TileResponse};
use crate::request::{BatchId, TileBatch};
use crate::source::FetchError;

/// Reference ceiling on cells per tile request.
pub const DEFAULT_BATCH_CAP: usize = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub batch_cap: usize,
    /// Issue a follow-up batch for deferred overflow cells after each success.
    pub chain_overflow: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_cap: DEFAULT_BATCH_CAP,
            chain_overflow: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CoordinatorStats {
    pub batches_issued: u64,
    pub batches_failed: u64,
    pub cells_merged: u64,
    pub records_merged: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("unknown or already resolved batch {0:?}")]
    UnknownBatch(BatchId),
}

/// What happened to a resolved batch.
#[derive(Debug)]
pub enum Resolution {
    Merged {
        batch: BatchId,
        cells: Vec<GeoCell>,
        records: usize,
        /// Next batch of deferred overflow cells, already marked loading.
        follow_up: Option<TileBatch>,
    },
    Failed {
        batch: BatchId,
        cells: Vec<GeoCell>,
        error: FetchError,
    },
}

impl Resolution {
    pub fn batch(&self) -> BatchId {
        match self {
            Resolution::Merged { batch, .. } | Resolution::Failed { batch, .. } => *batch,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, Resolution::Merged { .. })
    }
}

/// Deduplicating, batch-limited tile fetch coordinator.
///
/// Sans-IO: [`FetchCoordinator::request_cells`] hands back the batch to fetch
/// and the host reports the outcome through [`FetchCoordinator::resolve`].
/// Cells are marked loading before the batch leaves, so overlapping viewport
/// events never request the same cell twice concurrently.
#[derive(Debug)]
pub struct FetchCoordinator {
    config: CoordinatorConfig,
    cache: TileCache,
    in_flight: BTreeMap<BatchId, Vec<GeoCell>>,
    deferred: BTreeSet<GeoCell>,
    next_batch: u64,
    stats: CoordinatorStats,
}

impl FetchCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config: CoordinatorConfig {
                batch_cap: config.batch_cap.max(1),
                ..config
            },
            cache: TileCache::new(),
            in_flight: BTreeMap::new(),
            deferred: BTreeSet::new(),
            next_batch: 1,
            stats: CoordinatorStats::default(),
        }
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    pub fn batch_cap(&self) -> usize {
        self.config.batch_cap
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn deferred(&self) -> &BTreeSet<GeoCell> {
        &self.deferred
    }

    /// Candidates that are neither cached nor loading, lexicographically.
    pub fn stale_cells<I>(&self, candidates: I) -> BTreeSet<GeoCell>
    where
        I: IntoIterator<Item = GeoCell>,
    {
        self.cache.stale(candidates)
    }

    /// Remember overflow cells a capped batch could not carry.
    pub fn defer<I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = GeoCell>,
    {
        self.deferred.extend(cells);
    }

    /// Start a batch for the stale subset of `candidates`.
    ///
    /// Returns `None` when nothing is stale, which makes repeated identical
    /// viewport events free. Cells beyond the cap are deferred.
    pub fn request_cells<I>(&mut self, candidates: I) -> Option<TileBatch>
    where
        I: IntoIterator<Item = GeoCell>,
    {
        let mut stale: Vec<GeoCell> = self.cache.stale(candidates).into_iter().collect();
        if stale.is_empty() {
            debug!("no stale cells");
            return None;
        }

        if stale.len() > self.config.batch_cap {
            let overflow = stale.split_off(self.config.batch_cap);
            debug!(overflow = overflow.len(), "batch cap reached, deferring");
            self.deferred.extend(overflow);
        }
        for cell in &stale {
            self.deferred.remove(cell);
        }

        self.cache.mark_loading(&stale);

        let id = BatchId(self.next_batch);
        self.next_batch += 1;
        let batch = TileBatch::new(id, stale);
        self.in_flight.insert(id, batch.cells.clone());
        self.stats.batches_issued += 1;

        info!(batch = id.0, cells = batch.len(), "tile batch issued");
        Some(batch)
    }

    /// Reconcile a finished batch.
    ///
    /// On success the response is checked against the batch and merged; on any
    /// failure the cells only leave the loading set and stay fetchable.
    pub fn resolve(
        &mut self,
        id: BatchId,
        result: Result<TileResponse, FetchError>,
    ) -> Result<Resolution, CoordinatorError> {
        let cells = self
            .in_flight
            .remove(&id)
            .ok_or(CoordinatorError::UnknownBatch(id))?;

        let checked = result.and_then(|resp| {
            resp.validate(&cells)?;
            Ok(resp)
        });

        match checked {
            Ok(resp) => {
                let summary = self.cache.merge(&cells, resp);
                self.stats.cells_merged += summary.cells as u64;
                self.stats.records_merged += summary.records as u64;
                info!(
                    batch = id.0,
                    cells = summary.cells,
                    records = summary.records,
                    "tile batch merged"
                );

                let follow_up = if self.config.chain_overflow {
                    self.next_deferred_batch()
                } else {
                    None
                };

                Ok(Resolution::Merged {
                    batch: id,
                    cells,
                    records: summary.records,
                    follow_up,
                })
            }
            Err(error) => {
                self.cache.release(&cells);
                self.stats.batches_failed += 1;
                warn!(batch = id.0, cells = cells.len(), %error, "tile batch failed");
                Ok(Resolution::Failed {
                    batch: id,
                    cells,
                    error,
                })
            }
        }
    }

    /// Place a locally created record into its cell if that cell is cached.
    pub fn insert_record(&mut self, cell: &GeoCell, record: SpotRecord) -> bool {
        self.cache.insert_record(cell, record)
    }

    fn next_deferred_batch(&mut self) -> Option<TileBatch> {
        let cache = &self.cache;
        self.deferred.retain(|c| cache.state(c).is_stale());
        if self.deferred.is_empty() {
            return None;
        }
        let next: Vec<GeoCell> = self
            .deferred
            .iter()
            .take(self.config.batch_cap)
            .cloned()
            .collect();
        self.request_cells(next)
    }
}

impl Default for FetchCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}
