use std::collections::{BTreeMap, BTreeSet};

use foundation::bounds::BoundingBox;
use foundation::geocell::GeoCell;

use crate::protocol::{SpotRecord, TileResponse};
use crate::residency::CellState;

/// Result of merging one successful batch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub cells: usize,
    pub records: usize,
}

/// Session-lifetime tile cache.
///
/// Notes:
/// - Entries are keyed in a `BTreeMap` for stable traversal order.
/// - Keys are never removed: the cache only grows. An empty record list is a
///   loaded cell with nothing in it.
/// - `loading` and `loaded` are disjoint; a cell moves from one to the other
///   inside a single `merge` call.
///
/// Mutation is crate-private: the fetch coordinator owns the cache and the
/// rest of the world only reads it.
#[derive(Debug, Default)]
pub struct TileCache {
    tiles: BTreeMap<GeoCell, Vec<SpotRecord>>,
    loading: BTreeSet<GeoCell>,
    loaded: BTreeSet<GeoCell>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached cells.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.tiles.values().map(Vec::len).sum()
    }

    pub fn state(&self, cell: &GeoCell) -> CellState {
        if self.loading.contains(cell) {
            CellState::Loading
        } else if self.is_known(cell) {
            CellState::Loaded
        } else {
            CellState::Unknown
        }
    }

    /// Loaded, or merged without formally being marked loaded.
    pub fn is_known(&self, cell: &GeoCell) -> bool {
        self.loaded.contains(cell) || self.tiles.contains_key(cell)
    }

    pub fn is_loading(&self, cell: &GeoCell) -> bool {
        self.loading.contains(cell)
    }

    pub fn loading(&self) -> &BTreeSet<GeoCell> {
        &self.loading
    }

    pub fn loaded(&self) -> &BTreeSet<GeoCell> {
        &self.loaded
    }

    pub fn tile(&self, cell: &GeoCell) -> Option<&[SpotRecord]> {
        self.tiles.get(cell).map(|v| v.as_slice())
    }

    pub fn cells(&self) -> impl Iterator<Item = &GeoCell> {
        self.tiles.keys()
    }

    /// All cached records, in cell order.
    pub fn records(&self) -> impl Iterator<Item = (&GeoCell, &SpotRecord)> {
        self.tiles
            .iter()
            .flat_map(|(cell, records)| records.iter().map(move |r| (cell, r)))
    }

    /// Cached records restricted to `cells` (typically a viewport covering).
    pub fn records_in<'a, 'c>(
        &'a self,
        cells: impl IntoIterator<Item = &'c GeoCell>,
    ) -> Vec<&'a SpotRecord> {
        cells
            .into_iter()
            .filter_map(|c| self.tiles.get(c))
            .flatten()
            .collect()
    }

    /// Cached records whose cell rectangle intersects `bbox`. Walks the cache,
    /// so the cost follows what is loaded rather than the size of the box.
    pub fn records_within(&self, bbox: &BoundingBox) -> Vec<&SpotRecord> {
        self.tiles
            .iter()
            .filter(|(cell, _)| cell.bounds().intersects(bbox))
            .flat_map(|(_, records)| records.iter())
            .collect()
    }

    /// Candidates that are neither known nor loading, in lexicographic order.
    pub fn stale<I>(&self, candidates: I) -> BTreeSet<GeoCell>
    where
        I: IntoIterator<Item = GeoCell>,
    {
        candidates
            .into_iter()
            .filter(|c| self.state(c).is_stale())
            .collect()
    }

    pub(crate) fn mark_loading(&mut self, cells: &[GeoCell]) {
        self.loading.extend(cells.iter().cloned());
    }

    /// Overwrite-by-key merge of a batch. Requested cells absent from the
    /// response are stored as empty.
    pub(crate) fn merge(&mut self, cells: &[GeoCell], response: TileResponse) -> MergeSummary {
        let mut tiles = response.into_tiles();
        let mut summary = MergeSummary::default();
        for cell in cells {
            let records = tiles.remove(cell).unwrap_or_default();
            summary.cells += 1;
            summary.records += records.len();
            self.tiles.insert(cell.clone(), records);
            self.loading.remove(cell);
            self.loaded.insert(cell.clone());
        }
        summary
    }

    /// Return cells of a failed batch to the fetchable pool.
    pub(crate) fn release(&mut self, cells: &[GeoCell]) {
        for cell in cells {
            self.loading.remove(cell);
        }
    }

    /// Append a locally created record to an already cached cell.
    ///
    /// Returns `false` when the cell is not cached; the record then arrives
    /// with the cell's first fetch.
    pub(crate) fn insert_record(&mut self, cell: &GeoCell, record: SpotRecord) -> bool {
        match self.tiles.get_mut(cell) {
            Some(records) => {
                records.push(record);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TileCache;
    use crate::protocol::{SpotRecord, TileResponse};
    use crate::residency::CellState;
    use foundation::bounds::BoundingBox;
    use foundation::geocell::GeoCell;
    use pretty_assertions::assert_eq;

    fn cell(s: &str) -> GeoCell {
        GeoCell::parse(s).unwrap()
    }

    fn records(n: usize) -> Vec<SpotRecord> {
        (0..n)
            .map(|i| {
                let mut m = serde_json::Map::new();
                m.insert("id".into(), i.into());
                SpotRecord::new(m)
            })
            .collect()
    }

    #[test]
    fn lifecycle_unknown_loading_loaded() {
        let mut cache = TileCache::new();
        let a = cell("wsqq");
        assert_eq!(cache.state(&a), CellState::Unknown);

        cache.mark_loading(&[a.clone()]);
        assert_eq!(cache.state(&a), CellState::Loading);

        let mut resp = TileResponse::new();
        resp.insert(a.clone(), records(3));
        let summary = cache.merge(&[a.clone()], resp);
        assert_eq!((summary.cells, summary.records), (1, 3));
        assert_eq!(cache.state(&a), CellState::Loaded);
        assert!(cache.loading().is_empty());
        assert_eq!(cache.tile(&a).map(|t| t.len()), Some(3));
    }

    #[test]
    fn missing_cells_merge_as_empty() {
        let mut cache = TileCache::new();
        let (a, b) = (cell("wsqq"), cell("wsqr"));
        cache.mark_loading(&[a.clone(), b.clone()]);
        let mut resp = TileResponse::new();
        resp.insert(a.clone(), records(1));
        cache.merge(&[a.clone(), b.clone()], resp);
        assert_eq!(cache.tile(&b), Some(&[][..]));
        assert!(cache.loaded().contains(&b));
    }

    #[test]
    fn merge_overwrites_instead_of_appending() {
        let mut cache = TileCache::new();
        let a = cell("wsqq");
        for _ in 0..2 {
            let mut resp = TileResponse::new();
            resp.insert(a.clone(), records(2));
            cache.merge(&[a.clone()], resp);
        }
        assert_eq!(cache.record_count(), 2);
    }

    #[test]
    fn release_only_clears_loading() {
        let mut cache = TileCache::new();
        let a = cell("wsqq");
        cache.mark_loading(&[a.clone()]);
        cache.release(&[a.clone()]);
        assert_eq!(cache.state(&a), CellState::Unknown);
        assert!(cache.is_empty());
    }

    #[test]
    fn stale_excludes_known_and_loading() {
        let mut cache = TileCache::new();
        let (a, b, c) = (cell("wsqq"), cell("wsqr"), cell("wsqw"));
        cache.merge(&[a.clone()], TileResponse::new());
        cache.mark_loading(&[b.clone()]);
        let stale: Vec<_> = cache
            .stale([c.clone(), b, a])
            .into_iter()
            .collect();
        assert_eq!(stale, vec![c]);
    }

    #[test]
    fn records_view_and_local_insert() {
        let mut cache = TileCache::new();
        let (a, b) = (cell("wsqq"), cell("wsqr"));
        let mut resp = TileResponse::new();
        resp.insert(a.clone(), records(2));
        cache.merge(&[a.clone()], resp);

        assert!(cache.insert_record(&a, SpotRecord::default()));
        assert!(!cache.insert_record(&b, SpotRecord::default()));
        assert_eq!(cache.records().count(), 3);
        assert_eq!(cache.records_in([&a, &b]).len(), 3);
        assert_eq!(cache.state(&b), CellState::Unknown);
    }

    #[test]
    fn records_in_accepts_a_short_lived_cell_list() {
        let mut cache = TileCache::new();
        let a = cell("wsqq");
        let mut resp = TileResponse::new();
        resp.insert(a.clone(), records(2));
        cache.merge(&[a], resp);

        let visible = {
            let wanted = vec![cell("wsqq"), cell("wsqr")];
            cache.records_in(wanted.iter())
        };
        assert_eq!(visible.len(), 2);
    }

    #[test]
    fn records_within_filters_by_cell_bounds() {
        let mut cache = TileCache::new();
        let (a, far) = (cell("wsqq"), cell("u4pr"));
        let mut resp = TileResponse::new();
        resp.insert(a.clone(), records(3));
        resp.insert(far.clone(), records(5));
        cache.merge(&[a, far], resp);

        let taipei = BoundingBox::new(24.97, 121.50, 25.00, 121.55);
        assert_eq!(cache.records_within(&taipei).len(), 3);
        let world = BoundingBox::new(-85.0, -180.0, 85.0, 180.0);
        assert_eq!(cache.records_within(&world).len(), 8);
    }
}
