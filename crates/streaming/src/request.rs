use foundation::geocell::GeoCell;

/// Identifies an issued tile batch.
///
/// Small and copyable so hosts can carry it through their own task plumbing
/// and hand it back on completion.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(pub u64);

/// One tile request: a deduplicated, lexicographically ordered set of cells.
///
/// The ordering makes repeated requests for the same viewport byte-identical,
/// which keeps them cacheable at the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBatch {
    pub id: BatchId,
    pub cells: Vec<GeoCell>,
}

impl TileBatch {
    pub fn new(id: BatchId, mut cells: Vec<GeoCell>) -> Self {
        cells.sort();
        cells.dedup();
        Self { id, cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Comma-joined cell list used as the `geohashes` query value.
    pub fn cells_param(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() * 5);
        for (i, c) in self.cells.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(c.as_str());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchId, TileBatch};
    use foundation::geocell::GeoCell;

    #[test]
    fn cells_are_sorted_and_deduplicated() {
        let cells = ["wsqr", "wsqq", "wsqr"]
            .into_iter()
            .map(|s| GeoCell::parse(s).unwrap())
            .collect();
        let batch = TileBatch::new(BatchId(1), cells);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.cells_param(), "wsqq,wsqr");
    }
}
