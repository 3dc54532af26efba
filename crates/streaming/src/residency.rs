/// Lifecycle of one cell in the tile cache.
///
/// `Unknown → Loading → Loaded`, or `Loading → Unknown` when its batch fails.
/// `Loaded` is terminal for the session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CellState {
    #[default]
    Unknown,
    Loading,
    Loaded,
}

impl CellState {
    /// Whether a viewport needing this cell should request it.
    pub fn is_stale(self) -> bool {
        self == CellState::Unknown
    }
}
