use crate::coordinator::{CoordinatorError, FetchCoordinator, Resolution};
use crate::request::TileBatch;
use crate::source::TileSource;

/// Fetch `batch` from `source` and resolve it, following any chained
/// overflow batches until the chain ends or a batch fails.
///
/// Batches run one after another. Hosts that want overlapping fetches drive
/// [`FetchCoordinator::request_cells`] and [`FetchCoordinator::resolve`]
/// themselves.
pub async fn drive_batch<S: TileSource>(
    coordinator: &mut FetchCoordinator,
    source: &S,
    batch: TileBatch,
) -> Result<Vec<Resolution>, CoordinatorError> {
    let mut resolutions = Vec::new();
    let mut next = Some(batch);
    while let Some(batch) = next.take() {
        let result = source.fetch(&batch).await;
        let resolution = coordinator.resolve(batch.id, result)?;
        if let Resolution::Merged { follow_up, .. } = &resolution {
            next = follow_up.clone();
        }
        resolutions.push(resolution);
    }
    Ok(resolutions)
}
