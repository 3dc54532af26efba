use std::future::Future;

use crate::protocol::{ProtocolError, TileResponse};
use crate::request::TileBatch;

/// Any failure of a tile batch. Every variant fails the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("tile request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("tile endpoint returned HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl FetchError {
    /// Network errors and 5xx responses; everything else is the server or
    /// client disagreeing about the protocol.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(code) => *code >= 500,
            FetchError::Protocol(_) => false,
        }
    }
}

/// Anything that can answer a tile batch.
///
/// Futures need not be `Send`: tile fetching runs on a single-threaded
/// event loop.
pub trait TileSource {
    fn fetch(&self, batch: &TileBatch) -> impl Future<Output = Result<TileResponse, FetchError>>;
}

/// Tile source backed by the HTTP tile endpoint.
#[derive(Debug, Clone)]
pub struct HttpTileSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTileSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TileSource for HttpTileSource {
    async fn fetch(&self, batch: &TileBatch) -> Result<TileResponse, FetchError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("geohashes", batch.cells_param())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        Ok(TileResponse::from_slice(&body, &batch.cells)?)
    }
}
