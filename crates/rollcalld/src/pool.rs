//! Bounded pool of feature-extraction worker threads.
//!
//! ONNX sessions need `&mut` access and inference is CPU-bound, so each
//! worker is a dedicated OS thread owning its own extractor. Requests are
//! fanned out over a shared multi-consumer channel; each reply comes back on
//! its own oneshot.

use async_channel as chan;
use rollcall_core::{ExtractError, ExtractedFace, FeatureExtractor};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("failed to spawn extractor worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("extractor pool shut down")]
    ChannelClosed,
}

struct ExtractRequest {
    image: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<ExtractedFace>, ExtractError>>,
}

/// Clone-safe handle to the extractor workers. Workers exit once every
/// handle is dropped.
#[derive(Clone)]
pub struct ExtractorPool {
    tx: chan::Sender<ExtractRequest>,
    workers: usize,
}

impl ExtractorPool {
    /// Build `workers` extractors with `factory` and start one thread per
    /// extractor. Fails fast if any extractor cannot be built.
    pub fn spawn<E, F>(workers: usize, mut factory: F) -> Result<Self, PoolError>
    where
        E: FeatureExtractor + 'static,
        F: FnMut(usize) -> Result<E, ExtractError>,
    {
        let workers = workers.max(1);
        let (tx, rx) = chan::bounded::<ExtractRequest>(workers);

        for id in 0..workers {
            let mut extractor = factory(id)?;
            let rx = rx.clone();
            std::thread::Builder::new()
                .name(format!("rollcall-extract-{id}"))
                .spawn(move || {
                    tracing::debug!(worker = id, "extractor worker started");
                    while let Ok(req) = rx.recv_blocking() {
                        let result = extractor.extract(&req.image);
                        // Requester may have gone away (timeout); nothing to do.
                        let _ = req.reply.send(result);
                    }
                    tracing::debug!(worker = id, "extractor worker exiting");
                })?;
        }

        tracing::info!(workers, "extractor pool started");
        Ok(Self { tx, workers })
    }

    /// Extract faces from an encoded image on the next free worker.
    pub async fn extract(&self, image: Vec<u8>) -> Result<Vec<ExtractedFace>, PoolError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ExtractRequest { image, reply })
            .await
            .map_err(|_| PoolError::ChannelClosed)?;
        Ok(rx.await.map_err(|_| PoolError::ChannelClosed)??)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}
