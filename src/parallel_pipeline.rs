// THEORY:
// Images are independent of each other, so a batch is embarrassingly parallel.
// The `BatchEncoder` fans a list of paths out over a bounded number of blocking
// workers and gathers the per-image results back in input order.
//
// Key architectural principles:
// 1.  **Shared, immutable encoder**: every worker borrows the same `HintEncoder`
//     through an `Arc`; encoding keeps no state between images.
// 2.  **Bounded parallelism**: a semaphore caps images in flight (one per CPU by
//     default), since each image allocates several full-resolution planes.
// 3.  **Per-image failure**: one unreadable file does not stop the batch; its error
//     is returned next to its path.

use crate::error::{HintError, Result};
use crate::pipeline::{EncodeReport, HintEncoder};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Encodes many images concurrently with one shared `HintEncoder`.
pub struct BatchEncoder {
    encoder: Arc<HintEncoder>,
    max_in_flight: usize,
}

impl BatchEncoder {
    pub fn new(encoder: HintEncoder) -> Self {
        Self {
            encoder: Arc::new(encoder),
            max_in_flight: num_cpus::get().max(1),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn encoder(&self) -> &HintEncoder {
        &self.encoder
    }

    /// Encodes every path; results come back in input order.
    pub async fn encode_all(&self, paths: Vec<PathBuf>) -> Vec<(PathBuf, Result<EncodeReport>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        debug!(images = paths.len(), max_in_flight = self.max_in_flight, "batch started");

        let tasks = paths.into_iter().map(|path| {
            let semaphore = Arc::clone(&semaphore);
            let encoder = Arc::clone(&self.encoder);
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return (
                            path,
                            Err(HintError::Worker {
                                message: e.to_string(),
                            }),
                        );
                    }
                };
                let worker_path = path.clone();
                let result = tokio::task::spawn_blocking(move || encoder.encode(&worker_path))
                    .await
                    .unwrap_or_else(|e| {
                        Err(HintError::Worker {
                            message: e.to_string(),
                        })
                    });
                (path, result)
            }
        });

        let results = join_all(tasks).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(images = results.len(), failed, "batch finished");
        results
    }

    /// Encodes every decodable image directly inside `dir`, in file name order.
    pub async fn encode_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<(PathBuf, Result<EncodeReport>)>> {
        let mut entries = tokio::fs::read_dir(dir.as_ref()).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if image::ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            } else {
                warn!(path = %path.display(), "not an image, skipped");
            }
        }
        paths.sort();
        Ok(self.encode_all(paths).await)
    }
}
