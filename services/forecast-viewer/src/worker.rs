//! Background decoding of wind rasters.
//!
//! Each job fetches through the [`RasterStore`], decodes on the blocking
//! pool and answers with exactly one [`WorkerResponse`]. Terminated jobs
//! answer nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use field::{raster, FieldError, VectorGridPayload};
use forecast_common::{ForecastError, ForecastResult};
use storage::RasterStore;

/// Job sent to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeRequest {
    pub id: Uuid,
    pub url: String,
}

/// Which stage of a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// The raster could not be fetched
    Transport,
    /// The raster is not a usable wind raster
    Decode,
    Internal,
}

/// Terminal message of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    #[serde(rename = "vf-data")]
    VectorData { id: Uuid, payload: VectorGridPayload },
    #[serde(rename = "error")]
    Error {
        id: Uuid,
        kind: JobErrorKind,
        error: String,
    },
}

impl WorkerResponse {
    pub fn id(&self) -> Uuid {
        match self {
            WorkerResponse::VectorData { id, .. } | WorkerResponse::Error { id, .. } => *id,
        }
    }
}

/// Bounded pool of fetch+decode jobs.
#[derive(Clone)]
pub struct DecodeWorkerPool {
    store: Arc<RasterStore>,
    permits: Arc<Semaphore>,
}

impl DecodeWorkerPool {
    pub fn new(store: Arc<RasterStore>, max_concurrent: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Start a job for `url`.
    pub fn submit(&self, url: impl Into<String>) -> WorkerTicket {
        let request = DecodeRequest {
            id: Uuid::new_v4(),
            url: url.into(),
        };
        let id = request.id;
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let store = self.store.clone();
        let permits = self.permits.clone();
        let flag = cancel.clone();
        let handle = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                let _ = tx.send(WorkerResponse::Error {
                    id: request.id,
                    kind: JobErrorKind::Internal,
                    error: "worker pool closed".to_string(),
                });
                return;
            };

            if let Some(response) = run_job(&store, request, flag).await {
                let _ = tx.send(response);
            }
        });

        debug!(job = %id, "decode job submitted");
        WorkerTicket {
            id,
            cancel,
            handle,
            response: rx,
        }
    }

    /// Jobs that could start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

async fn run_job(store: &RasterStore, request: DecodeRequest, cancel: Arc<AtomicBool>) -> Option<WorkerResponse> {
    let DecodeRequest { id, url } = request;

    let bytes = match store.fetch(&url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(job = %id, url = %url, error = %e, "wind raster fetch failed");
            let error = match e {
                ForecastError::Transport(msg) => msg,
                other => other.to_string(),
            };
            return Some(WorkerResponse::Error {
                id,
                kind: JobErrorKind::Transport,
                error,
            });
        }
    };

    let decoded = tokio::task::spawn_blocking(move || raster::decode_vector(&bytes, &cancel)).await;
    match decoded {
        Ok(Ok(payload)) => Some(WorkerResponse::VectorData { id, payload }),
        Ok(Err(FieldError::Cancelled)) => {
            debug!(job = %id, "decode job terminated");
            None
        }
        Ok(Err(e)) => {
            counter!("forecast_decode_failures_total").increment(1);
            warn!(job = %id, url = %url, error = %e, "wind raster decode failed");
            Some(WorkerResponse::Error {
                id,
                kind: JobErrorKind::Decode,
                error: e.to_string(),
            })
        }
        Err(e) => Some(WorkerResponse::Error {
            id,
            kind: JobErrorKind::Internal,
            error: format!("decode task failed: {}", e),
        }),
    }
}

/// Handle on one submitted job.
///
/// Dropping the ticket terminates the job.
pub struct WorkerTicket {
    id: Uuid,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    response: oneshot::Receiver<WorkerResponse>,
}

impl WorkerTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the job's terminal message.
    ///
    /// A job that ends without answering (terminated) yields
    /// [`ForecastError::Cancelled`].
    pub async fn response(&mut self) -> ForecastResult<WorkerResponse> {
        (&mut self.response).await.map_err(|_| ForecastError::Cancelled)
    }

    /// Wait for the decoded payload, turning error messages into errors.
    pub async fn payload(&mut self) -> ForecastResult<VectorGridPayload> {
        match self.response().await? {
            WorkerResponse::VectorData { id, payload } if id == self.id => Ok(payload),
            WorkerResponse::Error { id, kind, error } if id == self.id => Err(match kind {
                JobErrorKind::Transport => ForecastError::Transport(error),
                JobErrorKind::Decode => ForecastError::Decode(error),
                JobErrorKind::Internal => ForecastError::Internal(error),
            }),
            other => Err(ForecastError::Internal(format!(
                "job {} answered with id {}",
                self.id,
                other.id()
            ))),
        }
    }

    /// Stop the job. The caller must not wait for it afterwards.
    pub fn terminate(&self) {
        self.cancel.store(true, Ordering::Release);
        self.handle.abort();
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

impl Drop for WorkerTicket {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.terminate();
        }
    }
}
