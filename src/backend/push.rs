//! Push channel for unsolicited job completion messages.
//!
//! The backend delivers completions by POSTing to a small local listener,
//! keyed by job id. The capture client subscribes before submitting; if the
//! backend has never pinged the listener the client skips straight to the
//! polling fallback.

use crate::backend::JobStatusResponse;
use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

/// Completion message delivered by the backend.
#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    pub job_id: uuid::Uuid,
    #[serde(flatten)]
    pub result: JobStatusResponse,
}

/// How many completions without a subscriber are retained. The backend can
/// POST a result in the window between job submission and the client's
/// subscribe call; the stash lets that subscriber still resolve.
const UNCLAIMED_CAP: usize = 16;

struct PushState {
    pending: Mutex<HashMap<uuid::Uuid, oneshot::Sender<JobStatusResponse>>>,
    unclaimed: Mutex<VecDeque<(uuid::Uuid, JobStatusResponse)>>,
    connected: AtomicBool,
}

impl PushState {
    fn complete(&self, message: CompletionMessage) -> bool {
        self.connected.store(true, Ordering::SeqCst);

        let sender = self
            .pending
            .lock()
            .expect("push pending lock poisoned")
            .remove(&message.job_id);

        match sender {
            Some(sender) => sender.send(message.result).is_ok(),
            None => {
                tracing::debug!(job_id = %message.job_id, "completion arrived before subscriber");
                let mut unclaimed = self
                    .unclaimed
                    .lock()
                    .expect("push unclaimed lock poisoned");
                if unclaimed.len() >= UNCLAIMED_CAP {
                    unclaimed.pop_front();
                }
                unclaimed.push_back((message.job_id, message.result));
                false
            }
        }
    }

    fn take_unclaimed(&self, job_id: &uuid::Uuid) -> Option<JobStatusResponse> {
        let mut unclaimed = self
            .unclaimed
            .lock()
            .expect("push unclaimed lock poisoned");
        let index = unclaimed.iter().position(|(id, _)| id == job_id)?;
        unclaimed.remove(index).map(|(_, result)| result)
    }
}

/// Local HTTP listener the backend pushes completions to.
pub struct PushListener {
    addr: SocketAddr,
    state: Arc<PushState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl PushListener {
    /// Bind and start serving. Port 0 picks a free port.
    pub async fn start(port: u16) -> anyhow::Result<Self> {
        let state = Arc::new(PushState {
            pending: Mutex::new(HashMap::new()),
            unclaimed: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/v1/completions", post(completion))
            .route("/v1/ping", post(ping))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state.clone());

        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;

        tracing::info!("push listener on http://{}", actual_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!("push listener error: {}", e);
            }
        });

        Ok(Self {
            addr: actual_addr,
            state,
            shutdown: Some(shutdown_tx),
        })
    }

    /// Register interest in a job id. A completion that already arrived for
    /// the id resolves the returned receiver immediately.
    pub fn subscribe(&self, job_id: uuid::Uuid) -> oneshot::Receiver<JobStatusResponse> {
        let (tx, rx) = oneshot::channel();
        if let Some(result) = self.state.take_unclaimed(&job_id) {
            let _ = tx.send(result);
            return rx;
        }
        self.state
            .pending
            .lock()
            .expect("push pending lock poisoned")
            .insert(job_id, tx);
        rx
    }

    /// Drop a registration that resolved through the polling fallback.
    pub fn unsubscribe(&self, job_id: &uuid::Uuid) {
        self.state
            .pending
            .lock()
            .expect("push pending lock poisoned")
            .remove(job_id);
        self.state.take_unclaimed(job_id);
    }

    /// Whether the backend has ever reached this listener.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop serving. Pending subscriptions resolve as closed channels.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, message: CompletionMessage) -> bool {
        self.state.complete(message)
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// POST /v1/completions
async fn completion(
    State(state): State<Arc<PushState>>,
    Json(message): Json<CompletionMessage>,
) -> StatusCode {
    state.complete(message);
    StatusCode::OK
}

/// POST /v1/ping
///
/// The backend announces itself here after a submission tells it where the
/// listener lives; from then on the capture client prefers the push path.
async fn ping(State(state): State<Arc<PushState>>) -> StatusCode {
    state.connected.store(true, Ordering::SeqCst);
    StatusCode::OK
}
