//! HTTP relay between chat clients and the upstream completion API
//!
//! `POST /api/chat` takes the conversation as a JSON array of
//! `{role, content}` objects, prepends the system instruction and answers
//! with the upstream fragments as a raw, unframed text stream.

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures::StreamExt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ChatRelayError, Result};
use crate::message::{Fragment, Message};
use crate::prompts::with_system_prompt;
use crate::upstream::{CompletionClient, FragmentStream};

/// Fragments buffered between the upstream reader and the response body
const FORWARD_BUFFER: usize = 32;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Instruction prepended to every upstream payload
    pub system_prompt: Arc<str>,
    /// Upstream completion client
    pub upstream: Arc<dyn CompletionClient>,
}

impl AppState {
    pub fn new(system_prompt: impl Into<Arc<str>>, upstream: Arc<dyn CompletionClient>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            upstream,
        }
    }
}

/// The relay server
pub struct RelayServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|e| ChatRelayError::Config(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ChatRelayError::Relay(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!("Starting relay server on {addr}");
        tracing::info!("Upstream client: {}", self.state.upstream.name());

        serve_with_listener(listener, self.state.clone(), shutdown_signal()).await?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Serve the relay on an already bound listener until `shutdown` resolves
pub async fn serve_with_listener<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ChatRelayError::Relay(format!("Server error: {e}")))
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Relay one conversation to the upstream and stream the reply back
///
/// The status is only committed once the first upstream item is known, so
/// a failure before any fragment still produces a non-2xx response.
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(conversation): Json<Vec<Message>>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("relay", %request_id);

    let payload = with_system_prompt(&state.system_prompt, conversation);
    tracing::debug!(parent: &span, messages = payload.len(), "Relaying conversation upstream");

    let mut fragments = match state
        .upstream
        .complete(payload)
        .instrument(span.clone())
        .await
    {
        Ok(fragments) => fragments,
        Err(e) => {
            tracing::warn!(parent: &span, error_type = e.category(), "Upstream call failed: {e}");
            return e.into_response();
        }
    };

    let first = match fragments.next().instrument(span.clone()).await {
        Some(Ok(fragment)) => Some(fragment),
        Some(Err(e)) => {
            tracing::warn!(parent: &span, error_type = e.category(), "Upstream failed before first fragment: {e}");
            return e.into_response();
        }
        None => None,
    };

    let body = match first {
        Some(first) => {
            let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
            tokio::spawn(forward_fragments(first, fragments, tx).instrument(span));
            Body::from_stream(ReceiverStream::new(rx))
        }
        None => {
            tracing::debug!(parent: &span, "Upstream produced an empty completion");
            Body::empty()
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Pump upstream fragments into the response body in arrival order
///
/// A mid-stream upstream failure aborts the body; bytes already sent stand.
/// A dropped receiver means the client went away, which ends the pump and
/// drops the upstream stream with it.
async fn forward_fragments(
    first: Fragment,
    mut fragments: FragmentStream,
    tx: mpsc::Sender<std::result::Result<Bytes, std::io::Error>>,
) {
    let mut pending = Some(first);
    let mut forwarded = 0usize;
    let mut bytes = 0usize;

    loop {
        let fragment = match pending.take() {
            Some(fragment) => fragment,
            None => match fragments.next().await {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => {
                    tracing::warn!(
                        error_type = e.category(),
                        forwarded,
                        "Upstream failed mid-stream, closing response: {e}"
                    );
                    let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                    return;
                }
                None => break,
            },
        };

        let len = fragment.as_str().len();
        if tx.send(Ok(Bytes::from(fragment))).await.is_err() {
            tracing::debug!(forwarded, "Client disconnected, dropping upstream stream");
            return;
        }
        forwarded += 1;
        bytes += len;
    }

    tracing::debug!(fragments = forwarded, bytes, "Relay stream completed");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
