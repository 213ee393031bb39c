//! Ephemeral distribution server for one node bundle.
//!
//! Serves exactly one archive over HTTP, gated by a single random token
//! generated at process start. `GET /?x=<token>` streams the archive as an
//! attachment; any other token gets 401 with an empty body. The first
//! authorized download marks the archive consumed and later attempts get
//! 410 Gone, unless repeat downloads are explicitly allowed. The server
//! blocks its caller until the operator interrupts the process.

use crate::error::{NurseryError, Result};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Number of random bytes behind the download token.
const TOKEN_BYTES: usize = 32;

/// Single-use authorization value for the archive download. Generated once
/// per run, shown to the operator for out-of-band relay, never logged.
#[derive(Clone)]
pub struct DownloadToken(String);

impl DownloadToken {
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; TOKEN_BYTES];
        openssl::rand::rand_bytes(&mut bytes)
            .map_err(|e| NurseryError::Crypto(format!("failed to generate download token: {e}")))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// The value the operator relays to the remote node operator.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        expected.len() == candidate.len() && openssl::memcmp::eq(expected, candidate)
    }
}

impl fmt::Debug for DownloadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DownloadToken").field(&"<redacted>").finish()
    }
}

struct ServeState {
    archive: Vec<u8>,
    filename: String,
    token: DownloadToken,
    consumed: AtomicBool,
    allow_repeat: bool,
}

#[derive(Deserialize)]
struct DownloadQuery {
    x: Option<String>,
}

async fn download(
    State(state): State<Arc<ServeState>>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let authorized = query
        .x
        .as_deref()
        .is_some_and(|candidate| state.token.matches(candidate));
    if !authorized {
        tracing::warn!("rejected download request with missing or mismatched token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if state.consumed.swap(true, Ordering::SeqCst) && !state.allow_repeat {
        tracing::warn!("rejected download request: bundle already retrieved");
        return StatusCode::GONE.into_response();
    }

    tracing::info!(filename = %state.filename, "serving node bundle");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", state.filename),
            ),
        ],
        state.archive.clone(),
    )
        .into_response()
}

fn router(state: Arc<ServeState>) -> Router {
    Router::new().route("/", get(download)).with_state(state)
}

/// Serve `archive` on `port` until the process receives an interrupt.
///
/// Follows the blocking pattern used throughout the session: the caller
/// stays synchronous and this function owns a runtime for the duration of
/// the serve phase.
pub fn serve(
    archive: Vec<u8>,
    filename: &str,
    token: DownloadToken,
    port: u16,
    allow_repeat: bool,
) -> Result<()> {
    let state = Arc::new(ServeState {
        archive,
        filename: filename.to_string(),
        token,
        consumed: AtomicBool::new(false),
        allow_repeat,
    });

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "distribution server listening");

        axum::serve(listener, router(state))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("interrupt received, shutting down distribution server");
            })
            .await?;
        Ok::<(), std::io::Error>(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state(allow_repeat: bool) -> (Arc<ServeState>, DownloadToken) {
        let token = DownloadToken::generate().unwrap();
        let state = Arc::new(ServeState {
            archive: b"bundle bytes".to_vec(),
            filename: "laptop-bundle.tar.gz".to_string(),
            token: token.clone(),
            consumed: AtomicBool::new(false),
            allow_repeat,
        });
        (state, token)
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_token_generation_is_unique_and_hex() {
        let a = DownloadToken::generate().unwrap();
        let b = DownloadToken::generate().unwrap();
        assert_eq!(a.as_str().len(), TOKEN_BYTES * 2);
        assert_ne!(a.as_str(), b.as_str());
        assert!(a.as_str().bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_debug_no_leak() {
        let token = DownloadToken::generate().unwrap();
        let debug_str = format!("{token:?}");
        assert!(!debug_str.contains(token.as_str()));
    }

    #[tokio::test]
    async fn test_correct_token_serves_archive() {
        let (state, token) = test_state(false);
        let response = download(
            State(state),
            Query(DownloadQuery {
                x: Some(token.as_str().to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("laptop-bundle.tar.gz"));
        assert_eq!(body_bytes(response).await, b"bundle bytes");
    }

    #[tokio::test]
    async fn test_wrong_token_rejected_with_empty_body() {
        let (state, _token) = test_state(false);
        let response = download(
            State(state),
            Query(DownloadQuery {
                x: Some("deadbeef".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let (state, _token) = test_state(false);
        let response = download(State(state), Query(DownloadQuery { x: None })).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_second_download_rejected_once_consumed() {
        let (state, token) = test_state(false);
        let query = || {
            Query(DownloadQuery {
                x: Some(token.as_str().to_string()),
            })
        };
        let first = download(State(state.clone()), query()).await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = download(State(state), query()).await;
        assert_eq!(second.status(), StatusCode::GONE);
        assert!(body_bytes(second).await.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_download_when_allowed() {
        let (state, token) = test_state(true);
        let query = || {
            Query(DownloadQuery {
                x: Some(token.as_str().to_string()),
            })
        };
        let first = download(State(state.clone()), query()).await;
        let second = download(State(state), query()).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
    }
}
