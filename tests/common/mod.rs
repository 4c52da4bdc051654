//! Shared helpers for integration tests.
//!
//! [`StubServer`] is a minimal DevTools-style WebSocket endpoint:
//!
//! | Method | Behavior |
//! |--------|----------|
//! | `Test.echo` | Responds with the request params |
//! | `Test.progress` | Emits `Test.progressed` with the params, then responds |
//! | `Test.fail` | Responds with a `-32000` error object |
//! | `Test.hangup` | Closes the connection without responding |
//! | anything else | Responds with a `-32601` method-not-found error |

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::time::Duration;

use devtools_socket::protocol::{Event, RemoteError, Request, Response, codec};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single wait in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test-friendly subscriber once. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// StubServer
// ============================================================================

/// WebSocket server answering requests per the table above.
pub struct StubServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Binds to a random localhost port and starts accepting connections.
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        debug!(%addr, "Stub server bound");

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream));
            }
        });

        Ok(Self { addr, task })
    }

    /// Returns the WebSocket URL of this server.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}/devtools/page/stub", self.addr)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "Stub handshake failed");
            return;
        }
    };

    let (mut sink, mut frames) = ws.split();

    while let Some(Ok(message)) = frames.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        let request = match codec::decode_request(text.as_str()) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Stub received malformed request");
                continue;
            }
        };

        let replies = match reply_to(request) {
            Some(replies) => replies,
            None => {
                let _ = sink.close().await;
                return;
            }
        };

        for reply in replies {
            if sink.send(Message::text(reply)).await.is_err() {
                return;
            }
        }
    }
}

/// Frames to send for `request`, or `None` to hang up.
fn reply_to(request: Request) -> Option<Vec<String>> {
    let params = request.params.unwrap_or(Value::Null);

    let frames = match request.method.as_str() {
        "Test.echo" => vec![codec::encode_response(&Response::success(request.id, params))],
        "Test.progress" => vec![
            codec::encode_event(&Event::new("Test.progressed", params.clone())),
            codec::encode_response(&Response::success(request.id, json!({ "done": true }))),
        ],
        "Test.fail" => vec![codec::encode_response(&Response::failure(
            request.id,
            RemoteError::new(-32000, "requested failure"),
        ))],
        "Test.hangup" => return None,
        other => vec![codec::encode_response(&Response::failure(
            request.id,
            RemoteError::new(-32601, format!("'{other}' wasn't found")),
        ))],
    };

    frames.into_iter().map(Result::ok).collect()
}
