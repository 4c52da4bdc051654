//! End-to-end tests against a real WebSocket endpoint.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use devtools_socket::{Command, ConnectionState, Error, Socket};
use serde_json::json;

use common::{StubServer, TEST_TIMEOUT, init_tracing};

#[tokio::test]
async fn test_echo_round_trip() -> Result<()> {
    init_tracing();
    let server = StubServer::start().await?;
    let socket = Socket::connect(&server.ws_url()).await?;

    assert!(socket.is_open());
    assert_eq!(socket.url(), server.ws_url());

    let result = socket
        .submit(Command::with_params("Test.echo", json!({ "a": 1 })))
        .await?;
    assert_eq!(result, json!({ "a": 1 }));
    assert_eq!(socket.pending_count(), 0);

    socket.close().await?;
    assert_eq!(socket.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_remote_error_keeps_connection_open() -> Result<()> {
    init_tracing();
    let server = StubServer::start().await?;
    let socket = Socket::connect(&server.ws_url()).await?;

    let err = socket
        .submit(Command::new("Test.fail"))
        .await
        .expect_err("remote error");

    match &err {
        Error::Remote {
            method,
            code,
            message,
            ..
        } => {
            assert_eq!(method, "Test.fail");
            assert_eq!(*code, -32000);
            assert_eq!(message, "requested failure");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    assert!(!err.is_connection_error());

    // unknown methods are rejected remotely too
    let err = socket
        .submit(Command::new("Nope.nothing"))
        .await
        .expect_err("unknown method");
    assert!(err.is_remote());

    assert!(socket.is_open());
    socket.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_event_before_response_both_observed_once() -> Result<()> {
    init_tracing();
    let server = StubServer::start().await?;
    let socket = Socket::connect(&server.ws_url()).await?;

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    socket.add_event_handler("Test.progressed", move |event| {
        assert_eq!(event.params, json!({ "step": 3 }));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let result = socket
        .submit(Command::with_params("Test.progress", json!({ "step": 3 })))
        .await?;

    assert_eq!(result, json!({ "done": true }));
    // the event frame was read before the response frame
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    socket.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_remote_hangup_fails_pending_and_closes() -> Result<()> {
    init_tracing();
    let server = StubServer::start().await?;
    let socket = Socket::connect(&server.ws_url()).await?;
    let mut states = socket.state_changes();

    let err = socket
        .submit_with_timeout(Command::new("Test.hangup"), TEST_TIMEOUT)
        .await
        .expect_err("hangup");
    assert!(matches!(err, Error::ConnectionClosed));
    assert!(err.is_connection_error());

    tokio::time::timeout(
        TEST_TIMEOUT,
        states.wait_for(|state| *state == ConnectionState::Closed),
    )
    .await??;

    let err = socket
        .submit(Command::new("Test.echo"))
        .await
        .expect_err("closed");
    assert!(matches!(err, Error::NotOpen { .. }));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_submissions_over_websocket() -> Result<()> {
    init_tracing();
    let server = StubServer::start().await?;
    let socket = Socket::connect(&server.ws_url()).await?;

    let tasks: Vec<_> = (0..32)
        .map(|n| {
            let socket = socket.clone();
            tokio::spawn(async move {
                socket
                    .submit(Command::with_params("Test.echo", json!({ "n": n })))
                    .await
                    .map(|value| (n, value))
            })
        })
        .collect();

    for task in tasks {
        let (n, value) = task.await??;
        assert_eq!(value, json!({ "n": n }));
    }

    socket.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() -> Result<()> {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let err = Socket::connect(&format!("ws://127.0.0.1:{port}"))
        .await
        .expect_err("nothing listening");
    assert!(err.is_connection_error());
    Ok(())
}
