//! Shutdown integration tests.
//!
//! Closing the server must end every attached console promptly, including
//! idle ones blocked waiting for input.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{start_server, start_server_with, wait_until, Client};
use robo_console::{
    server, ConsoleConfig, ConsoleError, EvalError, Evaluator, NamespaceEvaluator, Outcome,
    ServerState, SessionOptions, SharedContext,
};
use serde_json::json;
use tokio::net::TcpStream;

/// Evaluator whose `work` command blocks for `delay`, marking the context
/// before and after.
fn slow_evaluator(delay: Duration) -> Arc<dyn Evaluator> {
    Arc::new(move |source: &str, ctx: &SharedContext| -> Result<Outcome, EvalError> {
        if source.trim() == "work" {
            ctx.set("started", true);
            std::thread::sleep(delay);
            ctx.set("done", true);
            return Ok(Outcome::Output("finished".to_string()));
        }
        NamespaceEvaluator::new().evaluate(source, ctx)
    })
}

// ============================================================================
// Idle Sessions
// ============================================================================

#[tokio::test]
async fn test_close_ends_idle_sessions() {
    let (server, addr) = start_server(SharedContext::new()).await;

    let mut clients = vec![
        Client::connect(addr).await,
        Client::connect(addr).await,
        Client::connect(addr).await,
    ];
    assert_eq!(server.session_count(), 3);

    assert_eq!(server.close().unwrap(), 3);
    tokio::time::timeout(Duration::from_secs(2), server.wait_closed())
        .await
        .expect("idle sessions should not stall shutdown")
        .unwrap();

    assert_eq!(server.state(), ServerState::Closed);
    assert_eq!(server.session_count(), 0);
    for client in &mut clients {
        client.expect_closed().await;
    }
}

#[tokio::test]
async fn test_no_connections_after_close() {
    let (server, addr) = start_server(SharedContext::new()).await;
    let _client = Client::connect(addr).await;

    server.shutdown().await.unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
    assert!(server.session_ids().unwrap().is_empty());
}

#[tokio::test]
async fn test_close_mid_statement_discards_block() {
    let context = SharedContext::new();
    let (server, addr) = start_server(context.clone()).await;
    let mut client = Client::connect(addr).await;

    client.send_line("pose = {").await;
    client.read_until("... ").await;

    server.shutdown().await.unwrap();

    client.expect_closed().await;
    assert!(!context.contains("pose"));
}

#[tokio::test]
async fn test_many_sessions_close_cleanly() {
    let (server, addr) = start_server(SharedContext::new()).await;

    let mut clients = Vec::new();
    for _ in 0..20 {
        clients.push(Client::connect(addr).await);
    }
    assert_eq!(server.session_count(), 20);

    server.shutdown().await.unwrap();

    for client in &mut clients {
        client.expect_closed().await;
    }
    assert!(server.session_ids().unwrap().is_empty());
}

#[tokio::test]
async fn test_dropping_server_closes_sessions() {
    let (server, addr) = start_server(SharedContext::new()).await;
    let mut client = Client::connect(addr).await;

    drop(server);

    client.expect_closed().await;
}

// ============================================================================
// In-flight Evaluation
// ============================================================================

#[tokio::test]
async fn test_close_waits_for_running_evaluation() {
    let context = SharedContext::new();
    let (server, addr) = start_server_with(
        context.clone(),
        slow_evaluator(Duration::from_millis(300)),
        SessionOptions::default(),
    )
    .await;
    let mut client = Client::connect(addr).await;

    client.send_line("work").await;
    wait_until("evaluation to start", || context.contains("started")).await;

    server.close().unwrap();
    server.wait_closed().await.unwrap();

    assert_eq!(server.state(), ServerState::Closed);
    assert_eq!(context.get("done"), Some(json!(true)));
    client.expect_closed().await;
}

#[tokio::test]
async fn test_wait_closed_timeout_reports_stragglers() {
    let context = SharedContext::new();
    let (server, addr) = start_server_with(
        context.clone(),
        slow_evaluator(Duration::from_secs(1)),
        SessionOptions::default().with_eval_timeout(None),
    )
    .await;
    let mut client = Client::connect(addr).await;

    client.send_line("work").await;
    wait_until("evaluation to start", || context.contains("started")).await;

    server.close().unwrap();
    let err = server
        .wait_closed_timeout(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::ShutdownTimeout { remaining: 1 }));
    assert_eq!(server.state(), ServerState::ShuttingDown);

    // The evaluation still completes and the session exits afterwards.
    server.wait_closed().await.unwrap();
    assert_eq!(server.state(), ServerState::Closed);
    client.expect_closed().await;
}

// ============================================================================
// Bind Errors
// ============================================================================

#[tokio::test]
async fn test_bind_error_when_port_in_use() {
    let (first, addr) = start_server(SharedContext::new()).await;

    let config = ConsoleConfig::localhost(addr.port()).with_reuse_address(false);
    let err = server::start(config, SharedContext::new(), Arc::new(NamespaceEvaluator::new()))
        .await
        .unwrap_err();

    match err {
        ConsoleError::Bind { addr: failed, source } => {
            assert_eq!(failed.port(), addr.port());
            assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
        }
        other => panic!("expected bind error, got {:?}", other),
    }

    first.shutdown().await.unwrap();
}
