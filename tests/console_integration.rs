//! Console session integration tests over real TCP connections.

mod common;

use std::sync::Arc;

use common::{start_server, start_server_with, wait_until, Client, PROMPT};
use robo_console::{
    EvalError, NamespaceEvaluator, Outcome, SessionId, SessionOptions, SharedContext,
};
use serde_json::json;

// ============================================================================
// Shared Context Tests
// ============================================================================

#[tokio::test]
async fn test_value_persists_across_clients() {
    let context: SharedContext = [("x", json!(1))].into_iter().collect();
    let (server, addr) = start_server(context.clone()).await;

    let mut first = Client::connect(addr).await;
    assert_eq!(first.command("x = 2").await, "");
    drop(first);
    wait_until("first session to close", || server.session_count() == 0).await;

    let mut second = Client::connect(addr).await;
    assert_eq!(second.command("x").await, "2\n");
    assert_eq!(context.get("x"), Some(json!(2)));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_sessions_share_context() {
    let (server, addr) = start_server(SharedContext::new()).await;

    let mut a = Client::connect(addr).await;
    let mut b = Client::connect(addr).await;

    a.command("from_a = \"hello\"").await;
    assert_eq!(b.command("from_a").await, "\"hello\"\n");

    b.command("from_b = [1, 2, 3]").await;
    assert_eq!(a.command("from_b").await, "[1,2,3]\n");

    assert_eq!(a.command("dir()").await, "[\"from_a\",\"from_b\"]\n");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_host_and_console_see_each_other() {
    let context = SharedContext::new();
    let (server, addr) = start_server(context.clone()).await;
    let mut client = Client::connect(addr).await;

    context.set("battery_volts", 12.4);
    assert_eq!(client.command("battery_volts").await, "12.4\n");

    client.command("drive_enabled = false").await;
    assert_eq!(context.get("drive_enabled"), Some(json!(false)));
    assert!(server.context().ptr_eq(&context));

    server.shutdown().await.unwrap();
}

// ============================================================================
// Session Behavior Tests
// ============================================================================

#[tokio::test]
async fn test_eval_error_does_not_end_session() {
    let (server, addr) = start_server(SharedContext::new()).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(
        client.command("missing").await,
        "error: name 'missing' is not defined\n"
    );
    assert!(client.command("x = }").await.starts_with("error: syntax error"));
    assert_eq!(client.command("1").await, "1\n");
    assert_eq!(server.session_count(), 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_multiline_statement() {
    let context = SharedContext::new();
    let (server, addr) = start_server(context.clone()).await;
    let mut client = Client::connect(addr).await;

    client.send_line("pose = {").await;
    client.read_until("... ").await;
    client.send_line("\"heading\": 90").await;
    client.read_until("... ").await;
    client.send_line("}").await;
    client.read_until(PROMPT).await;

    assert_eq!(context.get("pose"), Some(json!({"heading": 90})));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_custom_evaluator() {
    let evaluator = |source: &str, ctx: &SharedContext| -> Result<Outcome, EvalError> {
        match source {
            "count" => Ok(Outcome::Output(ctx.len().to_string())),
            other => Err(EvalError::Other(format!("unknown command: {}", other))),
        }
    };
    let context: SharedContext = [("a", json!(1)), ("b", json!(2))].into_iter().collect();
    let (server, addr) =
        start_server_with(context, Arc::new(evaluator), SessionOptions::default()).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.command("count").await, "2\n");
    assert_eq!(client.command("jump").await, "error: unknown command: jump\n");

    server.shutdown().await.unwrap();
}

// ============================================================================
// Registry Tests
// ============================================================================

#[tokio::test]
async fn test_registry_tracks_open_sessions() {
    let (server, addr) = start_server(SharedContext::new()).await;

    let mut clients = Vec::new();
    for expected in 1..=5 {
        clients.push(Client::connect(addr).await);
        assert_eq!(server.session_count(), expected);
    }

    let ids = server.session_ids().unwrap();
    assert_eq!(ids.len(), 5);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    clients.truncate(3);
    wait_until("two sessions to close", || server.session_count() == 3).await;

    clients.clear();
    wait_until("all sessions to close", || server.session_count() == 0).await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_session_ids_never_reused() {
    let (server, addr) = start_server(SharedContext::new()).await;

    let first = Client::connect(addr).await;
    assert_eq!(server.session_ids().unwrap(), vec![SessionId::from_raw(1)]);
    drop(first);
    wait_until("first session to close", || server.session_count() == 0).await;

    let _second = Client::connect(addr).await;
    assert_eq!(server.session_ids().unwrap(), vec![SessionId::from_raw(2)]);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_custom_prompt() {
    let options = SessionOptions::default().with_prompts("robot> ", "robot. ");
    let (server, addr) = start_server_with(
        SharedContext::new(),
        Arc::new(NamespaceEvaluator::new()),
        options,
    )
    .await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 7];
    tokio::io::AsyncReadExt::read_exact(&mut stream, &mut buf)
        .await
        .unwrap();
    assert_eq!(&buf, b"robot> ");

    server.shutdown().await.unwrap();
}
