#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use robo_console::{
    server, ConsoleConfig, ConsoleServer, Evaluator, NamespaceEvaluator, SessionOptions,
    SharedContext,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const PROMPT: &str = ">>> ";
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a loopback server on an ephemeral port with no banner.
pub async fn start_server(context: SharedContext) -> (ConsoleServer, SocketAddr) {
    start_server_with(context, Arc::new(NamespaceEvaluator::new()), SessionOptions::default())
        .await
}

pub async fn start_server_with(
    context: SharedContext,
    evaluator: Arc<dyn Evaluator>,
    session: SessionOptions,
) -> (ConsoleServer, SocketAddr) {
    let _ = robo_console::logging::try_init();
    let config = ConsoleConfig::localhost(0).with_session(session.without_banner());
    let server = server::start(config, context, evaluator)
        .await
        .expect("console server should start");
    let addr = server.local_addr().expect("started server has an address");
    (server, addr)
}

/// Poll `cond` until it holds or the I/O timeout elapses.
pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Line-oriented test client, the way an operator's terminal would talk.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Connect and wait for the first prompt, so the session is registered.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = tokio::time::timeout(IO_TIMEOUT, TcpStream::connect(addr))
            .await
            .expect("connect timed out")
            .expect("connect failed");
        let mut client = Self { stream };
        client.read_until(PROMPT).await;
        client
    }

    /// Read until the output ends with `marker`; returns everything read.
    pub async fn read_until(&mut self, marker: &str) -> String {
        let mut seen = Vec::new();
        let mut buf = [0u8; 512];
        while !seen.ends_with(marker.as_bytes()) {
            let n = tokio::time::timeout(IO_TIMEOUT, self.stream.read(&mut buf))
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {:?}", marker))
                .expect("read failed");
            assert!(
                n > 0,
                "connection closed before {:?}; got {:?}",
                marker,
                String::from_utf8_lossy(&seen)
            );
            seen.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(seen).expect("console output is UTF-8")
    }

    pub async fn send_line(&mut self, line: &str) {
        self.stream
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("write failed");
    }

    /// Send one line and return the reply text before the next prompt.
    pub async fn command(&mut self, line: &str) -> String {
        self.send_line(line).await;
        let out = self.read_until(PROMPT).await;
        out[..out.len() - PROMPT.len()].to_string()
    }

    /// Assert the server closes the connection without sending more text.
    pub async fn expect_closed(&mut self) {
        let mut rest = Vec::new();
        let n = tokio::time::timeout(IO_TIMEOUT, self.stream.read_to_end(&mut rest))
            .await
            .expect("server did not close the connection")
            .expect("read failed");
        assert_eq!(n, 0, "unexpected output: {:?}", String::from_utf8_lossy(&rest));
    }
}
