//! A deliberately dumb mock Redis server for the integration tests in
//! `tests/`. It never parses the RESP requests it receives; it just
//! waits for input and then writes back a scripted reply.
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Binds an ephemeral port, accepts exactly one connection, reads
/// whatever the client sends, waits `reply_delay`, then writes `reply`
/// and leaves the connection open.
pub async fn start_replying_server(reply: &'static [u8], reply_delay: Duration) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await.unwrap();
        if !reply_delay.is_zero() {
            tokio::time::sleep(reply_delay).await;
        }
        let _ = socket.write_all(reply).await;
        // Keep the task (and the socket) alive so a late write can still
        // be observed by the test; the test process exiting closes it.
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    (addr, handle)
}

/// Binds an ephemeral port, accepts exactly one connection, reads
/// whatever the client sends, then immediately closes the socket without
/// replying, simulating a mid-flight disconnect.
pub async fn start_closing_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        drop(socket);
    });
    (addr, handle)
}

/// Binds an ephemeral port; the first `failures` connections are accepted
/// and closed immediately, and every connection after that gets read once
/// and answered with `reply`, used to drive a controller through one or
/// more backoff-and-reconnect cycles before it settles.
pub async fn start_flaky_server(failures: usize, reply: &'static [u8]) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        for _ in 0..failures {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        }
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let mut buf = [0u8; 4096];
            if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                continue;
            }
            let _ = socket.write_all(reply).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    });
    (addr, handle)
}
