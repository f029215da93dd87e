//! After the initial connection attempt fails, the controller backs off
//! and retries, eventually reaching `connected` and reporting a
//! `reconnected` event, without the caller having to do anything but
//! wait.
mod support;

use std::time::Duration;

use redicore::{ConnectionHandle, ConnectionOptions, Event};

#[tokio::test]
#[tracing_test::traced_test]
async fn a_connection_that_fails_once_then_succeeds_reports_reconnected() {
    let (addr, _server) = support::start_flaky_server(1, b"+PONG\r\n").await;

    let opts = ConnectionOptions::builder(addr.ip().to_string(), addr.port())
        .sync_connect(false)
        .connect_timeout(Duration::from_secs(1))
        .backoff(Duration::from_millis(20), Some(Duration::from_millis(50)))
        .build()
        .unwrap();
    let conn = ConnectionHandle::start(opts).await.unwrap();
    let mut events = conn.events();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("a reconnected event within 2s")
        .unwrap();
    assert!(matches!(event, Event::Reconnected { .. }));
}
