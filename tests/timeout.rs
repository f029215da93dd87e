//! A client-side timeout must win the race against a reply the server is
//! slow to send.
mod support;

use std::time::Duration;

use redicore::{Command, ConnectionHandle, ConnectionOptions, Error};

#[tokio::test]
async fn timeout_fires_before_a_slow_reply_arrives() {
    let (addr, _server) =
        support::start_replying_server(b"+PONG\r\n", Duration::from_millis(500)).await;

    let opts = ConnectionOptions::builder(addr.ip().to_string(), addr.port())
        .sync_connect(true)
        .connect_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let conn = ConnectionHandle::start(opts).await.unwrap();

    let err = conn
        .pipeline(vec![Command::new("PING")], Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));

    // The late reply (arriving ~400ms after the timeout already fired)
    // must not panic or otherwise surface a second message: the row's
    // `oneshot::Sender` was already taken and consumed by the timeout
    // path, so there is nothing left to deliver to.
    tokio::time::sleep(Duration::from_millis(600)).await;
}
