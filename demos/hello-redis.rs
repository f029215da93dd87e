//! Connects to a local Redis, pipelines a couple of commands, and prints
//! the replies. Run a real `redis-server` on 127.0.0.1:6379 first.
use redicore::{Command, ConnectionHandle, ConnectionOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = ConnectionOptions::builder(redicore::DEFAULT_HOST, redicore::DEFAULT_PORT)
        .sync_connect(true)
        .build()?;
    let conn = ConnectionHandle::start(opts).await?;

    let replies = conn
        .pipeline(
            vec![
                Command::new("SET").arg("hello").arg("world"),
                Command::new("GET").arg("hello"),
            ],
            None,
        )
        .await?;
    println!("replies: {replies:?}");

    conn.stop(std::time::Duration::from_secs(1)).await;
    Ok(())
}
