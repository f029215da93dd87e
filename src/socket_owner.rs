//! The Socket Owner: a subordinate task spawned fresh for each connection
//! attempt. It owns the `TcpStream`, performs the AUTH/SELECT handshake,
//! and then loops reading bytes, decoding RESP values, and handing each
//! one to the [`PendingTable`] in strict FIFO order.
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::command::Command;
use crate::controller::ControllerEvent;
use crate::error::{Error, RedisError, Result};
use crate::options::{ConnectionOptions, Transport};
use crate::resp::{self, Decoder, Value};
use crate::table::PendingTable;

const READ_CHUNK: usize = 8 * 1024;

/// Commands the controller sends to the socket owner. `send` is routed
/// through the owner rather than having the controller hold half of the
/// socket itself, since the socket can't be safely shared between actors.
pub(crate) enum SocketCommand {
    Send(bytes::Bytes),
    NormalStop(oneshot::Sender<()>),
}

/// Spawns the socket owner task for one connection attempt, identified by
/// `owner_id` so the controller can recognize and ignore messages from a
/// stale, already-superseded attempt. Returns the task's `JoinHandle` so
/// the controller can forcibly abort it if the task doesn't exit on its
/// own within a shutdown grace period.
pub(crate) fn spawn(
    owner_id: u64,
    opts: Arc<ConnectionOptions>,
    table: PendingTable,
    controller_tx: mpsc::UnboundedSender<ControllerEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<SocketCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let address = opts.address();

        if opts.transport == Transport::Tls {
            let _ = controller_tx.send(ControllerEvent::SocketStopped {
                owner_id,
                reason: Error::Protocol("TLS transport is not implemented".into()),
            });
            return;
        }

        let connect = tokio::time::timeout(opts.connect_timeout, TcpStream::connect(&address));
        let stream = match connect.await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let _ = controller_tx.send(ControllerEvent::SocketStopped {
                    owner_id,
                    reason: Error::from(e),
                });
                return;
            }
            Err(_) => {
                let _ = controller_tx.send(ControllerEvent::SocketStopped {
                    owner_id,
                    reason: Error::Io("connection attempt timed out".into()),
                });
                return;
            }
        };

        let (mut read_half, mut write_half) = stream.into_split();
        let mut decoder = Decoder::new();

        let handshake_result = tokio::time::timeout(
            opts.connect_timeout,
            handshake(&opts, &mut read_half, &mut write_half, &mut decoder),
        )
        .await;
        let reason = match handshake_result {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(_) => Some(Error::Io("handshake timed out".into())),
        };
        if let Some(reason) = reason {
            let _ = controller_tx.send(ControllerEvent::SocketStopped { owner_id, reason });
            return;
        }

        info!(%address, "connected to redis");
        let _ = controller_tx.send(ControllerEvent::SocketConnected {
            owner_id,
            address: address.clone(),
        });

        let mut buf = [0u8; READ_CHUNK];
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SocketCommand::Send(bytes)) => {
                            if let Err(e) = write_half.write_all(&bytes).await {
                                let _ = controller_tx.send(ControllerEvent::SocketStopped {
                                    owner_id,
                                    reason: Error::from(e),
                                });
                                return;
                            }
                        }
                        Some(SocketCommand::NormalStop(ack)) => {
                            let _ = write_half.shutdown().await;
                            let _ = ack.send(());
                            return;
                        }
                        None => {
                            // Controller (and its handle) is gone; nothing left to serve.
                            return;
                        }
                    }
                }

                read = read_half.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            let _ = controller_tx.send(ControllerEvent::SocketStopped {
                                owner_id,
                                reason: Error::Io("connection closed by peer".into()),
                            });
                            return;
                        }
                        Ok(n) => {
                            decoder.ingest(&buf[..n]);
                            if let Err(reason) = drain_decoded(&mut decoder, &table).await {
                                let _ = controller_tx.send(ControllerEvent::SocketStopped { owner_id, reason });
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = controller_tx.send(ControllerEvent::SocketStopped {
                                owner_id,
                                reason: Error::from(e),
                            });
                            return;
                        }
                    }
                }
            }
        }
    });
}

/// Feeds every fully-buffered value to the oldest pending row, delivering
/// the row's terminal reply once it has collected `ncommands` values.
///
/// A single server error anywhere in the row's replies fails the whole row.
async fn drain_decoded(decoder: &mut Decoder, table: &PendingTable) -> Result<()> {
    while let Some(value) = decoder.try_decode()? {
        if let Some(mut row) = table.accumulate_into_oldest(value).await {
            if row.timed_out {
                continue;
            }
            let Some(from) = row.from.take() else { continue };
            let reply = match row.received.iter().find_map(|v| v.as_error()) {
                Some(msg) => Err(Error::Redis(RedisError::parse(msg))),
                None => Ok(row.received),
            };
            let _ = from.send(reply);
        }
    }
    Ok(())
}

/// Runs AUTH/SELECT/HELLO as demanded by `opts`, each a synchronous
/// request/reply round trip ahead of the main pipelined read loop.
async fn handshake(
    opts: &ConnectionOptions,
    read_half: &mut (impl AsyncReadExt + Unpin),
    write_half: &mut (impl AsyncWriteExt + Unpin),
    decoder: &mut Decoder,
) -> Result<()> {
    if let Some(password) = &opts.password {
        let mut cmd = Command::new("AUTH");
        if let Some(username) = &opts.username {
            cmd = cmd.arg(username.clone());
        }
        cmd = cmd.arg(password.clone());
        roundtrip(&cmd, read_half, write_half, decoder).await?;
    }

    if let Some(db) = opts.database {
        let cmd = Command::new("SELECT").arg(db.to_string());
        roundtrip(&cmd, read_half, write_half, decoder).await?;
    }

    Ok(())
}

async fn roundtrip(
    cmd: &Command,
    read_half: &mut (impl AsyncReadExt + Unpin),
    write_half: &mut (impl AsyncWriteExt + Unpin),
    decoder: &mut Decoder,
) -> Result<Value> {
    let mut out = BytesMut::new();
    resp::encode_command(cmd.args(), &mut out);
    write_half.write_all(&out).await?;

    loop {
        if let Some(value) = decoder.try_decode()? {
            if let Some(msg) = value.as_error() {
                warn!(%msg, "handshake command rejected");
                return Err(Error::Redis(RedisError::parse(msg)));
            }
            return Ok(value);
        }
        let mut buf = [0u8; READ_CHUNK];
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Io("connection closed during handshake".into()));
        }
        decoder.ingest(&buf[..n]);
    }
}
