//! The caller-facing API.
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::command::Command;
use crate::controller::{Controller, ControllerEvent};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::options::ConnectionOptions;
use crate::resp::Value;

/// A handle to a running connection controller.
///
/// Cloning a handle is cheap (it's backed by channel senders) and safe to
/// share across tasks; concurrent `pipeline` calls from different clones
/// are all serialized through the same controller mailbox.
#[derive(Clone)]
pub struct ConnectionHandle {
    mailbox: mpsc::UnboundedSender<ControllerEvent>,
    events: broadcast::Sender<Event>,
}

impl ConnectionHandle {
    /// Starts a new connection controller for `opts`.
    ///
    /// If `opts.sync_connect` is set, this does not resolve until the
    /// first connection attempt either succeeds or fails permanently.
    pub async fn start(opts: ConnectionOptions) -> Result<Self> {
        let (mailbox, events) = Controller::start(opts).await?;
        Ok(ConnectionHandle { mailbox, events })
    }

    /// Submits a batch of 1+ commands, waiting for their replies (or a
    /// timeout, or a disconnection) in command order.
    ///
    /// `timeout` overrides `ConnectionOptions::response_timeout` for this
    /// call only; `None` for both means no client-side timeout is armed.
    pub async fn pipeline(&self, commands: Vec<Command>, timeout: Option<Duration>) -> Result<Vec<Value>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let (respond_to, reply) = oneshot::channel();
        self.mailbox
            .send(ControllerEvent::Pipeline { commands, timeout, respond_to })
            .map_err(|_| Error::ControllerGone("controller mailbox closed".into()))?;
        reply
            .await
            .map_err(|_| Error::ControllerGone("controller dropped the reply channel".into()))?
    }

    /// Orderly shutdown: asks the socket owner (if any) to stop normally
    /// and waits up to `timeout` for acknowledgement, aborting the owner
    /// task if it doesn't respond in time.
    pub async fn stop(&self, timeout: Duration) {
        let (ack, ack_rx) = oneshot::channel();
        if self.mailbox.send(ControllerEvent::Stop { ack }).is_err() {
            return;
        }
        let _ = tokio::time::timeout(timeout, ack_rx).await;
    }

    /// Subscribes to the controller's telemetry events. Events published
    /// before the first call to this method are lost, same as any other
    /// `broadcast` subscriber joining late.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
