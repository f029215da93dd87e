//! The Connection Controller: the state machine that owns the
//! pending-request table, applies backoff, and directs the socket owner.
//! Everything here runs on a single task whose mailbox serializes all
//! state transitions.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client_reply::{self, ClientReplyMode};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::options::ConnectionOptions;
use crate::resp::{self, Value};
use crate::socket_owner::{self, SocketCommand};
use crate::table::{PendingTable, ReplySender};

/// Events the controller's mailbox dispatches on.
pub(crate) enum ControllerEvent {
    Pipeline {
        commands: Vec<Command>,
        timeout: Option<Duration>,
        respond_to: ReplySender,
    },
    SocketConnected {
        owner_id: u64,
        address: String,
    },
    SocketStopped {
        owner_id: u64,
        reason: Error,
    },
    ReconnectTick {
        owner_id: u64,
    },
    ClientTimeoutTick(u64),
    Stop {
        ack: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Connected,
    Disconnected,
}

struct DeferredPipeline {
    commands: Vec<Command>,
    timeout: Option<Duration>,
    respond_to: ReplySender,
}

pub(crate) struct Controller {
    opts: Arc<ConnectionOptions>,
    table: PendingTable,
    mailbox: mpsc::UnboundedReceiver<ControllerEvent>,
    self_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_tx: broadcast::Sender<Event>,
    state: State,
    counter: u64,
    current_owner_id: u64,
    socket_tx: Option<mpsc::UnboundedSender<SocketCommand>>,
    socket_owner_handle: Option<JoinHandle<()>>,
    backoff_current: Option<Duration>,
    connected_address: Option<String>,
    client_reply: ClientReplyMode,
    deferred: VecDeque<DeferredPipeline>,
    init_ack: Option<oneshot::Sender<Result<()>>>,
    /// Set by [`Controller::terminal_stop`]; checked by `run` to end the
    /// task after a connection-fatal error.
    stopped: bool,
}

impl Controller {
    /// Spawns the controller task and its first socket owner, returning
    /// the mailbox sender and event broadcaster the public
    /// [`crate::handle::ConnectionHandle`] wraps.
    ///
    /// If `opts.sync_connect`, the returned future does not resolve until
    /// the first connection attempt either succeeds or reports `stopped`.
    pub(crate) async fn start(
        opts: ConnectionOptions,
    ) -> Result<(mpsc::UnboundedSender<ControllerEvent>, broadcast::Sender<Event>)> {
        let opts = Arc::new(opts);
        let table = PendingTable::new();
        let (self_tx, mailbox) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(64);

        let (init_ack, init_rx) = if opts.sync_connect {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut controller = Controller {
            opts: Arc::clone(&opts),
            table,
            mailbox,
            self_tx: self_tx.clone(),
            events_tx: events_tx.clone(),
            state: State::Connecting,
            counter: 0,
            current_owner_id: 0,
            socket_tx: None,
            socket_owner_handle: None,
            backoff_current: None,
            connected_address: None,
            client_reply: ClientReplyMode::default(),
            deferred: VecDeque::new(),
            init_ack,
            stopped: false,
        };

        controller.spawn_socket_owner(0);
        tokio::spawn(controller.run());

        if let Some(rx) = init_rx {
            match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => return Err(reason),
                Err(_) => return Err(Error::ControllerGone("controller exited during init".into())),
            }
        }

        Ok((self_tx, events_tx))
    }

    fn spawn_socket_owner(&mut self, owner_id: u64) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.socket_tx = Some(cmd_tx);
        self.current_owner_id = owner_id;
        self.socket_owner_handle = Some(socket_owner::spawn(
            owner_id,
            Arc::clone(&self.opts),
            self.table.clone(),
            self.self_tx.clone(),
            cmd_rx,
        ));
    }

    fn next_counter(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    async fn run(mut self) {
        while let Some(event) = self.mailbox.recv().await {
            match event {
                ControllerEvent::Stop { ack } => {
                    self.handle_stop(ack).await;
                    return;
                }
                other => {
                    self.dispatch(other).await;
                    if self.stopped {
                        return;
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, event: ControllerEvent) {
        match (self.state, event) {
            (State::Connecting, ControllerEvent::Pipeline { commands, timeout, respond_to }) => {
                self.deferred.push_back(DeferredPipeline { commands, timeout, respond_to });
            }
            (State::Connecting, ControllerEvent::SocketConnected { owner_id, address }) => {
                self.on_connected(owner_id, address).await;
            }
            (State::Connecting, ControllerEvent::SocketStopped { owner_id, reason }) => {
                if owner_id != self.current_owner_id {
                    return;
                }
                warn!(%reason, "failed to connect");
                let _ = self.events_tx.send(Event::FailedConnection {
                    address: self.opts.address(),
                    reason: reason.to_string(),
                });
                if let Some(ack) = self.init_ack.take() {
                    let _ = ack.send(Err(reason.clone()));
                }
                self.disconnect(reason).await;
            }
            (State::Connecting, ControllerEvent::ClientTimeoutTick(_)) => {}

            (State::Connected, ControllerEvent::Pipeline { commands, timeout, respond_to }) => {
                self.handle_pipeline(commands, timeout, respond_to).await;
            }
            (State::Connected, ControllerEvent::SocketStopped { owner_id, reason }) => {
                if owner_id != self.current_owner_id {
                    return;
                }
                let address = self.connected_address.take().unwrap_or_else(|| self.opts.address());
                let _ = self.events_tx.send(Event::Disconnection {
                    address,
                    reason: reason.to_string(),
                });
                self.disconnect(reason).await;
            }
            (State::Connected, ControllerEvent::ClientTimeoutTick(counter)) => {
                self.handle_client_timeout(counter).await;
            }

            (State::Disconnected, ControllerEvent::ReconnectTick { owner_id }) => {
                if owner_id != self.current_owner_id {
                    return;
                }
                debug!("reconnecting");
                self.spawn_socket_owner(self.current_owner_id + 1);
                self.state = State::Connecting;
            }
            (State::Disconnected, ControllerEvent::Pipeline { respond_to, .. }) => {
                let _ = respond_to.send(Err(Error::Closed));
            }
            (State::Disconnected, ControllerEvent::SocketStopped { owner_id, reason }) => {
                // Rare race: the old socket owner's closure notification
                // arrives after we already moved to `disconnected`.
                if owner_id != self.current_owner_id {
                    return;
                }
                let address = self.connected_address.take().unwrap_or_else(|| self.opts.address());
                let _ = self.events_tx.send(Event::Disconnection { address, reason: reason.to_string() });
                self.disconnect(reason).await;
            }
            (State::Disconnected, ControllerEvent::ClientTimeoutTick(counter)) => {
                self.handle_client_timeout(counter).await;
            }

            // A stale `SocketConnected`/`ReconnectTick` from a superseded
            // owner can arrive in any state; ignore it.
            (_, ControllerEvent::SocketConnected { .. }) => {}
            (_, ControllerEvent::ReconnectTick { .. }) => {}
            (_, ControllerEvent::Stop { .. }) => unreachable!("handled in run()"),
        }
    }

    async fn handle_client_timeout(&mut self, counter: u64) {
        if let Some(sender) = self.table.mark_timed_out(counter).await {
            let _ = sender.send(Err(Error::Timeout));
        }
    }

    async fn on_connected(&mut self, owner_id: u64, address: String) {
        if owner_id != self.current_owner_id {
            return;
        }
        self.connected_address = Some(address.clone());
        if self.backoff_current.is_some() {
            info!(%address, "reconnected");
            let _ = self.events_tx.send(Event::Reconnected { address });
        }
        self.backoff_current = None;
        self.state = State::Connected;
        if let Some(ack) = self.init_ack.take() {
            let _ = ack.send(Ok(()));
        }
        self.drain_deferred().await;
    }

    /// Re-delivers `pipeline` calls postponed while `connecting`, in the
    /// order they were received.
    async fn drain_deferred(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);
        for entry in deferred {
            self.handle_pipeline(entry.commands, entry.timeout, entry.respond_to).await;
        }
    }

    /// Handles a `pipeline` request while `connected`.
    async fn handle_pipeline(
        &mut self,
        commands: Vec<Command>,
        timeout: Option<Duration>,
        respond_to: ReplySender,
    ) {
        debug_assert_eq!(self.state, State::Connected);

        let (new_mode, ncommands) = client_reply::account(self.client_reply, &commands);
        self.client_reply = new_mode;

        if ncommands == 0 {
            let _ = respond_to.send(Ok(Vec::new()));
            return;
        }

        let counter = self.next_counter();
        self.table.insert(counter, respond_to, ncommands).await;

        let mut encoded = BytesMut::new();
        for cmd in &commands {
            resp::encode_command(cmd.args(), &mut encoded);
        }
        let bytes = encoded.freeze();

        let Some(socket_tx) = &self.socket_tx else {
            // No owner to send through; the `stopped` notification for
            // this generation is presumably already in flight.
            return;
        };

        if socket_tx.send(SocketCommand::Send(bytes)).is_err() {
            // The owner task is already gone. Its `stopped` event will
            // (or already did) drive the disconnect transition, which
            // drains this row with `disconnected`.
            return;
        }

        if let Some(timeout) = timeout.or(self.opts.response_timeout) {
            let mailbox = self.self_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = mailbox.send(ControllerEvent::ClientTimeoutTick(counter));
            });
        }
    }

    /// Handles a lost connection: either a fatal stop, or backoff and a
    /// scheduled reconnect attempt.
    async fn disconnect(&mut self, reason: Error) {
        self.socket_tx = None;

        if matches!(reason, Error::Redis(_)) {
            self.terminal_stop(reason).await;
            return;
        }
        if self.opts.exit_on_disconnection {
            self.terminal_stop(reason).await;
            return;
        }

        let next = crate::backoff::next_backoff(
            self.backoff_current,
            self.opts.backoff_initial,
            self.opts.backoff_max,
        );
        self.backoff_current = Some(next);
        self.table.drain_with_error(Error::Disconnected).await;
        self.state = State::Disconnected;

        let mailbox = self.self_tx.clone();
        let owner_id = self.current_owner_id;
        tokio::spawn(async move {
            tokio::time::sleep(next).await;
            let _ = mailbox.send(ControllerEvent::ReconnectTick { owner_id });
        });
    }

    /// A connection-fatal condition: drain every pending row, fail any
    /// still-pending `sync_connect` init wait, and let the task end so the
    /// handle's next `pipeline`/`stop` observes the mailbox is gone.
    async fn terminal_stop(&mut self, reason: Error) {
        self.table.drain_with_error(reason.clone()).await;
        while let Some(entry) = self.deferred.pop_front() {
            let _ = entry.respond_to.send(Err(reason.clone()));
        }
        if let Some(ack) = self.init_ack.take() {
            let _ = ack.send(Err(reason));
        }
        self.stopped = true;
    }

    async fn handle_stop(&mut self, ack: oneshot::Sender<()>) {
        if let Some(socket_tx) = self.socket_tx.take() {
            let (owner_ack_tx, owner_ack_rx) = oneshot::channel();
            let acked = socket_tx.send(SocketCommand::NormalStop(owner_ack_tx)).is_ok()
                && tokio::time::timeout(Duration::from_secs(5), owner_ack_rx).await.is_ok();
            if !acked {
                if let Some(handle) = self.socket_owner_handle.take() {
                    warn!("socket owner did not stop in time, aborting it");
                    handle.abort();
                }
            }
        }
        self.table.drain_with_error(Error::Disconnected).await;
        let _ = ack.send(());
    }
}
