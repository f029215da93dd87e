//! `redicore`: the core of a reconnecting, pipelined Redis client
//! connection — a state machine coordinating a dedicated socket-reading
//! task, a pending-request table, and exponential-backoff reconnection.
//!
//! Out of scope (by design, not by omission): clustering, transactions
//! beyond forwarding `MULTI`/`EXEC` as ordinary commands, connection
//! pooling, load balancing, and sentinel discovery. See `DESIGN.md`.

mod backoff;
mod client_reply;
mod command;
mod controller;
mod error;
mod event;
mod handle;
mod options;
mod resp;
mod socket_owner;
mod table;

pub use command::Command;
pub use error::{Error, RedisError, Result};
pub use event::Event;
pub use handle::ConnectionHandle;
pub use options::{ConnectionOptions, ConnectionOptionsBuilder, Transport};
pub use resp::Value;

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_HOST: &str = "127.0.0.1";
