//! The Pending Request Table: the ordered, shared structure correlating
//! sent commands with the replies the socket owner decodes, in strict
//! FIFO order.
use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use crate::error::{Error, Result};
use crate::resp::Value;

/// A caller waiting on a `pipeline` call's terminal reply.
pub(crate) type ReplySender = oneshot::Sender<Result<Vec<Value>>>;

/// One row of the table: `(counter, from, ncommands, timed_out)`, plus
/// the in-flight reply buffer the socket owner accumulates into as it
/// decodes.
pub(crate) struct PendingRow {
    pub from: Option<ReplySender>,
    pub ncommands: usize,
    pub received: Vec<Value>,
    pub timed_out: bool,
}

/// Shared, ordered, monotonically-keyed table. Both the controller and the
/// socket owner hold a clone of the `Arc` and serialize access through the
/// inner `Mutex`, rather than routing every operation through messages.
#[derive(Clone)]
pub(crate) struct PendingTable {
    inner: Arc<Mutex<BTreeMap<u64, PendingRow>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Controller-only: insert a freshly sent row.
    pub async fn insert(&self, counter: u64, from: ReplySender, ncommands: usize) {
        debug_assert!(ncommands > 0, "rows with ncommands == 0 are never inserted");
        let mut table = self.inner.lock().await;
        table.insert(
            counter,
            PendingRow {
                from: Some(from),
                ncommands,
                received: Vec::new(),
                timed_out: false,
            },
        );
    }

    /// Controller-only (timer path): mark a row timed out and take its
    /// reply sender so the controller can notify the caller immediately.
    /// The row itself is left in the table — the socket owner still needs
    /// somewhere to accumulate the late reply into before discarding it.
    ///
    /// Returns `None` if the row is already gone (the reply arrived first)
    /// or was already timed out, in which case the timer firing is stale
    /// and the caller should ignore it.
    pub async fn mark_timed_out(&self, counter: u64) -> Option<ReplySender> {
        let mut table = self.inner.lock().await;
        match table.get_mut(&counter) {
            Some(row) if !row.timed_out => {
                row.timed_out = true;
                row.from.take()
            }
            _ => None,
        }
    }

    /// Socket-owner-only: feed one decoded value into the oldest pending
    /// row. If that completes the row's expected reply count, the row is
    /// removed and returned so the caller can deliver (or discard, if
    /// `timed_out`) its terminal reply.
    pub async fn accumulate_into_oldest(&self, value: Value) -> Option<PendingRow> {
        let mut table = self.inner.lock().await;
        let counter = *table.keys().next()?;
        let row = table.get_mut(&counter)?;
        row.received.push(value);
        if row.received.len() < row.ncommands {
            return None;
        }
        table.remove(&counter)
    }

    /// Controller-only, on disconnection: drain every non-timed-out row,
    /// failing it with `reason`, then empty the table.
    pub async fn drain_with_error(&self, reason: Error) {
        let mut table = self.inner.lock().await;
        for (_, mut row) in std::mem::take(&mut *table) {
            if row.timed_out {
                continue;
            }
            if let Some(from) = row.from.take() {
                let _ = from.send(Err(reason.clone()));
            }
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
