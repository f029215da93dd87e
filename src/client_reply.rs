//! `CLIENT REPLY {ON|OFF|SKIP}` bookkeeping.
//!
//! Redis lets a client tell the server to stop sending replies (`OFF`),
//! resume (`ON`), or skip exactly the next command's reply (`SKIP`). Since
//! this changes how many replies a pipelined batch should wait for, the
//! core has to track it itself rather than leaving it to the wire decoder.
use crate::command::Command;

/// The server's reply mode, as induced by `CLIENT REPLY` commands the
/// caller has issued on this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientReplyMode {
    On,
    Off,
    Skip,
}

impl Default for ClientReplyMode {
    fn default() -> Self {
        ClientReplyMode::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyDirective {
    On,
    Off,
    Skip,
}

fn classify(cmd: &Command) -> Option<ReplyDirective> {
    let args = cmd.args();
    if args.len() != 3 || !args[0].eq_ignore_ascii_case(b"CLIENT") || !args[1].eq_ignore_ascii_case(b"REPLY") {
        return None;
    }
    if args[2].eq_ignore_ascii_case(b"ON") {
        Some(ReplyDirective::On)
    } else if args[2].eq_ignore_ascii_case(b"OFF") {
        Some(ReplyDirective::Off)
    } else if args[2].eq_ignore_ascii_case(b"SKIP") {
        Some(ReplyDirective::Skip)
    } else {
        None
    }
}

/// Walks `cmds` left to right, starting from `mode`. Returns the persisted
/// mode after the whole batch and the number of replies the caller should
/// wait for.
pub fn account(mut mode: ClientReplyMode, cmds: &[Command]) -> (ClientReplyMode, usize) {
    let mut ncommands = 0;

    for cmd in cmds {
        mode = match (mode, classify(cmd)) {
            (_, Some(ReplyDirective::Off)) => ClientReplyMode::Off,
            (ClientReplyMode::Off, Some(ReplyDirective::Skip)) => ClientReplyMode::Off,
            (ClientReplyMode::On | ClientReplyMode::Skip, Some(ReplyDirective::Skip)) => {
                ClientReplyMode::Skip
            }
            (_, Some(ReplyDirective::On)) => {
                ncommands += 1;
                ClientReplyMode::On
            }
            (ClientReplyMode::On, None) => {
                ncommands += 1;
                ClientReplyMode::On
            }
            (ClientReplyMode::Off, None) => ClientReplyMode::Off,
            (ClientReplyMode::Skip, None) => ClientReplyMode::On,
        };
    }

    (mode, ncommands)
}
