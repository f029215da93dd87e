//! A single Redis command as the caller-facing unit of a `pipeline` batch.
use bytes::Bytes;

/// An ordered list of arguments, the first of which is conventionally the
/// command name. The core never interprets argument contents except to spot
/// `CLIENT REPLY {ON|OFF|SKIP}` (see [`crate::client_reply`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl Into<Bytes>) -> Self {
        Command {
            args: vec![name.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
}

impl From<Vec<&str>> for Command {
    fn from(parts: Vec<&str>) -> Self {
        let args = parts.into_iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect();
        Command { args }
    }
}

impl<const N: usize> From<[&str; N]> for Command {
    fn from(parts: [&str; N]) -> Self {
        Command::from(parts.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_args_in_order() {
        let cmd = Command::new("SET").arg("k").arg("v");
        assert_eq!(
            cmd.args(),
            &[Bytes::from("SET"), Bytes::from("k"), Bytes::from("v")]
        );
    }
}
