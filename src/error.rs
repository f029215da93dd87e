use thiserror::Error;

/// A server-returned Redis error reply, e.g. `-ERR wrong number of arguments\r\n`.
///
/// The leading token up to the first space is treated as the error code, the
/// way real Redis errors are namespaced (`ERR`, `WRONGTYPE`, `NOAUTH`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisError {
    pub code: Option<String>,
    pub message: String,
}

impl RedisError {
    pub(crate) fn parse(raw: &str) -> Self {
        match raw.split_once(' ') {
            Some((code, rest))
                if !code.is_empty() && code.chars().all(|c| c.is_ascii_uppercase()) =>
            {
                RedisError {
                    code: Some(code.to_string()),
                    message: rest.to_string(),
                }
            }
            _ => RedisError {
                code: None,
                message: raw.to_string(),
            },
        }
    }
}

impl std::fmt::Display for RedisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code} {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors surfaced by the core: both the RESP decoding errors internal to
/// `resp` and the caller-facing kinds from `pipeline`/`start`/`stop`.
#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error("io error: {0}")]
    Io(String),

    /// Not enough bytes buffered yet to decode a complete value. Never
    /// escapes the `resp` module; callers never see this variant.
    #[error("incomplete frame")]
    IncompleteFrame,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Conversion(#[from] std::num::TryFromIntError),

    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),

    /// `pipeline` was called while the connection was in `disconnected`.
    #[error("connection is closed")]
    Closed,

    /// A request was in flight when the connection disconnected.
    #[error("connection was disconnected while request was in flight")]
    Disconnected,

    /// The per-request client-side timeout fired before a reply arrived.
    #[error("request timed out")]
    Timeout,

    /// The server replied with a RESP error.
    #[error("redis error: {0}")]
    Redis(RedisError),

    /// The connection options failed validation.
    #[error("invalid connection options: {0}")]
    InvalidOptions(String),

    /// The controller actor exited (or was never reachable) while a caller
    /// waited on it.
    #[error("connection controller is gone: {0}")]
    ControllerGone(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
