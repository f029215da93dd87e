//! Validated connection configuration.
use std::time::Duration;

/// Whether the socket owner should speak plain TCP or negotiate TLS.
///
/// `Tls` is accepted at the type level so option validation and the state
/// machine are complete, but the handshake itself is not implemented in
/// this crate (see DESIGN.md) — attempting to connect with it yields
/// [`crate::Error::Protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Tls,
}

/// Validated configuration for a single connection, built with
/// [`ConnectionOptionsBuilder`].
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<i64>,
    pub sync_connect: bool,
    pub exit_on_disconnection: bool,
    pub backoff_initial: Duration,
    pub backoff_max: Option<Duration>,
    pub connect_timeout: Duration,
    pub response_timeout: Option<Duration>,
}

impl ConnectionOptions {
    pub fn builder(host: impl Into<String>, port: u16) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(host, port)
    }

    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ConnectionOptions`]; [`build`](Self::build) validates the
/// fields the way a constructor in this corpus returns `Result` rather than
/// panicking on a bad config.
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    host: String,
    port: u16,
    transport: Transport,
    username: Option<String>,
    password: Option<String>,
    database: Option<i64>,
    sync_connect: bool,
    exit_on_disconnection: bool,
    backoff_initial: Duration,
    backoff_max: Option<Duration>,
    connect_timeout: Duration,
    response_timeout: Option<Duration>,
}

impl ConnectionOptionsBuilder {
    fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectionOptionsBuilder {
            host: host.into(),
            port,
            transport: Transport::Plain,
            username: None,
            password: None,
            database: None,
            sync_connect: false,
            exit_on_disconnection: false,
            backoff_initial: Duration::from_millis(100),
            backoff_max: Some(Duration::from_secs(10)),
            connect_timeout: Duration::from_secs(5),
            response_timeout: None,
        }
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn auth(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, db: i64) -> Self {
        self.database = Some(db);
        self
    }

    pub fn sync_connect(mut self, sync: bool) -> Self {
        self.sync_connect = sync;
        self
    }

    pub fn exit_on_disconnection(mut self, exit: bool) -> Self {
        self.exit_on_disconnection = exit;
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Option<Duration>) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ConnectionOptions, crate::Error> {
        if self.host.trim().is_empty() {
            return Err(crate::Error::InvalidOptions("host must not be empty".into()));
        }
        if self.backoff_initial.is_zero() {
            return Err(crate::Error::InvalidOptions(
                "backoff_initial must be greater than zero".into(),
            ));
        }
        if let Some(max) = self.backoff_max {
            if max < self.backoff_initial {
                return Err(crate::Error::InvalidOptions(
                    "backoff_max must be >= backoff_initial".into(),
                ));
            }
        }
        Ok(ConnectionOptions {
            host: self.host,
            port: self.port,
            transport: self.transport,
            username: self.username,
            password: self.password,
            database: self.database,
            sync_connect: self.sync_connect,
            exit_on_disconnection: self.exit_on_disconnection,
            backoff_initial: self.backoff_initial,
            backoff_max: self.backoff_max,
            connect_timeout: self.connect_timeout,
            response_timeout: self.response_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_host() {
        let err = ConnectionOptions::builder("   ", 6379).build().unwrap_err();
        assert!(matches!(err, crate::Error::InvalidOptions(_)));
    }

    #[test]
    fn rejects_backoff_max_below_initial() {
        let err = ConnectionOptions::builder("localhost", 6379)
            .backoff(Duration::from_millis(500), Some(Duration::from_millis(100)))
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidOptions(_)));
    }

    #[test]
    fn accepts_a_minimal_valid_config() {
        let opts = ConnectionOptions::builder("localhost", 6379).build().unwrap();
        assert_eq!(opts.address(), "localhost:6379");
    }
}
