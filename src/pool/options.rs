//! Pool configuration.

use std::time::Duration;

use crate::connection::ConnectOptions;
use crate::error::{Error, Result};

fn config_err(message: &str) -> Error {
    Error::Config(message.into())
}

/// Options and flags which can be used to configure a connection pool.
///
/// Durations of zero disable the corresponding timeout or periodic
/// check, except [`retry_interval`](Self::retry_interval) which must be
/// strictly positive.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub(crate) connect: ConnectOptions,
    pub(crate) initial_size: usize,
    pub(crate) max_size: usize,
    pub(crate) connect_timeout: Duration,
    pub(crate) retry_interval: Duration,
    pub(crate) ping_interval: Duration,
    pub(crate) ping_timeout: Duration,
}

impl PoolOptions {
    pub fn new(connect: ConnectOptions) -> Self {
        Self {
            connect,
            initial_size: 1,
            // The MySQL server's own default connection limit.
            max_size: 151,
            connect_timeout: Duration::from_secs(20),
            retry_interval: Duration::from_secs(30),
            ping_interval: Duration::from_secs(3600),
            ping_timeout: Duration::from_secs(10),
        }
    }

    /// Number of sessions established when the pool starts.
    pub fn initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Upper bound on pool size; further `get_connection` calls wait.
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Bound on each session-establishment attempt. Zero disables it.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Backoff between failed connection attempts. Must be positive.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// How long a session may sit idle before a liveness ping. Zero
    /// disables pinging.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Bound on each ping (and post-checkout reset). Zero disables it.
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(config_err("pool max_size must be at least 1"));
        }

        if self.initial_size > self.max_size {
            return Err(config_err(&format!(
                "pool initial_size ({}) exceeds max_size ({})",
                self.initial_size, self.max_size
            )));
        }

        if self.retry_interval.is_zero() {
            return Err(config_err("pool retry_interval must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = PoolOptions::new(ConnectOptions::new());
        assert_eq!(options.max_size, 151);
        options.validate().unwrap();
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        let base = ConnectOptions::new();

        assert!(PoolOptions::new(base.clone()).max_size(0).validate().is_err());
        assert!(PoolOptions::new(base.clone())
            .initial_size(5)
            .max_size(2)
            .validate()
            .is_err());
        assert!(PoolOptions::new(base)
            .retry_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
