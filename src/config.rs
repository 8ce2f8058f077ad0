//! Pool configuration.

use crate::error::{DevolveError, Result};

/// Default TCP port the listener binds.
pub const DEFAULT_PORT: u16 = 11111;

/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 5000;

/// Lowest acceptable listener port (non-privileged range).
const MIN_PORT: u16 = 1024;

/// Largest acceptable queue capacity.
const MAX_QUEUE_SIZE: usize = 1_000_000_000;

/// Configuration for a dispatch pool.
///
/// Validated by [`Pool::start`](crate::Pool::start); out-of-bounds values
/// refuse to start the pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// TCP port the listener binds. Must be in `1024..=65535`.
    pub port: u16,
    /// Bounded queue capacity; `add` blocks when the queue is full.
    /// Must be in `1..=1_000_000_000`.
    pub queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the default port and queue capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listener port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Check the option bounds.
    pub fn validate(&self) -> Result<()> {
        if self.port < MIN_PORT {
            return Err(DevolveError::Config(format!(
                "port {} is below the non-privileged minimum {}",
                self.port, MIN_PORT
            )));
        }
        if self.queue_size == 0 {
            return Err(DevolveError::Config("queue_size must be at least 1".into()));
        }
        if self.queue_size > MAX_QUEUE_SIZE {
            return Err(DevolveError::Config(format!(
                "queue_size {} exceeds the maximum {}",
                self.queue_size, MAX_QUEUE_SIZE
            )));
        }
        Ok(())
    }
}
