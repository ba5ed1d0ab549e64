//! Configuration of a [`crate::FetchQueue`].
//!
//! ```
//! # use fetch_queue::prelude::*;
//! # use std::time::Duration;
//! let config = QueueConfig::default()
//!     .with_poll_interval(Duration::from_millis(250))
//!     .with_execution_timeout(Some(Duration::from_secs(15 * 60)));
//! ```
use std::time::Duration;

/// How the dispatcher behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub(crate) poll_interval: Duration,
    pub(crate) execution_timeout: Option<Duration>,
}

impl QueueConfig {
    /// How long an idle dispatcher waits before looking at the store again when it has not been
    /// woken by an enqueue.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    pub const fn new() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            execution_timeout: None,
        }
    }

    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Fail jobs whose executor has not returned within the given duration.
    ///
    /// By default there is no timeout: a job that never returns blocks the queue.
    pub const fn with_execution_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}
