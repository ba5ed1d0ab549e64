//! The API for configuring the job pruner.
//!
//! Completed, failed and cancelled jobs stay in the store until they are cleared. For a queue
//! that runs for a long time this means the store keeps growing. The pruner is a background task
//! which removes terminal jobs on a [`cron::Schedule`], either all of them or only those which
//! finished more than a given age ago.
//!
//! Queued and running jobs are never touched by the pruner.
//!
//! # Example
//!
//! To remove, every hour, the jobs which finished more than a day ago:
//!
//! ```
//! # use fetch_queue::prelude::*;
//! # use std::str::FromStr;
//! # use chrono::TimeDelta;
//! let config = PrunerConfig::new(cron::Schedule::from_str("0 0 * * * *").unwrap())
//!     .with_max_age(TimeDelta::days(1));
//! ```
use chrono::TimeDelta;

pub(crate) mod runner;

/// Configuration of the job pruner.
///
/// Once constructed it should be passed to [`crate::FetchQueue::spawn_pruner`].
#[derive(Debug, Clone)]
pub struct PrunerConfig {
    schedule: cron::Schedule,
    max_age: Option<TimeDelta>,
}

impl PrunerConfig {
    /// Construct a new instance of [`PrunerConfig`] scheduled to run on the provided cron
    /// schedule.
    ///
    /// Without a max age every terminal job is removed each time the pruner runs.
    pub fn new(schedule: cron::Schedule) -> Self {
        Self {
            schedule,
            max_age: None,
        }
    }

    /// Only remove terminal jobs which completed more than `max_age` ago.
    pub fn with_max_age(self, max_age: TimeDelta) -> Self {
        Self {
            max_age: Some(max_age),
            ..self
        }
    }

    pub fn max_age(&self) -> Option<TimeDelta> {
        self.max_age
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn config() {
        let schedule = cron::Schedule::from_str("0 0 * * * *").unwrap();

        let config = PrunerConfig::new(schedule.clone());
        assert_eq!(config.max_age(), None);

        let config = PrunerConfig::new(schedule).with_max_age(TimeDelta::days(31));
        assert_eq!(config.max_age(), Some(TimeDelta::days(31)));
    }
}
