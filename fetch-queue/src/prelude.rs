//! The purpose of this module is to alleviate the need to import many of the `[fetch_queue]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use fetch_queue::prelude::*;
//! ```
pub use crate::api::QueueStatus;
pub use crate::config::QueueConfig;
pub use crate::executor::{ExecutionError, ExecutionResult, FetchExecutor};
pub use crate::job::builder::JobBuilder;
pub use crate::job::query::Where;
pub use crate::job::{FetchRequest, Job, JobId, JobStatus, JobView};
pub use crate::pruner::PrunerConfig;
pub use crate::store::{memory::InMemoryStore, JobStore};
pub use crate::{FetchQueue, FetchQueueError, TaskHandle};
