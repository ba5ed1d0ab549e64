use crate::{store::JobStore, FetchQueue, FetchQueueError};

use super::{FetchRequest, JobId};

/// Fluent construction of a [`FetchRequest`].
///
/// ```
/// # use fetch_queue::prelude::*;
/// let request = FetchRequest::builder("D1", "parts_inbound")
///     .with_window("2024-01-01 00:00:00", "2024-01-31 23:59:59")
///     .with_extra_param("PO-1234")
///     .build()
///     .unwrap();
///
/// assert_eq!(request.extra_param.as_deref(), Some("PO-1234"));
/// ```
#[derive(Debug, Clone)]
pub struct JobBuilder {
    dealer_id: String,
    fetch_type: String,
    from_time: Option<String>,
    to_time: Option<String>,
    extra_param: Option<String>,
}

impl JobBuilder {
    pub fn new(dealer_id: impl Into<String>, fetch_type: impl Into<String>) -> Self {
        Self {
            dealer_id: dealer_id.into(),
            fetch_type: fetch_type.into(),
            from_time: None,
            to_time: None,
            extra_param: None,
        }
    }

    pub fn with_from_time(self, from_time: impl Into<String>) -> Self {
        Self {
            from_time: Some(from_time.into()),
            ..self
        }
    }

    pub fn with_to_time(self, to_time: impl Into<String>) -> Self {
        Self {
            to_time: Some(to_time.into()),
            ..self
        }
    }

    pub fn with_window(self, from_time: impl Into<String>, to_time: impl Into<String>) -> Self {
        self.with_from_time(from_time).with_to_time(to_time)
    }

    /// An extra parameter for the fetch, for example the PO number of a parts inbound fetch.
    pub fn with_extra_param(self, extra_param: impl Into<String>) -> Self {
        Self {
            extra_param: Some(extra_param.into()),
            ..self
        }
    }

    pub fn build(self) -> Result<FetchRequest, FetchQueueError> {
        let request = FetchRequest {
            dealer_id: self.dealer_id,
            fetch_type: self.fetch_type,
            from_time: self.from_time,
            to_time: self.to_time,
            extra_param: self.extra_param,
        };
        request.validate()?;
        Ok(request)
    }

    pub async fn enqueue_to<S: JobStore>(
        self,
        queue: &FetchQueue<S>,
    ) -> Result<JobId, FetchQueueError> {
        queue.enqueue(self.build()?).await
    }
}
