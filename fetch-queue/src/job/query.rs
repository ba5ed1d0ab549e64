//! Filters for looking up jobs, for example all failed jobs for a dealer.
//!
//! ```
//! # use fetch_queue::prelude::*;
//! let query = Where::dealer_equals("D1")
//!     .and(Where::fetch_type_equals("prospect"))
//!     .and(!Where::status_equal(JobStatus::Completed));
//! ```
use super::JobId;
use super::JobStatus;
use chrono::TimeDelta;
use chrono::{DateTime, Utc};

#[derive(Debug, Eq, PartialEq, Clone)]
#[non_exhaustive]
pub struct Where<'a>(pub(crate) Query<'a>);

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Query<'a> {
    Not(Box<Query<'a>>),
    And(Vec<Query<'a>>),
    Or(Vec<Query<'a>>),
    IdEquals(JobId),
    IdIn(&'a [JobId]),
    DealerEquals(&'a str),
    FetchTypeEqual(&'a str),
    StatusEqual(JobStatus),
    CreatedBefore(DateTime<Utc>),
    CreatedAfter(DateTime<Utc>),
}

impl<'a> Where<'a> {
    pub fn and(mut self, other: Where<'a>) -> Self {
        if let Query::And(ref mut constraints) = self.0 {
            constraints.push(other.0);
        } else {
            self.0 = Query::And(vec![self.0, other.0]);
        }
        self
    }

    pub fn or(mut self, other: Where<'a>) -> Self {
        if let Query::Or(ref mut constraints) = self.0 {
            constraints.push(other.0);
        } else {
            self.0 = Query::Or(vec![self.0, other.0]);
        }
        self
    }

    pub fn id_equals(id: JobId) -> Self {
        Self(Query::IdEquals(id))
    }

    pub fn id_in(ids: &'a [JobId]) -> Self {
        Self(Query::IdIn(ids))
    }

    pub fn dealer_equals(dealer_id: &'a str) -> Self {
        Self(Query::DealerEquals(dealer_id))
    }

    pub fn fetch_type_equals(fetch_type: &'a str) -> Self {
        Self(Query::FetchTypeEqual(fetch_type))
    }

    pub fn status_equal(status: JobStatus) -> Self {
        Self(Query::StatusEqual(status))
    }

    pub fn created_before(created_at: DateTime<Utc>) -> Self {
        Self(Query::CreatedBefore(created_at))
    }

    pub fn created_after(created_at: DateTime<Utc>) -> Self {
        Self(Query::CreatedAfter(created_at))
    }

    pub fn created_older_than(duration: TimeDelta) -> Self {
        Self(Query::CreatedBefore(Utc::now() - duration))
    }
}

impl<'a> std::ops::Not for Where<'a> {
    type Output = Self;
    fn not(self) -> Self {
        Self(Query::Not(Box::new(self.0)))
    }
}

impl<'a> From<Where<'a>> for Query<'a> {
    fn from(value: Where<'a>) -> Self {
        value.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn and_flattens_constraints() {
        let query = Where::dealer_equals("D1")
            .and(Where::fetch_type_equals("pkb"))
            .and(!Where::status_equal(JobStatus::Running));

        assert_eq!(
            query.0,
            Query::And(vec![
                Query::DealerEquals("D1"),
                Query::FetchTypeEqual("pkb"),
                Query::Not(Box::new(Query::StatusEqual(JobStatus::Running))),
            ])
        );
    }

    #[test]
    fn or_nested_in_and() {
        let query = Where::status_equal(JobStatus::Failed)
            .or(Where::status_equal(JobStatus::Cancelled))
            .and(Where::dealer_equals("D2"));

        assert_eq!(
            query.0,
            Query::And(vec![
                Query::Or(vec![
                    Query::StatusEqual(JobStatus::Failed),
                    Query::StatusEqual(JobStatus::Cancelled),
                ]),
                Query::DealerEquals("D2"),
            ])
        );
    }
}
