use crate::job::{query::Query, Job};

pub(crate) trait Queryable {
    fn matches(&self, job: &Job) -> bool;
}

impl<'a> Queryable for Query<'a> {
    fn matches(&self, job: &Job) -> bool {
        match self {
            Query::Not(inner) => !inner.matches(job),
            Query::And(inner) => inner.iter().all(|query| query.matches(job)),
            Query::Or(inner) => inner.iter().any(|query| query.matches(job)),
            Query::IdEquals(id) => job.id == *id,
            Query::IdIn(ids) => ids.contains(&job.id),
            Query::DealerEquals(dealer_id) => job.request.dealer_id == *dealer_id,
            Query::FetchTypeEqual(fetch_type) => job.request.fetch_type == *fetch_type,
            Query::StatusEqual(status) => job.status == *status,
            Query::CreatedBefore(created_at) => job.created_at < *created_at,
            Query::CreatedAfter(created_at) => job.created_at > *created_at,
        }
    }
}

#[cfg(test)]
mod test {
    use std::ops::{Add, Sub};

    use chrono::{TimeDelta, Utc};

    use crate::job::{FetchRequest, JobStatus};

    use super::*;

    fn job(id: u64, dealer_id: &str, fetch_type: &str, status: JobStatus) -> Job {
        let mut job = Job::new(id.into(), FetchRequest::new(dealer_id, fetch_type));
        job.status = status;
        job
    }

    #[test]
    fn not() {
        let job = job(0, "D1", "prospect", JobStatus::Queued);
        assert!(!Query::Not(Box::new(Query::DealerEquals("D1"))).matches(&job));
        assert!(Query::Not(Box::new(Query::DealerEquals("D2"))).matches(&job));
    }

    #[test]
    fn and_or() {
        let job = job(0, "D1", "prospect", JobStatus::Failed);

        assert!(Query::And(vec![
            Query::DealerEquals("D1"),
            Query::StatusEqual(JobStatus::Failed)
        ])
        .matches(&job));
        assert!(!Query::And(vec![
            Query::DealerEquals("D1"),
            Query::FetchTypeEqual("pkb")
        ])
        .matches(&job));
        assert!(Query::Or(vec![
            Query::DealerEquals("D2"),
            Query::FetchTypeEqual("prospect")
        ])
        .matches(&job));
        assert!(Query::And(vec![]).matches(&job));
        assert!(!Query::Or(vec![]).matches(&job));
    }

    #[test]
    fn ids() {
        let job = job(4, "D1", "prospect", JobStatus::Queued);
        let ids = [3.into(), 4.into()];

        assert!(Query::IdEquals(4.into()).matches(&job));
        assert!(!Query::IdEquals(3.into()).matches(&job));
        assert!(Query::IdIn(&ids).matches(&job));
        assert!(!Query::IdIn(&ids[..1]).matches(&job));
    }

    #[test]
    fn created_at() {
        let job = job(0, "D1", "prospect", JobStatus::Queued);
        let before = job.created_at.sub(TimeDelta::seconds(1));
        let after = job.created_at.add(TimeDelta::seconds(1));

        assert!(Query::CreatedBefore(after).matches(&job));
        assert!(!Query::CreatedBefore(before).matches(&job));
        assert!(Query::CreatedAfter(before).matches(&job));
        assert!(!Query::CreatedAfter(Utc::now().add(TimeDelta::hours(1))).matches(&job));
    }
}
