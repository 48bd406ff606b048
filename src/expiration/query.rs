//! Listing query hook.
//!
//! Shapes the page request sent to the store for one record type. The default
//! lists published records last modified before the threshold.

use chrono::{DateTime, Utc};

use super::policy::ExpirationPolicy;
use crate::store::{ExpiredQuery, RecordStatus};

pub trait QueryBuilder: Send + Sync {
    fn build(
        &self,
        record_type: &str,
        policy: &ExpirationPolicy,
        threshold: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> ExpiredQuery;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultQuery;

impl QueryBuilder for DefaultQuery {
    fn build(
        &self,
        record_type: &str,
        _policy: &ExpirationPolicy,
        threshold: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> ExpiredQuery {
        ExpiredQuery {
            record_type: record_type.to_string(),
            modified_before: threshold,
            statuses: vec![RecordStatus::Published],
            page,
            page_size,
        }
    }
}

impl<F> QueryBuilder for F
where
    F: Fn(&str, &ExpirationPolicy, DateTime<Utc>, u32, u32) -> ExpiredQuery + Send + Sync,
{
    fn build(
        &self,
        record_type: &str,
        policy: &ExpirationPolicy,
        threshold: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> ExpiredQuery {
        self(record_type, policy, threshold, page, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiration::policy::PolicyInput;

    #[test]
    fn test_default_query_shape() {
        let policy = PolicyInput::new().resolve("post").unwrap();
        let threshold = Utc::now();
        let query = DefaultQuery.build("post", &policy, threshold, 2, 500);

        assert_eq!(query.record_type, "post");
        assert_eq!(query.modified_before, threshold);
        assert_eq!(query.statuses, vec![RecordStatus::Published]);
        assert_eq!(query.page, 2);
        assert_eq!(query.page_size, 500);
    }
}
