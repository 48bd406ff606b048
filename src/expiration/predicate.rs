//! Expiration predicate hook.
//!
//! Decides whether a fetched candidate has really expired. Deployments may
//! replace it wholesale; a replacement is not combined with the default.

use chrono::{DateTime, Utc};

use crate::store::Record;

pub trait ExpirationPredicate: Send + Sync {
    fn is_expired(&self, record: &Record, threshold: DateTime<Utc>) -> bool;
}

/// Both the creation and the last-modification time must be before the
/// threshold. A recently touched old record is not expired.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPredicate;

impl ExpirationPredicate for DefaultPredicate {
    fn is_expired(&self, record: &Record, threshold: DateTime<Utc>) -> bool {
        record.created_at < threshold && record.modified_at < threshold
    }
}

impl<F> ExpirationPredicate for F
where
    F: Fn(&Record, DateTime<Utc>) -> bool + Send + Sync,
{
    fn is_expired(&self, record: &Record, threshold: DateTime<Utc>) -> bool {
        self(record, threshold)
    }
}
