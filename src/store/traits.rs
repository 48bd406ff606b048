use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreResult;

/// A field patch applied to a record (`field name -> new value`).
pub type FieldPatch = serde_json::Map<String, serde_json::Value>;

/// Store-assigned record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Publication state of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Publicly visible.
    #[default]
    Published,
    /// Non-public, content retained.
    Draft,
    /// Awaiting review.
    Pending,
    /// Visible only to privileged users.
    Private,
    /// Soft-deleted, recoverable.
    Trashed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Published => "published",
            RecordStatus::Draft => "draft",
            RecordStatus::Pending => "pending",
            RecordStatus::Private => "private",
            RecordStatus::Trashed => "trashed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content record as seen by the expiration engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub record_type: String,
    #[serde(default)]
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Arbitrary host-defined fields. Update policies patch these.
    #[serde(default)]
    pub fields: FieldPatch,
}

/// Parameters for listing records that may have expired.
///
/// Pages are 1-based. The store decides ordering; the engine keeps asking
/// for the next page until one comes back empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredQuery {
    /// Record type to list.
    pub record_type: String,
    /// Only records last modified strictly before this instant.
    pub modified_before: DateTime<Utc>,
    /// Only records in one of these states. Empty means any state.
    pub statuses: Vec<RecordStatus>,
    /// 1-based page number.
    pub page: u32,
    /// Maximum identifiers per page.
    pub page_size: u32,
}

impl ExpiredQuery {
    /// Number of matching records to skip before this page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }

    /// Check whether a record satisfies the type, status and age filters.
    pub fn matches(&self, record: &Record) -> bool {
        record.record_type == self.record_type
            && record.modified_at < self.modified_before
            && (self.statuses.is_empty() || self.statuses.contains(&record.status))
    }
}

/// Content store consumed by the expiration engine.
///
/// Implementations must be thread-safe; the engine may run on any tokio
/// worker. Mutations are expected to bump the record's `modified_at`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Whether the store knows this record type. Used at registration time.
    fn has_record_type(&self, record_type: &str) -> bool;

    /// List one page of candidate record identifiers.
    async fn list_ids(&self, query: &ExpiredQuery) -> StoreResult<Vec<RecordId>>;

    /// Fetch a record. `None` means it no longer exists.
    async fn fetch(&self, id: RecordId) -> StoreResult<Option<Record>>;

    /// Move a record to a new status.
    async fn set_status(&self, id: RecordId, status: RecordStatus) -> StoreResult<()>;

    /// Permanently remove a record.
    async fn hard_delete(&self, id: RecordId) -> StoreResult<()>;

    /// Merge a field patch into a record.
    async fn update_fields(&self, id: RecordId, patch: &FieldPatch) -> StoreResult<()>;
}
