use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};

use super::{
    error::{StoreError, StoreResult},
    traits::{ContentStore, ExpiredQuery, FieldPatch, Record, RecordId, RecordStatus},
};
use crate::clock::{Clock, SystemClock};

/// In-memory content store using DashMap for concurrent access.
///
/// Listing is ordered by record id so pagination is stable between calls.
/// Every mutation stamps `modified_at` with the store's clock.
///
/// Tests can inject failures per record type (listing) or per record
/// (fetch and mutation) to exercise the engine's error handling.
#[derive(Debug)]
pub struct MemoryStore {
    records: DashMap<RecordId, Record>,
    record_types: DashSet<String>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
    list_calls: DashMap<String, u64>,
    failing_lists: DashSet<String>,
    failing_fetches: DashSet<RecordId>,
    failing_mutations: DashSet<RecordId>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            record_types: DashSet::new(),
            next_id: AtomicU64::new(1),
            clock,
            list_calls: DashMap::new(),
            failing_lists: DashSet::new(),
            failing_fetches: DashSet::new(),
            failing_mutations: DashSet::new(),
        }
    }

    /// Make a record type known to the store.
    pub fn register_type(&self, record_type: impl Into<String>) {
        self.record_types.insert(record_type.into());
    }

    /// Create a published record with both timestamps set to `at`.
    pub fn create(&self, record_type: &str, at: DateTime<Utc>) -> RecordId {
        let id = RecordId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.records.insert(
            id,
            Record {
                id,
                record_type: record_type.to_string(),
                status: RecordStatus::Published,
                created_at: at,
                modified_at: at,
                fields: FieldPatch::new(),
            },
        );
        id
    }

    /// Create `count` published records with both timestamps set to `at`.
    pub fn create_many(&self, record_type: &str, count: usize, at: DateTime<Utc>) -> Vec<RecordId> {
        (0..count).map(|_| self.create(record_type, at)).collect()
    }

    /// Insert a fully-formed record, keeping its id and timestamps.
    ///
    /// The record's type is registered and the id counter moves past it.
    pub fn insert(&self, record: Record) {
        self.record_types.insert(record.record_type.clone());
        self.next_id.fetch_max(record.id.0.saturating_add(1), Ordering::Relaxed);
        self.records.insert(record.id, record);
    }

    /// Snapshot a record without going through the async trait.
    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.records.get(&id).map(|r| r.clone())
    }

    pub fn status(&self, id: RecordId) -> Option<RecordStatus> {
        self.records.get(&id).map(|r| r.status)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of `list_ids` calls issued for a record type.
    pub fn list_calls(&self, record_type: &str) -> u64 {
        self.list_calls.get(record_type).map(|c| *c).unwrap_or(0)
    }

    /// Make every `list_ids` call for this type fail.
    pub fn fail_listing(&self, record_type: impl Into<String>) {
        self.failing_lists.insert(record_type.into());
    }

    /// Make `fetch` fail for this record.
    pub fn fail_fetch(&self, id: RecordId) {
        self.failing_fetches.insert(id);
    }

    /// Make every mutation fail for this record.
    pub fn fail_mutations(&self, id: RecordId) {
        self.failing_mutations.insert(id);
    }

    fn check_mutation(&self, id: RecordId) -> StoreResult<()> {
        if self.failing_mutations.contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "mutation of record {id} rejected"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    fn has_record_type(&self, record_type: &str) -> bool {
        self.record_types.contains(record_type)
    }

    async fn list_ids(&self, query: &ExpiredQuery) -> StoreResult<Vec<RecordId>> {
        *self
            .list_calls
            .entry(query.record_type.clone())
            .or_insert(0) += 1;

        if self.failing_lists.contains(&query.record_type) {
            return Err(StoreError::Unavailable(format!(
                "listing {} failed",
                query.record_type
            )));
        }

        let mut ids: Vec<RecordId> = self
            .records
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();

        Ok(ids
            .into_iter()
            .skip(query.offset())
            .take(query.page_size as usize)
            .collect())
    }

    async fn fetch(&self, id: RecordId) -> StoreResult<Option<Record>> {
        if self.failing_fetches.contains(&id) {
            return Err(StoreError::Unavailable(format!("fetch of record {id} failed")));
        }
        Ok(self.get(id))
    }

    async fn set_status(&self, id: RecordId, status: RecordStatus) -> StoreResult<()> {
        self.check_mutation(id)?;
        let mut record = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = status;
        record.modified_at = self.clock.now();
        Ok(())
    }

    async fn hard_delete(&self, id: RecordId) -> StoreResult<()> {
        self.check_mutation(id)?;
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_fields(&self, id: RecordId, patch: &FieldPatch) -> StoreResult<()> {
        self.check_mutation(id)?;
        let mut record = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        for (key, value) in patch {
            record.fields.insert(key.clone(), value.clone());
        }
        record.modified_at = self.clock.now();
        Ok(())
    }
}
