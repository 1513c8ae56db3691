use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Path-addressed document tree, the only shared mutable resource in the
/// system. Records live at `collection/key` paths; atomicity is per record,
/// so every balance mutation must go through `increment` rather than a
/// read-modify-write cycle.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one record.
    async fn get(&self, path: &str) -> Result<Option<Value>, anyhow::Error>;

    /// Replace one record.
    async fn set(&self, path: &str, value: Value) -> Result<(), anyhow::Error>;

    /// Merge fields into a record, creating it if absent. A null field value
    /// removes the field, mirroring the backend's merge semantics.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), anyhow::Error>;

    /// Append a record under a generated child key and return the key.
    /// Generated keys are unique and sort in creation order.
    async fn push(&self, parent: &str, value: Value) -> Result<String, anyhow::Error>;

    /// Atomically add `delta` to a numeric field, treating a missing record
    /// or field as 0. Returns an observed post-increment value: the add
    /// itself never loses updates, but on a remote backend the returned
    /// number may already include a concurrent writer's delta.
    async fn increment(&self, path: &str, field: &str, delta: i64) -> Result<i64, anyhow::Error>;

    /// Set a field only if it is currently unset, atomically with the check.
    /// Returns whether the write happened.
    async fn set_if_absent(&self, path: &str, field: &str, value: Value)
        -> Result<bool, anyhow::Error>;

    /// All direct children of a parent path, keyed by child key.
    async fn list(&self, parent: &str) -> Result<Vec<(String, Value)>, anyhow::Error>;

    /// Children whose string field equals `value` (secondary-index lookup).
    async fn query_equal(
        &self,
        parent: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Value)>, anyhow::Error>;
}

static PUSH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generated child key: millisecond timestamp, a process-wide sequence, then
/// a random tail. Lexicographic order matches creation order.
pub fn push_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let seq = PUSH_SEQ.fetch_add(1, Ordering::Relaxed);
    let tail = uuid::Uuid::new_v4().simple().to_string();
    format!("{millis:012x}{seq:016x}{}", &tail[..6])
}

/// Timestamps are stored as ISO-8601 UTC strings; they sort correctly as
/// plain text because the format is fixed.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
