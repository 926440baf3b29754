//! Memory entry domain model.
//!
//! Namespaced key/value records shared between agents, with access tracking.
//! `(namespace, key)` is unique; the empty namespace is valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Byte length at or above which a stored value is flagged compressed.
/// The flag is a deterministic function of the value; callers must not
/// depend on the exact threshold.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 1024;

/// A namespaced key/value memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub namespace: String,
    pub key: String,
    pub value: String,
    /// Content discriminator, defaults to `"json"`.
    pub entry_type: String,
    pub metadata: Option<String>,
    /// Byte length of `value`.
    pub size: u64,
    pub is_compressed: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

impl MemoryEntry {
    pub fn new(
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        entry_type: impl Into<String>,
        metadata: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let value = value.into();
        let size = value.len() as u64;
        let is_compressed = value.len() >= COMPRESSION_THRESHOLD_BYTES;
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            key: key.into(),
            value,
            entry_type: entry_type.into(),
            metadata,
            size,
            is_compressed,
            created_at: now,
            last_updated_at: now,
            accessed_at: None,
            access_count: 0,
        }
    }

    /// Apply a new value and metadata, refreshing size and compression flag.
    pub fn apply_update(
        &mut self,
        value: impl Into<String>,
        entry_type: impl Into<String>,
        metadata: Option<String>,
        now: DateTime<Utc>,
    ) {
        let value = value.into();
        self.size = value.len() as u64;
        self.is_compressed = value.len() >= COMPRESSION_THRESHOLD_BYTES;
        self.value = value;
        self.entry_type = entry_type.into();
        self.metadata = metadata;
        self.last_updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_tracks_size() {
        let entry = MemoryEntry::new("", "k", "hello", "json", None, Utc::now());
        assert_eq!(entry.size, 5);
        assert_eq!(entry.access_count, 0);
        assert!(entry.accessed_at.is_none());
    }

    #[test]
    fn compression_flag_is_deterministic() {
        let small = MemoryEntry::new("", "a", "x", "json", None, Utc::now());
        let big = MemoryEntry::new("", "b", "y".repeat(1 << 16), "json", None, Utc::now());
        assert!(!small.is_compressed);
        assert!(big.is_compressed);
        // Same value always yields the same flag.
        let again = MemoryEntry::new("", "c", "y".repeat(1 << 16), "json", None, Utc::now());
        assert_eq!(big.is_compressed, again.is_compressed);
    }

    #[test]
    fn apply_update_refreshes_size_and_timestamp() {
        let created = Utc::now();
        let mut entry = MemoryEntry::new("ns", "k", "v1", "json", None, created);
        let later = created + chrono::Duration::seconds(5);
        entry.apply_update("longer value", "text", Some("{}".to_string()), later);
        assert_eq!(entry.value, "longer value");
        assert_eq!(entry.size, 12);
        assert_eq!(entry.entry_type, "text");
        assert_eq!(entry.last_updated_at, later);
        assert_eq!(entry.created_at, created);
    }
}
