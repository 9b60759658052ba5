//! Clip registry
//!
//! Append-only list of produced clips. The handle is cheap to clone so recorder
//! callbacks can keep their own reference independent of controller state.

use crate::recorder::ClipData;
use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque reference to recorded media
#[derive(Debug, Clone, PartialEq)]
pub struct ClipHandle {
    pub id: Uuid,
    pub data: ClipData,
}

/// One produced clip
#[derive(Debug, Clone)]
pub struct ClipRecord {
    pub handle: ClipHandle,

    /// Creation instant rendered for display
    pub label: String,

    pub created_at: DateTime<Utc>,
}

impl ClipRecord {
    /// Wrap freshly flushed data, labelled with the current instant
    pub fn new(data: ClipData) -> Self {
        let now = Utc::now();
        Self {
            handle: ClipHandle {
                id: Uuid::new_v4(),
                data,
            },
            label: clip_label(now),
            created_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.handle.id
    }

    pub fn summary(&self) -> ClipSummary {
        ClipSummary {
            id: self.handle.id,
            label: self.label.clone(),
            created_at: self.created_at,
            path: self.handle.data.path().cloned(),
            size_bytes: self.handle.data.size_bytes(),
        }
    }
}

/// Render a creation time like `Mon Oct 19 2026 14:03:11 GMT+0200`
pub fn clip_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%a %b %d %Y %H:%M:%S GMT%z")
        .to_string()
}

/// Serializable view of a clip for the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipSummary {
    pub id: Uuid,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub path: Option<PathBuf>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ClipRegistry {
    records: Arc<RwLock<Vec<ClipRecord>>>,
}

impl ClipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; the only mutator
    pub fn append(&self, record: ClipRecord) {
        self.records.write().push(record);
    }

    /// Copy of all records in insertion order
    pub fn summaries(&self) -> Vec<ClipSummary> {
        self.records.read().iter().map(ClipRecord::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(bytes: &[u8]) -> ClipData {
        ClipData::Buffer(Arc::new(bytes.to_vec()))
    }

    #[test]
    fn test_append_preserves_order() {
        let registry = ClipRegistry::new();
        registry.append(ClipRecord::new(buffer(b"a")));
        registry.append(ClipRecord::new(buffer(b"bb")));

        let clips = registry.summaries();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].size_bytes, Some(1));
        assert_eq!(clips[1].size_bytes, Some(2));
        assert!(clips[0].path.is_none());
    }

    #[test]
    fn test_clones_share_records() {
        let registry = ClipRegistry::new();
        let writer = registry.clone();
        writer.append(ClipRecord::new(buffer(b"x")));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.summaries()[0].id, writer.summaries()[0].id);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let registry = ClipRegistry::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        registry.append(ClipRecord::new(buffer(b"chunk")));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.len(), 400);
    }

    #[test]
    fn test_summary_reports_buffer_size() {
        let record = ClipRecord::new(buffer(&[0u8; 42]));
        let summary = record.summary();

        assert_eq!(summary.size_bytes, Some(42));
        assert!(summary.path.is_none());
        assert!(summary.label.contains("GMT"));
    }
}
