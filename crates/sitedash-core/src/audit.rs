use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::build::Slot;

/// Kind of state-changing action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Build,
    Publish,
}

/// Append-only audit entry. `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    #[serde(default)]
    pub id: u64,
    pub user: String,
    pub kind: AuditKind,
    pub values: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Entry for a newly started build. `source` is the link an ingestion job
    /// was started from, when there is one.
    pub fn build(user: &str, build_id: u64, source: Option<&str>) -> Self {
        let mut values = vec![build_id.to_string()];
        if let Some(link) = source {
            values.push(link.to_string());
        }
        Self {
            id: 0,
            user: user.to_string(),
            kind: AuditKind::Build,
            values,
            created_at: Utc::now(),
        }
    }

    pub fn publish(user: &str, build_id: u64, slot: Slot) -> Self {
        Self {
            id: 0,
            user: user.to_string(),
            kind: AuditKind::Publish,
            values: vec![build_id.to_string(), slot.to_string()],
            created_at: Utc::now(),
        }
    }
}
