//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// automation_runs
// ---------------------------------------------------------------------------

/// Possible statuses for an automation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running   => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed    => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            other       => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A persisted automation run row.
///
/// Inserted with `status = running` when the run starts and overwritten
/// (keyed by `id`) when it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RunRecord {
    pub id: Uuid,
    pub automation_id: String,
    pub status: RunStatus,
    pub trigger_data: serde_json::Value,
    pub duration_ms: Option<i64>,
    /// Ordered step outcomes followed by the run's error strings.
    pub details_log: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// A fresh `running` record.
    pub fn started(id: Uuid, automation_id: impl Into<String>, trigger_data: serde_json::Value) -> Self {
        Self {
            id,
            automation_id: automation_id.into(),
            status: RunStatus::Running,
            trigger_data,
            duration_ms: None,
            details_log: serde_json::Value::Array(Vec::new()),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Close the record with its final status, duration and log.
    pub fn finish(&mut self, status: RunStatus, duration_ms: i64, details_log: serde_json::Value) {
        self.status = status;
        self.duration_ms = Some(duration_ms);
        self.details_log = details_log;
        self.finished_at = Some(Utc::now());
    }
}
