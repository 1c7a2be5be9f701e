//! Build records and the deploy-slot status machine.
//!
//! A `BuildRecord` carries a single `BuildStatus`. The four non-transient
//! values encode which of the two hosting slots the record currently
//! occupies; the `vacate`/`occupy` helpers are the only place those encodings
//! are combined or split.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// A named deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Preview,
    Production,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Preview => "preview",
            Slot::Production => "production",
        }
    }

    pub fn other(&self) -> Slot {
        match self {
            Slot::Preview => Slot::Production,
            Slot::Production => Slot::Preview,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preview" => Ok(Slot::Preview),
            "production" | "prod" => Ok(Slot::Production),
            other => Err(format!("unknown slot '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a build record.
///
/// Transitions: `Working → Inactive | Error` when the pipeline finishes, then
/// `Inactive ⇄ ActivePreview | ActiveProduction | ActiveBoth` as deploys run
/// (each deploy passes through `Working`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildStatus {
    Working,
    Inactive,
    Error,
    ActivePreview,
    ActiveProduction,
    ActiveBoth,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Working => "working",
            BuildStatus::Inactive => "inactive",
            BuildStatus::Error => "error",
            BuildStatus::ActivePreview => "activePreview",
            BuildStatus::ActiveProduction => "activeProduction",
            BuildStatus::ActiveBoth => "activeBoth",
        }
    }

    /// The status that means "occupies exactly `slot`".
    pub fn only(slot: Slot) -> Self {
        match slot {
            Slot::Preview => BuildStatus::ActivePreview,
            Slot::Production => BuildStatus::ActiveProduction,
        }
    }

    pub fn holds(&self, slot: Slot) -> bool {
        *self == BuildStatus::ActiveBoth || *self == Self::only(slot)
    }

    /// Drop occupancy of `slot`, keeping occupancy of the other one.
    pub fn vacate(self, slot: Slot) -> Self {
        match self {
            BuildStatus::ActiveBoth => Self::only(slot.other()),
            s if s == Self::only(slot) => BuildStatus::Inactive,
            s => s,
        }
    }

    /// Status after a successful deploy to `slot`, given the status the
    /// record had before the deploy started.
    pub fn occupy(self, slot: Slot) -> Self {
        if self.holds(slot.other()) {
            BuildStatus::ActiveBoth
        } else {
            Self::only(slot)
        }
    }

    pub fn is_deployable(&self) -> bool {
        !matches!(self, BuildStatus::Working | BuildStatus::Error)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BuildRecord
// ---------------------------------------------------------------------------

/// One build or ingestion attempt. The id doubles as the artifact directory
/// name under `builds/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: u64,
    pub message: String,
    pub user: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the caller when a record is created; the store assigns
/// the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewBuild {
    pub message: String,
    pub user: String,
}

impl NewBuild {
    pub fn new(message: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user: user.into(),
        }
    }
}
