//! Persistent status store for build records and the audit log, backed by redb.
//!
//! # Table design
//!
//! ```text
//! builds : u64 (build id)  -> JSON-encoded BuildRecord
//! audit  : u64 (entry id)  -> JSON-encoded AuditLogEntry
//! meta   : &str            -> u64 counters ("next_build_id", "next_audit_id")
//! ```
//!
//! Ids are allocated from `meta` inside the same write transaction that
//! inserts the row, so they are unique and strictly increasing. Iterating
//! `builds` in reverse key order therefore yields newest-first.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, Table, TableDefinition};

use crate::audit::AuditLogEntry;
use crate::build::{BuildRecord, BuildStatus, NewBuild, Slot};
use crate::error::{DashError, Result};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const BUILDS: TableDefinition<u64, &[u8]> = TableDefinition::new("builds");
const AUDIT: TableDefinition<u64, &[u8]> = TableDefinition::new("audit");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_BUILD_ID: &str = "next_build_id";
const NEXT_AUDIT_ID: &str = "next_audit_id";

fn store_err(e: impl std::fmt::Display) -> DashError {
    DashError::Store(e.to_string())
}

/// Take the next value of a counter in `meta`, starting at 1.
fn next_id(meta: &mut Table<'_, &'static str, u64>, key: &str) -> Result<u64> {
    let id = meta.get(key).map_err(store_err)?.map(|g| g.value()).unwrap_or(1);
    meta.insert(key, id + 1).map_err(store_err)?;
    Ok(id)
}

fn decode_build(bytes: &[u8]) -> Result<BuildRecord> {
    serde_json::from_slice(bytes).map_err(store_err)
}

fn insert_audit(
    audit: &mut Table<'_, u64, &'static [u8]>,
    meta: &mut Table<'_, &'static str, u64>,
    mut entry: AuditLogEntry,
) -> Result<AuditLogEntry> {
    entry.id = next_id(meta, NEXT_AUDIT_ID)?;
    let value = serde_json::to_vec(&entry)?;
    audit
        .insert(entry.id, value.as_slice())
        .map_err(store_err)?;
    Ok(entry)
}

// ---------------------------------------------------------------------------
// BuildDb
// ---------------------------------------------------------------------------

/// Persistent store for `BuildRecord` and `AuditLogEntry` rows.
pub struct BuildDb {
    db: Database,
}

impl BuildDb {
    /// Open or create the redb database at `path`, creating all tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(BUILDS).map_err(store_err)?;
        wt.open_table(AUDIT).map_err(store_err)?;
        wt.open_table(META).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Insert a new record in `Working` state together with its `build`
    /// audit entry.
    pub fn create(&self, new: &NewBuild, source: Option<&str>) -> Result<BuildRecord> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let record = {
            let mut builds = wt.open_table(BUILDS).map_err(store_err)?;
            let mut audit = wt.open_table(AUDIT).map_err(store_err)?;
            let mut meta = wt.open_table(META).map_err(store_err)?;

            let now = Utc::now();
            let record = BuildRecord {
                id: next_id(&mut meta, NEXT_BUILD_ID)?,
                message: new.message.clone(),
                user: new.user.clone(),
                status: BuildStatus::Working,
                created_at: now,
                updated_at: now,
            };
            let value = serde_json::to_vec(&record)?;
            builds
                .insert(record.id, value.as_slice())
                .map_err(store_err)?;
            insert_audit(
                &mut audit,
                &mut meta,
                AuditLogEntry::build(&record.user, record.id, source),
            )?;
            record
        };
        wt.commit().map_err(store_err)?;
        Ok(record)
    }

    pub fn get(&self, id: u64) -> Result<Option<BuildRecord>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(BUILDS).map_err(store_err)?;
        match table.get(id).map_err(store_err)? {
            Some(v) => Ok(Some(decode_build(v.value())?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` records, newest first, optionally only those started by
    /// `user`.
    pub fn latest(&self, limit: usize, user: Option<&str>) -> Result<Vec<BuildRecord>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(BUILDS).map_err(store_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)?.rev() {
            if result.len() >= limit {
                break;
            }
            let (_, v) = entry.map_err(store_err)?;
            let record = decode_build(v.value())?;
            if user.is_some_and(|u| u != record.user) {
                continue;
            }
            result.push(record);
        }
        Ok(result)
    }

    pub fn set_status(&self, id: u64, status: BuildStatus) -> Result<BuildRecord> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let record = {
            let mut builds = wt.open_table(BUILDS).map_err(store_err)?;
            let mut record = match builds.get(id).map_err(store_err)? {
                Some(v) => decode_build(v.value())?,
                None => return Err(DashError::BuildNotFound(id)),
            };
            record.status = status;
            record.updated_at = Utc::now();
            let value = serde_json::to_vec(&record)?;
            builds.insert(id, value.as_slice()).map_err(store_err)?;
            record
        };
        wt.commit().map_err(store_err)?;
        Ok(record)
    }

    /// Move every record currently in `from` to `to`. Returns the number of
    /// records changed.
    pub fn set_status_where(&self, from: BuildStatus, to: BuildStatus) -> Result<u32> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let count = {
            let mut builds = wt.open_table(BUILDS).map_err(store_err)?;
            let matching = collect_builds(&builds)?
                .into_iter()
                .filter(|r| r.status == from)
                .collect::<Vec<_>>();
            let now = Utc::now();
            for mut record in matching.iter().cloned() {
                record.status = to;
                record.updated_at = now;
                let value = serde_json::to_vec(&record)?;
                builds
                    .insert(record.id, value.as_slice())
                    .map_err(store_err)?;
            }
            matching.len() as u32
        };
        wt.commit().map_err(store_err)?;
        Ok(count)
    }

    /// Make `id` the sole occupant of `slot` in a single write transaction.
    ///
    /// Every other record holding `slot` is demoted, then `id` gets
    /// `prior.occupy(slot)` and `entry` is appended to the audit log.
    /// `prior` is the status `id` had before the deploy marked it `Working`.
    pub fn occupy_slot(
        &self,
        id: u64,
        slot: Slot,
        prior: BuildStatus,
        entry: AuditLogEntry,
    ) -> Result<BuildRecord> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let record = {
            let mut builds = wt.open_table(BUILDS).map_err(store_err)?;
            let mut audit = wt.open_table(AUDIT).map_err(store_err)?;
            let mut meta = wt.open_table(META).map_err(store_err)?;

            let all = collect_builds(&builds)?;
            let mut target = all
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or(DashError::BuildNotFound(id))?;
            let now = Utc::now();

            for mut other in all.into_iter().filter(|r| r.id != id && r.status.holds(slot)) {
                other.status = other.status.vacate(slot);
                other.updated_at = now;
                let value = serde_json::to_vec(&other)?;
                builds
                    .insert(other.id, value.as_slice())
                    .map_err(store_err)?;
            }

            target.status = prior.occupy(slot);
            target.updated_at = now;
            let value = serde_json::to_vec(&target)?;
            builds.insert(id, value.as_slice()).map_err(store_err)?;
            insert_audit(&mut audit, &mut meta, entry)?;
            target
        };
        wt.commit().map_err(store_err)?;
        Ok(record)
    }

    /// Up to `limit` audit entries, newest first.
    pub fn audit_entries(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(AUDIT).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)?.rev().take(limit) {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice(v.value()).map_err(store_err)?);
        }
        Ok(result)
    }

    /// Store raw bytes under build `id`, bypassing encoding.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, id: u64, bytes: &[u8]) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut builds = wt.open_table(BUILDS).map_err(store_err)?;
            builds.insert(id, bytes).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    /// On startup, fail every record a previous process left in `Working`.
    ///
    /// The single-flight guard lives in memory only, so nothing can still be
    /// working on these. Returns the number of records recovered.
    pub fn startup_recovery(&self) -> Result<u32> {
        self.set_status_where(BuildStatus::Working, BuildStatus::Error)
    }
}

fn collect_builds(table: &impl ReadableTable<u64, &'static [u8]>) -> Result<Vec<BuildRecord>> {
    let mut result = Vec::new();
    for entry in table.iter().map_err(store_err)? {
        let (_, v) = entry.map_err(store_err)?;
        result.push(decode_build(v.value())?);
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
