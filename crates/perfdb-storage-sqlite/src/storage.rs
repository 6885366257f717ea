use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use perfdb_core::{
    Fingerprint, HistoryLookup, HistoryRecord, MachineIdentity, OrderKey, SampleStatus, SampleValue, StoreError,
    StoreResult, Submission,
};
use perfdb_storage::{FingerprintClaim, RecordWrite, Store, StoreTransaction};

/// Version written to `PRAGMA user_version` once the schema is applied.
pub const SCHEMA_VERSION: i64 = 1;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        tracing::debug!(path = %db_path.display(), journal_mode = %mode, "opened sqlite store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?)
    }

    pub fn sample_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(1) FROM samples", [], |r| r.get(0))?)
    }

    pub fn submission_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(1) FROM submissions", [], |r| r.get(0))?)
    }
}

/// Apply any schema steps newer than the database's `user_version`.
fn migrate(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if current > SCHEMA_VERSION {
        bail!("database schema version {current} is newer than supported version {SCHEMA_VERSION}");
    }
    if current < 1 {
        conn.execute_batch(include_str!("../migrations/0001_init.sql"))
            .context("apply schema 0001_init")?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::info!(from = current, to = SCHEMA_VERSION, "migrated database schema");
    }
    Ok(())
}

fn store_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) => match f.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Conflict(e.to_string()),
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly
            | ErrorCode::SystemIoFailure => StoreError::Unavailable(e.to_string()),
            ErrorCode::DatabaseCorrupt => StoreError::Corrupt(e.to_string()),
            _ => StoreError::Write(e.to_string()),
        },
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => StoreError::Corrupt(e.to_string()),
        _ => StoreError::Write(e.to_string()),
    }
}

/// Parameters serialize from a BTreeMap, so equal identities give equal text.
fn params_json(machine: &MachineIdentity) -> StoreResult<String> {
    serde_json::to_string(&machine.parameters).map_err(|e| StoreError::Write(e.to_string()))
}

fn find_machine(conn: &Connection, machine: &MachineIdentity) -> StoreResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM machines WHERE name=?1 AND params_json=?2",
        params![machine.name, params_json(machine)?],
        |r| r.get(0),
    )
    .optional()
    .map_err(store_err)
}

fn ensure_machine(conn: &Connection, machine: &MachineIdentity) -> StoreResult<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO machines(name, params_json) VALUES (?1, ?2)",
        params![machine.name, params_json(machine)?],
    )
    .map_err(store_err)?;
    find_machine(conn, machine)?.ok_or_else(|| StoreError::Write(format!("machine {} missing after insert", machine.name)))
}

fn decode_status(s: &str) -> StoreResult<SampleStatus> {
    SampleStatus::from_name(s).ok_or_else(|| StoreError::Corrupt(format!("unknown sample status {s:?}")))
}

fn decode_value(json: Option<String>) -> StoreResult<Option<SampleValue>> {
    json.map(|j| serde_json::from_str(&j).map_err(|e| StoreError::Corrupt(format!("sample value {j:?}: {e}"))))
        .transpose()
}

fn encode_value(value: &Option<SampleValue>) -> StoreResult<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(|e| StoreError::Write(e.to_string())))
        .transpose()
}

impl HistoryLookup for SqliteStore {
    fn lookup_history(&self, machine: &MachineIdentity, test: &str, metric: &str) -> StoreResult<Vec<HistoryRecord>> {
        let conn = self.lock()?;
        let Some(machine_id) = find_machine(&conn, machine)? else {
            return Ok(vec![]);
        };
        let mut stmt = conn
            .prepare("SELECT order_key, status, value_json FROM samples WHERE machine_id=?1 AND test=?2 AND metric=?3")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![machine_id, test, metric], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, Option<String>>(2)?))
            })
            .map_err(store_err)?;

        let mut records = vec![];
        for row in rows {
            let (order, status, value) = row.map_err(store_err)?;
            records.push(HistoryRecord {
                machine: machine.clone(),
                test: test.to_string(),
                metric: metric.to_string(),
                order: OrderKey::from_str(order),
                status: decode_status(&status)?,
                value: decode_value(value)?,
            });
        }
        records.sort_by(|a, b| a.order.cmp(&b.order));
        Ok(records)
    }
}

impl Store for SqliteStore {
    fn lookup_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Submission>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT m.name, m.params_json, s.order_key, s.sample_count, s.imported_at
                 FROM submissions s JOIN machines m ON m.id = s.machine_id
                 WHERE s.fingerprint=?1",
                params![fingerprint.as_str()],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(store_err)?;

        let Some((name, params, order, count, imported_at)) = row else {
            return Ok(None);
        };
        let parameters: BTreeMap<String, String> = serde_json::from_str(&params)
            .map_err(|e| StoreError::Corrupt(format!("machine parameters {params:?}: {e}")))?;
        let imported_at = DateTime::parse_from_rfc3339(&imported_at)
            .map_err(|e| StoreError::Corrupt(format!("imported_at {imported_at:?}: {e}")))?
            .with_timezone(&Utc);
        Ok(Some(Submission {
            fingerprint: fingerprint.clone(),
            machine: MachineIdentity { name, parameters },
            order: order.map(OrderKey::from_str),
            sample_count: usize::try_from(count).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            imported_at,
        }))
    }

    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        let conn = self.lock()?;
        // Take the write lock up front; other writers wait on busy_timeout.
        conn.execute_batch("BEGIN IMMEDIATE").map_err(store_err)?;
        Ok(Box::new(SqliteTransaction { conn, finished: false }))
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn claim_fingerprint(&mut self, submission: &Submission) -> StoreResult<FingerprintClaim> {
        let machine_id = ensure_machine(&self.conn, &submission.machine)?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO submissions(fingerprint, machine_id, order_key, sample_count, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    submission.fingerprint.as_str(),
                    machine_id,
                    submission.order.as_ref().map(|o| o.as_str()),
                    submission.sample_count as i64,
                    submission.imported_at.to_rfc3339(),
                ],
            )
            .map_err(store_err)?;
        Ok(if inserted == 1 {
            FingerprintClaim::Claimed
        } else {
            FingerprintClaim::AlreadyPresent
        })
    }

    fn write_record(&mut self, record: &HistoryRecord) -> StoreResult<RecordWrite> {
        let machine_id = ensure_machine(&self.conn, &record.machine)?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO samples(machine_id, test, metric, order_key, status, value_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    machine_id,
                    record.test,
                    record.metric,
                    record.order.as_str(),
                    record.status.as_str(),
                    encode_value(&record.value)?,
                ],
            )
            .map_err(store_err)?;
        if inserted == 1 {
            return Ok(RecordWrite::Inserted);
        }

        let (status, value) = self
            .conn
            .query_row(
                "SELECT status, value_json FROM samples
                 WHERE machine_id=?1 AND test=?2 AND metric=?3 AND order_key=?4",
                params![machine_id, record.test, record.metric, record.order.as_str()],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?)),
            )
            .map_err(store_err)?;
        Ok(RecordWrite::Kept(HistoryRecord {
            machine: record.machine.clone(),
            test: record.test.clone(),
            metric: record.metric.clone(),
            order: record.order.clone(),
            status: decode_status(&status)?,
            value: decode_value(value)?,
        }))
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT").map_err(store_err)?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK").map_err(store_err)
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}
