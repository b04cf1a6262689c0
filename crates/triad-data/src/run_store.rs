use std::sync::Mutex;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use triad_models::{ConvergenceReason, ResearchRun};

use crate::error::DataError;

const RUNS_TABLE_DDL: &str = "
CREATE TABLE IF NOT EXISTS research_runs (
    run_id             TEXT PRIMARY KEY,
    started_at         TEXT NOT NULL,
    completed_at       TEXT,
    status             TEXT NOT NULL,
    convergence_reason TEXT,
    loops              INTEGER NOT NULL,
    total_tokens       INTEGER NOT NULL,
    payload_json       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_research_runs_started
    ON research_runs (started_at);
";

/// One row of the run listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub status: String,
    pub convergence_reason: Option<String>,
    pub loops: u32,
    pub total_tokens: u64,
}

/// Persistence consumer for finished research runs.
///
/// Downstream of the loop controller only: the controller hands the
/// completed (or failed) run to the caller, and the caller saves it here.
/// Nothing in the core reads this store mid-run.
pub struct RunStore {
    conn: Mutex<Connection>,
}

impl RunStore {
    pub fn open(path: &str) -> Result<Self, DataError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(RUNS_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(RUNS_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a run by id.
    pub fn save(&self, run: &ResearchRun) -> Result<(), DataError> {
        let payload = serde_json::to_string(run)?;
        let reason = run.convergence.as_ref().map(|c| reason_label(c.reason));
        let status = serde_json::to_value(run.status)?
            .as_str()
            .unwrap_or("running")
            .to_string();

        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Unavailable(format!("run store mutex poisoned: {e}")))?;
        conn.execute(
            "INSERT OR REPLACE INTO research_runs \
             (run_id, started_at, completed_at, status, convergence_reason, loops, total_tokens, payload_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                run.run_id,
                run.started_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
                status,
                reason,
                run.iterations.len() as i64,
                run.total_usage.total() as i64,
                payload,
            ],
        )?;
        Ok(())
    }

    /// Load a full run record by id.
    pub fn load(&self, run_id: &str) -> Result<Option<ResearchRun>, DataError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Unavailable(format!("run store mutex poisoned: {e}")))?;
        let mut stmt =
            conn.prepare_cached("SELECT payload_json FROM research_runs WHERE run_id = ?1")?;

        let result = stmt.query_row(rusqlite::params![run_id], |row| row.get::<_, String>(0));
        match result {
            Ok(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DataError::Sqlite(e)),
        }
    }

    /// Most recent runs, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RunSummary>, DataError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Unavailable(format!("run store mutex poisoned: {e}")))?;
        let mut stmt = conn.prepare_cached(
            "SELECT run_id, started_at, status, convergence_reason, loops, total_tokens \
             FROM research_runs ORDER BY started_at DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok(RunSummary {
                    run_id: row.get(0)?,
                    started_at: row.get(1)?,
                    status: row.get(2)?,
                    convergence_reason: row.get(3)?,
                    loops: row.get::<_, i64>(4)? as u32,
                    total_tokens: row.get::<_, i64>(5)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn reason_label(reason: ConvergenceReason) -> String {
    serde_json::to_value(reason)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
