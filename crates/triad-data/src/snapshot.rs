use chrono::Utc;
use rusqlite::Connection;
use triad_models::{SnapshotRow, SNAPSHOT_TABLE_DDL};

use crate::error::DataError;

/// Read-only SQLite accessor for the company snapshot database.
///
/// The snapshot database is written by the external ingest pipeline and read
/// by TRIAD. One row per ticker, holding the serialized `CompanyRecord`.
pub struct SnapshotReader {
    conn: Connection,
}

impl SnapshotReader {
    /// Open a read-only connection to the shared snapshot database.
    pub fn open(path: &str) -> Result<Self, DataError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database with the schema applied. The in-memory DB
    /// is writable so tests can seed data.
    pub fn open_in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SNAPSHOT_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get the snapshot row for a ticker. Returns None if absent or expired.
    pub fn get(&self, ticker: &str) -> Result<Option<SnapshotRow>, DataError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "SELECT ticker, record_json, quality, fetched_at, expires_at \
             FROM company_snapshots WHERE ticker = ?1 AND expires_at > ?2",
        )?;

        let result = stmt.query_row(rusqlite::params![ticker, now], |row| {
            Ok(SnapshotRow {
                ticker: row.get(0)?,
                record_json: row.get(1)?,
                quality: row.get(2)?,
                fetched_at: row.get(3)?,
                expires_at: row.get(4)?,
            })
        });

        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DataError::Sqlite(e)),
        }
    }

    /// All non-expired tickers currently in the snapshot store.
    pub fn tickers(&self) -> Result<Vec<String>, DataError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "SELECT ticker FROM company_snapshots WHERE expires_at > ?1 ORDER BY ticker",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![now], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    /// Insert a snapshot row. In production the ingest pipeline writes
    /// directly to SQLite; this method exists for tests and tooling.
    pub fn insert(&self, row: &SnapshotRow) -> Result<(), DataError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO company_snapshots \
             (ticker, record_json, quality, fetched_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                row.ticker,
                row.record_json,
                row.quality,
                row.fetched_at,
                row.expires_at,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use triad_models::CompanyRecord;

    fn make_row(ticker: &str, ttl_seconds: i64) -> SnapshotRow {
        let now = Utc::now();
        let record = CompanyRecord::placeholder(ticker, "seed");
        SnapshotRow {
            ticker: ticker.to_string(),
            record_json: serde_json::to_string(&record).unwrap(),
            quality: "full".to_string(),
            fetched_at: now.to_rfc3339(),
            expires_at: (now + Duration::seconds(ttl_seconds)).to_rfc3339(),
        }
    }

    #[test]
    fn get_existing_ticker() {
        let reader = SnapshotReader::open_in_memory().unwrap();
        reader.insert(&make_row("NVDA", 300)).unwrap();

        let result = reader.get("NVDA").unwrap();
        assert!(result.is_some());
        assert!(result.unwrap().record_json.contains("NVDA"));
    }

    #[test]
    fn get_missing_ticker() {
        let reader = SnapshotReader::open_in_memory().unwrap();
        assert!(reader.get("ZZZZ").unwrap().is_none());
    }

    #[test]
    fn get_expired_ticker() {
        let reader = SnapshotReader::open_in_memory().unwrap();
        reader.insert(&make_row("NVDA", -10)).unwrap();
        assert!(reader.get("NVDA").unwrap().is_none());
    }

    #[test]
    fn tickers_lists_live_rows() {
        let reader = SnapshotReader::open_in_memory().unwrap();
        reader.insert(&make_row("NVDA", 300)).unwrap();
        reader.insert(&make_row("AMD", 300)).unwrap();
        reader.insert(&make_row("OLD", -10)).unwrap();

        assert_eq!(reader.tickers().unwrap(), vec!["AMD", "NVDA"]);
    }
}
