// SQLite-backed run ledger and lead store.
//
// Runs are append-only; leads are keyed by their stable identifier so the
// dashboard never shows duplicates. Errors surface to the caller; a run
// must notice when its ledger is gone, not paper over it.
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::errors::ScrapeError;
use crate::types::{Lead, RunStatus};

/// One extraction attempt as recorded in the ledger.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub timestamp: String,
    pub connect_phase: String,
    pub extract_phase: String,
    pub screenshot: Option<String>,
    pub status: String,
    pub details: Option<String>,
}

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self, ScrapeError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory ledger, used by tests.
    pub fn open_in_memory() -> Result<Self, ScrapeError> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    fn create_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL,
                connect_phase TEXT NOT NULL DEFAULT '',
                extract_phase TEXT NOT NULL DEFAULT '',
                screenshot TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                details TEXT
            );

            CREATE TABLE IF NOT EXISTS leads (
                id INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                key TEXT NOT NULL UNIQUE,
                fetched_at TEXT NOT NULL,
                url TEXT NOT NULL,
                row_index INTEGER NOT NULL,
                row_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON runs(timestamp);
        "#,
        )
    }

    /// Open a new run in `pending` state and return its id.
    pub fn begin_run(&self) -> Result<i64, ScrapeError> {
        self.conn.execute(
            "INSERT INTO runs (timestamp, connect_phase, extract_phase, status)
             VALUES (?1, 'starting', 'waiting', ?2)",
            params![Utc::now().to_rfc3339(), RunStatus::Pending.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_connect_phase(&self, run_id: i64, phase: &str) -> Result<(), ScrapeError> {
        self.conn.execute(
            "UPDATE runs SET connect_phase = ?2 WHERE id = ?1",
            params![run_id, phase],
        )?;
        Ok(())
    }

    pub fn set_extract_phase(&self, run_id: i64, phase: &str) -> Result<(), ScrapeError> {
        self.conn.execute(
            "UPDATE runs SET extract_phase = ?2 WHERE id = ?1",
            params![run_id, phase],
        )?;
        Ok(())
    }

    /// Attach the diagnostic snapshot reference for this run.
    pub fn set_screenshot(&self, run_id: i64, screenshot: &str) -> Result<(), ScrapeError> {
        self.conn.execute(
            "UPDATE runs SET screenshot = ?2 WHERE id = ?1",
            params![run_id, screenshot],
        )?;
        Ok(())
    }

    /// Move a run to its terminal status. Called exactly once per run.
    pub fn finish_run(&self, run_id: i64, status: RunStatus, details: Option<&str>) -> Result<(), ScrapeError> {
        self.conn.execute(
            "UPDATE runs SET status = ?2, details = ?3 WHERE id = ?1",
            params![run_id, status.as_str(), details],
        )?;
        Ok(())
    }

    /// Persist leads for dashboard display. Keys already present are left
    /// untouched. Returns how many rows were actually inserted.
    pub fn store_leads(&self, leads: &[Lead]) -> Result<usize, ScrapeError> {
        let mut stored = 0;
        for lead in leads {
            let row_json = serde_json::to_string(&lead.row).unwrap_or_default();
            stored += self.conn.execute(
                r#"INSERT INTO leads (source, key, fetched_at, url, row_index, row_json)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(key) DO NOTHING"#,
                params![
                    lead.source,
                    lead.key,
                    lead.fetched_at.to_rfc3339(),
                    lead.url,
                    lead.row_index as i64,
                    row_json
                ],
            )?;
        }
        Ok(stored)
    }

    /// Most recent runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, ScrapeError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, connect_phase, extract_phase, screenshot, status, details
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RunRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                connect_phase: row.get(2)?,
                extract_phase: row.get(3)?,
                screenshot: row.get(4)?,
                status: row.get(5)?,
                details: row.get(6)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn lead_count(&self) -> Result<i64, ScrapeError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM leads", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractedRow;

    fn lead(key: &str) -> Lead {
        let mut row = ExtractedRow::new();
        row.insert("nom".to_string(), "Dupont".to_string());
        Lead {
            source: "portal.example.com".to_string(),
            key: key.to_string(),
            fetched_at: Utc::now(),
            url: "https://partners.example.com/home/leads".to_string(),
            row_index: 0,
            row,
        }
    }

    #[test]
    fn run_lifecycle() {
        let ledger = Ledger::open_in_memory().unwrap();
        let run_id = ledger.begin_run().unwrap();

        ledger.set_connect_phase(run_id, "navigating").unwrap();
        ledger.set_extract_phase(run_id, "extracting rows").unwrap();
        ledger.set_screenshot(run_id, "run_1_page.png").unwrap();
        ledger.finish_run(run_id, RunStatus::Success, Some("2 leads, 1 new")).unwrap();

        let runs = ledger.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        let record = &runs[0];
        assert_eq!(record.id, run_id);
        assert_eq!(record.status, "success");
        assert_eq!(record.connect_phase, "navigating");
        assert_eq!(record.extract_phase, "extracting rows");
        assert_eq!(record.screenshot.as_deref(), Some("run_1_page.png"));
        assert_eq!(record.details.as_deref(), Some("2 leads, 1 new"));
    }

    #[test]
    fn failed_run_keeps_details() {
        let ledger = Ledger::open_in_memory().unwrap();
        let run_id = ledger.begin_run().unwrap();
        ledger.finish_run(run_id, RunStatus::Failed, Some("navigation failed: timeout")).unwrap();

        let record = &ledger.recent_runs(1).unwrap()[0];
        assert_eq!(record.status, "failed");
        assert!(record.details.as_deref().unwrap().contains("timeout"));
    }

    #[test]
    fn leads_dedupe_by_key() {
        let ledger = Ledger::open_in_memory().unwrap();
        assert_eq!(ledger.store_leads(&[lead("INS42"), lead("INS43")]).unwrap(), 2);
        assert_eq!(ledger.store_leads(&[lead("INS42")]).unwrap(), 0);
        assert_eq!(ledger.lead_count().unwrap(), 2);
    }

    #[test]
    fn recent_runs_newest_first() {
        let ledger = Ledger::open_in_memory().unwrap();
        let first = ledger.begin_run().unwrap();
        let second = ledger.begin_run().unwrap();
        let runs = ledger.recent_runs(10).unwrap();
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[1].id, first);
    }
}
