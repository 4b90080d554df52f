//! Per-run ledgers of step outcomes

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare ledger at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger entry {step_key} is not valid: {source}")]
    Corrupt {
        step_key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("ledger lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepState {
    Pending,
    Completed(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub run_id: String,
    pub step_key: String,
    pub state: StepState,
}

impl StepRecord {
    pub fn result(&self) -> Option<&Value> {
        match &self.state {
            StepState::Completed(value) => Some(value),
            StepState::Pending => None,
        }
    }
}

/// Storage for step records, keyed by `(run_id, step_key)`
///
/// A completed record is written at most once and never overwritten.
pub trait StepLedger: Send + Sync {
    fn get(&self, run_id: &str, step_key: &str) -> Result<Option<StepRecord>, LedgerError>;

    /// Record that a step is about to run; a no-op if a record exists
    fn mark_pending(&self, run_id: &str, step_key: &str) -> Result<(), LedgerError>;

    /// Record a step's result
    ///
    /// Returns the value that is now stored: `result` on first completion,
    /// or the earlier value if the step was already completed.
    fn complete(&self, run_id: &str, step_key: &str, result: Value) -> Result<Value, LedgerError>;

    /// All records for a run, in insertion order
    fn records(&self, run_id: &str) -> Result<Vec<StepRecord>, LedgerError>;
}

/// Process-local ledger
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    runs: Mutex<HashMap<String, Vec<StepRecord>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StepLedger for InMemoryLedger {
    fn get(&self, run_id: &str, step_key: &str) -> Result<Option<StepRecord>, LedgerError> {
        let runs = self.runs.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(runs
            .get(run_id)
            .and_then(|records| records.iter().find(|r| r.step_key == step_key))
            .cloned())
    }

    fn mark_pending(&self, run_id: &str, step_key: &str) -> Result<(), LedgerError> {
        let mut runs = self.runs.lock().map_err(|_| LedgerError::Poisoned)?;
        let records = runs.entry(run_id.to_string()).or_default();
        if !records.iter().any(|r| r.step_key == step_key) {
            records.push(StepRecord {
                run_id: run_id.to_string(),
                step_key: step_key.to_string(),
                state: StepState::Pending,
            });
        }
        Ok(())
    }

    fn complete(&self, run_id: &str, step_key: &str, result: Value) -> Result<Value, LedgerError> {
        let mut runs = self.runs.lock().map_err(|_| LedgerError::Poisoned)?;
        let records = runs.entry(run_id.to_string()).or_default();

        match records.iter_mut().find(|r| r.step_key == step_key) {
            Some(StepRecord {
                state: StepState::Completed(existing),
                ..
            }) => Ok(existing.clone()),
            Some(record) => {
                record.state = StepState::Completed(result.clone());
                Ok(result)
            }
            None => {
                records.push(StepRecord {
                    run_id: run_id.to_string(),
                    step_key: step_key.to_string(),
                    state: StepState::Completed(result.clone()),
                });
                Ok(result)
            }
        }
    }

    fn records(&self, run_id: &str) -> Result<Vec<StepRecord>, LedgerError> {
        let runs = self.runs.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(runs.get(run_id).cloned().unwrap_or_default())
    }
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS step_records (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        step_key TEXT NOT NULL,
        status TEXT NOT NULL,
        result TEXT,
        created_at TEXT NOT NULL,
        completed_at TEXT,
        UNIQUE(run_id, step_key)
    );

    CREATE INDEX IF NOT EXISTS idx_step_records_run ON step_records(run_id);
"#;

/// SQLite-backed ledger that survives process restarts
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open or create a ledger database
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn decode_row(
    run_id: String,
    step_key: String,
    status: String,
    result: Option<String>,
) -> Result<StepRecord, LedgerError> {
    let state = match (status.as_str(), result) {
        ("completed", Some(raw)) => {
            let value = serde_json::from_str(&raw).map_err(|source| LedgerError::Corrupt {
                step_key: step_key.clone(),
                source,
            })?;
            StepState::Completed(value)
        }
        _ => StepState::Pending,
    };
    Ok(StepRecord {
        run_id,
        step_key,
        state,
    })
}

impl StepLedger for SqliteLedger {
    fn get(&self, run_id: &str, step_key: &str) -> Result<Option<StepRecord>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let row = conn
            .query_row(
                "SELECT status, result FROM step_records WHERE run_id = ?1 AND step_key = ?2",
                [run_id, step_key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        row.map(|(status, result)| {
            decode_row(run_id.to_string(), step_key.to_string(), status, result)
        })
        .transpose()
    }

    fn mark_pending(&self, run_id: &str, step_key: &str) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        conn.execute(
            "INSERT INTO step_records (run_id, step_key, status, created_at)
             VALUES (?1, ?2, 'pending', ?3)
             ON CONFLICT(run_id, step_key) DO NOTHING",
            (run_id, step_key, chrono::Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    fn complete(&self, run_id: &str, step_key: &str, result: Value) -> Result<Value, LedgerError> {
        let raw = serde_json::to_string(&result).map_err(|source| LedgerError::Corrupt {
            step_key: step_key.to_string(),
            source,
        })?;
        let now = chrono::Utc::now().to_rfc3339();

        let mut conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO step_records (run_id, step_key, status, result, created_at, completed_at)
             VALUES (?1, ?2, 'completed', ?3, ?4, ?4)
             ON CONFLICT(run_id, step_key) DO UPDATE SET
                status = 'completed',
                result = excluded.result,
                completed_at = excluded.completed_at
             WHERE step_records.status = 'pending'",
            (run_id, step_key, &raw, &now),
        )?;
        let stored: String = tx.query_row(
            "SELECT result FROM step_records WHERE run_id = ?1 AND step_key = ?2",
            [run_id, step_key],
            |row| row.get(0),
        )?;
        tx.commit()?;

        if stored == raw {
            return Ok(result);
        }
        serde_json::from_str(&stored).map_err(|source| LedgerError::Corrupt {
            step_key: step_key.to_string(),
            source,
        })
    }

    fn records(&self, run_id: &str) -> Result<Vec<StepRecord>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT step_key, status, result FROM step_records WHERE run_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(step_key, status, result)| {
                decode_row(run_id.to_string(), step_key, status, result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn exercise_ledger(ledger: &dyn StepLedger) {
        assert!(ledger.get("run-1", "a").unwrap().is_none());

        ledger.mark_pending("run-1", "a").unwrap();
        let record = ledger.get("run-1", "a").unwrap().unwrap();
        assert_eq!(record.state, StepState::Pending);

        let stored = ledger.complete("run-1", "a", json!({"text": "first"})).unwrap();
        assert_eq!(stored, json!({"text": "first"}));

        // A second completion never overwrites the first
        let stored = ledger.complete("run-1", "a", json!({"text": "second"})).unwrap();
        assert_eq!(stored, json!({"text": "first"}));

        // Pending after completed does not reset the record
        ledger.mark_pending("run-1", "a").unwrap();
        let record = ledger.get("run-1", "a").unwrap().unwrap();
        assert_eq!(record.result(), Some(&json!({"text": "first"})));

        // Runs are isolated
        assert!(ledger.get("run-2", "a").unwrap().is_none());

        ledger.mark_pending("run-1", "b").unwrap();
        let keys: Vec<_> = ledger
            .records("run-1")
            .unwrap()
            .into_iter()
            .map(|r| r.step_key)
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_in_memory_ledger() {
        exercise_ledger(&InMemoryLedger::new());
    }

    #[test]
    fn test_sqlite_ledger() {
        exercise_ledger(&SqliteLedger::open_in_memory().unwrap());
    }

    #[test]
    fn test_complete_without_pending() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.complete("r", "k", json!(null)).unwrap();
        assert_eq!(ledger.get("r", "k").unwrap().unwrap().result(), Some(&json!(null)));
    }

    #[test]
    fn test_sqlite_ledger_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("ledger.db");

        {
            let ledger = SqliteLedger::open(&path).unwrap();
            ledger.mark_pending("run-1", "n1:trigger").unwrap();
            ledger.complete("run-1", "n1:trigger", json!([1, 2, 3])).unwrap();
            ledger.mark_pending("run-1", "n2:generate-text").unwrap();
        }

        let ledger = SqliteLedger::open(&path).unwrap();
        let records = ledger.records("run-1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].result(), Some(&json!([1, 2, 3])));
        assert_eq!(records[1].state, StepState::Pending);
    }
}
