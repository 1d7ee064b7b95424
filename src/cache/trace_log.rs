use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{PromptError, Result};

const TRACES_DB: &str = "traces.db";
const TRACE_SCHEME: &str = "trace://";

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    pub id: String,
    pub project: String,
    pub slug: String,
    pub input: Value,
    /// Output on success, `None` when the invocation failed
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl TraceRecord {
    pub fn url(&self) -> String {
        format!("{TRACE_SCHEME}{}", self.id)
    }
}

/// SQLite log correlating each invocation's input, output and timing
pub struct TraceLog {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    path: PathBuf,
}

impl TraceLog {
    /// Open or create the trace database
    pub fn open(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(TRACES_DB);
        let conn = Connection::open(&path)?;
        Self::with_connection(conn, path)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS traces (
                id TEXT PRIMARY KEY,
                project TEXT NOT NULL,
                slug TEXT NOT NULL,
                input TEXT NOT NULL,
                output TEXT,
                error TEXT,
                duration_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_traces_slug ON traces(project, slug)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PromptError::TraceLog("trace log lock poisoned".to_string()))
    }

    /// Record an invocation and return its trace record
    pub fn record(
        &self,
        project: &str,
        slug: &str,
        input: &Value,
        outcome: std::result::Result<&Value, &str>,
        duration_ms: u64,
    ) -> Result<TraceRecord> {
        let record = TraceRecord {
            id: Uuid::new_v4().to_string(),
            project: project.to_string(),
            slug: slug.to_string(),
            input: input.clone(),
            output: outcome.ok().cloned(),
            error: outcome.err().map(str::to_string),
            duration_ms,
            created_at: Utc::now(),
        };

        let output = record.output.as_ref().map(serde_json::to_string).transpose()?;
        self.conn()?.execute(
            "INSERT INTO traces (id, project, slug, input, output, error, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.project,
                record.slug,
                serde_json::to_string(&record.input)?,
                output,
                record.error,
                record.duration_ms as i64,
                record.created_at.to_rfc3339(),
            ],
        )?;

        Ok(record)
    }

    /// Look up a trace by id or `trace://` url
    pub fn get(&self, id_or_url: &str) -> Result<Option<TraceRecord>> {
        let id = id_or_url.strip_prefix(TRACE_SCHEME).unwrap_or(id_or_url);
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, project, slug, input, output, error, duration_ms, created_at
                 FROM traces WHERE id = ?1",
                [id],
                read_row,
            )
            .optional()?;
        row.map(parse_row).transpose()
    }

    /// Most recent traces first, optionally for one slug
    pub fn recent(&self, project: &str, slug: Option<&str>, limit: usize) -> Result<Vec<TraceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project, slug, input, output, error, duration_ms, created_at
             FROM traces
             WHERE project = ?1 AND (?2 IS NULL OR slug = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![project, slug, limit as i64], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(parse_row).collect()
    }
}

type RawRow = (String, String, String, String, Option<String>, Option<String>, i64, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parse_row(raw: RawRow) -> Result<TraceRecord> {
    let (id, project, slug, input, output, error, duration_ms, created_at) = raw;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| PromptError::TraceLog(format!("bad timestamp on trace {id}: {e}")))?
        .with_timezone(&Utc);
    Ok(TraceRecord {
        input: serde_json::from_str(&input)?,
        output: output
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()?,
        id,
        project,
        slug,
        error,
        duration_ms: duration_ms.max(0) as u64,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_get_by_url() {
        let log = TraceLog::in_memory().unwrap();
        let output = json!("hello");
        let record = log
            .record("p", "greet", &json!({"q": "hi"}), Ok(&output), 42)
            .unwrap();

        let fetched = log.get(&record.url()).unwrap().unwrap();
        assert_eq!(fetched.slug, "greet");
        assert_eq!(fetched.input, json!({"q": "hi"}));
        assert_eq!(fetched.output, Some(json!("hello")));
        assert_eq!(fetched.duration_ms, 42);
        assert!(log.get("trace://missing").unwrap().is_none());
    }

    #[test]
    fn test_failed_invocation_keeps_error() {
        let log = TraceLog::in_memory().unwrap();
        let record = log
            .record("p", "greet", &json!({}), Err("timed out"), 7)
            .unwrap();
        let fetched = log.get(&record.id).unwrap().unwrap();
        assert_eq!(fetched.output, None);
        assert_eq!(fetched.error.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_recent_filters_by_project_and_slug() {
        let tmp = TempDir::new().unwrap();
        let log = TraceLog::open(tmp.path()).unwrap();
        let out = json!(1);
        log.record("p", "a", &json!({}), Ok(&out), 1).unwrap();
        log.record("p", "b", &json!({}), Ok(&out), 1).unwrap();
        log.record("q", "a", &json!({}), Ok(&out), 1).unwrap();

        assert_eq!(log.recent("p", None, 10).unwrap().len(), 2);
        let only_a = log.recent("p", Some("a"), 10).unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].slug, "a");
        assert_eq!(log.recent("p", None, 1).unwrap().len(), 1);
    }
}
