//! Analytical store for log entries and patterns.
//!
//! Backed by an embedded DuckDB database file. Entries carry a JSON `labels`
//! object linking them to the pattern they instantiate; patterns are keyed
//! by their stable UUID. Both tables are created idempotently at init.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::types::ToSql;
use duckdb::Connection;

use crate::error::LappError;

/// A stored log entry. `labels` is empty when no template matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub line_number: u64,
    pub end_line_number: u64,
    pub timestamp: DateTime<Utc>,
    pub raw: String,
    pub labels: HashMap<String, String>,
}

/// A stored pattern with optional semantic labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPattern {
    /// UUID string, primary key.
    pub pattern_id: String,
    pub pattern_type: String,
    pub raw_pattern: String,
    pub semantic_id: Option<String>,
    pub description: Option<String>,
}

/// A pattern joined with its stored-entry count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSummary {
    pub pattern_id: String,
    pub pattern: String,
    pub count: u64,
    pub pattern_type: String,
    pub semantic_id: String,
    pub description: String,
}

/// Filters for querying log entries.
#[derive(Debug, Clone, Default)]
pub struct QueryOpts {
    /// Semantic id the entry's `pattern` label must equal.
    pub pattern: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// DuckDB-backed store. The connection is owned exclusively; the pipeline is
/// the single writer during an ingest.
pub struct DuckDbStore {
    conn: Connection,
}

impl DuckDbStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LappError> {
        let conn = Connection::open(path).map_err(LappError::store("open"))?;
        Ok(Self { conn })
    }

    /// Open a transient in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, LappError> {
        let conn = Connection::open_in_memory().map_err(LappError::store("open"))?;
        Ok(Self { conn })
    }

    /// Create the `log_entries` and `patterns` tables if they do not exist.
    pub fn init(&self) -> Result<(), LappError> {
        self.conn
            .execute_batch(
                "CREATE SEQUENCE IF NOT EXISTS log_entries_id_seq START 1;
                 CREATE TABLE IF NOT EXISTS log_entries (
                     id BIGINT DEFAULT nextval('log_entries_id_seq'),
                     line_number INTEGER,
                     end_line_number INTEGER,
                     timestamp TIMESTAMP,
                     raw VARCHAR,
                     labels JSON
                 );
                 CREATE TABLE IF NOT EXISTS patterns (
                     pattern_id VARCHAR PRIMARY KEY,
                     pattern_type VARCHAR,
                     raw_pattern VARCHAR,
                     semantic_id VARCHAR,
                     description VARCHAR
                 );",
            )
            .map_err(LappError::store("init"))
    }

    /// Store multiple log entries in a single transaction.
    pub fn insert_log_batch(&mut self, entries: &[LogEntry]) -> Result<(), LappError> {
        let tx = self.conn.transaction().map_err(LappError::store("begin"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO log_entries (line_number, end_line_number, timestamp, raw, labels)
                     VALUES (?, ?, ?, ?, ?::JSON)",
                )
                .map_err(LappError::store("prepare"))?;

            for entry in entries {
                let labels_json = serde_json::to_string(&entry.labels)?;
                stmt.execute(duckdb::params![
                    entry.line_number as i64,
                    entry.end_line_number as i64,
                    entry.timestamp.naive_utc(),
                    entry.raw,
                    labels_json,
                ])
                .map_err(LappError::store("insert log"))?;
            }
        }
        tx.commit().map_err(LappError::store("commit"))
    }

    /// Upsert patterns, keyed on `pattern_id`. A conflict updates the
    /// pattern's type, raw pattern, and semantic columns from the incoming
    /// row.
    pub fn insert_patterns(&mut self, patterns: &[StoredPattern]) -> Result<(), LappError> {
        let tx = self.conn.transaction().map_err(LappError::store("begin"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO patterns (pattern_id, pattern_type, raw_pattern, semantic_id, description)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT (pattern_id) DO UPDATE SET
                         pattern_type = excluded.pattern_type,
                         raw_pattern  = excluded.raw_pattern,
                         semantic_id  = excluded.semantic_id,
                         description  = excluded.description",
                )
                .map_err(LappError::store("prepare"))?;

            for p in patterns {
                stmt.execute(duckdb::params![
                    p.pattern_id,
                    p.pattern_type,
                    p.raw_pattern,
                    p.semantic_id,
                    p.description,
                ])
                .map_err(LappError::store("insert pattern"))?;
            }
        }
        tx.commit().map_err(LappError::store("commit"))
    }

    /// Entries whose `pattern` label equals the given semantic id.
    pub fn query_by_pattern(&self, semantic_id: &str) -> Result<Vec<LogEntry>, LappError> {
        self.select_entries(
            "SELECT id, line_number, end_line_number, timestamp, raw, CAST(labels AS VARCHAR)
             FROM log_entries
             WHERE json_extract_string(labels, '$.pattern') = ?
             ORDER BY line_number",
            &[&semantic_id],
        )
    }

    /// Entries matching the given filters, ordered by line number.
    pub fn query_logs(&self, opts: &QueryOpts) -> Result<Vec<LogEntry>, LappError> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<&dyn ToSql> = Vec::new();

        if let Some(pattern) = &opts.pattern {
            conditions.push("json_extract_string(labels, '$.pattern') = ?");
            params.push(pattern);
        }
        let from = opts.from.map(|t| t.naive_utc());
        if let Some(from) = &from {
            conditions.push("timestamp >= ?");
            params.push(from);
        }
        let to = opts.to.map(|t| t.naive_utc());
        if let Some(to) = &to {
            conditions.push("timestamp <= ?");
            params.push(to);
        }

        let mut sql = String::from(
            "SELECT id, line_number, end_line_number, timestamp, raw, CAST(labels AS VARCHAR) FROM log_entries",
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY line_number");
        if let Some(limit) = opts.limit {
            // LIMIT is interpolated rather than bound; it is an integer we
            // produced, not user text.
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.select_entries(&sql, &params)
    }

    /// All patterns that have stored entries, with their counts, ordered by
    /// count descending.
    pub fn pattern_summaries(&self) -> Result<Vec<PatternSummary>, LappError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.pattern_id, COALESCE(p.raw_pattern, ''), COUNT(*) AS cnt,
                        COALESCE(p.pattern_type, ''), COALESCE(p.semantic_id, ''), COALESCE(p.description, '')
                 FROM log_entries le
                 INNER JOIN patterns p
                     ON json_extract_string(le.labels, '$.pattern_id') = p.pattern_id
                 GROUP BY p.pattern_id, p.raw_pattern, p.pattern_type, p.semantic_id, p.description
                 ORDER BY cnt DESC",
            )
            .map_err(LappError::store("prepare summaries"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(PatternSummary {
                    pattern_id: row.get(0)?,
                    pattern: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                    pattern_type: row.get(3)?,
                    semantic_id: row.get(4)?,
                    description: row.get(5)?,
                })
            })
            .map_err(LappError::store("query summaries"))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(LappError::store("scan summary"))
    }

    /// Number of stored entries per semantic id.
    pub fn pattern_counts(&self) -> Result<HashMap<String, u64>, LappError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT json_extract_string(labels, '$.pattern'), COUNT(*)
                 FROM log_entries
                 WHERE json_extract_string(labels, '$.pattern') IS NOT NULL
                   AND json_extract_string(labels, '$.pattern') != ''
                 GROUP BY json_extract_string(labels, '$.pattern')",
            )
            .map_err(LappError::store("prepare counts"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(LappError::store("query counts"))?;

        rows.collect::<Result<HashMap<_, _>, _>>()
            .map_err(LappError::store("scan count"))
    }

    fn select_entries(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<LogEntry>, LappError> {
        let mut stmt = self.conn.prepare(sql).map_err(LappError::store("prepare"))?;

        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, NaiveDateTime>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(LappError::store("query logs"))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, line_number, end_line_number, timestamp, raw, labels_json) =
                row.map_err(LappError::store("scan entry"))?;
            let labels: HashMap<String, String> = serde_json::from_str(&labels_json)?;
            entries.push(LogEntry {
                id,
                line_number: line_number as u64,
                end_line_number: end_line_number as u64,
                timestamp: DateTime::from_naive_utc_and_offset(timestamp, Utc),
                raw,
                labels,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn entry(line: u64, raw: &str, labels: &[(&str, &str)]) -> LogEntry {
        LogEntry {
            id: 0,
            line_number: line,
            end_line_number: line,
            timestamp: Utc::now(),
            raw: raw.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn labeled_store() -> DuckDbStore {
        let mut store = DuckDbStore::open_in_memory().unwrap();
        store.init().unwrap();

        store
            .insert_patterns(&[StoredPattern {
                pattern_id: "uuid-1".to_string(),
                pattern_type: "drain".to_string(),
                raw_pattern: "server started on port <*>".to_string(),
                semantic_id: Some("server-startup".to_string()),
                description: Some("Server starting on a port".to_string()),
            }])
            .unwrap();

        store
            .insert_log_batch(&[
                entry(
                    1,
                    "server started on port 8080",
                    &[("pattern", "server-startup"), ("pattern_id", "uuid-1")],
                ),
                entry(2, "something unmatched", &[]),
                entry(
                    3,
                    "server started on port 9090",
                    &[("pattern", "server-startup"), ("pattern_id", "uuid-1")],
                ),
            ])
            .unwrap();

        store
    }

    #[test]
    fn init_is_idempotent() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.init().unwrap();
        store.init().unwrap();
    }

    #[test]
    fn query_by_pattern_returns_exactly_the_labeled_entries() {
        let store = labeled_store();

        let entries = store.query_by_pattern("server-startup").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].line_number, 1);
        assert_eq!(entries[1].line_number, 3);
        for e in &entries {
            assert_eq!(e.labels.get("pattern").unwrap(), "server-startup");
            assert_eq!(e.labels.get("pattern_id").unwrap(), "uuid-1");
        }

        assert!(store.query_by_pattern("no-such-id").unwrap().is_empty());
    }

    #[test]
    fn unmatched_entries_have_empty_labels() {
        let store = labeled_store();
        let all = store.query_logs(&QueryOpts::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[1].labels.is_empty());
    }

    #[test]
    fn query_logs_filters_and_orders() {
        let store = labeled_store();

        let by_pattern = store
            .query_logs(&QueryOpts {
                pattern: Some("server-startup".to_string()),
                ..QueryOpts::default()
            })
            .unwrap();
        assert_eq!(by_pattern.len(), 2);
        assert!(by_pattern[0].line_number < by_pattern[1].line_number);

        let limited = store
            .query_logs(&QueryOpts {
                limit: Some(1),
                ..QueryOpts::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].line_number, 1);

        let future = Utc::now() + TimeDelta::hours(1);
        let none = store
            .query_logs(&QueryOpts {
                from: Some(future),
                ..QueryOpts::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn pattern_summaries_join_counts() {
        let store = labeled_store();

        let summaries = store.pattern_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].pattern_id, "uuid-1");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].pattern_type, "drain");
        assert_eq!(summaries[0].semantic_id, "server-startup");
    }

    #[test]
    fn pattern_counts_group_by_semantic_id() {
        let store = labeled_store();
        let counts = store.pattern_counts().unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["server-startup"], 2);
    }

    #[test]
    fn insert_patterns_upserts_on_conflict() {
        let mut store = DuckDbStore::open_in_memory().unwrap();
        store.init().unwrap();

        let original = StoredPattern {
            pattern_id: "uuid-9".to_string(),
            pattern_type: "drain".to_string(),
            raw_pattern: "old <*>".to_string(),
            semantic_id: None,
            description: None,
        };
        store.insert_patterns(&[original]).unwrap();

        let updated = StoredPattern {
            pattern_id: "uuid-9".to_string(),
            pattern_type: "drain".to_string(),
            raw_pattern: "new <*>".to_string(),
            semantic_id: Some("renamed".to_string()),
            description: Some("updated".to_string()),
        };
        store.insert_patterns(&[updated.clone()]).unwrap();

        store
            .insert_log_batch(&[entry(
                1,
                "new thing",
                &[("pattern", "renamed"), ("pattern_id", "uuid-9")],
            )])
            .unwrap();

        let summaries = store.pattern_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].pattern, "new <*>");
        assert_eq!(summaries[0].semantic_id, "renamed");
    }

    #[test]
    fn database_file_round_trips_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lapp.duckdb");

        {
            let mut store = DuckDbStore::open(&path).unwrap();
            store.init().unwrap();
            store
                .insert_log_batch(&[entry(1, "persisted line", &[])])
                .unwrap();
        }

        let store = DuckDbStore::open(&path).unwrap();
        let all = store.query_logs(&QueryOpts::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].raw, "persisted line");
    }
}
