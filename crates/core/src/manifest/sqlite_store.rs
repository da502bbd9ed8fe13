//! SQLite-backed manifest store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    FileRecord, FileStatus, ManifestError, ManifestFilter, ManifestPatch, ManifestStore,
    NewFileRecord, QueryLogEntry, QueryLogRecord, QueryOutcome, StatusCount,
};

const RECORD_COLUMNS: &str = "file_id, observed_at, source_tag, product_type, size_bytes, \
     status, download_attempt, processing_attempt, error_message, skip_reason, \
     raw_path, output_path, quality_score, missing_data_pct, saturation_pct, \
     download_duration_secs, processing_duration_secs, \
     queued_at, download_started_at, downloaded_at, processing_started_at, processed_at, updated_at";

/// SQLite-backed manifest store.
pub struct SqliteManifestStore {
    conn: Mutex<Connection>,
}

impl SqliteManifestStore {
    /// Create a new SQLite manifest store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, ManifestError> {
        let conn = Connection::open(path).map_err(|e| ManifestError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite manifest store (useful for testing).
    pub fn in_memory() -> Result<Self, ManifestError> {
        let conn =
            Connection::open_in_memory().map_err(|e| ManifestError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ManifestError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS file_manifest (
                file_id TEXT PRIMARY KEY,
                observed_at TEXT NOT NULL,
                source_tag TEXT NOT NULL,
                product_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                download_attempt INTEGER NOT NULL DEFAULT 0,
                processing_attempt INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                skip_reason TEXT,
                raw_path TEXT,
                output_path TEXT,
                quality_score REAL,
                missing_data_pct REAL,
                saturation_pct REAL,
                download_duration_secs REAL,
                processing_duration_secs REAL,
                queued_at TEXT NOT NULL,
                download_started_at TEXT,
                downloaded_at TEXT,
                processing_started_at TEXT,
                processed_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_manifest_status ON file_manifest(status);
            CREATE INDEX IF NOT EXISTS idx_manifest_observed_at ON file_manifest(observed_at);

            CREATE TABLE IF NOT EXISTS query_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                logged_at TEXT NOT NULL,
                window_start TEXT NOT NULL,
                window_end TEXT NOT NULL,
                files_found INTEGER NOT NULL,
                files_new INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                error_message TEXT
            );
            "#,
        )
        .map_err(|e| ManifestError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &ManifestFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref source_tag) = filter.source_tag {
            conditions.push("source_tag = ?");
            params.push(Box::new(source_tag.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn parse_opt_ts(value: Option<String>) -> Option<DateTime<Utc>> {
        value.map(|v| Self::parse_ts(&v))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
        let status_str: String = row.get(5)?;

        Ok(FileRecord {
            file_id: row.get(0)?,
            observed_at: Self::parse_ts(&row.get::<_, String>(1)?),
            source_tag: row.get(2)?,
            product_type: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)? as u64,
            status: FileStatus::parse(&status_str).unwrap_or(FileStatus::Queued),
            download_attempt: row.get(6)?,
            processing_attempt: row.get(7)?,
            error_message: row.get(8)?,
            skip_reason: row.get(9)?,
            raw_path: row.get(10)?,
            output_path: row.get(11)?,
            quality_score: row.get(12)?,
            missing_data_pct: row.get(13)?,
            saturation_pct: row.get(14)?,
            download_duration_secs: row.get(15)?,
            processing_duration_secs: row.get(16)?,
            queued_at: Self::parse_ts(&row.get::<_, String>(17)?),
            download_started_at: Self::parse_opt_ts(row.get(18)?),
            downloaded_at: Self::parse_opt_ts(row.get(19)?),
            processing_started_at: Self::parse_opt_ts(row.get(20)?),
            processed_at: Self::parse_opt_ts(row.get(21)?),
            updated_at: Self::parse_ts(&row.get::<_, String>(22)?),
        })
    }

    fn get_locked(conn: &Connection, file_id: &str) -> Result<Option<FileRecord>, ManifestError> {
        let sql = format!("SELECT {} FROM file_manifest WHERE file_id = ?", RECORD_COLUMNS);
        conn.query_row(&sql, params![file_id], Self::row_to_record)
            .optional()
            .map_err(|e| ManifestError::Database(e.to_string()))
    }
}

impl ManifestStore for SqliteManifestStore {
    fn insert_if_absent(&self, record: NewFileRecord) -> Result<bool, ManifestError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let inserted = conn
            .execute(
                "INSERT INTO file_manifest \
                 (file_id, observed_at, source_tag, product_type, size_bytes, status, queued_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
                 ON CONFLICT(file_id) DO NOTHING",
                params![
                    record.file_id,
                    record.observed_at.to_rfc3339(),
                    record.source_tag,
                    record.product_type,
                    record.size_bytes as i64,
                    FileStatus::Queued.as_str(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        Ok(inserted > 0)
    }

    fn get(&self, file_id: &str) -> Result<Option<FileRecord>, ManifestError> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, file_id)
    }

    fn list(&self, filter: &ManifestFilter) -> Result<Vec<FileRecord>, ManifestError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM file_manifest {} ORDER BY observed_at DESC LIMIT ? OFFSET ?",
            RECORD_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result.map_err(|e| ManifestError::Database(e.to_string()))?);
        }

        Ok(records)
    }

    fn count(&self, filter: &ManifestFilter) -> Result<i64, ManifestError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM file_manifest {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| ManifestError::Database(e.to_string()))
    }

    fn apply(&self, file_id: &str, patch: ManifestPatch) -> Result<FileRecord, ManifestError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::get_locked(&conn, file_id)?
            .ok_or_else(|| ManifestError::NotFound(file_id.to_string()))?;

        let new_status = patch.status.unwrap_or(current.status);
        if patch.status.is_some() && !current.status.can_transition_to(new_status) {
            return Err(ManifestError::InvalidTransition {
                file_id: file_id.to_string(),
                from: current.status,
                to: new_status,
            });
        }

        let now = Utc::now().to_rfc3339();

        // Which transition timestamps this patch stamps.
        let stamp_download_started = new_status == FileStatus::Downloading;
        let stamp_downloaded = new_status == FileStatus::Downloaded;
        let stamp_processing_started = new_status == FileStatus::Processing;
        let stamp_processed =
            matches!(new_status, FileStatus::Complete | FileStatus::Skipped);

        // One parameterized statement covers every patch shape: unsupplied
        // columns COALESCE to their stored values, attempts are clamped
        // monotonic with MAX, and raw_path can be cleared outright.
        conn.execute(
            "UPDATE file_manifest SET \
                 status = ?2, \
                 download_attempt = MAX(COALESCE(?3, download_attempt), download_attempt), \
                 processing_attempt = MAX(COALESCE(?4, processing_attempt), processing_attempt), \
                 error_message = COALESCE(?5, error_message), \
                 skip_reason = COALESCE(?6, skip_reason), \
                 raw_path = CASE WHEN ?7 THEN NULL ELSE COALESCE(?8, raw_path) END, \
                 output_path = COALESCE(?9, output_path), \
                 quality_score = COALESCE(?10, quality_score), \
                 missing_data_pct = COALESCE(?11, missing_data_pct), \
                 saturation_pct = COALESCE(?12, saturation_pct), \
                 download_duration_secs = COALESCE(?13, download_duration_secs), \
                 processing_duration_secs = COALESCE(?14, processing_duration_secs), \
                 download_started_at = CASE WHEN ?15 THEN ?19 ELSE download_started_at END, \
                 downloaded_at = CASE WHEN ?16 THEN ?19 ELSE downloaded_at END, \
                 processing_started_at = CASE WHEN ?17 THEN ?19 ELSE processing_started_at END, \
                 processed_at = CASE WHEN ?18 THEN ?19 ELSE processed_at END, \
                 updated_at = ?19 \
             WHERE file_id = ?1",
            params![
                file_id,
                new_status.as_str(),
                patch.download_attempt,
                patch.processing_attempt,
                patch.error_message,
                patch.skip_reason,
                patch.clear_raw_path,
                patch.raw_path,
                patch.output_path,
                patch.quality.map(|q| q.quality_score),
                patch.quality.map(|q| q.missing_data_pct),
                patch.quality.map(|q| q.saturation_pct),
                patch.download_duration_secs,
                patch.processing_duration_secs,
                stamp_download_started,
                stamp_downloaded,
                stamp_processing_started,
                stamp_processed,
                now,
            ],
        )
        .map_err(|e| ManifestError::Database(e.to_string()))?;

        Self::get_locked(&conn, file_id)?
            .ok_or_else(|| ManifestError::NotFound(file_id.to_string()))
    }

    fn counts_by_status(&self, trailing_hours: i64) -> Result<Vec<StatusCount>, ManifestError> {
        let conn = self.conn.lock().unwrap();
        let cutoff = (Utc::now() - Duration::hours(trailing_hours)).to_rfc3339();

        let mut stmt = conn
            .prepare(
                "SELECT status, COUNT(*) FROM file_manifest \
                 WHERE observed_at > ? GROUP BY status ORDER BY status",
            )
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![cutoff], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        let mut counts = Vec::new();
        for row_result in rows {
            let (status_str, count) =
                row_result.map_err(|e| ManifestError::Database(e.to_string()))?;
            if let Some(status) = FileStatus::parse(&status_str) {
                counts.push(StatusCount { status, count });
            }
        }

        Ok(counts)
    }

    fn log_query(&self, entry: QueryLogEntry) -> Result<i64, ManifestError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO query_log \
             (logged_at, window_start, window_end, files_found, files_new, duration_ms, outcome, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Utc::now().to_rfc3339(),
                entry.window_start.to_rfc3339(),
                entry.window_end.to_rfc3339(),
                entry.files_found as i64,
                entry.files_new as i64,
                entry.duration_ms as i64,
                entry.outcome.as_str(),
                entry.error_message,
            ],
        )
        .map_err(|e| ManifestError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn recent_queries(&self, limit: i64) -> Result<Vec<QueryLogRecord>, ManifestError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, logged_at, window_start, window_end, files_found, files_new, \
                        duration_ms, outcome, error_message \
                 FROM query_log ORDER BY id DESC LIMIT ?",
            )
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], |row| {
                let outcome_str: String = row.get(7)?;
                Ok(QueryLogRecord {
                    id: row.get(0)?,
                    logged_at: Self::parse_ts(&row.get::<_, String>(1)?),
                    window_start: Self::parse_ts(&row.get::<_, String>(2)?),
                    window_end: Self::parse_ts(&row.get::<_, String>(3)?),
                    files_found: row.get::<_, i64>(4)? as u64,
                    files_new: row.get::<_, i64>(5)? as u64,
                    duration_ms: row.get::<_, i64>(6)? as u64,
                    outcome: QueryOutcome::parse(&outcome_str).unwrap_or(QueryOutcome::Failed),
                    error_message: row.get(8)?,
                })
            })
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result.map_err(|e| ManifestError::Database(e.to_string()))?);
        }

        Ok(records)
    }
}
