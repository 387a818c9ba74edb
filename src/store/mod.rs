//! Relational storage using SQLite
//!
//! This module owns every durable table the pipeline touches:
//! - Jobs (durable status and error message)
//! - Staging rows (raw lineage, idempotent on job/file/ordinal)
//! - Study and participant dimensions
//! - Processed observations (insert-if-absent)
//! - Quality reports (appended per run)
//! - Aggregates (count/mean overwrite, min/max widen)
//!
//! Every batch write runs inside a single transaction.

mod schema;

pub use schema::*;

use crate::config::{Config, DatabaseConfig};
use crate::error::{Error, Result};
use crate::records::{AggregateKey, AggregateUpdate, ProcessedObservation, QualityViolation, StagedRow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" | "pending" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(Error::UnknownStatus(s.to_string())),
        }
    }
}

/// Durable job row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobRow {
    pub id: String,
    pub filename: String,
    pub study_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

impl JobRow {
    pub fn get_status(&self) -> Result<JobStatus> {
        self.status.parse()
    }
}

/// A participant dimension row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ParticipantRow {
    pub study_id: String,
    pub participant_id: String,
    pub site_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A processed observation as stored
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessedRow {
    pub id: i64,
    pub study_id: String,
    pub participant_id: String,
    pub site_id: String,
    pub measurement_type: String,
    pub measured_at: String,
    pub value_num: Option<f64>,
    pub value_text: Option<String>,
    pub unit: Option<String>,
    pub quality_score: Option<f64>,
    pub raw_row_id: String,
    pub job_id: String,
}

/// A quality report row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QualityReportRow {
    pub id: i64,
    pub job_id: String,
    pub rule_name: String,
    pub severity: String,
    pub affected_rows: i64,
    pub created_at: String,
}

/// A running aggregate row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AggregateRow {
    pub study_id: String,
    pub participant_id: String,
    pub site_id: String,
    pub measurement_type: String,
    pub cnt: i64,
    pub avg_num: f64,
    pub min_num: f64,
    pub max_num: f64,
    pub job_id: String,
    pub updated_at: String,
}

/// Per-job row counts across tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobTableCounts {
    pub staged_rows: usize,
    pub processed_rows: usize,
    pub quality_reports: usize,
}

/// ETL database handle
#[derive(Clone)]
pub struct EtlDb {
    pool: SqlitePool,
}

impl EtlDb {
    /// Connect to the database described by the config, initializing the schema
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file, &config.database).await
    }

    /// Create database with path directly (without full config), initializing the schema
    pub async fn new(db_path: &Path) -> Result<Self> {
        Self::open(db_path, &DatabaseConfig::default()).await
    }

    async fn open(db_path: &Path, settings: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Stage batches hold the write lock for a whole transaction, so
        // concurrent jobs wait on each other rather than fail.
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(settings.busy_timeout_ms));

        debug!(
            max_connections = settings.max_connections,
            busy_timeout_ms = settings.busy_timeout_ms,
            "Connecting to SQLite database at {:?}",
            db_path
        );

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    /// Pool size the handle was opened with
    pub fn max_connections(&self) -> u32 {
        self.pool.options().get_max_connections()
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='etl_jobs'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Job Operations =====

    /// Create a job row, or reset an existing one back to running
    pub async fn upsert_job(
        &self,
        job_id: &str,
        filename: &str,
        study_id: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO etl_jobs (id, filename, study_id, status, created_at, updated_at, completed_at, error_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5, NULL, NULL)
            ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                study_id = excluded.study_id,
                status = excluded.status,
                updated_at = excluded.updated_at,
                completed_at = NULL,
                error_message = NULL
            "#,
        )
        .bind(job_id)
        .bind(filename)
        .bind(study_id)
        .bind(JobStatus::Running.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a status transition; terminal states stamp `completed_at`
    pub async fn mark_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let completed_at = status.is_terminal().then(|| now.clone());
        sqlx::query(
            r#"
            UPDATE etl_jobs SET
                status = ?,
                updated_at = ?,
                completed_at = COALESCE(?, completed_at),
                error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(&now)
        .bind(completed_at)
        .bind(error_message)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump `updated_at` after a stage checkpoint
    pub async fn touch_job(&self, job_id: &str) -> Result<()> {
        sqlx::query("UPDATE etl_jobs SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get job by ID
    pub async fn fetch_job(&self, job_id: &str) -> Result<Option<JobRow>> {
        let job = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, filename, study_id, status, created_at, updated_at, completed_at, error_message
            FROM etl_jobs WHERE id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// List the most recent jobs
    pub async fn list_jobs(&self, limit: i64) -> Result<Vec<JobRow>> {
        let jobs = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, filename, study_id, status, created_at, updated_at, completed_at, error_message
            FROM etl_jobs ORDER BY created_at DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    // ===== Staging Operations =====

    /// Insert staging rows, skipping keys that already exist.
    ///
    /// Returns the persisted row id for every ordinal of the affected
    /// (job, filename) pairs, read back inside the same transaction. On a
    /// re-run these are the ids from the first staging, not the fresh ones.
    pub async fn insert_staging_rows(&self, rows: &[StagedRow]) -> Result<HashMap<i64, String>> {
        let mut persisted = HashMap::with_capacity(rows.len());
        let Some(first) = rows.first() else {
            return Ok(persisted);
        };

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO staging_measurements (
                    id, job_id, source_filename, row_num,
                    study_id, participant_id, measurement_type, value, unit, "timestamp",
                    site_id, quality_score, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(job_id, source_filename, row_num) DO NOTHING
                "#,
            )
            .bind(&row.raw_id)
            .bind(&row.job_id)
            .bind(&row.source_filename)
            .bind(row.row_num)
            .bind(&row.raw.study_id)
            .bind(&row.raw.participant_id)
            .bind(&row.raw.measurement_type)
            .bind(&row.raw.value)
            .bind(&row.unit)
            .bind(&row.raw.timestamp)
            .bind(&row.raw.site_id)
            .bind(row.quality_score)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        let ids: Vec<(i64, String)> = sqlx::query_as(
            "SELECT row_num, id FROM staging_measurements WHERE job_id = ? AND source_filename = ?",
        )
        .bind(&first.job_id)
        .bind(&first.source_filename)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            job_id = %first.job_id,
            inserted,
            skipped = rows.len() as u64 - inserted,
            "Staged rows"
        );

        persisted.extend(ids);
        Ok(persisted)
    }

    /// Count staging rows for a job
    pub async fn count_staging(&self, job_id: &str) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM staging_measurements WHERE job_id = ?")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    // ===== Dimension Operations =====

    /// Merge the study and participant dimensions found in a job's staging rows.
    ///
    /// Participants take the site of their highest-ordinal staging row in
    /// this job; an existing participant's site is overwritten.
    pub async fn upsert_dimensions(&self, job_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let studies = sqlx::query(
            r#"
            INSERT INTO studies (study_id, created_at)
            SELECT DISTINCT study_id, ?1
              FROM staging_measurements
             WHERE job_id = ?2
            ON CONFLICT(study_id) DO NOTHING
            "#,
        )
        .bind(&now)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        let participants = sqlx::query(
            r#"
            INSERT INTO participants (study_id, participant_id, site_id, created_at, updated_at)
            SELECT DISTINCT s.study_id, s.participant_id, s.site_id, ?1, ?1
              FROM staging_measurements s
             WHERE s.job_id = ?2
               AND s.row_num = (
                   SELECT MAX(t.row_num)
                     FROM staging_measurements t
                    WHERE t.job_id = s.job_id
                      AND t.study_id = s.study_id
                      AND t.participant_id = s.participant_id
               )
            ON CONFLICT(study_id, participant_id) DO UPDATE SET
                site_id = excluded.site_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&now)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            job_id,
            studies = studies.rows_affected(),
            participants = participants.rows_affected(),
            "Upserted dimensions"
        );
        Ok(())
    }

    /// Check whether a study dimension exists
    pub async fn study_exists(&self, study_id: &str) -> Result<bool> {
        let found: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM studies WHERE study_id = ?")
            .bind(study_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Get a participant dimension row
    pub async fn get_participant(
        &self,
        study_id: &str,
        participant_id: &str,
    ) -> Result<Option<ParticipantRow>> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            "SELECT * FROM participants WHERE study_id = ? AND participant_id = ?",
        )
        .bind(study_id)
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ===== Processed Operations =====

    /// Insert processed observations, skipping ones already present. Returns rows inserted.
    pub async fn insert_processed(&self, rows: &[ProcessedObservation]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for obs in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO processed_measurements (
                    study_id, participant_id, site_id, measurement_type, measured_at,
                    value_num, value_text, unit, quality_score, raw_row_id, job_id, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(study_id, participant_id, site_id, measurement_type, measured_at, raw_row_id)
                DO NOTHING
                "#,
            )
            .bind(&obs.study_id)
            .bind(&obs.participant_id)
            .bind(&obs.site_id)
            .bind(&obs.measurement_type)
            .bind(&obs.measured_at)
            .bind(obs.value_num())
            .bind(obs.value_text())
            .bind(&obs.unit)
            .bind(obs.quality_score)
            .bind(&obs.raw_row_id)
            .bind(&obs.job_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// List processed observations written by a job
    pub async fn list_processed(&self, job_id: &str) -> Result<Vec<ProcessedRow>> {
        let rows = sqlx::query_as::<_, ProcessedRow>(
            r#"
            SELECT id, study_id, participant_id, site_id, measurement_type, measured_at,
                   value_num, value_text, unit, quality_score, raw_row_id, job_id
              FROM processed_measurements
             WHERE job_id = ?
             ORDER BY id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ===== Quality Operations =====

    /// Append quality report rows for a job
    pub async fn insert_quality_reports(
        &self,
        job_id: &str,
        violations: &[QualityViolation],
    ) -> Result<()> {
        if violations.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for v in violations {
            sqlx::query(
                r#"
                INSERT INTO data_quality_reports (job_id, rule_name, severity, affected_rows, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(job_id)
            .bind(&v.rule_name)
            .bind(v.severity.to_string())
            .bind(v.affected_rows)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// List quality reports for a job
    pub async fn list_quality_reports(&self, job_id: &str) -> Result<Vec<QualityReportRow>> {
        let rows = sqlx::query_as::<_, QualityReportRow>(
            "SELECT * FROM data_quality_reports WHERE job_id = ? ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ===== Aggregate Operations =====

    /// Merge aggregate updates: count/mean overwrite, min/max widen
    pub async fn upsert_aggregates(&self, updates: &[AggregateUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for u in updates {
            sqlx::query(
                r#"
                INSERT INTO measurement_aggregations (
                    study_id, participant_id, site_id, measurement_type,
                    cnt, avg_num, min_num, max_num, job_id, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(study_id, participant_id, site_id, measurement_type) DO UPDATE SET
                    cnt = excluded.cnt,
                    avg_num = excluded.avg_num,
                    min_num = MIN(measurement_aggregations.min_num, excluded.min_num),
                    max_num = MAX(measurement_aggregations.max_num, excluded.max_num),
                    job_id = excluded.job_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&u.key.study_id)
            .bind(&u.key.participant_id)
            .bind(&u.key.site_id)
            .bind(&u.key.measurement_type)
            .bind(u.cnt)
            .bind(u.avg_num)
            .bind(u.min_num)
            .bind(u.max_num)
            .bind(&u.job_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get the running aggregate for one key
    pub async fn get_aggregate(&self, key: &AggregateKey) -> Result<Option<AggregateRow>> {
        let row = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT * FROM measurement_aggregations
             WHERE study_id = ? AND participant_id = ? AND site_id = ? AND measurement_type = ?
            "#,
        )
        .bind(&key.study_id)
        .bind(&key.participant_id)
        .bind(&key.site_id)
        .bind(&key.measurement_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// List aggregates, optionally restricted to one study
    pub async fn list_aggregates(&self, study_id: Option<&str>) -> Result<Vec<AggregateRow>> {
        let rows = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT * FROM measurement_aggregations
             WHERE ?1 IS NULL OR study_id = ?1
             ORDER BY study_id, participant_id, site_id, measurement_type
            "#,
        )
        .bind(study_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ===== Statistics =====

    /// Row counts a job produced across tables
    pub async fn get_job_counts(&self, job_id: &str) -> Result<JobTableCounts> {
        let processed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM processed_measurements WHERE job_id = ?")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await?;

        let reports: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM data_quality_reports WHERE job_id = ?")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(JobTableCounts {
            staged_rows: self.count_staging(job_id).await?,
            processed_rows: processed as usize,
            quality_reports: reports as usize,
        })
    }
}
