//! SQLite schema definition

/// SQL schema for the ETL database
pub const SCHEMA_SQL: &str = r#"
-- Jobs: one row per submitted ETL job
CREATE TABLE IF NOT EXISTS etl_jobs (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    study_id TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    error_message TEXT
);

-- Staging: raw CSV rows, lineage for everything downstream
CREATE TABLE IF NOT EXISTS staging_measurements (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    source_filename TEXT NOT NULL,
    row_num INTEGER NOT NULL,
    study_id TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    measurement_type TEXT NOT NULL,
    value TEXT NOT NULL,
    unit TEXT,
    "timestamp" TEXT NOT NULL,
    site_id TEXT NOT NULL,
    quality_score REAL,
    created_at TEXT NOT NULL,
    UNIQUE(job_id, source_filename, row_num)
);

-- Dimensions
CREATE TABLE IF NOT EXISTS studies (
    study_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS participants (
    study_id TEXT NOT NULL REFERENCES studies(study_id),
    participant_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY(study_id, participant_id)
);

-- Processed: one canonical observation per row (two for blood pressure)
CREATE TABLE IF NOT EXISTS processed_measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    study_id TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    measurement_type TEXT NOT NULL,
    measured_at TEXT NOT NULL,
    value_num REAL,
    value_text TEXT,
    unit TEXT,
    quality_score REAL,
    raw_row_id TEXT NOT NULL REFERENCES staging_measurements(id),
    job_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    CHECK ((value_num IS NULL) <> (value_text IS NULL)),
    CONSTRAINT uq_pm_obs UNIQUE(study_id, participant_id, site_id, measurement_type, measured_at, raw_row_id)
);

-- Quality reports: appended per run
CREATE TABLE IF NOT EXISTS data_quality_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    rule_name TEXT NOT NULL,
    severity TEXT NOT NULL,
    affected_rows INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Aggregates: running per-entity summaries
CREATE TABLE IF NOT EXISTS measurement_aggregations (
    study_id TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    measurement_type TEXT NOT NULL,
    cnt INTEGER NOT NULL,
    avg_num REAL NOT NULL,
    min_num REAL NOT NULL,
    max_num REAL NOT NULL,
    job_id TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY(study_id, participant_id, site_id, measurement_type)
);

CREATE INDEX IF NOT EXISTS idx_staging_job ON staging_measurements(job_id);
CREATE INDEX IF NOT EXISTS idx_processed_job ON processed_measurements(job_id);
CREATE INDEX IF NOT EXISTS idx_quality_job ON data_quality_reports(job_id);
CREATE INDEX IF NOT EXISTS idx_jobs_created ON etl_jobs(created_at);
"#;
