//! In-process job state
//!
//! Progress and stage messages live here only. The registry is neither
//! durable nor shared across processes: a restarted process, or another
//! instance pointed at the same database, sees only the durable job row.
//!
//! Each (re)submission of a job id starts a new run. Updates carry the run
//! they belong to, and updates from a superseded run are dropped.

use crate::pipeline::JobSummary;
use crate::store::JobStatus;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Transient record for one job, as seen by the process running it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    /// Submission counter for this job id within the process
    pub run: u64,
    pub filename: String,
    pub study_id: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub summary: Option<JobSummary>,
    pub submitted_at: String,
    pub updated_at: String,
}

impl JobRecord {
    pub fn submitted(job_id: &str, filename: &str, study_id: Option<&str>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            job_id: job_id.to_string(),
            run: 0,
            filename: filename.to_string(),
            study_id: study_id.map(str::to_string),
            status: JobStatus::Running,
            progress: 0,
            message: "starting".to_string(),
            error: None,
            summary: None,
            submitted_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Concurrent map of job id to transient state
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for a (re)submitted job, returning its run
    pub async fn register(&self, mut record: JobRecord) -> u64 {
        let mut jobs = self.jobs.write().await;
        let run = jobs.get(&record.job_id).map_or(1, |prev| prev.run + 1);
        record.run = run;
        jobs.insert(record.job_id.clone(), record);
        run
    }

    /// Whether `run` is still the latest submission of the job
    pub async fn is_current(&self, job_id: &str, run: u64) -> bool {
        self.jobs
            .read()
            .await
            .get(job_id)
            .is_some_and(|r| r.run == run)
    }

    /// Update progress of a running job; terminal or superseded runs are left untouched
    pub async fn set_progress(&self, job_id: &str, run: u64, progress: u8, message: &str) {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(job_id) else {
            return;
        };
        if record.run != run || record.status.is_terminal() {
            return;
        }
        record.progress = progress.min(100);
        record.message = message.to_string();
        record.updated_at = Utc::now().to_rfc3339();
    }

    pub async fn complete(&self, job_id: &str, run: u64, summary: JobSummary) {
        self.finish(
            job_id,
            run,
            JobStatus::Completed,
            "completed".to_string(),
            None,
            Some(summary),
        )
        .await;
    }

    pub async fn fail(&self, job_id: &str, run: u64, error: &str) {
        self.finish(
            job_id,
            run,
            JobStatus::Failed,
            format!("failed: {}", error),
            Some(error.to_string()),
            None,
        )
        .await;
    }

    async fn finish(
        &self,
        job_id: &str,
        run: u64,
        status: JobStatus,
        message: String,
        error: Option<String>,
        summary: Option<JobSummary>,
    ) {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(job_id) else {
            return;
        };
        if record.run != run {
            return;
        }
        record.status = status;
        record.progress = 100;
        record.message = message;
        record.error = error;
        record.summary = summary;
        record.updated_at = Utc::now().to_rfc3339();
    }

    pub async fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
