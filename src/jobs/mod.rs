//! Job submission and status queries
//!
//! Submission is asynchronous: the pipeline is spawned on the tokio runtime
//! and the caller polls [`JobService::get_status`] until the job is terminal.

mod registry;

pub use crate::store::JobStatus;
pub use registry::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::{run_job, PipelineContext};
use crate::store::EtlDb;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A request to process one CSV file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_id: String,
    pub filename: String,
    #[serde(default)]
    pub study_id: Option<String>,
}

/// Status as reported to polling clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&JobRecord> for JobStatusView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            status: record.status,
            progress: Some(record.progress),
            message: Some(record.message.clone()),
        }
    }
}

/// Front door for submitting and inspecting jobs
#[derive(Clone)]
pub struct JobService {
    config: Arc<Config>,
    ctx: Arc<PipelineContext>,
}

impl JobService {
    pub fn new(config: Config, db: EtlDb) -> Self {
        let ctx = PipelineContext::new(db, JobRegistry::new(), config.quality.clone());
        Self {
            config: Arc::new(config),
            ctx: Arc::new(ctx),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.ctx.registry
    }

    pub fn db(&self) -> &EtlDb {
        &self.ctx.db
    }

    /// Accept a job and start it in the background.
    ///
    /// Only request validation fails here; pipeline errors are recorded on
    /// the job and surface through [`get_status`](Self::get_status).
    pub async fn submit(&self, request: JobRequest) -> Result<JobStatusView> {
        let job_id = request.job_id.trim().to_string();
        if job_id.is_empty() {
            return Err(Error::Validation("job_id must not be blank".to_string()));
        }
        let csv_path = self.config.resolve_input(&request.filename)?;
        let study_id = request
            .study_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        self.ctx
            .db
            .upsert_job(&job_id, &request.filename, study_id)
            .await?;

        let record = JobRecord::submitted(&job_id, &request.filename, study_id);
        let view = JobStatusView::from(&record);
        let run = self.ctx.registry.register(record).await;

        info!(job_id = %job_id, run, filename = %request.filename, "Job submitted");

        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            run_job(&ctx, &job_id, run, &csv_path).await;
        });

        Ok(view)
    }

    /// Current status: in-process state first, then the durable row
    pub async fn get_status(&self, job_id: &str) -> Result<JobStatusView> {
        if let Some(record) = self.ctx.registry.get(job_id).await {
            return Ok(JobStatusView::from(&record));
        }

        match self.ctx.db.fetch_job(job_id).await? {
            Some(row) => Ok(JobStatusView {
                job_id: row.id.clone(),
                status: row.get_status()?,
                progress: None,
                message: row.error_message,
            }),
            None => Err(Error::JobNotFound(job_id.to_string())),
        }
    }

    /// Full transient record; only known to the process that ran the job
    pub async fn get_details(&self, job_id: &str) -> Result<JobRecord> {
        self.ctx
            .registry
            .get(job_id)
            .await
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    /// Poll until the job is terminal, reporting each observed status
    pub async fn wait<F>(
        &self,
        job_id: &str,
        poll: Duration,
        mut on_update: F,
    ) -> Result<JobStatusView>
    where
        F: FnMut(&JobStatusView),
    {
        loop {
            let view = self.get_status(job_id).await?;
            on_update(&view);
            if view.status.is_terminal() {
                return Ok(view);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CSV: &str = "study_id,participant_id,measurement_type,value,unit,timestamp,site_id,quality_score\n\
                       study001,p1,glucose,110,mg/dL,2024-01-01T00:00:00Z,site1,0.9\n";

    async fn setup() -> (JobService, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("etl.db");
        config.data_dir = tmp.path().to_path_buf();
        std::fs::write(tmp.path().join("study001.csv"), CSV).unwrap();

        let db = EtlDb::new(&config.paths.db_file).await.unwrap();
        (JobService::new(config, db), tmp)
    }

    fn request(job_id: &str, filename: &str) -> JobRequest {
        JobRequest {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            study_id: Some("study001".to_string()),
        }
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let (service, _tmp) = setup().await;

        let initial = service.submit(request("job-1", "study001.csv")).await.unwrap();
        assert_eq!(initial.status, JobStatus::Running);
        assert_eq!(initial.progress, Some(0));
        assert_eq!(initial.message.as_deref(), Some("starting"));

        let mut seen = Vec::new();
        let done = service
            .wait("job-1", Duration::from_millis(10), |v| seen.push(v.status))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, Some(100));
        assert_eq!(seen.last(), Some(&JobStatus::Completed));

        let details = service.get_details("job-1").await.unwrap();
        assert_eq!(details.summary.unwrap().observations, 1);
        assert_eq!(details.study_id.as_deref(), Some("study001"));
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_requests() {
        let (service, _tmp) = setup().await;

        let err = service.submit(request("job-1", "missing.csv")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));

        let err = service.submit(request("  ", "study001.csv")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(service.db().fetch_job("job-1").await.unwrap().is_none());
        assert!(service.registry().is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_jobs_run_concurrently() {
        let (service, tmp) = setup().await;

        let mut csv = String::from(
            "study_id,participant_id,measurement_type,value,unit,timestamp,site_id,quality_score\n",
        );
        for i in 0..1500 {
            csv.push_str(&format!(
                "study001,p{},glucose,{},mg/dL,2024-01-01T00:{:02}:{:02}Z,site1,0.9\n",
                i % 50,
                80 + i % 100,
                (i / 60) % 60,
                i % 60
            ));
        }

        let jobs: Vec<String> = (0..6).map(|n| format!("job-{}", n)).collect();
        for job_id in &jobs {
            let filename = format!("{}.csv", job_id);
            std::fs::write(tmp.path().join(&filename), &csv).unwrap();
            service.submit(request(job_id, &filename)).await.unwrap();
        }

        for job_id in &jobs {
            let done = service
                .wait(job_id, Duration::from_millis(20), |_| {})
                .await
                .unwrap();
            assert_eq!(
                done.status,
                JobStatus::Completed,
                "{} ended with {:?}",
                job_id,
                done.message
            );
            let counts = service.db().get_job_counts(job_id).await.unwrap();
            assert_eq!(counts.staged_rows, 1500);
            assert_eq!(counts.processed_rows, 1500);
        }

        let aggregates = service.db().list_aggregates(Some("study001")).await.unwrap();
        assert_eq!(aggregates.len(), 50);
    }

    #[tokio::test]
    async fn test_status_falls_back_to_durable_row() {
        let (service, _tmp) = setup().await;
        let db = service.db().clone();

        db.upsert_job("job-old", "old.csv", None).await.unwrap();
        db.mark_status("job-old", JobStatus::Failed, Some("missing columns: unit"))
            .await
            .unwrap();

        let view = service.get_status("job-old").await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.progress, None);
        assert_eq!(view.message.as_deref(), Some("missing columns: unit"));

        let err = service.get_details("job-old").await.unwrap_err();
        assert!(matches!(err, Error::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (service, _tmp) = setup().await;
        assert!(matches!(
            service.get_status("nope").await.unwrap_err(),
            Error::JobNotFound(_)
        ));
        assert!(matches!(
            service.get_details("nope").await.unwrap_err(),
            Error::JobNotFound(_)
        ));
    }

    #[test]
    fn test_status_view_serialization() {
        let view = JobStatusView {
            job_id: "job-1".to_string(),
            status: JobStatus::Failed,
            progress: None,
            message: Some("boom".to_string()),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["status"], "failed");
        assert!(json.get("progress").is_none());
    }
}
