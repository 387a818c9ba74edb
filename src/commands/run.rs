//! Run command implementation

use crate::config::Config;
use crate::error::Result;
use crate::jobs::{JobRecord, JobRequest, JobService, JobStatus};
use crate::progress::job_progress_bar;
use std::time::Duration;
use tracing::info;

/// Options for a single run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Reuse an id to re-run a job; a fresh UUID otherwise
    pub job_id: Option<String>,
    pub study_id: Option<String>,
    pub show_progress: bool,
}

/// Submit a file and wait for the job to reach a terminal state
pub async fn cmd_run(
    config: &Config,
    service: &JobService,
    filename: &str,
    options: RunOptions,
) -> Result<JobRecord> {
    let job_id = options
        .job_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let request = JobRequest {
        job_id: job_id.clone(),
        filename: filename.to_string(),
        study_id: options.study_id,
    };

    let initial = service.submit(request).await?;
    info!(job_id = %initial.job_id, "Waiting for job");

    let pb = options.show_progress.then(|| job_progress_bar(&job_id));
    let poll = Duration::from_millis(config.jobs.poll_interval_ms);

    let last = service
        .wait(&job_id, poll, |view| {
            if let Some(pb) = &pb {
                pb.set_position(view.progress.unwrap_or_default() as u64);
                if let Some(msg) = &view.message {
                    pb.set_message(msg.clone());
                }
            }
        })
        .await?;

    if let Some(pb) = pb {
        match last.status {
            JobStatus::Completed => pb.finish_with_message("completed"),
            _ => pb.abandon_with_message("failed"),
        }
    }

    service.get_details(&job_id).await
}

/// Print a finished job's outcome
pub fn print_run(record: &JobRecord) {
    match record.status {
        JobStatus::Completed => {
            println!("\n✓ Job {} completed", record.job_id);
            println!("  File: {}", record.filename);
            if let Some(summary) = &record.summary {
                println!("  Rows read: {}", summary.rows_read);
                println!(
                    "  Observations: {} ({} new)",
                    summary.observations, summary.observations_inserted
                );
                println!("  Aggregates updated: {}", summary.aggregates_updated);
                if summary.violations.is_empty() {
                    println!("  Quality: no violations");
                } else {
                    println!("  Quality:");
                    for v in &summary.violations {
                        println!("    [{}] {}: {} rows", v.severity, v.rule_name, v.affected_rows);
                    }
                }
            }
        }
        _ => {
            println!("\n✗ Job {} failed", record.job_id);
            if let Some(error) = &record.error {
                println!("  Error: {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EtlDb;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_waits_for_completion() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("etl.db");
        config.data_dir = tmp.path().to_path_buf();
        config.jobs.poll_interval_ms = 5;
        std::fs::write(
            tmp.path().join("bad.csv"),
            "study_id,participant_id\nstudy001,p1\n",
        )
        .unwrap();

        let db = EtlDb::new(&config.paths.db_file).await.unwrap();
        let service = JobService::new(config.clone(), db);

        let options = RunOptions {
            job_id: Some("job-x".to_string()),
            ..Default::default()
        };
        let record = cmd_run(&config, &service, "bad.csv", options).await.unwrap();
        assert_eq!(record.job_id, "job-x");
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.unwrap().starts_with("missing columns:"));
    }
}
