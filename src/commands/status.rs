//! Status command implementation

use crate::error::Result;
use crate::jobs::{JobService, JobStatusView};
use crate::store::{EtlDb, JobRow};
use tracing::info;

/// Get the status of one job
pub async fn cmd_status(service: &JobService, job_id: &str) -> Result<JobStatusView> {
    info!(job_id, "Getting job status");
    service.get_status(job_id).await
}

/// List the most recent jobs
pub async fn cmd_list_jobs(db: &EtlDb, limit: i64) -> Result<Vec<JobRow>> {
    info!("Listing jobs");
    db.list_jobs(limit).await
}

/// Print one job's status to console
pub fn print_status(view: &JobStatusView) {
    println!("\nJob {}", view.job_id);
    println!("  Status: {}", view.status);
    if let Some(progress) = view.progress {
        println!("  Progress: {}%", progress);
    }
    if let Some(message) = &view.message {
        println!("  Message: {}", message);
    }
}

/// Print job list to console
pub fn print_jobs(jobs: &[JobRow]) {
    println!("\n🗂  Recent Jobs\n");

    if jobs.is_empty() {
        println!("No jobs yet. Use 'clinical-etl run <file>' to process a file.");
        return;
    }

    for job in jobs {
        println!("• {} [{}]", job.id, job.status);
        println!("    File: {}", job.filename);
        if let Some(study) = &job.study_id {
            println!("    Study: {}", study);
        }
        println!("    Updated: {}", job.updated_at);
        if let Some(error) = &job.error_message {
            println!("    Error: {}", error);
        }
    }
}
