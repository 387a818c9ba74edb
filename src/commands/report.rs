//! Report and aggregate listing commands

use crate::error::{Error, Result};
use crate::store::{AggregateRow, EtlDb, JobRow, JobTableCounts, QualityReportRow};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Durable outcome of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: JobRow,
    pub counts: JobTableCounts,
    pub quality_reports: Vec<QualityReportRow>,
}

/// Collect the stored results for a job
pub async fn cmd_report(db: &EtlDb, job_id: &str) -> Result<JobReport> {
    info!(job_id, "Building job report");

    let job = db
        .fetch_job(job_id)
        .await?
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

    Ok(JobReport {
        counts: db.get_job_counts(job_id).await?,
        quality_reports: db.list_quality_reports(job_id).await?,
        job,
    })
}

/// List running aggregates, optionally for one study
pub async fn cmd_aggregates(db: &EtlDb, study_id: Option<&str>) -> Result<Vec<AggregateRow>> {
    db.list_aggregates(study_id).await
}

pub fn print_report(report: &JobReport) {
    let job = &report.job;
    println!("\n📋 Job {}\n", job.id);
    println!("File: {}", job.filename);
    println!("Status: {}", job.status);
    println!("Created: {}", job.created_at);
    if let Some(completed) = &job.completed_at {
        println!("Completed: {}", completed);
    }
    if let Some(error) = &job.error_message {
        println!("Error: {}", error);
    }

    println!("\nRows:");
    println!("  Staged: {}", report.counts.staged_rows);
    println!("  Processed: {}", report.counts.processed_rows);

    println!("\nQuality ({} reports):", report.counts.quality_reports);
    if report.quality_reports.is_empty() {
        println!("  No violations recorded");
    }
    for r in &report.quality_reports {
        println!("  [{}] {}: {} rows ({})", r.severity, r.rule_name, r.affected_rows, r.created_at);
    }
}

pub fn print_aggregates(rows: &[AggregateRow]) {
    if rows.is_empty() {
        println!("No aggregates yet.");
        return;
    }

    println!(
        "{:<12} {:<12} {:<10} {:<26} {:>5} {:>10} {:>10} {:>10}",
        "study", "participant", "site", "measurement", "cnt", "avg", "min", "max"
    );
    for r in rows {
        println!(
            "{:<12} {:<12} {:<10} {:<26} {:>5} {:>10.2} {:>10.2} {:>10.2}",
            r.study_id,
            r.participant_id,
            r.site_id,
            r.measurement_type,
            r.cnt,
            r.avg_num,
            r.min_num,
            r.max_num
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::records::{QualityViolation, Severity};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_report_for_failed_and_unknown_jobs() {
        let tmp = TempDir::new().unwrap();
        let db = EtlDb::new(&tmp.path().join("etl.db")).await.unwrap();

        db.upsert_job("job-1", "a.csv", None).await.unwrap();
        db.insert_quality_reports(
            "job-1",
            &[QualityViolation {
                rule_name: "numeric_out_of_range".to_string(),
                severity: Severity::Warn,
                affected_rows: 2,
            }],
        )
        .await
        .unwrap();
        db.mark_status("job-1", JobStatus::Completed, None).await.unwrap();

        let report = cmd_report(&db, "job-1").await.unwrap();
        assert_eq!(report.job.status, "completed");
        assert_eq!(report.counts.staged_rows, 0);
        assert_eq!(report.quality_reports.len(), 1);
        assert_eq!(report.counts.quality_reports, 1);
        assert_eq!(report.quality_reports[0].severity, "warn");

        assert!(matches!(
            cmd_report(&db, "nope").await.unwrap_err(),
            Error::JobNotFound(_)
        ));
        assert!(cmd_aggregates(&db, Some("study001")).await.unwrap().is_empty());
    }
}
