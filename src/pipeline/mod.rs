//! The ETL pipeline
//!
//! A job runs these stages strictly in order, with a progress checkpoint
//! after each:
//! - parse: read the CSV, enforce required columns and fields
//! - stage: persist raw rows keyed by (job, file, ordinal)
//! - dimensions: merge studies and participants
//! - transform: expand rows into processed observations
//! - quality: count rule violations
//! - aggregate: roll numeric observations into running aggregates
//!
//! Every stage returns a `Result`. The first error ends the job, and
//! [`run_job`] is the only place a job transitions to `failed`.

pub mod aggregate;
pub mod dimensions;
pub mod parse;
pub mod quality;
pub mod stage;
pub mod transform;

use crate::config::QualityConfig;
use crate::error::{Error, Result};
use crate::jobs::JobRegistry;
use crate::records::QualityViolation;
use crate::store::{EtlDb, JobStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Pipeline checkpoints reported to polling clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Staging,
    Dimensions,
    Transform,
    Quality,
    Aggregate,
}

impl Stage {
    pub fn progress(self) -> u8 {
        match self {
            Stage::Parse => 10,
            Stage::Staging => 30,
            Stage::Dimensions => 45,
            Stage::Transform => 65,
            Stage::Quality => 75,
            Stage::Aggregate => 90,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Stage::Parse => "reading csv",
            Stage::Staging => "staging rows",
            Stage::Dimensions => "upserting dimensions",
            Stage::Transform => "building processed",
            Stage::Quality => "quality checks",
            Stage::Aggregate => "aggregations",
        }
    }
}

/// What a completed job produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub rows_read: usize,
    pub observations: usize,
    /// Observations newly written; the rest already existed from an earlier run
    pub observations_inserted: u64,
    pub violations: Vec<QualityViolation>,
    pub aggregates_updated: usize,
}

/// Shared handles a running job needs
#[derive(Clone)]
pub struct PipelineContext {
    pub db: EtlDb,
    pub registry: JobRegistry,
    pub quality: QualityConfig,
}

impl PipelineContext {
    pub fn new(db: EtlDb, registry: JobRegistry, quality: QualityConfig) -> Self {
        Self {
            db,
            registry,
            quality,
        }
    }

    async fn checkpoint(&self, job_id: &str, run: u64, stage: Stage) -> Result<()> {
        debug!(job_id, run, stage = stage.message(), "Checkpoint");
        self.registry
            .set_progress(job_id, run, stage.progress(), stage.message())
            .await;
        self.db.touch_job(job_id).await
    }
}

/// Run one job to completion or failure, recording the terminal state.
///
/// `run` is the registry run this execution belongs to. Never returns an
/// error: failures are stored on the job. A run superseded by a newer
/// submission of the same id leaves the terminal transition to that newer run.
pub async fn run_job(
    ctx: &PipelineContext,
    job_id: &str,
    run: u64,
    csv_path: &Path,
) -> JobStatus {
    info!(job_id, run, path = %csv_path.display(), "Starting ETL job");

    let outcome = execute(ctx, job_id, run, csv_path).await;

    if !ctx.registry.is_current(job_id, run).await {
        info!(job_id, run, "Run superseded by a newer submission, outcome not recorded");
        return match outcome {
            Ok(_) => JobStatus::Completed,
            Err(_) => JobStatus::Failed,
        };
    }

    match outcome {
        Ok(summary) => {
            if let Err(e) = ctx.db.mark_status(job_id, JobStatus::Completed, None).await {
                error!(job_id, error = %e, "Failed to record job completion");
            }
            info!(
                job_id,
                rows = summary.rows_read,
                observations = summary.observations,
                violations = summary.violations.len(),
                aggregates = summary.aggregates_updated,
                "ETL job completed"
            );
            ctx.registry.complete(job_id, run, summary).await;
            JobStatus::Completed
        }
        Err(e) => {
            let message = e.to_string();
            warn!(job_id, error = %message, "ETL job failed");
            if let Err(db_err) = ctx
                .db
                .mark_status(job_id, JobStatus::Failed, Some(&message))
                .await
            {
                error!(job_id, error = %db_err, "Failed to record job failure");
            }
            ctx.registry.fail(job_id, run, &message).await;
            JobStatus::Failed
        }
    }
}

async fn execute(
    ctx: &PipelineContext,
    job_id: &str,
    run: u64,
    csv_path: &Path,
) -> Result<JobSummary> {
    let filename = csv_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(csv_path.display().to_string()))?;

    ctx.checkpoint(job_id, run, Stage::Parse).await?;
    let path: PathBuf = csv_path.to_path_buf();
    let raw_rows = tokio::task::spawn_blocking(move || parse::read_csv(&path))
        .await
        .map_err(|e| Error::Other(format!("CSV reader task failed: {}", e)))??;
    let rows_read = raw_rows.len();

    ctx.checkpoint(job_id, run, Stage::Staging).await?;
    let staged = stage::stage_rows(&ctx.db, job_id, &filename, raw_rows).await?;

    ctx.checkpoint(job_id, run, Stage::Dimensions).await?;
    dimensions::upsert_dimensions_for_job(&ctx.db, job_id).await?;

    ctx.checkpoint(job_id, run, Stage::Transform).await?;
    let processed = transform::build_processed(&staged);
    let observations_inserted = ctx.db.insert_processed(&processed).await?;

    ctx.checkpoint(job_id, run, Stage::Quality).await?;
    let violations = quality::evaluate(&staged, &ctx.quality);
    ctx.db.insert_quality_reports(job_id, &violations).await?;

    ctx.checkpoint(job_id, run, Stage::Aggregate).await?;
    let aggregates = aggregate::build_aggregates(job_id, &processed);
    ctx.db.upsert_aggregates(&aggregates).await?;

    Ok(JobSummary {
        rows_read,
        observations: processed.len(),
        observations_inserted,
        violations,
        aggregates_updated: aggregates.len(),
    })
}
