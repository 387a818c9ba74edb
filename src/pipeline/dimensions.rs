//! Study and participant dimension merge

use crate::error::Result;
use crate::store::EtlDb;
use tracing::debug;

/// Merge the dimensions referenced by a job's staged rows.
///
/// Studies are insert-if-absent. Participants are upserted and take the
/// site seen last (highest ordinal) in this job.
pub async fn upsert_dimensions_for_job(db: &EtlDb, job_id: &str) -> Result<()> {
    debug!(job_id, "Upserting dimensions");
    db.upsert_dimensions(job_id).await
}
