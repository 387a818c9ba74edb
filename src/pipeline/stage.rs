//! Staging: stable identities and durable raw lineage

use crate::error::Result;
use crate::records::{RawRow, StagedRow};
use crate::store::EtlDb;
use tracing::debug;
use uuid::Uuid;

/// Outcome of reading a raw quality score
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityScore {
    /// Blank or the literal "null"
    Absent,
    Value(f64),
    Unparseable,
}

impl QualityScore {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("null") {
            return QualityScore::Absent;
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() => QualityScore::Value(v),
            _ => QualityScore::Unparseable,
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            QualityScore::Value(v) => Some(v),
            QualityScore::Absent | QualityScore::Unparseable => None,
        }
    }
}

/// Attach fresh ids, 1-based ordinals and normalized optional fields
pub fn prepare_staged_rows(job_id: &str, filename: &str, rows: Vec<RawRow>) -> Vec<StagedRow> {
    rows.into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let unit = Some(raw.unit.trim())
                .filter(|u| !u.is_empty())
                .map(str::to_string);
            let quality_score = QualityScore::parse(&raw.quality_score).value();
            StagedRow {
                raw_id: Uuid::new_v4().to_string(),
                job_id: job_id.to_string(),
                source_filename: filename.to_string(),
                row_num: i as i64 + 1,
                raw,
                unit,
                quality_score,
            }
        })
        .collect()
}

/// Stage rows durably and return them carrying their persisted ids.
///
/// Ordinals staged by an earlier run of the same job keep the id they were
/// first given, so downstream lineage stays stable across re-submissions.
pub async fn stage_rows(
    db: &EtlDb,
    job_id: &str,
    filename: &str,
    rows: Vec<RawRow>,
) -> Result<Vec<StagedRow>> {
    let mut staged = prepare_staged_rows(job_id, filename, rows);
    let persisted = db.insert_staging_rows(&staged).await?;

    let mut reused = 0usize;
    for row in &mut staged {
        if let Some(id) = persisted.get(&row.row_num) {
            if *id != row.raw_id {
                row.raw_id = id.clone();
                reused += 1;
            }
        }
    }

    if reused > 0 {
        debug!(job_id, reused, "Reused previously staged row ids");
    }
    Ok(staged)
}
