//! Typed records passed between pipeline stages

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One CSV line as read, all fields kept as text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub study_id: String,
    pub participant_id: String,
    pub measurement_type: String,
    pub value: String,
    pub unit: String,
    pub timestamp: String,
    pub site_id: String,
    pub quality_score: String,
}

/// A raw row after staging: identity, ordinal and normalized optional fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRow {
    pub raw_id: String,
    pub job_id: String,
    pub source_filename: String,
    /// 1-based position in the source file
    pub row_num: i64,
    pub raw: RawRow,
    /// `None` when the raw unit is blank
    pub unit: Option<String>,
    /// `None` when blank, "null", or unparseable
    pub quality_score: Option<f64>,
}

/// Observation payload. Numeric and textual values never coexist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ObservationValue {
    Numeric(f64),
    Text(String),
}

/// One canonical measurement derived from a staged row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedObservation {
    pub study_id: String,
    pub participant_id: String,
    pub site_id: String,
    pub measurement_type: String,
    pub measured_at: String,
    pub value: ObservationValue,
    pub unit: Option<String>,
    pub quality_score: Option<f64>,
    pub raw_row_id: String,
    pub job_id: String,
}

impl ProcessedObservation {
    pub fn value_num(&self) -> Option<f64> {
        match self.value {
            ObservationValue::Numeric(v) => Some(v),
            ObservationValue::Text(_) => None,
        }
    }

    pub fn value_text(&self) -> Option<&str> {
        match &self.value {
            ObservationValue::Numeric(_) => None,
            ObservationValue::Text(s) => Some(s),
        }
    }
}

/// Quality rule severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "warn" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            _ => Err(Error::Other(format!("Unknown severity: {}", s))),
        }
    }
}

/// Count of rows violating one rule within a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityViolation {
    pub rule_name: String,
    pub severity: Severity,
    pub affected_rows: i64,
}

/// Grouping key shared by aggregates
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub study_id: String,
    pub participant_id: String,
    pub site_id: String,
    pub measurement_type: String,
}

impl AggregateKey {
    pub fn of(obs: &ProcessedObservation) -> Self {
        Self {
            study_id: obs.study_id.clone(),
            participant_id: obs.participant_id.clone(),
            site_id: obs.site_id.clone(),
            measurement_type: obs.measurement_type.clone(),
        }
    }
}

/// Per-job summary for one aggregate key, merged into the running aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateUpdate {
    #[serde(flatten)]
    pub key: AggregateKey,
    pub cnt: i64,
    pub avg_num: f64,
    pub min_num: f64,
    pub max_num: f64,
    pub job_id: String,
}
