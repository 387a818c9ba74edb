//! Data quality rules evaluated over a job's staged rows

use super::stage::QualityScore;
use super::transform::{parse_blood_pressure, parse_numeric, BLOOD_PRESSURE};
use crate::config::QualityConfig;
use crate::records::{QualityViolation, Severity, StagedRow};
use tracing::debug;

pub const MISSING_UNIT_REQUIRED: &str = "missing_unit_required";
pub const MALFORMED_BLOOD_PRESSURE: &str = "malformed_blood_pressure";
pub const NUMERIC_OUT_OF_RANGE: &str = "numeric_out_of_range";
pub const INVALID_QUALITY_SCORE: &str = "invalid_quality_score";

/// Count rule violations; only rules with at least one affected row are returned.
///
/// Values that do not parse as numbers are never out of range.
pub fn evaluate(rows: &[StagedRow], config: &QualityConfig) -> Vec<QualityViolation> {
    let required_units = config.required_unit_set();

    let mut missing_unit = 0i64;
    let mut malformed_bp = 0i64;
    let mut out_of_range = 0i64;
    let mut bad_score = 0i64;

    for row in rows {
        let mtype = row.raw.measurement_type.as_str();

        if required_units.contains(mtype) && row.raw.unit.trim().is_empty() {
            missing_unit += 1;
        }

        if mtype == BLOOD_PRESSURE && parse_blood_pressure(&row.raw.value).is_none() {
            malformed_bp += 1;
        }

        if let (Some(bounds), Some(value)) = (config.ranges.get(mtype), parse_numeric(&row.raw.value)) {
            if !bounds.contains(value) {
                out_of_range += 1;
            }
        }

        if config.check_quality_score {
            match QualityScore::parse(&row.raw.quality_score) {
                QualityScore::Unparseable => bad_score += 1,
                QualityScore::Value(v) if !(0.0..=1.0).contains(&v) => bad_score += 1,
                _ => {}
            }
        }
    }

    let counts = [
        (MISSING_UNIT_REQUIRED, Severity::Warn, missing_unit),
        (MALFORMED_BLOOD_PRESSURE, Severity::Error, malformed_bp),
        (NUMERIC_OUT_OF_RANGE, Severity::Warn, out_of_range),
        (INVALID_QUALITY_SCORE, Severity::Warn, bad_score),
    ];

    counts
        .into_iter()
        .filter(|(_, _, n)| *n > 0)
        .inspect(|(rule, severity, n)| {
            debug!(rule, %severity, affected_rows = n, "Quality rule violated")
        })
        .map(|(rule, severity, affected_rows)| QualityViolation {
            rule_name: rule.to_string(),
            severity,
            affected_rows,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RangeBounds;
    use crate::pipeline::stage::prepare_staged_rows;
    use crate::records::RawRow;

    fn raw(mtype: &str, value: &str, unit: &str, score: &str) -> RawRow {
        RawRow {
            study_id: "study001".to_string(),
            participant_id: "p1".to_string(),
            measurement_type: mtype.to_string(),
            value: value.to_string(),
            unit: unit.to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            site_id: "site1".to_string(),
            quality_score: score.to_string(),
        }
    }

    fn run(rows: Vec<RawRow>) -> Vec<QualityViolation> {
        evaluate(
            &prepare_staged_rows("job-1", "study.csv", rows),
            &QualityConfig::default(),
        )
    }

    fn count(violations: &[QualityViolation], rule: &str) -> Option<i64> {
        violations
            .iter()
            .find(|v| v.rule_name == rule)
            .map(|v| v.affected_rows)
    }

    #[test]
    fn test_clean_rows_emit_nothing() {
        let out = run(vec![
            raw("glucose", "110", "mg/dL", "0.9"),
            raw("blood_pressure", "120/80", "mmHg", ""),
            raw("temperature", "37", "", ""),
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_unit_only_for_required_types() {
        let out = run(vec![
            raw("blood_pressure", "120/80", "", ""),
            raw("weight", "70", " ", ""),
            raw("heart_rate", "72", "", ""),
        ]);
        assert_eq!(count(&out, MISSING_UNIT_REQUIRED), Some(2));
        let v = out.iter().find(|v| v.rule_name == MISSING_UNIT_REQUIRED).unwrap();
        assert_eq!(v.severity, Severity::Warn);
    }

    #[test]
    fn test_malformed_blood_pressure_is_error() {
        let out = run(vec![
            raw("blood_pressure", "120/80", "mmHg", ""),
            raw("blood_pressure", "300/80", "mmHg", ""),
            raw("blood_pressure", "high", "mmHg", ""),
        ]);
        assert_eq!(count(&out, MALFORMED_BLOOD_PRESSURE), Some(2));
        let v = out.iter().find(|v| v.rule_name == MALFORMED_BLOOD_PRESSURE).unwrap();
        assert_eq!(v.severity, Severity::Error);
    }

    #[test]
    fn test_out_of_range_excludes_unparseable() {
        let out = run(vec![
            raw("glucose", "500", "mg/dL", ""),
            raw("glucose", "abc", "mg/dL", ""),
            raw("glucose", "40", "mg/dL", ""),
            raw("heart_rate", "10", "bpm", ""),
            raw("temperature", "99", "C", ""),
        ]);
        assert_eq!(count(&out, NUMERIC_OUT_OF_RANGE), Some(2));
    }

    #[test]
    fn test_custom_ranges() {
        let mut config = QualityConfig::default();
        config
            .ranges
            .insert("temperature".to_string(), RangeBounds { low: 30.0, high: 45.0 });
        let rows = prepare_staged_rows("job-1", "a.csv", vec![raw("temperature", "99", "C", "")]);
        let out = evaluate(&rows, &config);
        assert_eq!(count(&out, NUMERIC_OUT_OF_RANGE), Some(1));
    }

    #[test]
    fn test_invalid_quality_scores() {
        let out = run(vec![
            raw("glucose", "110", "mg/dL", "1.2"),
            raw("glucose", "110", "mg/dL", "-0.1"),
            raw("glucose", "110", "mg/dL", "good"),
            raw("glucose", "110", "mg/dL", "null"),
            raw("glucose", "110", "mg/dL", "1"),
        ]);
        assert_eq!(count(&out, INVALID_QUALITY_SCORE), Some(3));

        let mut config = QualityConfig::default();
        config.check_quality_score = false;
        let rows = prepare_staged_rows("job-1", "a.csv", vec![raw("glucose", "110", "mg/dL", "7")]);
        assert!(evaluate(&rows, &config).is_empty());
    }
}
