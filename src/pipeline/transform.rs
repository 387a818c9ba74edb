//! Staged rows to canonical observations
//!
//! Each staged row becomes one observation, except a well-formed composite
//! blood-pressure reading ("SYS/DIA"), which becomes a systolic and a
//! diastolic observation.

use crate::records::{ObservationValue, ProcessedObservation, StagedRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::ops::RangeInclusive;

/// Composite measurement type carrying "SYS/DIA"
pub const BLOOD_PRESSURE: &str = "blood_pressure";
pub const BLOOD_PRESSURE_SYSTOLIC: &str = "blood_pressure_systolic";
pub const BLOOD_PRESSURE_DIASTOLIC: &str = "blood_pressure_diastolic";
pub const BLOOD_PRESSURE_UNIT: &str = "mmHg";

pub const SYSTOLIC_RANGE: RangeInclusive<i64> = 50..=250;
pub const DIASTOLIC_RANGE: RangeInclusive<i64> = 30..=200;

/// Parse a raw value as a finite decimal number
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse "SYS/DIA" with both parts integral and within physiological bounds
pub fn parse_blood_pressure(raw: &str) -> Option<(i64, i64)> {
    let (sys, dia) = raw.split_once('/')?;
    if dia.contains('/') {
        return None;
    }
    let sys: i64 = sys.trim().parse().ok()?;
    let dia: i64 = dia.trim().parse().ok()?;
    (SYSTOLIC_RANGE.contains(&sys) && DIASTOLIC_RANGE.contains(&dia)).then_some((sys, dia))
}

/// Normalize a timestamp to RFC 3339 UTC, keeping the trimmed input when unrecognized
pub fn normalize_timestamp(raw: &str) -> String {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true);
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return naive.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true);
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return midnight.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true);
    }

    s.to_string()
}

/// Expand one staged row into its observations
pub fn transform_row(row: &StagedRow) -> Vec<ProcessedObservation> {
    let observation = |measurement_type: &str, value: ObservationValue, unit: Option<String>| {
        ProcessedObservation {
            study_id: row.raw.study_id.clone(),
            participant_id: row.raw.participant_id.clone(),
            site_id: row.raw.site_id.clone(),
            measurement_type: measurement_type.to_string(),
            measured_at: normalize_timestamp(&row.raw.timestamp),
            value,
            unit,
            quality_score: row.quality_score,
            raw_row_id: row.raw_id.clone(),
            job_id: row.job_id.clone(),
        }
    };

    let measurement_type = row.raw.measurement_type.as_str();

    if measurement_type == BLOOD_PRESSURE {
        if let Some((sys, dia)) = parse_blood_pressure(&row.raw.value) {
            let unit = Some(BLOOD_PRESSURE_UNIT.to_string());
            return vec![
                observation(
                    BLOOD_PRESSURE_SYSTOLIC,
                    ObservationValue::Numeric(sys as f64),
                    unit.clone(),
                ),
                observation(
                    BLOOD_PRESSURE_DIASTOLIC,
                    ObservationValue::Numeric(dia as f64),
                    unit,
                ),
            ];
        }
    }

    let value = match parse_numeric(&row.raw.value) {
        Some(v) => ObservationValue::Numeric(v),
        None => ObservationValue::Text(row.raw.value.clone()),
    };
    vec![observation(measurement_type, value, row.unit.clone())]
}

/// Expand all staged rows, preserving input order
pub fn build_processed(rows: &[StagedRow]) -> Vec<ProcessedObservation> {
    rows.iter().flat_map(transform_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RawRow;

    fn staged(measurement_type: &str, value: &str, unit: Option<&str>) -> StagedRow {
        StagedRow {
            raw_id: "raw-1".to_string(),
            job_id: "job-1".to_string(),
            source_filename: "study.csv".to_string(),
            row_num: 1,
            raw: RawRow {
                study_id: "study001".to_string(),
                participant_id: "p1".to_string(),
                measurement_type: measurement_type.to_string(),
                value: value.to_string(),
                unit: unit.unwrap_or_default().to_string(),
                timestamp: "2024-01-01T01:00:00Z".to_string(),
                site_id: "site1".to_string(),
                quality_score: "0.8".to_string(),
            },
            unit: unit.map(str::to_string),
            quality_score: Some(0.8),
        }
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("110"), Some(110.0));
        assert_eq!(parse_numeric(" 5.5 "), Some(5.5));
        assert_eq!(parse_numeric("1e2"), Some(100.0));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("120/80"), None);
    }

    #[test]
    fn test_parse_blood_pressure() {
        assert_eq!(parse_blood_pressure("120/80"), Some((120, 80)));
        assert_eq!(parse_blood_pressure(" 120 / 80 "), Some((120, 80)));
        assert_eq!(parse_blood_pressure("50/30"), Some((50, 30)));
        assert_eq!(parse_blood_pressure("250/200"), Some((250, 200)));
        assert_eq!(parse_blood_pressure("49/80"), None);
        assert_eq!(parse_blood_pressure("120/201"), None);
        assert_eq!(parse_blood_pressure("120/80/60"), None);
        assert_eq!(parse_blood_pressure("120.5/80"), None);
        assert_eq!(parse_blood_pressure("120"), None);
        assert_eq!(parse_blood_pressure(""), None);
    }

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(normalize_timestamp("2024-01-01T00:00:00Z"), "2024-01-01T00:00:00Z");
        assert_eq!(normalize_timestamp("2024-01-01T02:00:00+02:00"), "2024-01-01T00:00:00Z");
        assert_eq!(normalize_timestamp("2024-01-01 08:30:00"), "2024-01-01T08:30:00Z");
        assert_eq!(normalize_timestamp("2024-01-01"), "2024-01-01T00:00:00Z");
        assert_eq!(normalize_timestamp(" yesterday "), "yesterday");
    }

    #[test]
    fn test_blood_pressure_splits_into_two() {
        let out = transform_row(&staged(BLOOD_PRESSURE, "120/80", None));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].measurement_type, BLOOD_PRESSURE_SYSTOLIC);
        assert_eq!(out[0].value, ObservationValue::Numeric(120.0));
        assert_eq!(out[1].measurement_type, BLOOD_PRESSURE_DIASTOLIC);
        assert_eq!(out[1].value, ObservationValue::Numeric(80.0));
        for obs in &out {
            assert_eq!(obs.unit.as_deref(), Some("mmHg"));
            assert_eq!(obs.value_text(), None);
            assert_eq!(obs.quality_score, Some(0.8));
            assert_eq!(obs.raw_row_id, "raw-1");
        }
    }

    #[test]
    fn test_malformed_blood_pressure_falls_back() {
        let out = transform_row(&staged(BLOOD_PRESSURE, "120-80", Some("mmHg")));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].measurement_type, BLOOD_PRESSURE);
        assert_eq!(out[0].value, ObservationValue::Text("120-80".to_string()));

        // Out-of-bounds composite that is still a plain number stays numeric
        let out = transform_row(&staged(BLOOD_PRESSURE, "300", None));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, ObservationValue::Numeric(300.0));
    }

    #[test]
    fn test_plain_rows() {
        let out = transform_row(&staged("glucose", "110", Some("mg/dL")));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value_num(), Some(110.0));
        assert_eq!(out[0].unit.as_deref(), Some("mg/dL"));
        assert_eq!(out[0].measured_at, "2024-01-01T01:00:00Z");

        let out = transform_row(&staged("glucose", "abc", Some("mg/dL")));
        assert_eq!(out[0].value_num(), None);
        assert_eq!(out[0].value_text(), Some("abc"));
    }

    #[test]
    fn test_build_processed_preserves_order() {
        let rows = vec![
            staged("glucose", "110", Some("mg/dL")),
            staged(BLOOD_PRESSURE, "120/80", None),
            staged("heart_rate", "72", Some("bpm")),
        ];
        let types: Vec<_> = build_processed(&rows)
            .into_iter()
            .map(|o| o.measurement_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "glucose",
                BLOOD_PRESSURE_SYSTOLIC,
                BLOOD_PRESSURE_DIASTOLIC,
                "heart_rate"
            ]
        );
    }
}
