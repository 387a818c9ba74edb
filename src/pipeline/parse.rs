//! CSV reading and dataset-level validation

use crate::error::{Error, Result};
use crate::records::RawRow;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Columns every input file must carry
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "study_id",
    "participant_id",
    "measurement_type",
    "value",
    "unit",
    "timestamp",
    "site_id",
];

/// Optional column, synthesized as blank when absent
pub const QUALITY_SCORE_COLUMN: &str = "quality_score";

/// Read and validate a measurements CSV file
pub fn read_csv(path: &Path) -> Result<Vec<RawRow>> {
    debug!("Reading CSV from {:?}", path);
    let file = std::fs::File::open(path)?;
    read_csv_from(file)
}

/// Read and validate measurements CSV content from any reader.
///
/// Every field is kept as text; empty strings stay empty strings. Rows
/// shorter than the header read their missing trailing fields as blank.
pub fn read_csv_from<R: Read>(input: R) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let position = |name: &str| headers.iter().position(|h| h == name);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| position(c).is_none())
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::Schema { missing });
    }

    // Checked above, so every lookup below resolves
    let col = |name: &str| position(name).unwrap_or_default();
    let idx_study = col("study_id");
    let idx_participant = col("participant_id");
    let idx_type = col("measurement_type");
    let idx_value = col("value");
    let idx_unit = col("unit");
    let idx_timestamp = col("timestamp");
    let idx_site = col("site_id");
    let idx_score = position(QUALITY_SCORE_COLUMN);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();

        rows.push(RawRow {
            study_id: field(idx_study),
            participant_id: field(idx_participant),
            measurement_type: field(idx_type),
            value: field(idx_value),
            unit: field(idx_unit).trim().to_string(),
            timestamp: field(idx_timestamp),
            site_id: field(idx_site),
            quality_score: idx_score.map(field).unwrap_or_default(),
        });
    }

    if let Some(pos) = rows.iter().position(|r| r.study_id.trim().is_empty()) {
        return Err(Error::Validation(format!(
            "study_id is required for all rows and cannot be blank (first blank at row {})",
            pos + 1
        )));
    }

    debug!("Read {} rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "study_id,participant_id,measurement_type,value,unit,timestamp,site_id,quality_score\n";

    #[test]
    fn test_reads_rows_in_order() {
        let csv = format!(
            "{HEADER}study001,p1,glucose,110, mg/dL ,2024-01-01T00:00:00Z,site1,0.9\n\
             study001,p2,weight,70,kg,2024-01-01T01:00:00Z,site2,\n"
        );
        let rows = read_csv_from(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].participant_id, "p1");
        assert_eq!(rows[0].unit, "mg/dL");
        assert_eq!(rows[0].quality_score, "0.9");
        assert_eq!(rows[1].participant_id, "p2");
        assert_eq!(rows[1].quality_score, "");
    }

    #[test]
    fn test_missing_columns_are_enumerated() {
        let csv = "study_id,participant_id,value,timestamp,site_id\nstudy001,p1,1,t,s\n";
        match read_csv_from(csv.as_bytes()) {
            Err(Error::Schema { missing }) => {
                assert_eq!(missing, vec!["measurement_type".to_string(), "unit".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_quality_score_column_synthesized() {
        let csv = "study_id,participant_id,measurement_type,value,unit,timestamp,site_id\n\
                   study001,p1,glucose,110,mg/dL,2024-01-01,site1\n";
        let rows = read_csv_from(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].quality_score, "");
    }

    #[test]
    fn test_values_are_not_coerced() {
        let csv = format!("{HEADER}study001,p1,glucose,0110.0,,2024-01-01,site1,null\n");
        let rows = read_csv_from(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].value, "0110.0");
        assert_eq!(rows[0].unit, "");
        assert_eq!(rows[0].quality_score, "null");
    }

    #[test]
    fn test_blank_study_id_fails_validation() {
        let csv = format!(
            "{HEADER}study001,p1,glucose,110,mg/dL,2024-01-01,site1,\n  ,p2,glucose,90,mg/dL,2024-01-01,site1,\n"
        );
        let err = read_csv_from(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_bom_and_padded_headers() {
        let csv = "\u{feff}study_id, participant_id ,measurement_type,value,unit,timestamp,site_id\n\
                   study001,p1,heart_rate,72,bpm,2024-01-01,site1\n";
        let rows = read_csv_from(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].study_id, "study001");
        assert_eq!(rows[0].participant_id, "p1");
    }

    #[test]
    fn test_short_rows_read_as_blank() {
        let csv = format!(
            "{HEADER}study001,p1,glucose,110,mg/dL,2024-01-01,site1\n\
             study001,p2,weight\n"
        );
        let rows = read_csv_from(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].site_id, "site1");
        assert_eq!(rows[0].quality_score, "");
        assert_eq!(rows[1].measurement_type, "weight");
        assert_eq!(rows[1].value, "");
        assert_eq!(rows[1].unit, "");
        assert_eq!(rows[1].site_id, "");
    }

    #[test]
    fn test_short_row_missing_study_id_fails_validation() {
        let csv = format!("{HEADER}study001,p1,glucose,110,mg/dL,2024-01-01,site1,\n ,p3\n");
        assert!(matches!(read_csv_from(csv.as_bytes()), Err(Error::Validation(_))));
    }
}
