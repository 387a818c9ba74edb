//! Default values for configuration

use super::RangeBounds;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default directory that relative CSV filenames resolve against
pub fn default_data_dir() -> PathBuf {
    std::env::var("CLINICAL_ETL_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Default SQLite pool size
pub fn default_max_connections() -> u32 {
    5
}

/// Default SQLite busy timeout (milliseconds)
pub fn default_busy_timeout_ms() -> u64 {
    60_000
}

/// Measurement types that must always carry a unit
pub fn default_required_unit_types() -> Vec<String> {
    ["glucose", "cholesterol", "weight", "height", "blood_pressure"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Plausible value ranges per measurement type
pub fn default_ranges() -> BTreeMap<String, RangeBounds> {
    [
        ("glucose", 40.0, 400.0),
        ("cholesterol", 50.0, 400.0),
        ("weight", 1.0, 400.0),
        ("height", 30.0, 300.0),
        ("heart_rate", 20.0, 240.0),
        ("blood_pressure_1", 50.0, 250.0),
        ("blood_pressure_2", 30.0, 200.0),
    ]
    .into_iter()
    .map(|(name, low, high)| (name.to_string(), RangeBounds { low, high }))
    .collect()
}

/// Default: flag quality scores outside [0, 1]
pub fn default_check_quality_score() -> bool {
    true
}

/// How often the CLI polls job status (milliseconds)
pub fn default_poll_interval_ms() -> u64 {
    200
}
