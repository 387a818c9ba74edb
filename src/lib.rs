//! clinical-etl: batch ETL for clinical measurement CSV files
//!
//! A CSV file is staged, normalized into canonical observations, checked
//! against data quality rules and rolled up into per-participant aggregates,
//! all in SQLite. Jobs run in the background and report progress through
//! [`jobs::JobService`].

pub mod commands;
pub mod config;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod progress;
pub mod records;
pub mod store;

pub use error::{Error, Result};
