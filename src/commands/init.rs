//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::EtlDb;
use std::path::PathBuf;
use tracing::info;

/// Write a default config and create the database schema
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::AlreadyInitialized(
            config.paths.base_dir.display().to_string(),
        ));
    }

    std::fs::create_dir_all(&config.paths.base_dir)?;
    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    EtlDb::connect(&config).await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}

/// Print the post-init summary
pub fn print_init(config: &Config) {
    println!("✓ clinical-etl initialized at {}", config.paths.base_dir.display());
    println!("\nConfiguration: {}", config.paths.config_file.display());
    println!("Database: {}", config.paths.db_file.display());
    println!("Data directory: {}", config.data_dir.display());
    println!("\nNext steps:");
    println!("  clinical-etl run measurements.csv     # Process a file");
    println!("  clinical-etl jobs                     # List recent jobs");
}
