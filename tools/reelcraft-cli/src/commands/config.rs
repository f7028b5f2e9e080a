//! Print (and optionally save) the effective configuration.

use std::path::PathBuf;

use reelcraft_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig, path: Option<PathBuf>, save: bool) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        let path = path.unwrap_or_else(config_file_path);
        config.save_to(&path)?;
        eprintln!("Saved to {}", path.display());
    }
    Ok(())
}
