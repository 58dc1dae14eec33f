//! Show or create the configuration file.

use pipcast_common::config::{config_file_path, AppConfig};

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    let path = config_file_path();
    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} (not found, showing defaults)", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

pub fn init(force: bool) -> anyhow::Result<()> {
    let path = config_file_path();
    anyhow::ensure!(
        force || !path.exists(),
        "{} already exists (use --force to overwrite)",
        path.display()
    );

    let written = AppConfig::default().save()?;
    println!("Configuration written to {}", written.display());
    Ok(())
}
