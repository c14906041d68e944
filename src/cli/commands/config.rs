//! Config file command.

use std::path::Path;

use crate::config::{self, Config};

/// Print the effective config, or write defaults with `--init`
pub fn cmd_config(init: bool, config_path: Option<&Path>) -> anyhow::Result<()> {
    if init {
        let target = match config_path {
            Some(p) => Some(p.to_path_buf()),
            None => config::config_path(),
        };
        if let Some(path) = &target
            && path.exists()
        {
            println!("Config file already exists: {:?}", path);
            return Ok(());
        }
        let written = config::save(&Config::default(), config_path)?;
        println!("✓ Wrote default config to {:?}", written);
        return Ok(());
    }

    let config = config::load(config_path);
    match config_path.map(Path::to_path_buf).or_else(config::config_path) {
        Some(path) if path.exists() => println!("# {}", path.display()),
        Some(path) => println!("# {} (not found, showing defaults)", path.display()),
        None => println!("# defaults"),
    }
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}
