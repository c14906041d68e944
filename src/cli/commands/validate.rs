//! Enriched file validation command.

use std::path::Path;

use crate::{config, validate};

/// Print feature coverage for an enriched file
pub fn cmd_validate(file: &Path, source: Option<&Path>, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = config::load(config_path);
    let manifest = config.fields.manifest();

    println!("Validating: {:?}", file);
    println!();

    let report = match source {
        Some(source) => validate::validate_against(file, source, &manifest, &config.fields.id_candidates)?,
        None => validate::validate(file, &manifest)?,
    };
    print!("{report}");

    let missing: Vec<&str> = report.missing_features().collect();
    if !missing.is_empty() {
        println!();
        println!("Missing feature columns: {}", missing.join(", "));
    }
    Ok(())
}
