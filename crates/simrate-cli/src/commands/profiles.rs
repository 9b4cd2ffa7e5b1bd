//! Offset profile table export.

use std::path::Path;

use anyhow::{Context, Result};
use simrate::save_profiles;

use crate::commands::Options;

/// Print the effective profile table, or write it to `output`.
pub fn run(options: &Options, output: Option<&Path>) -> Result<()> {
    let profiles = options.offset_profiles()?;

    match output {
        Some(path) => {
            save_profiles(path, &profiles)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Wrote {} profiles (version {}) to {}",
                profiles.profiles.len(),
                profiles.version,
                path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&profiles)?),
    }

    Ok(())
}
