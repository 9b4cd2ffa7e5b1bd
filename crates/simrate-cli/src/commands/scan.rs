//! Diagnostic memory search.

use anyhow::{Context, Result};
use simrate::memory::{find_in_module, scan_all};
use simrate::{ProcessHandle, ReadMemory};

use crate::commands::Options;
use crate::commands::locate::relative_to;

pub fn run(options: &Options, value: Option<f32>, signature: bool, limit: usize) -> Result<()> {
    let profiles = options.offset_profiles()?;
    let process = ProcessHandle::find_and_open(&options.process)
        .with_context(|| format!("Failed to attach to {}", options.process))?;
    let base = process.base_address();
    let size = process.module_size();

    println!("Base address: 0x{:X}", base);
    println!("Image size:   0x{:X}", size);
    println!();

    if signature {
        let layout = &profiles.layout;
        match find_in_module(&process, layout.signature.as_bytes())? {
            Some(position) => {
                let anchor = position.saturating_sub(layout.signature_back_distance);
                println!(
                    "Signature {:?}: 0x{:X} ({})",
                    layout.signature,
                    position,
                    relative_to(position, base, size)
                );
                println!("Anchor:       0x{:X} ({})", anchor, relative_to(anchor, base, size));
            }
            None => println!("Signature {:?} not found in module", layout.signature),
        }
        return Ok(());
    }

    if let Some(value) = value {
        let hits = scan_all(&process, &value.to_le_bytes())?;
        println!("{} matches for {}", hits.len(), value);
        for hit in hits.iter().take(limit) {
            println!("  0x{:X} ({})", hit, relative_to(*hit, base, size));
        }
        if hits.len() > limit {
            println!("  ... {} more", hits.len() - limit);
        }
    }

    Ok(())
}
