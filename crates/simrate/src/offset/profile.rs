use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::memory::layout::offset;

/// Known offsets for one build of the simulator.
///
/// All offsets are relative to the main module base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetProfile {
    pub build: String,
    /// `SizeOfImage` of the build, used to prefer the matching profile
    #[serde(default)]
    pub image_size: Option<usize>,
    /// Direct locations of the seconds offset
    #[serde(default)]
    pub value_offsets: Vec<u64>,
    /// Locations whose absolute address is referenced by the adjacent pointer pair
    #[serde(default)]
    pub anchor_offsets: Vec<u64>,
}

/// Layout of the structure around the seconds offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureLayout {
    pub pointer_spacing: u64,
    pub value_field_offset: u64,
    pub signature: String,
    pub signature_back_distance: u64,
}

impl Default for StructureLayout {
    fn default() -> Self {
        Self {
            pointer_spacing: offset::POINTER_SPACING,
            value_field_offset: offset::VALUE_FIELD_OFFSET,
            signature: offset::SIGNATURE.to_string(),
            signature_back_distance: offset::SIGNATURE_BACK_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetProfileSet {
    pub version: String,
    #[serde(default)]
    pub layout: StructureLayout,
    pub profiles: Vec<OffsetProfile>,
}

impl OffsetProfileSet {
    pub fn profile(&self, build: &str) -> Option<&OffsetProfile> {
        self.profiles
            .iter()
            .find(|profile| profile.build.eq_ignore_ascii_case(build))
    }

    /// Profiles in trial order: those matching `image_size` first, then the rest
    /// in table order.
    pub fn ordered_for(&self, image_size: usize) -> Vec<&OffsetProfile> {
        let (mut matching, rest): (Vec<_>, Vec<_>) = self
            .profiles
            .iter()
            .partition(|profile| profile.image_size == Some(image_size));
        matching.extend(rest);
        matching
    }

    pub fn validate(&self) -> Result<()> {
        if self.layout.pointer_spacing == 0 {
            return Err(Error::InvalidProfile("pointer_spacing must be non-zero".to_string()));
        }
        if self.layout.signature.is_empty() {
            return Err(Error::InvalidProfile("signature is empty".to_string()));
        }
        for profile in &self.profiles {
            if profile.build.is_empty() {
                return Err(Error::InvalidProfile("profile without build name".to_string()));
            }
        }
        Ok(())
    }
}

/// Offsets compiled into the binary.
pub fn builtin_profiles() -> OffsetProfileSet {
    OffsetProfileSet {
        version: "2024.1".to_string(),
        layout: StructureLayout::default(),
        profiles: vec![OffsetProfile {
            build: "msfs2024".to_string(),
            image_size: None,
            value_offsets: Vec::new(),
            anchor_offsets: vec![0x76F_7728, 0x796_70B8],
        }],
    }
}

pub fn load_profiles<P: AsRef<Path>>(path: P) -> Result<OffsetProfileSet> {
    let content = fs::read_to_string(&path)?;
    let profiles: OffsetProfileSet = serde_json::from_str(&content)?;
    profiles.validate()?;
    Ok(profiles)
}

pub fn save_profiles<P: AsRef<Path>>(path: P, profiles: &OffsetProfileSet) -> Result<()> {
    let content = serde_json::to_string_pretty(profiles)?;
    fs::write(path, content)?;
    Ok(())
}
