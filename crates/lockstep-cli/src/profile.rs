//! Run profiles: a TOML file holding the same settings as the command line.
//!
//! Every key is optional. Flags given on the command line win over the
//! profile, and the profile wins over the built-in defaults.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use lockstep_core::hardware::{DmgRevision, VipMemory};
use serde::Deserialize;

use crate::error::{CliError, Result, read_file};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Gb,
    Vip,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Revision {
    Rev0,
    RevA,
    RevB,
    #[default]
    RevC,
}

impl From<Revision> for DmgRevision {
    fn from(rev: Revision) -> Self {
        match rev {
            Revision::Rev0 => DmgRevision::Rev0,
            Revision::RevA => DmgRevision::RevA,
            Revision::RevB => DmgRevision::RevB,
            Revision::RevC => DmgRevision::RevC,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Ram {
    #[default]
    #[value(name = "2k")]
    #[serde(rename = "2k")]
    Kib2,
    #[value(name = "4k")]
    #[serde(rename = "4k")]
    Kib4,
}

impl From<Ram> for VipMemory {
    fn from(ram: Ram) -> Self {
        match ram {
            Ram::Kib2 => VipMemory::Kib2,
            Ram::Kib4 => VipMemory::Kib4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunProfile {
    pub platform: Platform,
    pub rom: Option<PathBuf>,
    pub frames: u64,
    pub sample_rate: u32,
    pub revision: Revision,
    pub ram: Ram,
    pub boot_rom: Option<PathBuf>,
    pub monitor_rom: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
}

impl Default for RunProfile {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            rom: None,
            frames: 60,
            sample_rate: 44_100,
            revision: Revision::default(),
            ram: Ram::default(),
            boot_rom: None,
            monitor_rom: None,
            screenshot: None,
        }
    }
}

impl RunProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = read_file(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let profile = toml::from_str(&text).map_err(|source| CliError::Profile {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded run profile {}", path.display());
        Ok(profile)
    }

    /// Overlay whatever the command line set.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(platform) = overrides.platform {
            self.platform = platform;
        }
        if let Some(rom) = overrides.rom {
            self.rom = Some(rom);
        }
        if let Some(frames) = overrides.frames {
            self.frames = frames;
        }
        if let Some(rate) = overrides.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(revision) = overrides.revision {
            self.revision = revision;
        }
        if let Some(ram) = overrides.ram {
            self.ram = ram;
        }
        if let Some(path) = overrides.boot_rom {
            self.boot_rom = Some(path);
        }
        if let Some(path) = overrides.monitor_rom {
            self.monitor_rom = Some(path);
        }
        if let Some(path) = overrides.screenshot {
            self.screenshot = Some(path);
        }
    }
}

/// Settings given explicitly on the command line.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub platform: Option<Platform>,
    pub rom: Option<PathBuf>,
    pub frames: Option<u64>,
    pub sample_rate: Option<u32>,
    pub revision: Option<Revision>,
    pub ram: Option<Ram>,
    pub boot_rom: Option<PathBuf>,
    pub monitor_rom: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
}
