//! TOML application config for the SNES asset tools

use serde::{Deserialize, Serialize};
use snes_assets::cartridge::{
    CartridgeConfig, CartridgeResult, Chip, HeaderFields, MappingMode, RomSize, RomSpeed, SramSize,
};
use snes_assets::spritesheet::ImportSettings;
use snes_assets::tile::TileDepth;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILENAME: &str = "snes-assets.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportAppConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub depth: TileDepth,
    pub frame_duration: u8,
}

impl Default for ImportAppConfig {
    fn default() -> Self {
        let settings = ImportSettings::default();
        Self {
            frame_width: settings.frame_width,
            frame_height: settings.frame_height,
            depth: settings.depth,
            frame_duration: settings.frame_duration,
        }
    }
}

impl ImportAppConfig {
    #[must_use]
    pub fn to_settings(&self, name: impl Into<String>) -> ImportSettings {
        ImportSettings {
            name: name.into(),
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            depth: self.depth,
            frame_duration: self.frame_duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartridgeAppConfig {
    pub rom_size_kb: u32,
    pub mapping: MappingMode,
    pub speed: RomSpeed,
    pub sram_kb: u32,
    pub chip: Chip,
    pub title: String,
    pub country: u8,
}

impl Default for CartridgeAppConfig {
    fn default() -> Self {
        let cartridge = CartridgeConfig::default();
        let fields = HeaderFields::default();
        Self {
            rom_size_kb: cartridge.rom_size.kb(),
            mapping: cartridge.mapping,
            speed: cartridge.speed,
            sram_kb: cartridge.sram_size.kb(),
            chip: cartridge.chip,
            title: fields.title,
            country: fields.country,
        }
    }
}

impl CartridgeAppConfig {
    /// # Errors
    ///
    /// Returns an error if a size is outside the allowed list or the combination is invalid.
    pub fn to_cartridge_config(&self) -> CartridgeResult<CartridgeConfig> {
        let config = CartridgeConfig {
            rom_size: RomSize::from_kb(self.rom_size_kb)?,
            mapping: self.mapping,
            speed: self.speed,
            sram_size: SramSize::from_kb(self.sram_kb)?,
            chip: self.chip,
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn header_fields(&self) -> HeaderFields {
        HeaderFields { title: self.title.clone(), country: self.country, ..HeaderFields::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RomScanAppConfig {
    pub max_palettes: usize,
    pub min_tile_run: usize,
}

impl Default for RomScanAppConfig {
    fn default() -> Self {
        Self { max_palettes: 64, min_tile_run: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub import: ImportAppConfig,
    #[serde(default)]
    pub cartridge: CartridgeAppConfig,
    #[serde(default)]
    pub rom_scan: RomScanAppConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error serializing config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("error writing config to '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl AppConfig {
    /// Load config from `path`. A missing or unparseable file yields the default config.
    #[must_use]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let Ok(config_str) = fs::read_to_string(path) else {
            log::info!("No config file at '{}'; using defaults", path.display());
            return Self::default();
        };

        toml::from_str(&config_str).unwrap_or_else(|err| {
            log::error!("Error deserializing app config from '{}': {err}", path.display());
            Self::default()
        })
    }

    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str)
            .map_err(|source| ConfigError::Write { path: path.display().to_string(), source })?;

        log::info!("Saved config to '{}'", path.display());
        Ok(())
    }
}

#[must_use]
pub fn default_config_path() -> PathBuf {
    CONFIG_FILENAME.into()
}
