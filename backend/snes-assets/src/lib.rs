//! SNES asset codecs and hardware-budget modeling: planar tiles, BGR555 palettes, OAM, cartridge
//! headers, VRAM budgets, sprite-sheet import, and ROM header analysis.

pub mod cartridge;
pub mod num;
pub mod oam;
pub mod palette;
pub mod render;
pub mod rom;
pub mod spritesheet;
pub mod store;
pub mod tile;
pub mod tilemap;
pub mod vram;

pub use cartridge::{CartridgeConfig, CartridgeError, Chip, MappingMode, RomSize, RomSpeed, SramSize};
pub use oam::{OAM_CAPACITY, ObjSizeSelect, OamEntry, OamTable};
pub use palette::{Palette, PaletteBank, SnesColor};
pub use rom::{RomAnalysis, RomHeader};
pub use store::AssetStore;
pub use tile::{Tile, TileDepth};
