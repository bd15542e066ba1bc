//! Cartridge profiles and the header bytes derived from them
//!
//! Every derived value is a pure function of [`CartridgeConfig`]'s fields; nothing derived is ever
//! stored.

use crate::num::write_u16_le;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const LOROM_HEADER_ADDR: usize = 0x007FC0;
pub const HIROM_HEADER_ADDR: usize = 0x00FFC0;
pub const EXHIROM_HEADER_ADDR: usize = 0x40FFC0;

pub const HEADER_LEN: usize = 0x20;
// Header block plus the native and emulation vector tables
pub const HEADER_BLOCK_LEN: usize = 0x40;

pub(crate) const HEADER_TITLE_LEN: usize = 21;
pub(crate) const HEADER_MAP_OFFSET: usize = 0x15;
pub(crate) const HEADER_CHIPSET_OFFSET: usize = 0x16;
pub(crate) const HEADER_ROM_SIZE_OFFSET: usize = 0x17;
pub(crate) const HEADER_SRAM_SIZE_OFFSET: usize = 0x18;
pub(crate) const HEADER_COUNTRY_OFFSET: usize = 0x19;
pub(crate) const HEADER_DEVELOPER_OFFSET: usize = 0x1A;
pub(crate) const HEADER_VERSION_OFFSET: usize = 0x1B;
pub(crate) const HEADER_COMPLEMENT_OFFSET: usize = 0x1C;
pub(crate) const HEADER_CHECKSUM_OFFSET: usize = 0x1E;
pub(crate) const HEADER_NATIVE_NMI_OFFSET: usize = 0x2A;
pub(crate) const HEADER_NATIVE_IRQ_OFFSET: usize = 0x2E;
pub(crate) const HEADER_EMULATION_RESET_OFFSET: usize = 0x3C;
pub(crate) const HEADER_EMULATION_IRQ_OFFSET: usize = 0x3E;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeaderLocation {
    LoRom,
    HiRom,
    ExHiRom,
}

impl HeaderLocation {
    // Order in which an analyzer should try locations
    pub const SEARCH_ORDER: [Self; 3] = [Self::LoRom, Self::HiRom, Self::ExHiRom];

    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Self::LoRom => LOROM_HEADER_ADDR,
            Self::HiRom => HIROM_HEADER_ADDR,
            Self::ExHiRom => EXHIROM_HEADER_ADDR,
        }
    }
}

impl Display for HeaderLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoRom => write!(f, "LoROM (${:06X})", self.offset()),
            Self::HiRom => write!(f, "HiROM (${:06X})", self.offset()),
            Self::ExHiRom => write!(f, "ExHiROM (${:06X})", self.offset()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum MappingMode {
    #[default]
    LoRom,
    HiRom,
    ExHiRom,
    Sa1,
}

impl MappingMode {
    pub const ALL: [Self; 4] = [Self::LoRom, Self::HiRom, Self::ExHiRom, Self::Sa1];

    /// $FFD5 value for slow ROM; fast ROM sets bit 4.
    #[must_use]
    pub const fn base_header_byte(self) -> u8 {
        match self {
            Self::LoRom => 0x20,
            Self::HiRom => 0x21,
            Self::Sa1 => 0x23,
            Self::ExHiRom => 0x25,
        }
    }

    /// Decode a $FFD5 map byte. Map modes outside of this enum (e.g. S-DD1's $22) yield `None`.
    #[must_use]
    pub fn from_header_byte(byte: u8) -> Option<(Self, RomSpeed)> {
        let speed = if byte & 0x10 != 0 { RomSpeed::Fast } else { RomSpeed::Slow };
        let mapping = match byte & !0x10 {
            0x20 => Self::LoRom,
            0x21 => Self::HiRom,
            0x23 => Self::Sa1,
            0x25 => Self::ExHiRom,
            _ => return None,
        };
        Some((mapping, speed))
    }

    #[must_use]
    pub const fn header_location(self) -> HeaderLocation {
        match self {
            Self::LoRom | Self::Sa1 => HeaderLocation::LoRom,
            Self::HiRom => HeaderLocation::HiRom,
            Self::ExHiRom => HeaderLocation::ExHiRom,
        }
    }

    #[must_use]
    pub const fn max_rom_kb(self) -> u32 {
        match self {
            Self::LoRom | Self::HiRom => 4096,
            Self::ExHiRom | Self::Sa1 => 8192,
        }
    }
}

impl Display for MappingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoRom => write!(f, "LoROM"),
            Self::HiRom => write!(f, "HiROM"),
            Self::ExHiRom => write!(f, "ExHiROM"),
            Self::Sa1 => write!(f, "SA-1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum RomSpeed {
    // 2.68 MHz ROM access (SlowROM)
    #[default]
    Slow,
    // 3.58 MHz ROM access in banks $80-$FF (FastROM)
    Fast,
}

impl Display for RomSpeed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "SlowROM"),
            Self::Fast => write!(f, "FastROM"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Chip {
    #[default]
    None,
    Dsp1,
    SuperFx,
    Sa1,
    Cx4,
}

impl Chip {
    pub const ALL: [Self; 5] = [Self::None, Self::Dsp1, Self::SuperFx, Self::Sa1, Self::Cx4];

    #[must_use]
    pub const fn max_sram_kb(self) -> u32 {
        match self {
            Self::None => 128,
            Self::Dsp1 => 32,
            Self::SuperFx => 64,
            Self::Sa1 => 256,
            // CX4 boards have no save RAM
            Self::Cx4 => 0,
        }
    }

    #[must_use]
    pub const fn required_mapping(self) -> Option<MappingMode> {
        match self {
            Self::None | Self::Dsp1 => None,
            Self::SuperFx | Self::Cx4 => Some(MappingMode::LoRom),
            Self::Sa1 => Some(MappingMode::Sa1),
        }
    }

    /// $FFD6 value. SRAM is assumed to be battery-backed.
    #[must_use]
    pub const fn cartridge_type_byte(self, has_sram: bool) -> u8 {
        match (self, has_sram) {
            (Self::None, false) => 0x00,
            (Self::None, true) => 0x02,
            (Self::Dsp1, false) => 0x03,
            (Self::Dsp1, true) => 0x05,
            (Self::SuperFx, false) => 0x13,
            (Self::SuperFx, true) => 0x15,
            (Self::Sa1, false) => 0x33,
            (Self::Sa1, true) => 0x35,
            (Self::Cx4, _) => 0xF3,
        }
    }
}

impl Display for Chip {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Dsp1 => write!(f, "DSP-1"),
            Self::SuperFx => write!(f, "Super FX"),
            Self::Sa1 => write!(f, "SA-1"),
            Self::Cx4 => write!(f, "CX4"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RomSize {
    Kb128,
    Kb256,
    #[default]
    Kb512,
    Kb1024,
    Kb2048,
    Kb4096,
    Kb8192,
}

impl RomSize {
    pub const ALL: [Self; 7] =
        [Self::Kb128, Self::Kb256, Self::Kb512, Self::Kb1024, Self::Kb2048, Self::Kb4096, Self::Kb8192];

    #[must_use]
    pub const fn kb(self) -> u32 {
        match self {
            Self::Kb128 => 128,
            Self::Kb256 => 256,
            Self::Kb512 => 512,
            Self::Kb1024 => 1024,
            Self::Kb2048 => 2048,
            Self::Kb4096 => 4096,
            Self::Kb8192 => 8192,
        }
    }

    #[must_use]
    pub const fn bytes(self) -> usize {
        self.kb() as usize * 1024
    }

    /// # Errors
    ///
    /// Returns [`CartridgeError::UnsupportedRomSize`] for anything outside the allowed list.
    pub fn from_kb(kb: u32) -> CartridgeResult<Self> {
        Self::ALL
            .into_iter()
            .find(|size| size.kb() == kb)
            .ok_or(CartridgeError::UnsupportedRomSize(kb))
    }

    /// $FFD7 value: `log2(bytes) - 10`, i.e. the size is `1 << byte` KB.
    #[must_use]
    pub const fn header_byte(self) -> u8 {
        self.kb().ilog2() as u8
    }

    #[must_use]
    pub fn from_header_byte(byte: u8) -> Option<Self> {
        let kb = 1_u32.checked_shl(byte.into())?;
        Self::from_kb(kb).ok()
    }
}

impl Display for RomSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} KB ({} Mbit)", self.kb(), self.kb() / 128)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SramSize {
    #[default]
    None,
    Kb2,
    Kb4,
    Kb8,
    Kb16,
    Kb32,
    Kb64,
    Kb128,
    Kb256,
}

impl SramSize {
    pub const ALL: [Self; 9] = [
        Self::None,
        Self::Kb2,
        Self::Kb4,
        Self::Kb8,
        Self::Kb16,
        Self::Kb32,
        Self::Kb64,
        Self::Kb128,
        Self::Kb256,
    ];

    #[must_use]
    pub const fn kb(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Kb2 => 2,
            Self::Kb4 => 4,
            Self::Kb8 => 8,
            Self::Kb16 => 16,
            Self::Kb32 => 32,
            Self::Kb64 => 64,
            Self::Kb128 => 128,
            Self::Kb256 => 256,
        }
    }

    /// # Errors
    ///
    /// Returns [`CartridgeError::UnsupportedSramSize`] for anything outside the allowed list.
    pub fn from_kb(kb: u32) -> CartridgeResult<Self> {
        Self::ALL
            .into_iter()
            .find(|size| size.kb() == kb)
            .ok_or(CartridgeError::UnsupportedSramSize(kb))
    }

    /// $FFD8 value: 0 for no SRAM, otherwise the size is `1 << byte` KB.
    #[must_use]
    pub const fn header_byte(self) -> u8 {
        match self {
            Self::None => 0,
            _ => self.kb().ilog2() as u8,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("unsupported ROM size: {0} KB")]
    UnsupportedRomSize(u32),
    #[error("unsupported SRAM size: {0} KB")]
    UnsupportedSramSize(u32),
    #[error("{chip} supports at most {max_kb} KB of SRAM, requested {sram_kb} KB")]
    SramTooLarge { chip: Chip, sram_kb: u32, max_kb: u32 },
    #[error("{chip} requires {required} mapping, configured for {actual}")]
    ChipRequiresMapping { chip: Chip, required: MappingMode, actual: MappingMode },
    #[error("{mapping} mapping requires the {chip} chip")]
    MappingRequiresChip { mapping: MappingMode, chip: Chip },
    #[error("{mapping} supports at most {max_kb} KB of ROM, requested {rom_kb} KB")]
    RomTooLarge { mapping: MappingMode, rom_kb: u32, max_kb: u32 },
    #[error("ExHiROM requires more than 4096 KB of ROM, requested {0} KB")]
    ExHiRomTooSmall(u32),
    #[error("ROM buffer of {len} bytes is too small for a header at ${location:06X}")]
    RomBufferTooSmall { len: usize, location: usize },
}

pub type CartridgeResult<T> = Result<T, CartridgeError>;

/// A single field update to a [`CartridgeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeChange {
    RomSize(RomSize),
    Mapping(MappingMode),
    Speed(RomSpeed),
    SramSize(SramSize),
    Chip(Chip),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CartridgeConfig {
    pub rom_size: RomSize,
    pub mapping: MappingMode,
    pub speed: RomSpeed,
    pub sram_size: SramSize,
    pub chip: Chip,
}

impl CartridgeConfig {
    /// # Errors
    ///
    /// Returns the first rule the combination of fields violates.
    pub fn validate(&self) -> CartridgeResult<()> {
        let max_sram_kb = self.chip.max_sram_kb();
        if self.sram_size.kb() > max_sram_kb {
            return Err(CartridgeError::SramTooLarge {
                chip: self.chip,
                sram_kb: self.sram_size.kb(),
                max_kb: max_sram_kb,
            });
        }

        if let Some(required) = self.chip.required_mapping() {
            if required != self.mapping {
                return Err(CartridgeError::ChipRequiresMapping {
                    chip: self.chip,
                    required,
                    actual: self.mapping,
                });
            }
        }

        if self.mapping == MappingMode::Sa1 && self.chip != Chip::Sa1 {
            return Err(CartridgeError::MappingRequiresChip { mapping: self.mapping, chip: Chip::Sa1 });
        }

        let max_rom_kb = self.mapping.max_rom_kb();
        if self.rom_size.kb() > max_rom_kb {
            return Err(CartridgeError::RomTooLarge {
                mapping: self.mapping,
                rom_kb: self.rom_size.kb(),
                max_kb: max_rom_kb,
            });
        }

        if self.mapping == MappingMode::ExHiRom && self.rom_size.kb() <= 4096 {
            return Err(CartridgeError::ExHiRomTooSmall(self.rom_size.kb()));
        }

        Ok(())
    }

    /// Apply a change and return the new config, or an error leaving `self` untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated config fails [`Self::validate`].
    pub fn apply(&self, change: CartridgeChange) -> CartridgeResult<Self> {
        let mut updated = *self;
        match change {
            CartridgeChange::RomSize(rom_size) => updated.rom_size = rom_size,
            CartridgeChange::Mapping(mapping) => updated.mapping = mapping,
            CartridgeChange::Speed(speed) => updated.speed = speed,
            CartridgeChange::SramSize(sram_size) => updated.sram_size = sram_size,
            CartridgeChange::Chip(chip) => updated.chip = chip,
        }

        updated.validate()?;
        Ok(updated)
    }

    #[must_use]
    pub const fn mapping_header_byte(&self) -> u8 {
        match self.speed {
            RomSpeed::Slow => self.mapping.base_header_byte(),
            RomSpeed::Fast => self.mapping.base_header_byte() | 0x10,
        }
    }

    #[must_use]
    pub const fn cartridge_type_byte(&self) -> u8 {
        self.chip.cartridge_type_byte(self.sram_size.kb() != 0)
    }

    #[must_use]
    pub const fn rom_size_header_byte(&self) -> u8 {
        self.rom_size.header_byte()
    }

    #[must_use]
    pub const fn sram_size_header_byte(&self) -> u8 {
        self.sram_size.header_byte()
    }

    /// Name of the linker memory-map configuration matching this cartridge's mapping.
    #[must_use]
    pub const fn linker_config_id(&self) -> &'static str {
        match self.mapping {
            MappingMode::LoRom => "lorom",
            MappingMode::HiRom => "hirom",
            MappingMode::ExHiRom => "exhirom",
            MappingMode::Sa1 => "sa1",
        }
    }

    /// CPU address of the first ROM byte as the linker sees it.
    #[must_use]
    pub const fn rom_start_address(&self) -> &'static str {
        match self.mapping {
            MappingMode::LoRom | MappingMode::Sa1 => "$008000",
            MappingMode::HiRom | MappingMode::ExHiRom => "$C00000",
        }
    }

    #[must_use]
    pub const fn header_location(&self) -> HeaderLocation {
        self.mapping.header_location()
    }

    /// The 32-byte $FFC0-$FFDF header image with a placeholder checksum pair of $0000/$FFFF.
    #[must_use]
    pub fn header_block(&self, fields: &HeaderFields) -> [u8; HEADER_LEN] {
        let mut block = [0; HEADER_LEN];

        block[..HEADER_TITLE_LEN].copy_from_slice(&fields.title_bytes());
        block[HEADER_MAP_OFFSET] = self.mapping_header_byte();
        block[HEADER_CHIPSET_OFFSET] = self.cartridge_type_byte();
        block[HEADER_ROM_SIZE_OFFSET] = self.rom_size_header_byte();
        block[HEADER_SRAM_SIZE_OFFSET] = self.sram_size_header_byte();
        block[HEADER_COUNTRY_OFFSET] = fields.country;
        block[HEADER_DEVELOPER_OFFSET] = fields.developer_id;
        block[HEADER_VERSION_OFFSET] = fields.version;
        write_u16_le(&mut block, HEADER_COMPLEMENT_OFFSET, 0xFFFF);
        write_u16_le(&mut block, HEADER_CHECKSUM_OFFSET, 0x0000);

        block
    }

    /// Write the header block and interrupt vectors into `rom` at this config's header location.
    /// The checksum pair is left as the $0000/$FFFF placeholder; see [`crate::rom::fix_checksum`].
    ///
    /// # Errors
    ///
    /// Returns [`CartridgeError::RomBufferTooSmall`] if the header would not fit in `rom`.
    pub fn write_header(
        &self,
        rom: &mut [u8],
        fields: &HeaderFields,
        vectors: InterruptVectors,
    ) -> CartridgeResult<()> {
        let location = self.header_location().offset();
        if rom.len() < location + HEADER_BLOCK_LEN {
            return Err(CartridgeError::RomBufferTooSmall { len: rom.len(), location });
        }

        rom[location..location + HEADER_LEN].copy_from_slice(&self.header_block(fields));

        let vector_table = &mut rom[location..location + HEADER_BLOCK_LEN];
        write_u16_le(vector_table, HEADER_NATIVE_NMI_OFFSET, vectors.nmi);
        write_u16_le(vector_table, HEADER_NATIVE_IRQ_OFFSET, vectors.irq);
        write_u16_le(vector_table, HEADER_EMULATION_RESET_OFFSET, vectors.reset);
        write_u16_le(vector_table, HEADER_EMULATION_IRQ_OFFSET, vectors.irq);

        log::debug!(
            "Wrote {} header at ${location:06X} (map ${:02X}, type ${:02X})",
            self.mapping,
            self.mapping_header_byte(),
            self.cartridge_type_byte()
        );

        Ok(())
    }
}

/// Header fields that are not derived from the cartridge profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFields {
    pub title: String,
    pub country: u8,
    pub developer_id: u8,
    pub version: u8,
}

impl Default for HeaderFields {
    fn default() -> Self {
        Self { title: String::new(), country: 0x01, developer_id: 0x00, version: 0x00 }
    }
}

impl HeaderFields {
    /// Title as 21 space-padded bytes. Characters outside printable ASCII become '?'.
    #[must_use]
    pub fn title_bytes(&self) -> [u8; HEADER_TITLE_LEN] {
        let mut bytes = [b' '; HEADER_TITLE_LEN];
        for (byte, c) in bytes.iter_mut().zip(self.title.chars()) {
            *byte = if c.is_ascii_graphic() || c == ' ' { c as u8 } else { b'?' };
        }
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterruptVectors {
    pub reset: u16,
    pub nmi: u16,
    pub irq: u16,
}
