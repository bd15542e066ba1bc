//! ROM image analysis: copier header detection, header search and parsing, and checksums

pub mod scan;

use crate::cartridge::{
    HEADER_BLOCK_LEN, HEADER_CHECKSUM_OFFSET, HEADER_CHIPSET_OFFSET, HEADER_COMPLEMENT_OFFSET,
    HEADER_COUNTRY_OFFSET, HEADER_DEVELOPER_OFFSET, HEADER_EMULATION_RESET_OFFSET, HEADER_MAP_OFFSET,
    HEADER_NATIVE_IRQ_OFFSET, HEADER_NATIVE_NMI_OFFSET, HEADER_ROM_SIZE_OFFSET, HEADER_SRAM_SIZE_OFFSET,
    HEADER_TITLE_LEN, HEADER_VERSION_OFFSET, HeaderLocation, MappingMode, RomSpeed,
};
use crate::num::{read_u16_le, write_u16_le};
use crc::Crc;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const COPIER_HEADER_LEN: usize = 512;
pub const MIN_ROM_LEN: usize = 0x8000;

const CRC: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RomError {
    #[error("ROM is {len} bytes; SNES ROMs are at least {MIN_ROM_LEN} bytes")]
    TooSmall { len: usize },
    #[error("ROM of {len} bytes has no room for a header at {location}")]
    HeaderOutOfBounds { len: usize, location: HeaderLocation },
}

pub type RomResult<T> = Result<T, RomError>;

/// Copier headers are detected purely by size: a dump with one is 512 bytes past a multiple of 1 KB.
#[inline]
#[must_use]
pub fn has_copier_header(len: usize) -> bool {
    len % 1024 == COPIER_HEADER_LEN
}

#[must_use]
pub fn strip_copier_header(data: &[u8]) -> &[u8] {
    if has_copier_header(data.len()) {
        log::debug!("Stripping {COPIER_HEADER_LEN}-byte copier header from {}-byte ROM", data.len());
        &data[COPIER_HEADER_LEN..]
    } else {
        data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStandard {
    Ntsc,
    Pal,
}

impl Display for VideoStandard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ntsc => write!(f, "NTSC"),
            Self::Pal => write!(f, "PAL"),
        }
    }
}

#[must_use]
pub fn country_name(country: u8) -> Option<&'static str> {
    let name = match country {
        0x00 => "Japan",
        0x01 => "North America",
        0x02 => "Europe",
        0x03 => "Sweden",
        0x04 => "Finland",
        0x05 => "Denmark",
        0x06 => "France",
        0x07 => "Netherlands",
        0x08 => "Spain",
        0x09 => "Germany",
        0x0A => "Italy",
        0x0B => "China",
        0x0C => "Indonesia",
        0x0D => "South Korea",
        0x0E => "International",
        0x0F => "Canada",
        0x10 => "Brazil",
        0x11 => "Australia",
        _ => return None,
    };
    Some(name)
}

/// Parsed contents of a 64-byte header block ($xFC0-$xFFF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    pub location: HeaderLocation,
    pub title: String,
    pub map_byte: u8,
    pub mapping: Option<MappingMode>,
    pub speed: RomSpeed,
    pub chipset: u8,
    // None if the size byte does not fit in a u32 shift
    pub rom_size_kb: Option<u32>,
    pub ram_size_kb: Option<u32>,
    pub country: u8,
    pub developer_id: u8,
    pub version: u8,
    pub checksum: u16,
    pub complement: u16,
    // Emulation-mode RESET ($FFFC)
    pub reset_vector: u16,
    // Native-mode NMI ($FFEA)
    pub nmi_vector: u16,
    // Native-mode IRQ ($FFEE)
    pub irq_vector: u16,
}

impl RomHeader {
    /// # Errors
    ///
    /// Returns [`RomError::HeaderOutOfBounds`] if the header block at `location` does not fit in `rom`.
    pub fn parse(rom: &[u8], location: HeaderLocation) -> RomResult<Self> {
        let start = location.offset();
        let Some(block) = rom.get(start..start + HEADER_BLOCK_LEN) else {
            return Err(RomError::HeaderOutOfBounds { len: rom.len(), location });
        };

        let map_byte = block[HEADER_MAP_OFFSET];
        let (mapping, speed) = match MappingMode::from_header_byte(map_byte) {
            Some((mapping, speed)) => (Some(mapping), speed),
            None if map_byte & 0x10 != 0 => (None, RomSpeed::Fast),
            None => (None, RomSpeed::Slow),
        };

        let ram_size_kb = match block[HEADER_SRAM_SIZE_OFFSET] {
            0 => Some(0),
            byte => 1_u32.checked_shl(byte.into()),
        };

        Ok(Self {
            location,
            title: parse_title(&block[..HEADER_TITLE_LEN]),
            map_byte,
            mapping,
            speed,
            chipset: block[HEADER_CHIPSET_OFFSET],
            rom_size_kb: 1_u32.checked_shl(block[HEADER_ROM_SIZE_OFFSET].into()),
            ram_size_kb,
            country: block[HEADER_COUNTRY_OFFSET],
            developer_id: block[HEADER_DEVELOPER_OFFSET],
            version: block[HEADER_VERSION_OFFSET],
            checksum: read_u16_le(block, HEADER_CHECKSUM_OFFSET),
            complement: read_u16_le(block, HEADER_COMPLEMENT_OFFSET),
            reset_vector: read_u16_le(block, HEADER_EMULATION_RESET_OFFSET),
            nmi_vector: read_u16_le(block, HEADER_NATIVE_NMI_OFFSET),
            irq_vector: read_u16_le(block, HEADER_NATIVE_IRQ_OFFSET),
        })
    }

    #[inline]
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.checksum ^ self.complement == 0xFFFF
    }

    #[must_use]
    pub fn country_name(&self) -> Option<&'static str> {
        country_name(self.country)
    }

    #[must_use]
    pub fn video_standard(&self) -> VideoStandard {
        match self.country {
            0x02..=0x0C | 0x11 => VideoStandard::Pal,
            _ => VideoStandard::Ntsc,
        }
    }
}

fn parse_title(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != b' ' && b != 0).map_or(0, |i| i + 1);
    bytes[..end].iter().map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '.' }).collect()
}

/// Repeat the trailing partial chunk of a ROM until its size is a power of two, the way a
/// cartridge with two unequal ROM chips mirrors the smaller one.
#[must_use]
pub fn mirror_to_power_of_two(rom: &[u8]) -> Vec<u8> {
    let mut mirrored = rom.to_vec();
    while !mirrored.is_empty() && !mirrored.len().is_power_of_two() {
        let chunk_len = 1 << mirrored.len().trailing_zeros();
        let chunk_start = mirrored.len() - chunk_len;
        mirrored.extend_from_within(chunk_start..);
    }
    mirrored
}

/// 16-bit sum of every byte of the mirrored ROM.
#[must_use]
pub fn compute_checksum(rom: &[u8]) -> u16 {
    mirror_to_power_of_two(rom).iter().fold(0_u16, |sum, &byte| sum.wrapping_add(byte.into()))
}

/// Recompute the checksum and store it with its complement in the header at `location`.
///
/// # Errors
///
/// Returns [`RomError::HeaderOutOfBounds`] if the header block does not fit in `rom`.
pub fn fix_checksum(rom: &mut [u8], location: HeaderLocation) -> RomResult<u16> {
    let start = location.offset();
    if rom.len() < start + HEADER_BLOCK_LEN {
        return Err(RomError::HeaderOutOfBounds { len: rom.len(), location });
    }

    // Any consistent pair sums to $1FE, so the placeholder does not change the result
    write_u16_le(rom, start + HEADER_COMPLEMENT_OFFSET, 0xFFFF);
    write_u16_le(rom, start + HEADER_CHECKSUM_OFFSET, 0x0000);

    let checksum = compute_checksum(rom);
    write_u16_le(rom, start + HEADER_COMPLEMENT_OFFSET, !checksum);
    write_u16_le(rom, start + HEADER_CHECKSUM_OFFSET, checksum);

    log::debug!("Wrote checksum ${checksum:04X} at {location}");

    Ok(checksum)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomAnalysis {
    pub copier_header: bool,
    // Length after stripping any copier header
    pub rom_len: usize,
    pub header: Option<RomHeader>,
    // Every location that fit in the buffer, in search order
    pub candidates: Vec<RomHeader>,
    pub crc32: u32,
    pub computed_checksum: u16,
}

impl RomAnalysis {
    /// Whether the chosen header's checksum matches the ROM contents.
    #[must_use]
    pub fn checksum_matches_data(&self) -> bool {
        self.header.as_ref().is_some_and(|header| header.checksum == self.computed_checksum)
    }
}

/// Analyze a full ROM image, with or without a copier header.
///
/// Not finding a header is not an error; [`RomAnalysis::header`] is `None` in that case.
///
/// # Errors
///
/// Returns [`RomError::TooSmall`] if the ROM is under 32 KB once any copier header is removed.
pub fn analyze_rom(data: &[u8]) -> RomResult<RomAnalysis> {
    let copier_header = has_copier_header(data.len());
    let rom = strip_copier_header(data);
    if rom.len() < MIN_ROM_LEN {
        return Err(RomError::TooSmall { len: rom.len() });
    }

    let candidates: Vec<_> = HeaderLocation::SEARCH_ORDER
        .into_iter()
        .filter_map(|location| RomHeader::parse(rom, location).ok())
        .collect();
    let header = candidates.iter().find(|header| header.checksum_valid()).cloned();

    match &header {
        Some(header) => log::info!(
            "Found {} header at {} with title '{}'",
            header.mapping.map_or_else(|| format!("${:02X}", header.map_byte), |m| m.to_string()),
            header.location,
            header.title
        ),
        None => log::warn!("No header with a valid checksum complement found; header is unrecognized"),
    }

    let analysis = RomAnalysis {
        copier_header,
        rom_len: rom.len(),
        header,
        candidates,
        crc32: CRC.checksum(rom),
        computed_checksum: compute_checksum(rom),
    };

    if analysis.header.is_some() {
        log::info!("Header checksum matches ROM data: {}", analysis.checksum_matches_data());
    }

    Ok(analysis)
}
