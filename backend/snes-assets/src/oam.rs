//! OBJ attribute memory: sprite entries, the 128-entry table, and OBSEL size pairs

use crate::num::GetBit;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const OAM_CAPACITY: usize = 128;
pub const OAM_LOW_TABLE_BYTES: usize = 4 * OAM_CAPACITY;
pub const OAM_HIGH_TABLE_BYTES: usize = OAM_CAPACITY / 4;
pub const OAM_BYTES: usize = OAM_LOW_TABLE_BYTES + OAM_HIGH_TABLE_BYTES;

pub const MAX_OBJ_TILE: u16 = 0x1FF;

// Unused slots are parked below the visible area
const HIDDEN_SPRITE_Y: u8 = 0xF0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ObjSizeSelect {
    // 0: 8x8 / 16x16
    #[default]
    Zero,
    // 1: 8x8 / 32x32
    One,
    // 2: 8x8 / 64x64
    Two,
    // 3: 16x16 / 32x32
    Three,
    // 4: 16x16 / 64x64
    Four,
    // 5: 32x32 / 64x64
    Five,
    // 6: 16x32 / 32x64
    Six,
    // 7: 16x32 / 32x32
    Seven,
}

impl ObjSizeSelect {
    pub const ALL: [Self; 8] =
        [Self::Zero, Self::One, Self::Two, Self::Three, Self::Four, Self::Five, Self::Six, Self::Seven];

    /// Size select from the OBSEL register value (bits 5-7).
    #[must_use]
    pub fn from_obsel(byte: u8) -> Self {
        Self::ALL[(byte >> 5) as usize]
    }

    #[must_use]
    pub fn to_obsel_bits(self) -> u8 {
        (self as u8) << 5
    }

    #[must_use]
    pub fn small_size(self) -> (u16, u16) {
        match self {
            Self::Zero | Self::One | Self::Two => (8, 8),
            Self::Three | Self::Four => (16, 16),
            Self::Five => (32, 32),
            Self::Six | Self::Seven => (16, 32),
        }
    }

    #[must_use]
    pub fn large_size(self) -> (u16, u16) {
        match self {
            Self::Zero => (16, 16),
            Self::One | Self::Three | Self::Seven => (32, 32),
            Self::Two | Self::Four | Self::Five => (64, 64),
            Self::Six => (32, 64),
        }
    }

    #[must_use]
    pub fn size_pair(self) -> [(u16, u16); 2] {
        [self.small_size(), self.large_size()]
    }

    /// Pixel dimensions of a sprite whose per-entry size bit is `is_large`.
    #[must_use]
    pub fn dimensions(self, is_large: bool) -> (u16, u16) {
        self.size_pair()[usize::from(is_large)]
    }
}

impl Display for ObjSizeSelect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ((sw, sh), (lw, lh)) = (self.small_size(), self.large_size());
        write!(f, "{sw}x{sh} / {lw}x{lh}")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OamError {
    #[error("OAM is full ({OAM_CAPACITY} entries)")]
    Full,
    #[error("OAM index {0} is out of range")]
    InvalidIndex(usize),
    #[error("OAM data must be {OAM_BYTES} bytes, got {0}")]
    TableLength(usize),
}

pub type OamResult<T> = Result<T, OamError>;

/// One hardware sprite.
///
/// `x` is the 9-bit signed screen position (-256..=255). `large` selects the second size of the
/// active [`ObjSizeSelect`]; the absolute pixel size is not stored per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OamEntry {
    pub x: i16,
    pub y: u8,
    pub tile: u16,
    pub palette: u8,
    pub priority: u8,
    pub h_flip: bool,
    pub v_flip: bool,
    pub large: bool,
}

impl OamEntry {
    #[must_use]
    pub fn new(x: i16, y: u8, tile: u16) -> Self {
        Self { x, y, tile, ..Self::default() }
    }

    fn hidden() -> Self {
        Self { y: HIDDEN_SPRITE_Y, ..Self::default() }
    }

    /// Attribute byte 3: `vhoopppN`.
    #[must_use]
    pub fn attributes(&self) -> u8 {
        (u8::from(self.v_flip) << 7)
            | (u8::from(self.h_flip) << 6)
            | ((self.priority & 0x03) << 4)
            | ((self.palette & 0x07) << 1)
            | u8::from(self.tile.bit(8))
    }

    /// Low table bytes plus the 2 high table bits (bit 0 = X bit 8, bit 1 = size).
    #[must_use]
    pub fn encode(&self) -> ([u8; 4], u8) {
        let x = (self.x as u16) & 0x1FF;
        let low = [x as u8, self.y, self.tile as u8, self.attributes()];
        let high = u8::from(x.bit(8)) | (u8::from(self.large) << 1);
        (low, high)
    }

    #[must_use]
    pub fn decode(low: [u8; 4], high: u8) -> Self {
        let [x_lsb, y, tile_lsb, attributes] = low;
        let x_raw = u16::from_le_bytes([x_lsb, high & 0x01]);
        // Sign-extend the 9-bit X coordinate
        let x = ((x_raw << 7) as i16) >> 7;

        Self {
            x,
            y,
            tile: u16::from_le_bytes([tile_lsb, attributes & 0x01]),
            palette: (attributes >> 1) & 0x07,
            priority: (attributes >> 4) & 0x03,
            h_flip: attributes.bit(6),
            v_flip: attributes.bit(7),
            large: high.bit(1),
        }
    }
}

/// The sprite table owned by a project. Never holds more than [`OAM_CAPACITY`] entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OamTable {
    entries: Vec<OamEntry>,
}

impl OamTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a batch of entries, keeping at most 128. The flag reports whether any
    /// entries were dropped.
    #[must_use]
    pub fn from_entries(entries: Vec<OamEntry>) -> (Self, bool) {
        let (entries, truncated) = truncate_to_capacity(entries);
        (Self { entries }, truncated)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= OAM_CAPACITY
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        OAM_CAPACITY - self.entries.len()
    }

    /// # Errors
    ///
    /// Returns [`OamError::Full`] if the table already holds 128 entries.
    pub fn push(&mut self, entry: OamEntry) -> OamResult<usize> {
        if self.is_full() {
            return Err(OamError::Full);
        }

        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    /// # Errors
    ///
    /// Returns [`OamError::InvalidIndex`] if `index` is out of range.
    pub fn remove(&mut self, index: usize) -> OamResult<OamEntry> {
        if index >= self.entries.len() {
            return Err(OamError::InvalidIndex(index));
        }

        Ok(self.entries.remove(index))
    }

    #[must_use]
    pub fn entries(&self) -> &[OamEntry] {
        &self.entries
    }

    /// Encode all 128 hardware slots: 512-byte low table followed by the 32-byte high table.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; OAM_BYTES] {
        let mut bytes = [0; OAM_BYTES];
        let hidden = OamEntry::hidden();

        for idx in 0..OAM_CAPACITY {
            let entry = self.entries.get(idx).unwrap_or(&hidden);
            let (low, high) = entry.encode();

            bytes[4 * idx..4 * idx + 4].copy_from_slice(&low);

            let high_addr = OAM_LOW_TABLE_BYTES + idx / 4;
            let high_shift = 2 * (idx % 4);
            bytes[high_addr] |= high << high_shift;
        }

        bytes
    }

    /// Decode all 128 hardware slots. Parked entries are decoded like any other.
    ///
    /// # Errors
    ///
    /// Returns [`OamError::TableLength`] unless `bytes` is exactly 544 bytes.
    pub fn from_bytes(bytes: &[u8]) -> OamResult<Self> {
        if bytes.len() != OAM_BYTES {
            return Err(OamError::TableLength(bytes.len()));
        }

        let entries = (0..OAM_CAPACITY)
            .map(|idx| {
                let low = [bytes[4 * idx], bytes[4 * idx + 1], bytes[4 * idx + 2], bytes[4 * idx + 3]];
                let high_bits = bytes[OAM_LOW_TABLE_BYTES + idx / 4] >> (2 * (idx % 4));
                OamEntry::decode(low, high_bits & 0x03)
            })
            .collect();

        Ok(Self { entries })
    }
}

/// Cap a batch of produced entries at the hardware limit.
#[must_use]
pub fn truncate_to_capacity(mut entries: Vec<OamEntry>) -> (Vec<OamEntry>, bool) {
    let truncated = entries.len() > OAM_CAPACITY;
    if truncated {
        log::warn!("Dropping {} OAM entries past the {OAM_CAPACITY}-entry limit", entries.len() - OAM_CAPACITY);
        entries.truncate(OAM_CAPACITY);
    }
    (entries, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn size_pairs() {
        assert_eq!(ObjSizeSelect::Zero.size_pair(), [(8, 8), (16, 16)]);
        assert_eq!(ObjSizeSelect::Five.dimensions(true), (64, 64));
        assert_eq!(ObjSizeSelect::Six.dimensions(false), (16, 32));
        assert_eq!(ObjSizeSelect::from_obsel(0xA3), ObjSizeSelect::Five);
        assert_eq!(ObjSizeSelect::Seven.to_obsel_bits(), 0xE0);
    }

    #[test]
    fn entry_encoding() {
        let entry = OamEntry {
            x: -1,
            y: 100,
            tile: 0x1C5,
            palette: 6,
            priority: 2,
            h_flip: true,
            v_flip: false,
            large: true,
        };

        let (low, high) = entry.encode();
        assert_eq!(low, [0xFF, 100, 0xC5, 0b0110_1101]);
        assert_eq!(high, 0b11);
        assert_eq!(OamEntry::decode(low, high), entry);
    }

    #[test]
    fn x_sign_extension() {
        assert_eq!(OamEntry::decode([0x00, 0, 0, 0], 0x01).x, -256);
        assert_eq!(OamEntry::decode([0xFF, 0, 0, 0], 0x00).x, 255);
    }

    #[test]
    fn table_rejects_129th_entry() {
        let mut table = OamTable::new();
        for i in 0..OAM_CAPACITY {
            assert_eq!(table.push(OamEntry::new(i as i16, 0, 0)), Ok(i));
        }

        assert!(table.is_full());
        assert_eq!(table.remaining(), 0);
        assert_eq!(table.push(OamEntry::default()), Err(OamError::Full));
        assert_eq!(table.len(), OAM_CAPACITY);
    }

    #[test]
    fn batch_truncation_is_reported() {
        let (table, truncated) = OamTable::from_entries(vec![OamEntry::default(); 130]);
        assert!(truncated);
        assert_eq!(table.len(), OAM_CAPACITY);

        let (table, truncated) = OamTable::from_entries(vec![OamEntry::default(); 3]);
        assert!(!truncated);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn table_bytes() {
        let mut table = OamTable::new();
        table.push(OamEntry::new(10, 20, 3)).unwrap();
        let mut second = OamEntry::new(-8, 0, 0x100);
        second.large = true;
        table.push(second).unwrap();

        let bytes = table.to_bytes();
        assert_eq!(&bytes[0..4], &[10, 20, 3, 0]);
        assert_eq!(&bytes[4..8], &[0xF8, 0, 0x00, 0x01]);
        assert_eq!(bytes[OAM_LOW_TABLE_BYTES], 0b0000_1100);
        // Unused slots are hidden
        assert_eq!(bytes[4 * 2 + 1], HIDDEN_SPRITE_Y);

        let decoded = OamTable::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.len(), OAM_CAPACITY);
        assert_eq!(&decoded.entries()[..2], table.entries());
        assert_eq!(OamTable::from_bytes(&bytes[1..]), Err(OamError::TableLength(OAM_BYTES - 1)));
    }
}
