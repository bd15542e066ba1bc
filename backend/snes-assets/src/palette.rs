//! BGR555 colors, 16-color palettes, and the project-wide palette bank

use crate::num::{GetBit, read_u16_le, write_u16_le};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const PALETTE_COLORS: usize = 16;
pub const PALETTE_BANK_CAPACITY: usize = 16;
pub const CGRAM_PALETTE_BYTES: usize = 2 * PALETTE_COLORS;

/// A 15-bit SNES color: red in bits 0-4, green in bits 5-9, blue in bits 10-14.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnesColor(u16);

impl SnesColor {
    pub const BLACK: Self = Self(0);
    pub const WHITE: Self = Self(0x7FFF);

    /// Bit 15 is not part of the color and is dropped.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw & 0x7FFF)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Channels are masked to 5 bits.
    #[inline]
    #[must_use]
    pub const fn from_rgb5(r: u8, g: u8, b: u8) -> Self {
        Self(((b as u16 & 0x1F) << 10) | ((g as u16 & 0x1F) << 5) | (r as u16 & 0x1F))
    }

    #[inline]
    #[must_use]
    pub fn r(self) -> u8 {
        self.0.bits(0..=4) as u8
    }

    #[inline]
    #[must_use]
    pub fn g(self) -> u8 {
        self.0.bits(5..=9) as u8
    }

    #[inline]
    #[must_use]
    pub fn b(self) -> u8 {
        self.0.bits(10..=14) as u8
    }

    #[inline]
    #[must_use]
    pub fn to_rgb5(self) -> (u8, u8, u8) {
        (self.r(), self.g(), self.b())
    }

    /// Quantize 8-bit channels down to 5 bits by dropping the low 3 bits.
    #[inline]
    #[must_use]
    pub const fn from_rgb888(r: u8, g: u8, b: u8) -> Self {
        Self::from_rgb5(r >> 3, g >> 3, b >> 3)
    }

    /// Expand to 8-bit channels, replicating the high bits so that 31 maps to 255.
    #[inline]
    #[must_use]
    pub fn to_rgb888(self) -> (u8, u8, u8) {
        let expand = |c: u8| (c << 3) | (c >> 2);
        (expand(self.r()), expand(self.g()), expand(self.b()))
    }
}

impl Display for SnesColor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:04X}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("CGRAM palette data must be {CGRAM_PALETTE_BYTES} bytes, got {0}")]
    ByteLength(usize),
    #[error("palette bank is full ({PALETTE_BANK_CAPACITY} palettes)")]
    BankFull,
    #[error("palette slot {0} does not exist")]
    InvalidSlot(usize),
}

pub type PaletteResult<T> = Result<T, PaletteError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Palette {
    pub colors: [SnesColor; PALETTE_COLORS],
}

impl Palette {
    #[must_use]
    pub const fn new(colors: [SnesColor; PALETTE_COLORS]) -> Self {
        Self { colors }
    }

    /// Index of the first slot holding `color`, ignoring the transparent slot 0.
    #[must_use]
    pub fn index_of(&self, color: SnesColor) -> Option<usize> {
        self.colors.iter().skip(1).position(|&c| c == color).map(|i| i + 1)
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.colors.iter().all(|&c| c == SnesColor::BLACK)
    }

    /// Whether every color in `colors` appears in one of the opaque slots 1-15.
    #[must_use]
    pub fn contains_all(&self, colors: &[SnesColor]) -> bool {
        colors.iter().all(|&color| self.index_of(color).is_some())
    }

    #[must_use]
    pub fn to_cgram_bytes(&self) -> [u8; CGRAM_PALETTE_BYTES] {
        let mut bytes = [0; CGRAM_PALETTE_BYTES];
        for (i, color) in self.colors.iter().enumerate() {
            write_u16_le(&mut bytes, 2 * i, color.raw());
        }
        bytes
    }

    /// # Errors
    ///
    /// Returns [`PaletteError::ByteLength`] unless `bytes` is exactly 32 bytes.
    pub fn from_cgram_bytes(bytes: &[u8]) -> PaletteResult<Self> {
        if bytes.len() != CGRAM_PALETTE_BYTES {
            return Err(PaletteError::ByteLength(bytes.len()));
        }

        Ok(Self {
            colors: std::array::from_fn(|i| SnesColor::from_raw(read_u16_le(bytes, 2 * i))),
        })
    }
}

/// The built-in palette bank used by a clean project.
///
/// Slot 0 is a grey ramp. Slots 1-7 are ramps over the channels selected by the slot number's
/// bits (bit 0 red, bit 1 green, bit 2 blue). Slots 8-15 are left black for sprite palettes.
#[must_use]
pub fn default_palettes() -> [Palette; PALETTE_BANK_CAPACITY] {
    std::array::from_fn(|slot| {
        if slot >= 8 {
            return Palette::default();
        }

        let colors = std::array::from_fn(|i| {
            if i == 0 {
                return SnesColor::BLACK;
            }

            let intensity = (2 * i + 1) as u8;
            if slot == 0 {
                return SnesColor::from_rgb5(intensity, intensity, intensity);
            }

            let channel = |bit: u8| if (slot as u8).bit(bit) { intensity } else { 0 };
            SnesColor::from_rgb5(channel(0), channel(1), channel(2))
        });
        Palette::new(colors)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaletteBank {
    palettes: Vec<Palette>,
}

impl Default for PaletteBank {
    fn default() -> Self {
        Self::default_bank()
    }
}

impl PaletteBank {
    #[must_use]
    pub fn empty() -> Self {
        Self { palettes: Vec::with_capacity(PALETTE_BANK_CAPACITY) }
    }

    #[must_use]
    pub fn default_bank() -> Self {
        Self { palettes: default_palettes().to_vec() }
    }

    /// Build a bank from a persisted snapshot, keeping at most 16 palettes.
    #[must_use]
    pub fn from_palettes(mut palettes: Vec<Palette>) -> Self {
        if palettes.len() > PALETTE_BANK_CAPACITY {
            log::warn!(
                "Palette bank snapshot has {} palettes; keeping the first {PALETTE_BANK_CAPACITY}",
                palettes.len()
            );
            palettes.truncate(PALETTE_BANK_CAPACITY);
        }
        Self { palettes }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.palettes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.palettes.len() == PALETTE_BANK_CAPACITY
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&Palette> {
        self.palettes.get(slot)
    }

    /// # Errors
    ///
    /// Returns [`PaletteError::InvalidSlot`] if `slot` is past the end of the bank.
    pub fn set(&mut self, slot: usize, palette: Palette) -> PaletteResult<()> {
        let existing = self.palettes.get_mut(slot).ok_or(PaletteError::InvalidSlot(slot))?;
        *existing = palette;
        Ok(())
    }

    /// Append a palette, returning its slot.
    ///
    /// # Errors
    ///
    /// Returns [`PaletteError::BankFull`] if the bank already holds 16 palettes.
    pub fn push(&mut self, palette: Palette) -> PaletteResult<usize> {
        if self.is_full() {
            return Err(PaletteError::BankFull);
        }

        self.palettes.push(palette);
        Ok(self.palettes.len() - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Palette> {
        self.palettes.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Palette] {
        &self.palettes
    }

    /// All palettes laid out as CGRAM bytes, slot 0 first.
    #[must_use]
    pub fn to_cgram_bytes(&self) -> Vec<u8> {
        self.palettes.iter().flat_map(Palette::to_cgram_bytes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn channel_layout() {
        let color = SnesColor::from_raw(0b11111_00000_00001);
        assert_eq!(color.to_rgb5(), (1, 0, 31));

        let green = SnesColor::from_rgb5(0, 31, 0);
        assert_eq!(green.raw(), 0x03E0);
    }

    #[test]
    fn rgb5_round_trip_all_colors() {
        for raw in 0..=0x7FFF {
            let color = SnesColor::from_raw(raw);
            let (r, g, b) = color.to_rgb5();
            assert_eq!(SnesColor::from_rgb5(r, g, b), color);
        }
    }

    #[test]
    fn from_raw_drops_bit_15() {
        assert_eq!(SnesColor::from_raw(0xFFFF), SnesColor::WHITE);
    }

    #[test]
    fn rgb888_conversion() {
        assert_eq!(SnesColor::WHITE.to_rgb888(), (255, 255, 255));
        assert_eq!(SnesColor::from_rgb888(255, 0, 7), SnesColor::from_rgb5(31, 0, 0));
        assert_eq!(SnesColor::from_rgb888(8, 16, 24).to_rgb5(), (1, 2, 3));
    }

    #[test]
    fn index_of_skips_transparent_slot() {
        let mut palette = Palette::default();
        palette.colors[3] = SnesColor::WHITE;

        assert_eq!(palette.index_of(SnesColor::WHITE), Some(3));
        // Black lives in slot 0 but slot 0 does not count
        let mut with_black = Palette::new([SnesColor::WHITE; PALETTE_COLORS]);
        with_black.colors[0] = SnesColor::BLACK;
        assert_eq!(with_black.index_of(SnesColor::BLACK), None);
    }

    #[test]
    fn cgram_bytes() {
        let mut palette = Palette::default();
        palette.colors[1] = SnesColor::from_raw(0x1234);

        let bytes = palette.to_cgram_bytes();
        assert_eq!(&bytes[2..4], &[0x34, 0x12]);
        assert_eq!(Palette::from_cgram_bytes(&bytes).unwrap(), palette);
        assert_eq!(Palette::from_cgram_bytes(&bytes[..30]), Err(PaletteError::ByteLength(30)));
    }

    #[test]
    fn default_bank_is_stable() {
        let bank = default_palettes();
        assert_eq!(bank, default_palettes());
        assert_eq!(bank[0].colors[15], SnesColor::from_rgb5(31, 31, 31));
        assert_eq!(bank[1].colors[1], SnesColor::from_rgb5(3, 0, 0));
        assert_eq!(bank[6].colors[15], SnesColor::from_rgb5(0, 31, 31));
        assert!(bank.iter().all(|palette| palette.colors[0] == SnesColor::BLACK));
        assert!(bank[8..].iter().all(Palette::is_blank));
    }

    #[test]
    fn bank_capacity() {
        let mut bank = PaletteBank::default_bank();
        assert!(bank.is_full());
        assert_eq!(bank.push(Palette::default()), Err(PaletteError::BankFull));

        let mut small = PaletteBank::empty();
        assert_eq!(small.push(Palette::default()), Ok(0));
        assert_eq!(small.set(1, Palette::default()), Err(PaletteError::InvalidSlot(1)));

        bank.set(15, Palette::new([SnesColor::WHITE; PALETTE_COLORS])).unwrap();
        assert_eq!(bank.get(15).unwrap().colors[4], SnesColor::WHITE);
    }
}
