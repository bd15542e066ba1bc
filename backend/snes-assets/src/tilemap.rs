//! 32x32 background tilemaps

use crate::num::GetBit;

pub const TILEMAP_WIDTH: usize = 32;
pub const TILEMAP_HEIGHT: usize = 32;
pub const TILEMAP_ENTRIES: usize = TILEMAP_WIDTH * TILEMAP_HEIGHT;
pub const TILEMAP_BYTES: usize = 2 * TILEMAP_ENTRIES;

/// One tilemap word: `vhopppcc cccccccc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TilemapEntry {
    pub tile: u16,
    pub palette: u8,
    pub priority: bool,
    pub h_flip: bool,
    pub v_flip: bool,
}

impl TilemapEntry {
    #[must_use]
    pub const fn tile(tile: u16) -> Self {
        Self { tile: tile & 0x3FF, palette: 0, priority: false, h_flip: false, v_flip: false }
    }

    #[must_use]
    pub fn from_word(word: u16) -> Self {
        Self {
            tile: word & 0x3FF,
            palette: ((word >> 10) & 0x07) as u8,
            priority: word.bit(13),
            h_flip: word.bit(14),
            v_flip: word.bit(15),
        }
    }

    #[must_use]
    pub fn to_word(self) -> u16 {
        (self.tile & 0x3FF)
            | (u16::from(self.palette & 0x07) << 10)
            | (u16::from(self.priority) << 13)
            | (u16::from(self.h_flip) << 14)
            | (u16::from(self.v_flip) << 15)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tilemap {
    entries: Vec<TilemapEntry>,
}

impl Default for Tilemap {
    fn default() -> Self {
        Self::new()
    }
}

impl Tilemap {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: vec![TilemapEntry::default(); TILEMAP_ENTRIES] }
    }

    /// Parse little-endian tilemap words. Short input leaves the remaining entries blank and
    /// anything past 2048 bytes is ignored.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut tilemap = Self::new();
        for (entry, chunk) in tilemap.entries.iter_mut().zip(bytes.chunks_exact(2)) {
            *entry = TilemapEntry::from_word(u16::from_le_bytes([chunk[0], chunk[1]]));
        }

        if bytes.len() > TILEMAP_BYTES {
            log::warn!("Ignoring {} bytes past the end of a 32x32 tilemap", bytes.len() - TILEMAP_BYTES);
        }

        tilemap
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.entries.iter().flat_map(|entry| entry.to_word().to_le_bytes()).collect()
    }

    /// # Panics
    ///
    /// Panics if `x` or `y` is not in `0..32`.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> TilemapEntry {
        assert!(x < TILEMAP_WIDTH && y < TILEMAP_HEIGHT, "tilemap cell ({x}, {y}) out of range");
        self.entries[y * TILEMAP_WIDTH + x]
    }

    /// # Panics
    ///
    /// Panics if `x` or `y` is not in `0..32`.
    pub fn set(&mut self, x: usize, y: usize, entry: TilemapEntry) {
        assert!(x < TILEMAP_WIDTH && y < TILEMAP_HEIGHT, "tilemap cell ({x}, {y}) out of range");
        self.entries[y * TILEMAP_WIDTH + x] = entry;
    }

    pub fn fill(&mut self, entry: TilemapEntry) {
        self.entries.fill(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[TilemapEntry] {
        &self.entries
    }

    /// Distinct tile numbers used by this map, ascending.
    #[must_use]
    pub fn referenced_tiles(&self) -> Vec<u16> {
        let mut tiles: Vec<u16> = self.entries.iter().map(|entry| entry.tile).collect();
        tiles.sort_unstable();
        tiles.dedup();
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn word_layout() {
        let entry = TilemapEntry { tile: 0x2AB, palette: 5, priority: true, h_flip: false, v_flip: true };
        assert_eq!(entry.to_word(), 0b1011_0110_1010_1011);
        assert_eq!(TilemapEntry::from_word(entry.to_word()), entry);
    }

    #[test]
    fn referenced_tiles_are_distinct() {
        let mut tilemap = Tilemap::new();
        tilemap.set(0, 0, TilemapEntry::tile(7));
        tilemap.set(31, 31, TilemapEntry::tile(7));
        tilemap.set(5, 2, TilemapEntry::tile(3));

        assert_eq!(tilemap.referenced_tiles(), vec![0, 3, 7]);
    }

    #[test]
    fn bytes_round_trip() {
        let mut tilemap = Tilemap::new();
        tilemap.set(1, 0, TilemapEntry { tile: 1, palette: 2, priority: false, h_flip: true, v_flip: false });

        let bytes = tilemap.to_bytes();
        assert_eq!(bytes.len(), TILEMAP_BYTES);
        assert_eq!(&bytes[2..4], &[0x01, 0x48]);
        assert_eq!(Tilemap::from_bytes(&bytes), tilemap);
    }
}
