//! 8x8 tiles and the SNES planar bitplane codec
//!
//! Tiles are stored as interleaved bitplane pairs: for each pair of planes, 8 rows of 2 bytes
//! (even plane then odd plane), with bit 7 of each byte holding the leftmost pixel. A 4bpp tile is
//! the 2bpp layout for planes 0-1 followed by the same layout for planes 2-3, and 8bpp continues
//! with planes 4-5 and 6-7.

use crate::num::GetBit;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const TILE_WIDTH: usize = 8;
pub const TILE_HEIGHT: usize = 8;
pub const TILE_PIXELS: usize = TILE_WIDTH * TILE_HEIGHT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum TileDepth {
    // 4-color
    Two,
    // 16-color
    #[default]
    Four,
    // 256-color
    Eight,
}

impl TileDepth {
    // OBJ tiles are always 4bpp
    pub const OBJ: Self = Self::Four;

    pub const ALL: [Self; 3] = [Self::Two, Self::Four, Self::Eight];

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Two => 2,
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    #[inline]
    #[must_use]
    pub const fn bytes_per_tile(self) -> usize {
        8 * self.bits() as usize
    }

    /// Largest pixel index representable at this depth.
    #[inline]
    #[must_use]
    pub const fn max_index(self) -> u8 {
        match self {
            Self::Two => 0x03,
            Self::Four => 0x0F,
            Self::Eight => 0xFF,
        }
    }

    #[inline]
    #[must_use]
    pub const fn color_count(self) -> u16 {
        1 << self.bits()
    }

    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            2 => Some(Self::Two),
            4 => Some(Self::Four),
            8 => Some(Self::Eight),
            _ => None,
        }
    }
}

impl Display for TileDepth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bpp", self.bits())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TileError {
    #[error("{depth} tile must be exactly {expected} bytes, got {actual}")]
    ByteLength { depth: TileDepth, expected: usize, actual: usize },
    #[error("{depth} tileset length {actual} is not a multiple of {tile_size} bytes")]
    TilesetLength { depth: TileDepth, tile_size: usize, actual: usize },
}

pub type TileResult<T> = Result<T, TileError>;

/// An 8x8 tile of palette indices in row-major order.
///
/// The category is free text for grouping in an editor and has no effect on encoding or
/// equality of pixel content (see [`Tile::same_pixels`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tile {
    #[cfg_attr(feature = "serde", serde(with = "pixels_serde"))]
    pub pixels: [u8; TILE_PIXELS],
    pub category: Option<String>,
}

// serde only derives for arrays up to 32 elements
#[cfg(feature = "serde")]
mod pixels_serde {
    use super::TILE_PIXELS;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(pixels: &[u8; TILE_PIXELS], serializer: S) -> Result<S::Ok, S::Error> {
        pixels.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; TILE_PIXELS], D::Error> {
        let pixels = Vec::<u8>::deserialize(deserializer)?;
        <[u8; TILE_PIXELS]>::try_from(pixels.as_slice())
            .map_err(|_| D::Error::invalid_length(pixels.len(), &"64 pixel indices"))
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::blank()
    }
}

impl Tile {
    #[must_use]
    pub const fn blank() -> Self {
        Self { pixels: [0; TILE_PIXELS], category: None }
    }

    #[must_use]
    pub const fn from_pixels(pixels: [u8; TILE_PIXELS]) -> Self {
        Self { pixels, category: None }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// # Panics
    ///
    /// Panics if `x` or `y` is not in `0..8`.
    #[inline]
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        assert!(x < TILE_WIDTH && y < TILE_HEIGHT, "pixel ({x}, {y}) is outside of 8x8 tile");
        self.pixels[y * TILE_WIDTH + x]
    }

    /// # Panics
    ///
    /// Panics if `x` or `y` is not in `0..8`.
    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, index: u8) {
        assert!(x < TILE_WIDTH && y < TILE_HEIGHT, "pixel ({x}, {y}) is outside of 8x8 tile");
        self.pixels[y * TILE_WIDTH + x] = index;
    }

    #[inline]
    #[must_use]
    pub fn same_pixels(&self, other: &Tile) -> bool {
        self.pixels == other.pixels
    }

    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&pixel| pixel == 0)
    }

    /// Copy of this tile with every pixel masked down to `depth` bits.
    #[must_use]
    pub fn masked(&self, depth: TileDepth) -> Self {
        let mask = depth.max_index();
        Self { pixels: self.pixels.map(|pixel| pixel & mask), category: self.category.clone() }
    }

    /// Decode a single tile from planar bitplane bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::ByteLength`] if `bytes` is not exactly `8 * depth` bytes long.
    pub fn decode(bytes: &[u8], depth: TileDepth) -> TileResult<Self> {
        let expected = depth.bytes_per_tile();
        if bytes.len() != expected {
            return Err(TileError::ByteLength { depth, expected, actual: bytes.len() });
        }

        let mut pixels = [0; TILE_PIXELS];
        for row in 0..TILE_HEIGHT {
            for col in 0..TILE_WIDTH {
                let bit_idx = (7 - col) as u8;

                let mut color = 0_u8;
                for plane in (0..depth.bits() as usize).step_by(2) {
                    let byte_idx = 8 * plane + 2 * row;
                    color |= u8::from(bytes[byte_idx].bit(bit_idx)) << plane;
                    color |= u8::from(bytes[byte_idx + 1].bit(bit_idx)) << (plane + 1);
                }

                pixels[row * TILE_WIDTH + col] = color;
            }
        }

        Ok(Self::from_pixels(pixels))
    }

    /// Encode this tile into planar bitplane bytes.
    ///
    /// This is lossy for out-of-range pixels: every index is masked to `depth` bits before being
    /// split into bitplanes.
    #[must_use]
    pub fn encode(&self, depth: TileDepth) -> Vec<u8> {
        let mask = depth.max_index();
        let mut bytes = vec![0; depth.bytes_per_tile()];

        for row in 0..TILE_HEIGHT {
            for col in 0..TILE_WIDTH {
                let color = self.pixels[row * TILE_WIDTH + col] & mask;
                let bit_idx = 7 - col;

                for plane in (0..depth.bits() as usize).step_by(2) {
                    let byte_idx = 8 * plane + 2 * row;
                    bytes[byte_idx] |= u8::from(color.bit(plane as u8)) << bit_idx;
                    bytes[byte_idx + 1] |= u8::from(color.bit(plane as u8 + 1)) << bit_idx;
                }
            }
        }

        bytes
    }

    /// Decode a contiguous run of tiles.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::TilesetLength`] if `bytes` is not a whole number of tiles.
    pub fn decode_many(bytes: &[u8], depth: TileDepth) -> TileResult<Vec<Self>> {
        let tile_size = depth.bytes_per_tile();
        if bytes.len() % tile_size != 0 {
            return Err(TileError::TilesetLength { depth, tile_size, actual: bytes.len() });
        }

        bytes.chunks_exact(tile_size).map(|chunk| Self::decode(chunk, depth)).collect()
    }

    #[must_use]
    pub fn encode_many(tiles: &[Self], depth: TileDepth) -> Vec<u8> {
        tiles.iter().flat_map(|tile| tile.encode(depth)).collect()
    }

    fn remap(&self, source_of: impl Fn(usize, usize) -> (usize, usize)) -> Self {
        let mut pixels = [0; TILE_PIXELS];
        for y in 0..TILE_HEIGHT {
            for x in 0..TILE_WIDTH {
                let (src_x, src_y) = source_of(x, y);
                pixels[y * TILE_WIDTH + x] = self.pixels[src_y * TILE_WIDTH + src_x];
            }
        }

        Self { pixels, category: self.category.clone() }
    }

    #[must_use]
    pub fn flip_horizontal(&self) -> Self {
        self.remap(|x, y| (7 - x, y))
    }

    #[must_use]
    pub fn flip_vertical(&self) -> Self {
        self.remap(|x, y| (x, 7 - y))
    }

    /// Rotate 90 degrees clockwise: the top-left pixel ends up top-right.
    #[must_use]
    pub fn rotate_90_cw(&self) -> Self {
        self.remap(|x, y| (y, 7 - x))
    }

    /// Shift pixels with wraparound at the tile edges.
    ///
    /// The pixel at `(x, y)` moves to `((x + dx) mod 8, (y + dy) mod 8)`, so shifting right by 1
    /// moves column 7 to column 0.
    #[must_use]
    pub fn shift(&self, dx: i32, dy: i32) -> Self {
        self.remap(|x, y| {
            let src_x = (x as i32 - dx).rem_euclid(TILE_WIDTH as i32) as usize;
            let src_y = (y as i32 - dy).rem_euclid(TILE_HEIGHT as i32) as usize;
            (src_x, src_y)
        })
    }

    #[must_use]
    pub fn replace_color(&self, from: u8, to: u8) -> Self {
        Self {
            pixels: self.pixels.map(|pixel| if pixel == from { to } else { pixel }),
            category: self.category.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn gradient_tile() -> Tile {
        Tile::from_pixels(std::array::from_fn(|i| i as u8))
    }

    #[test]
    fn decode_2bpp_known_bytes() {
        // Row 0: plane 0 = 0b1000_0001, plane 1 = 0b1100_0000
        let mut bytes = [0_u8; 16];
        bytes[0] = 0b1000_0001;
        bytes[1] = 0b1100_0000;

        let tile = Tile::decode(&bytes, TileDepth::Two).unwrap();
        assert_eq!(tile.pixel(0, 0), 3);
        assert_eq!(tile.pixel(1, 0), 2);
        assert_eq!(tile.pixel(2, 0), 0);
        assert_eq!(tile.pixel(7, 0), 1);
        assert!(tile.pixels[8..].iter().all(|&p| p == 0));
    }

    #[test]
    fn decode_4bpp_upper_planes() {
        // Planes 2-3 of row 1 start at byte 16 + 2
        let mut bytes = [0_u8; 32];
        bytes[18] = 0x80;
        bytes[19] = 0x80;
        bytes[2] = 0x80;

        let tile = Tile::decode(&bytes, TileDepth::Four).unwrap();
        assert_eq!(tile.pixel(0, 1), 0b1101);
    }

    #[test]
    fn decode_8bpp_top_plane() {
        let mut bytes = [0_u8; 64];
        // Plane 7 of row 7 is at 48 + 14 + 1
        bytes[63] = 0x01;

        let tile = Tile::decode(&bytes, TileDepth::Eight).unwrap();
        assert_eq!(tile.pixel(7, 7), 0x80);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(
            Tile::decode(&[0; 31], TileDepth::Four),
            Err(TileError::ByteLength { depth: TileDepth::Four, expected: 32, actual: 31 })
        );
    }

    #[test]
    fn encode_decode_round_trip_after_masking() {
        let tile = gradient_tile();
        for depth in TileDepth::ALL {
            let bytes = tile.encode(depth);
            assert_eq!(bytes.len(), depth.bytes_per_tile());
            assert_eq!(Tile::decode(&bytes, depth).unwrap(), tile.masked(depth));
        }
    }

    #[test]
    fn encode_truncates_out_of_range_indices() {
        let mut tile = Tile::blank();
        tile.set_pixel(0, 0, 0x17);

        let decoded = Tile::decode(&tile.encode(TileDepth::Four), TileDepth::Four).unwrap();
        assert_eq!(decoded.pixel(0, 0), 0x07);
    }

    #[test]
    fn decode_many_requires_whole_tiles() {
        let bytes = Tile::encode_many(&[gradient_tile(), Tile::blank()], TileDepth::Two);
        assert_eq!(Tile::decode_many(&bytes, TileDepth::Two).unwrap().len(), 2);
        assert!(Tile::decode_many(&bytes[1..], TileDepth::Two).is_err());
    }

    #[test]
    fn flips() {
        let tile = gradient_tile();
        assert_eq!(tile.flip_horizontal().pixel(0, 0), tile.pixel(7, 0));
        assert_eq!(tile.flip_vertical().pixel(3, 0), tile.pixel(3, 7));
        assert_eq!(tile.flip_horizontal().flip_horizontal(), tile);
    }

    #[test]
    fn rotate_clockwise() {
        let tile = gradient_tile();
        let rotated = tile.rotate_90_cw();
        assert_eq!(rotated.pixel(7, 0), tile.pixel(0, 0));
        assert_eq!(rotated.pixel(7, 7), tile.pixel(7, 0));
        assert_eq!(rotated.pixel(0, 0), tile.pixel(0, 7));
        assert_eq!(rotated.rotate_90_cw().rotate_90_cw().rotate_90_cw(), tile);
        assert_eq!(tile.rotate_90_cw().rotate_90_cw(), tile.flip_horizontal().flip_vertical());
    }

    #[test]
    fn shift_wraps_around() {
        let mut tile = Tile::blank();
        tile.set_pixel(7, 2, 5);
        tile.set_pixel(1, 0, 9);

        let right = tile.shift(1, 0);
        assert_eq!(right.pixel(0, 2), 5);
        assert_eq!(right.pixel(2, 0), 9);

        let up = tile.shift(0, -1);
        assert_eq!(up.pixel(1, 7), 9);
        assert_eq!(up.pixel(7, 1), 5);

        assert_eq!(tile.shift(8, -16), tile);
    }

    #[test]
    fn replace_color_keeps_category() {
        let tile = gradient_tile().with_category("hud");
        let replaced = tile.replace_color(5, 0);
        assert_eq!(replaced.pixel(5, 0), 0);
        assert_eq!(replaced.pixel(6, 0), 6);
        assert_eq!(replaced.category.as_deref(), Some("hud"));
    }

    #[test]
    #[should_panic(expected = "outside of 8x8 tile")]
    fn pixel_out_of_bounds_panics() {
        let _ = Tile::blank().pixel(8, 0);
    }
}
