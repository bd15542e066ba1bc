//! RGBA previews of tiles for image output

use crate::palette::{Palette, SnesColor};
use crate::tile::{TILE_HEIGHT, TILE_PIXELS, TILE_WIDTH, Tile};
use image::{Rgba, RgbaImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Self = Self { r: 0, g: 0, b: 0, a: 0 };

    #[inline]
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl From<SnesColor> for Color {
    fn from(value: SnesColor) -> Self {
        let (r, g, b) = value.to_rgb888();
        Self::rgb(r, g, b)
    }
}

impl From<Color> for Rgba<u8> {
    fn from(value: Color) -> Self {
        Rgba([value.r, value.g, value.b, value.a])
    }
}

/// Resolve every pixel through `palette`. Index 0 is transparent; indices past 15 wrap into the
/// palette's 16 slots.
#[must_use]
pub fn render_tile(tile: &Tile, palette: &Palette) -> [Color; TILE_PIXELS] {
    tile.pixels.map(|index| match index {
        0 => Color::TRANSPARENT,
        _ => palette.colors[usize::from(index & 0x0F)].into(),
    })
}

/// Lay tiles out left to right, top to bottom, `tiles_per_row` to a row.
#[must_use]
pub fn render_tileset(tiles: &[Tile], palette: &Palette, tiles_per_row: usize) -> RgbaImage {
    let tiles_per_row = tiles_per_row.max(1);
    let columns = tiles_per_row.min(tiles.len()).max(1);
    let rows = tiles.len().div_ceil(tiles_per_row).max(1);

    let mut image = RgbaImage::new((columns * TILE_WIDTH) as u32, (rows * TILE_HEIGHT) as u32);
    for (i, tile) in tiles.iter().enumerate() {
        let base_x = (i % tiles_per_row) * TILE_WIDTH;
        let base_y = (i / tiles_per_row) * TILE_HEIGHT;

        for (pixel_idx, color) in render_tile(tile, palette).into_iter().enumerate() {
            let x = base_x + pixel_idx % TILE_WIDTH;
            let y = base_y + pixel_idx / TILE_WIDTH;
            image.put_pixel(x as u32, y as u32, color.into());
        }
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn index_zero_is_transparent() {
        let mut palette = Palette::default();
        palette.colors[0] = SnesColor::WHITE;
        palette.colors[2] = SnesColor::from_rgb5(31, 0, 0);

        let mut tile = Tile::blank();
        tile.set_pixel(1, 0, 2);

        let colors = render_tile(&tile, &palette);
        assert_eq!(colors[0], Color::TRANSPARENT);
        assert_eq!(colors[1], Color::rgb(255, 0, 0));
    }

    #[test]
    fn tileset_layout() {
        let mut palette = Palette::default();
        palette.colors[1] = SnesColor::WHITE;
        let tiles = vec![Tile::blank(), Tile::blank(), Tile::from_pixels([1; 64])];

        let image = render_tileset(&tiles, &palette, 2);
        assert_eq!(image.dimensions(), (16, 16));
        assert_eq!(image.get_pixel(0, 8), &Rgba([255, 255, 255, 255]));
        assert_eq!(image.get_pixel(8, 8), &Rgba([0, 0, 0, 0]));
    }
}
