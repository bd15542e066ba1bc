//! Heuristic searches for graphics data inside a ROM
//!
//! These are discovery aids for a user browsing a ROM; false positives are expected.

use crate::num::read_u16_le;
use crate::palette::{CGRAM_PALETTE_BYTES, Palette};
use crate::tile::{TILE_PIXELS, Tile, TileDepth};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteCandidate {
    pub offset: usize,
    pub palette: Palette,
}

/// A run of consecutive tile-aligned chunks that all look like tile data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBlock {
    pub offset: usize,
    pub tile_count: usize,
}

fn plausible_palette(bytes: &[u8]) -> bool {
    let words = (0..CGRAM_PALETTE_BYTES).step_by(2).map(|i| read_u16_le(bytes, i));
    let mut any_nonzero = false;
    for word in words {
        if word & 0x8000 != 0 {
            return false;
        }
        any_nonzero |= word != 0;
    }
    any_nonzero
}

/// Find up to `limit` 32-byte runs at even offsets whose 16 words are all valid BGR555 values and
/// not all zero. Matches do not overlap.
#[must_use]
pub fn scan_for_palettes(data: &[u8], limit: usize) -> Vec<PaletteCandidate> {
    let mut candidates = Vec::new();
    let mut offset = 0;

    while offset + CGRAM_PALETTE_BYTES <= data.len() && candidates.len() < limit {
        let bytes = &data[offset..offset + CGRAM_PALETTE_BYTES];
        if !plausible_palette(bytes) {
            offset += 2;
            continue;
        }

        match Palette::from_cgram_bytes(bytes) {
            Ok(palette) => candidates.push(PaletteCandidate { offset, palette }),
            Err(err) => log::error!("Palette candidate at ${offset:06X} failed to decode: {err}"),
        }
        offset += CGRAM_PALETTE_BYTES;
    }

    log::debug!("Palette scan over {} bytes found {} candidates", data.len(), candidates.len());

    candidates
}

/// Decode up to `count` sequential tiles starting at `offset`. Reads never go past the end of
/// `data`; fewer tiles are returned instead.
#[must_use]
pub fn extract_tiles_at_offset(data: &[u8], offset: usize, depth: TileDepth, count: usize) -> Vec<Tile> {
    let tile_size = depth.bytes_per_tile();
    let available = data.len().saturating_sub(offset) / tile_size;
    if count > available {
        log::debug!("Clamping tile extraction at ${offset:06X} from {count} to {available} tiles");
    }

    let Some(region) = data.get(offset..) else {
        return Vec::new();
    };

    region
        .chunks_exact(tile_size)
        .take(count.min(available))
        .filter_map(|chunk| Tile::decode(chunk, depth).ok())
        .collect()
}

fn plausible_tile(chunk: &[u8], depth: TileDepth) -> bool {
    if chunk.iter().all(|&b| b == 0x00) || chunk.iter().all(|&b| b == 0xFF) {
        return false;
    }

    let Ok(tile) = Tile::decode(chunk, depth) else { return false };
    let first = tile.pixels[0];
    tile.pixels[1..TILE_PIXELS].iter().any(|&pixel| pixel != first)
}

/// Find runs of at least `min_run` consecutive plausible tiles, scanning tile-aligned chunks from
/// the start of `data`.
#[must_use]
pub fn scan_for_tile_blocks(data: &[u8], depth: TileDepth, min_run: usize) -> Vec<TileBlock> {
    let tile_size = depth.bytes_per_tile();
    let min_run = min_run.max(1);

    let mut blocks = Vec::new();
    let mut run_start: Option<usize> = None;

    let close_run = |start: usize, end: usize, blocks: &mut Vec<TileBlock>| {
        let tile_count = end - start;
        if tile_count >= min_run {
            blocks.push(TileBlock { offset: start * tile_size, tile_count });
        }
    };

    let chunk_count = data.len() / tile_size;
    for (i, chunk) in data.chunks_exact(tile_size).enumerate() {
        match (plausible_tile(chunk, depth), run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                close_run(start, i, &mut blocks);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        close_run(start, chunk_count, &mut blocks);
    }

    log::debug!("Found {} {depth} tile blocks of at least {min_run} tiles", blocks.len());

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::SnesColor;
    use test_log::test;

    fn checker_tile() -> Tile {
        Tile::from_pixels(std::array::from_fn(|i| ((i + i / 8) % 2) as u8 * 3))
    }

    #[test]
    fn palettes_are_aligned_and_non_overlapping() {
        let mut palette = Palette::default();
        palette.colors[1] = SnesColor::from_rgb5(31, 0, 0);

        let mut data = vec![0xFF; 6];
        data.extend(palette.to_cgram_bytes());
        data.extend(palette.to_cgram_bytes());
        data.extend([0xFF; 4]);

        let candidates = scan_for_palettes(&data, 10);
        let offsets: Vec<_> = candidates.iter().map(|candidate| candidate.offset).collect();
        assert_eq!(offsets, vec![6, 38]);
        assert_eq!(candidates[0].palette, palette);

        assert_eq!(scan_for_palettes(&data, 1).len(), 1);
    }

    #[test]
    fn all_zero_is_not_a_palette() {
        assert!(scan_for_palettes(&[0; 256], 10).is_empty());
    }

    #[test]
    fn extraction_clamps_to_buffer() {
        let mut data = vec![0; 8];
        data.extend(Tile::encode_many(&[checker_tile(), checker_tile()], TileDepth::Two));
        data.extend([0; 5]);

        let tiles = extract_tiles_at_offset(&data, 8, TileDepth::Two, 10);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0], checker_tile());

        assert!(extract_tiles_at_offset(&data, data.len() + 100, TileDepth::Two, 1).is_empty());
        assert_eq!(extract_tiles_at_offset(&data, 8, TileDepth::Two, 1).len(), 1);
    }

    #[test]
    fn tile_blocks() {
        let tile = checker_tile().encode(TileDepth::Four);
        let mut data = Vec::new();
        data.extend(&tile);
        data.extend([0; 32]);
        data.extend([0xFF; 32]);
        for _ in 0..3 {
            data.extend(&tile);
        }

        assert_eq!(
            scan_for_tile_blocks(&data, TileDepth::Four, 1),
            vec![TileBlock { offset: 0, tile_count: 1 }, TileBlock { offset: 96, tile_count: 3 }]
        );
        assert_eq!(
            scan_for_tile_blocks(&data, TileDepth::Four, 2),
            vec![TileBlock { offset: 96, tile_count: 3 }]
        );
    }

    #[test]
    fn single_color_tiles_are_not_plausible() {
        // Plane 0 fully set, plane 1 clear: every pixel is 1
        let mut bytes = [0_u8; 16];
        for row in 0..8 {
            bytes[2 * row] = 0xFF;
        }
        assert!(!plausible_tile(&bytes, TileDepth::Two));
    }
}
