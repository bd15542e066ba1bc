//! Merging a finished sheet analysis into an asset store
//!
//! The merge works on a copy of the store. Callers either receive the complete updated store or an
//! error, never a store with tiles but no matching palette or animation.

use crate::oam::{MAX_OBJ_TILE, OamEntry, truncate_to_capacity};
use crate::palette::{PALETTE_BANK_CAPACITY, PALETTE_COLORS, Palette, PaletteBank};
use crate::spritesheet::{ImportError, ImportResult, SheetAnalysis};
use crate::store::{AnimationFrame, AssetStore, SpriteAnimation};
use crate::tile::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteChoice {
    // An existing palette already holds every imported color
    Reused,
    // Written into an all-black slot
    EmptySlot,
    Appended,
    // Bank was full; the last slot was replaced
    Overwritten,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub palette_slot: usize,
    pub palette_choice: PaletteChoice,
    pub new_tiles: usize,
    pub reused_tiles: usize,
    // Frames cut down to the OAM limit
    pub truncated_frames: usize,
}

// Import pixel index -> store palette index, plus where the palette lives
struct PalettePlacement {
    slot: usize,
    choice: PaletteChoice,
    index_map: [u8; PALETTE_COLORS],
}

fn place_palette(bank: &mut PaletteBank, analysis: &SheetAnalysis) -> ImportResult<PalettePlacement> {
    let identity = std::array::from_fn(|i| i as u8);

    let superset = bank.iter().position(|palette| palette.contains_all(&analysis.colors));
    if let Some(slot) = superset {
        let palette = bank.as_slice()[slot];
        let mut index_map = [0; PALETTE_COLORS];
        for (i, &color) in analysis.colors.iter().enumerate() {
            index_map[i + 1] = palette.index_of(color).map_or(0, |idx| idx as u8);
        }
        return Ok(PalettePlacement { slot, choice: PaletteChoice::Reused, index_map });
    }

    let blank = bank.iter().position(Palette::is_blank);
    if let Some(slot) = blank {
        bank.set(slot, analysis.palette)?;
        return Ok(PalettePlacement { slot, choice: PaletteChoice::EmptySlot, index_map: identity });
    }

    if !bank.is_full() {
        let slot = bank.push(analysis.palette)?;
        return Ok(PalettePlacement { slot, choice: PaletteChoice::Appended, index_map: identity });
    }

    let slot = PALETTE_BANK_CAPACITY - 1;
    log::warn!("Palette bank is full; overwriting palette {slot} with '{}'", analysis.settings.name);
    bank.set(slot, analysis.palette)?;
    Ok(PalettePlacement { slot, choice: PaletteChoice::Overwritten, index_map: identity })
}

/// Merge `analysis` into a copy of `store` and return the updated store.
///
/// The import's palette reuses the first existing palette (lowest slot first) containing all of
/// its colors; otherwise it takes the first all-black slot, then a new slot, then slot 15. Tiles
/// are remapped to that palette and deduplicated against the store's tiles by pixel content.
/// Frames longer than the OAM limit are truncated.
///
/// # Errors
///
/// Fails without touching `store` if a tile would land past OBJ tile 511 or if the store already
/// has an animation with the import's name.
pub fn perform_import(
    store: &AssetStore,
    analysis: &SheetAnalysis,
) -> ImportResult<(AssetStore, CommitSummary)> {
    let mut next = store.clone();
    let placement = place_palette(&mut next.palettes, analysis)?;

    let mut tile_lookup = next.tile_index();
    let mut new_tiles = 0;
    let store_indices: Vec<usize> = analysis
        .tiles
        .iter()
        .map(|tile| {
            let remapped = Tile {
                pixels: tile.pixels.map(|index| placement.index_map[usize::from(index & 0x0F)]),
                category: tile.category.clone(),
            };
            *tile_lookup.entry(remapped.pixels).or_insert_with(|| {
                new_tiles += 1;
                next.tiles.push(remapped);
                next.tiles.len() - 1
            })
        })
        .collect();

    let mut truncated_frames = 0;
    let mut frames = Vec::with_capacity(analysis.animation.frames.len());
    for frame in &analysis.animation.frames {
        let entries = frame
            .entries
            .iter()
            .map(|entry| {
                let tile = store_indices[usize::from(entry.tile)];
                if tile > usize::from(MAX_OBJ_TILE) {
                    return Err(ImportError::TileIndexOverflow { tile });
                }
                Ok(OamEntry { tile: tile as u16, palette: (placement.slot & 0x07) as u8, ..*entry })
            })
            .collect::<ImportResult<Vec<_>>>()?;

        let (entries, truncated) = truncate_to_capacity(entries);
        truncated_frames += usize::from(truncated);
        frames.push(AnimationFrame { duration: frame.duration, entries });
    }

    let animation = SpriteAnimation { name: analysis.animation.name.clone(), frames };
    let next = next.with_animation(animation)?;

    let summary = CommitSummary {
        palette_slot: placement.slot,
        palette_choice: placement.choice,
        new_tiles,
        reused_tiles: analysis.tiles.len() - new_tiles,
        truncated_frames,
    };

    log::info!(
        "Imported '{}': palette slot {} ({:?}), {} new tiles, {} reused",
        analysis.settings.name,
        summary.palette_slot,
        summary.palette_choice,
        summary.new_tiles,
        summary.reused_tiles
    );

    Ok((next, summary))
}
