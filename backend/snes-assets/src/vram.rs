//! VRAM usage accounting for a screen and its sprite zone

use crate::tile::{Tile, TileDepth};
use crate::tilemap::Tilemap;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

pub const VRAM_SIZE: usize = 64 * 1024;
pub const MAX_BG_LAYERS: usize = 4;

pub use crate::tilemap::TILEMAP_BYTES;

#[inline]
#[must_use]
pub const fn tile_size_bytes(depth: TileDepth) -> usize {
    depth.bytes_per_tile()
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BgLayer {
    pub name: String,
    pub enabled: bool,
    pub depth: TileDepth,
    pub tilemap: Tilemap,
}

impl BgLayer {
    #[must_use]
    pub fn new(name: impl Into<String>, depth: TileDepth, tilemap: Tilemap) -> Self {
        Self { name: name.into(), enabled: true, depth, tilemap }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Screen {
    pub name: String,
    pub layers: Vec<BgLayer>,
}

/// The sprite tiles a screen needs resident alongside its backgrounds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Zone {
    pub name: String,
    pub sprite_tiles: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VramCategory {
    BgTiles,
    Tilemap,
    SpriteTiles,
    Free,
}

impl Display for VramCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BgTiles => write!(f, "BG tiles"),
            Self::Tilemap => write!(f, "Tilemap"),
            Self::SpriteTiles => write!(f, "Sprite tiles"),
            Self::Free => write!(f, "Free"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VramBlock {
    pub label: String,
    pub category: VramCategory,
    pub start: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VramBudget {
    pub blocks: Vec<VramBlock>,
}

impl VramBudget {
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.blocks.iter().filter(|block| block.category != VramCategory::Free).map(|block| block.size).sum()
    }

    #[must_use]
    pub fn free_bytes(&self) -> usize {
        VRAM_SIZE.saturating_sub(self.used_bytes())
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.used_bytes() as f64 / VRAM_SIZE as f64 * 100.0
    }

    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.used_bytes() > VRAM_SIZE
    }

    fn push(&mut self, label: String, category: VramCategory, size: usize) {
        let start = self.blocks.last().map_or(0, |block| block.start + block.size);
        self.blocks.push(VramBlock { label, category, start, size });
    }
}

// Distinct tile numbers below `tile_count`; dangling references are skipped and reported once
fn resident_tiles(
    references: impl IntoIterator<Item = u16>,
    tile_count: usize,
    source: &str,
) -> BTreeSet<u16> {
    let (resident, dangling): (BTreeSet<u16>, BTreeSet<u16>) =
        references.into_iter().partition(|&tile| usize::from(tile) < tile_count);

    if let (Some(first), Some(last)) = (dangling.first(), dangling.last()) {
        log::warn!(
            "{source} references {} tiles past the {tile_count} that exist (tiles {first}-{last}); skipping them",
            dangling.len()
        );
    }

    resident
}

/// Compute VRAM usage for `screen` plus the sprite tiles of `zone`, where both index into the
/// same tile list.
#[must_use]
pub fn budget_for_screen(screen: &Screen, zone: &Zone, tiles: &[Tile]) -> VramBudget {
    budget_with_tile_counts(screen, zone, tiles.len(), tiles.len())
}

/// Compute VRAM usage when background and sprite tiles come from separate tile sets.
/// `bg_tile_count` bounds the tilemap references and `sprite_tile_count` bounds the zone's.
///
/// Blocks are always listed in the same order: BG tiles, one tilemap per enabled layer, sprite
/// tiles, then a Free block if any space remains.
#[must_use]
pub fn budget_with_tile_counts(
    screen: &Screen,
    zone: &Zone,
    bg_tile_count: usize,
    sprite_tile_count: usize,
) -> VramBudget {
    if screen.layers.len() > MAX_BG_LAYERS {
        log::warn!(
            "Screen '{}' has {} layers; only the first {MAX_BG_LAYERS} are counted",
            screen.name,
            screen.layers.len()
        );
    }

    let enabled: Vec<&BgLayer> =
        screen.layers.iter().take(MAX_BG_LAYERS).filter(|layer| layer.enabled).collect();

    let bg_tile_bytes: usize = TileDepth::ALL
        .into_iter()
        .map(|depth| {
            let references = enabled
                .iter()
                .filter(|layer| layer.depth == depth)
                .flat_map(|layer| layer.tilemap.referenced_tiles());
            let resident = resident_tiles(references, bg_tile_count, &screen.name);
            resident.len() * tile_size_bytes(depth)
        })
        .sum();

    let mut budget = VramBudget::default();
    budget.push("BG tiles".into(), VramCategory::BgTiles, bg_tile_bytes);

    for layer in &enabled {
        budget.push(format!("{} map", layer.name), VramCategory::Tilemap, TILEMAP_BYTES);
    }

    let sprite_tiles = resident_tiles(zone.sprite_tiles.iter().copied(), sprite_tile_count, &zone.name);
    budget.push(
        "Sprite tiles".into(),
        VramCategory::SpriteTiles,
        sprite_tiles.len() * tile_size_bytes(TileDepth::OBJ),
    );

    let used = budget.used_bytes();
    if used < VRAM_SIZE {
        budget.push("Free".into(), VramCategory::Free, VRAM_SIZE - used);
    } else if used > VRAM_SIZE {
        log::warn!("Screen '{}' needs {used} bytes of VRAM, {} over budget", screen.name, used - VRAM_SIZE);
    }

    budget
}
