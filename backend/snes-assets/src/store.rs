//! In-memory snapshot of a project's assets
//!
//! Operations that change the store take `&self` and return a new store, so a caller can swap the
//! whole snapshot in one step or drop it on error.

use crate::cartridge::CartridgeConfig;
use crate::oam::{OamEntry, OamTable};
use crate::palette::PaletteBank;
use crate::tile::{Tile, TileDepth};
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimationFrame {
    // In 60 Hz frames
    pub duration: u8,
    pub entries: Vec<OamEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpriteAnimation {
    pub name: String,
    pub frames: Vec<AnimationFrame>,
}

impl SpriteAnimation {
    /// Sum of all frame durations.
    #[must_use]
    pub fn total_duration(&self) -> u32 {
        self.frames.iter().map(|frame| u32::from(frame.duration)).sum()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("animation '{0}' already exists")]
    DuplicateAnimation(String),
    #[error("animation '{animation}' references tile {tile} but the store only has {tile_count} tiles")]
    TileOutOfRange { animation: String, tile: u16, tile_count: usize },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssetStore {
    pub tiles: Vec<Tile>,
    pub palettes: PaletteBank,
    pub animations: Vec<SpriteAnimation>,
    pub oam: OamTable,
    pub cartridge: CartridgeConfig,
}

impl AssetStore {
    /// Index of the first tile with exactly these pixels. Categories are ignored.
    #[must_use]
    pub fn find_tile(&self, tile: &Tile) -> Option<usize> {
        self.tiles.iter().position(|existing| existing.same_pixels(tile))
    }

    /// Pixel content to tile index for every tile, keeping the first index of duplicates.
    #[must_use]
    pub fn tile_index(&self) -> FxHashMap<[u8; 64], usize> {
        let mut index = FxHashMap::default();
        for (i, tile) in self.tiles.iter().enumerate() {
            index.entry(tile.pixels).or_insert(i);
        }
        index
    }

    #[must_use]
    pub fn animation(&self, name: &str) -> Option<&SpriteAnimation> {
        self.animations.iter().find(|animation| animation.name == name)
    }

    /// Return a copy of the store with `animation` appended.
    ///
    /// # Errors
    ///
    /// Fails if an animation with the same name exists or if any frame references a tile the store
    /// does not hold.
    pub fn with_animation(&self, animation: SpriteAnimation) -> StoreResult<Self> {
        if self.animation(&animation.name).is_some() {
            return Err(StoreError::DuplicateAnimation(animation.name));
        }

        let out_of_range = animation
            .frames
            .iter()
            .flat_map(|frame| &frame.entries)
            .find(|entry| usize::from(entry.tile) >= self.tiles.len());
        if let Some(entry) = out_of_range {
            return Err(StoreError::TileOutOfRange {
                animation: animation.name,
                tile: entry.tile,
                tile_count: self.tiles.len(),
            });
        }

        let mut store = self.clone();
        store.animations.push(animation);
        Ok(store)
    }

    /// Every tile encoded at `depth`, in store order.
    #[must_use]
    pub fn chr_bytes(&self, depth: TileDepth) -> Vec<u8> {
        Tile::encode_many(&self.tiles, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn store_with_tiles(count: u8) -> AssetStore {
        AssetStore {
            tiles: (0..count).map(|i| Tile::from_pixels([i; 64])).collect(),
            ..AssetStore::default()
        }
    }

    #[test]
    fn default_store() {
        let store = AssetStore::default();
        assert!(store.tiles.is_empty());
        assert_eq!(store.palettes, PaletteBank::default_bank());
        assert!(store.oam.is_empty());
        assert_eq!(store.cartridge, CartridgeConfig::default());
    }

    #[test]
    fn find_tile_ignores_category() {
        let store = store_with_tiles(3);
        let probe = Tile::from_pixels([2; 64]).with_category("enemies");

        assert_eq!(store.find_tile(&probe), Some(2));
        assert_eq!(store.find_tile(&Tile::from_pixels([9; 64])), None);
        assert_eq!(store.tile_index().get(&[1; 64]), Some(&1));
    }

    #[test]
    fn with_animation_validates_tiles() {
        let store = store_with_tiles(2);
        let frame = |tile| AnimationFrame { duration: 4, entries: vec![OamEntry::new(0, 0, tile)] };

        let ok = SpriteAnimation { name: "walk".into(), frames: vec![frame(0), frame(1)] };
        let updated = store.with_animation(ok.clone()).unwrap();
        assert_eq!(updated.animation("walk").map(SpriteAnimation::total_duration), Some(8));
        assert!(store.animations.is_empty());

        assert_eq!(
            updated.with_animation(ok),
            Err(StoreError::DuplicateAnimation("walk".into()))
        );

        let bad = SpriteAnimation { name: "jump".into(), frames: vec![frame(2)] };
        assert_eq!(
            store.with_animation(bad),
            Err(StoreError::TileOutOfRange { animation: "jump".into(), tile: 2, tile_count: 2 })
        );
    }
}
