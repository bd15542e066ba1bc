//! Sprite-sheet import: slice an RGBA image into frames, quantize it to one palette, and build a
//! deduplicated tileset with per-frame OAM entries
//!
//! Analysis is pure and deterministic. Merging a finished analysis into an [`AssetStore`] happens
//! in [`commit`], and [`worker`] runs analyses off the calling thread.
//!
//! [`AssetStore`]: crate::store::AssetStore

pub mod commit;
pub mod worker;

use crate::oam::{MAX_OBJ_TILE, OAM_CAPACITY, OamEntry};
use crate::palette::{PALETTE_COLORS, Palette, PaletteError, SnesColor};
use crate::store::{AnimationFrame, SpriteAnimation, StoreError};
use crate::tile::{TILE_HEIGHT, TILE_PIXELS, TILE_WIDTH, Tile, TileDepth};
use image::RgbaImage;
use rustc_hash::FxHashMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;

// Pixels with alpha below this are transparent
pub const ALPHA_THRESHOLD: u8 = 128;

// OAM positions are relative to the frame origin and Y is a single byte
pub const MAX_FRAME_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImportSettings {
    pub name: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub depth: TileDepth,
    pub frame_duration: u8,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            name: "sprite".into(),
            frame_width: 16,
            frame_height: 16,
            depth: TileDepth::Four,
            frame_duration: 8,
        }
    }
}

impl ImportSettings {
    /// Number of opaque palette slots usable at the configured depth.
    #[must_use]
    pub fn color_capacity(&self) -> usize {
        usize::from(self.depth.max_index()).min(PALETTE_COLORS - 1)
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("frame size must be a non-zero multiple of 8, got {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
    #[error("frame size {frame_width}x{frame_height} is larger than the {image_width}x{image_height} image")]
    FrameLargerThanImage { frame_width: u32, frame_height: u32, image_width: u32, image_height: u32 },
    #[error("frame size {width}x{height} exceeds the {MAX_FRAME_SIZE}x{MAX_FRAME_SIZE} sprite coordinate range")]
    FrameTooLarge { width: u32, height: u32 },
    #[error("tile index {tile} does not fit in an OAM entry (max {MAX_OBJ_TILE})")]
    TileIndexOverflow { tile: usize },
    #[error("palette error: {0}")]
    Palette(#[from] PaletteError),
    #[error("asset store error: {0}")]
    Store(#[from] StoreError),
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Budget problems found during analysis. None of these block an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportWarning {
    TooManyColors { found: usize, capacity: usize },
    OamOverflow { frame: usize, entries: usize },
    TooManyTiles { unique: usize, max: usize },
}

impl Display for ImportWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyColors { found, capacity } => write!(
                f,
                "too many unique colors: found {found}, palette holds {capacity}; extra colors use slot {capacity}"
            ),
            Self::OamOverflow { frame, entries } => write!(
                f,
                "frame {frame} exceeds OAM capacity: {entries} entries, hardware limit is {OAM_CAPACITY}"
            ),
            Self::TooManyTiles { unique, max } => {
                write!(f, "{unique} unique tiles exceed the {max} addressable OBJ tiles")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportStats {
    pub frame_count: usize,
    pub raw_tiles: usize,
    pub unique_tiles: usize,
    pub dedup_ratio: f64,
    // Largest entry count of any single frame
    pub oam_per_frame: usize,
    pub colors_found: usize,
    pub warnings: Vec<ImportWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetAnalysis {
    pub settings: ImportSettings,
    pub palette: Palette,
    // Opaque colors in slot order; colors[i] lives in palette slot i + 1
    pub colors: Vec<SnesColor>,
    pub tiles: Vec<Tile>,
    pub animation: SpriteAnimation,
    pub stats: ImportStats,
}

fn validate_frame_size(image: &RgbaImage, settings: &ImportSettings) -> ImportResult<()> {
    let (width, height) = (settings.frame_width, settings.frame_height);
    if width == 0 || height == 0 || width % TILE_WIDTH as u32 != 0 || height % TILE_HEIGHT as u32 != 0 {
        return Err(ImportError::InvalidFrameSize { width, height });
    }

    if width > MAX_FRAME_SIZE || height > MAX_FRAME_SIZE {
        return Err(ImportError::FrameTooLarge { width, height });
    }

    if width > image.width() || height > image.height() {
        return Err(ImportError::FrameLargerThanImage {
            frame_width: width,
            frame_height: height,
            image_width: image.width(),
            image_height: image.height(),
        });
    }

    Ok(())
}

fn pixel_color(image: &RgbaImage, x: u32, y: u32) -> Option<SnesColor> {
    let [r, g, b, a] = image.get_pixel(x, y).0;
    (a >= ALPHA_THRESHOLD).then(|| SnesColor::from_rgb888(r, g, b))
}

// First-seen color quantizer. Slot assignments never change once made.
struct Quantizer {
    capacity: usize,
    colors: Vec<SnesColor>,
    slots: FxHashMap<SnesColor, u8>,
    colors_found: usize,
}

impl Quantizer {
    fn new(capacity: usize) -> Self {
        Self { capacity, colors: Vec::new(), slots: FxHashMap::default(), colors_found: 0 }
    }

    fn index_of(&mut self, color: Option<SnesColor>) -> u8 {
        let Some(color) = color else { return 0 };

        if let Some(&slot) = self.slots.get(&color) {
            return slot;
        }

        self.colors_found += 1;
        let slot = if self.colors.len() < self.capacity {
            self.colors.push(color);
            self.colors.len() as u8
        } else {
            // Overflow colors share the last usable slot
            self.capacity as u8
        };
        self.slots.insert(color, slot);
        slot
    }

    fn palette(&self) -> Palette {
        let mut palette = Palette::default();
        for (slot, &color) in palette.colors[1..].iter_mut().zip(&self.colors) {
            *slot = color;
        }
        palette
    }
}

/// Analyze a sprite sheet laid out as a grid of equally sized frames, read left to right and top
/// to bottom. Pixels outside the last full row or column of frames are ignored.
///
/// # Errors
///
/// Fails if the frame size is zero, not a multiple of 8, or larger than the image.
pub fn analyze(image: &RgbaImage, settings: &ImportSettings) -> ImportResult<SheetAnalysis> {
    validate_frame_size(image, settings)?;

    let (frame_width, frame_height) = (settings.frame_width, settings.frame_height);
    let columns = image.width() / frame_width;
    let rows = image.height() / frame_height;
    let frame_origins: Vec<(u32, u32)> = (0..rows)
        .flat_map(|row| (0..columns).map(move |col| (col * frame_width, row * frame_height)))
        .collect();

    // Index every frame in raster order so palette slots follow first appearance
    let mut quantizer = Quantizer::new(settings.color_capacity());
    let indexed_frames: Vec<Vec<u8>> = frame_origins
        .iter()
        .map(|&(origin_x, origin_y)| {
            (0..frame_height)
                .flat_map(|y| (0..frame_width).map(move |x| (origin_x + x, origin_y + y)))
                .map(|(x, y)| quantizer.index_of(pixel_color(image, x, y)))
                .collect()
        })
        .collect();

    let mut tiles: Vec<Tile> = Vec::new();
    let mut tile_lookup: FxHashMap<[u8; TILE_PIXELS], usize> = FxHashMap::default();
    let mut raw_tiles = 0;
    let mut frames = Vec::with_capacity(indexed_frames.len());
    let mut warnings = Vec::new();

    let blocks_x = (frame_width as usize) / TILE_WIDTH;
    let blocks_y = (frame_height as usize) / TILE_HEIGHT;
    for (frame_idx, indices) in indexed_frames.iter().enumerate() {
        let mut entries = Vec::new();

        for block_y in 0..blocks_y {
            for block_x in 0..blocks_x {
                let pixels: [u8; TILE_PIXELS] = std::array::from_fn(|i| {
                    let x = block_x * TILE_WIDTH + i % TILE_WIDTH;
                    let y = block_y * TILE_HEIGHT + i / TILE_WIDTH;
                    indices[y * frame_width as usize + x]
                });

                if pixels.iter().all(|&index| index == 0) {
                    continue;
                }
                raw_tiles += 1;

                let tile_idx = *tile_lookup.entry(pixels).or_insert_with(|| {
                    tiles.push(Tile::from_pixels(pixels).with_category(settings.name.clone()));
                    tiles.len() - 1
                });

                let too_large = || ImportError::FrameTooLarge { width: frame_width, height: frame_height };
                let x = i16::try_from(block_x * TILE_WIDTH).map_err(|_| too_large())?;
                let y = u8::try_from(block_y * TILE_HEIGHT).map_err(|_| too_large())?;
                entries.push(OamEntry::new(x, y, u16::try_from(tile_idx).unwrap_or(u16::MAX)));
            }
        }

        if entries.len() > OAM_CAPACITY {
            warnings.push(ImportWarning::OamOverflow { frame: frame_idx, entries: entries.len() });
        }

        frames.push(AnimationFrame { duration: settings.frame_duration, entries });
    }

    if quantizer.colors_found > quantizer.capacity {
        warnings.insert(
            0,
            ImportWarning::TooManyColors { found: quantizer.colors_found, capacity: quantizer.capacity },
        );
    }

    let max_tiles = usize::from(MAX_OBJ_TILE) + 1;
    if tiles.len() > max_tiles {
        warnings.push(ImportWarning::TooManyTiles { unique: tiles.len(), max: max_tiles });
    }

    for warning in &warnings {
        log::warn!("Sprite sheet '{}': {warning}", settings.name);
    }

    let unique_tiles = tiles.len();
    let dedup_ratio = if raw_tiles == 0 { 0.0 } else { 1.0 - unique_tiles as f64 / raw_tiles as f64 };
    let stats = ImportStats {
        frame_count: frames.len(),
        raw_tiles,
        unique_tiles,
        dedup_ratio,
        oam_per_frame: frames.iter().map(|frame| frame.entries.len()).max().unwrap_or(0),
        colors_found: quantizer.colors_found,
        warnings,
    };

    log::debug!(
        "Analyzed '{}': {} frames, {raw_tiles} raw tiles, {unique_tiles} unique, {} colors",
        settings.name,
        stats.frame_count,
        stats.colors_found
    );

    Ok(SheetAnalysis {
        settings: settings.clone(),
        palette: quantizer.palette(),
        colors: quantizer.colors,
        tiles,
        animation: SpriteAnimation { name: settings.name.clone(), frames },
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use test_log::test;

    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn settings(frame_width: u32, frame_height: u32, depth: TileDepth) -> ImportSettings {
        ImportSettings { name: "test".into(), frame_width, frame_height, depth, frame_duration: 6 }
    }

    // 16x16 sheet, every 8x8 quadrant draws the same three-color pattern
    fn three_color_sheet() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, y| match (x % 8, y % 8) {
            (0..=1, _) => RED,
            (2..=3, _) => GREEN,
            (4, _) => BLUE,
            _ => CLEAR,
        })
    }

    #[test]
    fn sixteen_by_sixteen_scenario() {
        let analysis = analyze(&three_color_sheet(), &settings(8, 8, TileDepth::Four)).unwrap();

        assert_eq!(analysis.stats.frame_count, 4);
        assert_eq!(analysis.stats.colors_found, 3);
        assert_eq!(analysis.stats.oam_per_frame, 1);
        assert_eq!(analysis.stats.raw_tiles, 4);
        assert_eq!(analysis.stats.unique_tiles, 1);
        assert!((analysis.stats.dedup_ratio - 0.75).abs() < 1e-9);
        assert!(analysis.stats.warnings.is_empty());

        let expected_colors: Vec<_> =
            [(255, 0, 0), (0, 255, 0), (0, 0, 255)].map(|(r, g, b)| SnesColor::from_rgb888(r, g, b)).into();
        assert_eq!(analysis.colors, expected_colors);
        assert_eq!(analysis.palette.colors[0], SnesColor::BLACK);
        assert_eq!(&analysis.palette.colors[1..4], expected_colors.as_slice());

        let tile = &analysis.tiles[0];
        assert_eq!(tile.pixel(0, 0), 1);
        assert_eq!(tile.pixel(3, 5), 2);
        assert_eq!(tile.pixel(4, 7), 3);
        assert_eq!(tile.pixel(7, 0), 0);

        for frame in &analysis.animation.frames {
            assert_eq!(frame.duration, 6);
            assert_eq!(frame.entries, vec![OamEntry::new(0, 0, 0)]);
        }
    }

    #[test]
    fn analysis_is_deterministic() {
        let image = RgbaImage::from_fn(64, 32, |x, y| {
            let v = ((x * 7 + y * 13) % 5) as u8;
            if v == 0 { CLEAR } else { Rgba([v * 40, 255 - v * 30, v * 17, 255]) }
        });
        let settings = settings(16, 16, TileDepth::Four);

        let first = analyze(&image, &settings).unwrap();
        let second = analyze(&image, &settings).unwrap();
        assert_eq!(first.tiles, second.tiles);
        assert_eq!(first.palette, second.palette);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn transparent_blocks_are_dropped() {
        let image = RgbaImage::from_fn(16, 8, |x, _| if x < 8 { RED } else { Rgba([255, 255, 255, 127]) });
        let analysis = analyze(&image, &settings(16, 8, TileDepth::Four)).unwrap();

        assert_eq!(analysis.stats.raw_tiles, 1);
        assert_eq!(analysis.stats.colors_found, 1);
        assert_eq!(analysis.animation.frames[0].entries.len(), 1);
    }

    #[test]
    fn color_overflow_clamps_to_last_slot() {
        // 2bpp holds 3 opaque colors; the fourth and fifth share slot 3
        let colors = [RED, GREEN, BLUE, Rgba([255, 255, 255, 255]), Rgba([255, 255, 0, 255])];
        let image = RgbaImage::from_fn(8, 8, |x, _| colors[(x as usize).min(4)]);

        let analysis = analyze(&image, &settings(8, 8, TileDepth::Two)).unwrap();
        assert_eq!(analysis.stats.colors_found, 5);
        assert_eq!(analysis.colors.len(), 3);
        assert_eq!(
            analysis.stats.warnings,
            vec![ImportWarning::TooManyColors { found: 5, capacity: 3 }]
        );

        let tile = &analysis.tiles[0];
        assert_eq!((0..8).map(|x| tile.pixel(x, 0)).collect::<Vec<_>>(), vec![1, 2, 3, 3, 3, 3, 3, 3]);
    }

    #[test]
    fn oam_overflow_is_a_warning() {
        // A single 96x96 frame holds 144 opaque blocks
        let image = RgbaImage::from_fn(96, 96, |x, y| if (x + y) % 2 == 0 { RED } else { GREEN });
        let analysis = analyze(&image, &settings(96, 96, TileDepth::Four)).unwrap();

        assert_eq!(analysis.animation.frames[0].entries.len(), 144);
        assert_eq!(analysis.stats.warnings, vec![ImportWarning::OamOverflow { frame: 0, entries: 144 }]);
        assert!(analysis.stats.warnings[0].to_string().contains("exceeds OAM capacity"));
    }

    #[test]
    fn invalid_frame_sizes() {
        let image = RgbaImage::new(32, 32);
        assert!(matches!(
            analyze(&image, &settings(12, 8, TileDepth::Four)),
            Err(ImportError::InvalidFrameSize { width: 12, height: 8 })
        ));
        assert!(matches!(
            analyze(&image, &settings(0, 8, TileDepth::Four)),
            Err(ImportError::InvalidFrameSize { .. })
        ));
        assert!(matches!(
            analyze(&image, &settings(64, 8, TileDepth::Four)),
            Err(ImportError::FrameLargerThanImage { frame_width: 64, .. })
        ));
    }

    #[test]
    fn frames_past_sprite_coordinate_range_are_rejected() {
        let image = RgbaImage::from_pixel(8, 264, RED);
        assert!(matches!(
            analyze(&image, &settings(8, 264, TileDepth::Four)),
            Err(ImportError::FrameTooLarge { width: 8, height: 264 })
        ));

        // The bottom row of a 256-pixel frame still lands at Y 248
        let image = RgbaImage::from_pixel(8, 256, RED);
        let analysis = analyze(&image, &settings(8, 256, TileDepth::Four)).unwrap();
        let last = analysis.animation.frames[0].entries.last().unwrap();
        assert_eq!(last.y, 248);
    }

    #[test]
    fn partial_frames_are_ignored() {
        let image = RgbaImage::from_fn(20, 10, |_, _| RED);
        let analysis = analyze(&image, &settings(8, 8, TileDepth::Four)).unwrap();
        assert_eq!(analysis.stats.frame_count, 2);
    }
}
