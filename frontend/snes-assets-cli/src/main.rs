use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use snes_assets::OamTable;
use snes_assets::cartridge::{Chip, InterruptVectors, MappingMode, RomSpeed};
use snes_assets::palette::{CGRAM_PALETTE_BYTES, Palette, PaletteBank};
use snes_assets::render;
use snes_assets::rom::{self, RomAnalysis, RomHeader, scan};
use snes_assets::spritesheet::{self, SheetAnalysis, commit};
use snes_assets::store::AssetStore;
use snes_assets::tile::{Tile, TileDepth};
use snes_assets::tilemap::Tilemap;
use snes_assets::vram::{self, BgLayer, Screen, Zone};
use snes_assets_config::AppConfig;
use std::fs;
use std::path::{Path, PathBuf};

const TILES_PER_ROW: usize = 16;

#[derive(Parser)]
#[command(version, about = "SNES asset conversion and hardware budget tool")]
struct Cli {
    /// Config file path; missing values fall back to defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the internal header and checksum status of a ROM image
    Rom(RomArgs),
    /// Extract raw tiles from a ROM image into a PNG preview
    Extract(ExtractArgs),
    /// Derive the cartridge header from a cartridge profile
    Header(HeaderArgs),
    /// Slice a sprite sheet into tiles, a palette and an animation
    Import(ImportArgs),
    /// Report VRAM usage for a set of background tilemaps and sprite tiles
    Vram(VramArgs),
}

#[derive(Args)]
struct RomArgs {
    /// ROM file path (.sfc / .smc)
    file_path: PathBuf,

    /// Also scan for plausible CGRAM palettes
    #[arg(long, default_value_t)]
    palettes: bool,

    /// Also scan for runs of plausible tiles at this depth (Two / Four / Eight)
    #[arg(long)]
    tiles: Option<TileDepth>,
}

#[derive(Args)]
struct ExtractArgs {
    /// ROM file path (.sfc / .smc)
    file_path: PathBuf,

    /// Byte offset into the ROM, after any copier header is removed
    #[arg(long, value_parser = parse_number::<usize>)]
    offset: usize,

    #[arg(long, default_value = "four")]
    depth: TileDepth,

    #[arg(long, default_value_t = 64)]
    count: usize,

    /// Read the preview palette from this ROM offset instead of using the default palette
    #[arg(long, value_parser = parse_number::<usize>)]
    palette_offset: Option<usize>,

    /// PNG output path
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Also write the extracted tiles re-encoded at the same depth
    #[arg(long)]
    raw_output: Option<PathBuf>,
}

#[derive(Args)]
struct HeaderArgs {
    #[arg(long)]
    rom_size_kb: Option<u32>,

    #[arg(long)]
    mapping: Option<MappingMode>,

    #[arg(long)]
    speed: Option<RomSpeed>,

    #[arg(long)]
    sram_kb: Option<u32>,

    #[arg(long)]
    chip: Option<Chip>,

    #[arg(long)]
    title: Option<String>,

    /// Write the header into this ROM image and fix its checksum
    #[arg(long)]
    write: Option<PathBuf>,

    #[arg(long, value_parser = parse_number::<u16>, default_value = "0x8000")]
    reset_vector: u16,

    #[arg(long, value_parser = parse_number::<u16>, default_value = "0x8000")]
    nmi_vector: u16,

    #[arg(long, value_parser = parse_number::<u16>, default_value = "0x8000")]
    irq_vector: u16,
}

#[derive(Args)]
struct ImportArgs {
    /// Sprite sheet image path
    file_path: PathBuf,

    /// Animation name; defaults to the file stem
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    frame_width: Option<u32>,

    #[arg(long)]
    frame_height: Option<u32>,

    #[arg(long)]
    depth: Option<TileDepth>,

    #[arg(long)]
    frame_duration: Option<u8>,

    /// Commit into a fresh asset store and write chr.bin, cgram.bin and oam.bin here
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct VramArgs {
    /// Raw 32x32 tilemap file; repeat once per background layer
    #[arg(long = "bg", required = true)]
    tilemaps: Vec<PathBuf>,

    /// Tile depth shared by every background layer
    #[arg(long, default_value = "four")]
    bg_depth: TileDepth,

    /// CHR data the tilemaps index into, encoded at the background depth
    #[arg(long)]
    chr: PathBuf,

    /// Number of 4bpp sprite tiles that must be resident
    #[arg(long, default_value_t = 0)]
    sprite_tiles: u16,
}

fn parse_number<T>(s: &str) -> Result<T, String>
where
    T: TryFrom<u64>,
{
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix('$')) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|err| format!("invalid number '{s}': {err}"))?;

    T::try_from(value).map_err(|_| format!("number '{s}' is out of range"))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(snes_assets_config::default_config_path);
    let config = AppConfig::from_file(&config_path);

    match cli.command {
        Command::Rom(args) => run_rom(&config, args),
        Command::Extract(args) => run_extract(args),
        Command::Header(args) => run_header(&config, args),
        Command::Import(args) => run_import(&config, args),
        Command::Vram(args) => run_vram(args),
    }
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))
}

fn write_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write '{}'", path.display()))
}

fn print_header(header: &RomHeader) {
    println!("  Location:   {}", header.location);
    println!("  Title:      {}", header.title);
    match header.mapping {
        Some(mapping) => println!("  Mapping:    {mapping} ({:?})", header.speed),
        None => println!("  Mapping:    unknown (${:02X})", header.map_byte),
    }
    println!("  Chipset:    ${:02X}", header.chipset);
    match header.rom_size_kb {
        Some(kb) => println!("  ROM size:   {kb} KB"),
        None => println!("  ROM size:   unknown"),
    }
    match header.ram_size_kb {
        Some(kb) => println!("  SRAM size:  {kb} KB"),
        None => println!("  SRAM size:  unknown"),
    }
    println!(
        "  Country:    {} ({:?})",
        header.country_name().unwrap_or("unknown"),
        header.video_standard()
    );
    println!("  Developer:  ${:02X}", header.developer_id);
    println!("  Version:    1.{}", header.version);
    println!("  Checksum:   ${:04X} / complement ${:04X}", header.checksum, header.complement);
    println!(
        "  Vectors:    RESET ${:04X}  NMI ${:04X}  IRQ ${:04X}",
        header.reset_vector, header.nmi_vector, header.irq_vector
    );
}

fn print_analysis(analysis: &RomAnalysis) {
    println!("ROM: {} bytes, CRC32 {:08X}", analysis.rom_len, analysis.crc32);
    if analysis.copier_header {
        println!("Copier header: present (removed)");
    }

    match &analysis.header {
        Some(header) => {
            println!("Header:");
            print_header(header);
            println!(
                "  Data checksum ${:04X}: {}",
                analysis.computed_checksum,
                if analysis.checksum_matches_data() { "OK" } else { "MISMATCH" }
            );
        }
        None => println!("Header: not recognized ({} locations checked)", analysis.candidates.len()),
    }
}

fn run_rom(config: &AppConfig, args: RomArgs) -> anyhow::Result<()> {
    let data = read_file(&args.file_path)?;
    let analysis = rom::analyze_rom(&data)
        .with_context(|| format!("Failed to analyze '{}'", args.file_path.display()))?;
    print_analysis(&analysis);

    let rom = rom::strip_copier_header(&data);

    if args.palettes {
        let candidates = scan::scan_for_palettes(rom, config.rom_scan.max_palettes);
        println!("Palette candidates: {}", candidates.len());
        for candidate in &candidates {
            let colors: Vec<_> =
                candidate.palette.colors.iter().map(|color| format!("{:04X}", color.raw())).collect();
            println!("  ${:06X}: {}", candidate.offset, colors.join(" "));
        }
    }

    if let Some(depth) = args.tiles {
        let blocks = scan::scan_for_tile_blocks(rom, depth, config.rom_scan.min_tile_run);
        println!("Tile runs at {} bpp: {}", depth.bits(), blocks.len());
        for block in &blocks {
            println!("  ${:06X}: {} tiles", block.offset, block.tile_count);
        }
    }

    Ok(())
}

fn palette_at(rom: &[u8], offset: usize) -> anyhow::Result<Palette> {
    let bytes = offset
        .checked_add(CGRAM_PALETTE_BYTES)
        .and_then(|end| rom.get(offset..end))
        .ok_or_else(|| anyhow!("Palette at ${offset:06X} runs past the end of the {}-byte ROM", rom.len()))?;

    Palette::from_cgram_bytes(bytes).with_context(|| format!("Failed to read palette at ${offset:06X}"))
}

fn run_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let data = read_file(&args.file_path)?;
    let rom = rom::strip_copier_header(&data);

    let tiles = scan::extract_tiles_at_offset(rom, args.offset, args.depth, args.count);
    if tiles.is_empty() {
        return Err(anyhow!("No complete tiles at offset ${:06X} (ROM is {} bytes)", args.offset, rom.len()));
    }

    let palette = match args.palette_offset {
        Some(offset) => palette_at(rom, offset)?,
        None => PaletteBank::default_bank().get(0).copied().unwrap_or_default(),
    };

    let image = render::render_tileset(&tiles, &palette, TILES_PER_ROW);
    image
        .save(&args.output)
        .with_context(|| format!("Failed to write '{}'", args.output.display()))?;
    log::info!("Wrote {} tiles to '{}'", tiles.len(), args.output.display());

    if let Some(raw_output) = &args.raw_output {
        write_file(raw_output, &Tile::encode_many(&tiles, args.depth))?;
    }

    Ok(())
}

fn run_header(config: &AppConfig, args: HeaderArgs) -> anyhow::Result<()> {
    let mut cartridge_config = config.cartridge.clone();
    cartridge_config.rom_size_kb = args.rom_size_kb.unwrap_or(cartridge_config.rom_size_kb);
    cartridge_config.mapping = args.mapping.unwrap_or(cartridge_config.mapping);
    cartridge_config.speed = args.speed.unwrap_or(cartridge_config.speed);
    cartridge_config.sram_kb = args.sram_kb.unwrap_or(cartridge_config.sram_kb);
    cartridge_config.chip = args.chip.unwrap_or(cartridge_config.chip);
    if let Some(title) = args.title {
        cartridge_config.title = title;
    }

    let cartridge = cartridge_config.to_cartridge_config().context("Invalid cartridge profile")?;
    let fields = cartridge_config.header_fields();

    println!("Mapping:        {} ({:?})", cartridge.mapping, cartridge.speed);
    println!("ROM size:       {}", cartridge.rom_size);
    println!("SRAM size:      {} KB", cartridge.sram_size.kb());
    println!("Chip:           {}", cartridge.chip);
    println!("Header at:      {}", cartridge.header_location());
    println!("Linker config:  {}", cartridge.linker_config_id());
    println!("ROM start:      {}", cartridge.rom_start_address());

    let block = cartridge.header_block(&fields);
    for (row, chunk) in block.chunks(16).enumerate() {
        let bytes: Vec<_> = chunk.iter().map(|byte| format!("{byte:02X}")).collect();
        println!("  +{:02X}: {}", row * 16, bytes.join(" "));
    }

    if let Some(path) = &args.write {
        let mut rom = read_file(path)?;
        if rom::has_copier_header(rom.len()) {
            rom.drain(..rom::COPIER_HEADER_LEN);
            log::info!("Removed copier header from '{}'", path.display());
        }

        let vectors =
            InterruptVectors { reset: args.reset_vector, nmi: args.nmi_vector, irq: args.irq_vector };
        cartridge.write_header(&mut rom, &fields, vectors)?;
        let checksum = rom::fix_checksum(&mut rom, cartridge.header_location())?;
        write_file(path, &rom)?;
        println!("Wrote header to '{}', checksum ${checksum:04X}", path.display());
    }

    Ok(())
}

fn print_import(analysis: &SheetAnalysis) {
    let stats = &analysis.stats;
    println!("Frames:         {}", stats.frame_count);
    println!(
        "Tiles:          {} unique of {} ({:.1}% saved)",
        stats.unique_tiles,
        stats.raw_tiles,
        stats.dedup_ratio * 100.0
    );
    println!("Colors:         {}", stats.colors_found);
    println!("Max OAM/frame:  {}", stats.oam_per_frame);
    for warning in &stats.warnings {
        println!("Warning: {warning}");
    }
}

fn fresh_store(config: &AppConfig) -> anyhow::Result<AssetStore> {
    let cartridge = config.cartridge.to_cartridge_config().context("Invalid cartridge profile")?;
    Ok(AssetStore { cartridge, ..AssetStore::default() })
}

fn run_import(config: &AppConfig, args: ImportArgs) -> anyhow::Result<()> {
    let image = image::open(&args.file_path)
        .with_context(|| format!("Failed to open image '{}'", args.file_path.display()))?
        .to_rgba8();

    let name = args.name.unwrap_or_else(|| {
        args.file_path.file_stem().map_or_else(|| "sprite".into(), |stem| stem.to_string_lossy().into())
    });
    let mut settings = config.import.to_settings(name);
    settings.frame_width = args.frame_width.unwrap_or(settings.frame_width);
    settings.frame_height = args.frame_height.unwrap_or(settings.frame_height);
    settings.depth = args.depth.unwrap_or(settings.depth);
    settings.frame_duration = args.frame_duration.unwrap_or(settings.frame_duration);

    let analysis = spritesheet::analyze(&image, &settings)?;
    print_import(&analysis);

    let Some(output_dir) = &args.output_dir else { return Ok(()) };

    let store = fresh_store(config)?;
    let (store, summary) = commit::perform_import(&store, &analysis)?;
    println!(
        "Committed:      palette slot {} ({:?}), {} new tiles, {} truncated frames",
        summary.palette_slot, summary.palette_choice, summary.new_tiles, summary.truncated_frames
    );

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create '{}'", output_dir.display()))?;
    write_file(&output_dir.join("chr.bin"), &store.chr_bytes(TileDepth::OBJ))?;
    write_file(&output_dir.join("cgram.bin"), &store.palettes.to_cgram_bytes())?;

    if let Some(frame) = store.animation(&settings.name).and_then(|animation| animation.frames.first()) {
        let (oam, _) = OamTable::from_entries(frame.entries.clone());
        write_file(&output_dir.join("oam.bin"), &oam.to_bytes())?;
    }

    log::info!("Wrote tiles, palettes and first-frame OAM to '{}'", output_dir.display());
    Ok(())
}

fn run_vram(args: VramArgs) -> anyhow::Result<()> {
    let chr = read_file(&args.chr)?;
    let tiles = Tile::decode_many(&chr, args.bg_depth)
        .with_context(|| format!("Failed to decode CHR data in '{}'", args.chr.display()))?;

    let layers = args
        .tilemaps
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let tilemap = Tilemap::from_bytes(&read_file(path)?);
            Ok(BgLayer::new(format!("BG{}", i + 1), args.bg_depth, tilemap))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let screen = Screen { name: "screen".into(), layers };
    let zone = Zone { name: "sprites".into(), sprite_tiles: (0..args.sprite_tiles).collect() };
    let budget =
        vram::budget_with_tile_counts(&screen, &zone, tiles.len(), usize::from(args.sprite_tiles));

    for block in &budget.blocks {
        println!(
            "${:05X}-${:05X}  {:>6} bytes  {:<12} {}",
            block.start,
            (block.start + block.size).saturating_sub(1),
            block.size,
            block.category.to_string(),
            block.label
        );
    }
    println!(
        "Used {} of {} bytes ({:.1}%){}",
        budget.used_bytes(),
        vram::VRAM_SIZE,
        budget.percentage(),
        if budget.is_over_budget() { ", OVER BUDGET" } else { "" }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use snes_assets::palette::SnesColor;
    use test_log::test;

    #[test]
    fn palette_is_read_from_exactly_one_cgram_block() {
        let mut rom = vec![0_u8; 0x8000];
        rom[0x102..0x104].copy_from_slice(&0x7FFF_u16.to_le_bytes());

        let palette = palette_at(&rom, 0x100).unwrap();
        assert_eq!(palette.colors[1], SnesColor::WHITE);
        assert_eq!(palette_at(&rom, 0x8000 - CGRAM_PALETTE_BYTES).unwrap(), Palette::default());
    }

    #[test]
    fn palette_past_end_of_rom_is_an_error() {
        let rom = vec![0_u8; 0x8000];
        assert!(palette_at(&rom, 0x7FF0).is_err());
        assert!(palette_at(&rom, usize::MAX).is_err());
    }

    #[test]
    fn invalid_cartridge_config_is_not_replaced_by_defaults() {
        let mut config = AppConfig::default();
        assert_eq!(fresh_store(&config).unwrap().cartridge, config.cartridge.to_cartridge_config().unwrap());

        config.cartridge.sram_kb = 3;
        assert!(fresh_store(&config).is_err());
    }

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(parse_number::<usize>("0x100"), Ok(0x100));
        assert_eq!(parse_number::<u16>("$8000"), Ok(0x8000));
        assert_eq!(parse_number::<u16>("4096"), Ok(4096));
        assert!(parse_number::<u16>("0x10000").is_err());
    }
}
