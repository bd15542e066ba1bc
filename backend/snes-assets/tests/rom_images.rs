use snes_assets::cartridge::{
    CartridgeConfig, Chip, HeaderFields, HeaderLocation, InterruptVectors, MappingMode, RomSize, RomSpeed,
    SramSize,
};
use snes_assets::rom::{self, RomError};
use snes_assets::rom::scan;
use snes_assets::tile::{Tile, TileDepth};
use test_log::test;

fn build_rom(config: &CartridgeConfig, len: usize, title: &str) -> Vec<u8> {
    let mut rom: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
    let fields = HeaderFields { title: title.into(), country: 0x02, developer_id: 0x01, version: 3 };
    let vectors = InterruptVectors { reset: 0x8000, nmi: 0x8123, irq: 0x8456 };
    config.write_header(&mut rom, &fields, vectors).unwrap();
    rom::fix_checksum(&mut rom, config.header_location()).unwrap();
    rom
}

#[test]
fn lorom_image_round_trips_through_analysis() {
    let config = CartridgeConfig {
        rom_size: RomSize::Kb512,
        mapping: MappingMode::LoRom,
        speed: RomSpeed::Fast,
        sram_size: SramSize::Kb8,
        chip: Chip::None,
    };
    let rom = build_rom(&config, 0x20000, "LOROM FIXTURE");

    let analysis = rom::analyze_rom(&rom).unwrap();
    assert!(!analysis.copier_header);

    let header = analysis.header.as_ref().unwrap();
    assert_eq!(header.location, HeaderLocation::LoRom);
    assert_eq!(header.title, "LOROM FIXTURE");
    assert_eq!(header.mapping, Some(MappingMode::LoRom));
    assert_eq!(header.speed, RomSpeed::Fast);
    assert_eq!(header.chipset, 0x02);
    assert_eq!(header.rom_size_kb, Some(512));
    assert_eq!(header.ram_size_kb, Some(8));
    assert_eq!(header.country_name(), Some("Europe"));
    assert_eq!(header.version, 3);
    assert_eq!((header.reset_vector, header.nmi_vector, header.irq_vector), (0x8000, 0x8123, 0x8456));
    assert!(analysis.checksum_matches_data());
}

#[test]
fn hirom_is_found_after_lorom_fails() {
    let config = CartridgeConfig { mapping: MappingMode::HiRom, ..CartridgeConfig::default() };
    let mut rom = build_rom(&config, 0x20000, "HIROM FIXTURE");

    // Make sure the LoROM location cannot pass by accident
    rom[0x7FDC..0x7FE0].copy_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let analysis = rom::analyze_rom(&rom).unwrap();
    let header = analysis.header.unwrap();
    assert_eq!(header.location, HeaderLocation::HiRom);
    assert_eq!(header.mapping, Some(MappingMode::HiRom));
    assert_eq!(analysis.candidates.len(), 2);
    assert!(!analysis.candidates[0].checksum_valid());
}

#[test]
fn copier_header_is_stripped_before_parsing() {
    let rom = build_rom(&CartridgeConfig::default(), 0x8000, "SMC FIXTURE");
    let mut dump = vec![0xAA; 512];
    dump.extend_from_slice(&rom);
    assert_eq!(dump.len() % 1024, 512);

    let analysis = rom::analyze_rom(&dump).unwrap();
    assert!(analysis.copier_header);
    assert_eq!(analysis.rom_len, rom.len());
    assert_eq!(analysis.header.unwrap().title, "SMC FIXTURE");
    assert_eq!(analysis.crc32, rom::analyze_rom(&rom).unwrap().crc32);
}

#[test]
fn unrecognized_header_is_not_an_error() {
    let rom = vec![0x00; 0x10000];
    let analysis = rom::analyze_rom(&rom).unwrap();
    assert!(analysis.header.is_none());
    assert!(!analysis.checksum_matches_data());
}

#[test]
fn truncated_rom_is_rejected() {
    assert_eq!(rom::analyze_rom(&[0; 1000]), Err(RomError::TooSmall { len: 1000 }));
}

#[test]
fn corrupted_byte_breaks_data_checksum_but_not_complement() {
    let mut rom = build_rom(&CartridgeConfig::default(), 0x10000, "CORRUPT");
    rom[0x100] = rom[0x100].wrapping_add(1);

    let analysis = rom::analyze_rom(&rom).unwrap();
    assert!(analysis.header.as_ref().unwrap().checksum_valid());
    assert!(!analysis.checksum_matches_data());
}

#[test]
fn embedded_graphics_are_discoverable() {
    let mut rom = vec![0x00; 0x8000];
    let tile = Tile::from_pixels(std::array::from_fn(|i| (i % 4) as u8));
    let chr = Tile::encode_many(&[tile.clone(), tile.clone(), tile.clone()], TileDepth::Two);
    rom[0x1000..0x1000 + chr.len()].copy_from_slice(&chr);

    let blocks = scan::scan_for_tile_blocks(&rom, TileDepth::Two, 2);
    assert_eq!(blocks, vec![scan::TileBlock { offset: 0x1000, tile_count: 3 }]);

    let tiles = scan::extract_tiles_at_offset(&rom, 0x1000, TileDepth::Two, 3);
    assert!(tiles.iter().all(|extracted| extracted.same_pixels(&tile)));
}
