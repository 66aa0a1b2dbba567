mod common;

use common::rom_with_program;
use lockstep_core::gb::cartridge::Cartridge;
use lockstep_core::gb::cpu::InterruptBus;
use lockstep_core::gb::mmu::{Mmu, OAM_DMA_LENGTH};
use lockstep_core::gb::ppu::MODE_TRANSFER;
use lockstep_core::hardware::DmgRevision;

fn mmu() -> Mmu {
    let rom = rom_with_program(&[0xAA]);
    Mmu::new(Cartridge::from_rom(&rom).unwrap())
}

#[test]
fn echo_ram_mirrors_work_ram() {
    let mut mmu = mmu();
    mmu.write_byte(0xC123, 0x5A).unwrap();
    assert_eq!(mmu.read_byte(0xE123).unwrap(), 0x5A);
    mmu.write_byte(0xFDFF, 0x11).unwrap();
    assert_eq!(mmu.read_byte(0xDDFF).unwrap(), 0x11);
}

#[test]
fn interrupt_registers() {
    let mut mmu = mmu();
    mmu.write_byte(0xFF0F, 0xE5).unwrap();
    assert_eq!(mmu.read_byte(0xFF0F).unwrap(), 0xE5);
    assert_eq!(mmu.if_reg, 0x05);

    mmu.write_byte(0xFFFF, 0x1F).unwrap();
    assert_eq!(mmu.pending_interrupts(), 0x05);
    mmu.acknowledge_interrupt(0x01);
    assert_eq!(mmu.read_byte(0xFF0F).unwrap(), 0xE4);
}

#[test]
fn unmapped_io_reads_open_bus() {
    let mut mmu = mmu();
    assert_eq!(mmu.read_byte(0xFF03).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0xFF4C).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0xFEA0).unwrap(), 0xFF);
    mmu.write_byte(0xFF7F, 0x00).unwrap();
}

#[test]
fn boot_rom_overlays_until_ff50() {
    let mut mmu = mmu();
    mmu.load_boot_rom(vec![0x31; 0x100]);
    assert_eq!(mmu.read_byte(0x0000).unwrap(), 0x31);
    assert_eq!(mmu.read_byte(0x00FF).unwrap(), 0x31);
    assert_eq!(mmu.read_byte(0x0100).unwrap(), 0xAA);

    mmu.write_byte(0xFF50, 0x01).unwrap();
    assert!(!mmu.boot_mapped);
    assert_eq!(mmu.read_byte(0x0000).unwrap(), 0x00);
}

#[test]
fn boot_state_raises_vblank_flag() {
    let mut mmu = mmu();
    mmu.apply_boot_state(DmgRevision::RevC);
    assert_eq!(mmu.read_byte(0xFF0F).unwrap(), 0xE1);
    assert_eq!(mmu.read_byte(0xFF40).unwrap(), 0x91);
    assert_eq!(mmu.read_byte(0xFF04).unwrap(), 0xAB);
}

#[test]
fn oam_dma_copies_after_delay() {
    let mut mmu = mmu();
    for i in 0..OAM_DMA_LENGTH as u16 {
        mmu.write_byte(0xC000 + i, i as u8).unwrap();
    }
    mmu.write_byte(0xFF46, 0xC0).unwrap();
    assert_eq!(mmu.read_byte(0xFF46).unwrap(), 0xC0);

    mmu.dma_cycle().unwrap();
    assert!(!mmu.dma_active());
    assert_eq!(mmu.read_byte(0xC000).unwrap(), 0x00);
    assert_eq!(mmu.read_byte(0xC001).unwrap(), 0x01);

    mmu.dma_cycle().unwrap();
    assert!(mmu.dma_active());

    for _ in 0..OAM_DMA_LENGTH - 1 {
        mmu.dma_cycle().unwrap();
    }
    assert!(mmu.dma_active());
    mmu.dma_cycle().unwrap();
    assert!(!mmu.dma_active());
    for i in 0..OAM_DMA_LENGTH as usize {
        assert_eq!(mmu.ppu.oam[i], i as u8);
    }
}

#[test]
fn oam_dma_blocks_its_source_bus() {
    let mut mmu = mmu();
    mmu.write_byte(0xC001, 0x77).unwrap();
    mmu.write_byte(0x8000, 0x66).unwrap();
    mmu.write_byte(0xFF80, 0x55).unwrap();
    mmu.write_byte(0xFF46, 0xC0).unwrap();
    mmu.dma_cycle().unwrap();
    mmu.dma_cycle().unwrap();

    // work RAM and the cartridge share the external bus
    assert_eq!(mmu.read_byte(0xC001).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0x0100).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0xFE00).unwrap(), 0xFF);
    mmu.write_byte(0xC001, 0x00).unwrap();

    assert_eq!(mmu.read_byte(0x8000).unwrap(), 0x66);
    assert_eq!(mmu.read_byte(0xFF80).unwrap(), 0x55);

    for _ in 0..OAM_DMA_LENGTH {
        mmu.dma_cycle().unwrap();
    }
    assert_eq!(mmu.read_byte(0xC001).unwrap(), 0x77);
}

#[test]
fn echo_page_dma_leaves_hram_reachable() {
    for page in [0xFEu8, 0xFF] {
        let mut mmu = mmu();
        mmu.write_byte(0xDE00, 0x21).unwrap();
        mmu.write_byte(0xFF80, 0x3E).unwrap();
        mmu.write_byte(0xFF46, page).unwrap();
        for _ in 0..4 {
            mmu.dma_cycle().unwrap();
        }
        assert!(mmu.dma_active());

        assert_eq!(mmu.read_byte(0xFF80).unwrap(), 0x3E, "page {page:02X}");
        assert_eq!(mmu.read_byte(0xFFFF).unwrap(), 0x00);
        // the copy itself travels over the external bus
        assert_eq!(mmu.read_byte(0xC000).unwrap(), 0xFF);
        assert_eq!(mmu.read_byte(0x0100).unwrap(), 0xFF);
    }

    let mut mmu = mmu();
    mmu.write_byte(0xDE00, 0x21).unwrap();
    mmu.write_byte(0xFF46, 0xFE).unwrap();
    for _ in 0..2 + OAM_DMA_LENGTH as usize {
        mmu.dma_cycle().unwrap();
    }
    assert_eq!(mmu.ppu.oam[0], 0x21);
}

#[test]
fn restarted_dma_keeps_the_bus_during_its_delay() {
    let mut mmu = mmu();
    mmu.write_byte(0xFF80, 0x55).unwrap();
    mmu.write_byte(0xFF46, 0xC0).unwrap();
    for _ in 0..10 {
        mmu.dma_cycle().unwrap();
    }
    assert!(mmu.dma_active());

    // the new source is video RAM, but the old transfer still owns the external bus
    mmu.write_byte(0xFF46, 0x80).unwrap();
    assert!(mmu.dma_active());
    assert_eq!(mmu.read_byte(0xC000).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0xFE00).unwrap(), 0xFF);
    mmu.dma_cycle().unwrap();
    assert_eq!(mmu.read_byte(0xC000).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0xFF80).unwrap(), 0x55);

    // once the new transfer starts, only the video bus is taken
    mmu.dma_cycle().unwrap();
    assert!(mmu.dma_active());
    assert_eq!(mmu.read_byte(0xC000).unwrap(), 0x00);
    assert_eq!(mmu.read_byte(0x8000).unwrap(), 0xFF);
}

#[test]
fn video_memory_locks_follow_ppu_mode() {
    let mut mmu = mmu();
    mmu.apply_boot_state(DmgRevision::RevC);
    mmu.ppu.vram[0] = 0x12;
    mmu.ppu.oam[0] = 0x34;

    // line 0 starts in the OAM scan
    assert_eq!(mmu.read_byte(0xFE00).unwrap(), 0xFF);
    assert_eq!(mmu.read_byte(0x8000).unwrap(), 0x12);

    while mmu.ppu.mode != MODE_TRANSFER {
        mmu.cycle_peripherals().unwrap();
    }
    assert_eq!(mmu.read_byte(0x8000).unwrap(), 0xFF);
    mmu.write_byte(0x8000, 0x99).unwrap();
    assert_eq!(mmu.ppu.vram[0], 0x12);

    while mmu.ppu.mode == MODE_TRANSFER {
        mmu.cycle_peripherals().unwrap();
    }
    assert_eq!(mmu.read_byte(0x8000).unwrap(), 0x12);
    assert_eq!(mmu.read_byte(0xFE00).unwrap(), 0x34);
}

#[test]
fn stop_resets_divider() {
    let mut mmu = mmu();
    mmu.apply_boot_state(DmgRevision::RevC);
    mmu.enter_stop();
    assert_eq!(mmu.read_byte(0xFF04).unwrap(), 0x00);
}
