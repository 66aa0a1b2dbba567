use lockstep_core::gb::ppu::{
    DMG_PALETTE, MODE_OAM, MODE_TRANSFER, MODE_VBLANK, Ppu, SCREEN_WIDTH, STAT_INTERRUPT,
    VBLANK_INTERRUPT,
};

const CYCLES_PER_FRAME: u32 = 17_556;

fn booted() -> Ppu {
    let mut ppu = Ppu::new();
    ppu.apply_boot_state();
    ppu.write_reg(0xFF47, 0xE4).unwrap();
    ppu
}

/// Run until the next finished frame.
fn next_frame(ppu: &mut Ppu) {
    let mut if_reg = 0;
    for _ in 0..CYCLES_PER_FRAME {
        ppu.cycle(&mut if_reg);
        if ppu.take_frame() {
            return;
        }
    }
    panic!("no frame within {CYCLES_PER_FRAME} cycles");
}

#[test]
fn frame_is_17556_machine_cycles() {
    let mut ppu = booted();
    let mut if_reg = 0;
    for _ in 0..CYCLES_PER_FRAME {
        ppu.cycle(&mut if_reg);
    }
    assert_eq!(ppu.dot_position(), (0, 0));
    assert_eq!(ppu.frames(), 1);
}

#[test]
fn vblank_fires_once_at_line_144() {
    let mut ppu = booted();
    let mut hits = Vec::new();
    for cycle in 1..=CYCLES_PER_FRAME {
        let mut if_reg = 0;
        ppu.cycle(&mut if_reg);
        if if_reg & VBLANK_INTERRUPT != 0 {
            hits.push((cycle, ppu.dot_position()));
        }
    }
    assert_eq!(hits, vec![(16_416, (144, 0))]);
    assert_eq!(ppu.mode, MODE_OAM);
}

#[test]
fn vblank_mode_covers_lines_144_to_153() {
    let mut ppu = booted();
    let mut if_reg = 0;
    for _ in 0..16_416 {
        ppu.cycle(&mut if_reg);
    }
    for _ in 0..(10 * 456 / 4) {
        assert_eq!(ppu.mode, MODE_VBLANK);
        ppu.cycle(&mut if_reg);
    }
    assert_eq!(ppu.dot_position(), (0, 0));
}

#[test]
fn transfer_lasts_172_dots_without_scroll_or_sprites() {
    let mut ppu = booted();
    let mut if_reg = 0;
    while ppu.mode != MODE_TRANSFER {
        ppu.step_dot(&mut if_reg);
    }
    assert_eq!(ppu.dot_position(), (0, 80));
    while ppu.mode == MODE_TRANSFER {
        ppu.step_dot(&mut if_reg);
    }
    assert_eq!(ppu.dot_position(), (0, 252));
}

#[test]
fn fine_scroll_lengthens_transfer() {
    let mut ppu = booted();
    ppu.write_reg(0xFF43, 0x03).unwrap();
    let mut if_reg = 0;
    while ppu.mode != MODE_TRANSFER {
        ppu.step_dot(&mut if_reg);
    }
    while ppu.mode == MODE_TRANSFER {
        ppu.step_dot(&mut if_reg);
    }
    assert_eq!(ppu.dot_position(), (0, 255));
}

#[test]
fn stat_interrupt_fires_on_rising_edge_only() {
    let mut ppu = booted();
    // HBlank and VBlank sources: line 143's HBlank runs straight into VBlank
    ppu.write_reg(0xFF41, 0x18).unwrap();
    let mut count = 0;
    for _ in 0..CYCLES_PER_FRAME {
        let mut if_reg = 0;
        ppu.cycle(&mut if_reg);
        if if_reg & STAT_INTERRUPT != 0 {
            count += 1;
        }
    }
    assert_eq!(count, 144);
}

#[test]
fn lyc_coincidence_sets_stat_bit() {
    let mut ppu = booted();
    ppu.write_reg(0xFF45, 0x02).unwrap();
    ppu.write_reg(0xFF41, 0x40).unwrap();
    let mut hits = Vec::new();
    for _ in 0..CYCLES_PER_FRAME {
        let mut if_reg = 0;
        ppu.cycle(&mut if_reg);
        if if_reg & STAT_INTERRUPT != 0 {
            hits.push(ppu.dot_position().0);
        }
    }
    assert_eq!(hits, vec![2]);
    assert_eq!(ppu.read_reg(0xFF41).unwrap() & 0x04, 0);
}

#[test]
fn background_tile_row_is_drawn() {
    let mut ppu = booted();
    // tile 0, row 0: colour 1 across; map is all tile 0
    ppu.vram[0] = 0xFF;
    ppu.vram[1] = 0x00;
    next_frame(&mut ppu);
    assert!(ppu.framebuffer[..SCREEN_WIDTH]
        .iter()
        .all(|&p| p == DMG_PALETTE[1]));
    assert_eq!(ppu.framebuffer[SCREEN_WIDTH], DMG_PALETTE[0]);
    assert_eq!(ppu.framebuffer[8 * SCREEN_WIDTH], DMG_PALETTE[1]);
}

#[test]
fn sprite_covers_background() {
    let mut ppu = booted();
    ppu.write_reg(0xFF40, 0x93).unwrap();
    ppu.write_reg(0xFF48, 0xE4).unwrap();
    // tile 1, row 0: colour 3
    ppu.vram[0x10] = 0xFF;
    ppu.vram[0x11] = 0xFF;
    ppu.oam[..4].copy_from_slice(&[16, 8, 1, 0]);
    next_frame(&mut ppu);
    assert!(ppu.framebuffer[..8].iter().all(|&p| p == DMG_PALETTE[3]));
    assert_eq!(ppu.framebuffer[8], DMG_PALETTE[0]);
    assert_eq!(ppu.framebuffer[SCREEN_WIDTH], DMG_PALETTE[0]);
}

#[test]
fn sprites_hidden_when_obj_disabled() {
    let mut ppu = booted();
    ppu.write_reg(0xFF48, 0xE4).unwrap();
    ppu.vram[0x10] = 0xFF;
    ppu.vram[0x11] = 0xFF;
    ppu.oam[..4].copy_from_slice(&[16, 8, 1, 0]);
    next_frame(&mut ppu);
    assert_eq!(ppu.framebuffer[0], DMG_PALETTE[0]);
}

#[test]
fn first_frame_after_lcd_enable_is_blank() {
    let mut ppu = Ppu::new();
    ppu.write_reg(0xFF47, 0xE4).unwrap();
    ppu.vram[0] = 0xFF;
    ppu.write_reg(0xFF40, 0x91).unwrap();

    next_frame(&mut ppu);
    assert!(ppu.framebuffer.iter().all(|&p| p == DMG_PALETTE[0]));
    next_frame(&mut ppu);
    assert_eq!(ppu.framebuffer[0], DMG_PALETTE[1]);
}

#[test]
fn lcd_off_resets_position() {
    let mut ppu = booted();
    let mut if_reg = 0;
    for _ in 0..1000 {
        ppu.cycle(&mut if_reg);
    }
    ppu.write_reg(0xFF40, 0x11).unwrap();
    assert_eq!(ppu.dot_position(), (0, 0));
    assert_eq!(ppu.read_reg(0xFF44).unwrap(), 0);
    for _ in 0..1000 {
        ppu.cycle(&mut if_reg);
    }
    assert_eq!(ppu.dot_position(), (0, 0));
    assert!(ppu.vram_accessible());
}

#[test]
fn lcd_off_stops_frame_handoff() {
    let mut ppu = booted();
    let mut if_reg = 0;
    // stop inside VBlank with the finished frame not yet taken
    while ppu.dot_position().0 != 145 {
        ppu.cycle(&mut if_reg);
    }
    let frames = ppu.frames();
    ppu.write_reg(0xFF40, 0x11).unwrap();
    assert!(!ppu.take_frame());

    for _ in 0..3 * CYCLES_PER_FRAME {
        ppu.cycle(&mut if_reg);
        assert!(!ppu.take_frame());
    }
    assert_eq!(ppu.frames(), frames);

    // handoff resumes after re-enabling, starting with a blank frame
    ppu.write_reg(0xFF40, 0x91).unwrap();
    next_frame(&mut ppu);
    assert!(ppu.framebuffer.iter().all(|&p| p == DMG_PALETTE[0]));
}
