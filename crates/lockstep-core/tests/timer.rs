use lockstep_core::gb::timer::{TIMER_INTERRUPT, Timer};

/// Timer clocked from DIV bit 3 (TAC=0x05) with TIMA one step from overflow.
fn about_to_overflow() -> (Timer, u8) {
    let mut t = Timer::new();
    t.write(0xFF07, 0x05).unwrap();
    t.write(0xFF06, 0xAB).unwrap();
    t.tima = 0xFF;
    (t, 0)
}

#[test]
fn div_counts_every_machine_cycle() {
    let mut t = Timer::new();
    let mut if_reg = 0u8;
    for _ in 0..64 {
        t.cycle(&mut if_reg);
    }
    assert_eq!(t.div, 256);
    assert_eq!(t.read(0xFF04).unwrap(), 1);
    assert_eq!(if_reg, 0);
}

#[test]
fn div_write_resets_counter() {
    let mut t = Timer::new();
    t.div = 0xABCD;
    t.write(0xFF04, 0x12).unwrap();
    assert_eq!(t.read(0xFF04).unwrap(), 0);
    assert_eq!(t.div, 0);
}

#[test]
fn div_reset_falling_edge_increments_tima() {
    let mut t = Timer::new();
    t.div = 0x0200;
    t.write(0xFF07, 0x04).unwrap();
    t.write(0xFF04, 0).unwrap();
    assert_eq!(t.tima, 1);
}

#[test]
fn tac_disable_falling_edge_increments_tima() {
    let mut t = Timer::new();
    t.div = 0x0200;
    t.write(0xFF07, 0x04).unwrap();
    t.write(0xFF07, 0x00).unwrap();
    assert_eq!(t.tima, 1);
}

#[test]
fn tac_reads_with_unused_bits_set() {
    let mut t = Timer::new();
    t.write(0xFF07, 0xFD).unwrap();
    assert_eq!(t.read(0xFF07).unwrap(), 0xFD);
    t.write(0xFF07, 0x00).unwrap();
    assert_eq!(t.read(0xFF07).unwrap(), 0xF8);
}

#[test]
fn each_select_picks_its_divider_bit() {
    // machine cycles per TIMA increment for TAC 0..3
    for (tac, period) in [(0x04, 256), (0x05, 4), (0x06, 16), (0x07, 64)] {
        let mut t = Timer::new();
        let mut if_reg = 0u8;
        t.write(0xFF07, tac).unwrap();
        for _ in 0..period * 3 {
            t.cycle(&mut if_reg);
        }
        assert_eq!(t.tima, 3, "TAC={tac:02X}");
    }
}

#[test]
fn overflow_reads_zero_for_one_cycle_then_reloads() {
    let (mut t, mut if_reg) = about_to_overflow();
    for _ in 0..4 {
        t.cycle(&mut if_reg);
    }
    assert_eq!(t.read(0xFF05).unwrap(), 0x00);
    assert_eq!(if_reg, 0);

    t.cycle(&mut if_reg);
    assert_eq!(t.read(0xFF05).unwrap(), 0xAB);
    assert_eq!(if_reg, TIMER_INTERRUPT);
}

#[test]
fn tima_write_during_delay_cancels_reload() {
    let (mut t, mut if_reg) = about_to_overflow();
    for _ in 0..4 {
        t.cycle(&mut if_reg);
    }
    t.write(0xFF05, 0x42).unwrap();
    t.cycle(&mut if_reg);
    assert_eq!(t.tima, 0x42);
    assert_eq!(if_reg, 0);
}

#[test]
fn tima_write_during_reload_cycle_is_ignored() {
    let (mut t, mut if_reg) = about_to_overflow();
    for _ in 0..5 {
        t.cycle(&mut if_reg);
    }
    t.write(0xFF05, 0x42).unwrap();
    assert_eq!(t.tima, 0xAB);
}

#[test]
fn tma_write_during_reload_cycle_lands_in_tima() {
    let (mut t, mut if_reg) = about_to_overflow();
    for _ in 0..5 {
        t.cycle(&mut if_reg);
    }
    t.write(0xFF06, 0x77).unwrap();
    assert_eq!(t.tima, 0x77);
    assert_eq!(t.tma, 0x77);

    // one cycle later TMA writes no longer reach TIMA
    t.cycle(&mut if_reg);
    t.write(0xFF06, 0x11).unwrap();
    assert_ne!(t.tima, 0x11);
}

#[test]
fn unmapped_address_is_a_fault() {
    let t = Timer::new();
    assert!(t.read(0xFF03).is_err());
}
