use lockstep_core::gb::apu::Apu;

fn powered() -> Apu {
    let mut apu = Apu::new();
    apu.write_reg(0xFF26, 0x80).unwrap();
    apu
}

/// Step the frame sequencer once via a falling edge of DIV bit 12.
fn advance_sequencer(apu: &mut Apu) {
    apu.cycle(0x1000);
    apu.cycle(0x0000);
}

#[test]
fn samples_are_centered_while_unpowered() {
    let mut apu = Apu::new();
    for _ in 0..3 {
        apu.cycle(0);
    }
    let mut out = vec![1, 2, 3];
    apu.take_samples(&mut out);
    assert_eq!(out, vec![128; 6]);

    apu.take_samples(&mut out);
    assert!(out.is_empty());
}

#[test]
fn unused_register_bits_read_as_one() {
    let mut apu = powered();
    apu.write_reg(0xFF11, 0xA2).unwrap();
    assert_eq!(apu.read_reg(0xFF11).unwrap(), 0xBF);
    apu.write_reg(0xFF10, 0x07).unwrap();
    assert_eq!(apu.read_reg(0xFF10).unwrap(), 0x87);
    assert_eq!(apu.read_reg(0xFF26).unwrap(), 0xF0);
    assert_eq!(apu.read_reg(0xFF15).unwrap(), 0xFF);
}

#[test]
fn power_off_clears_and_locks_registers() {
    let mut apu = powered();
    apu.write_reg(0xFF24, 0x77).unwrap();
    assert_eq!(apu.read_reg(0xFF24).unwrap(), 0x77);

    apu.write_reg(0xFF26, 0x00).unwrap();
    assert_eq!(apu.read_reg(0xFF24).unwrap(), 0x00);
    assert_eq!(apu.read_reg(0xFF26).unwrap(), 0x70);
    apu.write_reg(0xFF24, 0x55).unwrap();
    assert_eq!(apu.read_reg(0xFF24).unwrap(), 0x00);

    // wave RAM stays writable
    apu.write_reg(0xFF30, 0x5A).unwrap();
    assert_eq!(apu.read_reg(0xFF30).unwrap(), 0x5A);
}

#[test]
fn length_enable_before_non_length_step_takes_extra_clock() {
    let mut apu = powered();
    apu.write_reg(0xFF12, 0xF0).unwrap();
    advance_sequencer(&mut apu);
    assert_eq!(apu.sequencer_step(), 1);

    apu.write_reg(0xFF14, 0xC0).unwrap();
    assert_eq!(apu.ch1_length(), 63);

    advance_sequencer(&mut apu);
    assert_eq!(apu.ch1_length(), 63);
    advance_sequencer(&mut apu);
    assert_eq!(apu.ch1_length(), 62);
}

#[test]
fn length_expiry_disables_channel() {
    let mut apu = powered();
    apu.write_reg(0xFF12, 0xF0).unwrap();
    apu.write_reg(0xFF11, 0x3F).unwrap();
    apu.write_reg(0xFF14, 0xC0).unwrap();
    assert_eq!(apu.read_reg(0xFF26).unwrap() & 0x01, 0x01);

    advance_sequencer(&mut apu);
    assert_eq!(apu.ch1_length(), 0);
    assert_eq!(apu.read_reg(0xFF26).unwrap() & 0x01, 0x00);
}

#[test]
fn trigger_without_dac_leaves_channel_off() {
    let mut apu = powered();
    apu.write_reg(0xFF12, 0x00).unwrap();
    apu.write_reg(0xFF14, 0x80).unwrap();
    assert_eq!(apu.read_reg(0xFF26).unwrap() & 0x01, 0x00);
}

#[test]
fn sweep_overflow_on_trigger_disables_channel() {
    let mut apu = powered();
    apu.write_reg(0xFF10, 0x11).unwrap();
    apu.write_reg(0xFF12, 0xF0).unwrap();
    apu.write_reg(0xFF13, 0x00).unwrap();
    apu.write_reg(0xFF14, 0x87).unwrap();
    assert_eq!(apu.read_reg(0xFF26).unwrap() & 0x01, 0x00);
}

#[test]
fn sweep_updates_frequency_on_step_two() {
    let mut apu = powered();
    apu.write_reg(0xFF10, 0x11).unwrap();
    apu.write_reg(0xFF12, 0xF0).unwrap();
    apu.write_reg(0xFF13, 0x00).unwrap();
    apu.write_reg(0xFF14, 0x81).unwrap();
    assert_eq!(apu.ch1_frequency(), 0x100);

    advance_sequencer(&mut apu);
    advance_sequencer(&mut apu);
    assert_eq!(apu.ch1_frequency(), 0x100);
    advance_sequencer(&mut apu);
    assert_eq!(apu.ch1_frequency(), 0x180);
}

#[test]
fn wave_ram_is_locked_while_playing() {
    let mut apu = powered();
    apu.write_reg(0xFF30, 0x12).unwrap();
    assert_eq!(apu.read_reg(0xFF30).unwrap(), 0x12);

    apu.write_reg(0xFF1A, 0x80).unwrap();
    apu.write_reg(0xFF1E, 0x80).unwrap();
    assert_eq!(apu.read_reg(0xFF26).unwrap() & 0x04, 0x04);
    assert_eq!(apu.read_reg(0xFF30).unwrap(), 0xFF);

    apu.write_reg(0xFF1A, 0x00).unwrap();
    assert_eq!(apu.read_reg(0xFF30).unwrap(), 0x12);
}

#[test]
fn wave_length_counts_from_256() {
    let mut apu = powered();
    apu.write_reg(0xFF1A, 0x80).unwrap();
    apu.write_reg(0xFF1B, 0x00).unwrap();
    assert_eq!(apu.ch3_length(), 256);
}

#[test]
fn noise_trigger_seeds_lfsr() {
    let mut apu = powered();
    apu.write_reg(0xFF21, 0xF0).unwrap();
    apu.write_reg(0xFF22, 0x00).unwrap();
    apu.write_reg(0xFF23, 0x80).unwrap();
    assert_eq!(apu.ch4_lfsr(), 0x7FFF);

    // divisor 8 with no shift: one LFSR clock every two machine cycles
    apu.cycle(0);
    apu.cycle(0);
    assert_eq!(apu.ch4_lfsr(), 0x3FFF);
}

#[test]
fn one_stereo_pair_per_cycle() {
    let mut apu = powered();
    apu.write_reg(0xFF25, 0x00).unwrap();
    for _ in 0..100 {
        apu.cycle(0);
    }
    let mut out = Vec::new();
    apu.take_samples(&mut out);
    assert_eq!(out.len(), 200);
    assert!(out.iter().all(|&s| s == 128));
}

#[test]
fn unmapped_register_is_a_fault() {
    let apu = Apu::new();
    assert!(apu.read_reg(0xFF40).is_err());
}
