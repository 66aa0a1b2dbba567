mod common;

use common::{run_instruction, sm83};
use lockstep_core::device::Signals;
use lockstep_core::gb::cpu::{CpuState, InterruptBus};
use lockstep_core::{Arch, EmuError};

const FLAG_Z: u8 = 0x80;
const FLAG_C: u8 = 0x10;

/// (instruction bytes, machine cycles)
const UNCONDITIONAL: &[(&[u8], u32)] = &[
    (&[0x00], 1),
    (&[0x01, 0x34, 0x12], 3),
    (&[0x02], 2),
    (&[0x03], 2),
    (&[0x04], 1),
    (&[0x06, 0x12], 2),
    (&[0x07], 1),
    (&[0x08, 0x00, 0xC1], 5),
    (&[0x09], 2),
    (&[0x0A], 2),
    (&[0x18, 0x00], 3),
    (&[0x22], 2),
    (&[0x27], 1),
    (&[0x2F], 1),
    (&[0x34], 3),
    (&[0x35], 3),
    (&[0x36, 0x12], 3),
    (&[0x37], 1),
    (&[0x3F], 1),
    (&[0x41], 1),
    (&[0x46], 2),
    (&[0x70], 2),
    (&[0x80], 1),
    (&[0x86], 2),
    (&[0xBE], 2),
    (&[0xC1], 3),
    (&[0xC3, 0x00, 0x02], 4),
    (&[0xC5], 4),
    (&[0xC6, 0x01], 2),
    (&[0xC7], 4),
    (&[0xC9], 4),
    (&[0xCD, 0x00, 0x02], 6),
    (&[0xD9], 4),
    (&[0xE0, 0x80], 3),
    (&[0xE2], 2),
    (&[0xE8, 0x01], 4),
    (&[0xE9], 1),
    (&[0xEA, 0x00, 0xC0], 4),
    (&[0xF0, 0x80], 3),
    (&[0xF2], 2),
    (&[0xF3], 1),
    (&[0xF8, 0x01], 3),
    (&[0xF9], 2),
    (&[0xFA, 0x00, 0xC0], 4),
    (&[0xFB], 1),
    (&[0xCB, 0x00], 2),
    (&[0xCB, 0x37], 2),
    (&[0xCB, 0x46], 3),
    (&[0xCB, 0x06], 4),
    (&[0xCB, 0x86], 4),
    (&[0xCB, 0xC6], 4),
    (&[0x10, 0x00], 1),
    (&[0x76], 1),
];

#[test]
fn unconditional_instruction_cycles() {
    for &(bytes, expected) in UNCONDITIONAL {
        let (mut cpu, mut ram) = sm83(bytes);
        let cycles = run_instruction(&mut cpu, &mut ram);
        assert_eq!(cycles, expected, "opcode {:02X?}", bytes);
    }
}

/// (instruction bytes, cycles when taken, cycles when not taken)
const CONDITIONAL: &[(&[u8], u32, u32)] = &[
    (&[0x20, 0x00], 3, 2),
    (&[0xC0], 5, 2),
    (&[0xC2, 0x00, 0x02], 4, 3),
    (&[0xC4, 0x00, 0x02], 6, 3),
];

#[test]
fn conditional_instruction_cycles() {
    for &(bytes, taken, not_taken) in CONDITIONAL {
        // NZ is true while Z is clear
        let (mut cpu, mut ram) = sm83(bytes);
        cpu.f = 0;
        assert_eq!(run_instruction(&mut cpu, &mut ram), taken, "{bytes:02X?} taken");

        let (mut cpu, mut ram) = sm83(bytes);
        cpu.f = FLAG_Z;
        assert_eq!(
            run_instruction(&mut cpu, &mut ram),
            not_taken,
            "{bytes:02X?} not taken"
        );
    }
}

#[test]
fn carry_conditions() {
    // JR C,+4 ; JR NC,+4
    let (mut cpu, mut ram) = sm83(&[0x38, 0x04]);
    cpu.f = FLAG_C;
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(cpu.pc, 0x0106);

    let (mut cpu, mut ram) = sm83(&[0x30, 0x04]);
    cpu.f = FLAG_C;
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(cpu.pc, 0x0102);
}

#[test]
fn every_hole_is_an_invalid_instruction() {
    for opcode in [
        0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
    ] {
        let (mut cpu, mut ram) = sm83(&[opcode]);
        assert_eq!(
            cpu.cycle(&mut ram),
            Err(EmuError::InvalidInstruction {
                arch: Arch::Sm83,
                opcode,
                address: 0x0100,
            })
        );
    }
}

#[test]
fn subtract_and_compare_flags() {
    // LD A,0x10 ; SUB 0x01 ; CP 0x0F
    let (mut cpu, mut ram) = sm83(&[0x3E, 0x10, 0xD6, 0x01, 0xFE, 0x0F]);
    run_instruction(&mut cpu, &mut ram);
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(cpu.a, 0x0F);
    assert_eq!(cpu.f, 0x60);
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(cpu.a, 0x0F);
    assert_eq!(cpu.f, 0xC0);
}

#[test]
fn daa_after_bcd_subtract() {
    // LD A,0x42 ; SUB 0x15 ; DAA
    let (mut cpu, mut ram) = sm83(&[0x3E, 0x42, 0xD6, 0x15, 0x27]);
    for _ in 0..3 {
        run_instruction(&mut cpu, &mut ram);
    }
    assert_eq!(cpu.a, 0x27);
    assert_eq!(cpu.f & FLAG_C, 0);
}

#[test]
fn add_sp_uses_low_byte_flags() {
    // ADD SP,-1
    let (mut cpu, mut ram) = sm83(&[0xE8, 0xFF]);
    cpu.sp = 0x00FF;
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(cpu.sp, 0x00FE);
    assert_eq!(cpu.f, 0x30);
}

#[test]
fn ei_takes_effect_after_next_instruction() {
    // EI ; INC A ; INC A
    let (mut cpu, mut ram) = sm83(&[0xFB, 0x3C, 0x3C]);
    cpu.a = 0;
    ram.memory[0xFFFF] = 0x01;
    ram.memory[0xFF0F] = 0x01;

    run_instruction(&mut cpu, &mut ram);
    assert_eq!(cpu.state, CpuState::Fetch);
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(cpu.a, 1);
    assert_eq!(cpu.state, CpuState::Interrupt);
}

#[test]
fn di_right_after_ei_blocks_interrupts() {
    // EI ; DI ; NOP
    let (mut cpu, mut ram) = sm83(&[0xFB, 0xF3, 0x00]);
    ram.memory[0xFFFF] = 0x01;
    ram.memory[0xFF0F] = 0x01;
    for _ in 0..3 {
        run_instruction(&mut cpu, &mut ram);
    }
    assert!(!cpu.ime);
    assert_eq!(cpu.pc, 0x0103);
}

/// Drive one interrupt dispatch to completion, returning the cycle count.
fn dispatch(cpu: &mut lockstep_core::gb::cpu::Cpu, ram: &mut lockstep_core::bus::FlatRam) -> u32 {
    let mut cycles = 0;
    while cpu.state == CpuState::Interrupt {
        assert!(!cpu.cycle(ram).unwrap());
        cycles += 1;
        let interrupt = ram.pending_interrupts() != 0;
        cpu.next_state(Signals {
            interrupt,
            ..Signals::default()
        });
    }
    cycles
}

#[test]
fn dispatch_services_highest_priority_first() {
    // NOP with IME already on
    let (mut cpu, mut ram) = sm83(&[0x00]);
    cpu.ime = true;
    ram.memory[0xFFFF] = 0x1F;
    ram.memory[0xFF0F] = 0x14;
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(dispatch(&mut cpu, &mut ram), 5);
    assert_eq!(cpu.pc, 0x0050);
    assert_eq!(ram.memory[0xFF0F], 0x10);
}

#[test]
fn dispatch_cancelled_by_ie_overwrite_jumps_to_zero() {
    let (mut cpu, mut ram) = sm83(&[0x00]);
    cpu.ime = true;
    // the high byte of PC (0x01) lands on IE and disables the request
    cpu.sp = 0x0000;
    ram.memory[0xFFFF] = 0x04;
    ram.memory[0xFF0F] = 0x04;
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(dispatch(&mut cpu, &mut ram), 5);
    assert_eq!(ram.memory[0xFFFF], 0x01);
    assert_eq!(cpu.pc, 0x0000);
    assert_eq!(ram.memory[0xFF0F], 0x04);
}

#[test]
fn stop_skips_operand_and_waits() {
    // STOP ; (padding) ; INC A
    let (mut cpu, mut ram) = sm83(&[0x10, 0x00, 0x3C]);
    run_instruction(&mut cpu, &mut ram);
    assert_eq!(cpu.state, CpuState::Stop);
    assert_eq!(cpu.pc, 0x0102);
    for _ in 0..4 {
        assert!(!cpu.cycle(&mut ram).unwrap());
        cpu.next_state(Signals::default());
    }
    assert_eq!(cpu.state, CpuState::Stop);
    cpu.next_state(Signals {
        interrupt: true,
        ..Signals::default()
    });
    assert_eq!(cpu.state, CpuState::Fetch);
}
