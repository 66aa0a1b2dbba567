#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use lockstep_core::bus::FlatRam;
use lockstep_core::device::Signals;
use lockstep_core::gb::cpu::{Cpu, InterruptBus};
use lockstep_core::hardware::DmgRevision;
use lockstep_core::sink::{AudioSink, Frame, KeySource, VideoSink};
use once_cell::sync::Lazy;

pub const ENTRY: usize = 0x0100;
pub const BANK_SIZE: usize = 0x4000;

/// ROM image with the given header codes, `program` at the entry point and
/// each switchable bank tagged with its own number in its first byte.
pub fn cart_rom(cartridge_type: u8, rom_code: u8, ram_code: u8, program: &[u8]) -> Vec<u8> {
    let size = 0x8000 << rom_code;
    let mut rom = vec![0; size];
    for bank in 1..size / BANK_SIZE {
        rom[bank * BANK_SIZE] = bank as u8;
    }
    rom[ENTRY..ENTRY + program.len()].copy_from_slice(program);
    rom[0x0147] = cartridge_type;
    rom[0x0148] = rom_code;
    rom[0x0149] = ram_code;
    rom
}

/// 32 KiB ROM-only image.
pub fn rom_with_program(program: &[u8]) -> Vec<u8> {
    cart_rom(0x00, 0x00, 0x00, program)
}

/// Spins on `JR -2` forever.
pub static SPIN_ROM: Lazy<Vec<u8>> = Lazy::new(|| rom_with_program(&[0x18, 0xFE]));

/// Executes an undefined opcode straight away.
pub static FAULT_ROM: Lazy<Vec<u8>> = Lazy::new(|| rom_with_program(&[0x00, 0xD3]));

/// SM83 on flat RAM with `program` at 0x0100, HL=0xC000 and SP=0xD000.
pub fn sm83(program: &[u8]) -> (Cpu, FlatRam) {
    let mut ram = FlatRam::new();
    ram.load(ENTRY as u16, program);
    let mut cpu = Cpu::new(DmgRevision::RevC);
    cpu.h = 0xC0;
    cpu.l = 0x00;
    cpu.sp = 0xD000;
    (cpu, ram)
}

/// Machine cycles until the next instruction retires.
pub fn run_instruction<B: InterruptBus>(cpu: &mut Cpu, bus: &mut B) -> u32 {
    let mut cycles = 0;
    loop {
        let retired = cpu.cycle(bus).unwrap();
        cycles += 1;
        let interrupt = bus.pending_interrupts() != 0;
        cpu.next_state(Signals {
            interrupt,
            ..Signals::default()
        });
        if retired {
            return cycles;
        }
    }
}

/// Keeps a copy of every presented frame.
#[derive(Clone, Default)]
pub struct RecordingVideo {
    pub frames: Rc<RefCell<Vec<Vec<u32>>>>,
}

impl VideoSink for RecordingVideo {
    fn present(&mut self, frame: Frame<'_>) {
        assert_eq!(frame.pixels.len(), frame.width * frame.height);
        self.frames.borrow_mut().push(frame.pixels.to_vec());
    }
}

/// Records every submitted audio buffer and can hold the pacing gate shut.
#[derive(Clone)]
pub struct RecordingAudio {
    pub samples_per_frame: usize,
    pub buffers: Rc<RefCell<Vec<(Vec<u8>, usize)>>>,
    pub ready: Rc<RefCell<bool>>,
}

impl RecordingAudio {
    pub fn new(samples_per_frame: usize) -> Self {
        Self {
            samples_per_frame,
            buffers: Rc::default(),
            ready: Rc::new(RefCell::new(true)),
        }
    }
}

impl AudioSink for RecordingAudio {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    fn ready_for_frame(&self) -> bool {
        *self.ready.borrow()
    }

    fn submit(&mut self, samples: &[u8], channels: usize) {
        self.buffers.borrow_mut().push((samples.to_vec(), channels));
    }
}

/// A fixed set of held keys.
pub struct HeldKeys(pub Vec<usize>);

impl KeySource for HeldKeys {
    fn is_pressed(&self, key: usize) -> bool {
        self.0.contains(&key)
    }
}
