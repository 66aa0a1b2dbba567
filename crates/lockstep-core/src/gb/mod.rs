//! DMG class handheld.
//!
//! [`GameBoy`] owns the SM83 core and the memory map, and drives both one
//! M-cycle at a time: CPU first, then every peripheral in fixed order
//! (see [`Mmu::cycle_peripherals`]), then the interrupt signal is handed
//! back to the CPU to choose its next state.

pub mod apu;
pub mod cartridge;
pub mod cpu;
pub mod joypad;
pub mod mmu;
pub mod ppu;
pub mod serial;
pub mod timer;

use crate::{
    device::Signals,
    emulator::{Emulator, FrameOutcome, Session},
    error::Result,
    hardware::DmgRevision,
    sink::{
        AudioSink, Frame, KeySource, NoKeys, NullAudio, NullVideo, RomSource, VideoSink,
        resample_nearest,
    },
};

use cartridge::Cartridge;
use cpu::{Cpu, CpuState, InterruptBus};
use mmu::Mmu;
use ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use serial::LinkPort;

/// M-cycles per video frame: 154 lines of 456 dots, four dots per cycle.
pub const CYCLES_PER_FRAME: u32 = 17_556;
/// M-cycles per second: a 4.194304 MHz dot clock divided by four.
pub const CYCLES_PER_SECOND: u32 = 1_048_576;

const AUDIO_CHANNELS: usize = 2;

#[derive(Clone, Debug, Default)]
pub struct GameBoyOptions {
    pub revision: DmgRevision,
    /// Boot ROM to run from 0x0000. Without one the machine starts in the
    /// state the boot ROM of `revision` leaves behind.
    pub boot_rom: Option<Vec<u8>>,
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    video: Box<dyn VideoSink>,
    audio: Box<dyn AudioSink>,
    keys: Box<dyn KeySource>,
    session: Session,
    frame_cycle: u32,
    samples: Vec<u8>,
    resampled: Vec<u8>,
}

impl GameBoy {
    /// Build a machine around `rom` with null sinks attached.
    pub fn new<R: RomSource + ?Sized>(rom: &R, options: GameBoyOptions) -> Result<Self> {
        let cart = Cartridge::from_rom(rom)?;
        let mut mmu = Mmu::new(cart);
        let cpu = match options.boot_rom {
            Some(boot_rom) => {
                mmu.load_boot_rom(boot_rom);
                Cpu::power_on()
            }
            None => {
                mmu.apply_boot_state(options.revision);
                Cpu::new(options.revision)
            }
        };
        log::debug!("DMG started ({:?})", options.revision);

        Ok(Self {
            cpu,
            mmu,
            video: Box::new(NullVideo),
            audio: Box::new(NullAudio::default()),
            keys: Box::new(NoKeys),
            session: Session::default(),
            frame_cycle: 0,
            samples: Vec::new(),
            resampled: Vec::new(),
        })
    }

    pub fn set_video_sink(&mut self, sink: Box<dyn VideoSink>) {
        self.video = sink;
    }

    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.audio = sink;
    }

    pub fn set_key_source(&mut self, keys: Box<dyn KeySource>) {
        self.keys = keys;
    }

    /// Plug a partner into the serial port.
    pub fn connect_link(&mut self, port: Box<dyn LinkPort>) {
        self.mmu.serial.connect(port);
    }

    fn step(&mut self) -> Result<()> {
        if self.cpu.cycle(&mut self.mmu)? {
            self.session.retire();
        }
        self.mmu.cycle_peripherals()?;

        let interrupt = if self.cpu.state == CpuState::Stop {
            self.mmu.joypad.any_line_low()
        } else {
            self.mmu.pending_interrupts() != 0
        };
        self.cpu.next_state(Signals {
            interrupt,
            ..Signals::default()
        });

        if self.mmu.ppu.take_frame() {
            self.video.present(Frame {
                width: SCREEN_WIDTH,
                height: SCREEN_HEIGHT,
                pixels: &self.mmu.ppu.framebuffer,
            });
        }

        self.frame_cycle += 1;
        if self.frame_cycle == CYCLES_PER_FRAME {
            self.frame_cycle = 0;
            self.flush_audio();
        }
        Ok(())
    }

    fn flush_audio(&mut self) {
        self.mmu.apu.take_samples(&mut self.samples);
        self.resampled.clear();
        resample_nearest(
            &self.samples,
            AUDIO_CHANNELS,
            self.audio.samples_per_frame(),
            &mut self.resampled,
        );
        self.audio.submit(&self.resampled, AUDIO_CHANNELS);
    }
}

impl Emulator for GameBoy {
    fn cycles_per_frame(&self) -> u32 {
        CYCLES_PER_FRAME
    }

    fn execute_frame(&mut self) -> Result<FrameOutcome> {
        if self.session.is_closed() {
            return Ok(FrameOutcome::Closed);
        }
        self.session.check()?;
        if !self.audio.ready_for_frame() {
            return Ok(FrameOutcome::Paced);
        }

        self.mmu
            .joypad
            .latch(self.keys.as_ref(), &mut self.mmu.if_reg);
        for _ in self.frame_cycle..CYCLES_PER_FRAME {
            let result = self.step();
            self.session.record(result)?;
        }
        Ok(FrameOutcome::Completed)
    }

    fn execute_cycle(&mut self) -> Result<()> {
        self.session.check()?;
        let result = self.step();
        self.session.record(result)
    }

    fn current_instructions_per_frame(&mut self) -> u64 {
        self.session.take_instructions()
    }

    fn close(&mut self) {
        self.session.close();
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}
