//! COSMAC VIP class computer.
//!
//! The CDP1802 sees three peripherals through the [`Arbiter`]: the Pixie
//! video chip, the hex keypad and the Q tone. They are stepped in that order
//! after every CPU cycle, and the arbiter folds their requests into the
//! signals the CPU uses to pick its next state.

pub mod cpu;
pub mod keypad;
pub mod memory;
pub mod pixie;
pub mod tone;

use crate::{
    bus::Bus,
    device::{Arbiter, DmaStatus, Device},
    emulator::{Emulator, FrameOutcome, Session},
    error::Result,
    hardware::VipMemory,
    sink::{
        AudioSink, Frame, KeySource, NoKeys, NullAudio, NullVideo, VideoSink, resample_nearest,
    },
};

use cpu::{Cdp1802, CosmacBus};
use keypad::Keypad;
use memory::MemoryMap;
use pixie::{DISPLAY_HEIGHT, DISPLAY_WIDTH, Pixie};
use tone::Tone;

/// Machine cycles per video frame.
pub const CYCLES_PER_FRAME: u32 = pixie::CYCLES_PER_FRAME;
/// Machine cycles per second of emulated time.
pub const CYCLES_PER_SECOND: u32 = tone::CPU_CLOCK_HZ / tone::CLOCKS_PER_CYCLE;

/// OUT port that releases the address latch.
const LATCH_PORT: u8 = 4;
const AUDIO_CHANNELS: usize = 1;

/// The peripherals fitted to a VIP, in arbitration order.
pub enum VipDevice {
    Pixie(Pixie),
    Keypad(Keypad),
    Tone(Tone),
}

impl VipDevice {
    fn inner(&self) -> &dyn Device {
        match self {
            VipDevice::Pixie(d) => d,
            VipDevice::Keypad(d) => d,
            VipDevice::Tone(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Device {
        match self {
            VipDevice::Pixie(d) => d,
            VipDevice::Keypad(d) => d,
            VipDevice::Tone(d) => d,
        }
    }
}

impl Device for VipDevice {
    fn name(&self) -> &'static str {
        self.inner().name()
    }
    fn cycle(&mut self) {
        self.inner_mut().cycle()
    }
    fn dma_status(&self) -> DmaStatus {
        self.inner().dma_status()
    }
    fn is_interrupting(&self) -> bool {
        self.inner().is_interrupting()
    }
    fn do_dma_in(&mut self) -> u8 {
        self.inner_mut().do_dma_in()
    }
    fn do_dma_out(&mut self, value: u8) {
        self.inner_mut().do_dma_out(value)
    }
    fn is_input_port(&self, port: u8) -> bool {
        self.inner().is_input_port(port)
    }
    fn is_output_port(&self, port: u8) -> bool {
        self.inner().is_output_port(port)
    }
    fn on_input(&mut self, port: u8) -> u8 {
        self.inner_mut().on_input(port)
    }
    fn on_output(&mut self, port: u8, value: u8) {
        self.inner_mut().on_output(port, value)
    }
    fn ef_lines(&self) -> u8 {
        self.inner().ef_lines()
    }
    fn on_q(&mut self, q: bool) {
        self.inner_mut().on_q(q)
    }
}

/// What the CPU sees during one cycle: memory plus the peripherals.
struct VipBus<'a> {
    memory: &'a mut MemoryMap,
    devices: &'a mut Arbiter<VipDevice>,
}

impl Bus for VipBus<'_> {
    fn read(&mut self, address: u16) -> Result<u8> {
        self.memory.read(address)
    }

    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        self.memory.write(address, value)
    }
}

impl CosmacBus for VipBus<'_> {
    fn input(&mut self, port: u8) -> u8 {
        self.devices.dispatch_input(port)
    }

    fn output(&mut self, port: u8, value: u8) {
        if port == LATCH_PORT {
            self.memory.clear_latch();
        }
        self.devices.dispatch_output(port, value);
    }

    fn flags(&self) -> u8 {
        self.devices.ef_lines()
    }

    fn dma_in(&mut self) -> u8 {
        self.devices.do_dma_in()
    }

    fn dma_out(&mut self, value: u8) {
        self.devices.do_dma_out(value)
    }

    fn set_q(&mut self, q: bool) {
        self.devices.set_q(q)
    }
}

pub struct Vip {
    pub cpu: Cdp1802,
    pub memory: MemoryMap,
    pub devices: Arbiter<VipDevice>,
    video: Box<dyn VideoSink>,
    audio: Box<dyn AudioSink>,
    keys: Box<dyn KeySource>,
    session: Session,
    frame_cycle: u32,
    samples: Vec<u8>,
    resampled: Vec<u8>,
}

impl Vip {
    /// A VIP with `monitor_rom` fitted, about to come out of reset.
    pub fn new(monitor_rom: &[u8], memory: VipMemory) -> Self {
        log::debug!(
            "VIP started with {} bytes of RAM, {} byte monitor",
            memory.bytes(),
            monitor_rom.len()
        );
        Self {
            cpu: Cdp1802::new(),
            memory: MemoryMap::new(memory, monitor_rom),
            devices: Arbiter::new(vec![
                VipDevice::Pixie(Pixie::new()),
                VipDevice::Keypad(Keypad::new()),
                VipDevice::Tone(Tone::new()),
            ]),
            video: Box::new(NullVideo),
            audio: Box::new(NullAudio::default()),
            keys: Box::new(NoKeys),
            session: Session::default(),
            frame_cycle: 0,
            samples: Vec::new(),
            resampled: Vec::new(),
        }
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

    /// Pull the reset line: CPU reset and address latch set.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.memory.reset();
    }

    pub fn pixie(&self) -> Option<&Pixie> {
        self.devices.devices().iter().find_map(|d| match d {
            VipDevice::Pixie(p) => Some(p),
            _ => None,
        })
    }

    fn step(&mut self) -> Result<()> {
        let mut bus = VipBus {
            memory: &mut self.memory,
            devices: &mut self.devices,
        };
        if self.cpu.cycle(&mut bus)? {
            self.session.retire();
        }
        self.devices.cycle();
        let signals = self.devices.signals();
        self.cpu.next_state(signals);

        for device in self.devices.devices_mut() {
            if let VipDevice::Pixie(pixie) = device {
                if pixie.take_frame() {
                    self.video.present(Frame {
                        width: DISPLAY_WIDTH,
                        height: DISPLAY_HEIGHT,
                        pixels: pixie.framebuffer(),
                    });
                }
            }
        }

        self.frame_cycle += 1;
        if self.frame_cycle == CYCLES_PER_FRAME {
            self.frame_cycle = 0;
            self.flush_audio();
        }
        Ok(())
    }

    fn flush_audio(&mut self) {
        for device in self.devices.devices_mut() {
            if let VipDevice::Tone(tone) = device {
                tone.take_samples(&mut self.samples);
            }
        }
        self.resampled.clear();
        resample_nearest(
            &self.samples,
            AUDIO_CHANNELS,
            self.audio.samples_per_frame(),
            &mut self.resampled,
        );
        self.audio.submit(&self.resampled, AUDIO_CHANNELS);
    }

    fn latch_keys(&mut self) {
        for device in self.devices.devices_mut() {
            if let VipDevice::Keypad(keypad) = device {
                keypad.latch(self.keys.as_ref());
            }
        }
    }
}

impl Emulator for Vip {
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

        self.latch_keys();
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
