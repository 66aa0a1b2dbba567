use crate::error::{EmuError, Result};

#[cfg(feature = "apu-trace")]
macro_rules! apu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "apu-trace"))]
macro_rules! apu_trace {
    ($($arg:tt)*) => {};
}

/// Divider bit whose falling edge steps the 512 Hz frame sequencer.
const FRAME_SEQUENCER_BIT: u16 = 12;
/// Largest magnitude the mixer can produce: four channels at full swing
/// times the maximum master volume.
const MIX_FULL_SCALE: i32 = 4 * 15 * 8;

// Duty table for pulse channels (CH1, CH2), indexed by the NRx1 duty bits.
const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1], // 12.5%
    [1, 0, 0, 0, 0, 0, 0, 1], // 25%
    [1, 0, 0, 0, 0, 1, 1, 1], // 50%
    [0, 1, 1, 1, 1, 1, 1, 0], // 75%
];

const NOISE_DIVISORS: [u16; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

#[derive(Default, Clone, Copy)]
struct Envelope {
    period: u8,
    add: bool,
    volume: u8,
    timer: u8,
}

impl Envelope {
    fn clock(&mut self) {
        if self.period == 0 {
            return;
        }
        self.timer = self.timer.saturating_sub(1);
        if self.timer == 0 {
            self.timer = self.period;
            if self.add && self.volume < 15 {
                self.volume += 1;
            } else if !self.add && self.volume > 0 {
                self.volume -= 1;
            }
        }
    }

    fn reset(&mut self, val: u8) {
        self.volume = val >> 4;
        self.period = val & 0x07;
        self.add = val & 0x08 != 0;
        self.timer = self.period;
    }
}

#[derive(Default)]
struct Sweep {
    period: u8,
    negate: bool,
    shift: u8,
    timer: u8,
    shadow: u16,
    enabled: bool,
}

impl Sweep {
    fn calculate(&self) -> u16 {
        let delta = self.shadow >> self.shift;
        if self.negate {
            self.shadow.wrapping_sub(delta)
        } else {
            self.shadow.wrapping_add(delta)
        }
    }

    fn set_params(&mut self, val: u8) {
        self.period = (val >> 4) & 0x07;
        self.negate = val & 0x08 != 0;
        self.shift = val & 0x07;
    }

    fn reload(&mut self, freq: u16) {
        self.shadow = freq;
        self.timer = if self.period == 0 { 8 } else { self.period };
        self.enabled = self.period != 0 || self.shift != 0;
    }
}

#[derive(Default)]
struct SquareChannel {
    enabled: bool,
    dac_enabled: bool,
    length: u8,
    length_enable: bool,
    duty: u8,
    duty_pos: u8,
    frequency: u16,
    timer: i32,
    envelope: Envelope,
    sweep: Option<Sweep>,
}

impl SquareChannel {
    fn new(with_sweep: bool) -> Self {
        Self {
            sweep: with_sweep.then(Sweep::default),
            ..Self::default()
        }
    }

    fn period(&self) -> i32 {
        (2048 - self.frequency as i32) * 4
    }

    fn step(&mut self, cycles: i32) {
        self.timer -= cycles;
        while self.timer <= 0 {
            self.timer += self.period();
            self.duty_pos = (self.duty_pos + 1) & 7;
        }
    }

    fn output(&self) -> Option<u8> {
        self.dac_enabled.then(|| {
            if self.enabled && DUTY_TABLE[self.duty as usize][self.duty_pos as usize] != 0 {
                self.envelope.volume
            } else {
                0
            }
        })
    }

    fn clock_length(&mut self) {
        if self.length_enable && self.length > 0 {
            self.length -= 1;
            if self.length == 0 {
                self.enabled = false;
            }
        }
    }

    /// Returns false when the new frequency overflows and the channel must stop.
    fn clock_sweep(&mut self) -> bool {
        let Some(sweep) = self.sweep.as_mut() else {
            return true;
        };
        sweep.timer = sweep.timer.saturating_sub(1);
        if sweep.timer != 0 {
            return true;
        }
        sweep.timer = if sweep.period == 0 { 8 } else { sweep.period };
        if !sweep.enabled || sweep.period == 0 {
            return true;
        }
        let new_freq = sweep.calculate();
        if new_freq > 2047 {
            return false;
        }
        if sweep.shift != 0 {
            sweep.shadow = new_freq;
            self.frequency = new_freq;
            if sweep.calculate() > 2047 {
                return false;
            }
        }
        true
    }
}

#[derive(Default)]
struct WaveChannel {
    enabled: bool,
    dac_enabled: bool,
    length: u16,
    length_enable: bool,
    volume_code: u8,
    frequency: u16,
    timer: i32,
    position: u8,
    sample_buffer: u8,
}

impl WaveChannel {
    fn period(&self) -> i32 {
        (2048 - self.frequency as i32) * 2
    }

    fn step(&mut self, cycles: i32, wave_ram: &[u8; 0x10]) {
        if !self.enabled {
            return;
        }
        self.timer -= cycles;
        while self.timer <= 0 {
            self.timer += self.period();
            self.position = (self.position + 1) & 31;
            let byte = wave_ram[(self.position / 2) as usize];
            self.sample_buffer = if self.position & 1 == 0 {
                byte >> 4
            } else {
                byte & 0x0F
            };
        }
    }

    fn output(&self) -> Option<u8> {
        self.dac_enabled.then(|| {
            let shift = match self.volume_code {
                0 => 4,
                1 => 0,
                2 => 1,
                _ => 2,
            };
            if self.enabled {
                self.sample_buffer >> shift
            } else {
                0
            }
        })
    }

    fn clock_length(&mut self) {
        if self.length_enable && self.length > 0 {
            self.length -= 1;
            if self.length == 0 {
                self.enabled = false;
            }
        }
    }
}

#[derive(Default)]
struct NoiseChannel {
    enabled: bool,
    dac_enabled: bool,
    length: u8,
    length_enable: bool,
    envelope: Envelope,
    clock_shift: u8,
    width7: bool,
    divisor: u8,
    lfsr: u16,
    timer: i32,
}

impl NoiseChannel {
    fn period(&self) -> i32 {
        (NOISE_DIVISORS[self.divisor as usize] as i32) << self.clock_shift
    }

    fn step(&mut self, cycles: i32) {
        if !self.enabled || self.clock_shift >= 14 {
            return;
        }
        self.timer -= cycles;
        while self.timer <= 0 {
            self.timer += self.period();
            let feedback = (self.lfsr ^ (self.lfsr >> 1)) & 1;
            self.lfsr = (self.lfsr >> 1) | (feedback << 14);
            if self.width7 {
                self.lfsr = (self.lfsr & !0x40) | (feedback << 6);
            }
        }
    }

    fn output(&self) -> Option<u8> {
        self.dac_enabled.then(|| {
            if self.enabled && self.lfsr & 1 == 0 {
                self.envelope.volume
            } else {
                0
            }
        })
    }

    fn clock_length(&mut self) {
        if self.length_enable && self.length > 0 {
            self.length -= 1;
            if self.length == 0 {
                self.enabled = false;
            }
        }
    }
}

struct FrameSequencer {
    /// Next step to run.
    step: u8,
}

impl FrameSequencer {
    fn new() -> Self {
        Self { step: 0 }
    }

    fn advance(&mut self) -> u8 {
        let s = self.step;
        self.step = (self.step + 1) & 7;
        s
    }

    /// Writes made now land before a step that will not clock length counters.
    fn next_skips_length(&self) -> bool {
        self.step & 1 == 1
    }
}

/// Four-channel sound unit.
///
/// Produces one stereo sample per machine cycle into a per-frame buffer the
/// frame driver drains and resamples for the audio sink.
pub struct Apu {
    ch1: SquareChannel,
    ch2: SquareChannel,
    ch3: WaveChannel,
    ch4: NoiseChannel,
    wave_ram: [u8; 0x10],
    /// Raw register writes, FF10-FF2F, for readback.
    regs: [u8; 0x20],
    nr50: u8,
    nr51: u8,
    powered: bool,
    sequencer: FrameSequencer,
    last_div_bit: bool,
    /// Interleaved left/right samples for the current frame.
    samples: Vec<u8>,
}

impl Apu {
    pub fn new() -> Self {
        Self {
            ch1: SquareChannel::new(true),
            ch2: SquareChannel::new(false),
            ch3: WaveChannel::default(),
            ch4: NoiseChannel::default(),
            wave_ram: [0; 0x10],
            regs: [0; 0x20],
            nr50: 0,
            nr51: 0,
            powered: false,
            sequencer: FrameSequencer::new(),
            last_div_bit: false,
            samples: Vec::with_capacity(2 * 17_556),
        }
    }

    /// Register state left by the boot ROM after the start-up chime.
    pub fn apply_boot_state(&mut self) {
        for (addr, val) in [
            (0xFF26, 0x80),
            (0xFF11, 0xBF),
            (0xFF12, 0xF3),
            (0xFF24, 0x77),
            (0xFF25, 0xF3),
        ] {
            self.write_reg_inner(addr, val);
        }
    }

    fn read_mask(addr: u16) -> u8 {
        match addr {
            0xFF10 => 0x80,
            0xFF11 => 0x3F,
            0xFF12 => 0x00,
            0xFF13 => 0xFF,
            0xFF14 => 0xBF,
            0xFF16 => 0x3F,
            0xFF17 => 0x00,
            0xFF18 => 0xFF,
            0xFF19 => 0xBF,
            0xFF1A => 0x7F,
            0xFF1B => 0xFF,
            0xFF1C => 0x9F,
            0xFF1D => 0xFF,
            0xFF1E => 0xBF,
            0xFF20 => 0xFF,
            0xFF21 => 0x00,
            0xFF22 => 0x00,
            0xFF23 => 0xBF,
            0xFF24 => 0x00,
            0xFF25 => 0x00,
            _ => 0xFF,
        }
    }

    pub fn read_reg(&self, addr: u16) -> Result<u8> {
        match addr {
            0xFF26 => {
                let mut val = 0x70;
                if self.powered {
                    val |= 0x80;
                }
                for (bit, on) in [
                    self.ch1.enabled,
                    self.ch2.enabled,
                    self.ch3.enabled,
                    self.ch4.enabled,
                ]
                .into_iter()
                .enumerate()
                {
                    if on {
                        val |= 1 << bit;
                    }
                }
                Ok(val)
            }
            0xFF30..=0xFF3F => {
                // the wave channel owns the RAM while it plays
                if self.ch3.enabled {
                    Ok(0xFF)
                } else {
                    Ok(self.wave_ram[(addr - 0xFF30) as usize])
                }
            }
            0xFF10..=0xFF2F => Ok(self.regs[(addr - 0xFF10) as usize] | Self::read_mask(addr)),
            _ => Err(EmuError::InvalidAddress {
                device: "apu",
                address: addr,
            }),
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) -> Result<()> {
        match addr {
            0xFF10..=0xFF3F => {
                self.write_reg_inner(addr, val);
                Ok(())
            }
            _ => Err(EmuError::InvalidAddress {
                device: "apu",
                address: addr,
            }),
        }
    }

    fn write_reg_inner(&mut self, addr: u16, val: u8) {
        if let 0xFF30..=0xFF3F = addr {
            if !self.ch3.enabled {
                self.wave_ram[(addr - 0xFF30) as usize] = val;
            }
            return;
        }
        if addr == 0xFF26 {
            self.write_power(val & 0x80 != 0);
            return;
        }
        if !self.powered || (0xFF27..=0xFF2F).contains(&addr) {
            return;
        }
        self.regs[(addr - 0xFF10) as usize] = val;
        apu_trace!("APU write {addr:04X}={val:02X} seq={}", self.sequencer.step);

        match addr {
            0xFF10 => {
                if let Some(sweep) = self.ch1.sweep.as_mut() {
                    sweep.set_params(val);
                }
            }
            0xFF11 => {
                self.ch1.duty = val >> 6;
                self.ch1.length = 64 - (val & 0x3F);
            }
            0xFF12 => {
                self.ch1.dac_enabled = val & 0xF8 != 0;
                if !self.ch1.dac_enabled {
                    self.ch1.enabled = false;
                }
            }
            0xFF13 => self.ch1.frequency = (self.ch1.frequency & 0x0700) | val as u16,
            0xFF14 => {
                self.ch1.frequency = (self.ch1.frequency & 0x00FF) | ((val as u16 & 0x07) << 8);
                let skips = self.sequencer.next_skips_length();
                Self::write_length_enable(
                    &mut self.ch1.length_enable,
                    &mut self.ch1.length,
                    &mut self.ch1.enabled,
                    val,
                    skips,
                    64,
                );
                if val & 0x80 != 0 {
                    self.trigger_square(1);
                }
            }
            0xFF16 => {
                self.ch2.duty = val >> 6;
                self.ch2.length = 64 - (val & 0x3F);
            }
            0xFF17 => {
                self.ch2.dac_enabled = val & 0xF8 != 0;
                if !self.ch2.dac_enabled {
                    self.ch2.enabled = false;
                }
            }
            0xFF18 => self.ch2.frequency = (self.ch2.frequency & 0x0700) | val as u16,
            0xFF19 => {
                self.ch2.frequency = (self.ch2.frequency & 0x00FF) | ((val as u16 & 0x07) << 8);
                let skips = self.sequencer.next_skips_length();
                Self::write_length_enable(
                    &mut self.ch2.length_enable,
                    &mut self.ch2.length,
                    &mut self.ch2.enabled,
                    val,
                    skips,
                    64,
                );
                if val & 0x80 != 0 {
                    self.trigger_square(2);
                }
            }
            0xFF1A => {
                self.ch3.dac_enabled = val & 0x80 != 0;
                if !self.ch3.dac_enabled {
                    self.ch3.enabled = false;
                }
            }
            0xFF1B => self.ch3.length = 256 - val as u16,
            0xFF1C => self.ch3.volume_code = (val >> 5) & 0x03,
            0xFF1D => self.ch3.frequency = (self.ch3.frequency & 0x0700) | val as u16,
            0xFF1E => {
                self.ch3.frequency = (self.ch3.frequency & 0x00FF) | ((val as u16 & 0x07) << 8);
                let skips = self.sequencer.next_skips_length();
                Self::write_length_enable(
                    &mut self.ch3.length_enable,
                    &mut self.ch3.length,
                    &mut self.ch3.enabled,
                    val,
                    skips,
                    256,
                );
                if val & 0x80 != 0 {
                    self.trigger_wave();
                }
            }
            0xFF20 => self.ch4.length = 64 - (val & 0x3F),
            0xFF21 => {
                self.ch4.dac_enabled = val & 0xF8 != 0;
                if !self.ch4.dac_enabled {
                    self.ch4.enabled = false;
                }
            }
            0xFF22 => {
                self.ch4.clock_shift = val >> 4;
                self.ch4.width7 = val & 0x08 != 0;
                self.ch4.divisor = val & 0x07;
            }
            0xFF23 => {
                let skips = self.sequencer.next_skips_length();
                Self::write_length_enable(
                    &mut self.ch4.length_enable,
                    &mut self.ch4.length,
                    &mut self.ch4.enabled,
                    val,
                    skips,
                    64,
                );
                if val & 0x80 != 0 {
                    self.trigger_noise();
                }
            }
            0xFF24 => self.nr50 = val,
            0xFF25 => self.nr51 = val,
            _ => {}
        }
    }

    /// NRx4 length-enable handling shared by all channels.
    ///
    /// Enabling the length counter while the next sequencer step will not
    /// clock it gives an extra clock right away. A trigger that finds the
    /// counter at zero reloads it to full, minus that same extra clock.
    fn write_length_enable<T>(
        length_enable: &mut bool,
        length: &mut T,
        enabled: &mut bool,
        val: u8,
        skips_length: bool,
        full: T,
    ) where
        T: Copy + PartialEq + From<u8> + std::ops::Sub<Output = T>,
    {
        let zero = T::from(0);
        let one = T::from(1);
        let was_enabled = *length_enable;
        *length_enable = val & 0x40 != 0;
        if skips_length && !was_enabled && *length_enable && *length != zero {
            *length = *length - one;
            if *length == zero && val & 0x80 == 0 {
                *enabled = false;
            }
        }
        if val & 0x80 != 0 && *length == zero {
            *length = full;
            if skips_length && *length_enable {
                *length = *length - one;
            }
        }
    }

    fn write_power(&mut self, on: bool) {
        if on && !self.powered {
            self.sequencer = FrameSequencer::new();
            for ch in [&mut self.ch1, &mut self.ch2] {
                ch.duty_pos = 0;
            }
            self.ch3.sample_buffer = 0;
        } else if !on && self.powered {
            self.ch1 = SquareChannel::new(true);
            self.ch2 = SquareChannel::new(false);
            self.ch3 = WaveChannel::default();
            self.ch4 = NoiseChannel::default();
            self.regs.fill(0);
            self.nr50 = 0;
            self.nr51 = 0;
        }
        self.powered = on;
    }

    fn trigger_square(&mut self, idx: u8) {
        let nrx2 = self.regs[if idx == 1 { 0x02 } else { 0x07 }];
        let ch = if idx == 1 { &mut self.ch1 } else { &mut self.ch2 };
        ch.enabled = ch.dac_enabled;
        ch.timer = ch.period();
        ch.envelope.reset(nrx2);
        let frequency = ch.frequency;
        if let Some(sweep) = ch.sweep.as_mut() {
            sweep.reload(frequency);
            if sweep.shift != 0 && sweep.calculate() > 2047 {
                ch.enabled = false;
            }
        }
        apu_trace!("CH{idx} trigger freq={frequency} len={}", ch.length);
    }

    fn trigger_wave(&mut self) {
        self.ch3.enabled = self.ch3.dac_enabled;
        self.ch3.position = 0;
        self.ch3.timer = self.ch3.period() + 6;
    }

    fn trigger_noise(&mut self) {
        self.ch4.enabled = self.ch4.dac_enabled;
        self.ch4.lfsr = 0x7FFF;
        self.ch4.timer = self.ch4.period();
        self.ch4.envelope.reset(self.regs[0x11]);
    }

    fn clock_frame_sequencer(&mut self, step: u8) {
        if step & 1 == 0 {
            self.ch1.clock_length();
            self.ch2.clock_length();
            self.ch3.clock_length();
            self.ch4.clock_length();
        }
        if step == 2 || step == 6 {
            if !self.ch1.clock_sweep() {
                self.ch1.enabled = false;
            }
            let freq = self.ch1.frequency;
            self.regs[0x03] = freq as u8;
            self.regs[0x04] = (self.regs[0x04] & 0xF8) | (freq >> 8) as u8;
        }
        if step == 7 {
            self.ch1.envelope.clock();
            self.ch2.envelope.clock();
            self.ch4.envelope.clock();
        }
    }

    /// Advance one machine cycle. `div` is the timer's internal divider; the
    /// frame sequencer steps on the falling edge of bit 12.
    pub fn cycle(&mut self, div: u16) {
        let bit = (div >> FRAME_SEQUENCER_BIT) & 1 != 0;
        let falling = self.last_div_bit && !bit;
        self.last_div_bit = bit;

        if !self.powered {
            self.samples.extend_from_slice(&[128, 128]);
            return;
        }
        if falling {
            let step = self.sequencer.advance();
            self.clock_frame_sequencer(step);
        }

        self.ch1.step(4);
        self.ch2.step(4);
        self.ch3.step(4, &self.wave_ram);
        self.ch4.step(4);

        let (left, right) = self.mix();
        self.samples.extend_from_slice(&[left, right]);
    }

    fn mix(&self) -> (u8, u8) {
        let outputs = [
            self.ch1.output(),
            self.ch2.output(),
            self.ch3.output(),
            self.ch4.output(),
        ];
        let mut left = 0i32;
        let mut right = 0i32;
        for (i, out) in outputs.into_iter().enumerate() {
            // a powered DAC maps 0..15 onto -15..15
            let Some(level) = out else { continue };
            let analog = level as i32 * 2 - 15;
            if self.nr51 & (0x10 << i) != 0 {
                left += analog;
            }
            if self.nr51 & (0x01 << i) != 0 {
                right += analog;
            }
        }
        left *= ((self.nr50 >> 4) & 0x07) as i32 + 1;
        right *= (self.nr50 & 0x07) as i32 + 1;
        let to_u8 = |v: i32| (128 + v * 127 / MIX_FULL_SCALE) as u8;
        (to_u8(left), to_u8(right))
    }

    /// Drain the samples produced since the last call.
    pub fn take_samples(&mut self, out: &mut Vec<u8>) {
        out.clear();
        out.append(&mut self.samples);
    }

    pub fn sequencer_step(&self) -> u8 {
        self.sequencer.step
    }

    pub fn ch1_length(&self) -> u8 {
        self.ch1.length
    }

    pub fn ch1_frequency(&self) -> u16 {
        self.ch1.frequency
    }

    pub fn ch3_length(&self) -> u16 {
        self.ch3.length
    }

    pub fn ch4_lfsr(&self) -> u16 {
        self.ch4.lfsr
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
