//! Q-driven beeper: a fixed 1400 Hz square wave while Q is high.

use crate::device::Device;

pub const TONE_HZ: u32 = 1_400;
/// CPU clock; one machine cycle is 8 clocks.
pub const CPU_CLOCK_HZ: u32 = 1_760_900;
pub const CLOCKS_PER_CYCLE: u32 = 8;

const SILENCE: u8 = 128;
const AMPLITUDE: u8 = 64;

#[derive(Default)]
pub struct Tone {
    q: bool,
    high: bool,
    phase: u32,
    samples: Vec<u8>,
}

impl Tone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(&self) -> bool {
        self.q
    }

    /// Drain the mono samples produced since the last call.
    pub fn take_samples(&mut self, out: &mut Vec<u8>) {
        out.clear();
        out.append(&mut self.samples);
    }
}

impl Device for Tone {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn cycle(&mut self) {
        if !self.q {
            self.samples.push(SILENCE);
            return;
        }
        // two edges per period
        self.phase += 2 * TONE_HZ * CLOCKS_PER_CYCLE;
        if self.phase >= CPU_CLOCK_HZ {
            self.phase -= CPU_CLOCK_HZ;
            self.high = !self.high;
        }
        self.samples.push(if self.high {
            SILENCE + AMPLITUDE
        } else {
            SILENCE - AMPLITUDE
        });
    }

    fn on_q(&mut self, q: bool) {
        self.q = q;
        if !q {
            self.phase = 0;
            self.high = false;
        }
    }
}
