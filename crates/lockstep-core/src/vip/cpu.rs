//! CDP1802 core.
//!
//! An instruction is a fetch cycle followed by one execute cycle, or two for
//! the long branch and long skip group. Between cycles the frame driver calls
//! [`Cdp1802::next_state`], which is where DMA and interrupt requests from the
//! peripherals are honoured. DMA is checked after every execute and every DMA
//! cycle, so a peripheral holding its request gets one byte per cycle.

use crate::bus::{Bus, FlatRam};
use crate::device::{DmaStatus, PULL_UP, Signals};
use crate::error::{Arch, EmuError, Result};

#[cfg(feature = "cpu-trace")]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "cpu-trace"))]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {};
}

/// Micro-step value once the current instruction has finished.
const DONE: u8 = u8::MAX;

/// I nibble of the long branch and long skip group.
const LONG_BRANCH_GROUP: u8 = 0xC;

/// Bus extension for the 1802's I/O lines.
pub trait CosmacBus: Bus {
    /// INP cycle: N lines carry `port`.
    fn input(&mut self, port: u8) -> u8;

    /// OUT cycle: N lines carry `port`.
    fn output(&mut self, port: u8, value: u8);

    /// EF1..EF4 in bits 0..3, set when the line is asserted.
    fn flags(&self) -> u8;

    /// Byte written to M(R0) during a DMA-in cycle.
    fn dma_in(&mut self) -> u8;

    /// Byte read from M(R0) during a DMA-out cycle.
    fn dma_out(&mut self, value: u8);

    fn set_q(&mut self, q: bool);
}

impl CosmacBus for FlatRam {
    fn input(&mut self, _port: u8) -> u8 {
        PULL_UP
    }

    fn output(&mut self, _port: u8, _value: u8) {}

    fn flags(&self) -> u8 {
        0
    }

    fn dma_in(&mut self) -> u8 {
        PULL_UP
    }

    fn dma_out(&mut self, _value: u8) {}

    fn set_q(&mut self, _q: bool) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CosmacState {
    Reset,
    Init,
    Fetch,
    Execute,
    DmaIn,
    DmaOut,
    Interrupt,
}

pub struct Cdp1802 {
    pub r: [u16; 16],
    pub p: u8,
    pub x: u8,
    pub n: u8,
    pub i: u8,
    pub t: u8,
    pub d: u8,
    pub df: bool,
    pub ie: bool,
    pub q: bool,
    /// Scratch latch holding the high byte of a long branch target.
    pub b: u8,
    pub state: CosmacState,
    step: u8,
}

impl Cdp1802 {
    /// A CPU with its reset line just released.
    pub fn new() -> Self {
        Self {
            r: [0; 16],
            p: 0,
            x: 0,
            n: 0,
            i: 0,
            t: 0,
            d: 0,
            df: false,
            ie: true,
            q: false,
            b: 0,
            state: CosmacState::Reset,
            step: DONE,
        }
    }

    /// Pull the reset line. The next cycle runs the reset sequence.
    pub fn reset(&mut self) {
        self.state = CosmacState::Reset;
        self.step = DONE;
    }

    /// Executing IDL, waiting for DMA or an interrupt.
    pub fn is_idle(&self) -> bool {
        self.i == 0 && self.n == 0
    }

    pub fn at_boundary(&self) -> bool {
        self.step == DONE
    }

    fn rp(&self) -> u16 {
        self.r[self.p as usize]
    }

    fn rx(&self) -> u16 {
        self.r[self.x as usize]
    }

    fn inc(&mut self, reg: u8) {
        let reg = &mut self.r[reg as usize & 0x0F];
        *reg = reg.wrapping_add(1);
    }

    fn dec(&mut self, reg: u8) {
        let reg = &mut self.r[reg as usize & 0x0F];
        *reg = reg.wrapping_sub(1);
    }

    /// M(R(P)), then R(P) + 1.
    fn immediate<B: Bus>(&mut self, bus: &mut B) -> Result<u8> {
        let val = bus.read(self.rp())?;
        self.inc(self.p);
        Ok(val)
    }

    fn set_q<B: CosmacBus>(&mut self, bus: &mut B, q: bool) {
        if self.q != q {
            self.q = q;
            bus.set_q(q);
        }
    }

    /// Run one machine cycle. Returns true when an instruction retired.
    pub fn cycle<B: CosmacBus>(&mut self, bus: &mut B) -> Result<bool> {
        match self.state {
            CosmacState::Reset => {
                self.i = 0;
                self.n = 0;
                self.x = 0;
                self.p = 0;
                self.r[0] = 0;
                self.ie = true;
                self.set_q(bus, false);
                Ok(false)
            }
            CosmacState::Init => Ok(false),
            CosmacState::Fetch => {
                let opcode = bus.read(self.rp())?;
                cpu_trace!("{:04X}: {:02X} D={:02X}", self.rp(), opcode, self.d);
                self.inc(self.p);
                self.i = opcode >> 4;
                self.n = opcode & 0x0F;
                self.step = 0;
                Ok(false)
            }
            CosmacState::Execute => {
                if self.step == DONE {
                    // IDL holds the CPU in execute cycles
                    return Ok(false);
                }
                let done = self.execute(bus, self.step)?;
                self.step = if done { DONE } else { self.step + 1 };
                Ok(done)
            }
            CosmacState::DmaIn => {
                let value = bus.dma_in();
                bus.write(self.r[0], value)?;
                self.inc(0);
                Ok(false)
            }
            CosmacState::DmaOut => {
                let value = bus.read(self.r[0])?;
                bus.dma_out(value);
                self.inc(0);
                Ok(false)
            }
            CosmacState::Interrupt => {
                self.t = (self.x << 4) | self.p;
                self.p = 1;
                self.x = 2;
                self.ie = false;
                Ok(false)
            }
        }
    }

    /// Pick the state for the next cycle.
    pub fn next_state(&mut self, signals: Signals) {
        self.state = match self.state {
            CosmacState::Reset => CosmacState::Init,
            CosmacState::Init => CosmacState::Fetch,
            CosmacState::Fetch => CosmacState::Execute,
            CosmacState::Execute if self.step != DONE => CosmacState::Execute,
            CosmacState::Execute | CosmacState::DmaIn | CosmacState::DmaOut => {
                match signals.dma {
                    DmaStatus::In => CosmacState::DmaIn,
                    DmaStatus::Out => CosmacState::DmaOut,
                    DmaStatus::None if signals.interrupt && self.ie => CosmacState::Interrupt,
                    DmaStatus::None if self.is_idle() => CosmacState::Execute,
                    DmaStatus::None => CosmacState::Fetch,
                }
            }
            // the handler's first fetch always follows, even out of IDL
            CosmacState::Interrupt => CosmacState::Fetch,
        };
    }

    fn execute<B: CosmacBus>(&mut self, bus: &mut B, step: u8) -> Result<bool> {
        let n = self.n;
        match self.i {
            0x0 => {
                if n != 0 {
                    self.d = bus.read(self.r[n as usize])?;
                }
            }
            0x1 => self.inc(n),
            0x2 => self.dec(n),
            0x3 => self.short_branch(bus)?,
            0x4 => {
                self.d = bus.read(self.r[n as usize])?;
                self.inc(n);
            }
            0x5 => bus.write(self.r[n as usize], self.d)?,
            0x6 => self.io(bus)?,
            0x7 => self.control(bus)?,
            0x8 => self.d = self.r[n as usize] as u8,
            0x9 => self.d = (self.r[n as usize] >> 8) as u8,
            0xA => {
                let reg = &mut self.r[n as usize];
                *reg = (*reg & 0xFF00) | self.d as u16;
            }
            0xB => {
                let reg = &mut self.r[n as usize];
                *reg = (*reg & 0x00FF) | ((self.d as u16) << 8);
            }
            LONG_BRANCH_GROUP => return self.long_branch(bus, step),
            0xD => self.p = n,
            0xE => self.x = n,
            _ => self.alu(bus)?,
        }
        Ok(true)
    }

    fn short_branch<B: CosmacBus>(&mut self, bus: &mut B) -> Result<()> {
        let n = self.n;
        let taken = match n & 0x07 {
            0 => true,
            1 => self.q,
            2 => self.d == 0,
            3 => self.df,
            ef => bus.flags() & (1 << (ef - 4)) != 0,
        };
        // N >= 8 inverts the test; 0x38 is SKP
        let taken = taken != (n & 0x08 != 0);
        let target = bus.read(self.rp())?;
        if taken {
            let rp = &mut self.r[self.p as usize];
            *rp = (*rp & 0xFF00) | target as u16;
        } else {
            self.inc(self.p);
        }
        Ok(())
    }

    fn long_branch<B: CosmacBus>(&mut self, bus: &mut B, step: u8) -> Result<bool> {
        let n = self.n;
        let condition = match n & 0x03 {
            0 => true,
            1 => self.q,
            2 => self.d == 0,
            _ => self.df,
        };
        match n {
            // LBR LBQ LBZ LBDF and the inverted LBNQ LBNZ LBNF; 0xC8 is LSKP
            0x0..=0x3 | 0x9..=0xB => {
                let taken = condition != (n & 0x08 != 0);
                if step == 0 {
                    self.b = self.immediate(bus)?;
                    return Ok(false);
                }
                let low = bus.read(self.rp())?;
                if taken {
                    self.r[self.p as usize] = u16::from_be_bytes([self.b, low]);
                } else {
                    self.inc(self.p);
                }
                Ok(true)
            }
            0x4 => Ok(step != 0),
            _ => {
                let skip = match n {
                    0xC => self.ie,
                    0x8 => true,
                    // LSNQ LSNZ LSNF skip when the condition is false
                    0x5..=0x7 => !condition,
                    _ => condition,
                };
                if skip {
                    self.inc(self.p);
                }
                Ok(step != 0)
            }
        }
    }

    fn io<B: CosmacBus>(&mut self, bus: &mut B) -> Result<()> {
        let n = self.n;
        match n {
            0x0 => self.inc(self.x),
            0x1..=0x7 => {
                let value = bus.read(self.rx())?;
                bus.output(n, value);
                self.inc(self.x);
            }
            0x8 => {
                return Err(EmuError::InvalidInstruction {
                    arch: Arch::Cdp1802,
                    opcode: 0x68,
                    address: self.rp().wrapping_sub(1),
                });
            }
            _ => {
                let value = bus.input(n - 8);
                bus.write(self.rx(), value)?;
                self.d = value;
            }
        }
        Ok(())
    }

    /// 0x70-0x7F.
    fn control<B: CosmacBus>(&mut self, bus: &mut B) -> Result<()> {
        match self.n {
            0x0 | 0x1 => {
                let value = bus.read(self.rx())?;
                self.inc(self.x);
                self.x = value >> 4;
                self.p = value & 0x0F;
                self.ie = self.n == 0;
            }
            0x2 => {
                self.d = bus.read(self.rx())?;
                self.inc(self.x);
            }
            0x3 => {
                bus.write(self.rx(), self.d)?;
                self.dec(self.x);
            }
            0x4 => {
                let m = bus.read(self.rx())?;
                self.add(m, self.df);
            }
            0x5 => {
                let m = bus.read(self.rx())?;
                self.subtract(m, self.d, self.df);
            }
            0x6 => {
                let carry = self.d & 0x01 != 0;
                self.d = (self.d >> 1) | ((self.df as u8) << 7);
                self.df = carry;
            }
            0x7 => {
                let m = bus.read(self.rx())?;
                self.subtract(self.d, m, self.df);
            }
            0x8 => bus.write(self.rx(), self.t)?,
            0x9 => {
                self.t = (self.x << 4) | self.p;
                bus.write(self.r[2], self.t)?;
                self.x = self.p;
                self.dec(2);
            }
            0xA => self.set_q(bus, false),
            0xB => self.set_q(bus, true),
            0xC => {
                let m = self.immediate(bus)?;
                self.add(m, self.df);
            }
            0xD => {
                let m = self.immediate(bus)?;
                self.subtract(m, self.d, self.df);
            }
            0xE => {
                let carry = self.d & 0x80 != 0;
                self.d = (self.d << 1) | self.df as u8;
                self.df = carry;
            }
            _ => {
                let m = self.immediate(bus)?;
                self.subtract(self.d, m, self.df);
            }
        }
        Ok(())
    }

    /// 0xF0-0xFF. N < 8 works on M(R(X)), N >= 8 on an immediate byte.
    fn alu<B: CosmacBus>(&mut self, bus: &mut B) -> Result<()> {
        let n = self.n;
        match n & 0x07 {
            6 => {
                // SHR and SHL take no operand
                if n == 0x6 {
                    self.df = self.d & 0x01 != 0;
                    self.d >>= 1;
                } else {
                    self.df = self.d & 0x80 != 0;
                    self.d <<= 1;
                }
                return Ok(());
            }
            op => {
                let m = if n < 8 {
                    bus.read(self.rx())?
                } else {
                    self.immediate(bus)?
                };
                match op {
                    0 => self.d = m,
                    1 => self.d |= m,
                    2 => self.d &= m,
                    3 => self.d ^= m,
                    4 => self.add(m, false),
                    5 => self.subtract(m, self.d, true),
                    _ => self.subtract(self.d, m, true),
                }
            }
        }
        Ok(())
    }

    fn add(&mut self, m: u8, carry: bool) {
        let sum = self.d as u16 + m as u16 + carry as u16;
        self.d = sum as u8;
        self.df = sum > 0xFF;
    }

    /// D = `a` - `b`, borrowing when `no_borrow` is clear. DF ends up set
    /// when no borrow occurred.
    fn subtract(&mut self, a: u8, b: u8, no_borrow: bool) {
        let diff = a as i16 - b as i16 - (!no_borrow) as i16;
        self.d = diff as u8;
        self.df = diff >= 0;
    }
}

impl Default for Cdp1802 {
    fn default() -> Self {
        Self::new()
    }
}
