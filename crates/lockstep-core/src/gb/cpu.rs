//! SM83 CPU core, stepped one machine cycle at a time.
//!
//! The core is a small state machine. `Fetch` reads an opcode and runs
//! micro-step 0 of it in the same cycle; every further bus access or
//! internal delay is one more micro-step, run in its own `Execute` cycle.
//! After each cycle the frame driver calls [`Cpu::next_state`] with the
//! interrupt signal, which is the only place control can divert into the
//! five-cycle interrupt dispatch or wake from HALT/STOP.

use crate::bus::{Bus, FlatRam};
use crate::device::Signals;
use crate::error::{Arch, EmuError, Result};
use crate::hardware::DmgRevision;

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

// CPU flag bits
const FLAG_Z: u8 = 0x80; // Zero
const FLAG_N: u8 = 0x40; // Subtract
const FLAG_H: u8 = 0x20; // Half Carry
const FLAG_C: u8 = 0x10; // Carry

/// Handler addresses for VBlank, STAT, timer, serial and joypad, in priority order.
const INTERRUPT_VECTORS: [u16; 5] = [0x0040, 0x0048, 0x0050, 0x0058, 0x0060];

// Post-boot CPU state
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

/// Micro-step value once the current instruction has finished.
const DONE: u8 = u8::MAX;

/// Bus extension the SM83 needs for interrupt dispatch and STOP.
pub trait InterruptBus: Bus {
    /// Requested and enabled interrupts (IE & IF), low five bits.
    fn pending_interrupts(&self) -> u8;

    /// Clear the IF bits in `mask`.
    fn acknowledge_interrupt(&mut self, mask: u8);

    /// STOP was executed.
    fn enter_stop(&mut self) {}
}

impl InterruptBus for FlatRam {
    fn pending_interrupts(&self) -> u8 {
        self.memory[0xFFFF] & self.memory[0xFF0F] & 0x1F
    }

    fn acknowledge_interrupt(&mut self, mask: u8) {
        self.memory[0xFF0F] &= !mask;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuState {
    Fetch,
    Execute,
    Interrupt,
    Halt,
    Stop,
}

pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
    pub ime: bool,
    /// EI was executed; IME turns on at the next opcode fetch.
    pub ei_pending: bool,
    pub state: CpuState,
    /// Opcode in flight. For CB-prefixed instructions this is the second byte.
    pub opcode: u8,
    prefixed: bool,
    halt_bug: bool,
    step: u8,
    // operand scratch: Z is the low byte, W the high byte
    w: u8,
    z: u8,
}

impl Cpu {
    /// CPU in the state the boot ROM leaves it in, about to run the
    /// cartridge entry point.
    pub fn new(revision: DmgRevision) -> Self {
        let [a, f, b, c, d, e, h, l] = revision.post_boot_registers();
        Self {
            a,
            f,
            b,
            c,
            d,
            e,
            h,
            l,
            pc: BOOT_PC,
            sp: BOOT_SP,
            ..Self::power_on()
        }
    }

    /// CPU at power-on, about to run a boot ROM from 0x0000.
    pub fn power_on() -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            pc: 0x0000,
            sp: 0x0000,
            ime: false,
            ei_pending: false,
            state: CpuState::Fetch,
            opcode: 0,
            prefixed: false,
            halt_bug: false,
            step: DONE,
            w: 0,
            z: 0,
        }
    }

    pub fn get_bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    fn set_bc(&mut self, val: u16) {
        [self.b, self.c] = val.to_be_bytes();
    }

    pub fn get_de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    fn set_de(&mut self, val: u16) {
        [self.d, self.e] = val.to_be_bytes();
    }

    pub fn get_hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    fn set_hl(&mut self, val: u16) {
        [self.h, self.l] = val.to_be_bytes();
    }

    fn wz(&self) -> u16 {
        u16::from_be_bytes([self.w, self.z])
    }

    fn set_wz(&mut self, val: u16) {
        [self.w, self.z] = val.to_be_bytes();
    }

    /// True between instructions.
    pub fn at_boundary(&self) -> bool {
        self.step == DONE
    }

    /// 8-bit register by opcode index. Index 6, (HL), is handled by callers.
    fn reg(&self, index: u8) -> u8 {
        match index {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            _ => self.a,
        }
    }

    fn set_reg(&mut self, index: u8, val: u8) {
        match index {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            _ => self.a = val,
        }
    }

    /// BC, DE, HL, SP
    fn reg16(&self, index: u8) -> u16 {
        match index {
            0 => self.get_bc(),
            1 => self.get_de(),
            2 => self.get_hl(),
            _ => self.sp,
        }
    }

    fn set_reg16(&mut self, index: u8, val: u16) {
        match index {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_hl(val),
            _ => self.sp = val,
        }
    }

    /// BC, DE, HL, AF as used by PUSH and POP.
    fn stack_reg(&self, index: u8) -> u16 {
        match index {
            3 => u16::from_be_bytes([self.a, self.f]),
            _ => self.reg16(index),
        }
    }

    fn set_stack_reg(&mut self, index: u8, val: u16) {
        match index {
            3 => {
                let [a, f] = val.to_be_bytes();
                self.a = a;
                self.f = f & 0xF0;
            }
            _ => self.set_reg16(index, val),
        }
    }

    fn condition(&self, cc: u8) -> bool {
        match cc & 0x03 {
            0 => self.f & FLAG_Z == 0,
            1 => self.f & FLAG_Z != 0,
            2 => self.f & FLAG_C == 0,
            _ => self.f & FLAG_C != 0,
        }
    }

    fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.f = if z { FLAG_Z } else { 0 }
            | if n { FLAG_N } else { 0 }
            | if h { FLAG_H } else { 0 }
            | if c { FLAG_C } else { 0 };
    }

    fn carry(&self) -> u8 {
        (self.f & FLAG_C != 0) as u8
    }

    fn fetch<B: Bus>(&mut self, bus: &mut B) -> Result<u8> {
        let val = bus.read(self.pc)?;
        self.pc = self.pc.wrapping_add(1);
        Ok(val)
    }

    fn pop<B: Bus>(&mut self, bus: &mut B) -> Result<u8> {
        let val = bus.read(self.sp)?;
        self.sp = self.sp.wrapping_add(1);
        Ok(val)
    }

    fn invalid(&self) -> EmuError {
        EmuError::InvalidInstruction {
            arch: Arch::Sm83,
            opcode: self.opcode,
            address: self.pc.wrapping_sub(1),
        }
    }

    /// Run one machine cycle. Returns true when an instruction retired.
    pub fn cycle<B: InterruptBus>(&mut self, bus: &mut B) -> Result<bool> {
        match self.state {
            CpuState::Fetch => {
                if self.ei_pending {
                    self.ime = true;
                    self.ei_pending = false;
                }
                self.opcode = bus.read(self.pc)?;
                cpu_trace!("{:04X}: {:02X} SP={:04X}", self.pc, self.opcode, self.sp);
                if self.halt_bug {
                    self.halt_bug = false;
                } else {
                    self.pc = self.pc.wrapping_add(1);
                }
                self.prefixed = false;
                self.step = 0;
                self.execute(bus)?;
                Ok(self.step == DONE)
            }
            CpuState::Execute => {
                self.execute(bus)?;
                Ok(self.step == DONE)
            }
            CpuState::Interrupt => {
                self.dispatch(bus)?;
                Ok(false)
            }
            CpuState::Halt | CpuState::Stop => Ok(false),
        }
    }

    /// Pick the state for the next cycle.
    pub fn next_state(&mut self, signals: Signals) {
        self.state = match self.state {
            CpuState::Fetch | CpuState::Execute => {
                if self.step != DONE {
                    CpuState::Execute
                } else if signals.interrupt && self.ime {
                    self.step = 0;
                    CpuState::Interrupt
                } else {
                    CpuState::Fetch
                }
            }
            CpuState::Interrupt => {
                if self.step == DONE {
                    CpuState::Fetch
                } else {
                    CpuState::Interrupt
                }
            }
            CpuState::Halt => {
                if !signals.interrupt {
                    CpuState::Halt
                } else if self.ime {
                    self.step = 0;
                    CpuState::Interrupt
                } else {
                    CpuState::Fetch
                }
            }
            CpuState::Stop => {
                if signals.interrupt {
                    CpuState::Fetch
                } else {
                    CpuState::Stop
                }
            }
        };
    }

    fn execute<B: InterruptBus>(&mut self, bus: &mut B) -> Result<()> {
        let step = self.step;
        let done = if self.prefixed {
            self.execute_cb(bus, step)?
        } else {
            self.execute_main(bus, step)?
        };
        self.step = if done { DONE } else { step + 1 };
        Ok(())
    }

    /// Interrupt dispatch: two internal cycles, two pushes, then the jump.
    fn dispatch<B: InterruptBus>(&mut self, bus: &mut B) -> Result<()> {
        match self.step {
            0 => self.ime = false,
            1 => self.sp = self.sp.wrapping_sub(1),
            2 => {
                bus.write(self.sp, (self.pc >> 8) as u8)?;
                self.sp = self.sp.wrapping_sub(1);
            }
            3 => {
                // sampled after the high byte push, which may have hit IE
                let pending = bus.pending_interrupts();
                bus.write(self.sp, self.pc as u8)?;
                let target = if pending == 0 {
                    0x0000
                } else {
                    let bit = pending & pending.wrapping_neg();
                    bus.acknowledge_interrupt(bit);
                    INTERRUPT_VECTORS[bit.trailing_zeros() as usize]
                };
                self.set_wz(target);
            }
            _ => {
                self.pc = self.wz();
                self.step = DONE;
                return Ok(());
            }
        }
        self.step += 1;
        Ok(())
    }

    fn execute_main<B: InterruptBus>(&mut self, bus: &mut B, step: u8) -> Result<bool> {
        let op = self.opcode;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;
        let p = y >> 1;
        let q = y & 0x01;

        match op >> 6 {
            0 => match z {
                0 => match y {
                    0 => Ok(true),
                    1 => self.ld_nn_sp(bus, step),
                    2 => {
                        // STOP skips its padding byte
                        self.pc = self.pc.wrapping_add(1);
                        bus.enter_stop();
                        self.state = CpuState::Stop;
                        Ok(true)
                    }
                    3 => self.jr(bus, step, true),
                    _ => {
                        let taken = self.condition(y - 4);
                        self.jr(bus, step, taken)
                    }
                },
                1 => match (q, step) {
                    (_, 0) => Ok(false),
                    (0, 1) => {
                        self.z = self.fetch(bus)?;
                        Ok(false)
                    }
                    (0, _) => {
                        self.w = self.fetch(bus)?;
                        let val = self.wz();
                        self.set_reg16(p, val);
                        Ok(true)
                    }
                    _ => {
                        self.add_hl(self.reg16(p));
                        Ok(true)
                    }
                },
                2 => {
                    if step == 0 {
                        return Ok(false);
                    }
                    let hl = self.get_hl();
                    let addr = match p {
                        0 => self.get_bc(),
                        1 => self.get_de(),
                        _ => hl,
                    };
                    if q == 0 {
                        bus.write(addr, self.a)?;
                    } else {
                        self.a = bus.read(addr)?;
                    }
                    match p {
                        2 => self.set_hl(hl.wrapping_add(1)),
                        3 => self.set_hl(hl.wrapping_sub(1)),
                        _ => {}
                    }
                    Ok(true)
                }
                3 => {
                    if step == 0 {
                        return Ok(false);
                    }
                    let val = self.reg16(p);
                    let val = if q == 0 {
                        val.wrapping_add(1)
                    } else {
                        val.wrapping_sub(1)
                    };
                    self.set_reg16(p, val);
                    Ok(true)
                }
                4 | 5 => {
                    let dec = z == 5;
                    if y != 6 {
                        let val = self.inc_dec(self.reg(y), dec);
                        self.set_reg(y, val);
                        return Ok(true);
                    }
                    match step {
                        0 => Ok(false),
                        1 => {
                            self.z = bus.read(self.get_hl())?;
                            Ok(false)
                        }
                        _ => {
                            let val = self.inc_dec(self.z, dec);
                            bus.write(self.get_hl(), val)?;
                            Ok(true)
                        }
                    }
                }
                6 => match step {
                    0 => Ok(false),
                    1 => {
                        self.z = self.fetch(bus)?;
                        if y == 6 {
                            return Ok(false);
                        }
                        self.set_reg(y, self.z);
                        Ok(true)
                    }
                    _ => {
                        bus.write(self.get_hl(), self.z)?;
                        Ok(true)
                    }
                },
                _ => {
                    self.accumulator_op(y);
                    Ok(true)
                }
            },
            1 => {
                if op == 0x76 {
                    self.halt(bus);
                    return Ok(true);
                }
                if z == 6 {
                    if step == 0 {
                        return Ok(false);
                    }
                    let val = bus.read(self.get_hl())?;
                    self.set_reg(y, val);
                } else if y == 6 {
                    if step == 0 {
                        return Ok(false);
                    }
                    bus.write(self.get_hl(), self.reg(z))?;
                } else {
                    self.set_reg(y, self.reg(z));
                }
                Ok(true)
            }
            2 => {
                if z == 6 {
                    if step == 0 {
                        return Ok(false);
                    }
                    let val = bus.read(self.get_hl())?;
                    self.alu(y, val);
                } else {
                    self.alu(y, self.reg(z));
                }
                Ok(true)
            }
            _ => self.execute_high(bus, step, y, z, p, q),
        }
    }

    /// Opcodes 0xC0-0xFF.
    fn execute_high<B: InterruptBus>(
        &mut self,
        bus: &mut B,
        step: u8,
        y: u8,
        z: u8,
        p: u8,
        q: u8,
    ) -> Result<bool> {
        match (z, y) {
            (0, 0..=3) => match step {
                0 => Ok(false),
                1 => Ok(!self.condition(y)),
                _ => self.ret(bus, step - 1),
            },
            (0, 4) | (2, 4) | (0, 6) | (2, 6) => {
                let immediate = z == 0;
                match step {
                    0 => Ok(false),
                    1 if immediate => {
                        self.z = self.fetch(bus)?;
                        Ok(false)
                    }
                    _ => {
                        let offset = if immediate { self.z } else { self.c };
                        let addr = 0xFF00 | offset as u16;
                        if y == 4 {
                            bus.write(addr, self.a)?;
                        } else {
                            self.a = bus.read(addr)?;
                        }
                        Ok(true)
                    }
                }
            }
            (0, 5) => match step {
                0 | 2 => Ok(false),
                1 => {
                    self.z = self.fetch(bus)?;
                    Ok(false)
                }
                _ => {
                    self.sp = self.add_sp_offset(self.z);
                    Ok(true)
                }
            },
            (0, _) => match step {
                0 => Ok(false),
                1 => {
                    self.z = self.fetch(bus)?;
                    Ok(false)
                }
                _ => {
                    let val = self.add_sp_offset(self.z);
                    self.set_hl(val);
                    Ok(true)
                }
            },
            (1, _) if q == 0 => match step {
                0 => Ok(false),
                1 => {
                    self.z = self.pop(bus)?;
                    Ok(false)
                }
                _ => {
                    self.w = self.pop(bus)?;
                    let val = self.wz();
                    self.set_stack_reg(p, val);
                    Ok(true)
                }
            },
            (1, _) => match p {
                0 | 1 => {
                    let done = self.ret(bus, step)?;
                    if done && p == 1 {
                        self.ime = true;
                    }
                    Ok(done)
                }
                2 => {
                    self.pc = self.get_hl();
                    Ok(true)
                }
                _ => {
                    if step == 0 {
                        return Ok(false);
                    }
                    self.sp = self.get_hl();
                    Ok(true)
                }
            },
            (2, 0..=3) => match step {
                0 => Ok(false),
                1 => {
                    self.z = self.fetch(bus)?;
                    Ok(false)
                }
                2 => {
                    self.w = self.fetch(bus)?;
                    Ok(!self.condition(y))
                }
                _ => {
                    self.pc = self.wz();
                    Ok(true)
                }
            },
            (2, _) => match step {
                0 | 1 => {
                    if step == 1 {
                        self.z = self.fetch(bus)?;
                    }
                    Ok(false)
                }
                2 => {
                    self.w = self.fetch(bus)?;
                    Ok(false)
                }
                _ => {
                    if y == 5 {
                        bus.write(self.wz(), self.a)?;
                    } else {
                        self.a = bus.read(self.wz())?;
                    }
                    Ok(true)
                }
            },
            (3, 0) => match step {
                0 => Ok(false),
                1 => {
                    self.z = self.fetch(bus)?;
                    Ok(false)
                }
                2 => {
                    self.w = self.fetch(bus)?;
                    Ok(false)
                }
                _ => {
                    self.pc = self.wz();
                    Ok(true)
                }
            },
            (3, 1) => {
                if step == 0 {
                    return Ok(false);
                }
                self.opcode = self.fetch(bus)?;
                self.prefixed = true;
                self.execute_cb(bus, step)
            }
            (3, 6) => {
                self.ime = false;
                self.ei_pending = false;
                Ok(true)
            }
            (3, 7) => {
                self.ei_pending = true;
                Ok(true)
            }
            (4, 0..=3) => {
                let taken = self.condition(y);
                self.call(bus, step, taken)
            }
            (5, _) if q == 0 => match step {
                0 => Ok(false),
                1 => {
                    self.sp = self.sp.wrapping_sub(1);
                    Ok(false)
                }
                2 => {
                    let [hi, _] = self.stack_reg(p).to_be_bytes();
                    bus.write(self.sp, hi)?;
                    self.sp = self.sp.wrapping_sub(1);
                    Ok(false)
                }
                _ => {
                    let [_, lo] = self.stack_reg(p).to_be_bytes();
                    bus.write(self.sp, lo)?;
                    Ok(true)
                }
            },
            (5, 1) => self.call(bus, step, true),
            (6, _) => {
                if step == 0 {
                    return Ok(false);
                }
                let val = self.fetch(bus)?;
                self.alu(y, val);
                Ok(true)
            }
            (7, _) => match step {
                0 => Ok(false),
                1 => {
                    self.sp = self.sp.wrapping_sub(1);
                    Ok(false)
                }
                2 => {
                    bus.write(self.sp, (self.pc >> 8) as u8)?;
                    self.sp = self.sp.wrapping_sub(1);
                    Ok(false)
                }
                _ => {
                    bus.write(self.sp, self.pc as u8)?;
                    self.pc = y as u16 * 8;
                    Ok(true)
                }
            },
            // D3 DB DD E3 E4 EB EC ED F4 FC FD
            _ => Err(self.invalid()),
        }
    }

    fn ld_nn_sp<B: Bus>(&mut self, bus: &mut B, step: u8) -> Result<bool> {
        match step {
            0 => Ok(false),
            1 => {
                self.z = self.fetch(bus)?;
                Ok(false)
            }
            2 => {
                self.w = self.fetch(bus)?;
                Ok(false)
            }
            3 => {
                bus.write(self.wz(), self.sp as u8)?;
                Ok(false)
            }
            _ => {
                bus.write(self.wz().wrapping_add(1), (self.sp >> 8) as u8)?;
                Ok(true)
            }
        }
    }

    fn jr<B: Bus>(&mut self, bus: &mut B, step: u8, taken: bool) -> Result<bool> {
        match step {
            0 => Ok(false),
            1 => {
                self.z = self.fetch(bus)?;
                Ok(!taken)
            }
            _ => {
                self.pc = self.pc.wrapping_add(self.z as i8 as u16);
                Ok(true)
            }
        }
    }

    /// Pop PC; `step` counts from the cycle before the first pop.
    fn ret<B: Bus>(&mut self, bus: &mut B, step: u8) -> Result<bool> {
        match step {
            0 => Ok(false),
            1 => {
                self.z = self.pop(bus)?;
                Ok(false)
            }
            2 => {
                self.w = self.pop(bus)?;
                Ok(false)
            }
            _ => {
                self.pc = self.wz();
                Ok(true)
            }
        }
    }

    fn call<B: Bus>(&mut self, bus: &mut B, step: u8, taken: bool) -> Result<bool> {
        match step {
            0 => Ok(false),
            1 => {
                self.z = self.fetch(bus)?;
                Ok(false)
            }
            2 => {
                self.w = self.fetch(bus)?;
                Ok(!taken)
            }
            3 => {
                self.sp = self.sp.wrapping_sub(1);
                Ok(false)
            }
            4 => {
                bus.write(self.sp, (self.pc >> 8) as u8)?;
                self.sp = self.sp.wrapping_sub(1);
                Ok(false)
            }
            _ => {
                bus.write(self.sp, self.pc as u8)?;
                self.pc = self.wz();
                Ok(true)
            }
        }
    }

    fn halt<B: InterruptBus>(&mut self, bus: &mut B) {
        if !self.ime && bus.pending_interrupts() != 0 {
            // HALT falls through and the next opcode is read twice
            self.halt_bug = true;
        } else {
            self.state = CpuState::Halt;
        }
    }

    /// CB-prefixed instructions. Step 1 is the cycle that fetched the
    /// second opcode byte.
    fn execute_cb<B: Bus>(&mut self, bus: &mut B, step: u8) -> Result<bool> {
        let op = self.opcode;
        let kind = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;

        if z != 6 {
            let val = self.reg(z);
            if let Some(res) = self.bit_op(kind, y, val) {
                self.set_reg(z, res);
            }
            return Ok(true);
        }
        match step {
            1 => Ok(false),
            2 => {
                self.z = bus.read(self.get_hl())?;
                if kind == 1 {
                    self.bit_op(kind, y, self.z);
                    return Ok(true);
                }
                Ok(false)
            }
            _ => {
                if let Some(res) = self.bit_op(kind, y, self.z) {
                    bus.write(self.get_hl(), res)?;
                }
                Ok(true)
            }
        }
    }

    /// Rotate/shift, BIT, RES or SET. Returns the value to write back, if any.
    fn bit_op(&mut self, kind: u8, y: u8, val: u8) -> Option<u8> {
        match kind {
            0 => Some(self.rotate(y, val)),
            1 => {
                let c = self.f & FLAG_C != 0;
                self.set_flags(val & (1 << y) == 0, false, true, c);
                None
            }
            2 => Some(val & !(1 << y)),
            _ => Some(val | (1 << y)),
        }
    }

    fn rotate(&mut self, y: u8, val: u8) -> u8 {
        let carry_in = self.carry();
        let (res, carry) = match y {
            0 => (val.rotate_left(1), val & 0x80 != 0),
            1 => (val.rotate_right(1), val & 0x01 != 0),
            2 => ((val << 1) | carry_in, val & 0x80 != 0),
            3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            4 => (val << 1, val & 0x80 != 0),
            5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            6 => (val.rotate_left(4), false),
            _ => (val >> 1, val & 0x01 != 0),
        };
        self.set_flags(res == 0, false, false, carry);
        res
    }

    fn accumulator_op(&mut self, y: u8) {
        match y {
            0..=3 => {
                self.a = self.rotate(y, self.a);
                self.f &= !FLAG_Z;
            }
            4 => self.daa(),
            5 => {
                self.a = !self.a;
                self.f |= FLAG_N | FLAG_H;
            }
            6 => self.f = (self.f & FLAG_Z) | FLAG_C,
            _ => self.f = (self.f & (FLAG_Z | FLAG_C)) ^ FLAG_C,
        }
    }

    fn daa(&mut self) {
        let mut a = self.a;
        let mut carry = self.f & FLAG_C != 0;
        let half = self.f & FLAG_H != 0;
        let subtract = self.f & FLAG_N != 0;
        if subtract {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if half {
                a = a.wrapping_sub(0x06);
            }
        } else {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if half || a & 0x0F > 0x09 {
                a = a.wrapping_add(0x06);
            }
        }
        self.a = a;
        self.set_flags(a == 0, subtract, false, carry);
    }

    fn alu(&mut self, op: u8, val: u8) {
        let a = self.a;
        match op {
            0 | 1 => {
                let carry = if op == 1 { self.carry() } else { 0 };
                let res = a as u16 + val as u16 + carry as u16;
                let h = (a & 0x0F) + (val & 0x0F) + carry > 0x0F;
                self.a = res as u8;
                self.set_flags(self.a == 0, false, h, res > 0xFF);
            }
            2 | 3 | 7 => {
                let carry = if op == 3 { self.carry() } else { 0 };
                let res = a.wrapping_sub(val).wrapping_sub(carry);
                let h = (a & 0x0F) < (val & 0x0F) + carry;
                let c = (a as u16) < val as u16 + carry as u16;
                self.set_flags(res == 0, true, h, c);
                if op != 7 {
                    self.a = res;
                }
            }
            4 => {
                self.a = a & val;
                self.set_flags(self.a == 0, false, true, false);
            }
            5 => {
                self.a = a ^ val;
                self.set_flags(self.a == 0, false, false, false);
            }
            _ => {
                self.a = a | val;
                self.set_flags(self.a == 0, false, false, false);
            }
        }
    }

    fn inc_dec(&mut self, val: u8, dec: bool) -> u8 {
        let c = self.f & FLAG_C != 0;
        if dec {
            let res = val.wrapping_sub(1);
            self.set_flags(res == 0, true, val & 0x0F == 0, c);
            res
        } else {
            let res = val.wrapping_add(1);
            self.set_flags(res == 0, false, val & 0x0F == 0x0F, c);
            res
        }
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.get_hl();
        let res = hl as u32 + val as u32;
        let h = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
        let z = self.f & FLAG_Z != 0;
        self.set_hl(res as u16);
        self.set_flags(z, false, h, res > 0xFFFF);
    }

    /// SP plus a signed offset, with flags from the unsigned low-byte add.
    fn add_sp_offset(&mut self, offset: u8) -> u16 {
        let sp = self.sp;
        let h = (sp & 0x000F) + (offset as u16 & 0x000F) > 0x000F;
        let c = (sp & 0x00FF) + offset as u16 > 0x00FF;
        self.set_flags(false, false, h, c);
        sp.wrapping_add(offset as i8 as u16)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(DmgRevision::default())
    }
}
