use crate::error::{EmuError, Result};

/// IF bit raised when a transfer completes.
pub const SERIAL_INTERRUPT: u8 = 0x08;

/// Divider bit whose falling edge clocks one bit in internal clock mode (8192 Hz).
const CLOCK_BIT: u16 = 8;

pub trait LinkPort: Send {
    /// Exchange a byte with the link partner. Returns the byte received.
    fn transfer(&mut self, byte: u8) -> u8;
}

/// Link port used when no cable is attached.
///
/// Incoming bits float high so every transfer receives 0xFF. With
/// `loopback` set the sent byte is echoed back instead.
#[derive(Default)]
pub struct NullLinkPort {
    loopback: bool,
}

impl NullLinkPort {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

impl LinkPort for NullLinkPort {
    fn transfer(&mut self, byte: u8) -> u8 {
        if self.loopback { byte } else { 0xFF }
    }
}

struct Transfer {
    remaining_bits: u8,
    outgoing: u8,
    incoming: Option<u8>,
    pending_in: u8,
    internal_clock: bool,
}

impl Transfer {
    fn new(outgoing: u8, internal_clock: bool) -> Self {
        Self {
            remaining_bits: 8,
            outgoing,
            incoming: None,
            pending_in: 0xFF,
            internal_clock,
        }
    }

    fn latch_incoming(&mut self, port: &mut dyn LinkPort) {
        if self.incoming.is_none() {
            let byte = port.transfer(self.outgoing);
            self.incoming = Some(byte);
            self.pending_in = byte;
        }
    }

    /// Shift one bit into SB. Returns true once all eight bits are in.
    fn shift(&mut self, sb: &mut u8) -> bool {
        let bit = (self.pending_in & 0x80) != 0;
        self.pending_in <<= 1;
        *sb = (*sb << 1) | bit as u8;
        self.remaining_bits -= 1;
        self.remaining_bits == 0
    }
}

/// SB/SC registers. Raises the serial interrupt when a transfer completes
/// and keeps a copy of every byte sent, which test ROMs use as a console.
pub struct Serial {
    sb: u8,
    sc: u8,
    out_buf: Vec<u8>,
    port: Box<dyn LinkPort>,
    transfer: Option<Transfer>,
    last_clock: bool,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            sb: 0,
            sc: 0x7E,
            out_buf: Vec::new(),
            port: Box::new(NullLinkPort::default()),
            transfer: None,
            last_clock: false,
        }
    }

    pub fn connect(&mut self, port: Box<dyn LinkPort>) {
        self.port = port;
    }

    pub fn read(&self, addr: u16) -> Result<u8> {
        match addr {
            0xFF01 => Ok(self.sb),
            0xFF02 => Ok(self.sc | 0x7E),
            _ => Err(EmuError::InvalidAddress {
                device: "serial",
                address: addr,
            }),
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) -> Result<()> {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val;
                // bit 7 set (re)starts with the current SB, clear cancels
                self.transfer = (val & 0x80 != 0).then(|| Transfer::new(self.sb, val & 0x01 != 0));
            }
            _ => {
                return Err(EmuError::InvalidAddress {
                    device: "serial",
                    address: addr,
                });
            }
        }
        Ok(())
    }

    /// Advance one machine cycle. `div` is the internal divider after this
    /// cycle's ticks.
    pub fn cycle(&mut self, div: u16, if_reg: &mut u8) {
        let clock = (div >> CLOCK_BIT) & 1 != 0;
        let falling = self.last_clock && !clock;
        self.last_clock = clock;

        let Some(state) = self.transfer.as_mut() else {
            return;
        };
        if !state.internal_clock {
            return;
        }
        state.latch_incoming(self.port.as_mut());
        if falling && state.shift(&mut self.sb) {
            self.finish(if_reg);
        }
    }

    /// Deliver clock pulses from a link partner. Only meaningful in external
    /// clock mode.
    pub fn external_clock_pulse(&mut self, count: u8, if_reg: &mut u8) {
        let Some(state) = self.transfer.as_mut() else {
            return;
        };
        if state.internal_clock {
            return;
        }
        state.latch_incoming(self.port.as_mut());
        let mut complete = false;
        for _ in 0..count {
            if state.shift(&mut self.sb) {
                complete = true;
                break;
            }
        }
        if complete {
            self.finish(if_reg);
        }
    }

    fn finish(&mut self, if_reg: &mut u8) {
        if let Some(state) = self.transfer.take() {
            self.sb = state.incoming.unwrap_or(0xFF);
            self.out_buf.push(state.outgoing);
            self.sc &= 0x7F;
            *if_reg |= SERIAL_INTERRUPT;
        }
    }

    /// Drain the bytes sent since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}
