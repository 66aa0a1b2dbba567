use crate::error::{EmuError, Result};

/// IF bit raised when TIMA reloads from TMA.
pub const TIMER_INTERRUPT: u8 = 0x04;

/// Where TIMA is in its overflow sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reload {
    Idle,
    /// Overflow happened during the CPU's access in this cycle.
    Armed,
    /// TIMA reads 0x00; the reload lands at the end of the next cycle.
    Pending,
    /// TMA was copied into TIMA during the previous cycle.
    Reloading,
}

pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    pub div: u16,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control
    pub tac: u8,
    last_signal: bool,
    reload: Reload,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
            reload: Reload::Idle,
        }
    }

    pub fn read(&self, addr: u16) -> Result<u8> {
        match addr {
            0xFF04 => Ok((self.div >> 8) as u8),
            0xFF05 => Ok(self.tima),
            0xFF06 => Ok(self.tma),
            0xFF07 => Ok(self.tac | 0xF8),
            _ => Err(EmuError::InvalidAddress {
                device: "timer",
                address: addr,
            }),
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) -> Result<()> {
        match addr {
            0xFF04 => self.reset_div(),
            0xFF05 => match self.reload {
                // writing while the reload is still ahead cancels it
                Reload::Armed | Reload::Pending => {
                    self.tima = val;
                    self.reload = Reload::Idle;
                }
                Reload::Reloading => {}
                Reload::Idle => self.tima = val,
            },
            0xFF06 => {
                self.tma = val;
                if self.reload == Reload::Reloading {
                    self.tima = val;
                }
            }
            0xFF07 => {
                self.tac = val & 0x07;
                self.update_signal();
            }
            _ => {
                return Err(EmuError::InvalidAddress {
                    device: "timer",
                    address: addr,
                });
            }
        }
        Ok(())
    }

    /// Advance the timer by one machine cycle (four divider ticks) and
    /// update IF when a TIMA reload lands.
    pub fn cycle(&mut self, if_reg: &mut u8) {
        match self.reload {
            Reload::Pending => {
                self.tima = self.tma;
                *if_reg |= TIMER_INTERRUPT;
                self.reload = Reload::Reloading;
            }
            Reload::Reloading => self.reload = Reload::Idle,
            Reload::Armed => self.reload = Reload::Pending,
            Reload::Idle => {}
        }
        for _ in 0..4 {
            self.div = self.div.wrapping_add(1);
            self.update_signal();
        }
        if self.reload == Reload::Armed {
            self.reload = Reload::Pending;
        }
    }

    /// Reset the internal divider counter, applying TIMA edge logic.
    pub fn reset_div(&mut self) {
        self.div = 0;
        self.update_signal();
    }

    fn update_signal(&mut self) {
        let signal = self.signal();
        if self.last_signal && !signal {
            self.increment();
        }
        self.last_signal = signal;
    }

    fn increment(&mut self) {
        if self.tima == 0xFF {
            self.tima = 0;
            self.reload = Reload::Armed;
        } else {
            self.tima += 1;
        }
    }

    fn timer_bit(&self) -> u16 {
        match self.tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        }
    }

    fn signal(&self) -> bool {
        self.tac & 0x04 != 0 && (self.div >> self.timer_bit()) & 1 != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
