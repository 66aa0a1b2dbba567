//! Memory bus abstraction.
//!
//! Both CPU cores talk to memory through [`Bus`]. Accesses can fail: a
//! peripheral handed an address it does not decode reports
//! [`EmuError::InvalidAddress`](crate::error::EmuError::InvalidAddress), and
//! the fault is propagated to the frame driver.

use crate::error::Result;

/// Byte-wide memory bus seen by a CPU core.
///
/// Implementations are free to have side effects on read (I/O registers
/// that clear on access, DMA conflicts) which is why reads take `&mut self`.
pub trait Bus {
    fn read(&mut self, address: u16) -> Result<u8>;
    fn write(&mut self, address: u16, value: u8) -> Result<()>;
}

/// 64 KiB of flat RAM with no side effects.
///
/// Useful for exercising a CPU core on its own: the machine-specific bus
/// extensions are implemented next to each core.
pub struct FlatRam {
    pub memory: Box<[u8; 0x10000]>,
}

impl FlatRam {
    pub fn new() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
        }
    }

    /// Copy `bytes` into memory starting at `address`, wrapping at the top.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.memory[address.wrapping_add(i as u16) as usize] = b;
        }
    }
}

impl Default for FlatRam {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for FlatRam {
    fn read(&mut self, address: u16) -> Result<u8> {
        Ok(self.memory[address as usize])
    }

    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        self.memory[address as usize] = value;
        Ok(())
    }
}
