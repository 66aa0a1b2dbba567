//! VIP address decoding.
//!
//! RAM fills the lower half of the address space, mirrored every
//! 2 or 4 KiB. The monitor ROM is mirrored across the upper half. At reset a
//! latch forces A15 high so the CPU, starting at 0x0000, runs the monitor;
//! the monitor releases it with OUT 4.

use crate::bus::Bus;
use crate::error::Result;
use crate::hardware::VipMemory;

/// Smallest ROM image the board decodes.
const MIN_ROM_SIZE: usize = 0x200;
const ROM_BASE: u16 = 0x8000;

pub struct MemoryMap {
    ram: Vec<u8>,
    rom: Vec<u8>,
    /// A15 forced high: every read hits the ROM.
    pub high_latch: bool,
}

impl MemoryMap {
    pub fn new(size: VipMemory, monitor_rom: &[u8]) -> Self {
        let mut rom_len = monitor_rom.len().max(MIN_ROM_SIZE).next_power_of_two();
        if rom_len > ROM_BASE as usize {
            log::warn!(
                "monitor ROM is {} bytes; only the first 32 KiB are mapped",
                monitor_rom.len()
            );
            rom_len = ROM_BASE as usize;
        }
        let mut rom = vec![0xFF; rom_len];
        let used = monitor_rom.len().min(rom_len);
        rom[..used].copy_from_slice(&monitor_rom[..used]);

        Self {
            ram: vec![0; size.bytes()],
            rom,
            high_latch: true,
        }
    }

    /// Set the A15 latch again, as the reset line does.
    pub fn reset(&mut self) {
        self.high_latch = true;
    }

    pub fn clear_latch(&mut self) {
        if self.high_latch {
            log::debug!("address latch released");
        }
        self.high_latch = false;
    }

    /// Copy a program into RAM at `address`, wrapping inside the fitted RAM.
    pub fn load_ram(&mut self, address: u16, bytes: &[u8]) {
        let mask = self.ram.len() - 1;
        for (i, &b) in bytes.iter().enumerate() {
            self.ram[(address as usize + i) & mask] = b;
        }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }
}

impl Bus for MemoryMap {
    fn read(&mut self, address: u16) -> Result<u8> {
        Ok(if self.high_latch || address >= ROM_BASE {
            self.rom[address as usize & (self.rom.len() - 1)]
        } else {
            self.ram[address as usize & (self.ram.len() - 1)]
        })
    }

    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        if address < ROM_BASE && !self.high_latch {
            let mask = self.ram.len() - 1;
            self.ram[address as usize & mask] = value;
        }
        Ok(())
    }
}
