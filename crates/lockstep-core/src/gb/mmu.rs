use crate::{
    bus::Bus,
    error::Result,
    gb::{
        apu::Apu, cartridge::Cartridge, cpu::InterruptBus, joypad::Joypad, ppu::Ppu,
        serial::Serial, timer::Timer,
    },
    hardware::DmgRevision,
};

const WRAM_SIZE: usize = 0x2000;
const BOOT_ROM_SIZE: usize = 0x100;

/// Bytes copied by one OAM DMA transfer.
pub const OAM_DMA_LENGTH: u8 = 0xA0;
/// Machine cycles between the FF46 write and the first byte copied.
pub const OAM_DMA_DELAY: u8 = 2;

/// The five interrupt sources, lowest bit highest priority.
const INTERRUPT_MASK: u8 = 0x1F;

/// Which physical bus an address travels on. A running OAM DMA owns the bus
/// its source lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusSegment {
    External,
    Video,
    Internal,
}

impl BusSegment {
    /// Segment a DMA source is fetched over. Sources from 0xE000 up are
    /// served by work RAM, so they load the external bus.
    fn of_dma_source(source: u16) -> Self {
        Self::of(if source >= 0xE000 { source - 0x2000 } else { source })
    }

    fn of(addr: u16) -> Self {
        match addr {
            0x8000..=0x9FFF => BusSegment::Video,
            0x0000..=0x7FFF | 0xA000..=0xFDFF => BusSegment::External,
            _ => BusSegment::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OamDma {
    Idle,
    /// `held` is the source of a transfer that keeps the bus until this
    /// one takes over.
    Starting {
        source: u16,
        delay: u8,
        held: Option<u16>,
    },
    Active { source: u16, index: u8 },
}

/// DMG memory map and the per-cycle peripheral plumbing.
pub struct Mmu {
    pub wram: [u8; WRAM_SIZE],
    pub hram: [u8; 0x7F],
    pub cart: Cartridge,
    boot_rom: Option<Vec<u8>>,
    pub boot_mapped: bool,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub serial: Serial,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub joypad: Joypad,
    dma: OamDma,
}

impl Mmu {
    /// Memory map at power-on, before any boot code has run.
    pub fn new(cart: Cartridge) -> Self {
        Self {
            wram: [0; WRAM_SIZE],
            hram: [0; 0x7F],
            cart,
            boot_rom: None,
            boot_mapped: false,
            if_reg: 0,
            ie_reg: 0,
            serial: Serial::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            timer: Timer::new(),
            joypad: Joypad::new(),
            dma: OamDma::Idle,
        }
    }

    /// Map a boot ROM over 0x0000-0x00FF until the program writes FF50.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        if data.len() < BOOT_ROM_SIZE {
            log::warn!("boot ROM is only {} bytes; padding with 0xFF", data.len());
        }
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    /// Skip the boot ROM: put every peripheral where the boot ROM leaves it.
    pub fn apply_boot_state(&mut self, revision: DmgRevision) {
        self.timer.div = revision.post_boot_div();
        self.if_reg = 0x01;
        self.ppu.apply_boot_state();
        self.apu.apply_boot_state();
    }

    /// True while a transfer owns OAM and its source bus.
    pub fn dma_active(&self) -> bool {
        self.dma_bus_source().is_some()
    }

    fn dma_bus_source(&self) -> Option<u16> {
        match self.dma {
            OamDma::Active { source, .. } => Some(source),
            OamDma::Starting { held, .. } => held,
            OamDma::Idle => None,
        }
    }

    fn dma_conflict(&self, addr: u16) -> bool {
        self.dma_bus_source().is_some_and(|source| {
            (0xFE00..=0xFEFF).contains(&addr)
                || BusSegment::of(addr) == BusSegment::of_dma_source(source)
        })
    }

    pub fn read_byte(&mut self, addr: u16) -> Result<u8> {
        if self.dma_conflict(addr) {
            log::trace!("read {addr:04X} blocked by OAM DMA");
            return Ok(0xFF);
        }
        Ok(match addr {
            0x0000..=0x00FF if self.boot_mapped => self
                .boot_rom
                .as_ref()
                .and_then(|rom| rom.get(addr as usize).copied())
                .unwrap_or(0xFF),
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.read(addr)?,
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize]
                } else {
                    0xFF
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize]
                } else {
                    0xFF
                }
            }
            0xFF00 => self.joypad.read(),
            0xFF01..=0xFF02 => self.serial.read(addr)?,
            0xFF04..=0xFF07 => self.timer.read(addr)?,
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr)?,
            0xFF40..=0xFF4B => self.ppu.read_reg(addr)?,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        })
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) -> Result<()> {
        if self.dma_conflict(addr) {
            log::trace!("write {addr:04X}={val:02X} dropped by OAM DMA");
            return Ok(());
        }
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.write(addr, val)?,
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[(addr - 0x8000) as usize] = val;
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFF00 => self.joypad.write(val, &mut self.if_reg),
            0xFF01..=0xFF02 => self.serial.write(addr, val)?,
            0xFF04..=0xFF07 => self.timer.write(addr, val)?,
            0xFF0F => self.if_reg = val & INTERRUPT_MASK,
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val)?,
            0xFF46 => {
                self.ppu.write_reg(addr, val)?;
                self.dma = OamDma::Starting {
                    source: (val as u16) << 8,
                    delay: OAM_DMA_DELAY,
                    held: self.dma_bus_source(),
                };
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val)?,
            0xFF50 => {
                if self.boot_mapped {
                    log::debug!("boot ROM unmapped");
                }
                self.boot_mapped = false;
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {}
        }
        Ok(())
    }

    /// Read on behalf of the DMA engine: no conflicts, no PPU locks.
    fn dma_read_byte(&self, addr: u16) -> Result<u8> {
        // FE00-FFFF sources read work RAM like the echo region does
        let addr = if addr >= 0xE000 { addr - 0x2000 } else { addr };
        Ok(match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.read(addr)?,
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            _ => self.wram[(addr - 0xC000) as usize],
        })
    }

    /// Advance the OAM DMA engine by one machine cycle.
    pub fn dma_cycle(&mut self) -> Result<()> {
        self.dma = match self.dma {
            OamDma::Idle => OamDma::Idle,
            OamDma::Starting {
                source,
                delay,
                held,
            } => {
                if delay <= 1 {
                    OamDma::Active { source, index: 0 }
                } else {
                    OamDma::Starting {
                        source,
                        delay: delay - 1,
                        held,
                    }
                }
            }
            OamDma::Active { source, index } => {
                let byte = self.dma_read_byte(source.wrapping_add(index as u16))?;
                self.ppu.oam[index as usize] = byte;
                if index + 1 == OAM_DMA_LENGTH {
                    OamDma::Idle
                } else {
                    OamDma::Active {
                        source,
                        index: index + 1,
                    }
                }
            }
        };
        Ok(())
    }

    /// Step every peripheral once, in fixed order: video, sound, timer,
    /// serial, cartridge, OAM DMA.
    pub fn cycle_peripherals(&mut self) -> Result<()> {
        self.ppu.cycle(&mut self.if_reg);
        self.apu.cycle(self.timer.div);
        self.timer.cycle(&mut self.if_reg);
        self.serial.cycle(self.timer.div, &mut self.if_reg);
        self.cart.cycle();
        self.dma_cycle()
    }
}

impl Bus for Mmu {
    fn read(&mut self, address: u16) -> Result<u8> {
        self.read_byte(address)
    }

    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        self.write_byte(address, value)
    }
}

impl InterruptBus for Mmu {
    fn pending_interrupts(&self) -> u8 {
        self.ie_reg & self.if_reg & INTERRUPT_MASK
    }

    fn acknowledge_interrupt(&mut self, mask: u8) {
        self.if_reg &= !mask;
    }

    fn enter_stop(&mut self) {
        self.timer.reset_div();
    }
}
