use crate::error::{EmuError, Result};
use crate::sink::RomSource;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;
const MBC2_RAM_SIZE: usize = 0x200;

/// The clock counter advances 32 times per second.
const RTC_SUBTICKS_PER_SECOND: u8 = 32;
/// Machine cycles per sub-tick.
const RTC_CYCLES_PER_SUBTICK: u32 = super::CYCLES_PER_SECOND / RTC_SUBTICKS_PER_SECOND as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

impl MbcType {
    /// Largest ROM and RAM size codes the mapper can address.
    const fn size_limits(self) -> (u8, u8) {
        match self {
            MbcType::RomOnly => (0x00, 0x02),
            MbcType::Mbc1 => (0x06, 0x03),
            MbcType::Mbc2 => (0x03, 0x00),
            MbcType::Mbc3 => (0x06, 0x03),
            MbcType::Mbc5 => (0x08, 0x04),
        }
    }
}

#[derive(Debug)]
enum MbcState {
    RomOnly,
    Mbc1 {
        ram_enable: bool,
        bank_lo: u8,
        bank_hi: u8,
        advanced_mode: bool,
    },
    Mbc2 {
        ram_enable: bool,
        rom_bank: u8,
    },
    Mbc3 {
        ram_enable: bool,
        rom_bank: u8,
        ram_select: u8,
        latch_armed: bool,
    },
    Mbc5 {
        ram_enable: bool,
        rom_bank: u16,
        ram_bank: u8,
    },
}

/// Cartridge ROM, external RAM and mapper registers.
///
/// ROM and RAM are stored as arrays of fixed-size banks; every bank number
/// is masked by `count - 1` so out-of-range selections wrap the way the
/// address lines do on real boards.
pub struct Cartridge {
    pub mbc: MbcType,
    pub title: String,
    rom: Vec<[u8; ROM_BANK_SIZE]>,
    ram: Vec<[u8; RAM_BANK_SIZE]>,
    ram_window_mask: usize,
    state: MbcState,
    rtc: Option<RealTimeClock>,
}

impl Cartridge {
    /// Build a cartridge from a ROM image, picking the mapper from the header.
    pub fn from_rom<R: RomSource + ?Sized>(rom: &R) -> Result<Self> {
        let cartridge_type = rom.cartridge_type();
        let rom_code = rom.rom_size();
        let ram_code = rom.ram_size();
        let unsupported = || EmuError::UnsupportedCartridge {
            cartridge_type,
            rom_size: rom_code,
            ram_size: ram_code,
        };

        let (mbc, has_rtc) = match cartridge_type {
            0x00 | 0x08 | 0x09 => (MbcType::RomOnly, false),
            0x01..=0x03 => (MbcType::Mbc1, false),
            0x05 | 0x06 => (MbcType::Mbc2, false),
            0x0F | 0x10 => (MbcType::Mbc3, true),
            0x11..=0x13 => (MbcType::Mbc3, false),
            0x19..=0x1E => (MbcType::Mbc5, false),
            _ => return Err(unsupported()),
        };
        let (max_rom, max_ram) = mbc.size_limits();
        if rom_code > max_rom || ram_code > 0x05 {
            return Err(unsupported());
        }
        let ram_banks = match ram_code {
            0x00 => 0,
            0x01 | 0x02 => 1,
            0x03 => 4,
            0x04 => 16,
            _ => 8,
        };
        if ram_banks > ram_bank_limit(max_ram) {
            return Err(unsupported());
        }

        let rom_banks = 2usize << rom_code;
        let bytes = rom.bytes();
        if bytes.len() > rom_banks * ROM_BANK_SIZE {
            log::warn!(
                "ROM image is {} bytes but header declares {}; ignoring the rest",
                bytes.len(),
                rom_banks * ROM_BANK_SIZE
            );
        }
        let rom = (0..rom_banks)
            .map(|i| {
                let mut bank = [0xFF; ROM_BANK_SIZE];
                let start = (i * ROM_BANK_SIZE).min(bytes.len());
                let end = (start + ROM_BANK_SIZE).min(bytes.len());
                bank[..end - start].copy_from_slice(&bytes[start..end]);
                bank
            })
            .collect();

        let (ram, ram_window_mask) = if mbc == MbcType::Mbc2 {
            (vec![[0; RAM_BANK_SIZE]], MBC2_RAM_SIZE - 1)
        } else if ram_code == 0x01 {
            (vec![[0; RAM_BANK_SIZE]], 0x07FF)
        } else {
            (vec![[0; RAM_BANK_SIZE]; ram_banks], RAM_BANK_SIZE - 1)
        };

        let state = match mbc {
            MbcType::RomOnly => MbcState::RomOnly,
            MbcType::Mbc1 => MbcState::Mbc1 {
                ram_enable: false,
                bank_lo: 1,
                bank_hi: 0,
                advanced_mode: false,
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                ram_enable: false,
                rom_bank: 1,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                ram_enable: false,
                rom_bank: 1,
                ram_select: 0,
                latch_armed: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                ram_enable: false,
                rom_bank: 1,
                ram_bank: 0,
            },
        };

        let title: String = bytes
            .get(0x0134..0x0144)
            .map(|t| {
                t.iter()
                    .take_while(|&&c| c != 0)
                    .map(|&c| c as char)
                    .collect()
            })
            .unwrap_or_default();
        log::info!("cartridge {title:?}: {mbc:?}, {rom_banks} ROM banks, {ram_banks} RAM banks");

        Ok(Self {
            mbc,
            title,
            rom,
            ram,
            ram_window_mask,
            state,
            rtc: has_rtc.then(RealTimeClock::default),
        })
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom.len()
    }

    /// Bank currently mapped at 0x4000-0x7FFF.
    pub fn current_rom_bank(&self) -> usize {
        let bank = match self.state {
            MbcState::RomOnly => 1,
            MbcState::Mbc1 {
                bank_lo, bank_hi, ..
            } => {
                let lo = match bank_lo & 0x1F {
                    0 => 1,
                    n => n,
                };
                ((bank_hi as usize) << 5) | lo as usize
            }
            MbcState::Mbc2 { rom_bank, .. } => match rom_bank & 0x0F {
                0 => 1,
                n => n as usize,
            },
            MbcState::Mbc3 { rom_bank, .. } => match rom_bank & 0x7F {
                0 => 1,
                n => n as usize,
            },
            MbcState::Mbc5 { rom_bank, .. } => rom_bank as usize,
        };
        bank & (self.rom.len() - 1)
    }

    fn low_rom_bank(&self) -> usize {
        match self.state {
            MbcState::Mbc1 {
                bank_hi,
                advanced_mode: true,
                ..
            } => ((bank_hi as usize) << 5) & (self.rom.len() - 1),
            _ => 0,
        }
    }

    /// RAM bank for 0xA000-0xBFFF, or `None` when RAM is disabled or absent.
    fn ram_bank(&self) -> Option<usize> {
        if self.ram.is_empty() {
            return None;
        }
        let bank = match self.state {
            MbcState::RomOnly => 0,
            MbcState::Mbc1 {
                ram_enable: true,
                bank_hi,
                advanced_mode,
                ..
            } => {
                if advanced_mode {
                    bank_hi as usize
                } else {
                    0
                }
            }
            MbcState::Mbc2 {
                ram_enable: true, ..
            } => 0,
            MbcState::Mbc3 {
                ram_enable: true,
                ram_select: sel @ 0x00..=0x03,
                ..
            } => sel as usize,
            MbcState::Mbc5 {
                ram_enable: true,
                ram_bank,
                ..
            } => ram_bank as usize,
            _ => return None,
        };
        Some(bank & (self.ram.len() - 1))
    }

    pub fn read(&self, addr: u16) -> Result<u8> {
        let offset = addr as usize;
        match addr {
            0x0000..=0x3FFF => Ok(self.rom[self.low_rom_bank()][offset]),
            0x4000..=0x7FFF => Ok(self.rom[self.current_rom_bank()][offset - 0x4000]),
            0xA000..=0xBFFF => {
                if let MbcState::Mbc3 {
                    ram_enable: true,
                    ram_select: reg @ 0x08..=0x0C,
                    ..
                } = self.state
                {
                    return Ok(self.rtc.as_ref().map_or(0xFF, |rtc| rtc.read(reg)));
                }
                let Some(bank) = self.ram_bank() else {
                    return Ok(0xFF);
                };
                let value = self.ram[bank][(offset - 0xA000) & self.ram_window_mask];
                Ok(if self.mbc == MbcType::Mbc2 {
                    0xF0 | value
                } else {
                    value
                })
            }
            _ => Err(EmuError::InvalidAddress {
                device: "cartridge",
                address: addr,
            }),
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) -> Result<()> {
        match addr {
            0x0000..=0x7FFF => {
                self.write_control(addr, val);
                log::trace!(
                    "mapper write {addr:04X}={val:02X}: ROM bank {}",
                    self.current_rom_bank()
                );
            }
            0xA000..=0xBFFF => {
                if let MbcState::Mbc3 {
                    ram_enable: true,
                    ram_select: reg @ 0x08..=0x0C,
                    ..
                } = self.state
                {
                    if let Some(rtc) = self.rtc.as_mut() {
                        rtc.write(reg, val);
                    }
                    return Ok(());
                }
                if let Some(bank) = self.ram_bank() {
                    let index = (addr as usize - 0xA000) & self.ram_window_mask;
                    self.ram[bank][index] = if self.mbc == MbcType::Mbc2 {
                        val & 0x0F
                    } else {
                        val
                    };
                }
            }
            _ => {
                return Err(EmuError::InvalidAddress {
                    device: "cartridge",
                    address: addr,
                });
            }
        }
        Ok(())
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        let enable = val & 0x0F == 0x0A;
        match &mut self.state {
            MbcState::RomOnly => {}
            MbcState::Mbc1 {
                ram_enable,
                bank_lo,
                bank_hi,
                advanced_mode,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = enable,
                0x2000..=0x3FFF => *bank_lo = val & 0x1F,
                0x4000..=0x5FFF => *bank_hi = val & 0x03,
                _ => *advanced_mode = val & 0x01 != 0,
            },
            MbcState::Mbc2 {
                ram_enable,
                rom_bank,
            } => {
                if addr <= 0x3FFF {
                    if addr & 0x0100 == 0 {
                        *ram_enable = enable;
                    } else {
                        *rom_bank = val & 0x0F;
                    }
                }
            }
            MbcState::Mbc3 {
                ram_enable,
                rom_bank,
                ram_select,
                latch_armed,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = enable,
                0x2000..=0x3FFF => *rom_bank = val & 0x7F,
                0x4000..=0x5FFF => *ram_select = val,
                _ => {
                    if *latch_armed && val == 0x01 {
                        if let Some(rtc) = self.rtc.as_mut() {
                            rtc.latch();
                        }
                    }
                    *latch_armed = val == 0x00;
                }
            },
            MbcState::Mbc5 {
                ram_enable,
                rom_bank,
                ram_bank,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = enable,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x0100) | val as u16,
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0x00FF) | ((val as u16 & 0x01) << 8),
                0x4000..=0x5FFF => *ram_bank = val & 0x0F,
                _ => {}
            },
        }
    }

    /// Advance one machine cycle. Only the MBC3 clock has anything to do.
    pub fn cycle(&mut self) {
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.cycle();
        }
    }
}

const fn ram_bank_limit(max_code: u8) -> usize {
    match max_code {
        0x00 => 0,
        0x01 | 0x02 => 1,
        0x03 => 4,
        _ => 16,
    }
}

/// One snapshot of the MBC3 clock registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ClockTime {
    seconds: u8,
    minutes: u8,
    hours: u8,
    /// Nine-bit day counter.
    days: u16,
    halted: bool,
    day_carry: bool,
}

impl ClockTime {
    /// Value of clock register `reg` (0x08-0x0C) as the CPU sees it.
    fn register(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.seconds,
            0x09 => self.minutes,
            0x0A => self.hours,
            0x0B => self.days as u8,
            _ => {
                ((self.days >> 8) as u8 & 0x01)
                    | (u8::from(self.halted) << 6)
                    | (u8::from(self.day_carry) << 7)
            }
        }
    }

    fn set_register(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => self.seconds = value & 0x3F,
            0x09 => self.minutes = value & 0x3F,
            0x0A => self.hours = value & 0x1F,
            0x0B => self.days = (self.days & 0x0100) | u16::from(value),
            _ => {
                self.days = (self.days & 0x00FF) | (u16::from(value & 0x01) << 8);
                self.halted = value & 0x40 != 0;
                self.day_carry = value & 0x80 != 0;
            }
        }
    }

    /// A field carries into the next one only when it rolls over from its
    /// last valid value. A field written past its range counts on to the
    /// register width and wraps to zero silently.
    fn tick_second(&mut self) {
        if !count_up(&mut self.seconds, 60, 0x3F)
            || !count_up(&mut self.minutes, 60, 0x3F)
            || !count_up(&mut self.hours, 24, 0x1F)
        {
            return;
        }
        if self.days == 0x01FF {
            self.days = 0;
            self.day_carry = true;
        } else {
            self.days += 1;
        }
    }
}

/// Returns true when `field` rolled over from `modulus - 1` to zero.
fn count_up(field: &mut u8, modulus: u8, mask: u8) -> bool {
    if *field == modulus - 1 {
        *field = 0;
        true
    } else {
        *field = (*field + 1) & mask;
        false
    }
}

/// MBC3 real-time clock, counted in emulated machine cycles.
#[derive(Debug, Clone, Default)]
struct RealTimeClock {
    live: ClockTime,
    latched: ClockTime,
    /// Cycles into the current sub-tick.
    prescaler: u32,
    /// Sub-ticks into the current second.
    subticks: u8,
}

impl RealTimeClock {
    fn latch(&mut self) {
        self.latched = self.live;
    }

    fn read(&self, reg: u8) -> u8 {
        self.latched.register(reg)
    }

    /// Writes go to the running clock and are visible in the latched copy
    /// straight away.
    fn write(&mut self, reg: u8, value: u8) {
        self.live.set_register(reg, value);
        if reg == 0x08 {
            self.prescaler = 0;
            self.subticks = 0;
        }
        self.latch();
    }

    fn cycle(&mut self) {
        if self.live.halted {
            return;
        }
        self.prescaler += 1;
        if self.prescaler < RTC_CYCLES_PER_SUBTICK {
            return;
        }
        self.prescaler = 0;
        self.subticks += 1;
        if self.subticks == RTC_SUBTICKS_PER_SECOND {
            self.subticks = 0;
            self.live.tick_second();
        }
    }
}
