#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// DMG hardware revision.
///
/// Selects the register values the machine starts with when no boot ROM is
/// supplied.
pub enum DmgRevision {
    Rev0,
    RevA,
    RevB,
    #[default]
    RevC,
}

/// CPU register file left behind by a boot ROM: A, F, B, C, D, E, H, L.
pub type PostBootRegisters = [u8; 8];

impl DmgRevision {
    /// Register values after the boot ROM hands over to the cartridge at 0x0100.
    pub const fn post_boot_registers(self) -> PostBootRegisters {
        match self {
            DmgRevision::Rev0 => [0x01, 0x00, 0xFF, 0x13, 0x00, 0xC1, 0x84, 0x03],
            _ => [0x01, 0xB0, 0x00, 0x13, 0x00, 0xD8, 0x01, 0x4D],
        }
    }

    /// Internal 16-bit divider value at hand-over.
    pub const fn post_boot_div(self) -> u16 {
        match self {
            DmgRevision::Rev0 => 0x1830,
            _ => 0xABCC,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// RAM fitted to a VIP board. Smaller sizes mirror across the lower half of
/// the address space.
pub enum VipMemory {
    #[default]
    Kib2,
    Kib4,
}

impl VipMemory {
    pub const fn bytes(self) -> usize {
        match self {
            VipMemory::Kib2 => 0x0800,
            VipMemory::Kib4 => 0x1000,
        }
    }
}
