use std::fmt;

use thiserror::Error;

/// Instruction set a decode fault came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    Cdp1802,
    Sm83,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::Cdp1802 => f.write_str("CDP1802"),
            Arch::Sm83 => f.write_str("SM83"),
        }
    }
}

/// Faults that end an emulation session.
///
/// None of these are recoverable: the machine that raised one keeps
/// returning it until it is rebuilt.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EmuError {
    /// The CPU fetched an opcode its instruction set does not define.
    #[error("{arch}: invalid opcode {opcode:#04x} at {address:#06x}")]
    InvalidInstruction { arch: Arch, opcode: u8, address: u16 },

    /// A peripheral was asked to decode an address outside its register window.
    #[error("{device} does not decode address {address:#06x}")]
    InvalidAddress {
        device: &'static str,
        address: u16,
    },

    /// The cartridge header names a mapper or size combination that is not emulated.
    #[error(
        "unsupported cartridge: type {cartridge_type:#04x}, ROM size code {rom_size:#04x}, RAM size code {ram_size:#04x}"
    )]
    UnsupportedCartridge {
        cartridge_type: u8,
        rom_size: u8,
        ram_size: u8,
    },
}

pub type Result<T> = std::result::Result<T, EmuError>;
