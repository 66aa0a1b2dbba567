//! Cycle-stepped emulation of two 8-bit machines: a COSMAC VIP class
//! computer built around the CDP1802, and a DMG class handheld built around
//! the SM83.
//!
//! Every machine advances one CPU machine cycle at a time. Peripherals are
//! stepped right after the CPU in a fixed order, and the CPU picks its next
//! state from the interrupt and DMA signals they report. Frontends drive a
//! machine through the [`emulator::Emulator`] trait and plug in their own
//! sinks from [`sink`].

/// Byte-wide memory bus shared by both CPU cores.
pub mod bus;

/// Peripheral capabilities and the fixed-order arbiter that polls them.
pub mod device;

/// Frame driver shared by both machines.
pub mod emulator;

/// Error type for fatal emulation faults.
pub mod error;

/// DMG class handheld: SM83 CPU, memory map, video, sound, timer and cartridges.
pub mod gb;

/// Hardware revisions and machine options.
pub mod hardware;

/// Video, audio, key and ROM endpoints supplied by the frontend.
pub mod sink;

/// COSMAC VIP class computer: CDP1802 CPU, Pixie video, keypad and tone.
pub mod vip;

pub use emulator::{Emulator, FrameOutcome};
pub use error::{Arch, EmuError, Result};
