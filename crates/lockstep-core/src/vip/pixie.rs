//! CDP1861 video chip.
//!
//! The chip counts 14 machine cycles per line and 262 lines per frame. Its
//! outputs are pure functions of that position: EF1 warns the program that
//! the display window is near, an interrupt two lines ahead of it lets the
//! handler set R0, and during the 128 display lines it pulls 8 bytes per
//! line out of memory by DMA. The request starts at cycle 4 of the line and
//! is held until all 8 bytes have arrived, so an instruction still in flight
//! only delays the burst.

use std::ops::Range;

use crate::device::{DmaStatus, Device, PULL_UP};

pub const CYCLES_PER_LINE: u16 = 14;
pub const LINES_PER_FRAME: u16 = 262;
pub const CYCLES_PER_FRAME: u32 = CYCLES_PER_LINE as u32 * LINES_PER_FRAME as u32;

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 128;

pub const PIXEL_ON: u32 = 0x00FF_FFFF;
pub const PIXEL_OFF: u32 = 0x0000_0000;

const EF1_LINES: [Range<u16>; 2] = [76..80, 204..208];
const INTERRUPT_LINES: Range<u16> = 78..80;
const DISPLAY_LINES: Range<u16> = 80..208;
/// Line cycle at which the DMA-out request goes up.
const DMA_START: u16 = 4;
const BYTES_PER_LINE: usize = DISPLAY_WIDTH / 8;

/// INP/OUT port that switches the display on and off.
pub const DISPLAY_PORT: u8 = 1;

pub struct Pixie {
    enabled: bool,
    line: u16,
    column: u16,
    line_bytes: usize,
    framebuffer: Vec<u32>,
    frame_ready: bool,
}

impl Pixie {
    pub fn new() -> Self {
        Self {
            enabled: false,
            line: 0,
            column: 0,
            line_bytes: 0,
            framebuffer: vec![PIXEL_OFF; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            frame_ready: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// `(line, cycle)` of the machine cycle about to run.
    pub fn position(&self) -> (u16, u16) {
        (self.line, self.column)
    }

    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    /// Returns true once per frame, when the last display line has been drawn.
    pub fn take_frame(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }
}

impl Default for Pixie {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Pixie {
    fn name(&self) -> &'static str {
        "pixie"
    }

    fn cycle(&mut self) {
        self.column += 1;
        if self.column < CYCLES_PER_LINE {
            return;
        }
        self.column = 0;
        self.line_bytes = 0;
        self.line += 1;
        if self.line == LINES_PER_FRAME {
            self.line = 0;
        }
        if self.line == DISPLAY_LINES.end {
            self.frame_ready = true;
        }
    }

    fn dma_status(&self) -> DmaStatus {
        if self.enabled
            && DISPLAY_LINES.contains(&self.line)
            && self.column >= DMA_START
            && self.line_bytes < BYTES_PER_LINE
        {
            DmaStatus::Out
        } else {
            DmaStatus::None
        }
    }

    fn is_interrupting(&self) -> bool {
        self.enabled && INTERRUPT_LINES.contains(&self.line)
    }

    fn do_dma_out(&mut self, value: u8) {
        if !DISPLAY_LINES.contains(&self.line) || self.line_bytes == BYTES_PER_LINE {
            return;
        }
        let row = (self.line - DISPLAY_LINES.start) as usize;
        let start = row * DISPLAY_WIDTH + self.line_bytes * 8;
        for (bit, pixel) in self.framebuffer[start..start + 8].iter_mut().enumerate() {
            *pixel = if value & (0x80 >> bit) != 0 {
                PIXEL_ON
            } else {
                PIXEL_OFF
            };
        }
        self.line_bytes += 1;
    }

    fn is_input_port(&self, port: u8) -> bool {
        port == DISPLAY_PORT
    }

    fn is_output_port(&self, port: u8) -> bool {
        port == DISPLAY_PORT
    }

    fn on_input(&mut self, _port: u8) -> u8 {
        if !self.enabled {
            log::debug!("display on at line {}", self.line);
        }
        self.enabled = true;
        PULL_UP
    }

    fn on_output(&mut self, _port: u8, _value: u8) {
        if self.enabled {
            log::debug!("display off at line {}", self.line);
            self.framebuffer.fill(PIXEL_OFF);
        }
        self.enabled = false;
    }

    fn ef_lines(&self) -> u8 {
        EF1_LINES.iter().any(|w| w.contains(&self.line)) as u8
    }
}
