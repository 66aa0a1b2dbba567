//! Frontend endpoints.
//!
//! A machine never talks to a window, speaker or keyboard directly. It hands
//! finished frames to a [`VideoSink`], per-frame audio to an [`AudioSink`] and
//! polls a [`KeySource`] once per frame. Null implementations are provided for
//! headless runs.

/// Offset of the cartridge type byte in a DMG ROM header.
pub const CARTRIDGE_TYPE_OFFSET: usize = 0x0147;
/// Offset of the ROM size code in a DMG ROM header.
pub const ROM_SIZE_OFFSET: usize = 0x0148;
/// Offset of the RAM size code in a DMG ROM header.
pub const RAM_SIZE_OFFSET: usize = 0x0149;

/// One finished picture, `width * height` pixels in `0x00RRGGBB` form.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub width: usize,
    pub height: usize,
    pub pixels: &'a [u32],
}

pub trait VideoSink {
    fn present(&mut self, frame: Frame<'_>);
}

pub trait AudioSink {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Sample points per channel the sink expects for each emulated frame.
    fn samples_per_frame(&self) -> usize;

    /// `false` while the sink still has a full frame queued. The frame driver
    /// reports [`FrameOutcome::Paced`](crate::emulator::FrameOutcome::Paced)
    /// instead of running ahead.
    fn ready_for_frame(&self) -> bool {
        true
    }

    /// Interleaved unsigned 8-bit samples centred on 128.
    fn submit(&mut self, samples: &[u8], channels: usize);
}

/// Current state of the machine's keys, indexed by platform-specific key number.
pub trait KeySource {
    fn is_pressed(&self, key: usize) -> bool;
}

/// A ROM image plus the header fields needed to pick a cartridge mapper.
pub trait RomSource {
    fn bytes(&self) -> &[u8];

    fn cartridge_type(&self) -> u8 {
        self.bytes().get(CARTRIDGE_TYPE_OFFSET).copied().unwrap_or(0)
    }

    fn rom_size(&self) -> u8 {
        self.bytes().get(ROM_SIZE_OFFSET).copied().unwrap_or(0)
    }

    fn ram_size(&self) -> u8 {
        self.bytes().get(RAM_SIZE_OFFSET).copied().unwrap_or(0)
    }
}

impl RomSource for [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl RomSource for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
}

/// Discards every frame.
#[derive(Default)]
pub struct NullVideo;

impl VideoSink for NullVideo {
    fn present(&mut self, _frame: Frame<'_>) {}
}

/// Accepts and discards audio at a fixed rate.
pub struct NullAudio {
    pub sample_rate: u32,
    pub samples_per_frame: usize,
}

impl Default for NullAudio {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            samples_per_frame: 735,
        }
    }
}

impl AudioSink for NullAudio {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    fn submit(&mut self, _samples: &[u8], _channels: usize) {}
}

/// No key is ever pressed.
#[derive(Default)]
pub struct NoKeys;

impl KeySource for NoKeys {
    fn is_pressed(&self, _key: usize) -> bool {
        false
    }
}

/// Nearest-neighbour resample of interleaved `input` to `frames` sample
/// points per channel, appended to `out`.
///
/// An empty input produces silence (128).
pub fn resample_nearest(input: &[u8], channels: usize, frames: usize, out: &mut Vec<u8>) {
    let channels = channels.max(1);
    let in_frames = input.len() / channels;
    out.reserve(frames * channels);
    if in_frames == 0 {
        out.resize(out.len() + frames * channels, 128);
        return;
    }
    for i in 0..frames {
        let src = i * in_frames / frames.max(1);
        out.extend_from_slice(&input[src * channels..src * channels + channels]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_picks_nearest_source_frame() {
        let input = [10, 11, 20, 21, 30, 31, 40, 41];
        let mut out = Vec::new();
        resample_nearest(&input, 2, 2, &mut out);
        assert_eq!(out, vec![10, 11, 30, 31]);

        out.clear();
        resample_nearest(&input, 2, 8, &mut out);
        assert_eq!(out.len(), 16);
        assert_eq!(&out[..4], &[10, 11, 10, 11]);
        assert_eq!(&out[14..], &[40, 41]);
    }

    #[test]
    fn resample_of_nothing_is_silence() {
        let mut out = Vec::new();
        resample_nearest(&[], 1, 4, &mut out);
        assert_eq!(out, vec![128; 4]);
    }

    #[test]
    fn header_fields_default_to_zero_on_short_images() {
        let rom = vec![0u8; 0x100];
        assert_eq!(rom.cartridge_type(), 0);
        let mut rom = vec![0u8; 0x150];
        rom[CARTRIDGE_TYPE_OFFSET] = 0x13;
        rom[ROM_SIZE_OFFSET] = 0x05;
        rom[RAM_SIZE_OFFSET] = 0x03;
        assert_eq!((rom.cartridge_type(), rom.rom_size(), rom.ram_size()), (0x13, 0x05, 0x03));
    }
}
