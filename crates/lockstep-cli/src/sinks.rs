//! File-backed frontends for headless runs.

use std::cell::Cell;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread::{self, JoinHandle};

use crossbeam_channel as cb;
use lockstep_core::sink::{AudioSink, Frame, VideoSink};

use crate::error::{CliError, Result};

/// Frames in flight between the machine and the writer thread.
const FRAME_QUEUE: usize = 2;

struct OwnedFrame {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

/// Video sink that forwards every presented frame to a writer thread.
pub struct ChannelVideo {
    tx: cb::Sender<OwnedFrame>,
}

impl VideoSink for ChannelVideo {
    fn present(&mut self, frame: Frame<'_>) {
        let owned = OwnedFrame {
            width: frame.width,
            height: frame.height,
            pixels: frame.pixels.to_vec(),
        };
        if self.tx.send(owned).is_err() {
            log::warn!("screenshot writer is gone; dropping frame");
        }
    }
}

/// Keeps the most recent frame and saves it as PNG once the sending side
/// is dropped.
pub struct ScreenshotWriter {
    handle: JoinHandle<Result<bool>>,
}

impl ScreenshotWriter {
    pub fn spawn(path: PathBuf) -> (ChannelVideo, ScreenshotWriter) {
        let (tx, rx) = cb::bounded::<OwnedFrame>(FRAME_QUEUE);
        let handle = thread::spawn(move || {
            let Some(last) = rx.iter().last() else {
                log::warn!("no frame was presented; {} not written", path.display());
                return Ok(false);
            };
            write_png(&path, &last)?;
            log::info!("wrote {}x{} screenshot to {}", last.width, last.height, path.display());
            Ok(true)
        });
        (ChannelVideo { tx }, ScreenshotWriter { handle })
    }

    /// Wait for the writer. Returns whether a file was written.
    pub fn finish(self) -> Result<bool> {
        self.handle.join().map_err(|_| CliError::WriterPanicked)?
    }
}

fn frame_to_rgb(pixels: &[u32]) -> Vec<u8> {
    pixels
        .iter()
        .flat_map(|&px| [(px >> 16) as u8, (px >> 8) as u8, px as u8])
        .collect()
}

fn write_png(path: &std::path::Path, frame: &OwnedFrame) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(file, frame.width as u32, frame.height as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame_to_rgb(&frame.pixels))?;
    writer.finish()?;
    Ok(())
}

/// Running totals an [`AudioCounter`] shares with the caller.
#[derive(Clone, Debug, Default)]
pub struct AudioStats {
    frames: Rc<Cell<u64>>,
    samples: Rc<Cell<u64>>,
}

impl AudioStats {
    /// Per-frame buffers received.
    pub fn frames(&self) -> u64 {
        self.frames.get()
    }

    /// Sample points received, counted per channel.
    pub fn samples(&self) -> u64 {
        self.samples.get()
    }
}

/// Audio sink that accepts every buffer and only counts it.
pub struct AudioCounter {
    sample_rate: u32,
    samples_per_frame: usize,
    stats: AudioStats,
}

impl AudioCounter {
    /// A sink at `sample_rate` for a machine presenting `frame_rate` frames
    /// per second.
    pub fn new(sample_rate: u32, frame_rate: f64) -> Self {
        let samples_per_frame = (f64::from(sample_rate) / frame_rate).round().max(1.0) as usize;
        Self {
            sample_rate,
            samples_per_frame,
            stats: AudioStats::default(),
        }
    }

    pub fn stats(&self) -> AudioStats {
        self.stats.clone()
    }
}

impl AudioSink for AudioCounter {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    fn submit(&mut self, samples: &[u8], channels: usize) {
        let points = samples.len() / channels.max(1);
        if points != self.samples_per_frame {
            log::debug!(
                "audio buffer of {points} samples, expected {}",
                self.samples_per_frame
            );
        }
        self.stats.frames.set(self.stats.frames.get() + 1);
        self.stats.samples.set(self.stats.samples.get() + points as u64);
    }
}
