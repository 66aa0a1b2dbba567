mod error;
mod profile;
mod sinks;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lockstep_core::gb::{self, GameBoy, GameBoyOptions};
use lockstep_core::vip::{self, Vip};
use lockstep_core::{Emulator, FrameOutcome};

use error::{CliError, Result, read_file};
use profile::{Overrides, Platform, Ram, Revision, RunProfile};
use sinks::{AudioCounter, ScreenshotWriter};

const TELEMETRY_INTERVAL: u64 = 60;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless runner for the COSMAC VIP and DMG cores")]
struct Args {
    /// Cartridge image (gb) or program loaded at 0x0000 (vip)
    rom: Option<PathBuf>,

    /// Machine to emulate
    #[arg(long, value_enum)]
    platform: Option<Platform>,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u64>,

    /// Save the last presented frame as PNG
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// TOML run profile; flags override its keys
    #[arg(long)]
    profile: Option<PathBuf>,

    /// VIP monitor ROM. Without one the program starts straight from RAM
    #[arg(long = "monitor")]
    monitor_rom: Option<PathBuf>,

    /// DMG boot ROM to run before the cartridge
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// DMG revision whose post-boot state is used when no boot ROM is given
    #[arg(long, value_enum)]
    revision: Option<Revision>,

    /// RAM fitted to the VIP
    #[arg(long, value_enum)]
    ram: Option<Ram>,

    /// Audio sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            platform: self.platform,
            rom: self.rom.clone(),
            frames: self.frames,
            sample_rate: self.sample_rate,
            revision: self.revision,
            ram: self.ram,
            boot_rom: self.bootrom.clone(),
            monitor_rom: self.monitor_rom.clone(),
            screenshot: self.screenshot.clone(),
        }
    }
}

enum Machine {
    Gb(Box<GameBoy>),
    Vip(Box<Vip>),
}

impl Machine {
    fn build(profile: &RunProfile) -> Result<Self> {
        let rom_path = profile.rom.as_deref().ok_or(CliError::MissingRom)?;
        let rom = read_file(rom_path)?;
        log::info!("loaded {} ({} bytes)", rom_path.display(), rom.len());

        match profile.platform {
            Platform::Gb => {
                let boot_rom = profile.boot_rom.as_deref().map(read_file).transpose()?;
                let options = GameBoyOptions {
                    revision: profile.revision.into(),
                    boot_rom,
                };
                Ok(Machine::Gb(Box::new(GameBoy::new(&rom, options)?)))
            }
            Platform::Vip => {
                let monitor = profile.monitor_rom.as_deref().map(read_file).transpose()?;
                let mut vip = Vip::new(monitor.as_deref().unwrap_or(&[]), profile.ram.into());
                vip.memory.load_ram(0, &rom);
                if monitor.is_none() {
                    vip.memory.clear_latch();
                }
                Ok(Machine::Vip(Box::new(vip)))
            }
        }
    }

    fn frame_rate(&self) -> f64 {
        match self {
            Machine::Gb(_) => {
                f64::from(gb::CYCLES_PER_SECOND) / f64::from(gb::CYCLES_PER_FRAME)
            }
            Machine::Vip(_) => {
                f64::from(vip::CYCLES_PER_SECOND) / f64::from(vip::CYCLES_PER_FRAME)
            }
        }
    }

    fn emulator(&mut self) -> &mut dyn Emulator {
        match self {
            Machine::Gb(gb) => gb.as_mut(),
            Machine::Vip(vip) => vip.as_mut(),
        }
    }

    fn attach(&mut self, audio: AudioCounter, video: Option<sinks::ChannelVideo>) {
        match self {
            Machine::Gb(gb) => {
                gb.set_audio_sink(Box::new(audio));
                if let Some(video) = video {
                    gb.set_video_sink(Box::new(video));
                }
            }
            Machine::Vip(vip) => {
                vip.set_audio_sink(Box::new(audio));
                if let Some(video) = video {
                    vip.set_video_sink(Box::new(video));
                }
            }
        }
    }

    fn take_serial(&mut self) -> Vec<u8> {
        match self {
            Machine::Gb(gb) => gb.mmu.serial.take_output(),
            Machine::Vip(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RunReport {
    frames: u64,
    audio_samples: u64,
    serial: Vec<u8>,
    screenshot_written: bool,
}

fn drive(emu: &mut dyn Emulator, frames: u64) -> Result<u64> {
    let mut completed = 0;
    while completed < frames {
        match emu.execute_frame()? {
            FrameOutcome::Completed => {
                completed += 1;
                let ipf = emu.current_instructions_per_frame();
                if completed % TELEMETRY_INTERVAL == 0 {
                    log::info!("frame {completed}: {ipf} instructions");
                } else {
                    log::debug!("frame {completed}: {ipf} instructions");
                }
            }
            FrameOutcome::Paced => std::thread::yield_now(),
            FrameOutcome::Closed => break,
        }
    }
    Ok(completed)
}

fn run(profile: &RunProfile) -> Result<RunReport> {
    let mut machine = Machine::build(profile)?;

    let audio = AudioCounter::new(profile.sample_rate, machine.frame_rate());
    let stats = audio.stats();
    let (video, writer) = match &profile.screenshot {
        Some(path) => {
            let (video, writer) = ScreenshotWriter::spawn(path.clone());
            (Some(video), Some(writer))
        }
        None => (None, None),
    };
    machine.attach(audio, video);

    let driven = drive(machine.emulator(), profile.frames);
    machine.emulator().close();
    let serial = machine.take_serial();
    // Dropping the machine drops the video sender and lets the writer finish.
    drop(machine);
    let screenshot_written = match writer {
        Some(writer) => writer.finish()?,
        None => false,
    };

    Ok(RunReport {
        frames: driven?,
        audio_samples: stats.samples(),
        serial,
        screenshot_written,
    })
}

fn escape_serial(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' || b == b'\n' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02X}"));
        }
    }
    out
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut profile = match args.profile.as_deref() {
        Some(path) => match RunProfile::load(path) {
            Ok(profile) => profile,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => RunProfile::default(),
    };
    profile.apply(args.overrides());

    match run(&profile) {
        Ok(report) => {
            log::info!(
                "ran {} frames, {} audio samples",
                report.frames,
                report.audio_samples
            );
            if !report.serial.is_empty() {
                println!("[SERIAL] {}", escape_serial(&report.serial));
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
