//! Frame driver interface shared by both machines.

use crate::error::{EmuError, Result};

/// How a call to [`Emulator::execute_frame`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A full frame worth of machine cycles ran.
    Completed,
    /// The audio sink still holds the previous frame; nothing ran.
    Paced,
    /// The machine was closed; nothing ran.
    Closed,
}

/// A machine that can be driven one frame or one cycle at a time.
pub trait Emulator {
    /// Machine cycles in one video frame.
    fn cycles_per_frame(&self) -> u32;

    /// Run one frame: latch input, execute [`cycles_per_frame`](Self::cycles_per_frame)
    /// machine cycles, then flush audio.
    ///
    /// A fault aborts the frame and is returned again by every later call.
    fn execute_frame(&mut self) -> Result<FrameOutcome>;

    /// Run exactly one machine cycle.
    fn execute_cycle(&mut self) -> Result<()>;

    /// Instructions retired since the previous call. Reading resets the count.
    fn current_instructions_per_frame(&mut self) -> u64;

    /// Stop the machine. Calling this more than once is harmless.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Bookkeeping both machines share: the sticky fault, the closed flag and
/// the retired instruction counter.
#[derive(Debug, Default)]
pub(crate) struct Session {
    fault: Option<EmuError>,
    closed: bool,
    instructions: u64,
}

impl Session {
    pub(crate) fn check(&self) -> Result<()> {
        match &self.fault {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Latch a fault so later calls keep returning it.
    pub(crate) fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if self.fault.is_none() {
                log::error!("emulation halted: {err}");
            }
            self.fault = Some(err.clone());
        }
        result
    }

    pub(crate) fn retire(&mut self) {
        self.instructions += 1;
    }

    pub(crate) fn take_instructions(&mut self) -> u64 {
        std::mem::take(&mut self.instructions)
    }

    pub(crate) fn close(&mut self) {
        if !self.closed {
            log::info!("machine closed");
        }
        self.closed = true;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}
