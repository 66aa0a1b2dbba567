//! Peripheral capabilities and arbitration.
//!
//! A peripheral implements [`Device`] and overrides only the capabilities it
//! has; everything else defaults to "not present". The [`Arbiter`] owns the
//! peripherals of one machine in a fixed order, steps them once per machine
//! cycle, and folds their interrupt, DMA and I/O answers into the signals the
//! CPU looks at when choosing its next state.

/// Value read from a data bus nobody drives.
pub const PULL_UP: u8 = 0xFF;

/// DMA request raised by a peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DmaStatus {
    #[default]
    None,
    /// Peripheral wants to write a byte into memory.
    In,
    /// Peripheral wants to be handed a byte from memory.
    Out,
}

/// Per-cycle summary of what the peripherals are asking of the CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Signals {
    pub interrupt: bool,
    pub dma: DmaStatus,
}

/// A peripheral attached to the CPU.
pub trait Device {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Advance one machine cycle.
    fn cycle(&mut self) {}

    fn dma_status(&self) -> DmaStatus {
        DmaStatus::None
    }

    fn is_interrupting(&self) -> bool {
        false
    }

    /// Supply the byte for a DMA-in cycle.
    fn do_dma_in(&mut self) -> u8 {
        PULL_UP
    }

    /// Accept the byte read during a DMA-out cycle.
    fn do_dma_out(&mut self, _value: u8) {}

    fn is_input_port(&self, _port: u8) -> bool {
        false
    }

    fn is_output_port(&self, _port: u8) -> bool {
        false
    }

    fn on_input(&mut self, _port: u8) -> u8 {
        PULL_UP
    }

    fn on_output(&mut self, _port: u8, _value: u8) {}

    /// External flag lines driven by this device, EF1 in bit 0 through EF4 in bit 3.
    fn ef_lines(&self) -> u8 {
        0
    }

    /// The CPU's Q output changed level.
    fn on_q(&mut self, _q: bool) {}
}

impl<T: Device + ?Sized> Device for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn cycle(&mut self) {
        (**self).cycle()
    }
    fn dma_status(&self) -> DmaStatus {
        (**self).dma_status()
    }
    fn is_interrupting(&self) -> bool {
        (**self).is_interrupting()
    }
    fn do_dma_in(&mut self) -> u8 {
        (**self).do_dma_in()
    }
    fn do_dma_out(&mut self, value: u8) {
        (**self).do_dma_out(value)
    }
    fn is_input_port(&self, port: u8) -> bool {
        (**self).is_input_port(port)
    }
    fn is_output_port(&self, port: u8) -> bool {
        (**self).is_output_port(port)
    }
    fn on_input(&mut self, port: u8) -> u8 {
        (**self).on_input(port)
    }
    fn on_output(&mut self, port: u8, value: u8) {
        (**self).on_output(port, value)
    }
    fn ef_lines(&self) -> u8 {
        (**self).ef_lines()
    }
    fn on_q(&mut self, q: bool) {
        (**self).on_q(q)
    }
}

/// Ordered list of peripherals.
///
/// Order matters: it is the stepping order and the priority order. When two
/// devices claim the same port or request the same kind of DMA, the one that
/// comes first wins.
pub struct Arbiter<D> {
    devices: Vec<D>,
}

impl<D: Device> Arbiter<D> {
    pub fn new(devices: Vec<D>) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &[D] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [D] {
        &mut self.devices
    }

    /// Step every device once, in list order.
    pub fn cycle(&mut self) {
        for device in &mut self.devices {
            device.cycle();
        }
    }

    pub fn any_interrupting(&self) -> bool {
        self.devices.iter().any(|d| d.is_interrupting())
    }

    /// Highest-priority DMA request. `In` outranks `Out`.
    pub fn dma_status(&self) -> DmaStatus {
        let mut status = DmaStatus::None;
        for device in &self.devices {
            match device.dma_status() {
                DmaStatus::In => return DmaStatus::In,
                DmaStatus::Out => status = DmaStatus::Out,
                DmaStatus::None => {}
            }
        }
        status
    }

    pub fn signals(&self) -> Signals {
        Signals {
            interrupt: self.any_interrupting(),
            dma: self.dma_status(),
        }
    }

    /// Read from an input port. Unclaimed ports float high.
    pub fn dispatch_input(&mut self, port: u8) -> u8 {
        match self.devices.iter_mut().find(|d| d.is_input_port(port)) {
            Some(device) => device.on_input(port),
            None => {
                log::trace!("input port {port} unclaimed");
                PULL_UP
            }
        }
    }

    /// Write to an output port. Unclaimed writes are dropped.
    pub fn dispatch_output(&mut self, port: u8, value: u8) {
        match self.devices.iter_mut().find(|d| d.is_output_port(port)) {
            Some(device) => device.on_output(port, value),
            None => log::trace!("output port {port} unclaimed ({value:#04x})"),
        }
    }

    pub fn do_dma_in(&mut self) -> u8 {
        self.devices
            .iter_mut()
            .find(|d| d.dma_status() == DmaStatus::In)
            .map_or(PULL_UP, |d| d.do_dma_in())
    }

    pub fn do_dma_out(&mut self, value: u8) {
        if let Some(device) = self
            .devices
            .iter_mut()
            .find(|d| d.dma_status() == DmaStatus::Out)
        {
            device.do_dma_out(value);
        }
    }

    pub fn ef_lines(&self) -> u8 {
        self.devices.iter().fold(0, |acc, d| acc | d.ef_lines()) & 0x0F
    }

    pub fn set_q(&mut self, q: bool) {
        for device in &mut self.devices {
            device.on_q(q);
        }
    }
}
