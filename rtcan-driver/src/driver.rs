//! The contract a CAN controller driver implements for the service.

use crate::filter::{Filter, RxFifo};
use crate::frame::Frame;

/// Transmit mailboxes a bxCAN-class controller provides.
pub const TX_MAILBOX_COUNT: usize = 3;

/// Acceptance filter banks available to one controller.
pub const FILTER_BANK_COUNT: usize = 14;

/// Nominal bit rates the service supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bitrate {
    Kbit125,
    Kbit250,
    #[default]
    Kbit500,
    Kbit1000,
}

impl Bitrate {
    pub const fn bits_per_second(self) -> u32 {
        match self {
            Bitrate::Kbit125 => 125_000,
            Bitrate::Kbit250 => 250_000,
            Bitrate::Kbit500 => 500_000,
            Bitrate::Kbit1000 => 1_000_000,
        }
    }
}

/// Errors a driver reports to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// No frame is pending in the polled FIFO.
    Empty,
    /// The controller cannot accept the request right now.
    Busy,
    /// The controller reported a hardware fault.
    Hardware,
}

/// Controller operations the service core drives.
///
/// Methods are called from task context under a critical-section lock and
/// from interrupt handlers, so every implementation must be short and
/// non-blocking.
pub trait Driver {
    /// Applies bit timing and bus mode. The controller stays off the bus
    /// until [`Driver::start`].
    fn configure(&mut self, bitrate: Bitrate, loopback: bool, silent: bool)
    -> Result<(), DriverError>;

    /// Commits acceptance filters to hardware. An empty slice installs a
    /// single accept-everything filter targeting FIFO 0.
    fn apply_filters(&mut self, filters: &[Filter]) -> Result<(), DriverError>;

    /// Unmasks the interrupt sources the service relies on: transmit mailbox
    /// empty, FIFO message pending, error conditions.
    fn enable_notifications(&mut self) -> Result<(), DriverError>;

    /// Masks the sources unmasked by [`Driver::enable_notifications`].
    fn disable_notifications(&mut self);

    /// Brings the controller onto the bus.
    fn start(&mut self) -> Result<(), DriverError>;

    /// Takes the controller off the bus. Pending mailboxes are abandoned.
    fn stop(&mut self);

    /// Hands one frame to a free transmit mailbox.
    fn transmit(&mut self, frame: &Frame) -> Result<(), DriverError>;

    /// Pops the next pending frame, [`DriverError::Empty`] when there is none.
    fn receive(&mut self, fifo: RxFifo) -> Result<Frame, DriverError>;

    /// Resets latched error state after an error interrupt.
    fn clear_errors(&mut self);
}
