use bxcan::filter::Mask32;
use bxcan::{Can, Fifo, FilterOwner, Instance, Interrupts};
use rtcan_driver::driver::{Bitrate, Driver, DriverError, FILTER_BANK_COUNT};
use rtcan_driver::filter::{Filter, RxFifo};
use rtcan_driver::frame::{CanId, Data, ExtendedId, Frame, StandardId};

/// Bit timing: 1 sync + `SEG1` + `SEG2` time quanta per bit, sample point
/// at 14/18.
const SEG1: u32 = 13;
const SEG2: u32 = 4;
const SYNC_JUMP_WIDTH: u32 = 1;
const TIME_QUANTA: u32 = 1 + SEG1 + SEG2;

/// Encodes the BTR timing fields for `bitrate`, `None` when the prescaler
/// leaves the 1..=1024 hardware range.
fn bit_timing(can_clock: u32, bitrate: Bitrate) -> Option<u32> {
    let prescaler = can_clock / (bitrate.bits_per_second() * TIME_QUANTA);
    if prescaler == 0 || prescaler > 1024 {
        return None;
    }
    Some(
        (SYNC_JUMP_WIDTH - 1) << 24 | (SEG2 - 1) << 20 | (SEG1 - 1) << 16 | (prescaler - 1),
    )
}

fn to_bxcan_id(id: CanId) -> bxcan::Id {
    match id {
        // Safety: service identifiers are range-checked at construction.
        CanId::Standard(id) => {
            bxcan::Id::Standard(unsafe { bxcan::StandardId::new_unchecked(id.into_bits()) })
        }
        CanId::Extended(id) => {
            bxcan::Id::Extended(unsafe { bxcan::ExtendedId::new_unchecked(id.into_bits()) })
        }
    }
}

fn to_bxcan_frame(frame: &Frame) -> bxcan::Frame {
    let id = to_bxcan_id(frame.id());
    if frame.is_remote() {
        // DLC is within 0..=8 by construction, so this cannot panic.
        bxcan::Frame::new_remote(id, frame.dlc() as u8)
    } else {
        let data = bxcan::Data::new(frame.data()).unwrap_or_else(bxcan::Data::empty);
        bxcan::Frame::new_data(id, data)
    }
}

fn from_bxcan_frame(frame: &bxcan::Frame) -> Frame {
    let id = match frame.id() {
        bxcan::Id::Standard(id) => CanId::Standard(StandardId::from_bits_truncating(id.as_raw())),
        bxcan::Id::Extended(id) => CanId::Extended(ExtendedId::from_bits_truncating(id.as_raw())),
    };
    if frame.is_remote_frame() {
        // Remote DLC comes straight off the wire and may exceed 8.
        let dlc = (frame.dlc() as usize).min(Data::MAX_LENGTH);
        Frame::new_remote(id, dlc).unwrap_or_else(|| Frame::new(id, Data::EMPTY))
    } else {
        let bytes = frame.data().map_or(&[][..], |data| &data[..]);
        Frame::new(id, Data::new(bytes).unwrap_or(Data::EMPTY))
    }
}

fn to_bxcan_fifo(fifo: RxFifo) -> Fifo {
    match fifo {
        RxFifo::Fifo0 => Fifo::Fifo0,
        RxFifo::Fifo1 => Fifo::Fifo1,
    }
}

fn bank_config(filter: &Filter) -> Mask32 {
    match filter.id {
        // Safety: masks are truncated to the identifier width, which the
        // bxcan id types accept by definition.
        CanId::Standard(id) => Mask32::frames_with_std_id(unsafe {
            bxcan::StandardId::new_unchecked(id.into_bits())
        }, unsafe {
            bxcan::StandardId::new_unchecked(filter.mask as u16 & 0x7FF)
        }),
        CanId::Extended(id) => Mask32::frames_with_ext_id(unsafe {
            bxcan::ExtendedId::new_unchecked(id.into_bits())
        }, unsafe {
            bxcan::ExtendedId::new_unchecked(filter.mask & 0x1FFF_FFFF)
        }),
    }
}

/// [`Driver`] implementation over a bxCAN peripheral.
///
/// `can_clock` is the frequency feeding the controller (APB1 kernel clock);
/// the bit-rate prescaler is derived from it at configuration time.
pub struct BxcanDriver<I: Instance> {
    can: Can<I>,
    can_clock: u32,
}

impl<I: Instance + FilterOwner> BxcanDriver<I> {
    /// Wraps `instance`, leaving the peripheral disabled until the service
    /// configures and starts it.
    pub fn new(instance: I, can_clock: u32) -> Self {
        Self {
            can: Can::builder(instance).leave_disabled(),
            can_clock,
        }
    }

    /// Releases the wrapped peripheral.
    pub fn free(self) -> I {
        self.can.free()
    }
}

impl<I: Instance + FilterOwner> Driver for BxcanDriver<I> {
    fn configure(
        &mut self,
        bitrate: Bitrate,
        loopback: bool,
        silent: bool,
    ) -> Result<(), DriverError> {
        let Some(btr) = bit_timing(self.can_clock, bitrate) else {
            return Err(DriverError::Hardware);
        };
        self.can
            .modify_config()
            .set_bit_timing(btr)
            .set_loopback(loopback)
            .set_silent(silent)
            .set_automatic_retransmit(true)
            .leave_disabled();
        Ok(())
    }

    fn apply_filters(&mut self, filters: &[Filter]) -> Result<(), DriverError> {
        if filters.len() > FILTER_BANK_COUNT {
            return Err(DriverError::Hardware);
        }
        let mut banks = self.can.modify_filters();
        banks.clear();
        if filters.is_empty() {
            banks.enable_bank(0, Fifo::Fifo0, Mask32::accept_all());
        } else {
            for (index, filter) in filters.iter().enumerate() {
                banks.enable_bank(index as u8, to_bxcan_fifo(filter.fifo), bank_config(filter));
            }
        }
        Ok(())
    }

    fn enable_notifications(&mut self) -> Result<(), DriverError> {
        // ERROR is a master enable; the per-condition enables sit outside
        // this API and stay at their reset values.
        self.can.enable_interrupts(
            Interrupts::TRANSMIT_MAILBOX_EMPTY
                | Interrupts::FIFO0_MESSAGE_PENDING
                | Interrupts::FIFO1_MESSAGE_PENDING
                | Interrupts::ERROR,
        );
        Ok(())
    }

    fn disable_notifications(&mut self) {
        self.can.disable_interrupts(Interrupts::all());
    }

    fn start(&mut self) -> Result<(), DriverError> {
        // Enabling waits for sync to 11 consecutive recessive bits.
        nb::block!(self.can.enable_non_blocking()).ok();
        Ok(())
    }

    fn stop(&mut self) {
        // Entering init mode freezes the controller; pending mailboxes are
        // abandoned, matching the service's stop contract.
        self.can.modify_config().leave_disabled();
    }

    fn transmit(&mut self, frame: &Frame) -> Result<(), DriverError> {
        match self.can.transmit(&to_bxcan_frame(frame)) {
            Ok(status) => {
                // The service holds one permit per mailbox, so transmission
                // never displaces a pending lower-priority frame.
                debug_assert!(status.dequeued_frame().is_none());
                Ok(())
            }
            Err(nb::Error::WouldBlock) => Err(DriverError::Busy),
            Err(nb::Error::Other(infallible)) => match infallible {},
        }
    }

    fn receive(&mut self, _fifo: RxFifo) -> Result<Frame, DriverError> {
        // bxCAN drains FIFO 0 before FIFO 1 regardless of which interrupt
        // fired; frames are routed by identifier afterwards, so the selector
        // is advisory here.
        match self.can.receive() {
            Ok(frame) => Ok(from_bxcan_frame(&frame)),
            Err(nb::Error::WouldBlock) => Err(DriverError::Empty),
            // FIFO overrun: a frame was lost before this read.
            Err(nb::Error::Other(_)) => Err(DriverError::Hardware),
        }
    }

    fn clear_errors(&mut self) {
        // The wrapper latches no error state and the hardware status
        // register clears itself; nothing to reset.
    }
}
