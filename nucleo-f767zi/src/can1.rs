//! CAN1 peripheral binding: register block, pins, clock and interrupts.
//!
//! The service itself is hardware-agnostic; this module owns everything the
//! F767 needs around it. Bind the four handlers with
//! `embassy_stm32::bind_interrupts!` and pass the resulting struct to
//! [`init`].

use embassy_stm32::interrupt::typelevel::{self, Binding, Handler, Interrupt};
use embassy_stm32::{Peri, can, gpio, pac, peripherals, rcc};
use rtcan::{DefaultService, IsrBinding, RxFifo};
use rtcan_stm32f7::{BxcanDriver, bxcan};

/// The CAN1 register block, owned after [`init`].
pub struct Can1 {
    _private: (),
}

unsafe impl bxcan::Instance for Can1 {
    const REGISTERS: *mut bxcan::RegisterBlock = 0x4000_6400 as *mut _;
}

unsafe impl bxcan::MasterInstance for Can1 {}

unsafe impl bxcan::FilterOwner for Can1 {
    /// F767 parts have 28 filter banks, shared with CAN2.
    const NUM_FILTER_BANKS: u8 = 28;
}

pub type CanService = DefaultService<BxcanDriver<Can1>>;

/// Interrupt-side handle to the placed service.
pub static CAN1_SERVICE: IsrBinding<CanService> = IsrBinding::new();

/// Claims CAN1, routes its pins and unmasks its interrupt lines.
///
/// The returned instance feeds [`BxcanDriver::new`]; afterwards place the
/// service and hand it to the handlers with [`CAN1_SERVICE`]`.bind`.
pub fn init(
    _instance: Peri<'static, peripherals::CAN1>,
    rx: Peri<'static, impl can::RxPin<peripherals::CAN1>>,
    tx: Peri<'static, impl can::TxPin<peripherals::CAN1>>,
    _irqs: impl Binding<typelevel::CAN1_RX0, Rx0InterruptHandler>
    + Binding<typelevel::CAN1_RX1, Rx1InterruptHandler>
    + Binding<typelevel::CAN1_TX, TxInterruptHandler>
    + Binding<typelevel::CAN1_SCE, SceInterruptHandler>,
) -> Can1 {
    let rx_af_num = rx.af_num();
    let mut rx_pin = gpio::Flex::new(rx);
    rx_pin.set_as_af_unchecked(rx_af_num, gpio::AfType::input(gpio::Pull::None));

    let tx_af_num = tx.af_num();
    let mut tx_pin = gpio::Flex::new(tx);
    tx_pin.set_as_af_unchecked(
        tx_af_num,
        gpio::AfType::output(gpio::OutputType::PushPull, gpio::Speed::VeryHigh),
    );
    // The pins stay in alternate function for the life of the program.
    core::mem::forget((rx_pin, tx_pin));

    rcc::enable_and_reset::<peripherals::CAN1>();

    unsafe {
        typelevel::CAN1_RX0::unpend(); // Not unsafe
        typelevel::CAN1_RX0::enable();
        typelevel::CAN1_RX1::unpend(); // Not unsafe
        typelevel::CAN1_RX1::enable();
        typelevel::CAN1_TX::unpend(); // Not unsafe
        typelevel::CAN1_TX::enable();
        typelevel::CAN1_SCE::unpend(); // Not unsafe
        typelevel::CAN1_SCE::enable();
    }

    Can1 { _private: () }
}

/// FIFO 0 message-pending handler. Bind to `CAN1_RX0`.
pub struct Rx0InterruptHandler;

impl Handler<typelevel::CAN1_RX0> for Rx0InterruptHandler {
    unsafe fn on_interrupt() {
        // Reading the FIFO releases the mailbox and clears the request.
        CAN1_SERVICE.with(|service| service.handle_rx_isr(RxFifo::Fifo0));
    }
}

/// FIFO 1 message-pending handler. Bind to `CAN1_RX1`.
pub struct Rx1InterruptHandler;

impl Handler<typelevel::CAN1_RX1> for Rx1InterruptHandler {
    unsafe fn on_interrupt() {
        CAN1_SERVICE.with(|service| service.handle_rx_isr(RxFifo::Fifo1));
    }
}

/// Transmit-complete handler. Bind to `CAN1_TX`.
pub struct TxInterruptHandler;

impl Handler<typelevel::CAN1_TX> for TxInterruptHandler {
    unsafe fn on_interrupt() {
        let tsr = pac::CAN1.tsr().read();
        for mailbox in 0..3 {
            if tsr.rqcp(mailbox) {
                // Write-one-to-clear; the other mailbox flags stay set.
                pac::CAN1.tsr().write(|w| w.set_rqcp(mailbox, true));
                CAN1_SERVICE.with(|service| service.handle_tx_complete_isr());
            }
        }
    }
}

/// Status-change and error handler. Bind to `CAN1_SCE`.
pub struct SceInterruptHandler;

impl Handler<typelevel::CAN1_SCE> for SceInterruptHandler {
    unsafe fn on_interrupt() {
        // ERRI is write-one-to-clear; the line refires until it is.
        pac::CAN1.msr().write(|w| w.set_erri(true));
        CAN1_SERVICE.with(|service| service.handle_error_isr());
    }
}
