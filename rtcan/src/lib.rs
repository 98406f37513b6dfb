#![no_std]
//! Real-time CAN frame router for bxCAN-class controllers.
//!
//! The service bridges interrupt-context reception with task-context
//! delivery. Received frames are stored once in a fixed pool and fanned out
//! to any number of subscriber queues as reference-counted handles; queued
//! transmissions are paced by the controller's three hardware mailboxes.
//!
//! ```text
//!   transmit path                        receive path
//!
//!   transmit()                           RX FIFO interrupt
//!       |                                    | claim free slot,
//!       v                                    | store frame
//!   [tx queue]                               v
//!       |                                [ready queue]
//!       v                                    |
//!   tx worker <-- [mailbox permits] <-+      v
//!       |                             |  rx worker -- registry: id -> chain
//!       v                             |      | set holder count,
//!   Driver::transmit                  |      | fan out FrameRef handles
//!       |                             |      v
//!       v                             |  [subscriber inboxes]
//!   CAN controller -- TX-complete ----+      |
//!                     interrupt              | consume()
//!                                            v
//!                                        [free list] --> RX FIFO interrupt
//! ```
//!
//! # Components
//!
//! - [`Service`]: queues, pool, registry and faults behind one `&self` API;
//!   sized by const generics, [`DefaultService`] for the stock sizes.
//! - [`TxRunner`] / [`RxRunner`]: the two workers, returned by
//!   [`Service::start`] and spawned by the application.
//! - [`Driver`]: the controller contract (`rtcan-driver`), implemented for
//!   bxCAN peripherals by `rtcan-stm32f7`.
//! - [`IsrBinding`]: hands the placed service to raw interrupt handlers.
//!
//! # Concurrency model
//!
//! Interrupt entry points only perform non-blocking channel operations and
//! short critical sections. The workers wait with bounded timeouts and
//! re-check the running flag, so [`Service::stop`] takes effect within one
//! poll interval. Frames sharing an identifier reach subscribers in hardware
//! arrival order. The holder count of a pooled slot is the only state shared
//! with arbitrary subscriber tasks; it is atomic, set once before the first
//! delivery and decremented with acquire/release ordering on consumption.
//!
//! # Limitations
//!
//! - Classic CAN only; no CAN FD frame format.
//! - Every bounded structure drops the newest element on overflow and
//!   latches a [`Fault`] instead of blocking.
//! - A [`FrameRef`] that is dropped without [`Service::consume`] keeps its
//!   pool slot allocated forever.

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod config;
mod error;
mod pool;
mod registry;
mod service;

pub use config::Config;
pub use error::{Error, Fault, FaultSet, FaultSetIterator};
pub use pool::FrameRef;
pub use registry::{Inbox, InboxChannel};
pub use service::{DefaultService, IsrBinding, RxRunner, Service, TxRunner};

pub use rtcan_driver::driver::{Bitrate, Driver, DriverError, FILTER_BANK_COUNT, TX_MAILBOX_COUNT};
pub use rtcan_driver::filter::{Filter, RxFifo};
pub use rtcan_driver::frame::{CanId, Data, ExtendedId, Frame, StandardId};
pub use rtcan_driver::{driver, filter, frame};

#[cfg(test)]
extern crate std;
