#![no_std]
//! bxCAN device driver for the `rtcan` service.
//!
//! Wraps [`bxcan::Can`] over any peripheral implementing
//! [`bxcan::Instance`] + [`bxcan::FilterOwner`] and implements the service's
//! [`Driver`](rtcan_driver::driver::Driver) contract: fixed 18-quanta bit
//! timing derived from the peripheral clock, mask-mode acceptance filters in
//! banks `0..14`, and non-blocking mailbox/FIFO access for the interrupt
//! entry points.
//!
//! The board crate supplies the instance type (register block address,
//! filter bank count), clocks, pins and interrupt wiring.

mod driver;

pub use bxcan;
pub use driver::BxcanDriver;
