#![no_std]
//! Interface between a CAN device driver and the `rtcan` service.
//!
//! The service core is hardware-agnostic: everything it asks of a CAN
//! controller goes through [`driver::Driver`], and every value crossing that
//! boundary is defined in this crate. The limited scope keeps device crates
//! compatible across service versions.

pub mod driver;
pub mod filter;
pub mod frame;
