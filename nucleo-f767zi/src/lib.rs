//! Rtcan example project for the Nucleo-F767ZI board.
//!
//! To use this crate on other STM32F7 boards, update the chip name in
//! `Cargo.toml` and `.cargo/config.toml` and check the CAN pin mapping in
//! [`can1`].
//!
//! The demo runs the controller in loop-back mode and requires no
//! transceiver. Output frames can be observed on the PD1 pin.

#![no_std]

pub mod board;
pub mod can1;
