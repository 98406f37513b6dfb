//! Service errors and sticky fault flags.
//!
//! Operations called from task context report failures through [`Error`].
//! Conditions detected where no caller can receive a result (interrupt
//! handlers, the workers) are latched into a [`FaultSet`] instead and stay
//! set until explicitly cleared.

use core::ops::{BitAnd, BitOr, Not};

/// Errors returned by service operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The service recorded an initialization fault and cannot run.
    NotInitialized,
    /// The operation is not valid in the current state.
    InvalidArgument,
    /// A fixed-capacity structure is exhausted.
    OutOfMemory,
    /// The identifier or queue is not registered.
    NotFound,
    /// The controller rejected a request.
    HardwareFault,
}

/// A sticky error condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// One-time initialization failed; `start` refuses to run.
    Init,
    /// An argument check failed in a context that cannot return an error.
    InvalidArgument,
    /// A bounded queue or pool rejected an element; the newest element lost.
    MemoryFull,
    /// No transmit mailbox became free within the configured timeout.
    TxTimeout,
    /// The controller reported a hardware error.
    Hal,
    /// An internal invariant did not hold.
    Internal,
}

impl Fault {
    const VARIANTS: [Fault; 6] = [
        Fault::Init,
        Fault::InvalidArgument,
        Fault::MemoryFull,
        Fault::TxTimeout,
        Fault::Hal,
        Fault::Internal,
    ];

    pub const fn into_bits(self) -> u32 {
        match self {
            Fault::Init => 1 << 0,
            Fault::InvalidArgument => 1 << 1,
            Fault::MemoryFull => 1 << 2,
            Fault::TxTimeout => 1 << 3,
            Fault::Hal => 1 << 4,
            Fault::Internal => 1 << 31,
        }
    }
}

/// Set of sticky [`Fault`] conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultSet(u32);

impl FaultSet {
    /// The empty set.
    pub const NONE: Self = Self(0);
    /// Every representable fault.
    pub const ALL: Self = Self(0x8000_001F);

    /// The set holding exactly `fault`.
    pub const fn single(fault: Fault) -> Self {
        Self(fault.into_bits())
    }

    /// Builds a set from a raw mask, dropping unknown bits.
    pub const fn from_bits_truncating(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn into_bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, fault: Fault) -> bool {
        self.0 & fault.into_bits() != 0
    }

    pub const fn insert(self, fault: Fault) -> Self {
        Self(self.0 | fault.into_bits())
    }

    pub const fn remove(self, fault: Fault) -> Self {
        Self(self.0 & !fault.into_bits())
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Lowest-numbered fault in the set.
    pub const fn first(self) -> Option<Fault> {
        let mut i = 0;
        while i < Fault::VARIANTS.len() {
            if self.contains(Fault::VARIANTS[i]) {
                return Some(Fault::VARIANTS[i]);
            }
            i += 1;
        }
        None
    }
}

impl From<Fault> for FaultSet {
    fn from(fault: Fault) -> Self {
        Self::single(fault)
    }
}

impl Not for FaultSet {
    type Output = Self;

    fn not(self) -> Self {
        Self::from_bits_truncating(!self.0)
    }
}

impl BitAnd for FaultSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for FaultSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl IntoIterator for FaultSet {
    type Item = Fault;
    type IntoIter = FaultSetIterator;

    fn into_iter(self) -> FaultSetIterator {
        FaultSetIterator(self)
    }
}

pub struct FaultSetIterator(FaultSet);

impl Iterator for FaultSetIterator {
    type Item = Fault;

    fn next(&mut self) -> Option<Fault> {
        let fault = self.0.first()?;
        self.0 = self.0.remove(fault);
        Some(fault)
    }
}
