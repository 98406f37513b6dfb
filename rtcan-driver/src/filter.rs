//! Hardware acceptance filtering.

use crate::frame::{CanId, ExtendedId, StandardId};

/// Receive FIFO selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxFifo {
    Fifo0,
    Fifo1,
}

/// An identifier/mask acceptance filter.
///
/// A received frame passes when its kind (standard or extended) matches `id`
/// and `frame_id & mask == id & mask`. Matching frames land in `fifo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Filter {
    pub id: CanId,
    pub mask: u32,
    pub fifo: RxFifo,
}

impl Filter {
    /// Matches standard frames against `id` under `mask`, into FIFO 0.
    ///
    /// A mask of `0x7FF` accepts exactly `id`; a mask of `0` accepts every
    /// standard frame.
    pub const fn standard(id: StandardId, mask: u16) -> Self {
        Self {
            id: CanId::Standard(id),
            mask: mask as u32,
            fifo: RxFifo::Fifo0,
        }
    }

    /// Matches extended frames against `id` under `mask`, into FIFO 0.
    pub const fn extended(id: ExtendedId, mask: u32) -> Self {
        Self {
            id: CanId::Extended(id),
            mask,
            fifo: RxFifo::Fifo0,
        }
    }

    /// Routes matching frames into `fifo`.
    pub const fn into_fifo(self, fifo: RxFifo) -> Self {
        Self {
            id: self.id,
            mask: self.mask,
            fifo,
        }
    }
}
