//! Reference-counted receive slot pool.
//!
//! The receive interrupt claims a free slot, stores the incoming frame and
//! queues the slot index for the receive worker. The worker publishes the
//! slot to every subscriber at once by setting the holder count before the
//! first delivery; each subscriber releases its hold when done. The slot
//! returns to the free list exactly when the count reaches zero.

use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU16, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use rtcan_driver::frame::{CanId, Data, Frame, StandardId};

pub(crate) type SlotIndex = u16;

struct Slot {
    frame: UnsafeCell<Frame>,
    holders: AtomicU16,
}

impl Slot {
    fn new() -> Self {
        Self {
            frame: UnsafeCell::new(Frame::new(CanId::Standard(StandardId::MAX), Data::EMPTY)),
            holders: AtomicU16::new(0),
        }
    }
}

/// Fixed arena of `N` frame slots with a free list and a ready queue.
pub(crate) struct RxPool<const N: usize> {
    slots: [Slot; N],
    free: Channel<CriticalSectionRawMutex, SlotIndex, N>,
    ready: Channel<CriticalSectionRawMutex, SlotIndex, N>,
}

// Safety: the frame cell of a slot is written only by the claimer between
// `claim` and `commit`, while no other context can name the index. From
// `commit` until the holder count drops to zero the cell is only read.
unsafe impl<const N: usize> Sync for RxPool<N> {}

impl<const N: usize> RxPool<N> {
    /// Creates the pool with every index on the free list.
    pub(crate) fn new() -> Self {
        const { assert!(N > 0 && N <= u16::MAX as usize) }
        let pool = Self {
            slots: core::array::from_fn(|_| Slot::new()),
            free: Channel::new(),
            ready: Channel::new(),
        };
        for index in 0..N as SlotIndex {
            // Cannot fail: the channel holds exactly N indexes.
            let _ = pool.free.try_send(index);
        }
        pool
    }

    /// Takes a free slot index, `None` when the pool is exhausted.
    /// Interrupt-safe.
    pub(crate) fn claim(&self) -> Option<SlotIndex> {
        self.free.try_receive().ok()
    }

    /// Stores `frame` into a claimed slot and queues it for the receive
    /// worker. Interrupt-safe.
    ///
    /// Fails only when the ready queue is full, which means an index was
    /// queued twice.
    pub(crate) fn commit(&self, index: SlotIndex, frame: Frame) -> Result<(), ()> {
        let slot = &self.slots[index as usize];
        // Safety: `index` came from `claim`, so this context is the sole
        // owner of the cell until the frame is published below.
        unsafe { *slot.frame.get() = frame };
        slot.holders.store(0, Ordering::Relaxed);
        self.ready.try_send(index).map_err(|_| ())
    }

    /// Returns a claimed or fully released slot to the free list.
    ///
    /// Fails only when the free list is already full, which means a
    /// double release.
    pub(crate) fn recycle(&self, index: SlotIndex) -> Result<(), ()> {
        self.free.try_send(index).map_err(|_| ())
    }

    /// Waits for the next committed slot index.
    pub(crate) async fn next_ready(&self) -> SlotIndex {
        self.ready.receive().await
    }

    /// Sets the number of holds on a committed slot. Called once per slot,
    /// before the first delivery.
    pub(crate) fn set_holders(&self, index: SlotIndex, count: u16) {
        self.slots[index as usize].holders.store(count, Ordering::Relaxed);
    }

    /// Drops one hold; the last hold recycles the slot.
    pub(crate) fn release_holder(&self, index: SlotIndex) -> Result<(), ()> {
        if self.slots[index as usize].holders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.recycle(index)
        } else {
            Ok(())
        }
    }

    /// Builds a delivery handle for a committed slot.
    pub(crate) fn make_ref(&self, index: SlotIndex) -> FrameRef {
        FrameRef {
            index,
            frame: NonNull::from(&self.slots[index as usize].frame).cast::<Frame>(),
        }
    }
}

/// Zero-copy handle to a pooled received frame.
///
/// Every subscriber of a frame's identifier receives its own handle to the
/// shared slot. Dereference it to read the frame, then return it through
/// [`Service::consume`](crate::Service::consume); a handle that is dropped
/// without being consumed keeps its slot allocated forever.
#[derive(Debug)]
pub struct FrameRef {
    index: SlotIndex,
    frame: NonNull<Frame>,
}

// Safety: the pointed-to frame is not written while any handle for the slot
// exists, and slot release goes through an atomic holder count.
unsafe impl Send for FrameRef {}

impl FrameRef {
    /// Pool slot index backing this handle, for diagnostics.
    pub fn slot_index(&self) -> u16 {
        self.index
    }

    pub(crate) fn into_index(self) -> SlotIndex {
        self.index
    }
}

impl core::ops::Deref for FrameRef {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        // Safety: the slot stays committed and unwritten for the lifetime
        // of the handle; see the pool invariants above.
        unsafe { self.frame.as_ref() }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FrameRef {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "FrameRef(slot {=u16})", self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u16, byte: u8) -> Frame {
        Frame::new(
            StandardId::new(id).unwrap(),
            Data::new(&[byte]).unwrap(),
        )
    }

    #[test]
    fn claims_every_index_then_runs_dry() {
        let pool: RxPool<3> = RxPool::new();
        assert_eq!(pool.claim(), Some(0));
        assert_eq!(pool.claim(), Some(1));
        assert_eq!(pool.claim(), Some(2));
        assert_eq!(pool.claim(), None);
        pool.recycle(1).unwrap();
        assert_eq!(pool.claim(), Some(1));
    }

    #[test]
    fn commit_publishes_frame_to_ready_queue() {
        let pool: RxPool<2> = RxPool::new();
        let index = pool.claim().unwrap();
        pool.commit(index, frame(0x42, 7)).unwrap();
        assert_eq!(pool.ready.try_receive(), Ok(index));
        let handle = pool.make_ref(index);
        assert_eq!(handle.data(), &[7]);
        assert_eq!(handle.slot_index(), index);
    }

    #[test]
    fn last_holder_recycles_the_slot() {
        let pool: RxPool<1> = RxPool::new();
        let index = pool.claim().unwrap();
        pool.commit(index, frame(1, 1)).unwrap();
        let _ = pool.ready.try_receive();

        pool.set_holders(index, 2);
        pool.release_holder(index).unwrap();
        assert_eq!(pool.claim(), None);
        pool.release_holder(index).unwrap();
        assert_eq!(pool.claim(), Some(index));
    }

    #[test]
    fn double_recycle_is_reported() {
        let pool: RxPool<1> = RxPool::new();
        let index = pool.claim().unwrap();
        pool.recycle(index).unwrap();
        assert_eq!(pool.recycle(index), Err(()));
    }
}
