//! Subscriber registry: identifier to subscriber-chain lookup.
//!
//! A fixed-slot hash table with coalesced chaining. A key hashes to its
//! primary slot; colliding keys claim the first unoccupied slot anywhere in
//! the table and are linked to the end of the probed chain, so chains from
//! different buckets may merge. Slots are claimed on first subscribe and
//! never released, even when their subscriber chain empties. Subscriber
//! nodes live in a second fixed array threaded by index, recycled through a
//! free list with a high-water allocation mark.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::pool::FrameRef;

pub(crate) const NO_INDEX: u16 = u16::MAX;

/// A subscriber's frame queue.
///
/// Implemented for `embassy_sync` channels of [`FrameRef`] under
/// `CriticalSectionRawMutex`, any capacity. Registration stores the queue by
/// address; the same queue value must be passed to unsubscribe.
pub trait Inbox: Sync {
    /// Non-blocking delivery. Returns the handle when the queue is full.
    fn try_deliver(&self, frame: FrameRef) -> Result<(), FrameRef>;
}

/// Ready-made [`Inbox`]: an embassy channel of frame handles.
///
/// ```ignore
/// static INBOX: InboxChannel<8> = InboxChannel::new();
/// service.subscribe(id, &INBOX)?;
/// let frame = INBOX.receive().await;
/// ```
pub type InboxChannel<const N: usize> = Channel<CriticalSectionRawMutex, FrameRef, N>;

impl<const N: usize> Inbox for InboxChannel<N> {
    fn try_deliver(&self, frame: FrameRef) -> Result<(), FrameRef> {
        self.try_send(frame).map_err(|err| match err {
            TrySendError::Full(frame) => frame,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegistryError {
    /// Every table slot is claimed by some identifier.
    TableFull,
    /// Every subscriber node is in use.
    NodesFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnsubscribeError {
    /// The identifier has no table slot.
    UnknownId,
    /// The identifier is known but the queue is not in its chain.
    NotSubscribed,
}

#[derive(Clone, Copy)]
struct MapSlot {
    key: u32,
    occupied: bool,
    /// Head of the subscriber node chain.
    head: u16,
    /// Next table slot in the coalesced probe chain.
    chain: u16,
}

impl MapSlot {
    const EMPTY: Self = Self {
        key: 0,
        occupied: false,
        head: NO_INDEX,
        chain: NO_INDEX,
    };

    const fn for_key(key: u32) -> Self {
        Self {
            key,
            occupied: true,
            head: NO_INDEX,
            chain: NO_INDEX,
        }
    }
}

#[derive(Clone, Copy)]
struct SubNode {
    inbox: Option<&'static dyn Inbox>,
    next: u16,
}

impl SubNode {
    const EMPTY: Self = Self {
        inbox: None,
        next: NO_INDEX,
    };
}

/// Integer bit mix; spreads the dense identifier ranges CAN buses use
/// across the table.
fn mix(key: u32) -> u32 {
    let mut h = key;
    h = h.wrapping_add(h << 12);
    h ^= h >> 22;
    h = h.wrapping_add(h << 4);
    h ^= h >> 9;
    h = h.wrapping_add(h << 10);
    h ^= h >> 2;
    h = h.wrapping_add(h << 7);
    h ^= h >> 12;
    h
}

pub(crate) struct Registry<const SLOTS: usize, const SUBS: usize> {
    slots: [MapSlot; SLOTS],
    nodes: [SubNode; SUBS],
    free_head: u16,
    /// Nodes at or past this index have never been allocated.
    fresh: u16,
}

impl<const SLOTS: usize, const SUBS: usize> Registry<SLOTS, SUBS> {
    pub(crate) fn new() -> Self {
        const {
            assert!(SLOTS > 0 && SLOTS < NO_INDEX as usize);
            assert!(SUBS > 0 && SUBS < NO_INDEX as usize);
        }
        Self {
            slots: [MapSlot::EMPTY; SLOTS],
            nodes: [SubNode::EMPTY; SUBS],
            free_head: NO_INDEX,
            fresh: 0,
        }
    }

    /// Appends `inbox` to the chain for `key`, claiming a table slot on
    /// first use.
    pub(crate) fn subscribe(
        &mut self,
        key: u32,
        inbox: &'static dyn Inbox,
    ) -> Result<(), RegistryError> {
        let slot = self.find_or_claim(key)?;
        let node = self.alloc_node(inbox).ok_or(RegistryError::NodesFull)?;
        match self.slots[slot].head {
            NO_INDEX => self.slots[slot].head = node,
            head => {
                let mut cursor = head as usize;
                while self.nodes[cursor].next != NO_INDEX {
                    cursor = self.nodes[cursor].next as usize;
                }
                self.nodes[cursor].next = node;
            }
        }
        Ok(())
    }

    /// Unlinks `inbox` from the chain for `key`. The table slot stays
    /// claimed even when the chain empties.
    pub(crate) fn unsubscribe(
        &mut self,
        key: u32,
        inbox: &'static dyn Inbox,
    ) -> Result<(), UnsubscribeError> {
        let slot = self.find(key).ok_or(UnsubscribeError::UnknownId)?;
        let mut prev = NO_INDEX;
        let mut cursor = self.slots[slot].head;
        while cursor != NO_INDEX {
            let node = self.nodes[cursor as usize];
            let matches = node
                .inbox
                .is_some_and(|registered| core::ptr::addr_eq(registered, inbox));
            if matches {
                if prev == NO_INDEX {
                    self.slots[slot].head = node.next;
                } else {
                    self.nodes[prev as usize].next = node.next;
                }
                self.free_node(cursor);
                return Ok(());
            }
            prev = cursor;
            cursor = node.next;
        }
        Err(UnsubscribeError::NotSubscribed)
    }

    /// Iterates the subscriber chain for `key`; empty for unknown keys.
    pub(crate) fn chain(&self, key: u32) -> ChainIter<'_, SLOTS, SUBS> {
        let head = self
            .find(key)
            .map_or(NO_INDEX, |slot| self.slots[slot].head);
        ChainIter {
            registry: self,
            cursor: head,
        }
    }

    pub(crate) fn subscriber_count(&self, key: u32) -> usize {
        self.chain(key).count()
    }

    fn find(&self, key: u32) -> Option<usize> {
        let primary = (mix(key) as usize) % SLOTS;
        if !self.slots[primary].occupied {
            return None;
        }
        let mut cursor = primary;
        loop {
            if self.slots[cursor].key == key {
                return Some(cursor);
            }
            match self.slots[cursor].chain {
                NO_INDEX => return None,
                next => cursor = next as usize,
            }
        }
    }

    fn find_or_claim(&mut self, key: u32) -> Result<usize, RegistryError> {
        let primary = (mix(key) as usize) % SLOTS;
        if !self.slots[primary].occupied {
            self.slots[primary] = MapSlot::for_key(key);
            return Ok(primary);
        }
        let mut tail = primary;
        loop {
            if self.slots[tail].key == key {
                return Ok(tail);
            }
            match self.slots[tail].chain {
                NO_INDEX => break,
                next => tail = next as usize,
            }
        }
        // Claim the first unoccupied slot anywhere and link it to the
        // probed chain; chains sharing slots this way stay consistent
        // because every lookup starts from the key's primary slot.
        for index in 0..SLOTS {
            if !self.slots[index].occupied {
                self.slots[index] = MapSlot::for_key(key);
                self.slots[tail].chain = index as u16;
                return Ok(index);
            }
        }
        Err(RegistryError::TableFull)
    }

    fn alloc_node(&mut self, inbox: &'static dyn Inbox) -> Option<u16> {
        let index = if self.free_head != NO_INDEX {
            let index = self.free_head;
            self.free_head = self.nodes[index as usize].next;
            index
        } else if (self.fresh as usize) < SUBS {
            let index = self.fresh;
            self.fresh += 1;
            index
        } else {
            return None;
        };
        self.nodes[index as usize] = SubNode {
            inbox: Some(inbox),
            next: NO_INDEX,
        };
        Some(index)
    }

    fn free_node(&mut self, index: u16) {
        self.nodes[index as usize] = SubNode {
            inbox: None,
            next: self.free_head,
        };
        self.free_head = index;
    }
}

#[derive(Clone)]
pub(crate) struct ChainIter<'a, const SLOTS: usize, const SUBS: usize> {
    registry: &'a Registry<SLOTS, SUBS>,
    cursor: u16,
}

impl<const SLOTS: usize, const SUBS: usize> Iterator for ChainIter<'_, SLOTS, SUBS> {
    type Item = &'static dyn Inbox;

    fn next(&mut self) -> Option<&'static dyn Inbox> {
        if self.cursor == NO_INDEX {
            return None;
        }
        let node = self.registry.nodes[self.cursor as usize];
        self.cursor = node.next;
        debug_assert!(node.inbox.is_some());
        node.inbox
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel;

    type Queue = Channel<CriticalSectionRawMutex, FrameRef, 4>;

    /// Keys whose primary bucket in a SLOTS-sized table collides with the
    /// bucket of the first returned key.
    fn colliding_keys<const SLOTS: usize>(count: usize) -> Vec<u32> {
        let target = (mix(1) as usize) % SLOTS;
        (1u32..)
            .filter(|&key| (mix(key) as usize) % SLOTS == target)
            .take(count)
            .collect()
    }

    fn addr(inbox: &'static dyn Inbox) -> *const () {
        inbox as *const dyn Inbox as *const ()
    }

    #[test]
    fn chains_preserve_subscription_order() {
        static Q1: Queue = Channel::new();
        static Q2: Queue = Channel::new();
        let mut registry: Registry<8, 8> = Registry::new();

        assert_eq!(registry.subscriber_count(0x42), 0);
        registry.subscribe(0x42, &Q1).unwrap();
        registry.subscribe(0x42, &Q2).unwrap();
        assert_eq!(registry.subscriber_count(0x42), 2);

        let order: Vec<*const ()> = registry.chain(0x42).map(addr).collect();
        assert_eq!(order, [addr(&Q1), addr(&Q2)]);
    }

    #[test]
    fn colliding_keys_coalesce_and_stay_reachable() {
        static Q: Queue = Channel::new();
        let mut registry: Registry<4, 8> = Registry::new();

        let keys = colliding_keys::<4>(3);
        for &key in &keys {
            registry.subscribe(key, &Q).unwrap();
        }
        for &key in &keys {
            assert_eq!(registry.subscriber_count(key), 1, "key {key:#x}");
        }
        // A fourth unrelated key still fits in the remaining slot.
        let other = (2u32..)
            .find(|&key| !keys.contains(&key))
            .unwrap();
        registry.subscribe(other, &Q).unwrap();
        assert_eq!(registry.subscriber_count(other), 1);
    }

    #[test]
    fn table_capacity_is_deterministic() {
        static Q: Queue = Channel::new();
        let mut registry: Registry<2, 8> = Registry::new();

        registry.subscribe(10, &Q).unwrap();
        registry.subscribe(20, &Q).unwrap();
        assert_eq!(registry.subscribe(30, &Q), Err(RegistryError::TableFull));
        // Existing chains are untouched by the failed claim.
        assert_eq!(registry.subscriber_count(10), 1);
        assert_eq!(registry.subscriber_count(20), 1);
    }

    #[test]
    fn node_pool_exhaustion_and_reuse() {
        static Q1: Queue = Channel::new();
        static Q2: Queue = Channel::new();
        let mut registry: Registry<4, 1> = Registry::new();

        registry.subscribe(7, &Q1).unwrap();
        assert_eq!(registry.subscribe(7, &Q2), Err(RegistryError::NodesFull));

        registry.unsubscribe(7, &Q1).unwrap();
        // The freed node is allocatable again.
        registry.subscribe(7, &Q2).unwrap();
        let order: Vec<*const ()> = registry.chain(7).map(addr).collect();
        assert_eq!(order, [addr(&Q2)]);
    }

    #[test]
    fn unsubscribe_error_paths_leave_chains_intact() {
        static Q1: Queue = Channel::new();
        static Q2: Queue = Channel::new();
        static STRANGER: Queue = Channel::new();
        let mut registry: Registry<8, 8> = Registry::new();

        registry.subscribe(5, &Q1).unwrap();
        registry.subscribe(5, &Q2).unwrap();

        assert_eq!(
            registry.unsubscribe(99, &Q1),
            Err(UnsubscribeError::UnknownId)
        );
        assert_eq!(
            registry.unsubscribe(5, &STRANGER),
            Err(UnsubscribeError::NotSubscribed)
        );
        assert_eq!(registry.subscriber_count(5), 2);

        // Removing the head relinks the chain.
        registry.unsubscribe(5, &Q1).unwrap();
        let order: Vec<*const ()> = registry.chain(5).map(addr).collect();
        assert_eq!(order, [addr(&Q2)]);
    }

    #[test]
    fn emptied_slots_are_never_reclaimed() {
        static Q: Queue = Channel::new();
        let mut registry: Registry<1, 4> = Registry::new();

        registry.subscribe(1, &Q).unwrap();
        registry.unsubscribe(1, &Q).unwrap();
        assert_eq!(registry.subscriber_count(1), 0);

        // The emptied slot still belongs to key 1.
        assert_eq!(registry.subscribe(2, &Q), Err(RegistryError::TableFull));
        registry.subscribe(1, &Q).unwrap();
        assert_eq!(registry.subscriber_count(1), 1);
    }
}
