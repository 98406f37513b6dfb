use rtcan::{Config, Error, Fault, InboxChannel, Service};
use std::boxed::Box;

mod common;
use common::{MockDriver, MockHandle, eid, sid};

fn inboxes<const COUNT: usize>() -> &'static [InboxChannel<2>; COUNT] {
    Box::leak(Box::new(std::array::from_fn(|_| InboxChannel::new())))
}

#[test]
fn identifier_table_capacity_latches_memory_full() {
    let handle = MockHandle::default();
    let service: Service<MockDriver, 4, 4, 2, 8> =
        Service::new(handle.driver(), Config::default());
    let queues = inboxes::<3>();

    service.subscribe(sid(1), &queues[0]).unwrap();
    service.subscribe(sid(2), &queues[1]).unwrap();
    assert_eq!(service.subscribe(sid(3), &queues[2]), Err(Error::OutOfMemory));
    assert!(service.faults().contains(Fault::MemoryFull));
}

#[test]
fn repeated_identifiers_share_a_table_slot() {
    let handle = MockHandle::default();
    let service: Service<MockDriver, 4, 4, 1, 8> =
        Service::new(handle.driver(), Config::default());
    let queues = inboxes::<3>();

    // Two subscriptions, one identifier: a single table slot.
    service.subscribe(sid(7), &queues[0]).unwrap();
    service.subscribe(sid(7), &queues[1]).unwrap();
    assert_eq!(service.subscriber_count(sid(7)), 2);
    assert_eq!(service.subscribe(sid(8), &queues[2]), Err(Error::OutOfMemory));
}

#[test]
fn subscriber_node_capacity_latches_memory_full() {
    let handle = MockHandle::default();
    let service: Service<MockDriver, 4, 4, 8, 2> =
        Service::new(handle.driver(), Config::default());
    let queues = inboxes::<3>();

    service.subscribe(sid(1), &queues[0]).unwrap();
    service.subscribe(sid(2), &queues[1]).unwrap();
    assert_eq!(service.subscribe(sid(3), &queues[2]), Err(Error::OutOfMemory));
    assert!(service.faults().contains(Fault::MemoryFull));
}

#[test]
fn unsubscribe_unknown_targets_report_not_found() {
    let handle = MockHandle::default();
    let service: Service<MockDriver, 4, 4, 4, 4> =
        Service::new(handle.driver(), Config::default());
    let queues = inboxes::<2>();

    service.subscribe(sid(1), &queues[0]).unwrap();
    // Unknown identifier, then a queue that never subscribed.
    assert_eq!(service.unsubscribe(sid(2), &queues[0]), Err(Error::NotFound));
    assert_eq!(service.unsubscribe(sid(1), &queues[1]), Err(Error::NotFound));
    // Lookup misses are not faults and leave the chain alone.
    assert!(service.faults().is_empty());
    assert_eq!(service.subscriber_count(sid(1)), 1);

    service.unsubscribe(sid(1), &queues[0]).unwrap();
    assert_eq!(service.subscriber_count(sid(1)), 0);
    // The freed node is available again.
    service.subscribe(sid(1), &queues[1]).unwrap();
    assert_eq!(service.subscriber_count(sid(1)), 1);
}

#[test]
fn standard_and_extended_identifiers_do_not_alias() {
    let handle = MockHandle::default();
    let service: Service<MockDriver, 4, 4, 4, 4> =
        Service::new(handle.driver(), Config::default());
    let queues = inboxes::<2>();

    service.subscribe(sid(0x55), &queues[0]).unwrap();
    service.subscribe(eid(0x55), &queues[1]).unwrap();
    assert_eq!(service.subscriber_count(sid(0x55)), 1);
    assert_eq!(service.subscriber_count(eid(0x55)), 1);
    // The extended chain exists but does not hold the standard subscriber.
    assert_eq!(
        service.unsubscribe(eid(0x55), &queues[0]),
        Err(Error::NotFound)
    );
}
