//! Scriptable in-memory driver for exercising the service on the host.
//!
//! State lives behind an `Rc` so the test keeps a [`MockHandle`] while the
//! service owns the [`MockDriver`]; the single-threaded executor makes the
//! shared cell safe.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_time::Duration;
use rtcan::{
    Bitrate, CanId, Config, Data, Driver, DriverError, ExtendedId, Filter, Frame, RxFifo,
    StandardId,
};

#[derive(Default)]
struct MockState {
    bitrate: Option<Bitrate>,
    loopback: bool,
    silent: bool,
    filter_commits: Vec<Vec<Filter>>,
    notifications: bool,
    on_bus: bool,
    stop_calls: usize,
    sent: Vec<Frame>,
    rx_pending: VecDeque<Frame>,
    fail_configure: bool,
    fail_filters: bool,
    fail_start: bool,
    fail_transmit: bool,
}

/// Test-side view of the scripted controller.
#[derive(Clone, Default)]
pub struct MockHandle {
    state: Rc<RefCell<MockState>>,
}

impl MockHandle {
    /// The driver half, to be moved into the service.
    pub fn driver(&self) -> MockDriver {
        MockDriver {
            state: Rc::clone(&self.state),
        }
    }

    /// Queues a frame for the next receive-interrupt call to pick up.
    pub fn inject(&self, frame: Frame) {
        self.state.borrow_mut().rx_pending.push_back(frame);
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.state.borrow().sent.clone()
    }

    /// Filter sets committed to the controller, oldest first. The service
    /// constructor commits an accept-all set, so this starts at length one.
    pub fn filter_commits(&self) -> Vec<Vec<Filter>> {
        self.state.borrow().filter_commits.clone()
    }

    pub fn on_bus(&self) -> bool {
        self.state.borrow().on_bus
    }

    pub fn notifications(&self) -> bool {
        self.state.borrow().notifications
    }

    pub fn stop_calls(&self) -> usize {
        self.state.borrow().stop_calls
    }

    pub fn fail_configure(&self, fail: bool) {
        self.state.borrow_mut().fail_configure = fail;
    }

    pub fn fail_filters(&self, fail: bool) {
        self.state.borrow_mut().fail_filters = fail;
    }

    pub fn fail_start(&self, fail: bool) {
        self.state.borrow_mut().fail_start = fail;
    }

    pub fn fail_transmit(&self, fail: bool) {
        self.state.borrow_mut().fail_transmit = fail;
    }
}

/// Service-side half of the scripted controller.
pub struct MockDriver {
    state: Rc<RefCell<MockState>>,
}

impl Driver for MockDriver {
    fn configure(
        &mut self,
        bitrate: Bitrate,
        loopback: bool,
        silent: bool,
    ) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        if state.fail_configure {
            return Err(DriverError::Hardware);
        }
        state.bitrate = Some(bitrate);
        state.loopback = loopback;
        state.silent = silent;
        Ok(())
    }

    fn apply_filters(&mut self, filters: &[Filter]) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        if state.fail_filters {
            return Err(DriverError::Hardware);
        }
        state.filter_commits.push(filters.to_vec());
        Ok(())
    }

    fn enable_notifications(&mut self) -> Result<(), DriverError> {
        self.state.borrow_mut().notifications = true;
        Ok(())
    }

    fn disable_notifications(&mut self) {
        self.state.borrow_mut().notifications = false;
    }

    fn start(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        if state.fail_start {
            return Err(DriverError::Hardware);
        }
        state.on_bus = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.on_bus = false;
        state.stop_calls += 1;
    }

    fn transmit(&mut self, frame: &Frame) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        if state.fail_transmit {
            return Err(DriverError::Hardware);
        }
        state.sent.push(*frame);
        Ok(())
    }

    fn receive(&mut self, _fifo: RxFifo) -> Result<Frame, DriverError> {
        self.state
            .borrow_mut()
            .rx_pending
            .pop_front()
            .ok_or(DriverError::Empty)
    }

    fn clear_errors(&mut self) {}
}

/// Worker-friendly configuration: the poll interval is long enough that no
/// tick fires while the executor runs, so a parked worker counts as
/// stalled instead of spinning.
pub fn worker_config() -> Config {
    let mut config = Config::default();
    config.poll_interval = Duration::from_secs(3600);
    config
}

pub fn sid(id: u16) -> CanId {
    CanId::Standard(StandardId::new(id).unwrap())
}

pub fn eid(id: u32) -> CanId {
    CanId::Extended(ExtendedId::new(id).unwrap())
}

pub fn frame(id: u16, bytes: &[u8]) -> Frame {
    Frame::new(StandardId::new(id).unwrap(), Data::new(bytes).unwrap())
}

pub fn eframe(id: u32, bytes: &[u8]) -> Frame {
    Frame::new(ExtendedId::new(id).unwrap(), Data::new(bytes).unwrap())
}
