//! The CAN service: lifecycle, transmit path, receive fan-out, faults.

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::with_timeout;
use heapless::Vec;
use rtcan_driver::driver::{Driver, DriverError, FILTER_BANK_COUNT, TX_MAILBOX_COUNT};
use rtcan_driver::filter::{Filter, RxFifo};
use rtcan_driver::frame::{CanId, Frame};

use crate::config::Config;
use crate::error::{Error, Fault, FaultSet};
use crate::pool::{FrameRef, RxPool, SlotIndex};
use crate::registry::{Inbox, Registry, RegistryError, UnsubscribeError};

/// CAN frame router over a [`Driver`] implementation.
///
/// Const parameters size every structure at compile time:
/// `TX` transmit queue depth, `POOL` receive slots, `SLOTS` identifier table
/// slots, `SUBS` subscriber nodes. [`DefaultService`] carries workable
/// defaults.
///
/// The service is built for `'static` placement (e.g. in a
/// `static_cell::StaticCell`): interrupt entry points borrow `&self`, and
/// subscriber queues registered with [`Service::subscribe`] must outlive it.
pub struct Service<D, const TX: usize, const POOL: usize, const SLOTS: usize, const SUBS: usize> {
    driver: Mutex<CriticalSectionRawMutex, RefCell<D>>,
    config: Config,
    tx_queue: Channel<CriticalSectionRawMutex, Frame, TX>,
    mailbox_permits: Channel<CriticalSectionRawMutex, (), TX_MAILBOX_COUNT>,
    pool: RxPool<POOL>,
    registry: Mutex<CriticalSectionRawMutex, RefCell<Registry<SLOTS, SUBS>>>,
    filters: Mutex<CriticalSectionRawMutex, RefCell<Vec<Filter, FILTER_BANK_COUNT>>>,
    fault_bits: AtomicU32,
    running: AtomicBool,
}

/// [`Service`] with the historical capacities: 16 queued transmit frames,
/// 64 receive slots, 32 identifier slots, 64 subscriber nodes.
pub type DefaultService<D> = Service<D, 16, 64, 32, 64>;

impl<D: Driver, const TX: usize, const POOL: usize, const SLOTS: usize, const SUBS: usize>
    Service<D, TX, POOL, SLOTS, SUBS>
{
    /// Creates the service and configures the controller.
    ///
    /// A controller that refuses its configuration latches [`Fault::Init`]
    /// instead of failing construction; [`Service::start`] then reports
    /// [`Error::NotInitialized`].
    pub fn new(mut driver: D, config: Config) -> Self {
        let mut faults = FaultSet::NONE;
        if driver
            .configure(config.bitrate, config.loopback, config.silent)
            .is_err()
        {
            error!("rtcan: controller configuration failed");
            faults = faults.insert(Fault::Init);
        }
        // Accept everything until user filters are committed by `start`.
        if driver.apply_filters(&[]).is_err() {
            error!("rtcan: default filter setup failed");
            faults = faults.insert(Fault::Init);
        }

        let service = Self {
            driver: Mutex::new(RefCell::new(driver)),
            config,
            tx_queue: Channel::new(),
            mailbox_permits: Channel::new(),
            pool: RxPool::new(),
            registry: Mutex::new(RefCell::new(Registry::new())),
            filters: Mutex::new(RefCell::new(Vec::new())),
            fault_bits: AtomicU32::new(faults.into_bits()),
            running: AtomicBool::new(false),
        };
        for _ in 0..TX_MAILBOX_COUNT {
            // Cannot fail: the permit store is empty and sized to match.
            let _ = service.mailbox_permits.try_send(());
        }
        service
    }

    /// Brings the controller onto the bus and arms the workers.
    ///
    /// Commits staged filters, unmasks notifications and starts the
    /// controller. On success returns the two worker runners; spawn a task
    /// for each and keep it running until [`Service::stop`].
    ///
    /// Fails with [`Error::NotInitialized`] while any fault is latched,
    /// [`Error::InvalidArgument`] when already running and
    /// [`Error::HardwareFault`] when the controller refuses to start.
    #[allow(clippy::type_complexity)]
    pub fn start(
        &self,
    ) -> Result<
        (
            TxRunner<'_, D, TX, POOL, SLOTS, SUBS>,
            RxRunner<'_, D, TX, POOL, SLOTS, SUBS>,
        ),
        Error,
    > {
        if !self.faults().is_empty() {
            return Err(Error::NotInitialized);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidArgument);
        }

        let staged: Vec<Filter, FILTER_BANK_COUNT> =
            self.filters.lock(|cell| cell.borrow().clone());
        let result = self.driver.lock(|cell| {
            let mut driver = cell.borrow_mut();
            if !staged.is_empty() && driver.apply_filters(&staged).is_err() {
                // The controller keeps the accept-all setup; latched so the
                // next start refuses to run silently degraded.
                error!("rtcan: acceptance filter setup failed");
                self.raise(Fault::Init);
            }
            driver.enable_notifications()?;
            driver.start()
        });
        if result.is_err() {
            self.running.store(false, Ordering::Release);
            return Err(Error::HardwareFault);
        }

        info!(
            "rtcan: started at {} bit/s",
            self.config.bitrate.bits_per_second()
        );
        Ok((TxRunner { service: self }, RxRunner { service: self }))
    }

    /// Takes the controller off the bus and masks its notifications.
    ///
    /// Idempotent. The workers observe the stop within one poll interval
    /// and their `run` calls return.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.driver.lock(|cell| {
            let mut driver = cell.borrow_mut();
            driver.stop();
            driver.disable_notifications();
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queues a frame for transmission. Never blocks; success means queued,
    /// not sent.
    pub fn transmit(&self, frame: Frame) -> Result<(), Error> {
        match self.tx_queue.try_send(frame) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.raise(Fault::MemoryFull);
                warn!("rtcan: transmit queue full, frame dropped");
                Err(Error::OutOfMemory)
            }
        }
    }

    /// Delivers every accepted frame carrying `id` to `inbox`.
    ///
    /// The queue is registered by address; pass the same queue to
    /// [`Service::unsubscribe`]. Deliveries are [`FrameRef`] handles and
    /// each must be returned through [`Service::consume`].
    pub fn subscribe(&self, id: CanId, inbox: &'static dyn Inbox) -> Result<(), Error> {
        let result = self
            .registry
            .lock(|cell| cell.borrow_mut().subscribe(id.into_bits(), inbox));
        match result {
            Ok(()) => Ok(()),
            Err(RegistryError::TableFull) => {
                self.raise(Fault::MemoryFull);
                warn!("rtcan: subscriber table full");
                Err(Error::OutOfMemory)
            }
            Err(RegistryError::NodesFull) => {
                self.raise(Fault::MemoryFull);
                warn!("rtcan: subscriber pool full");
                Err(Error::OutOfMemory)
            }
        }
    }

    /// Stops delivering frames carrying `id` to `inbox`.
    ///
    /// Handles already delivered stay in the queue and still must be
    /// consumed.
    pub fn unsubscribe(&self, id: CanId, inbox: &'static dyn Inbox) -> Result<(), Error> {
        let result = self
            .registry
            .lock(|cell| cell.borrow_mut().unsubscribe(id.into_bits(), inbox));
        match result {
            Ok(()) => Ok(()),
            Err(UnsubscribeError::UnknownId) => {
                warn!("rtcan: no subscribers for this identifier");
                Err(Error::NotFound)
            }
            Err(UnsubscribeError::NotSubscribed) => {
                warn!("rtcan: queue not subscribed to this identifier");
                Err(Error::NotFound)
            }
        }
    }

    /// Number of queues subscribed to `id`.
    pub fn subscriber_count(&self, id: CanId) -> usize {
        self.registry
            .lock(|cell| cell.borrow().subscriber_count(id.into_bits()))
    }

    /// Returns a delivered handle; the last handle of a slot recycles it.
    pub fn consume(&self, frame: FrameRef) {
        if self.pool.release_holder(frame.into_index()).is_err() {
            self.raise(Fault::Internal);
        }
    }

    /// Stages an acceptance filter; [`Service::start`] commits staged
    /// filters to the controller.
    ///
    /// At most [`FILTER_BANK_COUNT`] filters fit.
    pub fn add_filter(&self, filter: Filter) -> Result<(), Error> {
        self.filters.lock(|cell| {
            cell.borrow_mut().push(filter).map_err(|_| {
                warn!("rtcan: filter banks exhausted");
                Error::OutOfMemory
            })
        })
    }

    /// Drops all staged filters.
    pub fn clear_filters(&self) {
        self.filters.lock(|cell| cell.borrow_mut().clear());
    }

    /// Sticky faults latched since the last [`Service::clear_faults`].
    pub fn faults(&self) -> FaultSet {
        FaultSet::from_bits_truncating(self.fault_bits.load(Ordering::Relaxed))
    }

    pub fn clear_faults(&self) {
        self.fault_bits
            .store(FaultSet::NONE.into_bits(), Ordering::Relaxed);
    }

    fn raise(&self, fault: Fault) {
        self.fault_bits
            .fetch_or(fault.into_bits(), Ordering::Relaxed);
    }

    /// Transmit-mailbox-complete interrupt entry; call once per completed
    /// mailbox.
    pub fn handle_tx_complete_isr(&self) {
        // Permits beyond the mailbox count are silently refused.
        let _ = self.mailbox_permits.try_send(());
    }

    /// Receive interrupt entry; handles one pending frame of `fifo`.
    pub fn handle_rx_isr(&self, fifo: RxFifo) {
        let frame = match self.driver.lock(|cell| cell.borrow_mut().receive(fifo)) {
            Ok(frame) => frame,
            Err(DriverError::Empty) => return,
            Err(_) => {
                self.raise(Fault::Hal);
                return;
            }
        };
        let Some(index) = self.pool.claim() else {
            // Newest frame loses when the pool runs dry.
            self.raise(Fault::MemoryFull);
            return;
        };
        if self.pool.commit(index, frame).is_err() {
            self.raise(Fault::Internal);
        }
    }

    /// Bus-error / status-change interrupt entry.
    ///
    /// A mailbox aborted by a bus error raises no completion interrupt, so
    /// one permit is returned here.
    pub fn handle_error_isr(&self) {
        let _ = self.mailbox_permits.try_send(());
        self.driver.lock(|cell| cell.borrow_mut().clear_errors());
        self.raise(Fault::Hal);
    }

    async fn run_tx(&self) {
        while self.is_running() {
            let frame = match with_timeout(self.config.poll_interval, self.tx_queue.receive()).await
            {
                Ok(frame) => frame,
                Err(_) => continue,
            };
            if with_timeout(self.config.mailbox_timeout, self.mailbox_permits.receive())
                .await
                .is_err()
            {
                self.raise(Fault::TxTimeout);
                warn!("rtcan: no transmit mailbox freed in time, frame dropped");
                continue;
            }
            let result = self.driver.lock(|cell| cell.borrow_mut().transmit(&frame));
            if result.is_err() {
                self.raise(Fault::Hal);
                // The controller took nothing; no completion interrupt will
                // return this permit.
                let _ = self.mailbox_permits.try_send(());
            }
        }
    }

    async fn run_rx(&self) {
        while self.is_running() {
            match with_timeout(self.config.poll_interval, self.pool.next_ready()).await {
                Ok(index) => self.dispatch(index),
                Err(_) => continue,
            }
        }
    }

    /// Fans a committed slot out to its subscribers.
    ///
    /// Runs under the registry lock so the holder count set before the
    /// first delivery covers exactly the chain being walked.
    fn dispatch(&self, index: SlotIndex) {
        let delivered = self.registry.lock(|cell| {
            let registry = cell.borrow();
            let key = {
                let probe = self.pool.make_ref(index);
                probe.id().into_bits()
            };
            let chain = registry.chain(key);
            let count = chain.clone().count();
            if count == 0 {
                return false;
            }
            self.pool.set_holders(index, count as u16);
            for inbox in chain {
                if inbox.try_deliver(self.pool.make_ref(index)).is_err() {
                    // Refused delivery: the dropped handle's hold comes back
                    // right here.
                    if self.pool.release_holder(index).is_err() {
                        self.raise(Fault::Internal);
                    }
                }
            }
            true
        });
        if !delivered && self.pool.recycle(index).is_err() {
            self.raise(Fault::Internal);
        }
    }
}

/// Feeds queued frames to the controller. Created by [`Service::start`].
pub struct TxRunner<'a, D, const TX: usize, const POOL: usize, const SLOTS: usize, const SUBS: usize>
{
    service: &'a Service<D, TX, POOL, SLOTS, SUBS>,
}

impl<D: Driver, const TX: usize, const POOL: usize, const SLOTS: usize, const SUBS: usize>
    TxRunner<'_, D, TX, POOL, SLOTS, SUBS>
{
    /// Runs the transmit worker; returns once the service stops.
    pub async fn run(&mut self) {
        self.service.run_tx().await;
    }
}

/// Fans received frames out to subscribers. Created by [`Service::start`].
pub struct RxRunner<'a, D, const TX: usize, const POOL: usize, const SLOTS: usize, const SUBS: usize>
{
    service: &'a Service<D, TX, POOL, SLOTS, SUBS>,
}

impl<D: Driver, const TX: usize, const POOL: usize, const SLOTS: usize, const SUBS: usize>
    RxRunner<'_, D, TX, POOL, SLOTS, SUBS>
{
    /// Runs the receive worker; returns once the service stops.
    pub async fn run(&mut self) {
        self.service.run_rx().await;
    }
}

/// Static cell binding a service instance to interrupt handlers.
///
/// Raw interrupt handlers cannot capture state, so the board binds the
/// placed service once at start-up and the handlers look it up. Calls
/// before [`IsrBinding::bind`] are ignored.
///
/// ```ignore
/// static CAN1: IsrBinding<DefaultService<BxcanDriver<Can1>>> = IsrBinding::new();
///
/// // in init: CAN1.bind(service);
/// // in the FIFO 0 interrupt handler:
/// CAN1.with(|service| service.handle_rx_isr(RxFifo::Fifo0));
/// ```
pub struct IsrBinding<S: 'static> {
    slot: Mutex<CriticalSectionRawMutex, Cell<Option<&'static S>>>,
}

impl<S> IsrBinding<S> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
        }
    }

    /// Makes `service` the target of subsequent interrupt calls.
    pub fn bind(&self, service: &'static S) {
        self.slot.lock(|cell| cell.set(Some(service)));
    }

    /// Runs `f` with the bound service, if one is bound.
    pub fn with(&self, f: impl FnOnce(&'static S)) {
        if let Some(service) = self.slot.lock(|cell| cell.get()) {
            f(service);
        }
    }
}

impl<S> Default for IsrBinding<S> {
    fn default() -> Self {
        Self::new()
    }
}
