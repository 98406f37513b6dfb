//! Publisher/subscriber test over the CAN service.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::bind_interrupts;
use embassy_time::{Duration, Ticker};
use nucleo_f767zi::board;
use nucleo_f767zi::can1::{self, Can1, CanService};
use rtcan::{Config, Data, Frame, InboxChannel, RxRunner, Service, StandardId, TxRunner};
use rtcan_stm32f7::BxcanDriver;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    CAN1_RX0 => can1::Rx0InterruptHandler;
    CAN1_RX1 => can1::Rx1InterruptHandler;
    CAN1_TX => can1::TxInterruptHandler;
    CAN1_SCE => can1::SceInterruptHandler;
});

const PING_ID: StandardId = StandardId::new(0x321).unwrap();

type CanTxRunner = TxRunner<'static, BxcanDriver<Can1>, 16, 64, 32, 64>;
type CanRxRunner = RxRunner<'static, BxcanDriver<Can1>, 16, 64, 32, 64>;

static INBOX: InboxChannel<8> = InboxChannel::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_stm32::init(board::make_peripheral_config());
    let can = can1::init(p.CAN1, p.PD0, p.PD1, Irqs);

    let service: &'static CanService = {
        static CELL: StaticCell<CanService> = StaticCell::new();
        let mut config = Config::default();
        // Self-contained: every sent frame comes back through the filters.
        config.loopback = true;
        CELL.init(Service::new(
            BxcanDriver::new(can, board::CAN_CLOCK_HZ),
            config,
        ))
    };
    can1::CAN1_SERVICE.bind(service);

    unwrap!(service.subscribe(PING_ID.into(), &INBOX));

    let (tx_runner, rx_runner) = unwrap!(service.start());
    unwrap!(spawner.spawn(tx_worker(tx_runner)));
    unwrap!(spawner.spawn(rx_worker(rx_runner)));

    unwrap!(spawner.spawn(sender(service)));
    unwrap!(spawner.spawn(receiver(service)));

    // Keep IO initialized
    let () = core::future::pending().await;
    defmt::unreachable!();
}

#[embassy_executor::task]
async fn sender(service: &'static CanService) -> ! {
    let mut ticker = Ticker::every(Duration::from_secs(1));
    let mut seq = 0u8;
    loop {
        ticker.next().await;
        info!("Send a ping: {}", seq);
        let data = unwrap!(Data::new(&[seq]));
        if service.transmit(Frame::new(PING_ID, data)).is_err() {
            warn!("Transmit queue backed up; faults: {}", service.faults());
        }
        seq = seq.wrapping_add(1);
    }
}

#[embassy_executor::task]
async fn receiver(service: &'static CanService) -> ! {
    loop {
        let frame = INBOX.receive().await;
        info!(
            "Received a ping: id {=u32:#x}, data {}",
            frame.id().raw(),
            frame.data()
        );
        service.consume(frame);
    }
}

#[embassy_executor::task]
async fn tx_worker(mut runner: CanTxRunner) {
    runner.run().await
}

#[embassy_executor::task]
async fn rx_worker(mut runner: CanRxRunner) {
    runner.run().await
}
