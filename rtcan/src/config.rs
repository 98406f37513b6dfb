//! Service configuration.

use embassy_time::Duration;
use rtcan_driver::driver::Bitrate;

/// Service configuration.
///
/// ```ignore
/// let mut config = rtcan::Config::default();
/// config.bitrate = Bitrate::Kbit250;
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Nominal bus bit rate.
    ///
    /// Default: 500 kbit/s.
    pub bitrate: Bitrate,

    /// Routes transmitted frames back into reception without driving the
    /// bus pins.
    ///
    /// Default: disabled.
    pub loopback: bool,

    /// Listen-only mode: the controller never transmits, not even ACK bits.
    ///
    /// Default: disabled.
    pub silent: bool,

    /// How long a worker waits for queue activity before re-checking the
    /// running flag. Bounds the latency of [`stop`](crate::Service::stop).
    ///
    /// Default: 100 ms.
    pub poll_interval: Duration,

    /// How long the transmit worker waits for a free mailbox before dropping
    /// the frame and latching [`Fault::TxTimeout`](crate::Fault::TxTimeout).
    ///
    /// Default: 500 ms.
    pub mailbox_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bitrate: Bitrate::default(),
            loopback: false,
            silent: false,
            poll_interval: Duration::from_millis(100),
            mailbox_timeout: Duration::from_millis(500),
        }
    }
}
