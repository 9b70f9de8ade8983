//! Live capture in bounded bursts.
//!
//! A burst ends after `count` frames or once `timeout` has elapsed, whichever
//! comes first. Callers pause for `interval` between bursts; the pause keeps
//! the capture loop from flooding downstream sinks and is part of the
//! source's configuration rather than a fixed delay.

use std::time::{Duration, Instant};

use super::{RawFrame, SourceError};

pub const DEFAULT_BURST_COUNT: usize = 5;
pub const DEFAULT_BURST_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_BURST_INTERVAL: Duration = Duration::from_secs(1);

/// Pacing parameters of a live source.
///
/// # Examples
/// ```
/// use pcapflow_core::BurstConfig;
///
/// let config = BurstConfig::default();
/// assert_eq!(config.count, 5);
/// assert_eq!(config.timeout.as_secs(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstConfig {
    /// Maximum frames per burst.
    pub count: usize,
    /// Maximum sampling time per burst.
    pub timeout: Duration,
    /// Pause between bursts.
    pub interval: Duration,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_BURST_COUNT,
            timeout: DEFAULT_BURST_TIMEOUT,
            interval: DEFAULT_BURST_INTERVAL,
        }
    }
}

/// Frames gathered by one sampling cycle, in arrival order.
#[derive(Debug, Default)]
pub struct CaptureBurst {
    frames: Vec<RawFrame>,
}

impl CaptureBurst {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl From<Vec<RawFrame>> for CaptureBurst {
    fn from(frames: Vec<RawFrame>) -> Self {
        Self { frames }
    }
}

impl IntoIterator for CaptureBurst {
    type Item = RawFrame;
    type IntoIter = std::vec::IntoIter<RawFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

/// Low-level frame producer behind a live source.
pub trait FrameDevice {
    /// Wait at most `wait` for the next frame; `Ok(None)` when nothing arrived.
    fn poll_frame(&mut self, wait: Duration) -> Result<Option<RawFrame>, SourceError>;
}

/// A source that yields frames in paced bursts.
pub trait BurstSource {
    /// Sample one burst. Blocks for at most the configured burst timeout.
    fn next_burst(&mut self) -> Result<CaptureBurst, SourceError>;

    /// Pause the caller should observe before the next burst.
    fn interval(&self) -> Duration;
}

pub struct LiveSource<D> {
    device: D,
    config: BurstConfig,
}

impl<D: FrameDevice> LiveSource<D> {
    pub fn new(device: D, config: BurstConfig) -> Self {
        Self { device, config }
    }

    pub fn config(&self) -> &BurstConfig {
        &self.config
    }
}

impl<D: FrameDevice> BurstSource for LiveSource<D> {
    fn next_burst(&mut self) -> Result<CaptureBurst, SourceError> {
        let deadline = Instant::now() + self.config.timeout;
        let mut frames = Vec::with_capacity(self.config.count);

        while frames.len() < self.config.count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if let Some(frame) = self.device.poll_frame(remaining)? {
                frames.push(frame);
            }
        }

        Ok(CaptureBurst { frames })
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }
}

#[cfg(feature = "live")]
pub use device::{DEFAULT_SNAPLEN, LiveConfig, PcapDevice, open_live};

#[cfg(feature = "live")]
mod device {
    use std::thread;
    use std::time::{Duration, Instant};

    use pcap::{Active, Capture, Device};
    use pcap_parser::Linktype;
    use tracing::info;

    use super::{BurstConfig, FrameDevice, LiveSource};
    use crate::source::{RawFrame, SourceError};

    pub const DEFAULT_SNAPLEN: i32 = 65_535;
    /// Sleep between polls of the non-blocking capture handle.
    const POLL_TICK: Duration = Duration::from_millis(10);

    /// Live capture settings.
    #[derive(Debug, Clone)]
    pub struct LiveConfig {
        /// Interface name; the system default device when `None`.
        pub interface: Option<String>,
        /// Optional BPF filter expression.
        pub filter: Option<String>,
        pub snaplen: i32,
        pub promiscuous: bool,
        pub burst: BurstConfig,
    }

    impl Default for LiveConfig {
        fn default() -> Self {
            Self {
                interface: None,
                filter: None,
                snaplen: DEFAULT_SNAPLEN,
                promiscuous: false,
                burst: BurstConfig::default(),
            }
        }
    }

    /// libpcap capture handle in non-blocking mode.
    pub struct PcapDevice {
        capture: Capture<Active>,
        linktype: Linktype,
    }

    impl PcapDevice {
        pub fn open(config: &LiveConfig) -> Result<Self, SourceError> {
            let device = match config.interface.as_deref() {
                Some(name) => Device::list()
                    .map_err(capture_error)?
                    .into_iter()
                    .find(|d| d.name == name)
                    .ok_or_else(|| SourceError::Capture(format!("interface '{name}' not found")))?,
                None => Device::lookup()
                    .map_err(capture_error)?
                    .ok_or_else(|| SourceError::Capture("no capture device found".to_string()))?,
            };
            let name = device.name.clone();

            let mut capture = Capture::from_device(device)
                .map_err(capture_error)?
                .snaplen(config.snaplen)
                .promisc(config.promiscuous)
                .immediate_mode(true)
                .open()
                .map_err(capture_error)?
                .setnonblock()
                .map_err(capture_error)?;

            if let Some(filter) = config.filter.as_deref() {
                capture.filter(filter, true).map_err(|err| {
                    SourceError::Capture(format!("invalid BPF filter '{filter}': {err}"))
                })?;
            }

            let linktype = Linktype(capture.get_datalink().0);
            info!(interface = %name, linktype = linktype.0, "live capture opened");
            Ok(Self { capture, linktype })
        }
    }

    impl FrameDevice for PcapDevice {
        fn poll_frame(&mut self, wait: Duration) -> Result<Option<RawFrame>, SourceError> {
            let deadline = Instant::now() + wait;
            loop {
                match self.capture.next_packet() {
                    Ok(packet) => {
                        let tv = packet.header.ts;
                        let secs = (tv.tv_sec as i64).max(0) as f64;
                        let usecs = (tv.tv_usec as i64).clamp(0, 999_999) as f64;
                        return Ok(Some(RawFrame {
                            ts: secs + usecs / 1e6,
                            linktype: self.linktype,
                            wire_len: packet.header.len,
                            data: packet.data.to_vec(),
                        }));
                    }
                    Err(pcap::Error::TimeoutExpired) => {}
                    Err(err) => return Err(capture_error(err)),
                }

                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }
                thread::sleep(POLL_TICK.min(remaining));
            }
        }
    }

    /// Open the configured interface as a paced live source.
    pub fn open_live(config: &LiveConfig) -> Result<LiveSource<PcapDevice>, SourceError> {
        let device = PcapDevice::open(config)?;
        Ok(LiveSource::new(device, config.burst))
    }

    fn capture_error(err: pcap::Error) -> SourceError {
        SourceError::Capture(err.to_string())
    }
}
