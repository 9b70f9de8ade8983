//! Capture sources.
//!
//! Offline sources implement [`PacketSource`] and yield frames one at a time
//! until the file is exhausted. Live sources implement [`BurstSource`] and
//! yield bounded bursts forever; the caller paces them with
//! [`BurstSource::interval`].

mod file;
mod live;

use std::path::PathBuf;

pub use file::PcapFileSource;
pub use live::{
    BurstConfig, BurstSource, CaptureBurst, DEFAULT_BURST_COUNT, DEFAULT_BURST_INTERVAL,
    DEFAULT_BURST_TIMEOUT, FrameDevice, LiveSource,
};
#[cfg(feature = "live")]
pub use live::{DEFAULT_SNAPLEN, LiveConfig, PcapDevice, open_live};

use pcap_parser::Linktype;
use thiserror::Error;

/// One captured frame, before interpretation.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Capture time in fractional seconds since the Unix epoch.
    pub ts: f64,
    pub linktype: Linktype,
    /// Length of the frame on the wire (may exceed `data.len()` when the
    /// capture was truncated by a snaplen).
    pub wire_len: u32,
    pub data: Vec<u8>,
}

pub trait PacketSource {
    /// Next frame in capture order, or `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("capture file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PCAP parse error: {0}")]
    Pcap(String),
    #[error("capture mechanism failed: {0}")]
    Capture(String),
}

impl SourceError {
    /// Whether the error originates from a live capture facility.
    pub fn is_capture(&self) -> bool {
        matches!(self, SourceError::Capture(_))
    }
}

impl From<file::error::FileSourceError> for SourceError {
    fn from(value: file::error::FileSourceError) -> Self {
        match value {
            file::error::FileSourceError::Io(err) => SourceError::Io(err),
            file::error::FileSourceError::Pcap { context, message } => {
                SourceError::Pcap(format!("{context}: {message}"))
            }
        }
    }
}
