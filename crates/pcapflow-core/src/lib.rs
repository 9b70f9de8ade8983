//! pcapflow core library: capture → normalize → deliver.
//!
//! Capture sources (`source`) produce raw frames, either replayed from a
//! PCAP/PCAPNG file or sampled live from an interface in bounded bursts. The
//! normalizer turns each frame into a [`PacketRecord`], and the pipeline
//! hands records to the configured sinks: a one-shot file export (JSON or
//! CSV) and/or a live push stream served over WebSocket.
//!
//! Invariants:
//! - Records leave the normalizer immutable and in capture order.
//! - Protocol classification is a closed, ordered check: TCP, then UDP,
//!   then Unknown.
//! - Per-frame and per-subscriber failures never stop the pipeline; only
//!   source failures do.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use pcapflow_core::{ExportFormat, ExportSink, Pipeline};
//!
//! let mut pipeline = Pipeline::new().with_export(ExportSink::new(ExportFormat::Json, "."));
//! let summary = pipeline.run_offline(Path::new("capture.pcapng"))?;
//! println!("{} records", summary.records);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

pub use pcap_parser::Linktype;

mod export;
mod normalize;
mod pipeline;
mod source;
mod stream;

pub use export::{EXPORT_FILE_STEM, ExportError, ExportFormat, ExportSink};
pub use normalize::{FrameError, normalize};
pub use pipeline::{Pipeline, PipelineError, PipelineState, RunSummary};
pub use source::{
    BurstConfig, BurstSource, CaptureBurst, DEFAULT_BURST_COUNT, DEFAULT_BURST_INTERVAL,
    DEFAULT_BURST_TIMEOUT, FrameDevice, LiveSource, PacketSource, PcapFileSource, RawFrame,
    SourceError,
};
#[cfg(feature = "live")]
pub use source::{DEFAULT_SNAPLEN, LiveConfig, PcapDevice, open_live};
pub use stream::{
    DEFAULT_STREAM_ADDR, DeliveryError, StreamError, StreamServer, StreamSink, SubscriberId,
    Subscription,
};

/// Placeholder written to fixed-schema outputs for fields a record lacks.
pub const NOT_AVAILABLE: &str = "N/A";

/// Transport-layer classification of a frame.
///
/// # Examples
/// ```
/// use pcapflow_core::Protocol;
///
/// assert_eq!(Protocol::default(), Protocol::Unknown);
/// assert_eq!(Protocol::Tcp.as_str(), "TCP");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[default]
    Unknown,
}

impl Protocol {
    /// Wire name used in every output format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized packet.
///
/// Addresses are either both present (an IP layer was decoded) or both
/// absent. Absent addresses are omitted from JSON.
///
/// # Examples
/// ```
/// use pcapflow_core::{PacketRecord, Protocol};
///
/// let record = PacketRecord::new(1.5, 60, Protocol::Udp, None);
/// assert_eq!(record.size(), 60);
/// assert!(record.source_address().is_none());
/// let json = serde_json::to_string(&record).unwrap();
/// assert_eq!(json, r#"{"timestamp":1.5,"size":60,"protocol":"UDP"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    timestamp: f64,
    size: u64,
    protocol: Protocol,
    #[serde(rename = "src_ip", default, skip_serializing_if = "Option::is_none")]
    source_address: Option<String>,
    #[serde(rename = "dst_ip", default, skip_serializing_if = "Option::is_none")]
    destination_address: Option<String>,
}

impl PacketRecord {
    /// Column names in output order.
    pub const FIELD_NAMES: [&'static str; 5] = ["timestamp", "size", "protocol", "src_ip", "dst_ip"];

    pub fn new(
        timestamp: f64,
        size: u64,
        protocol: Protocol,
        addresses: Option<(IpAddr, IpAddr)>,
    ) -> Self {
        let (source_address, destination_address) = match addresses {
            Some((src, dst)) => (Some(src.to_string()), Some(dst.to_string())),
            None => (None, None),
        };
        Self {
            timestamp: timestamp.max(0.0),
            size,
            protocol,
            source_address,
            destination_address,
        }
    }

    /// Capture time in fractional seconds since the Unix epoch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Frame length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn source_address(&self) -> Option<&str> {
        self.source_address.as_deref()
    }

    pub fn destination_address(&self) -> Option<&str> {
        self.destination_address.as_deref()
    }

    /// Field set used as the header of fixed-schema exports.
    pub fn field_names(&self) -> [&'static str; 5] {
        Self::FIELD_NAMES
    }

    /// Values in [`PacketRecord::FIELD_NAMES`] order, with [`NOT_AVAILABLE`]
    /// standing in for missing addresses.
    pub fn csv_values(&self) -> [String; 5] {
        [
            format_timestamp(self.timestamp),
            self.size.to_string(),
            self.protocol.to_string(),
            self.source_address
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            self.destination_address
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        ]
    }
}

/// Timestamp text as serde_json writes it, so `3.0` stays `3.0` in CSV.
fn format_timestamp(ts: f64) -> String {
    serde_json::Number::from_f64(ts)
        .map(|n| n.to_string())
        .unwrap_or_else(|| ts.to_string())
}
