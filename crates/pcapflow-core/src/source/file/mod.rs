//! Capture file source.
//!
//! Reads legacy PCAP and PCAPNG files (detected from the leading magic) and
//! yields raw frames in file order. All file I/O of the offline path lives
//! here.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::PcapFileSource;
