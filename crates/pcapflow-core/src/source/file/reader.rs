use std::io::{Read, Seek, SeekFrom};

use super::error::FileSourceError;
use super::layout;
use pcap_parser::Linktype;

/// Read the magic bytes and rewind the reader to the start.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// use std::io::Cursor;
///
/// let bytes = [0x0a, 0x0d, 0x0d, 0x0a, 0x01];
/// let mut cursor = Cursor::new(bytes);
/// let magic = read_magic_and_rewind(&mut cursor).unwrap();
/// assert_eq!(magic, [0x0a, 0x0d, 0x0d, 0x0a]);
/// ```
///
/// # Errors
/// Returns `FileSourceError::Io` when the reader is shorter than the magic or
/// cannot be rewound.
pub fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], FileSourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

pub fn is_pcapng_magic(magic: &[u8; 4]) -> bool {
    magic == &layout::PCAPNG_MAGIC
}

/// Per-interface facts from a PCAPNG Interface Description Block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub linktype: Linktype,
    /// Timestamp units per second (`if_tsresol`).
    pub units_per_second: u64,
    /// Seconds added to every timestamp (`if_tsoffset`).
    pub offset_seconds: i64,
}

impl Default for InterfaceInfo {
    fn default() -> Self {
        Self {
            linktype: Linktype::ETHERNET,
            units_per_second: layout::DEFAULT_TS_UNITS_PER_SECOND,
            offset_seconds: 0,
        }
    }
}

/// Units per second encoded by an `if_tsresol` option value.
///
/// The high bit selects a power of two, otherwise a power of ten. Values that
/// overflow fall back to microseconds.
pub fn ts_units_per_second(tsresol: u8) -> u64 {
    let exponent = u32::from(tsresol & layout::TSRESOL_EXPONENT_MASK);
    let units = if tsresol & layout::TSRESOL_BINARY_FLAG != 0 {
        2u64.checked_pow(exponent)
    } else {
        10u64.checked_pow(exponent)
    };
    units.unwrap_or(layout::DEFAULT_TS_UNITS_PER_SECOND)
}

/// Resolve the interface for a given interface id, defaulting to Ethernet
/// with microsecond timestamps.
pub fn interface_for_id(interfaces: &[InterfaceInfo], if_id: u32) -> InterfaceInfo {
    interfaces
        .get(if_id as usize)
        .copied()
        .unwrap_or_default()
}

/// Convert a PCAPNG high/low timestamp to seconds using the interface's
/// resolution and offset.
pub fn pcapng_ts_to_seconds(ts_high: u32, ts_low: u32, interface: &InterfaceInfo) -> f64 {
    let ts = (u64::from(ts_high) << 32) | u64::from(ts_low);
    let units = interface.units_per_second.max(1);
    let whole = (ts / units) as f64;
    let fraction = (ts % units) as f64 / units as f64;
    interface.offset_seconds as f64 + whole + fraction
}

/// Convert a legacy record timestamp to seconds. The fractional part is in
/// nanoseconds for nanosecond-precision files, microseconds otherwise.
pub fn legacy_ts_to_seconds(ts_sec: u32, ts_frac: u32, nanosecond: bool) -> f64 {
    let scale = if nanosecond {
        layout::NANOS_PER_SECOND
    } else {
        layout::MICROS_PER_SECOND
    };
    ts_sec as f64 + ts_frac as f64 / scale
}
