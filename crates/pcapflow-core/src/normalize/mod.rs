//! Frame → record normalization.
//!
//! Timestamp and size always come from the capture header; protocol and
//! addresses come from whatever layers etherparse can slice out of the frame.

mod error;
mod layers;

pub use error::FrameError;

use crate::PacketRecord;
use crate::source::RawFrame;

/// Normalize one raw frame.
///
/// # Errors
/// `FrameError` when the outermost header of the frame cannot be read. The
/// error is per-frame; callers skip the frame and continue.
///
/// # Examples
/// ```
/// use pcapflow_core::{Linktype, Protocol, RawFrame, normalize};
///
/// let frame = RawFrame {
///     ts: 1.0,
///     linktype: Linktype(147),
///     wire_len: 2,
///     data: vec![0xde, 0xad],
/// };
/// let record = normalize(&frame).unwrap();
/// assert_eq!(record.protocol(), Protocol::Unknown);
/// assert_eq!(record.size(), 2);
/// ```
pub fn normalize(frame: &RawFrame) -> Result<PacketRecord, FrameError> {
    let layers = layers::decode(frame.linktype, &frame.data)?;
    let size = u64::from(frame.wire_len.max(frame.data.len() as u32));
    Ok(PacketRecord::new(
        frame.ts,
        size,
        layers.protocol,
        layers.addresses,
    ))
}
