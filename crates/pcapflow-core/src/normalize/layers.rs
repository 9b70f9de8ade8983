use std::net::IpAddr;

use etherparse::{LaxNetSlice, LaxSlicedPacket, TransportSlice};
use pcap_parser::Linktype;

use crate::Protocol;

use super::error::FrameError;

/// Linux cooked capture (v1) header; the protocol type sits in the last two bytes.
const SLL_HEADER_LEN: usize = 16;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;

/// Layer facts extracted from a frame.
#[derive(Debug, Default, PartialEq)]
pub struct Layers {
    pub protocol: Protocol,
    pub addresses: Option<(IpAddr, IpAddr)>,
}

/// Slice a link-layer frame and extract its layer facts.
///
/// Slicing is lax: a frame cut short by the capture snaplen keeps every layer
/// that was fully captured. Only a frame whose outermost header cannot be
/// read is a [`FrameError`]. Empty frames and link types without a decoder
/// yield `Layers::default()`.
pub fn decode(linktype: Linktype, data: &[u8]) -> Result<Layers, FrameError> {
    if data.is_empty() {
        return Ok(Layers::default());
    }

    let sliced = match linktype {
        Linktype::ETHERNET => LaxSlicedPacket::from_ethernet(data).map_err(slice_error)?,
        Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => {
            LaxSlicedPacket::from_ip(data).map_err(slice_error)?
        }
        Linktype::LINUX_SLL => match linux_sll_ip_payload(data)? {
            Some(ip) => LaxSlicedPacket::from_ip(ip).map_err(slice_error)?,
            None => return Ok(Layers::default()),
        },
        _ => return Ok(Layers::default()),
    };

    Ok(Layers {
        protocol: classify(sliced.transport.as_ref()),
        addresses: addresses(sliced.net.as_ref()),
    })
}

/// IP payload of a Linux cooked capture frame, `None` for non-IP protocols.
fn linux_sll_ip_payload(data: &[u8]) -> Result<Option<&[u8]>, FrameError> {
    if data.len() < SLL_HEADER_LEN {
        return Err(FrameError::Slice(format!(
            "linux cooked header needs {SLL_HEADER_LEN} bytes, got {}",
            data.len()
        )));
    }
    let protocol = u16::from_be_bytes([data[SLL_HEADER_LEN - 2], data[SLL_HEADER_LEN - 1]]);
    match protocol {
        ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => Ok(Some(&data[SLL_HEADER_LEN..])),
        _ => Ok(None),
    }
}

/// Ordered transport classification: TCP, then UDP, then Unknown.
pub fn classify(transport: Option<&TransportSlice<'_>>) -> Protocol {
    match transport {
        Some(TransportSlice::Tcp(_)) => Protocol::Tcp,
        Some(TransportSlice::Udp(_)) => Protocol::Udp,
        _ => Protocol::Unknown,
    }
}

fn addresses(net: Option<&LaxNetSlice<'_>>) -> Option<(IpAddr, IpAddr)> {
    match net {
        Some(LaxNetSlice::Ipv4(ipv4)) => Some((
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        )),
        Some(LaxNetSlice::Ipv6(ipv6)) => Some((
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        )),
        _ => None,
    }
}

fn slice_error(err: impl std::fmt::Display) -> FrameError {
    FrameError::Slice(err.to_string())
}
