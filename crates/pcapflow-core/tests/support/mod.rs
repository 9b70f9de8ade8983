#![allow(dead_code)]

use std::fs;
use std::path::Path;

use etherparse::PacketBuilder;

const PCAPNG_SHB: u32 = 0x0A0D_0D0A;
const PCAPNG_IDB: u32 = 1;
const PCAPNG_EPB: u32 = 6;
const LINKTYPE_ETHERNET: u16 = 1;
const OPT_ENDOFOPT: u16 = 0;
const OPT_IF_TSRESOL: u16 = 9;
const LEGACY_MAGIC_MICROS: u32 = 0xA1B2_C3D4;

/// One frame to write: timestamp in microseconds and link-layer bytes.
pub struct Frame {
    pub ts_us: u64,
    pub data: Vec<u8>,
}

pub fn tcp_frame(ts_us: u64) -> Frame {
    let builder = PacketBuilder::ethernet2([0x02; 6], [0x04; 6])
        .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
        .tcp(51000, 80, 1, 4096);
    let payload = b"GET / HTTP/1.1\r\n\r\n";
    let mut data = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut data, payload).unwrap();
    Frame { ts_us, data }
}

pub fn udp_frame(ts_us: u64) -> Frame {
    let builder = PacketBuilder::ethernet2([0x02; 6], [0x04; 6])
        .ipv4([192, 168, 1, 5], [192, 168, 1, 1], 64)
        .udp(5353, 53);
    let payload = [0u8; 12];
    let mut data = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut data, &payload).unwrap();
    Frame { ts_us, data }
}

/// Ethernet frame with a local experimental ethertype: no IP, no transport.
pub fn non_ip_frame(ts_us: u64) -> Frame {
    let mut data = vec![0xff; 6];
    data.extend_from_slice(&[0x02; 6]);
    data.extend_from_slice(&0x88b5u16.to_be_bytes());
    data.extend_from_slice(&[0u8; 46]);
    Frame { ts_us, data }
}

/// Three frames in order: TCP over IPv4, UDP over IPv4, non-IP.
pub fn mixed_frames() -> Vec<Frame> {
    vec![
        tcp_frame(1_000_000),
        udp_frame(1_500_000),
        non_ip_frame(2_000_000),
    ]
}

/// PCAPNG file whose interface uses the default microsecond resolution.
pub fn write_pcapng(path: &Path, frames: &[Frame]) {
    write_pcapng_blocks(path, frames, None);
}

/// PCAPNG file whose interface declares nanosecond timestamps (`if_tsresol` 9).
pub fn write_pcapng_nanos(path: &Path, frames: &[Frame]) {
    write_pcapng_blocks(path, frames, Some(9));
}

fn write_pcapng_blocks(path: &Path, frames: &[Frame], tsresol: Option<u8>) {
    let ticks_per_us = match tsresol {
        Some(exp) => 10u64.pow(u32::from(exp)) / 1_000_000,
        None => 1,
    };
    let mut output = Vec::new();
    output.extend_from_slice(&pcapng_block(PCAPNG_SHB, &section_header_body()));
    output.extend_from_slice(&pcapng_block(PCAPNG_IDB, &interface_desc_body(tsresol)));
    for frame in frames {
        let body = enhanced_packet_body(frame, frame.ts_us * ticks_per_us);
        output.extend_from_slice(&pcapng_block(PCAPNG_EPB, &body));
    }
    fs::write(path, output).unwrap();
}

/// Classic little-endian microsecond pcap file.
pub fn write_legacy_pcap(path: &Path, frames: &[Frame]) {
    let mut output = Vec::new();
    output.extend_from_slice(&LEGACY_MAGIC_MICROS.to_le_bytes());
    output.extend_from_slice(&2u16.to_le_bytes());
    output.extend_from_slice(&4u16.to_le_bytes());
    output.extend_from_slice(&0i32.to_le_bytes());
    output.extend_from_slice(&0u32.to_le_bytes());
    output.extend_from_slice(&65535u32.to_le_bytes());
    output.extend_from_slice(&u32::from(LINKTYPE_ETHERNET).to_le_bytes());
    for frame in frames {
        let len = frame.data.len() as u32;
        output.extend_from_slice(&((frame.ts_us / 1_000_000) as u32).to_le_bytes());
        output.extend_from_slice(&((frame.ts_us % 1_000_000) as u32).to_le_bytes());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(&frame.data);
    }
    fs::write(path, output).unwrap();
}

fn pcapng_block(block_type: u32, body: &[u8]) -> Vec<u8> {
    let total_len = (8 + body.len() + 4) as u32;
    let mut block = Vec::with_capacity(total_len as usize);
    block.extend_from_slice(&block_type.to_be_bytes());
    block.extend_from_slice(&total_len.to_be_bytes());
    block.extend_from_slice(body);
    block.extend_from_slice(&total_len.to_be_bytes());
    block
}

fn section_header_body() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0x1A2B_3C4Du32.to_be_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&(-1i64).to_be_bytes());
    body
}

fn interface_desc_body(tsresol: Option<u8>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&LINKTYPE_ETHERNET.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&65535u32.to_be_bytes());
    if let Some(tsresol) = tsresol {
        body.extend_from_slice(&OPT_IF_TSRESOL.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&[tsresol, 0, 0, 0]);
        body.extend_from_slice(&OPT_ENDOFOPT.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
    }
    body
}

fn enhanced_packet_body(frame: &Frame, ticks: u64) -> Vec<u8> {
    let ts_high = (ticks >> 32) as u32;
    let ts_low = (ticks & 0xFFFF_FFFF) as u32;
    let cap_len = frame.data.len() as u32;
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&ts_high.to_be_bytes());
    body.extend_from_slice(&ts_low.to_be_bytes());
    body.extend_from_slice(&cap_len.to_be_bytes());
    body.extend_from_slice(&cap_len.to_be_bytes());
    body.extend_from_slice(&frame.data);
    let pad_len = (4 - (frame.data.len() % 4)) % 4;
    body.extend(std::iter::repeat_n(0u8, pad_len));
    body
}
