use std::fs::File;
use std::io;
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader,
    traits::PcapReaderIterator,
};
use tracing::debug;

use crate::source::{PacketSource, RawFrame, SourceError};

use super::error::FileSourceError;
use super::layout;
use super::reader::{
    InterfaceInfo, interface_for_id, is_pcapng_magic, legacy_ts_to_seconds, pcapng_ts_to_seconds,
    read_magic_and_rewind, ts_units_per_second,
};

/// Offline capture source over a PCAP or PCAPNG file.
pub struct PcapFileSource {
    inner: FileReader,
}

enum FileReader {
    Legacy {
        reader: LegacyPcapReader<File>,
        linktype: Option<Linktype>,
        nanosecond: bool,
    },
    Ng {
        reader: PcapNGReader<File>,
        interfaces: Vec<InterfaceInfo>,
    },
}

impl PcapFileSource {
    /// Open a capture file.
    ///
    /// # Errors
    /// `SourceError::NotFound` when the path does not resolve, `Io`/`Pcap`
    /// when the file is unreadable or its header is invalid.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(path.to_path_buf()),
            _ => SourceError::Io(err),
        })?;
        let inner = create_reader(file).map_err(SourceError::from)?;
        debug!(path = %path.display(), "capture file opened");
        Ok(Self { inner })
    }
}

impl PacketSource for PcapFileSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        next_frame(&mut self.inner).map_err(SourceError::from)
    }
}

fn create_reader(mut file: File) -> Result<FileReader, FileSourceError> {
    let magic = read_magic_and_rewind(&mut file)?;

    if is_pcapng_magic(&magic) {
        let reader = PcapNGReader::new(layout::PCAP_READER_BUFFER_SIZE, file).map_err(|e| {
            FileSourceError::Pcap {
                context: "pcapng reader init",
                message: e.to_string(),
            }
        })?;
        Ok(FileReader::Ng {
            reader,
            interfaces: Vec::new(),
        })
    } else {
        let reader = LegacyPcapReader::new(layout::PCAP_READER_BUFFER_SIZE, file).map_err(|e| {
            FileSourceError::Pcap {
                context: "pcap reader init",
                message: e.to_string(),
            }
        })?;
        Ok(FileReader::Legacy {
            reader,
            linktype: None,
            nanosecond: false,
        })
    }
}

fn next_frame(reader: &mut FileReader) -> Result<Option<RawFrame>, FileSourceError> {
    loop {
        match reader {
            FileReader::Legacy {
                reader,
                linktype,
                nanosecond,
            } => match reader.next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::LegacyHeader(header) => {
                            *linktype = Some(header.network);
                            *nanosecond = header.is_nanosecond_precision();
                            None
                        }
                        PcapBlockOwned::Legacy(packet) => Some(RawFrame {
                            ts: legacy_ts_to_seconds(packet.ts_sec, packet.ts_usec, *nanosecond),
                            linktype: linktype.unwrap_or(Linktype::ETHERNET),
                            wire_len: packet.origlen,
                            data: packet.data.to_vec(),
                        }),
                        _ => None,
                    };
                    reader.consume(offset);
                    if frame.is_some() {
                        return Ok(frame);
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| FileSourceError::Pcap {
                        context: "pcap reader refill",
                        message: e.to_string(),
                    })?;
                }
                Err(e) => {
                    return Err(FileSourceError::Pcap {
                        context: "pcap reader next",
                        message: e.to_string(),
                    });
                }
            },
            FileReader::Ng { reader, interfaces } => match reader.next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                            // Interface ids restart with every section.
                            interfaces.clear();
                            None
                        }
                        PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                            interfaces.push(InterfaceInfo {
                                linktype: intf.linktype,
                                units_per_second: ts_units_per_second(intf.if_tsresol),
                                offset_seconds: intf.if_tsoffset as i64,
                            });
                            None
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                            let interface = interface_for_id(interfaces, packet.if_id);
                            Some(RawFrame {
                                ts: pcapng_ts_to_seconds(packet.ts_high, packet.ts_low, &interface),
                                linktype: interface.linktype,
                                wire_len: packet.origlen,
                                data: packet.data.to_vec(),
                            })
                        }
                        _ => None,
                    };
                    reader.consume(offset);
                    if frame.is_some() {
                        return Ok(frame);
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| FileSourceError::Pcap {
                        context: "pcapng reader refill",
                        message: e.to_string(),
                    })?;
                }
                Err(e) => {
                    return Err(FileSourceError::Pcap {
                        context: "pcapng reader next",
                        message: e.to_string(),
                    });
                }
            },
        }
    }
}
