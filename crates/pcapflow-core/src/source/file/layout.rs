/// Section header block type, which doubles as the PCAPNG file magic.
pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
/// Initial buffer size handed to the pcap-parser readers.
pub const PCAP_READER_BUFFER_SIZE: usize = 64 * 1024;
pub const MICROS_PER_SECOND: f64 = 1e6;
pub const NANOS_PER_SECOND: f64 = 1e9;
/// `if_tsresol` bit selecting a power-of-two resolution.
pub const TSRESOL_BINARY_FLAG: u8 = 0x80;
pub const TSRESOL_EXPONENT_MASK: u8 = 0x7f;
/// PCAPNG interfaces without `if_tsresol` count microseconds.
pub const DEFAULT_TS_UNITS_PER_SECOND: u64 = 1_000_000;
