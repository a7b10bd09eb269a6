//! Intel HEX decoding.
//!
//! An Intel HEX file is a sequence of ASCII records, one per line:
//!
//! ```text
//! :LL AAAA TT DD.. CC <CR><LF>
//!  |   |   |   |   |
//!  |   |   |   |   +-- checksum: two's complement of the byte sum
//!  |   |   |   +------ LL data bytes
//!  |   |   +---------- record type
//!  |   +-------------- 16-bit load address (big-endian)
//!  +------------------ data byte count
//! ```
//!
//! [`HexDecoder`] pulls one record at a time from a buffered reader so a
//! whole image never has to sit in memory. Decoding is deliberately
//! permissive about digits: a character outside `0-9A-Fa-f` is not rejected,
//! it just produces a nibble that will almost certainly break the checksum.
//! Structural problems (a missing `:`) and checksum failures are fatal.

use crate::error::{Error, Result};
use log::trace;
use std::fmt;
use std::io::{self, BufRead};

/// Source characters per record on top of its data digits (`:`, count,
/// address, type, checksum, CR, LF).
pub const RECORD_OVERHEAD: usize = 13;

/// Intel HEX record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Data bytes at the load address.
    Data = 0x00,
    /// End of file.
    EndOfFile = 0x01,
    /// Extended segment address (bits 4..19).
    ExtendedSegmentAddress = 0x02,
    /// Start segment address (CS:IP).
    StartSegmentAddress = 0x03,
    /// Extended linear address (upper 16 bits).
    ExtendedLinearAddress = 0x04,
    /// Start linear address (EIP).
    StartLinearAddress = 0x05,
}

impl RecordType {
    /// Decode a record type byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Data),
            0x01 => Some(Self::EndOfFile),
            0x02 => Some(Self::ExtendedSegmentAddress),
            0x03 => Some(Self::StartSegmentAddress),
            0x04 => Some(Self::ExtendedLinearAddress),
            0x05 => Some(Self::StartLinearAddress),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Data => "data",
            Self::EndOfFile => "end of file",
            Self::ExtendedSegmentAddress => "extended segment address",
            Self::StartSegmentAddress => "start segment address",
            Self::ExtendedLinearAddress => "extended linear address",
            Self::StartLinearAddress => "start linear address",
        };
        f.write_str(name)
    }
}

/// One decoded Intel HEX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    /// Number of data bytes.
    pub byte_count: u8,
    /// Load address field. Programming streams data contiguously and does
    /// not use it.
    pub load_address: u16,
    /// Raw record type byte.
    pub record_type: u8,
    /// Data bytes (`byte_count` of them).
    pub data: Vec<u8>,
    /// Checksum byte as found in the source.
    pub checksum: u8,
}

impl HexRecord {
    /// Build a record with a correct checksum.
    ///
    /// # Panics
    ///
    /// Panics if `data` is longer than 255 bytes.
    pub fn new(load_address: u16, record_type: u8, data: Vec<u8>) -> Self {
        let byte_count = u8::try_from(data.len()).expect("HEX record data exceeds 255 bytes");
        let mut record = Self {
            byte_count,
            load_address,
            record_type,
            data,
            checksum: 0,
        };
        record.checksum = record.sum().wrapping_neg();
        record
    }

    /// Sum of every field except the checksum, modulo 256.
    fn sum(&self) -> u8 {
        let [hi, lo] = self.load_address.to_be_bytes();
        self.data.iter().fold(
            self.byte_count
                .wrapping_add(hi)
                .wrapping_add(lo)
                .wrapping_add(self.record_type),
            |acc, &b| acc.wrapping_add(b),
        )
    }

    /// Sum of all record bytes including the checksum, modulo 256.
    pub fn total(&self) -> u8 {
        self.sum().wrapping_add(self.checksum)
    }

    /// Whether the record bytes sum to zero modulo 256.
    pub fn checksum_ok(&self) -> bool {
        self.total() == 0
    }

    /// Decoded record type, if it is one of the standard six.
    pub fn kind(&self) -> Option<RecordType> {
        RecordType::from_u8(self.record_type)
    }

    /// Source characters this record occupies, terminator included.
    pub fn source_len(&self) -> usize {
        RECORD_OVERHEAD + 2 * usize::from(self.byte_count)
    }

    /// Render the record as a CRLF-terminated line.
    pub fn encode(&self) -> String {
        use std::fmt::Write as _;

        let mut line = String::with_capacity(self.source_len());
        line.push(':');
        let _ = write!(
            line,
            "{:02X}{:04X}{:02X}",
            self.byte_count, self.load_address, self.record_type
        );
        for byte in &self.data {
            let _ = write!(line, "{byte:02X}");
        }
        let _ = write!(line, "{:02X}\r\n", self.checksum);
        line
    }
}

/// Value of one ASCII hex digit.
///
/// Characters outside the digit ranges are mapped without validation:
/// anything at or above `'a'` counts from `'a'`, at or above `'A'` from
/// `'A'`, at or above `'0'` from `'0'`, and lower characters keep their raw
/// value. Non-ASCII bytes (0x80 and up) also keep their raw value, as they
/// would when read as a signed `char`; [`hex_byte`] keeps only the low
/// eight bits of the combined value either way.
pub fn hex_nibble(c: u8) -> u8 {
    if !c.is_ascii() {
        c
    } else if c >= b'a' {
        c - b'a' + 0x0A
    } else if c >= b'A' {
        c - b'A' + 0x0A
    } else if c >= b'0' {
        c - b'0'
    } else {
        c
    }
}

/// Combine two ASCII hex digits into a byte.
pub fn hex_byte(high: u8, low: u8) -> u8 {
    (hex_nibble(high) << 4) | hex_nibble(low)
}

/// Streaming Intel HEX decoder.
///
/// Yields one [`HexRecord`] per line until the source is exhausted. After
/// the first error the iterator is fused.
pub struct HexDecoder<R> {
    reader: R,
    line: usize,
    failed: bool,
}

impl<R: BufRead> HexDecoder<R> {
    /// Create a decoder over a buffered source.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            failed: false,
        }
    }

    /// Number of the line most recently started (1-based, 0 before any).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Give back the source.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = match self.reader.fill_buf() {
            Ok(buf) => buf.first().copied(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return self.next_byte(),
            Err(e) => return Err(e.into()),
        };
        if byte.is_some() {
            self.reader.consume(1);
        }
        Ok(byte)
    }

    fn field(&mut self) -> Result<u8> {
        let high = self.next_byte()?;
        let low = self.next_byte()?;
        match (high, low) {
            (Some(high), Some(low)) => Ok(hex_byte(high, low)),
            _ => Err(Error::MalformedLine {
                line: self.line,
                reason: "unexpected end of source inside record".into(),
            }),
        }
    }

    /// Decode the next record, or `None` once the source is exhausted.
    pub fn decode_next(&mut self) -> Result<Option<HexRecord>> {
        let Some(start) = self.next_byte()? else {
            return Ok(None);
        };
        self.line += 1;

        if start != b':' {
            return Err(Error::MalformedLine {
                line: self.line,
                reason: format!("expected ':' but found 0x{start:02X}"),
            });
        }

        let byte_count = self.field()?;
        let load_address = u16::from_be_bytes([self.field()?, self.field()?]);
        let record_type = self.field()?;
        let mut data = Vec::with_capacity(usize::from(byte_count));
        for _ in 0..byte_count {
            data.push(self.field()?);
        }
        let checksum = self.field()?;

        let record = HexRecord {
            byte_count,
            load_address,
            record_type,
            data,
            checksum,
        };
        if !record.checksum_ok() {
            return Err(Error::ChecksumMismatch {
                line: self.line,
                sum: record.total(),
            });
        }

        // Line terminator, whatever it is. Absent at end of source is fine.
        self.next_byte()?;
        self.next_byte()?;

        trace!(
            "line {}: {} bytes at 0x{:04X} ({})",
            self.line,
            record.byte_count,
            record.load_address,
            record
                .kind()
                .map_or_else(|| format!("type 0x{:02X}", record.record_type), |k| k.to_string())
        );
        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for HexDecoder<R> {
    type Item = Result<HexRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.decode_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            },
        }
    }
}
