//! Error types for stkflash.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for stkflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for stkflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, HEX source).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The HEX source could not be opened.
    #[error("HEX source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// A HEX line did not start with the `:` record marker.
    #[error("Malformed HEX line {line}: {reason}")]
    MalformedLine {
        /// 1-based line number within the source.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// A HEX record failed its checksum.
    #[error("Checksum mismatch on line {line}: record sums to {sum:#04x}, expected 0x00")]
    ChecksumMismatch {
        /// 1-based line number within the source.
        line: usize,
        /// Sum of all record bytes including the checksum byte.
        sum: u8,
    },

    /// The target did not answer within the retry and timeout budget.
    #[error("No response from target")]
    NoResponse,

    /// Flash contents read back differ from the HEX image.
    #[error("Verification failed: flash contents differ from image")]
    VerifyMismatch,

    /// The device signature is not the one the session was configured for.
    #[error(
        "Unexpected device signature: expected {}, got {}",
        format_signature(.expected),
        format_signature(.actual)
    )]
    UnexpectedDeviceType {
        /// Signature the session expected.
        expected: [u8; 3],
        /// Signature the device reported.
        actual: [u8; 3],
    },

    /// The target did not acknowledge the leave-program-mode command.
    #[error("Target did not acknowledge leaving program mode")]
    LeaveProgramModeFailed,

    /// No serial port could be found.
    #[error("No serial port found")]
    DeviceNotFound,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_signature(signature: &[u8; 3]) -> String {
    format!("{:02X} {:02X} {:02X}", signature[0], signature[1], signature[2])
}

impl Error {
    /// Classify this error into its sticky error code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Config(_) | Self::DeviceNotFound => ErrorKind::Io,
            #[cfg(feature = "native")]
            Self::Serial(_) => ErrorKind::Io,
            Self::SourceNotFound(_) => ErrorKind::SourceNotFound,
            Self::MalformedLine { .. } => ErrorKind::MalformedLine,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::NoResponse => ErrorKind::NoResponse,
            Self::VerifyMismatch => ErrorKind::VerifyMismatch,
            Self::UnexpectedDeviceType { .. } => ErrorKind::UnexpectedDeviceType,
            Self::LeaveProgramModeFailed => ErrorKind::LeaveProgramModeFailed,
        }
    }
}

/// Sticky error code recorded by a programming session.
///
/// Codes 0x02..=0x06 keep the numbering used by the Arduino-hosted
/// programmer firmware this protocol engine is interoperable with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ErrorKind {
    /// Local I/O or serial port failure.
    Io = 0x01,
    /// The target did not answer.
    NoResponse = 0x02,
    /// The HEX source could not be opened.
    SourceNotFound = 0x03,
    /// Device signature mismatch.
    UnexpectedDeviceType = 0x04,
    /// HEX line without a `:` marker.
    MalformedLine = 0x05,
    /// HEX record checksum failure.
    ChecksumMismatch = 0x06,
    /// Flash read-back differs from the image.
    VerifyMismatch = 0x07,
    /// Leaving program mode was not acknowledged.
    LeaveProgramModeFailed = 0x08,
}

impl ErrorKind {
    /// Numeric error code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Io => "I/O error",
            Self::NoResponse => "no response",
            Self::SourceNotFound => "source not found",
            Self::UnexpectedDeviceType => "unexpected device type",
            Self::MalformedLine => "malformed line",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::VerifyMismatch => "verify mismatch",
            Self::LeaveProgramModeFailed => "leave program mode failed",
        };
        write!(f, "{name} ({:#04x})", self.code())
    }
}
