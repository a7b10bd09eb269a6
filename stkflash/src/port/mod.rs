//! Transport abstraction for the programmer's serial link.
//!
//! The protocol layer never talks to a serial port directly. It polls a
//! [`Transport`] one byte at a time and brackets every write with the
//! optional half-duplex direction-enable line, so the same engine drives a
//! USB-UART bridge, an RS485 transceiver, or the simulated target used in
//! tests.
//!
//! ```text
//! +--------------------+
//! |   Session layer    |
//! | (program, verify)  |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |   FrameExchange    |
//! |   (STK500 v1)      |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |  Transport trait   |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! | NativePort         |
//! | (serialport crate) |
//! +--------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use stkflash::port::Transport;
//!
//! fn drain<T: Transport>(port: &mut T) -> stkflash::Result<usize> {
//!     let mut count = 0;
//!     while port.read_byte()?.is_some() {
//!         count += 1;
//!     }
//!     Ok(count)
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::error::Result;

/// Default baud rate of the Arduino-style STK500 bootloaders this tool targets.
pub const DEFAULT_BAUD: u32 = 19200;

/// Which modem-control line, if any, drives the transmitter enable of a
/// half-duplex link (for example an RS485 transceiver's DE pin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TxEnable {
    /// Full-duplex link, no direction control.
    #[default]
    None,
    /// RTS is asserted while transmitting.
    Rts,
    /// DTR is asserted while transmitting.
    Dtr,
}

impl TxEnable {
    /// Parse a line name as used in configuration files and on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "rts" => Some(Self::Rts),
            "dtr" => Some(Self::Dtr),
            _ => None,
        }
    }
}

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Timeout of a single blocking read on the underlying port.
    pub timeout: Duration,
    /// Direction-enable line for half-duplex links.
    pub tx_enable: TxEnable,
    /// Drive the direction-enable line active-low instead of active-high.
    pub tx_enable_inverted: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(10),
            tx_enable: TxEnable::None,
            tx_enable_inverted: false,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the direction-enable line.
    #[must_use]
    pub fn with_tx_enable(mut self, line: TxEnable, inverted: bool) -> Self {
        self.tx_enable = line;
        self.tx_enable_inverted = inverted;
        self
    }
}

/// Byte-oriented duplex link to the target's bootloader.
///
/// Reads are polls: [`Transport::read_byte`] returns `Ok(None)` when nothing
/// has arrived yet instead of blocking. Timeouts are enforced by the caller
/// with a fixed tick budget.
pub trait Transport {
    /// Write all bytes and flush them onto the wire.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Number of received bytes waiting to be read.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read one received byte, or `None` if nothing is pending.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Drop every byte that is waiting in the receive buffer.
    fn discard_input(&mut self) -> Result<()> {
        while self.read_byte()?.is_some() {}
        Ok(())
    }

    /// Drive the direction-enable signal (`true` while transmitting).
    ///
    /// Full-duplex transports ignore it.
    fn set_tx_enable(&mut self, _transmitting: bool) -> Result<()> {
        Ok(())
    }

    /// Human-readable name of the link.
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_all_bytes(buf)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }

    fn set_tx_enable(&mut self, transmitting: bool) -> Result<()> {
        (**self).set_tx_enable(transmitting)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// Re-export the native implementation
#[cfg(feature = "native")]
pub use native::{NativePort, ResetLine};
