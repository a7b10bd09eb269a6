//! # stkflash
//!
//! A library for programming AVR microcontrollers through an STK500 (v1)
//! serial bootloader such as Optiboot.
//!
//! This crate provides:
//!
//! - Streaming Intel HEX decoding with per-record checksum validation
//! - The STK500 frame exchange with bounded retries and per-byte timeouts
//! - Page-by-page flash programming and read-back verification
//! - Device identification (bootloader parameters and signature)
//! - Serial port discovery for common USB-UART bridges
//!
//! ## Supported Targets
//!
//! - ATmega328P class parts (128-byte flash pages)
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use stkflash::{NativePort, Programmer, ProgrammerConfig, SerialConfig};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyACM0", 115_200))?;
//!     let reset = port.reset_line()?.into_hook();
//!
//!     // Give each byte roughly 100 ms (500 polls, 200 µs apart) on a real port.
//!     let config = ProgrammerConfig::default().with_poll_interval(Duration::from_micros(200));
//!     let mut programmer = Programmer::new(port, config);
//!     programmer.set_reset_hook(Some(reset));
//!
//!     let info = programmer.read_device_info()?;
//!     println!("Found {info}");
//!
//!     programmer.program_file("firmware.hex", |done| {
//!         println!("{done} bytes processed");
//!     })?;
//!     programmer.verify_file("firmware.hex", |_| {})?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod session;
pub mod target;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, ResetLine};
pub use {
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_board_ports, detect_ports},
    error::{Error, ErrorKind, Result},
    image::ihex::{HexDecoder, HexRecord, RecordType},
    port::{DEFAULT_BAUD, SerialConfig, Transport, TxEnable},
    protocol::exchange::{ExchangeTiming, FrameExchange, MAX_TRIES},
    session::{Programmer, ProgrammerConfig, ResetHook, SessionState},
    target::{DeviceInfo, Part, TARGET_PAGE_SIZE},
};
