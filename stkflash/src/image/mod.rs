//! Firmware image formats.

pub mod ihex;

pub use ihex::{HexDecoder, HexRecord, RecordType};
