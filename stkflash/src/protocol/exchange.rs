//! Command/response exchange with an STK500 bootloader.
//!
//! [`FrameExchange`] owns the transport for the duration of a session. It
//! writes command frames with the direction-enable line raised, then scans
//! the answer for `STK_INSYNC`, an optional payload and `STK_OK`. Every byte
//! read is bounded by a tick budget rather than a wall-clock deadline, so a
//! slow target still succeeds as long as each byte arrives in its window.

use crate::error::{Error, Result};
use crate::port::Transport;
use crate::protocol::stk500::{CRC_EOP, CommandFrame, PARAM_BASE, STK_INSYNC, STK_OK};
use log::{debug, trace};
use std::thread;
use std::time::Duration;

/// Attempts for the sync handshake and for finding each response marker.
pub const MAX_TRIES: usize = 10;

/// Poll ticks allowed for a single byte to arrive.
pub const RX_WAIT_TIMEOUT: u32 = 500;

/// Value returned by a byte read that timed out.
pub const RX_TIMEOUT_SENTINEL: u8 = 0xFF;

/// Wait before scanning a response.
pub const RESPONSE_DELAY: Duration = Duration::from_millis(50);

/// Timing of the exchange layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTiming {
    /// Poll ticks allowed per received byte.
    pub rx_wait_ticks: u32,
    /// Pause between two polls of an empty receive buffer.
    pub poll_interval: Duration,
    /// Pause after a command before its response is scanned.
    pub response_delay: Duration,
}

impl Default for ExchangeTiming {
    fn default() -> Self {
        Self {
            rx_wait_ticks: RX_WAIT_TIMEOUT,
            poll_interval: Duration::ZERO,
            response_delay: RESPONSE_DELAY,
        }
    }
}

impl ExchangeTiming {
    /// Timing without any sleeps, for in-memory transports.
    pub fn immediate() -> Self {
        Self {
            rx_wait_ticks: RX_WAIT_TIMEOUT,
            poll_interval: Duration::ZERO,
            response_delay: Duration::ZERO,
        }
    }
}

/// STK500 frame exchange over a [`Transport`].
pub struct FrameExchange<T: Transport> {
    port: T,
    timing: ExchangeTiming,
    timed_out: bool,
}

impl<T: Transport> FrameExchange<T> {
    /// Create an exchange on top of an opened transport.
    pub fn new(port: T, timing: ExchangeTiming) -> Self {
        Self {
            port,
            timing,
            timed_out: false,
        }
    }

    /// Get a reference to the underlying transport.
    pub fn port(&self) -> &T {
        &self.port
    }

    /// Get a mutable reference to the underlying transport.
    pub fn port_mut(&mut self) -> &mut T {
        &mut self.port
    }

    /// Consume the exchange and return the transport.
    pub fn into_port(self) -> T {
        self.port
    }

    /// Get the timing parameters.
    pub fn timing(&self) -> ExchangeTiming {
        self.timing
    }

    /// Whether a byte read has timed out since the flag was last cleared.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Write raw bytes with the direction-enable line held for the write.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.set_tx_enable(true)?;
        let written = self.port.write_all_bytes(bytes);
        // Release the line even when the write failed.
        self.port.set_tx_enable(false)?;
        written
    }

    /// Receive one byte within the tick budget.
    ///
    /// Returns `None` and raises the timeout flag when nothing arrived.
    pub fn receive(&mut self) -> Result<Option<u8>> {
        for _ in 0..self.timing.rx_wait_ticks {
            if let Some(byte) = self.port.read_byte()? {
                return Ok(Some(byte));
            }
            if !self.timing.poll_interval.is_zero() {
                thread::sleep(self.timing.poll_interval);
            }
        }
        self.timed_out = true;
        Ok(None)
    }

    /// Send a command that answers with an empty response.
    pub fn exchange(&mut self, command: &[u8]) -> Result<()> {
        self.send(command)?;
        self.await_response(&mut [])
    }

    /// Send a command that answers with `len` payload bytes.
    pub fn exchange_with_response(&mut self, command: &[u8], len: usize) -> Result<Vec<u8>> {
        self.send(command)?;
        let mut payload = vec![0u8; len];
        self.await_response(&mut payload)?;
        Ok(payload)
    }

    /// Scan a response frame, filling `payload` between the markers.
    pub fn await_response(&mut self, payload: &mut [u8]) -> Result<()> {
        self.timed_out = false;
        if !self.timing.response_delay.is_zero() {
            thread::sleep(self.timing.response_delay);
        }

        self.await_marker(STK_INSYNC)?;

        for slot in payload.iter_mut() {
            match self.receive()? {
                Some(byte) => *slot = byte,
                None => {
                    *slot = RX_TIMEOUT_SENTINEL;
                    return Err(self.no_response("payload byte timed out"));
                },
            }
        }

        self.await_marker(STK_OK)
    }

    fn await_marker(&mut self, marker: u8) -> Result<()> {
        for _ in 0..MAX_TRIES {
            let byte = self.receive()?.unwrap_or(RX_TIMEOUT_SENTINEL);
            if byte == marker {
                return Ok(());
            }
            trace!("Discarding 0x{byte:02X} while waiting for 0x{marker:02X}");
        }
        Err(self.no_response("response marker not found"))
    }

    fn no_response(&mut self, reason: &str) -> Error {
        debug!("No response from target: {reason}");
        self.timed_out = true;
        if let Err(e) = self.port.discard_input() {
            debug!("Failed to drain input: {e}");
        }
        Error::NoResponse
    }

    /// Synchronize with the bootloader.
    ///
    /// Sends `GET_SYNC` up to [`MAX_TRIES`] times and returns `true` on the
    /// first acknowledged attempt.
    pub fn sync(&mut self) -> Result<bool> {
        let frame = CommandFrame::get_sync();
        for attempt in 1..=MAX_TRIES {
            match self.exchange(frame.as_bytes()) {
                Ok(()) => {
                    debug!("In sync after {attempt} attempt(s)");
                    return Ok(true);
                },
                Err(Error::NoResponse) => {
                    trace!("Sync attempt {attempt}/{MAX_TRIES} failed");
                },
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Read one `GET_PARAMETER` value.
    pub fn get_parameter(&mut self, index: u8) -> Result<u8> {
        let frame = CommandFrame::get_parameter(PARAM_BASE.wrapping_add(index));
        let value = self.exchange_with_response(frame.as_bytes(), 1)?;
        Ok(value[0])
    }

    /// Read the three signature bytes.
    pub fn read_signature(&mut self) -> Result<[u8; 3]> {
        let sig = self.exchange_with_response(CommandFrame::read_sign().as_bytes(), 3)?;
        Ok([sig[0], sig[1], sig[2]])
    }

    /// Set the flash word address for the next page command.
    pub fn load_address(&mut self, word_address: u16) -> Result<()> {
        trace!("LOAD_ADDRESS 0x{word_address:04X}");
        self.exchange(CommandFrame::load_address(word_address).as_bytes())
    }

    /// Program one flash page at the loaded address.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_page(&mut self, page: &[u8]) -> Result<()> {
        trace!("PROG_PAGE {} bytes", page.len());
        // Page length is bounded by the compiled-in page size.
        self.send(CommandFrame::prog_page_header(page.len() as u16).as_bytes())?;
        self.send(page)?;
        self.send(&[CRC_EOP])?;
        self.await_response(&mut [])
    }

    /// Read `buf.len()` flash bytes from the loaded address.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_page(&mut self, buf: &mut [u8]) -> Result<()> {
        trace!("READ_PAGE {} bytes", buf.len());
        self.send(CommandFrame::read_page(buf.len() as u16).as_bytes())?;
        self.await_response(buf)
    }

    /// Leave programming mode and start the application.
    pub fn leave_program_mode(&mut self) -> Result<()> {
        self.exchange(CommandFrame::leave_prog_mode().as_bytes())
    }
}
