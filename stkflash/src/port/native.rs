//! Native serial port implementation using the `serialport` crate.
//!
//! This module provides the transport used on Linux, macOS and Windows,
//! plus [`ResetLine`], the DTR/RTS pulser that resets Arduino-style boards
//! into their bootloader.

use {
    crate::{
        error::Result,
        port::{SerialConfig, Transport, TxEnable},
    },
    log::{trace, warn},
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits},
    std::{
        io::{ErrorKind, Read, Write},
        thread,
        time::Duration,
    },
};

/// How long the reset line is held asserted.
pub const RESET_PULSE: Duration = Duration::from_millis(100);

/// Default delay between releasing reset and the bootloader listening.
pub const DEFAULT_RESET_SETTLE: Duration = Duration::from_millis(50);

/// Native serial port transport.
pub struct NativePort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    tx_enable: TxEnable,
    tx_enable_inverted: bool,
}

impl NativePort {
    /// Open a serial port with the given configuration (8N1, no flow control).
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()?;

        let mut native = Self {
            port,
            name: config.port_name.clone(),
            tx_enable: config.tx_enable,
            tx_enable_inverted: config.tx_enable_inverted,
        };
        // Start in receive mode.
        native.set_tx_enable(false)?;
        Ok(native)
    }

    /// Open a serial port with default settings.
    pub fn open_simple(port_name: &str, baud_rate: u32) -> Result<Self> {
        Self::open(&SerialConfig::new(port_name, baud_rate))
    }

    /// Create a reset pulser sharing this port's handle.
    ///
    /// The pulser drives DTR, or RTS when DTR is already claimed as the
    /// direction-enable line.
    pub fn reset_line(&self) -> Result<ResetLine> {
        let line = if self.tx_enable == TxEnable::Dtr {
            TxEnable::Rts
        } else {
            TxEnable::Dtr
        };
        Ok(ResetLine {
            port: self.port.try_clone()?,
            line,
            settle: DEFAULT_RESET_SETTLE,
        })
    }

    fn write_line(port: &mut dyn serialport::SerialPort, line: TxEnable, level: bool) -> Result<()> {
        match line {
            TxEnable::None => {},
            TxEnable::Rts => port.write_request_to_send(level)?,
            TxEnable::Dtr => port.write_data_terminal_ready(level)?,
        }
        Ok(())
    }
}

impl Transport for NativePort {
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        trace!("TX {} bytes: {:02X?}", buf.len(), buf);
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        if self.bytes_available()? == 0 {
            return Ok(None);
        }
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn set_tx_enable(&mut self, transmitting: bool) -> Result<()> {
        let level = transmitting != self.tx_enable_inverted;
        Self::write_line(self.port.as_mut(), self.tx_enable, level)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Resets the target by pulsing a modem-control line.
///
/// Holds its own clone of the port handle so it can be moved into a
/// session's zero-argument reset hook.
pub struct ResetLine {
    port: Box<dyn serialport::SerialPort>,
    line: TxEnable,
    settle: Duration,
}

impl ResetLine {
    /// Set the delay after releasing reset.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Pulse the reset line and wait for the bootloader to start.
    pub fn pulse(&mut self) -> Result<()> {
        trace!("Pulsing {:?} to reset target", self.line);
        NativePort::write_line(self.port.as_mut(), self.line, false)?;
        thread::sleep(RESET_PULSE);
        NativePort::write_line(self.port.as_mut(), self.line, true)?;
        thread::sleep(self.settle);
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    /// Turn the pulser into a reset hook that logs instead of failing.
    pub fn into_hook(mut self) -> Box<dyn FnMut()> {
        Box::new(move || {
            if let Err(e) = self.pulse() {
                warn!("Target reset failed: {e}");
            }
        })
    }
}
