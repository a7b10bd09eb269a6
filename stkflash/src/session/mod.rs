//! Programming and verification sessions.
//!
//! A [`Programmer`] owns the transport and runs one session at a time:
//!
//! ```text
//! Idle -> SourceOpened -> Reset -> Synced -> [InfoRead] -> Streaming
//!      -> Flushing -> LeftProgramMode -> Done
//!                                  \
//!                                   +-> Failed(kind) from any step
//! ```
//!
//! Programming streams the HEX image page by page into flash; verification
//! streams it again and compares page by page. Every session records the
//! kind of its failure, if any, in [`Programmer::last_error`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use stkflash::{NativePort, Programmer, ProgrammerConfig, SerialConfig};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 115_200))?;
//!     let reset = port.reset_line()?.into_hook();
//!
//!     // Give each byte roughly 100 ms (500 polls, 200 µs apart) on a real port.
//!     let config = ProgrammerConfig::default().with_poll_interval(Duration::from_micros(200));
//!     let mut programmer = Programmer::new(port, config);
//!     programmer.set_reset_hook(Some(reset));
//!
//!     let written = programmer.program_file("blink.hex", |n| println!("{n} bytes"))?;
//!     println!("Programmed {written} bytes of HEX");
//!     programmer.verify_file("blink.hex", |_| {})?;
//!     Ok(())
//! }
//! ```

pub mod pager;

use crate::error::{Error, ErrorKind, Result};
use crate::image::ihex::HexDecoder;
use crate::port::Transport;
use crate::protocol::exchange::{ExchangeTiming, FrameExchange};
use crate::target::info::DeviceInfo;
use log::{debug, info, warn};
use pager::{PageOp, PageVerifier, PageWriter, Pager};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::time::Duration;

pub use pager::{PageBuffer, VerifyPage, WritePage};

/// Callback that puts the target into its bootloader.
pub type ResetHook = Box<dyn FnMut()>;

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct ProgrammerConfig {
    /// Exchange timing.
    pub timing: ExchangeTiming,
    /// Signature the target must report before it is programmed.
    pub expected_signature: Option<[u8; 3]>,
}

impl ProgrammerConfig {
    /// Set the whole exchange timing.
    #[must_use]
    pub fn with_timing(mut self, timing: ExchangeTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Set the poll ticks allowed per received byte.
    #[must_use]
    pub fn with_rx_wait_ticks(mut self, ticks: u32) -> Self {
        self.timing.rx_wait_ticks = ticks;
        self
    }

    /// Set the pause between polls of an empty receive buffer.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.timing.poll_interval = interval;
        self
    }

    /// Set the pause between a command and its response scan.
    #[must_use]
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.timing.response_delay = delay;
        self
    }

    /// Require a device signature before programming.
    #[must_use]
    pub fn with_expected_signature(mut self, signature: Option<[u8; 3]>) -> Self {
        self.expected_signature = signature;
        self
    }
}

/// Progress of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session has run.
    #[default]
    Idle,
    /// The HEX source is open.
    SourceOpened,
    /// The reset hook has run.
    Reset,
    /// The bootloader answered `GET_SYNC`.
    Synced,
    /// Device information was read.
    InfoRead,
    /// Records are being decoded and committed.
    Streaming,
    /// The final partial page is being committed.
    Flushing,
    /// The target left programming mode.
    LeftProgramMode,
    /// The session completed.
    Done,
    /// The session failed.
    Failed(ErrorKind),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::SourceOpened => write!(f, "source opened"),
            Self::Reset => write!(f, "reset"),
            Self::Synced => write!(f, "synced"),
            Self::InfoRead => write!(f, "info read"),
            Self::Streaming => write!(f, "streaming"),
            Self::Flushing => write!(f, "flushing"),
            Self::LeftProgramMode => write!(f, "left program mode"),
            Self::Done => write!(f, "done"),
            Self::Failed(kind) => write!(f, "failed: {kind}"),
        }
    }
}

fn enter(state: &mut SessionState, next: SessionState) {
    debug!("Session: {state} -> {next}");
    *state = next;
}

/// STK500 programmer.
pub struct Programmer<T: Transport> {
    exchange: FrameExchange<T>,
    config: ProgrammerConfig,
    reset: Option<ResetHook>,
    state: SessionState,
    last_error: Option<ErrorKind>,
}

impl<T: Transport> Programmer<T> {
    /// Create a programmer on an opened transport.
    pub fn new(port: T, config: ProgrammerConfig) -> Self {
        Self {
            exchange: FrameExchange::new(port, config.timing),
            config,
            reset: None,
            state: SessionState::Idle,
            last_error: None,
        }
    }

    /// Install or remove the reset hook.
    pub fn set_reset_hook(&mut self, hook: Option<ResetHook>) {
        self.reset = hook;
    }

    /// Install a reset hook.
    #[must_use]
    pub fn with_reset_hook(mut self, hook: impl FnMut() + 'static) -> Self {
        self.reset = Some(Box::new(hook));
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ProgrammerConfig {
        &self.config
    }

    /// Get a reference to the underlying transport.
    pub fn port(&self) -> &T {
        self.exchange.port()
    }

    /// Get a mutable reference to the underlying transport.
    pub fn port_mut(&mut self) -> &mut T {
        self.exchange.port_mut()
    }

    /// Consume the programmer and return the transport.
    pub fn into_port(self) -> T {
        self.exchange.into_port()
    }

    /// State reached by the most recent session.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Kind of the most recent failure, cleared when a session starts.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// Run the reset hook, if any.
    pub fn reset_target(&mut self) {
        if let Some(reset) = self.reset.as_mut() {
            debug!("Resetting target");
            reset();
        }
    }

    /// Synchronize with the bootloader.
    ///
    /// Returns `false` after [`MAX_TRIES`](crate::protocol::MAX_TRIES)
    /// unanswered attempts and records the failure.
    pub fn sync(&mut self) -> bool {
        match self.exchange.sync() {
            Ok(true) => true,
            Ok(false) => {
                self.last_error = Some(ErrorKind::NoResponse);
                false
            },
            Err(e) => {
                warn!("Sync failed: {e}");
                self.last_error = Some(e.kind());
                false
            },
        }
    }

    /// Synchronize, then read the device parameters and signature.
    pub fn read_device_info(&mut self) -> Result<DeviceInfo> {
        let result = self
            .require_sync()
            .and_then(|()| DeviceInfo::read(&mut self.exchange));
        if let Err(e) = &result {
            self.last_error = Some(e.kind());
        }
        result
    }

    /// Program flash from a HEX stream.
    ///
    /// `progress` receives the running count of HEX source bytes processed
    /// after each record. Returns the final count.
    pub fn program<R: Read>(&mut self, source: R, mut progress: impl FnMut(usize)) -> Result<usize> {
        self.begin();
        let result = self.run_program(BufReader::new(source), &mut progress);
        self.conclude(result)
    }

    /// Program flash from a HEX file.
    pub fn program_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        mut progress: impl FnMut(usize),
    ) -> Result<usize> {
        self.begin();
        let result = open_source(path.as_ref())
            .and_then(|source| self.run_program(source, &mut progress));
        self.conclude(result)
    }

    /// Compare flash with a HEX stream.
    pub fn verify<R: Read>(&mut self, source: R, mut progress: impl FnMut(usize)) -> Result<()> {
        self.begin();
        let result = self.run_verify(BufReader::new(source), &mut progress);
        self.conclude(result)
    }

    /// Compare flash with a HEX file.
    pub fn verify_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        mut progress: impl FnMut(usize),
    ) -> Result<()> {
        self.begin();
        let result = open_source(path.as_ref())
            .and_then(|source| self.run_verify(source, &mut progress));
        self.conclude(result)
    }

    fn begin(&mut self) {
        self.last_error = None;
        self.state = SessionState::Idle;
    }

    fn conclude<V>(&mut self, result: Result<V>) -> Result<V> {
        match &result {
            Ok(_) => enter(&mut self.state, SessionState::Done),
            Err(e) => {
                let kind = e.kind();
                self.last_error = Some(kind);
                enter(&mut self.state, SessionState::Failed(kind));
            },
        }
        result
    }

    fn require_sync(&mut self) -> Result<()> {
        if self.exchange.sync()? {
            Ok(())
        } else {
            Err(Error::NoResponse)
        }
    }

    fn connect(&mut self) -> Result<()> {
        enter(&mut self.state, SessionState::SourceOpened);
        self.reset_target();
        enter(&mut self.state, SessionState::Reset);
        self.require_sync()?;
        enter(&mut self.state, SessionState::Synced);
        Ok(())
    }

    fn identify(&mut self) -> Result<()> {
        match DeviceInfo::read(&mut self.exchange) {
            Ok(device) => {
                info!("Target: {device}");
                enter(&mut self.state, SessionState::InfoRead);
                match self.config.expected_signature {
                    Some(expected) if expected != device.signature => {
                        Err(Error::UnexpectedDeviceType {
                            expected,
                            actual: device.signature,
                        })
                    },
                    _ => Ok(()),
                }
            },
            Err(e) if self.config.expected_signature.is_some() => Err(e),
            Err(e) => {
                warn!("Could not read device information, continuing: {e}");
                Ok(())
            },
        }
    }

    fn run_program<R: BufRead>(&mut self, source: R, progress: &mut dyn FnMut(usize)) -> Result<usize> {
        self.connect()?;
        self.identify()?;

        enter(&mut self.state, SessionState::Streaming);
        let mut writer = PageWriter::writer(&mut self.exchange);
        let processed = stream(HexDecoder::new(source), &mut writer, progress)?;
        enter(&mut self.state, SessionState::Flushing);
        let pages = writer.finish()?;
        info!("Programmed {pages} page(s) from {processed} bytes of HEX");

        self.leave_program_mode()?;
        Ok(processed)
    }

    fn run_verify<R: BufRead>(&mut self, source: R, progress: &mut dyn FnMut(usize)) -> Result<()> {
        self.connect()?;

        enter(&mut self.state, SessionState::Streaming);
        let mut verifier = PageVerifier::verifier(&mut self.exchange);
        let result = stream(HexDecoder::new(source), &mut verifier, progress).and_then(|processed| {
            enter(&mut self.state, SessionState::Flushing);
            let pages = verifier.finish()?;
            info!("Verified {pages} page(s) from {processed} bytes of HEX");
            Ok(())
        });

        if let Err(Error::VerifyMismatch) = result {
            if let Err(e) = self.exchange.leave_program_mode() {
                debug!("Leave program mode after mismatch failed: {e}");
            }
            return Err(Error::VerifyMismatch);
        }
        result?;

        // After a passing comparison a failed leave is recorded, not returned.
        if let Err(e) = self.leave_program_mode() {
            warn!("Flash verified, but the target did not leave program mode");
            self.last_error = Some(e.kind());
        }
        Ok(())
    }

    fn leave_program_mode(&mut self) -> Result<()> {
        match self.exchange.leave_program_mode() {
            Ok(()) => {
                enter(&mut self.state, SessionState::LeftProgramMode);
                Ok(())
            },
            Err(e) => {
                debug!("Leave program mode failed: {e}");
                Err(Error::LeaveProgramModeFailed)
            },
        }
    }
}

fn open_source(path: &Path) -> Result<BufReader<File>> {
    debug!("Opening HEX source {}", path.display());
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::SourceNotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

/// Feed every record's data through `pager`, returning HEX bytes processed.
fn stream<R: BufRead, T: Transport, O: PageOp>(
    decoder: HexDecoder<R>,
    pager: &mut Pager<'_, T, O>,
    progress: &mut dyn FnMut(usize),
) -> Result<usize> {
    let mut processed = 0usize;
    for record in decoder {
        let record = record?;
        for &byte in &record.data {
            pager.append(byte)?;
        }
        processed += record.source_len();
        progress(processed);
    }
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ihex::HexRecord;
    use crate::port::mock::{MockTarget, init_logger};
    use crate::protocol::exchange::MAX_TRIES;
    use crate::protocol::stk500::Command;
    use crate::target::part::{Part, TARGET_PAGE_SIZE};
    use std::cell::Cell;
    use std::io::Write;
    use std::rc::Rc;

    fn config() -> ProgrammerConfig {
        ProgrammerConfig::default().with_timing(ExchangeTiming::immediate())
    }

    fn programmer(target: MockTarget) -> Programmer<MockTarget> {
        init_logger();
        Programmer::new(target, config())
    }

    /// `count` data records of `width` bytes plus an EOF record.
    fn image(count: usize, width: usize) -> (String, Vec<u8>) {
        let mut text = String::new();
        let mut data = Vec::new();
        for line in 0..count {
            let bytes: Vec<u8> = (0..width).map(|i| ((line * width + i) % 253) as u8).collect();
            let address = u16::try_from(line * width).unwrap();
            text.push_str(&HexRecord::new(address, 0x00, bytes.clone()).encode());
            data.extend(bytes);
        }
        text.push_str(":00000001FF\r\n");
        (text, data)
    }

    #[test]
    fn test_program_streams_pages_and_counts_bytes() {
        let (text, data) = image(34, 16);
        let mut prog = programmer(MockTarget::new());
        let mut reported = Vec::new();

        let processed = prog.program(text.as_bytes(), |n| reported.push(n)).unwrap();

        assert_eq!(processed, 34 * (13 + 32) + 13);
        assert_eq!(processed, text.len());
        assert_eq!(reported.len(), 35);
        assert_eq!(reported.last(), Some(&processed));
        assert_eq!(
            prog.port().pages_written(),
            &[(0, 128), (128, 128), (256, 128), (384, 128), (512, 32)]
        );
        assert_eq!(&prog.port().flash()[..data.len()], data.as_slice());
        assert_eq!(prog.port().count(Command::LeaveProgMode), 1);
        assert_eq!(prog.port().count(Command::GetParameter), MAX_TRIES);
        assert_eq!(prog.last_error(), None);
        assert_eq!(prog.state(), SessionState::Done);
    }

    #[test]
    fn test_checksum_error_stops_stream() {
        let (text, _) = image(20, 16);
        let mut lines: Vec<String> = text.split_inclusive("\r\n").map(str::to_string).collect();
        // Line 10: bump the checksum digit.
        let bad = &mut lines[9];
        let pos = bad.len() - 3;
        let digit = if &bad[pos..=pos] == "0" { "1" } else { "0" };
        bad.replace_range(pos..=pos, digit);
        let text: String = lines.concat();

        let mut prog = programmer(MockTarget::new());
        let err = prog.program(text.as_bytes(), |_| {}).unwrap_err();

        assert!(matches!(err, Error::ChecksumMismatch { line: 10, .. }));
        // Lines 1-9 fill one page; nothing after line 10 is sent.
        assert_eq!(prog.port().pages_written(), &[(0, 128)]);
        assert_eq!(prog.port().count(Command::LeaveProgMode), 0);
        assert_eq!(prog.last_error(), Some(ErrorKind::ChecksumMismatch));
        assert_eq!(prog.state(), SessionState::Failed(ErrorKind::ChecksumMismatch));
    }

    #[test]
    fn test_missing_colon_fails_after_flushing_full_pages() {
        let (text, _) = image(8, 32);
        let mut lines: Vec<String> = text.split_inclusive("\r\n").map(str::to_string).collect();
        lines[4].remove(0);
        let text: String = lines.concat();

        let mut prog = programmer(MockTarget::new());
        let err = prog.program(text.as_bytes(), |_| {}).unwrap_err();

        assert!(matches!(err, Error::MalformedLine { line: 5, .. }));
        assert_eq!(prog.port().pages_written(), &[(0, 128)]);
        assert_eq!(prog.port().count(Command::LeaveProgMode), 0);
        assert_eq!(prog.last_error(), Some(ErrorKind::MalformedLine));
    }

    #[test]
    fn test_program_without_response_gives_up() {
        let (text, _) = image(2, 16);
        let mut prog = programmer(MockTarget::new().silent());
        let err = prog.program(text.as_bytes(), |_| {}).unwrap_err();

        assert!(matches!(err, Error::NoResponse));
        assert_eq!(prog.port().count(Command::GetSync), MAX_TRIES);
        assert_eq!(prog.port().commands().len(), MAX_TRIES);
        assert_eq!(prog.last_error(), Some(ErrorKind::NoResponse));
    }

    #[test]
    fn test_leave_failure_overrides_success() {
        let (text, data) = image(4, 16);
        let mut prog = programmer(MockTarget::new().fail_leave());
        let err = prog.program(text.as_bytes(), |_| {}).unwrap_err();

        assert!(matches!(err, Error::LeaveProgramModeFailed));
        assert_eq!(&prog.port().flash()[..data.len()], data.as_slice());
        assert_eq!(prog.last_error(), Some(ErrorKind::LeaveProgramModeFailed));
    }

    #[test]
    fn test_unexpected_signature_is_rejected() {
        let (text, _) = image(4, 16);
        let config = config().with_expected_signature(Some(Part::Atmega2560.signature()));
        let mut prog = Programmer::new(MockTarget::new(), config);
        let err = prog.program(text.as_bytes(), |_| {}).unwrap_err();

        assert!(matches!(
            err,
            Error::UnexpectedDeviceType {
                expected: [0x1E, 0x98, 0x01],
                actual: [0x1E, 0x95, 0x0F]
            }
        ));
        assert_eq!(prog.port().count(Command::ProgPage), 0);
        assert_eq!(prog.last_error(), Some(ErrorKind::UnexpectedDeviceType));
    }

    #[test]
    fn test_matching_signature_programs() {
        let (text, _) = image(1, 16);
        let config = config().with_expected_signature(Some(Part::Atmega328p.signature()));
        let mut prog = Programmer::new(MockTarget::new(), config);
        assert_eq!(prog.program(text.as_bytes(), |_| {}).unwrap(), text.len());
    }

    #[test]
    fn test_reset_hook_runs_once_per_session() {
        let resets = Rc::new(Cell::new(0));
        let counter = Rc::clone(&resets);
        let (text, _) = image(2, 16);
        let mut prog = programmer(MockTarget::new()).with_reset_hook(move || counter.set(counter.get() + 1));

        prog.program(text.as_bytes(), |_| {}).unwrap();
        assert_eq!(resets.get(), 1);
        prog.verify(text.as_bytes(), |_| {}).unwrap();
        assert_eq!(resets.get(), 2);
    }

    #[test]
    fn test_verify_after_program() {
        let (text, _) = image(34, 16);
        let mut prog = programmer(MockTarget::new());
        prog.program(text.as_bytes(), |_| {}).unwrap();
        prog.verify(text.as_bytes(), |_| {}).unwrap();

        assert_eq!(prog.port().pages_read().len(), 5);
        assert_eq!(prog.port().count(Command::LeaveProgMode), 2);
        assert_eq!(prog.state(), SessionState::Done);
    }

    #[test]
    fn test_verify_mismatch_leaves_program_mode_once() {
        let (text, data) = image(34, 16);
        let target = MockTarget::new().with_flash(&data).corrupt_reads_at(TARGET_PAGE_SIZE + 5);
        let mut prog = programmer(target);
        let err = prog.verify(text.as_bytes(), |_| {}).unwrap_err();

        assert!(matches!(err, Error::VerifyMismatch));
        assert_eq!(prog.port().count(Command::LeaveProgMode), 1);
        assert_eq!(prog.port().pages_read(), &[(0, 128), (128, 128)]);
        assert_eq!(prog.port().count(Command::ProgPage), 0);
        assert_eq!(prog.last_error(), Some(ErrorKind::VerifyMismatch));
    }

    #[test]
    fn test_verify_mismatch_in_final_partial_page() {
        let (text, data) = image(34, 16);
        let target = MockTarget::new().with_flash(&data).corrupt_reads_at(520);
        let mut prog = programmer(target);

        assert!(matches!(prog.verify(text.as_bytes(), |_| {}), Err(Error::VerifyMismatch)));
        assert_eq!(prog.port().pages_read().len(), 5);
        assert_eq!(prog.port().count(Command::LeaveProgMode), 1);
    }

    #[test]
    fn test_verify_passes_when_leave_fails() {
        let (text, data) = image(4, 16);
        let mut prog = programmer(MockTarget::new().with_flash(&data).fail_leave());

        prog.verify(text.as_bytes(), |_| {}).unwrap();
        assert_eq!(prog.port().count(Command::LeaveProgMode), 1);
        assert_eq!(prog.state(), SessionState::Done);
        assert_eq!(prog.last_error(), Some(ErrorKind::LeaveProgramModeFailed));
    }

    #[test]
    fn test_rx_wait_ticks_config_bounds_sync() {
        init_logger();
        let config = config().with_rx_wait_ticks(3);
        let mut prog = Programmer::new(MockTarget::new().silent(), config);
        assert!(!prog.sync());
        assert_eq!(prog.port().polls(), MAX_TRIES * MAX_TRIES * 3);
    }

    #[test]
    fn test_verify_skips_device_info() {
        let (text, data) = image(2, 16);
        let mut prog = programmer(MockTarget::new().with_flash(&data));
        prog.verify(text.as_bytes(), |_| {}).unwrap();
        assert_eq!(prog.port().count(Command::GetParameter), 0);
        assert_eq!(prog.port().count(Command::ReadSign), 0);
    }

    #[test]
    fn test_missing_file_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.hex");
        let mut prog = programmer(MockTarget::new());

        let err = prog.program_file(&path, |_| {}).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(ref p) if p == &path));
        assert_eq!(prog.last_error(), Some(ErrorKind::SourceNotFound));
        assert!(prog.port().commands().is_empty());

        let err = prog.verify_file(&path, |_| {}).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[test]
    fn test_program_and_verify_file() {
        let (text, data) = image(10, 16);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let mut prog = programmer(MockTarget::new());
        assert_eq!(prog.program_file(file.path(), |_| {}).unwrap(), text.len());
        prog.verify_file(file.path(), |_| {}).unwrap();
        assert_eq!(&prog.port().flash()[..data.len()], data.as_slice());
    }

    #[test]
    fn test_last_error_cleared_by_next_session() {
        let (text, _) = image(2, 16);
        let mut prog = programmer(MockTarget::new().drop_first_responses(MAX_TRIES));
        assert!(prog.program(text.as_bytes(), |_| {}).is_err());
        assert_eq!(prog.last_error(), Some(ErrorKind::NoResponse));

        prog.program(text.as_bytes(), |_| {}).unwrap();
        assert_eq!(prog.last_error(), None);
    }

    #[test]
    fn test_read_device_info_requires_sync() {
        let mut prog = programmer(MockTarget::new().silent());
        assert!(matches!(prog.read_device_info(), Err(Error::NoResponse)));
        assert_eq!(prog.port().count(Command::GetParameter), 0);
        assert_eq!(prog.last_error(), Some(ErrorKind::NoResponse));

        let mut prog = programmer(MockTarget::new());
        let info = prog.read_device_info().unwrap();
        assert_eq!(info.part(), Some(Part::Atmega328p));
    }

    #[test]
    fn test_sync_records_no_response() {
        let mut prog = programmer(MockTarget::new().silent());
        assert!(!prog.sync());
        assert_eq!(prog.last_error(), Some(ErrorKind::NoResponse));

        let mut prog = programmer(MockTarget::new());
        assert!(prog.sync());
    }

    #[test]
    fn test_device_info_failure_is_ignored_without_expected_signature() {
        let (text, data) = image(1, 16);
        let mut prog = programmer(MockTarget::new().mute(Command::GetParameter));
        assert_eq!(prog.program(text.as_bytes(), |_| {}).unwrap(), text.len());
        assert_eq!(prog.port().count(Command::GetParameter), 1);
        assert_eq!(&prog.port().flash()[..data.len()], data.as_slice());

        let config = config().with_expected_signature(Some(Part::Atmega328p.signature()));
        let mut prog = Programmer::new(MockTarget::new().mute(Command::GetParameter), config);
        assert!(matches!(prog.program(text.as_bytes(), |_| {}), Err(Error::NoResponse)));
        assert_eq!(prog.port().count(Command::ProgPage), 0);
    }
}
