//! Simulated STK500 bootloader for unit tests.
//!
//! Parses command frames as the host writes them (including `PROG_PAGE`
//! frames split over several writes), keeps a flash image, and queues the
//! framed answers for the host to poll. Faults can be injected to exercise
//! timeout and verification paths.

use std::collections::VecDeque;

use log::LevelFilter;

use crate::error::Result;
use crate::port::Transport;
use crate::protocol::stk500::{CRC_EOP, Command, PARAM_BASE, STK_INSYNC, STK_NOSYNC, STK_OK};

const FLASH_SIZE: usize = 32 * 1024;

/// Capture log output in test runs.
pub(crate) fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::max())
        .is_test(true)
        .try_init();
}

pub(crate) struct MockTarget {
    flash: Vec<u8>,
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    address: usize,
    commands: Vec<Command>,
    pages_written: Vec<(usize, usize)>,
    pages_read: Vec<(usize, usize)>,
    tx_enable: bool,
    tx_enable_log: Vec<bool>,
    parameters: [u8; 10],
    signature: [u8; 3],
    silent: bool,
    drop_responses: usize,
    truncate_reads: Option<usize>,
    corrupt_at: Option<usize>,
    fail_leave: bool,
    muted: Vec<Command>,
    polls: usize,
}

impl MockTarget {
    /// An ATmega328P running Optiboot 4.4 that answers everything.
    pub(crate) fn new() -> Self {
        Self {
            flash: vec![0xFF; FLASH_SIZE],
            rx: VecDeque::new(),
            pending: Vec::new(),
            address: 0,
            commands: Vec::new(),
            pages_written: Vec::new(),
            pages_read: Vec::new(),
            tx_enable: false,
            tx_enable_log: Vec::new(),
            parameters: [0x02, 0x04, 0x04, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03],
            signature: [0x1E, 0x95, 0x0F],
            silent: false,
            drop_responses: 0,
            truncate_reads: None,
            corrupt_at: None,
            fail_leave: false,
            muted: Vec::new(),
            polls: 0,
        }
    }

    /// Never answer anything.
    pub(crate) fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Ignore the first `count` commands.
    pub(crate) fn drop_first_responses(mut self, count: usize) -> Self {
        self.drop_responses = count;
        self
    }

    /// Stop every page read after `count` data bytes.
    pub(crate) fn truncate_reads(mut self, count: usize) -> Self {
        self.truncate_reads = Some(count);
        self
    }

    /// Return a flipped value when the flash byte at `address` is read back.
    pub(crate) fn corrupt_reads_at(mut self, address: usize) -> Self {
        self.corrupt_at = Some(address);
        self
    }

    /// Do not acknowledge `LEAVE_PROGMODE`.
    pub(crate) fn fail_leave(mut self) -> Self {
        self.fail_leave = true;
        self
    }

    /// Never answer `command`.
    pub(crate) fn mute(mut self, command: Command) -> Self {
        self.muted.push(command);
        self
    }

    /// Report a different device signature.
    pub(crate) fn with_signature(mut self, signature: [u8; 3]) -> Self {
        self.signature = signature;
        self
    }

    /// Preload flash contents starting at address 0.
    pub(crate) fn with_flash(mut self, image: &[u8]) -> Self {
        self.flash[..image.len()].copy_from_slice(image);
        self
    }

    /// Queue stray bytes ahead of the next answer.
    pub(crate) fn inject_noise(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    pub(crate) fn count(&self, command: Command) -> usize {
        self.commands.iter().filter(|&&c| c == command).count()
    }

    pub(crate) fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub(crate) fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// `(byte address, length)` of every programmed page.
    pub(crate) fn pages_written(&self) -> &[(usize, usize)] {
        &self.pages_written
    }

    /// `(byte address, length)` of every page read back.
    pub(crate) fn pages_read(&self) -> &[(usize, usize)] {
        &self.pages_read
    }

    /// Number of `read_byte` polls so far, answered or not.
    pub(crate) fn polls(&self) -> usize {
        self.polls
    }

    pub(crate) fn tx_enable_log(&self) -> &[bool] {
        &self.tx_enable_log
    }

    pub(crate) fn tx_enabled(&self) -> bool {
        self.tx_enable
    }

    fn frame_len(&self) -> Option<usize> {
        let command = Command::from_byte(*self.pending.first()?)?;
        let len = match command {
            Command::GetSync
            | Command::ReadSign
            | Command::LeaveProgMode
            | Command::EnterProgMode => 2,
            Command::GetParameter => 3,
            Command::LoadAddress => 4,
            Command::ReadPage => 5,
            Command::ProgPage => {
                let hi = *self.pending.get(1)?;
                let lo = *self.pending.get(2)?;
                4 + usize::from(u16::from_be_bytes([hi, lo])) + 1
            },
        };
        Some(len)
    }

    fn process(&mut self) {
        loop {
            let Some(&first) = self.pending.first() else {
                return;
            };
            let Some(command) = Command::from_byte(first) else {
                self.pending.remove(0);
                continue;
            };
            let Some(len) = self.frame_len() else {
                return;
            };
            if self.pending.len() < len {
                return;
            }
            let frame: Vec<u8> = self.pending.drain(..len).collect();
            self.commands.push(command);

            if frame[len - 1] != CRC_EOP {
                self.reply(Some(&[STK_NOSYNC]));
                continue;
            }
            let answer = self.execute(command, &frame);
            if !self.muted.contains(&command) {
                self.reply(answer.as_deref());
            }
        }
    }

    fn execute(&mut self, command: Command, frame: &[u8]) -> Option<Vec<u8>> {
        let mut out = vec![STK_INSYNC];
        match command {
            Command::GetSync | Command::EnterProgMode => {},
            Command::GetParameter => {
                let index = usize::from(frame[1].wrapping_sub(PARAM_BASE));
                out.push(self.parameters.get(index).copied().unwrap_or(0x03));
            },
            Command::ReadSign => out.extend_from_slice(&self.signature),
            Command::LoadAddress => {
                self.address = usize::from(u16::from_le_bytes([frame[1], frame[2]])) * 2;
            },
            Command::ProgPage => {
                let data = &frame[4..frame.len() - 1];
                for (i, &byte) in data.iter().enumerate() {
                    self.flash[(self.address + i) % FLASH_SIZE] = byte;
                }
                self.pages_written.push((self.address, data.len()));
            },
            Command::ReadPage => {
                let len = usize::from(u16::from_be_bytes([frame[1], frame[2]]));
                self.pages_read.push((self.address, len));
                let available = self.truncate_reads.map_or(len, |n| n.min(len));
                for i in 0..available {
                    let addr = (self.address + i) % FLASH_SIZE;
                    let byte = self.flash[addr];
                    out.push(if self.corrupt_at == Some(addr) { !byte } else { byte });
                }
                if available < len {
                    return Some(out);
                }
            },
            Command::LeaveProgMode => {
                if self.fail_leave {
                    return None;
                }
            },
        }
        out.push(STK_OK);
        Some(out)
    }

    fn reply(&mut self, answer: Option<&[u8]>) {
        if self.silent {
            return;
        }
        if self.drop_responses > 0 {
            self.drop_responses -= 1;
            return;
        }
        if let Some(bytes) = answer {
            self.rx.extend(bytes);
        }
    }
}

impl Transport for MockTarget {
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(buf);
        self.process();
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.rx.len())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        self.polls += 1;
        Ok(self.rx.pop_front())
    }

    fn discard_input(&mut self) -> Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn set_tx_enable(&mut self, transmitting: bool) -> Result<()> {
        self.tx_enable = transmitting;
        self.tx_enable_log.push(transmitting);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
