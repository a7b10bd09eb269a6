//! STK500 (version 1) command set and frame builder.
//!
//! This is the protocol spoken by Optiboot and the classic Arduino
//! bootloaders. Every command is a fixed frame terminated by [`CRC_EOP`];
//! every answer is framed by [`STK_INSYNC`] and [`STK_OK`]:
//!
//! ```text
//! command:   +-----+------------------+---------+
//!            | cmd |  parameters ...  | CRC_EOP |
//!            +-----+------------------+---------+
//!
//! response:  +------------+----------------+--------+
//!            | STK_INSYNC |  payload ...   | STK_OK |
//!            +------------+----------------+--------+
//! ```
//!
//! Page commands carry a big-endian 16-bit length and the memory type tag
//! `'F'` (flash). `LOAD_ADDRESS` carries a little-endian word address.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Response: command succeeded.
pub const STK_OK: u8 = 0x10;
/// Response: command failed.
pub const STK_FAILED: u8 = 0x11;
/// Response: unknown command.
pub const STK_UNKNOWN: u8 = 0x12;
/// Response: start of a well-formed answer.
pub const STK_INSYNC: u8 = 0x14;
/// Response: the last command was not terminated by `CRC_EOP`.
pub const STK_NOSYNC: u8 = 0x15;
/// End-of-command marker.
pub const CRC_EOP: u8 = 0x20;

/// Memory type tag selecting flash in page commands.
pub const MEMTYPE_FLASH: u8 = b'F';

/// First parameter index queried by `GET_PARAMETER` (hardware version).
pub const PARAM_BASE: u8 = 0x80;

/// Largest non-page command frame.
pub const MAX_COMMAND_LEN: usize = 16;

/// STK500 command codes used by the programmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Synchronize with the bootloader (0x30).
    GetSync = 0x30,
    /// Read a programmer parameter (0x41).
    GetParameter = 0x41,
    /// Enter programming mode (0x50). Bootloaders enter it implicitly.
    EnterProgMode = 0x50,
    /// Leave programming mode and start the application (0x51).
    LeaveProgMode = 0x51,
    /// Set the word address for the next page command (0x55).
    LoadAddress = 0x55,
    /// Program one page (0x64).
    ProgPage = 0x64,
    /// Read one page (0x74).
    ReadPage = 0x74,
    /// Read the three signature bytes (0x75).
    ReadSign = 0x75,
}

impl Command {
    /// Decode a command byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x30 => Some(Self::GetSync),
            0x41 => Some(Self::GetParameter),
            0x50 => Some(Self::EnterProgMode),
            0x51 => Some(Self::LeaveProgMode),
            0x55 => Some(Self::LoadAddress),
            0x64 => Some(Self::ProgPage),
            0x74 => Some(Self::ReadPage),
            0x75 => Some(Self::ReadSign),
            _ => None,
        }
    }
}

/// Fixed-capacity command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    command: Command,
    buf: [u8; MAX_COMMAND_LEN],
    len: usize,
}

impl CommandFrame {
    fn new(command: Command) -> Self {
        let mut buf = [0u8; MAX_COMMAND_LEN];
        buf[0] = command as u8;
        Self {
            command,
            buf,
            len: 1,
        }
    }

    fn push(mut self, byte: u8) -> Self {
        self.buf[self.len] = byte;
        self.len += 1;
        self
    }

    fn terminated(self) -> Self {
        self.push(CRC_EOP)
    }

    /// `GET_SYNC`.
    pub fn get_sync() -> Self {
        Self::new(Command::GetSync).terminated()
    }

    /// `GET_PARAMETER` for one parameter index.
    pub fn get_parameter(param: u8) -> Self {
        Self::new(Command::GetParameter).push(param).terminated()
    }

    /// `READ_SIGN`.
    pub fn read_sign() -> Self {
        Self::new(Command::ReadSign).terminated()
    }

    /// `LOAD_ADDRESS` with a flash word address.
    pub fn load_address(word_address: u16) -> Self {
        let mut addr = [0u8; 2];
        LittleEndian::write_u16(&mut addr, word_address);
        Self::new(Command::LoadAddress)
            .push(addr[0])
            .push(addr[1])
            .terminated()
    }

    /// Header of `PROG_PAGE`; the page bytes and `CRC_EOP` follow separately.
    pub fn prog_page_header(length: u16) -> Self {
        let mut len = [0u8; 2];
        BigEndian::write_u16(&mut len, length);
        Self::new(Command::ProgPage)
            .push(len[0])
            .push(len[1])
            .push(MEMTYPE_FLASH)
    }

    /// `READ_PAGE` of `length` flash bytes.
    pub fn read_page(length: u16) -> Self {
        let mut len = [0u8; 2];
        BigEndian::write_u16(&mut len, length);
        Self::new(Command::ReadPage)
            .push(len[0])
            .push(len[1])
            .push(MEMTYPE_FLASH)
            .terminated()
    }

    /// `LEAVE_PROGMODE`.
    pub fn leave_prog_mode() -> Self {
        Self::new(Command::LeaveProgMode).terminated()
    }

    /// The encoded frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Get the command.
    pub fn command(&self) -> Command {
        self.command
    }
}
