//! Page-bounded flash access.
//!
//! Bytes decoded from the image are accumulated in a [`PageBuffer`]. When
//! the buffer reaches [`TARGET_PAGE_SIZE`] it is committed through a
//! [`PageOp`]: [`WritePage`] programs it, [`VerifyPage`] reads the same
//! range back and compares. A short final page is committed by
//! [`Pager::finish`].

use crate::error::{Error, Result};
use crate::port::Transport;
use crate::protocol::exchange::FrameExchange;
use crate::target::part::TARGET_PAGE_SIZE;
use log::debug;

/// Fixed-capacity page accumulator.
#[derive(Debug, Clone)]
pub struct PageBuffer {
    data: [u8; TARGET_PAGE_SIZE],
    filled: usize,
    address: u16,
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageBuffer {
    /// Empty buffer at flash address 0.
    pub fn new() -> Self {
        Self {
            data: [0xFF; TARGET_PAGE_SIZE],
            filled: 0,
            address: 0,
        }
    }

    /// Page capacity in bytes.
    pub fn capacity(&self) -> usize {
        TARGET_PAGE_SIZE
    }

    /// Bytes buffered so far.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Flash byte address of the first buffered byte.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Whether the buffer has reached capacity.
    pub fn is_full(&self) -> bool {
        self.filled == TARGET_PAGE_SIZE
    }

    /// Buffered bytes.
    pub fn contents(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Append one byte. The caller must commit a full buffer first.
    fn push(&mut self, byte: u8) {
        debug_assert!(!self.is_full());
        self.data[self.filled] = byte;
        self.filled += 1;
    }

    /// Empty the buffer and move the address past the committed bytes.
    #[allow(clippy::cast_possible_truncation)]
    fn advance(&mut self) {
        // filled <= TARGET_PAGE_SIZE, which fits in u16.
        self.address = self.address.wrapping_add(self.filled as u16);
        self.filled = 0;
    }
}

/// What happens to a completed page.
pub trait PageOp {
    /// Commit `page` at flash byte address `address`.
    fn commit<T: Transport>(
        &mut self,
        exchange: &mut FrameExchange<T>,
        address: u16,
        page: &[u8],
    ) -> Result<()>;
}

/// Program each page.
#[derive(Debug, Default, Clone, Copy)]
pub struct WritePage;

impl PageOp for WritePage {
    fn commit<T: Transport>(
        &mut self,
        exchange: &mut FrameExchange<T>,
        address: u16,
        page: &[u8],
    ) -> Result<()> {
        debug!("Writing {} bytes at 0x{address:04X}", page.len());
        exchange.load_address(address >> 1)?;
        exchange.write_page(page)
    }
}

/// Read each page back and compare it with the image.
#[derive(Debug, Clone)]
pub struct VerifyPage {
    scratch: [u8; TARGET_PAGE_SIZE],
}

impl Default for VerifyPage {
    fn default() -> Self {
        Self {
            scratch: [0; TARGET_PAGE_SIZE],
        }
    }
}

impl PageOp for VerifyPage {
    fn commit<T: Transport>(
        &mut self,
        exchange: &mut FrameExchange<T>,
        address: u16,
        page: &[u8],
    ) -> Result<()> {
        debug!("Verifying {} bytes at 0x{address:04X}", page.len());
        let readback = &mut self.scratch[..page.len()];
        exchange.load_address(address >> 1)?;
        exchange.read_page(readback)?;

        if let Some(offset) = page.iter().zip(readback.iter()).position(|(a, b)| a != b) {
            debug!(
                "Mismatch at 0x{:04X}: image 0x{:02X}, flash 0x{:02X}",
                usize::from(address) + offset,
                page[offset],
                readback[offset]
            );
            return Err(Error::VerifyMismatch);
        }
        Ok(())
    }
}

/// Streams bytes into pages and commits each page as it fills.
pub struct Pager<'a, T: Transport, O: PageOp> {
    exchange: &'a mut FrameExchange<T>,
    op: O,
    page: PageBuffer,
    committed: usize,
}

/// Pager that programs flash.
pub type PageWriter<'a, T> = Pager<'a, T, WritePage>;

/// Pager that verifies flash.
pub type PageVerifier<'a, T> = Pager<'a, T, VerifyPage>;

impl<'a, T: Transport, O: PageOp> Pager<'a, T, O> {
    /// Start at flash address 0.
    pub fn new(exchange: &'a mut FrameExchange<T>, op: O) -> Self {
        Self {
            exchange,
            op,
            page: PageBuffer::new(),
            committed: 0,
        }
    }

    /// The page being accumulated.
    pub fn page(&self) -> &PageBuffer {
        &self.page
    }

    /// Pages committed so far.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Append one byte. Returns `true` when a page was committed.
    ///
    /// A page left full by a failed commit is committed again before the
    /// byte is taken, so the call fails again while the target stays silent.
    pub fn append(&mut self, byte: u8) -> Result<bool> {
        let retried = self.page.is_full();
        if retried {
            self.commit()?;
        }
        self.page.push(byte);
        if self.page.is_full() {
            self.commit()?;
            return Ok(true);
        }
        Ok(retried)
    }

    /// Commit the trailing partial page, if any. Returns the total number
    /// of pages committed.
    pub fn finish(mut self) -> Result<usize> {
        if !self.page.is_empty() {
            self.commit()?;
        }
        Ok(self.committed)
    }

    fn commit(&mut self) -> Result<()> {
        self.op
            .commit(self.exchange, self.page.address(), self.page.contents())?;
        self.page.advance();
        self.committed += 1;
        Ok(())
    }
}

impl<'a, T: Transport> PageWriter<'a, T> {
    /// Pager that programs flash.
    pub fn writer(exchange: &'a mut FrameExchange<T>) -> Self {
        Self::new(exchange, WritePage)
    }
}

impl<'a, T: Transport> PageVerifier<'a, T> {
    /// Pager that verifies flash.
    pub fn verifier(exchange: &'a mut FrameExchange<T>) -> Self {
        Self::new(exchange, VerifyPage::default())
    }
}
