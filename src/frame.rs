//! 8N1 frame shift registers
//!
//! Both directions use the same 10-bit layout on the wire and in the
//! buffer: bit 0 is the start bit, bits 1..=8 are the data bits
//! (LSB first), bit 9 is the stop bit.

const START_BIT: u16 = 0x001;
const STOP_BIT: u16 = 0x200;
const FRAME_MASK: u16 = START_BIT | STOP_BIT;

/// Number of bit periods the encoder drives: start, 8 data, stop.
pub const TX_BITS: u8 = 10;

/// Number of bit periods the decoder samples before completion: start and
/// 8 data. The completion tick lands on the stop bit.
pub const RX_BITS: u8 = 9;

/// Outgoing frame: pre-shifted buffer plus the remaining bit count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxFrame {
    buffer: u16,
    remaining: u8,
}

impl TxFrame {
    /// Load `byte` with the stop bit set above it, then shift the whole
    /// thing up by one to prepend the start bit.
    pub const fn new(byte: u8) -> Self {
        TxFrame {
            buffer: ((byte as u16) | 0x100) << 1,
            remaining: TX_BITS,
        }
    }

    /// Line level for the next bit period, `true` being mark (high).
    /// Returns `None` once all ten bits have been handed out.
    pub fn next_level(&mut self) -> Option<bool> {
        if self.remaining == 0 {
            return None;
        }
        let level = self.buffer & 0x01 == 0x01;
        self.buffer >>= 1;
        self.remaining -= 1;
        Some(level)
    }

    /// Bit periods still to be driven.
    pub const fn remaining(&self) -> u8 {
        self.remaining
    }
}

/// Incoming frame being sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFrame {
    buffer: u16,
    remaining: u8,
}

impl Default for RxFrame {
    fn default() -> Self {
        RxFrame::new()
    }
}

impl RxFrame {
    /// Empty frame waiting for its first sample.
    pub const fn new() -> Self {
        RxFrame {
            buffer: 0,
            remaining: RX_BITS,
        }
    }

    /// Shift one sampled level in from the top. After all nine samples the
    /// start bit has travelled down to bit 0 and the last data bit sits at
    /// bit 8.
    ///
    /// Extra samples beyond nine are ignored.
    pub fn sample(&mut self, high: bool) {
        if self.remaining == 0 {
            return;
        }
        if high {
            self.buffer |= STOP_BIT;
        }
        self.buffer >>= 1;
        self.remaining -= 1;
    }

    /// Remaining samples before the frame is complete.
    pub const fn remaining(&self) -> u8 {
        self.remaining
    }

    /// Whether all nine samples have been taken.
    pub const fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Close the frame with the level seen at the stop-bit centre.
    ///
    /// Returns the data byte when start reads 0 and stop reads 1, `None`
    /// for a framing error or a frame that is still being sampled.
    pub fn finish(mut self, stop_high: bool) -> Option<u8> {
        if !self.is_complete() {
            return None;
        }
        if stop_high {
            self.buffer |= STOP_BIT;
        }
        if self.buffer & FRAME_MASK == STOP_BIT {
            Some((self.buffer >> 1) as u8)
        } else {
            None
        }
    }

    /// Raw buffer contents, for diagnostics.
    pub const fn raw(&self) -> u16 {
        self.buffer
    }
}
