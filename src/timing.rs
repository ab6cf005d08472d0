//! Line timing
//!
//! The baud rate is fixed when the firmware is built. A [`LineTiming`] turns
//! the bit clock frequency and the baud rate into the two tick offsets the
//! state machines schedule with: a full bit period between successive bit
//! actions, and half a bit period from the start edge to the first sample.

use fugit::{HertzU32, NanosDurationU32};

/// Bits per frame: start, 8 data bits, stop.
pub const FRAME_BITS: u32 = 10;

/// Clock ticks per bit at the reference timing (1 MHz clock, 9600 baud).
pub const BIT_TIME: u16 = LineTiming::REFERENCE.bit_ticks();

/// Clock ticks per half bit at the reference timing.
pub const HALF_BIT_TIME: u16 = LineTiming::REFERENCE.half_bit_ticks();

/// Bit period and sample offset, in bit clock ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineTiming {
    clock: HertzU32,
    baud: HertzU32,
    bit_ticks: u16,
    half_bit_ticks: u16,
}

impl LineTiming {
    /// 9600 baud on a 1 MHz bit clock: 104 ticks per bit.
    pub const REFERENCE: LineTiming = LineTiming::new(HertzU32::MHz(1), HertzU32::Hz(9600));

    /// Derive the timing for `baud` on a bit clock counting at `clock`.
    ///
    /// Panics (at compile time when used in a `const`) if the bit period
    /// is shorter than two ticks or does not fit the 16-bit counter, or if a
    /// frame lasts longer than a `u32` nanosecond count can hold.
    pub const fn new(clock: HertzU32, baud: HertzU32) -> Self {
        assert!(baud.raw() > 0, "baud rate must be non-zero");
        let ticks = clock.raw() / baud.raw();
        assert!(ticks >= 2, "bit period shorter than two clock ticks");
        assert!(ticks <= u16::MAX as u32, "bit period overflows the 16-bit counter");
        assert!(
            bit_nanos(ticks, clock.raw()) * FRAME_BITS as u64 <= u32::MAX as u64,
            "frame time overflows the nanosecond duration"
        );
        LineTiming {
            clock,
            baud,
            bit_ticks: ticks as u16,
            half_bit_ticks: (ticks / 2) as u16,
        }
    }

    /// Ticks between two bit actions (`BIT_TIME`).
    #[inline]
    pub const fn bit_ticks(&self) -> u16 {
        self.bit_ticks
    }

    /// Ticks from the start edge to the centre of the start bit (`HALF_BIT_TIME`).
    #[inline]
    pub const fn half_bit_ticks(&self) -> u16 {
        self.half_bit_ticks
    }

    /// Bit clock frequency.
    pub const fn clock(&self) -> HertzU32 {
        self.clock
    }

    /// Line baud rate.
    pub const fn baud(&self) -> HertzU32 {
        self.baud
    }

    /// Wall-clock length of one bit period.
    pub fn bit_duration(&self) -> NanosDurationU32 {
        // bounded by the frame check in `new`
        NanosDurationU32::from_ticks(bit_nanos(self.bit_ticks as u32, self.clock.raw()) as u32)
    }

    /// Wall-clock length of a whole frame. This bounds how long a blocking
    /// transmit holds its caller once the line is free.
    pub fn frame_duration(&self) -> NanosDurationU32 {
        NanosDurationU32::from_ticks(self.bit_duration().ticks() * FRAME_BITS)
    }
}

const fn bit_nanos(ticks: u32, clock: u32) -> u64 {
    ticks as u64 * 1_000_000_000 / clock as u64
}

impl Default for LineTiming {
    fn default() -> Self {
        LineTiming::REFERENCE
    }
}
