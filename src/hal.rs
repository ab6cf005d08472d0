//! Hardware capabilities
//!
//! The transceiver needs exactly two pieces of hardware beyond plain GPIO:
//! - a free-running timer with one compare channel, which provides the bit
//!   clock and the compare interrupt that schedules every bit action
//! - an edge interrupt on the receive pin, which detects the start bit
//!
//! Pin levels go through the `embedded-hal` digital traits; the two
//! interrupt sources are described by the traits below.

/// Free-running 16-bit tick counter with a single compare register.
///
/// The counter wraps at `u16::MAX`; all target arithmetic is wrapping.
/// Implementations acknowledge the hardware compare flag themselves, either
/// in the interrupt vector before calling into this crate or as a side effect
/// of [`BitClock::set_compare`].
pub trait BitClock {
    /// Current counter value.
    fn now(&mut self) -> u16;

    /// Let the counter run in continuous mode. Calling this on a running
    /// clock must not reset the count.
    fn start(&mut self);

    /// Halt the counter.
    fn stop(&mut self);

    /// Program the compare register. The compare interrupt fires when the
    /// counter reaches `tick`.
    fn set_compare(&mut self, tick: u16);

    /// Enable the compare interrupt.
    fn listen(&mut self);

    /// Disable the compare interrupt.
    fn unlisten(&mut self);
}

/// Falling-edge interrupt on the receive pin.
pub trait EdgeInterrupt {
    /// Clear any stale pending edge, then enable the interrupt on the
    /// high-to-low transition.
    fn arm(&mut self);

    /// Disable the edge interrupt.
    fn disarm(&mut self);
}
