//! Serial communication (half-duplex UART)
//!
//! This implementation consumes the following hardware resources:
//! - Free-running timer with one compare channel ([`BitClock`])
//! - Input GPIO pin with a falling-edge interrupt for reception (RX)
//! - Output GPIO pin for transmission (TX)
//!
//! Frames are 8N1 with an idle-high line. Reception starts when the edge
//! interrupt sees the start bit; every following bit is sampled from the
//! compare interrupt at the bit centre. Transmission drives one bit per
//! compare interrupt. Both directions share the single compare channel, so
//! only one of them runs at a time.
//!
//! [`Transceiver`] holds the state machines and is meant to be called from
//! the two interrupt vectors. See [`crate::shared`] for wrapping it in a
//! critical section.

use core::fmt::Debug;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_io_async::ErrorKind;

use crate::frame::{RxFrame, TxFrame};
use crate::hal::{BitClock, EdgeInterrupt};
use crate::timing::LineTiming;

/// Serial communication error type
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Bus error
    Bus(E),
    /// The line is receiving or transmitting
    Busy,
    /// No transceiver installed in the shared slot
    NotInitialized,
}

impl<E: Debug> embedded_io_async::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Bus(_) => ErrorKind::Other,
            Error::Busy => ErrorKind::Other,
            Error::NotInitialized => ErrorKind::NotConnected,
        }
    }
}

/// Current owner of the bit clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Session {
    /// Waiting for a start edge or a transmit request
    Idle,
    /// Sampling an incoming frame
    Receiving,
    /// Driving an outgoing frame
    Transmitting,
}

/// Outcome of a compare interrupt that ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A valid frame arrived; the byte is waiting in the receive slot
    Received(u8),
    /// A frame failed start/stop validation and was discarded
    Dropped,
    /// The outgoing frame has been clocked out completely
    Sent,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Receiving(RxFrame),
    Transmitting(TxFrame),
}

/// Interrupt-driven half-duplex serial device
pub struct Transceiver<Clock, Rx, Tx>
where
    Clock: BitClock,
    Rx: InputPin + EdgeInterrupt,
    Tx: OutputPin,
{
    clock: Clock,
    rx: Rx,
    tx: Tx,
    timing: LineTiming,
    state: State,
    target: u16,
    received: Option<u8>,
}

impl<Clock, Rx, Tx, E> Transceiver<Clock, Rx, Tx>
where
    Clock: BitClock,
    Rx: InputPin<Error = E> + EdgeInterrupt,
    Tx: OutputPin<Error = E>,
{
    /// Create instance
    ///
    /// Drives the output to mark, parks the bit clock and arms start-edge
    /// detection. Interrupts may be enabled globally once this returns.
    pub fn new(mut clock: Clock, mut rx: Rx, mut tx: Tx, timing: LineTiming) -> Result<Self, Error<E>> {
        tx.set_high().map_err(Error::Bus)?;
        clock.unlisten();
        clock.stop();
        rx.arm();
        Ok(Transceiver {
            clock,
            rx,
            tx,
            timing,
            state: State::Idle,
            target: 0,
            received: None,
        })
    }

    /// Release the hardware.
    pub fn free(self) -> (Clock, Rx, Tx) {
        (self.clock, self.rx, self.tx)
    }

    /// Which state machine currently owns the bit clock.
    pub fn session(&self) -> Session {
        match self.state {
            State::Idle => Session::Idle,
            State::Receiving(_) => Session::Receiving,
            State::Transmitting(_) => Session::Transmitting,
        }
    }

    /// Line timing this device was built with.
    pub fn timing(&self) -> &LineTiming {
        &self.timing
    }

    /// Whether a received byte is waiting.
    pub fn has_received(&self) -> bool {
        self.received.is_some()
    }

    /// Take the received byte out of its slot.
    pub fn take_received(&mut self) -> Option<u8> {
        self.received.take()
    }

    /// Start-edge interrupt handler.
    ///
    /// Claims the bit clock for reception and schedules the first sample half
    /// a bit period after the edge, in the centre of the start bit.
    pub fn on_edge(&mut self) {
        self.rx.disarm();
        if !matches!(self.state, State::Idle) {
            // edge detection should not have been armed
            return;
        }
        self.clock.start();
        let now = self.clock.now();
        self.schedule(now.wrapping_add(self.timing.half_bit_ticks()));
        self.clock.listen();
        self.state = State::Receiving(RxFrame::new());
        log::trace!("rx start at tick {}", now);
    }

    /// Compare-match interrupt handler.
    ///
    /// Advances the compare target by one bit period and runs one step of
    /// whichever state machine owns the clock. Returns the event that ended
    /// the session, if this step ended one.
    ///
    /// A pin error aborts the session: the frame is discarded, the line goes
    /// back to idle and the error is returned.
    pub fn on_compare(&mut self) -> Result<Option<Event>, Error<E>> {
        self.schedule(self.target.wrapping_add(self.timing.bit_ticks()));
        match self.state {
            State::Transmitting(ref mut frame) => match frame.next_level() {
                Some(level) => {
                    if let Err(e) = self.tx.set_state(level.into()) {
                        self.end_session();
                        log::debug!("tx pin error, frame aborted");
                        return Err(Error::Bus(e));
                    }
                    Ok(None)
                }
                None => {
                    self.end_session();
                    Ok(Some(Event::Sent))
                }
            },
            State::Receiving(ref mut frame) => {
                if !frame.is_complete() {
                    match self.rx.is_high() {
                        Ok(high) => frame.sample(high),
                        Err(e) => {
                            self.end_session();
                            log::debug!("rx pin error, frame dropped");
                            return Err(Error::Bus(e));
                        }
                    }
                    return Ok(None);
                }
                // this tick sits on the stop bit
                let frame = *frame;
                let stop = self.rx.is_high();
                self.end_session();
                match frame.finish(stop.map_err(Error::Bus)?) {
                    Some(byte) => {
                        if let Some(old) = self.received.replace(byte) {
                            log::debug!("rx byte {:#04x} overwritten by {:#04x}", old, byte);
                        }
                        Ok(Some(Event::Received(byte)))
                    }
                    None => {
                        log::debug!("framing error, dropped frame {:#05x}", frame.raw());
                        Ok(Some(Event::Dropped))
                    }
                }
            }
            State::Idle => {
                // the compare interrupt is never enabled while idle
                self.clock.unlisten();
                Ok(None)
            }
        }
    }

    /// Claim the bit clock and start clocking out `byte`.
    ///
    /// Returns [`Error::Busy`] unless the line is idle. Completion is
    /// signalled by [`Event::Sent`] from [`Transceiver::on_compare`] and by
    /// the session returning to [`Session::Idle`].
    pub fn begin_transmit(&mut self, byte: u8) -> Result<(), Error<E>> {
        if !matches!(self.state, State::Idle) {
            return Err(Error::Busy);
        }
        self.tx.set_high().map_err(Error::Bus)?;
        self.rx.disarm();
        self.clock.start();
        let now = self.clock.now();
        self.schedule(now.wrapping_add(self.timing.bit_ticks()));
        self.state = State::Transmitting(TxFrame::new(byte));
        self.clock.listen();
        log::trace!("tx {:#04x} at tick {}", byte, now);
        Ok(())
    }

    #[inline]
    fn schedule(&mut self, target: u16) {
        self.target = target;
        self.clock.set_compare(target);
    }

    fn end_session(&mut self) {
        self.clock.stop();
        self.clock.unlisten();
        self.state = State::Idle;
        self.rx.arm();
    }
}
