//! Interrupt-safe handle
//!
//! [`SharedSerial`] owns a [`Transceiver`] behind a critical-section mutex so
//! it can live in a `static` and be reached from both interrupt vectors and
//! the main loop:
//!
//! ```ignore
//! static SERIAL: SharedSerial<Clock, RxPin, TxPin> = SharedSerial::new();
//!
//! #[interrupt]
//! fn PORT1() {
//!     SERIAL.on_edge();
//! }
//!
//! #[interrupt]
//! fn TIMER0_A0() {
//!     SERIAL.on_compare().ok();
//! }
//! ```
//!
//! Every access to the session, the receive slot or the bit clock happens
//! inside `critical_section::with`, so the main context never sees a
//! half-updated state.

use core::cell::RefCell;
use core::hint::spin_loop;

use critical_section::Mutex;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;

use crate::hal::{BitClock, EdgeInterrupt};
use crate::serial::{Error, Event, Session, Transceiver};

/// [`Transceiver`] shared between interrupt and main context
pub struct SharedSerial<Clock, Rx, Tx>
where
    Clock: BitClock,
    Rx: InputPin + EdgeInterrupt,
    Tx: OutputPin,
{
    inner: Mutex<RefCell<Option<Transceiver<Clock, Rx, Tx>>>>,
}

impl<Clock, Rx, Tx, E> Default for SharedSerial<Clock, Rx, Tx>
where
    Clock: BitClock,
    Rx: InputPin<Error = E> + EdgeInterrupt,
    Tx: OutputPin<Error = E>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Clock, Rx, Tx, E> SharedSerial<Clock, Rx, Tx>
where
    Clock: BitClock,
    Rx: InputPin<Error = E> + EdgeInterrupt,
    Tx: OutputPin<Error = E>,
{
    /// Empty slot, suitable for a `static`.
    pub const fn new() -> Self {
        SharedSerial {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install `serial`, returning the previously installed one.
    pub fn init(&self, serial: Transceiver<Clock, Rx, Tx>) -> Option<Transceiver<Clock, Rx, Tx>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).replace(serial))
    }

    /// Take the transceiver back out.
    pub fn release(&self) -> Option<Transceiver<Clock, Rx, Tx>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take())
    }

    #[inline]
    fn with<R>(&self, f: impl FnOnce(&mut Transceiver<Clock, Rx, Tx>) -> R) -> Result<R, Error<E>> {
        critical_section::with(|cs| {
            self.inner
                .borrow_ref_mut(cs)
                .as_mut()
                .map(f)
                .ok_or(Error::NotInitialized)
        })
    }

    /// Call from the receive pin's edge interrupt.
    pub fn on_edge(&self) {
        self.with(|serial| serial.on_edge()).ok();
    }

    /// Call from the bit clock's compare interrupt.
    ///
    /// [`Event::Received`] is the wake-up signal for the main loop.
    pub fn on_compare(&self) -> Result<Option<Event>, Error<E>> {
        self.with(|serial| serial.on_compare())?
    }

    /// Current session of the installed transceiver.
    pub fn session(&self) -> Result<Session, Error<E>> {
        self.with(|serial| serial.session())
    }

    /// Whether a received byte is waiting. `false` when nothing is installed.
    pub fn has_received(&self) -> bool {
        self.with(|serial| serial.has_received()).unwrap_or(false)
    }

    /// Consume the received byte, if one is waiting.
    pub fn take_received(&self) -> Option<u8> {
        self.with(|serial| serial.take_received()).ok().flatten()
    }

    /// Send one byte and return once its stop bit has been clocked out.
    ///
    /// Spins while a frame is being received, then claims the bit clock in
    /// the same critical section that checked the line was idle. The second
    /// spin polls until the compare interrupt has released the session.
    /// Once the line is free the call holds its caller for one frame time
    /// (see [`crate::timing::LineTiming::frame_duration`]).
    ///
    /// There is no timeout: if a receive never completes this never returns.
    pub fn transmit(&self, byte: u8) -> Result<(), Error<E>> {
        loop {
            match self.with(|serial| serial.begin_transmit(byte))? {
                Ok(()) => break,
                Err(Error::Busy) => spin_loop(),
                Err(e) => return Err(e),
            }
        }
        while self.with(|serial| serial.session() == Session::Transmitting)? {
            spin_loop();
        }
        Ok(())
    }

    /// [`SharedSerial::transmit`], yielding to `delay` for one bit period
    /// between polls instead of spinning.
    pub async fn transmit_async<D: DelayNs>(&self, byte: u8, delay: &mut D) -> Result<(), Error<E>> {
        let period = self.with(|serial| serial.timing().bit_duration())?.ticks();
        loop {
            match self.with(|serial| serial.begin_transmit(byte))? {
                Ok(()) => break,
                Err(Error::Busy) => delay.delay_ns(period).await,
                Err(e) => return Err(e),
            }
        }
        while self.with(|serial| serial.session() == Session::Transmitting)? {
            delay.delay_ns(period).await;
        }
        Ok(())
    }

    /// Wait for the next received byte, polling once per bit period.
    pub async fn receive_async<D: DelayNs>(&self, delay: &mut D) -> Result<u8, Error<E>> {
        let period = self.with(|serial| serial.timing().bit_duration())?.ticks();
        loop {
            if let Some(byte) = self.with(|serial| serial.take_received())? {
                return Ok(byte);
            }
            delay.delay_ns(period).await;
        }
    }

    /// Byte-stream view over this handle.
    pub fn port<D: DelayNs>(&self, delay: D) -> SerialPort<'_, Clock, Rx, Tx, D> {
        SerialPort { serial: self, delay }
    }
}

/// `embedded-io-async` stream over a [`SharedSerial`]
///
/// Reads return one byte at a time since only a single received byte is
/// held. Writes send the whole buffer, one blocking frame after another.
pub struct SerialPort<'a, Clock, Rx, Tx, Delay>
where
    Clock: BitClock,
    Rx: InputPin + EdgeInterrupt,
    Tx: OutputPin,
    Delay: DelayNs,
{
    serial: &'a SharedSerial<Clock, Rx, Tx>,
    delay: Delay,
}

impl<Clock, Rx, Tx, Delay, E> embedded_io_async::ErrorType for SerialPort<'_, Clock, Rx, Tx, Delay>
where
    Clock: BitClock,
    Rx: InputPin<Error = E> + EdgeInterrupt,
    Tx: OutputPin<Error = E>,
    Delay: DelayNs,
    E: core::fmt::Debug,
{
    type Error = crate::serial::Error<E>;
}

impl<Clock, Rx, Tx, Delay, E> embedded_io_async::Write for SerialPort<'_, Clock, Rx, Tx, Delay>
where
    Clock: BitClock,
    Rx: InputPin<Error = E> + EdgeInterrupt,
    Tx: OutputPin<Error = E>,
    Delay: DelayNs,
    E: core::fmt::Debug,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for byte in buf {
            self.serial.transmit_async(*byte, &mut self.delay).await?;
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<Clock, Rx, Tx, Delay, E> embedded_io_async::Read for SerialPort<'_, Clock, Rx, Tx, Delay>
where
    Clock: BitClock,
    Rx: InputPin<Error = E> + EdgeInterrupt,
    Tx: OutputPin<Error = E>,
    Delay: DelayNs,
    E: core::fmt::Debug,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match buf.first_mut() {
            Some(slot) => {
                *slot = self.serial.receive_async(&mut self.delay).await?;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
