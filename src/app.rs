//! Command loop
//!
//! The application side of the link: every received byte is looked up in a
//! table of [`Command`]s, the matching output is driven, and the byte is
//! echoed back to the sender. Firmware variants differ only in the table
//! they pass in, e.g. [`SINGLE_RELAY`] or [`DUAL_RELAY`].

use core::convert::Infallible;

use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::hal::{BitClock, EdgeInterrupt};
use crate::serial::Error;
use crate::shared::SharedSerial;

/// Drive output `output` to `state` when `byte` arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Received byte that triggers the command
    pub byte: u8,
    /// Index into the application's outputs
    pub output: usize,
    /// Level the output is driven to
    pub state: PinState,
}

impl Command {
    /// Table entry, usable in `const` tables.
    pub const fn new(byte: u8, output: usize, state: PinState) -> Self {
        Command { byte, output, state }
    }
}

/// One relay: 'I' switches it on, 'O' switches it off.
pub const SINGLE_RELAY: &[Command] = &[
    Command::new(b'I', 0, PinState::High),
    Command::new(b'O', 0, PinState::Low),
];

/// Two relays: 'I'/'O' for the first, 'J'/'P' for the second.
pub const DUAL_RELAY: &[Command] = &[
    Command::new(b'I', 0, PinState::High),
    Command::new(b'J', 1, PinState::High),
    Command::new(b'O', 0, PinState::Low),
    Command::new(b'P', 1, PinState::Low),
];

/// Command loop error type
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppError<O, S> {
    /// An output pin failed
    Output(O),
    /// The serial link failed
    Serial(Error<S>),
}

/// Maps received bytes to output actions and echoes them
pub struct Application<'a, O, const N: usize>
where
    O: OutputPin,
{
    outputs: [O; N],
    commands: &'a [Command],
}

impl<'a, O, E, const N: usize> Application<'a, O, N>
where
    O: OutputPin<Error = E>,
{
    /// Create instance. All outputs start high.
    pub fn new(mut outputs: [O; N], commands: &'a [Command]) -> Result<Self, E> {
        for output in outputs.iter_mut() {
            output.set_high()?;
        }
        Ok(Application { outputs, commands })
    }

    /// The driven outputs, in table index order.
    pub fn outputs(&self) -> &[O; N] {
        &self.outputs
    }

    /// Release the outputs.
    pub fn free(self) -> [O; N] {
        self.outputs
    }

    /// Apply the command mapped to `byte`, if any.
    pub fn handle(&mut self, byte: u8) -> Result<Option<Command>, E> {
        let Some(command) = self.commands.iter().find(|c| c.byte == byte).copied() else {
            return Ok(None);
        };
        match self.outputs.get_mut(command.output) {
            Some(output) => {
                output.set_state(command.state)?;
                log::info!("{:#04x}: output {} {:?}", byte, command.output, command.state);
                Ok(Some(command))
            }
            None => {
                log::warn!("{:#04x}: no output {}", byte, command.output);
                Ok(None)
            }
        }
    }

    /// Handle one pending byte and echo it. Returns `false` if nothing was
    /// waiting.
    pub fn service<Clock, Rx, Tx, SE>(
        &mut self,
        serial: &SharedSerial<Clock, Rx, Tx>,
    ) -> Result<bool, AppError<E, SE>>
    where
        Clock: BitClock,
        Rx: InputPin<Error = SE> + EdgeInterrupt,
        Tx: OutputPin<Error = SE>,
    {
        let Some(byte) = serial.take_received() else {
            return Ok(false);
        };
        self.handle(byte).map_err(AppError::Output)?;
        serial.transmit(byte).map_err(AppError::Serial)?;
        Ok(true)
    }

    /// Service bytes forever, calling `idle` whenever none is pending.
    ///
    /// `idle` is the low-power wait. It must return after any interrupt, or
    /// a byte that arrives just before it is entered waits for the next one.
    pub fn run<Clock, Rx, Tx, SE>(
        &mut self,
        serial: &SharedSerial<Clock, Rx, Tx>,
        mut idle: impl FnMut(),
    ) -> Result<Infallible, AppError<E, SE>>
    where
        Clock: BitClock,
        Rx: InputPin<Error = SE> + EdgeInterrupt,
        Tx: OutputPin<Error = SE>,
    {
        loop {
            if !self.service(serial)? {
                idle();
            }
        }
    }
}
