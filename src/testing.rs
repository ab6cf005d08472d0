//! Test doubles: pin waveforms, a bare compare timer and a simulated line.

use core::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use embedded_hal_mock::eh1::digital::{
    Mock as PinMock, State as PinState, Transaction as PinTransaction,
};

use crate::frame::{RxFrame, TxFrame};
use crate::hal::{BitClock, EdgeInterrupt};
use crate::serial::{Event, Transceiver};
use crate::shared::SharedSerial;
use crate::timing::LineTiming;

pub fn waveform(string: &str) -> Vec<PinState> {
    let mut states = Vec::new();
    let mut last = None;
    for step in string.chars() {
        let state = match step {
            '0' => PinState::Low,
            '1' => PinState::High,
            '.' => last.expect("'.' repeats the previous level"),
            _ => panic!("Invalid binary literal"),
        };
        states.push(state);
        last = Some(state);
    }
    states
}

pub fn input_waveform(string: &str) -> Vec<PinTransaction> {
    waveform(string)
        .into_iter()
        .map(PinTransaction::get)
        .collect()
}

pub fn output_waveform(string: &str) -> Vec<PinTransaction> {
    waveform(string)
        .into_iter()
        .map(PinTransaction::set)
        .collect()
}

/// Mock receive pin that also records edge arming.
pub struct MockRx {
    pub pin: PinMock,
    pub armed: bool,
}

impl MockRx {
    pub fn new(transactions: &[PinTransaction]) -> Self {
        MockRx {
            pin: PinMock::new(transactions),
            armed: false,
        }
    }
}

impl ErrorType for MockRx {
    type Error = <PinMock as ErrorType>::Error;
}

impl InputPin for MockRx {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_low()
    }
}

impl EdgeInterrupt for MockRx {
    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

/// Compare timer frozen at a fixed count, recording every compare target.
#[derive(Debug, Default)]
pub struct TestClock {
    pub now: u16,
    pub running: bool,
    pub listening: bool,
    pub targets: Vec<u16>,
}

impl TestClock {
    pub fn at(now: u16) -> Self {
        TestClock {
            now,
            ..Default::default()
        }
    }
}

impl BitClock for TestClock {
    fn now(&mut self) -> u16 {
        self.now
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn set_compare(&mut self, tick: u16) {
        self.targets.push(tick);
    }

    fn listen(&mut self) {
        self.listening = true;
    }

    fn unlisten(&mut self) {
        self.listening = false;
    }
}

fn level_at(line: &[(u32, bool)], at: u32) -> bool {
    line.iter()
        .rev()
        .find(|(t, _)| *t <= at)
        .map_or(true, |(_, level)| *level)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Edge,
    Compare,
}

/// Simulated hardware: one timer, the line from the remote sender into RX,
/// and the line driven by TX. Time is counted in bit clock ticks.
#[derive(Debug)]
pub struct World {
    pub time: u32,
    bit: u32,
    running: bool,
    compare: u16,
    listening: bool,
    pub armed: bool,
    edge_floor: u32,
    rx_line: Vec<(u32, bool)>,
    tx_line: Vec<(u32, bool)>,
    pub targets: Vec<(u32, u16)>,
}

impl World {
    fn new(timing: LineTiming) -> Self {
        World {
            time: 0,
            bit: timing.bit_ticks() as u32,
            running: false,
            compare: 0,
            listening: false,
            armed: false,
            edge_floor: 0,
            rx_line: Vec::new(),
            tx_line: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Remote sender puts a valid frame for `byte` on the line at `at`.
    pub fn send(&mut self, at: u32, byte: u8) {
        let mut frame = TxFrame::new(byte);
        let mut levels = Vec::new();
        while let Some(level) = frame.next_level() {
            levels.push(level);
        }
        self.send_levels(at, &levels);
    }

    /// Remote sender drives `levels`, one per bit period, then returns to mark.
    pub fn send_levels(&mut self, at: u32, levels: &[bool]) {
        for (i, level) in levels.iter().enumerate() {
            self.rx_line.push((at + i as u32 * self.bit, *level));
        }
        self.rx_line.push((at + levels.len() as u32 * self.bit, true));
        self.rx_line.sort_by_key(|(t, _)| *t);
    }

    fn next_falling_edge(&self, from: u32) -> Option<u32> {
        let mut prev = true;
        for &(at, level) in &self.rx_line {
            if prev && !level && at >= from {
                return Some(at);
            }
            prev = level;
        }
        None
    }

    /// Move time to the next interrupt, if it happens no later than `until`.
    pub fn advance(&mut self, until: u32) -> Option<(u32, Next)> {
        let compare = if self.running && self.listening {
            let delta = self.compare.wrapping_sub(self.time as u16);
            Some(self.time + if delta == 0 { 0x1_0000 } else { delta as u32 })
        } else {
            None
        };
        let edge = if self.armed {
            self.next_falling_edge(self.edge_floor.max(self.time))
        } else {
            None
        };
        let (at, next) = match (compare, edge) {
            (Some(c), Some(e)) if e < c => (e, Next::Edge),
            (Some(c), _) => (c, Next::Compare),
            (None, Some(e)) => (e, Next::Edge),
            (None, None) => return None,
        };
        if at > until {
            return None;
        }
        self.time = at;
        if next == Next::Edge {
            self.edge_floor = at + 1;
        }
        Some((at, next))
    }

    /// Bytes decoded from the TX line by an ideal receiver.
    pub fn transmitted(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut prev = true;
        let mut from = 0;
        for &(at, level) in &self.tx_line {
            if prev && !level && at >= from {
                let centre = at + self.bit / 2;
                let mut frame = RxFrame::new();
                for i in 0..9 {
                    frame.sample(level_at(&self.tx_line, centre + i * self.bit));
                }
                if let Some(byte) = frame.finish(level_at(&self.tx_line, centre + 9 * self.bit)) {
                    bytes.push(byte);
                }
                from = at + 10 * self.bit;
            }
            prev = level;
        }
        bytes
    }

    /// Time TX first left mark.
    pub fn first_tx_low(&self) -> Option<u32> {
        self.tx_line.iter().find(|(_, level)| !level).map(|(t, _)| *t)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }
}

pub struct SimClock(Arc<Mutex<World>>);
pub struct SimRx(Arc<Mutex<World>>);
pub struct SimTx(Arc<Mutex<World>>);

pub type SimTransceiver = Transceiver<SimClock, SimRx, SimTx>;
pub type SimSerial = SharedSerial<SimClock, SimRx, SimTx>;

impl BitClock for SimClock {
    fn now(&mut self) -> u16 {
        self.0.lock().unwrap().time as u16
    }

    fn start(&mut self) {
        self.0.lock().unwrap().running = true;
    }

    fn stop(&mut self) {
        self.0.lock().unwrap().running = false;
    }

    fn set_compare(&mut self, tick: u16) {
        let mut world = self.0.lock().unwrap();
        world.compare = tick;
        let now = world.time;
        world.targets.push((now, tick));
    }

    fn listen(&mut self) {
        self.0.lock().unwrap().listening = true;
    }

    fn unlisten(&mut self) {
        self.0.lock().unwrap().listening = false;
    }
}

impl ErrorType for SimRx {
    type Error = Infallible;
}

impl InputPin for SimRx {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let world = self.0.lock().unwrap();
        Ok(level_at(&world.rx_line, world.time))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl EdgeInterrupt for SimRx {
    fn arm(&mut self) {
        let mut world = self.0.lock().unwrap();
        world.armed = true;
        world.edge_floor = world.time;
    }

    fn disarm(&mut self) {
        self.0.lock().unwrap().armed = false;
    }
}

impl ErrorType for SimTx {
    type Error = Infallible;
}

impl OutputPin for SimTx {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut world = self.0.lock().unwrap();
        let now = world.time;
        world.tx_line.push((now, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut world = self.0.lock().unwrap();
        let now = world.time;
        world.tx_line.push((now, true));
        Ok(())
    }
}

/// Output that remembers the last level written.
#[derive(Debug, Default)]
pub struct Relay {
    pub state: Option<embedded_hal::digital::PinState>,
}

impl ErrorType for Relay {
    type Error = Infallible;
}

impl OutputPin for Relay {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.state = Some(embedded_hal::digital::PinState::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.state = Some(embedded_hal::digital::PinState::High);
        Ok(())
    }
}

/// Something that takes the two interrupts.
pub trait Target {
    fn edge(&mut self);
    fn compare(&mut self) -> Option<Event>;
}

impl Target for SimTransceiver {
    fn edge(&mut self) {
        self.on_edge();
    }

    fn compare(&mut self) -> Option<Event> {
        self.on_compare().unwrap()
    }
}

impl Target for &SimSerial {
    fn edge(&mut self) {
        self.on_edge();
    }

    fn compare(&mut self) -> Option<Event> {
        self.on_compare().unwrap()
    }
}

#[derive(Clone)]
pub struct Sim(Arc<Mutex<World>>);

impl Sim {
    pub fn new() -> Self {
        Sim(Arc::new(Mutex::new(World::new(LineTiming::REFERENCE))))
    }

    pub fn world(&self) -> MutexGuard<'_, World> {
        self.0.lock().unwrap()
    }

    pub fn transceiver(&self, timing: LineTiming) -> SimTransceiver {
        Transceiver::new(
            SimClock(self.0.clone()),
            SimRx(self.0.clone()),
            SimTx(self.0.clone()),
            timing,
        )
        .unwrap()
    }

    /// Deliver the next interrupt due no later than `until`.
    pub fn step<T: Target>(&self, target: &mut T, until: u32) -> Option<(u32, Option<Event>)> {
        let (at, next) = self.world().advance(until)?;
        let event = match next {
            Next::Edge => {
                target.edge();
                None
            }
            Next::Compare => target.compare(),
        };
        Some((at, event))
    }

    /// Deliver every interrupt due no later than `until`.
    pub fn run<T: Target>(&self, target: &mut T, until: u32) -> Vec<(u32, Event)> {
        let mut events = Vec::new();
        while let Some((at, event)) = self.step(target, until) {
            if let Some(event) = event {
                events.push((at, event));
            }
        }
        events
    }
}

/// Thread standing in for the interrupt controller while the test thread
/// makes blocking calls.
pub struct IsrThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Vec<(u32, Event)>>,
}

impl IsrThread {
    pub fn stop(self) -> Vec<(u32, Event)> {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.join().unwrap()
    }
}

pub fn spawn_isr(serial: Arc<SimSerial>, sim: Sim) -> IsrThread {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let handle = thread::spawn(move || {
        let mut events = Vec::new();
        let mut target = &*serial;
        while !flag.load(Ordering::SeqCst) {
            match sim.step(&mut target, u32::MAX) {
                Some((at, Some(event))) => events.push((at, event)),
                Some((_, None)) => {}
                None => thread::yield_now(),
            }
        }
        events
    });
    IsrThread { stop, handle }
}

#[test]
fn test_states() {
    let res = waveform("1..");
    assert_eq!(res, vec![PinState::High, PinState::High, PinState::High]);

    let res = waveform("0.1");
    assert_eq!(res, vec![PinState::Low, PinState::Low, PinState::High]);
}

#[test]
fn ideal_receiver_reads_sent_frames() {
    let sim = Sim::new();
    let mut serial = sim.transceiver(LineTiming::REFERENCE);
    serial.begin_transmit(b'!').unwrap();
    let events = sim.run(&mut serial, 10_000);
    assert_eq!(events, vec![(11 * 104, Event::Sent)]);
    assert_eq!(sim.world().transmitted(), vec![b'!']);
}
