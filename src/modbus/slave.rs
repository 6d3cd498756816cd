//! Modbus RTU slave protocol coordinator.
//!
//! The transition function is pure — `(state, event, frame status)` in,
//! `(state, effects)` out — so the whole table is unit-testable; the
//! [`Slave`] driver applies the effects to the injected datagram, frame
//! timer and serial port.

use heapless::Vec;

use super::datagram::{Callbacks, Datagram, Status};

/// Protocol state. No terminal state: the machine cycles back to
/// `Initial` after every exchange.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Cold,
    Initial,
    Idle,
    Reception,
    ControlAndWaiting,
    Reply,
    Emission,
}

/// Timer and transport events feeding the machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    CanStartReceiving,
    CharReceived(u8),
    /// 1.5 character times of silence: the frame's byte stream ended.
    T15Timeout,
    /// 3.5 character times of silence: the frame is complete.
    T35Timeout,
    /// Guard before transmitting, so a master that starts a new frame
    /// right after the silence window is not collided with.
    T40Timeout,
    DemandOfEmission,
    FrameSent,
}

/// Side effects requested by a transition, applied in order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    /// Restart the T1.5/T3.5/T4.0 silence timers.
    RestartTimer,
    /// Discard any partial frame.
    ResetFrame,
    /// Feed the byte to the datagram parser.
    FeedChar(u8),
    /// Build the reply in the frame buffer.
    ReadyReply,
    /// Hand the frame buffer to the serial port.
    Transmit,
}

pub type Effects = Vec<Effect, 2>;

/// The transition table. `status` is only consulted for the
/// `ControlAndWaiting` + T3.5 decision; events not listed for a state are
/// ignored in place.
pub fn transition(state: State, event: Event, status: Status) -> (State, Effects) {
    let mut effects = Effects::new();
    let mut emit = |effect| {
        let _ = effects.push(effect);
    };

    let next = match (state, event) {
        (State::Cold, Event::CanStartReceiving) => {
            emit(Effect::RestartTimer);
            State::Initial
        }
        (State::Initial, Event::T35Timeout) => {
            emit(Effect::ResetFrame);
            State::Idle
        }
        (State::Initial, Event::CharReceived(_)) => {
            emit(Effect::RestartTimer);
            State::Initial
        }
        (State::Idle, Event::CharReceived(c)) => {
            emit(Effect::RestartTimer);
            emit(Effect::FeedChar(c));
            State::Reception
        }
        (State::Idle, Event::DemandOfEmission) => {
            emit(Effect::Transmit);
            State::Emission
        }
        (State::Reception, Event::T15Timeout) => State::ControlAndWaiting,
        (State::Reception, Event::CharReceived(c)) => {
            emit(Effect::RestartTimer);
            emit(Effect::FeedChar(c));
            State::Reception
        }
        (State::ControlAndWaiting, Event::T35Timeout) if status == Status::GoodFrame => {
            emit(Effect::ReadyReply);
            State::Reply
        }
        (State::ControlAndWaiting, Event::T35Timeout) => {
            emit(Effect::ResetFrame);
            State::Idle
        }
        (State::ControlAndWaiting, Event::CharReceived(_)) => {
            emit(Effect::RestartTimer);
            State::Initial
        }
        // Unlikely, but a master could start talking during the guard.
        (State::Reply, Event::CharReceived(_)) => {
            emit(Effect::RestartTimer);
            State::Initial
        }
        (State::Reply, Event::T40Timeout) => {
            emit(Effect::Transmit);
            State::Emission
        }
        (State::Emission, Event::FrameSent) => {
            emit(Effect::RestartTimer);
            State::Initial
        }
        (state, _) => state,
    };

    (next, effects)
}

/// Restarts the hardware timer realizing the T1.5/T3.5/T4.0 thresholds.
pub trait FrameTimer {
    fn restart(&mut self);
}

/// Outgoing byte stream; completion arrives back as [`Event::FrameSent`].
pub trait SerialPort {
    fn send(&mut self, frame: &[u8]);
}

/// Frame classification counters.
#[derive(Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    pub good_frames: u32,
    pub bad_crc: u32,
    pub not_for_me: u32,
}

/// The protocol driver: owns the datagram, consumes character and timer
/// events and applies the transition table's effects to the injected
/// collaborators.
pub struct Slave<C: Callbacks, T: FrameTimer, U: SerialPort> {
    datagram: Datagram<C>,
    timer: T,
    uart: U,
    state: State,
    stats: Stats,
}

impl<C: Callbacks, T: FrameTimer, U: SerialPort> Slave<C, T, U> {
    pub fn new(datagram: Datagram<C>, timer: T, uart: U) -> Self {
        Self {
            datagram,
            timer,
            uart,
            state: State::Cold,
            stats: Stats::default(),
        }
    }

    /// Leave the cold state once the transport is listening.
    pub fn start(&mut self) {
        self.process(Event::CanStartReceiving);
    }

    pub fn on_char(&mut self, c: u8) {
        self.process(Event::CharReceived(c));
    }

    pub fn on_t15(&mut self) {
        self.process(Event::T15Timeout);
    }

    pub fn on_t35(&mut self) {
        self.process(Event::T35Timeout);
    }

    pub fn on_t40(&mut self) {
        self.process(Event::T40Timeout);
    }

    pub fn on_frame_sent(&mut self) {
        self.process(Event::FrameSent);
    }

    /// Application-initiated transmission of the frame buffer contents.
    pub fn demand_emission(&mut self) {
        self.process(Event::DemandOfEmission);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn datagram(&mut self) -> &mut Datagram<C> {
        &mut self.datagram
    }

    pub fn process(&mut self, event: Event) {
        let status = self.classify(event);
        let (next, effects) = transition(self.state, event, status);

        if next != self.state {
            trace!("modbus: {} -> {}", self.state as u8, next as u8);
        }
        self.state = next;

        for effect in effects {
            match effect {
                Effect::RestartTimer => self.timer.restart(),
                Effect::ResetFrame => self.datagram.reset(),
                Effect::FeedChar(c) => self.datagram.process_char(c),
                Effect::ReadyReply => self.datagram.ready_reply(),
                Effect::Transmit => self.uart.send(self.datagram.get_buffer()),
            }
        }
    }

    /// Evaluate the reply guard. Only the `ControlAndWaiting` + T3.5
    /// decision looks at the result.
    fn classify(&mut self, event: Event) -> Status {
        if self.state != State::ControlAndWaiting || event != Event::T35Timeout {
            return Status::NotForMe;
        }

        let status = self.datagram.get_status();
        match status {
            Status::GoodFrame => {
                debug!("modbus: good frame received");
                self.stats.good_frames += 1;
            }
            Status::BadCrc => {
                warn!("modbus: bad CRC");
                self.stats.bad_crc += 1;
            }
            Status::NotForMe => {
                trace!("modbus: frame is not for me");
                self.stats.not_for_me += 1;
            }
        }
        status
    }
}

/// Bits per character on the wire: start + 8 data + parity + stop.
pub const BITS_PER_CHAR: u32 = 11;

/// Duration of one character at the given baud rate.
pub const fn char_time(baud: u32) -> fugit::MicrosDurationU32 {
    fugit::MicrosDurationU32::from_ticks(BITS_PER_CHAR * 1_000_000 / baud)
}

const fn at_least(us: u32, floor_us: u32) -> fugit::MicrosDurationU32 {
    fugit::MicrosDurationU32::from_ticks(if us > floor_us { us } else { floor_us })
}

/// End-of-byte-stream threshold: 1.5 character times, at least 750µs.
pub const fn t15(baud: u32) -> fugit::MicrosDurationU32 {
    at_least(char_time(baud).ticks() * 3 / 2, 750)
}

/// Inter-frame silence: 3.5 character times, at least 1750µs.
pub const fn t35(baud: u32) -> fugit::MicrosDurationU32 {
    at_least(char_time(baud).ticks() * 7 / 2, 1_750)
}

/// Pre-transmission guard: 4 character times, at least 2ms.
pub const fn t40(baud: u32) -> fugit::MicrosDurationU32 {
    at_least(char_time(baud).ticks() * 4, 2_000)
}
