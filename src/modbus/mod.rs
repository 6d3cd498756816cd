//! Modbus RTU slave protocol engine.
//!
//! Wire format: `[address:1][function:1][data:N][CRC16-LE:2]`, framed by
//! inter-character/inter-frame silence. [`crc`] validates the stream,
//! [`datagram`] parses one frame and synthesizes the reply, [`slave`]
//! coordinates the timing state machine on top of the reactor.

pub mod crc;
pub mod datagram;
pub mod slave;

pub use crc::Crc;
pub use datagram::{
    Bounds, Callbacks, Datagram, DatagramConfig, Exception, Function, Reply, Status,
    FRAME_CAPACITY,
};
pub use slave::{
    char_time, t15, t35, t40, transition, Effect, Effects, Event, FrameTimer, SerialPort, Slave,
    State, Stats, BITS_PER_CHAR,
};
