#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod hw_timer;
pub mod modbus;
pub mod platform;
pub mod reactor;
pub mod timer;

pub use platform::Platform;
pub use reactor::{Handle, Mask, Priority, Reactor};
pub use timer::TimerService;
