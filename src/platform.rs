//! CPU sleep and watchdog collaborators for the dispatch loop.

/// Hooks the reactor needs from the execution environment.
pub trait Platform {
    /// Enter the lowest-latency sleep state.
    ///
    /// Called with the dispatch loop's critical section held, directly
    /// after observing an empty pending mask. Implementations must use an
    /// instruction that wakes on a pending interrupt even while interrupts
    /// are masked (WFI-class), so a notification raised just before the
    /// call is never slept through.
    fn sleep(&mut self);

    /// Arm the watchdog before the dispatch loop starts.
    fn watchdog_start(&mut self) {}

    /// Refreshed once per handler invocation. An unresponsive handler or a
    /// fully idle system beyond the watchdog period resets the device.
    fn watchdog_refresh(&mut self) {}
}

/// Cortex-M sleep via `wfi`. Watchdog hooks are left to the board support
/// layer, which knows the device's watchdog peripheral.
#[cfg(feature = "cortex-m")]
pub struct Wfi;

#[cfg(feature = "cortex-m")]
impl Platform for Wfi {
    fn sleep(&mut self) {
        cortex_m::asm::wfi();
    }
}
