//! Free-running hardware counter driver.
//!
//! The prescaler and period are derived at build time from a requested
//! duration and the counter's bit width; the concrete peripheral is a
//! [`CounterDevice`] collaborator so the driver runs against a simulated
//! counter on the host.

use crate::reactor::{Handle, Mask, Reactor};

/// Prescaler table, ascending. The smallest prescaler that makes the
/// requested duration fit the counter is selected.
pub const PRESCALERS: [u32; 8] = [1, 2, 4, 8, 16, 64, 256, 1024];

/// Independent compare channels per counter.
pub const COMPARE_CHANNELS: usize = 3;

/// Bit width of the counter register.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterWidth {
    Bits8,
    Bits16,
}

impl CounterWidth {
    pub const fn max_count(self) -> u32 {
        match self {
            CounterWidth::Bits8 => u8::MAX as u32,
            CounterWidth::Bits16 => u16::MAX as u32,
        }
    }
}

/// Resolved counter configuration: prescaler, its index in the hardware
/// clock-select field, and the period in prescaled counts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerConfig {
    pub prescaler: u32,
    pub clock_select: u8,
    pub period: u32,
}

impl TimerConfig {
    /// Select the smallest prescaler such that
    /// `ticks / prescaler <= counter max`.
    ///
    /// A duration that fits no prescaler is a build-time configuration
    /// error and panics; there is deliberately no silent fallback to the
    /// largest prescaler, which could not satisfy the duration anyway.
    pub const fn from_ticks(ticks: u64, width: CounterWidth) -> Self {
        let max = width.max_count() as u64;

        let mut i = 0;
        while i < PRESCALERS.len() {
            let prescaler = PRESCALERS[i] as u64;
            if ticks / prescaler <= max {
                return Self {
                    prescaler: PRESCALERS[i],
                    clock_select: i as u8,
                    period: (ticks / prescaler) as u32,
                };
            }
            i += 1;
        }

        panic!("hw_timer: duration exceeds the counter range at the largest prescaler");
    }

    /// Same, from a duration and the counter input clock.
    pub const fn from_duration(
        clk_hz: u32,
        duration: fugit::MicrosDurationU32,
        width: CounterWidth,
    ) -> Self {
        Self::from_ticks(duration_to_ticks(clk_hz, duration), width)
    }

    /// Prescaled compare count for a raw tick count.
    pub const fn count_for(&self, ticks: u64) -> u32 {
        (ticks / self.prescaler as u64) as u32
    }
}

/// Raw counter ticks for a duration at the given input clock.
pub const fn duration_to_ticks(clk_hz: u32, duration: fugit::MicrosDurationU32) -> u64 {
    duration.ticks() as u64 * clk_hz as u64 / 1_000_000
}

/// The concrete counter peripheral.
pub trait CounterDevice {
    /// Apply prescaler and period; leave the counter disabled.
    fn configure(&mut self, config: &TimerConfig);
    fn enable(&mut self);
    fn disable(&mut self);
    /// Clear all pending compare/overflow hardware flags.
    fn clear_interrupt_flags(&mut self);
    fn reset_count(&mut self);
    fn set_compare(&mut self, channel: usize, count: u32);
}

/// A counter with up to three compare channels and one overflow channel,
/// each bound to a reactor handle.
pub struct HwTimer<D: CounterDevice> {
    device: D,
    config: TimerConfig,
    reactor: &'static Reactor,
    compare: [Option<Handle>; COMPARE_CHANNELS],
    overflow: Option<Handle>,
    clear_mask: Mask,
    single_use: bool,
}

impl<D: CounterDevice> HwTimer<D> {
    /// Configure the counter. `single_use` disables it from its own
    /// overflow interrupt, for one-shot timeouts.
    pub fn new(mut device: D, config: TimerConfig, reactor: &'static Reactor, single_use: bool) -> Self {
        device.configure(&config);
        Self {
            device,
            config,
            reactor,
            compare: [None; COMPARE_CHANNELS],
            overflow: None,
            clear_mask: 0,
            single_use,
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Bind compare channels 0.. to the given handles, in order.
    pub fn react_on_compare(&mut self, handles: &[Handle]) {
        assert!(
            handles.len() <= COMPARE_CHANNELS,
            "hw_timer: too many compare handles"
        );
        for (channel, &handle) in handles.iter().enumerate() {
            self.compare[channel] = Some(handle);
            self.clear_mask |= handle.mask();
        }
    }

    pub fn react_on_overflow(&mut self, handle: Handle) {
        self.overflow = Some(handle);
        self.clear_mask |= handle.mask();
    }

    /// Set a compare channel from a raw tick count (prescaled internally).
    pub fn set_compare_ticks(&mut self, channel: usize, ticks: u64) {
        let count = self.config.count_for(ticks);
        self.device.set_compare(channel, count);
    }

    /// (Re)start the counter from zero.
    ///
    /// The sequencing is mandatory: stop the counter first so no interrupt
    /// fires past that point, then drop pending hardware flags and the
    /// reactor bits of every bound handle, and only then reset and
    /// re-enable. Stale notifications can therefore never fire after a
    /// restart.
    pub fn start(&mut self) {
        self.device.disable();
        self.device.clear_interrupt_flags();
        self.reactor.clear(self.clear_mask);
        self.device.reset_count();
        self.device.enable();
    }

    pub fn stop(&mut self) {
        self.device.disable();
    }

    /// Compare-match interrupt entry point.
    pub fn on_compare_isr(&mut self, channel: usize) {
        if let Some(handle) = self.compare[channel] {
            self.reactor.notify_from_isr(handle);
        }
    }

    /// Overflow interrupt entry point.
    pub fn on_overflow_isr(&mut self) {
        if self.single_use {
            self.device.disable();
        }
        if let Some(handle) = self.overflow {
            self.reactor.notify_from_isr(handle);
        }
    }
}

impl<D: CounterDevice> crate::modbus::FrameTimer for HwTimer<D> {
    fn restart(&mut self) {
        self.start();
    }
}
