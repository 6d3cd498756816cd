//! Cooperative interrupt-driven event dispatcher.
//!
//! Interrupt service routines only set bits in the notification registry;
//! all application logic runs in the main-context dispatch loop with
//! interrupts enabled. Among simultaneously pending notifications the
//! lowest bit position is serviced first, which is what gives
//! high-priority registrations their precedence.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::platform::Platform;

/// Number of handler slots. One bit of [`Mask`] per slot.
pub const CAPACITY: usize = 32;

/// Pending-notification bitmask.
pub type Mask = u32;

/// Callback invoked by the dispatch loop. The argument is the one passed
/// to the most recent [`Reactor::notify`] before dispatch.
pub type Handler = fn(usize);

/// Registration token for a callback, doubling as its bit position in the
/// notification mask. Unbound channels are `Option<Handle>`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handle(u8);

impl Handle {
    /// Single-bit mask of this handle.
    pub const fn mask(self) -> Mask {
        1 << self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// OR of the masks of several handles.
pub fn mask_of(handles: &[Handle]) -> Mask {
    handles.iter().fold(0, |m, h| m | h.mask())
}

/// Dispatch priority class. High-priority registrations claim the lowest
/// free slot, low-priority ones the highest, so the lowest-bit-first
/// dispatch rule favours high priority.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    Low,
    High,
}

struct Inner {
    handlers: [Option<Handler>; CAPACITY],
    args: [usize; CAPACITY],
    pending: Mask,
    locked: bool,
}

/// The notification registry and dispatch loop.
///
/// Designed to live in a `static`; interrupts and the main context share
/// it through short critical sections around every read-modify-write.
pub struct Reactor {
    inner: Mutex<RefCell<Inner>>,
}

impl Reactor {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                handlers: [None; CAPACITY],
                args: [0; CAPACITY],
                pending: 0,
                locked: false,
            })),
        }
    }

    /// Register a handler and return its [`Handle`].
    ///
    /// Registration is only legal before [`Reactor::run`]; both a late
    /// registration and slot exhaustion are build-time capacity mistakes
    /// and abort.
    pub fn register(&self, handler: Handler, priority: Priority) -> Handle {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            assert!(!inner.locked, "reactor: registration after run()");

            let slot = match priority {
                Priority::High => inner.handlers.iter().position(|h| h.is_none()),
                Priority::Low => inner.handlers.iter().rposition(|h| h.is_none()),
            }
            .expect("reactor: no free handler slot");

            inner.handlers[slot] = Some(handler);
            Handle(slot as u8)
        })
    }

    /// Mark a handler pending and store its argument. Safe from interrupt
    /// and main context; the most recent argument wins.
    pub fn notify(&self, handle: Handle, arg: usize) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.args[handle.index()] = arg;
            inner.pending |= handle.mask();
        });
    }

    /// Fast notification path for interrupt service routines: sets the
    /// pending bit only, the stored argument is left untouched.
    pub fn notify_from_isr(&self, handle: Handle) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).pending |= handle.mask();
        });
    }

    /// Bulk-clear pending bits. Used by the hardware timer restart path so
    /// stale notifications never fire after a restart.
    pub fn clear(&self, mask: Mask) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).pending &= !mask;
        });
    }

    /// Snapshot of the pending mask.
    pub fn pending(&self) -> Mask {
        critical_section::with(|cs| self.inner.borrow_ref(cs).pending)
    }

    /// Refuse further registrations. Called by [`Reactor::run`] on entry.
    pub fn lock_registrations(&self) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).locked = true;
        });
    }

    /// One iteration of the dispatch loop: pick the lowest pending bit,
    /// clear it, then call the handler with interrupts enabled so new
    /// notifications are not blocked during its execution.
    ///
    /// Returns `false` when nothing was pending.
    pub fn dispatch_one(&self) -> bool {
        let next = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.pending == 0 {
                return None;
            }

            let pos = inner.pending.trailing_zeros() as usize;
            // Flip the flag before calling so the handler may re-arm itself.
            inner.pending &= !(1 << pos);
            inner.handlers[pos].map(|handler| (handler, inner.args[pos]))
        });

        match next {
            Some((handler, arg)) => {
                handler(arg);
                true
            }
            None => false,
        }
    }

    /// The dispatch loop. Never returns.
    ///
    /// Locks registrations, starts the watchdog and then alternates
    /// between dispatching pending notifications (refreshing the watchdog
    /// once per handler invocation) and sleeping. The idle check and the
    /// sleep happen inside one critical section: with interrupts masked a
    /// WFI-class instruction still wakes on a pending interrupt, and the
    /// ISR runs as soon as the section is left, so a notification raised
    /// between the check and the sleep cannot be lost.
    pub fn run(&self, platform: &mut impl Platform) -> ! {
        self.lock_registrations();
        platform.watchdog_start();

        loop {
            if self.dispatch_one() {
                // Keep the system alive for as long as handlers are being
                // called. A silently hung main loop resets the device.
                platform.watchdog_refresh();
            } else {
                critical_section::with(|cs| {
                    if self.inner.borrow_ref(cs).pending == 0 {
                        platform.sleep();
                    }
                });
            }
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}
