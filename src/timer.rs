//! Millisecond timer service: maps a monotonic tick to reactor
//! notifications, scheduled once or periodically.
//!
//! The steady clock itself is a collaborator: some 1ms tick source calls
//! [`TimerService::tick`] with the current instant, and due instances are
//! turned into reactor notifications right there. Instants wrap at the
//! word width; deadline comparisons are wrap-safe.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::reactor::{Handle, Reactor};

/// One tick of the steady clock is one millisecond.
pub type Instant = fugit::TimerInstantU32<1_000>;
pub type Duration = fugit::TimerDurationU32<1_000>;

/// Token for one armed instance, used to cancel it. Carries a generation
/// counter so a stale token never cancels a re-used slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instance {
    index: u8,
    generation: u8,
}

#[derive(Clone, Copy)]
struct Armed {
    handle: Handle,
    deadline: Instant,
    period: Option<Duration>,
    arg: Option<usize>,
}

struct Inner<const N: usize> {
    slots: [Option<Armed>; N],
    generations: [u8; N],
    now: Instant,
}

/// Fixed pool of delayed/periodic notifications bound to one reactor.
pub struct TimerService<const N: usize = 8> {
    reactor: &'static Reactor,
    inner: Mutex<RefCell<Inner<N>>>,
}

impl<const N: usize> TimerService<N> {
    pub const fn new(reactor: &'static Reactor) -> Self {
        Self {
            reactor,
            inner: Mutex::new(RefCell::new(Inner {
                slots: [None; N],
                generations: [0; N],
                now: Instant::from_ticks(0),
            })),
        }
    }

    /// Last instant observed through [`TimerService::tick`].
    pub fn now(&self) -> Instant {
        critical_section::with(|cs| self.inner.borrow_ref(cs).now)
    }

    /// Notify `handle` once, `after` from now.
    pub fn delay(&self, handle: Handle, after: Duration) -> Instance {
        let deadline = self.now() + after;
        self.arm(handle, deadline, None, None)
    }

    /// Notify `handle` once with an argument, `after` from now.
    pub fn delay_with(&self, handle: Handle, after: Duration, arg: usize) -> Instance {
        let deadline = self.now() + after;
        self.arm(handle, deadline, None, Some(arg))
    }

    /// Notify `handle` every `period`, first after one full period.
    pub fn repeat(&self, handle: Handle, period: Duration) -> Instance {
        let deadline = self.now() + period;
        self.arm(handle, deadline, Some(period), None)
    }

    /// Notify `handle` every `period`, first after `after`.
    pub fn repeat_after(&self, handle: Handle, after: Duration, period: Duration) -> Instance {
        let deadline = self.now() + after;
        self.arm(handle, deadline, Some(period), None)
    }

    /// Disarm a pending instance. Returns whether it was still pending;
    /// cancelling an already-fired or stale instance is a no-op.
    pub fn cancel(&self, instance: Instance) -> bool {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let idx = instance.index as usize;

            if inner.generations[idx] == instance.generation && inner.slots[idx].is_some() {
                inner.slots[idx] = None;
                true
            } else {
                false
            }
        })
    }

    /// Advance the clock and fire all due instances. Driven by the 1ms
    /// tick collaborator; safe from interrupt or main context.
    pub fn tick(&self, now: Instant) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.now = now;

            for i in 0..N {
                let armed = match inner.slots[i] {
                    Some(armed) if now.checked_duration_since(armed.deadline).is_some() => armed,
                    _ => continue,
                };

                match armed.arg {
                    Some(arg) => self.reactor.notify(armed.handle, arg),
                    None => self.reactor.notify_from_isr(armed.handle),
                }

                inner.slots[i] = armed.period.map(|period| Armed {
                    deadline: armed.deadline + period,
                    ..armed
                });
            }
        });
    }

    fn arm(
        &self,
        handle: Handle,
        deadline: Instant,
        period: Option<Duration>,
        arg: Option<usize>,
    ) -> Instance {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);

            let index = inner
                .slots
                .iter()
                .position(Option::is_none)
                .expect("timer: no free instance slot");

            inner.generations[index] = inner.generations[index].wrapping_add(1);
            inner.slots[index] = Some(Armed {
                handle,
                deadline,
                period,
                arg,
            });

            Instance {
                index: index as u8,
                generation: inner.generations[index],
            }
        })
    }
}
