//! Cooperative timers fired from the map's pump.
//!
//! Everything runs on the task that owns the map, so a timer callback is
//! just a method call on the layer when [`Scheduler::due`] reports it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::host::LayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Timer {
    id: TimerId,
    layer: LayerId,
    period: Duration,
    next_due: Instant,
    armed: Arc<AtomicBool>,
}

/// Owner-side token of a repeating timer.
///
/// Dropping the handle disarms the timer; the scheduler forgets it on
/// the next pump.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    armed: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Disarm explicitly. Same as dropping.
    pub fn cancel(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.armed.store(false, Ordering::Release);
    }
}

/// Repeating timers keyed by layer.
#[derive(Debug)]
pub struct Scheduler {
    timers: Vec<Timer>,
    next_id: u64,
    now: Instant,
}

impl Scheduler {
    pub fn new(now: Instant) -> Self {
        Self {
            timers: Vec::new(),
            next_id: 0,
            now,
        }
    }

    /// Time of the last pump.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Fire for `layer` every `period`, first at `now + period`.
    pub fn schedule_repeating(&mut self, layer: LayerId, period: Duration) -> TimerHandle {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let armed = Arc::new(AtomicBool::new(true));
        self.timers.push(Timer {
            id,
            layer,
            period: period.max(Duration::from_millis(1)),
            next_due: self.now + period,
            armed: armed.clone(),
        });

        TimerHandle { id, armed }
    }

    /// Disarm every timer belonging to `layer`.
    pub fn cancel_layer(&mut self, layer: LayerId) {
        for timer in self.timers.iter().filter(|t| t.layer == layer) {
            timer.armed.store(false, Ordering::Release);
        }
        self.timers.retain(|t| t.layer != layer);
    }

    /// Advance the clock and collect the layers whose timers are due.
    ///
    /// A timer that fell behind fires once and is rescheduled from `now`.
    pub fn due(&mut self, now: Instant) -> Vec<(LayerId, TimerId)> {
        if now > self.now {
            self.now = now;
        }
        self.timers.retain(|t| t.armed.load(Ordering::Acquire));

        let mut fired = Vec::new();
        for timer in &mut self.timers {
            if timer.next_due <= self.now {
                fired.push((timer.layer, timer.id));
                timer.next_due = self.now + timer.period;
            }
        }
        fired
    }

    /// Whether the timer is still registered and armed.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers
            .iter()
            .any(|t| t.id == id && t.armed.load(Ordering::Acquire))
    }

    pub fn active_count(&self) -> usize {
        self.timers
            .iter()
            .filter(|t| t.armed.load(Ordering::Acquire))
            .count()
    }
}
