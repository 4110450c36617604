//! Local timers
//!
//! Timer ticking never round-trips through the bridge: a binary-heap
//! scheduler holds host-independent timeouts which the runtime pump fires
//! when their deadlines pass. Host calls happen only for user-visible
//! effects of a tick (sound playback, display updates).

pub mod display;

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::events::Listeners;

/// Tick interval for countdown timers.
pub const TICK_INTERVAL: Duration = Duration::from_millis(40);

/// Identity of a scheduled timeout, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutId(u64);

struct Scheduled {
    deadline: Instant,
    id: TimeoutId,
    callback: Box<dyn FnOnce(Instant) + Send>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Min-heap: earliest deadline first, insertion order as tiebreak.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

struct SchedulerState {
    queue: BinaryHeap<Scheduled>,
    cancelled: HashSet<TimeoutId>,
    next_id: u64,
}

/// Timeout queue driven by the runtime pump.
///
/// Callbacks receive the logical `now` the pump fired them with, so elapsed
/// times stay consistent within one pump iteration.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                queue: BinaryHeap::new(),
                cancelled: HashSet::new(),
                next_id: 0,
            }),
        }
    }

    /// Schedule a callback for an absolute deadline.
    pub fn schedule_at(
        &self,
        deadline: Instant,
        callback: impl FnOnce(Instant) + Send + 'static,
    ) -> TimeoutId {
        let mut state = self.state.lock();
        let id = TimeoutId(state.next_id);
        state.next_id += 1;
        state.queue.push(Scheduled {
            deadline,
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Schedule a callback `delay` from now.
    pub fn schedule_in(
        &self,
        delay: Duration,
        callback: impl FnOnce(Instant) + Send + 'static,
    ) -> TimeoutId {
        self.schedule_at(Instant::now() + delay, callback)
    }

    /// Cancel a pending timeout. Already-fired or unknown ids are a no-op.
    pub fn cancel(&self, id: TimeoutId) {
        self.state.lock().cancelled.insert(id);
    }

    /// Deadline of the next live timeout, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut state = self.state.lock();
        while let Some(head) = state.queue.peek() {
            if state.cancelled.contains(&head.id) {
                let head_id = head.id;
                state.queue.pop();
                state.cancelled.remove(&head_id);
                continue;
            }
            return Some(head.deadline);
        }
        None
    }

    /// Fire every timeout due at `now`, outside the queue lock. Returns the
    /// number of callbacks run.
    pub fn run_due(&self, now: Instant) -> usize {
        let mut fired = 0;
        loop {
            let entry = {
                let mut state = self.state.lock();
                let due = matches!(state.queue.peek(), Some(head) if head.deadline <= now);
                if !due {
                    break;
                }
                match state.queue.pop() {
                    Some(entry) if !state.cancelled.remove(&entry.id) => entry,
                    _ => continue,
                }
            };
            (entry.callback)(now);
            fired += 1;
        }
        fired
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for timer events (`tick`, `beforeComplete`, `complete`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerEvent {
    pub elapsed: Duration,
    pub duration: Duration,
}

/// Action invoked when a timer completes.
pub type CompleteAction = Box<dyn FnOnce() + Send>;

/// Construction options for [`Timer`].
pub struct TimerOptions {
    pub duration: Duration,
    pub autostart: bool,
    pub complete: Option<CompleteAction>,
}

impl TimerOptions {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            autostart: true,
            complete: None,
        }
    }

    pub fn manual_start(mut self) -> Self {
        self.autostart = false;
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

struct RunState {
    started: Instant,
    completion: TimeoutId,
}

/// Countdown timer with periodic tick events.
///
/// Emits `tick` roughly every [`TICK_INTERVAL`] while running, then
/// `beforeComplete`, the configured complete action, and `complete` when the
/// duration passes. `stop` cancels the local timeout; the complete action is
/// consumed at most once.
pub struct Timer {
    this: Weak<Timer>,
    scheduler: Arc<Scheduler>,
    duration: Duration,
    listeners: Listeners<TimerEvent>,
    complete: Mutex<Option<CompleteAction>>,
    run: Mutex<Option<RunState>>,
}

impl Timer {
    pub fn new(scheduler: &Arc<Scheduler>, options: TimerOptions) -> Arc<Self> {
        let timer = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            scheduler: Arc::clone(scheduler),
            duration: options.duration,
            listeners: Listeners::new(),
            complete: Mutex::new(options.complete),
            run: Mutex::new(None),
        });
        if options.autostart {
            timer.start();
        }
        timer
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    pub fn listeners(&self) -> &Listeners<TimerEvent> {
        &self.listeners
    }

    /// Begin the countdown. Starting a running timer is a no-op.
    pub fn start(&self) {
        let mut run = self.run.lock();
        if run.is_some() {
            return;
        }
        let now = Instant::now();
        let weak = self.this.clone();
        let completion = self.scheduler.schedule_at(now + self.duration, move |_| {
            if let Some(timer) = weak.upgrade() {
                timer.finish();
            }
        });
        *run = Some(RunState {
            started: now,
            completion,
        });
        drop(run);
        // Immediate tick, so an attached face renders without waiting out
        // the first interval.
        self.listeners.trigger(
            "tick",
            &TimerEvent {
                elapsed: Duration::ZERO,
                duration: self.duration,
            },
        );
        self.schedule_tick(now);
    }

    /// Cancel the countdown. Stopping an idle timer is a no-op.
    pub fn stop(&self) {
        if let Some(run) = self.run.lock().take() {
            self.scheduler.cancel(run.completion);
        }
    }

    // Each tick schedules the next from its own logical fire time so the
    // cadence does not drift with pump latency.
    fn schedule_tick(&self, from: Instant) {
        let weak = self.this.clone();
        self.scheduler.schedule_at(from + TICK_INTERVAL, move |now| {
            if let Some(timer) = weak.upgrade() {
                timer.tick(now);
            }
        });
    }

    fn tick(&self, now: Instant) {
        let started = match &*self.run.lock() {
            Some(run) => run.started,
            None => return,
        };
        self.listeners.trigger(
            "tick",
            &TimerEvent {
                elapsed: now.saturating_duration_since(started),
                duration: self.duration,
            },
        );
        self.schedule_tick(now);
    }

    fn finish(&self) {
        if self.run.lock().take().is_none() {
            return;
        }
        let event = TimerEvent {
            elapsed: self.duration,
            duration: self.duration,
        };
        self.listeners.trigger("beforeComplete", &event);
        if let Some(complete) = self.complete.lock().take() {
            complete();
        }
        self.listeners.trigger("complete", &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn timeouts_fire_in_deadline_order() {
        let scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        for (tag, ms) in [("late", 30u64), ("early", 10), ("mid", 20)] {
            let order = Arc::clone(&order);
            scheduler.schedule_at(start + Duration::from_millis(ms), move |_| {
                order.lock().push(tag);
            });
        }

        scheduler.run_due(start + Duration::from_millis(100));
        assert_eq!(*order.lock(), vec!["early", "mid", "late"]);
    }

    #[test]
    fn run_due_leaves_future_timeouts_pending() {
        let scheduler = Scheduler::new();
        let start = Instant::now();
        let hits = Arc::new(AtomicUsize::new(0));

        for ms in [10u64, 50] {
            let hits = Arc::clone(&hits);
            scheduler.schedule_at(start + Duration::from_millis(ms), move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(scheduler.run_due(start + Duration::from_millis(20)), 1);
        assert_eq!(
            scheduler.next_deadline(),
            Some(start + Duration::from_millis(50))
        );
        assert_eq!(scheduler.run_due(start + Duration::from_millis(60)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancelled_timeouts_never_fire() {
        let scheduler = Scheduler::new();
        let start = Instant::now();
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        let id = scheduler.schedule_at(start + Duration::from_millis(10), move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.cancel(id);
        assert_eq!(scheduler.next_deadline(), None);
        assert_eq!(scheduler.run_due(start + Duration::from_millis(20)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn timer_ticks_then_completes() {
        let scheduler = Arc::new(Scheduler::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let done = Arc::clone(&completed);
        let timer = Timer::new(
            &scheduler,
            TimerOptions::new(Duration::from_millis(100))
                .on_complete(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let ticks = Arc::new(AtomicUsize::new(0));
        {
            let ticks = Arc::clone(&ticks);
            timer.listeners().bind("tick", move |_ctx, event| {
                assert_eq!(event.duration, Duration::from_millis(100));
                ticks.fetch_add(1, Ordering::SeqCst);
            });
        }

        let start = Instant::now();
        scheduler.run_due(start + Duration::from_millis(45));
        assert!(ticks.load(Ordering::SeqCst) >= 1);
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        scheduler.run_due(start + Duration::from_millis(150));
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert!(!timer.is_running());

        // Ticks stop once the run state is gone.
        let after = ticks.load(Ordering::SeqCst);
        scheduler.run_due(start + Duration::from_millis(300));
        assert_eq!(ticks.load(Ordering::SeqCst), after);
    }

    #[test]
    fn stopped_timer_never_completes() {
        let scheduler = Arc::new(Scheduler::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let done = Arc::clone(&completed);
        let timer = Timer::new(
            &scheduler,
            TimerOptions::new(Duration::from_millis(50)).on_complete(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }),
        );

        timer.stop();
        scheduler.run_due(Instant::now() + Duration::from_millis(200));
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn start_fires_an_immediate_tick() {
        let scheduler = Arc::new(Scheduler::new());
        let timer = Timer::new(
            &scheduler,
            TimerOptions::new(Duration::from_millis(100)).manual_start(),
        );

        let ticks = Arc::new(AtomicUsize::new(0));
        {
            let ticks = Arc::clone(&ticks);
            timer.listeners().bind("tick", move |_ctx, event| {
                if ticks.fetch_add(1, Ordering::SeqCst) == 0 {
                    assert_eq!(event.elapsed, Duration::ZERO);
                }
            });
        }

        // No pump iteration yet; the first tick comes from start itself.
        timer.start();
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn manual_start_defers_the_countdown() {
        let scheduler = Arc::new(Scheduler::new());
        let timer = Timer::new(
            &scheduler,
            TimerOptions::new(Duration::from_millis(50)).manual_start(),
        );
        assert!(!timer.is_running());
        timer.start();
        assert!(timer.is_running());
    }
}
