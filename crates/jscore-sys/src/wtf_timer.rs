//! `WTFTimer__*` symbols for static WebKit builds.
//!
//! The prebuilt static WebKit archives leave run-loop timers to the embedder:
//! the engine uses them to schedule incremental collection and heap
//! maintenance. Timers are driven by one scheduler thread. Every reschedule or
//! cancel bumps the timer's generation so stale queue entries are skipped when
//! they come due.

// Allow unsafe operations in unsafe functions (Rust 2024 compatibility)
#![allow(unsafe_op_in_unsafe_fn)]

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ffi::c_void;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

type TimerCallback = unsafe extern "C" fn(*mut c_void);

struct TimerState {
    /// Bumped on every update/cancel; queue entries carry the value they were scheduled with.
    generation: u64,
    deadline: Option<Instant>,
    interval: Duration,
    repeat: bool,
}

struct TimerShared {
    callback: TimerCallback,
    user_data: *mut c_void,
    state: Mutex<TimerState>,
}

// SAFETY: user_data is owned by WTF, which expects callbacks from the timer thread
unsafe impl Send for TimerShared {}
unsafe impl Sync for TimerShared {}

impl TimerShared {
    /// Claim a due entry. Returns false when the entry was superseded.
    fn claim(self: &Arc<Self>, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation || state.deadline.is_none() {
            return false;
        }
        if state.repeat {
            let next = Instant::now() + state.interval;
            state.deadline = Some(next);
            drop(state);
            // Reschedule under the same generation
            scheduler().push(next, generation, self.clone());
        } else {
            state.deadline = None;
        }
        true
    }
}

/// Opaque handle handed to WebKit
pub struct WTFTimer {
    shared: Arc<TimerShared>,
}

struct Entry {
    due: Instant,
    generation: u64,
    timer: Arc<TimerShared>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on due time
        other.due.cmp(&self.due)
    }
}

struct Scheduler {
    queue: Mutex<BinaryHeap<Entry>>,
    wake: Condvar,
}

impl Scheduler {
    fn push(&self, due: Instant, generation: u64, timer: Arc<TimerShared>) {
        self.queue.lock().push(Entry {
            due,
            generation,
            timer,
        });
        self.wake.notify_one();
    }

    /// Pop every entry due at `now`.
    fn drain_due(&self, now: Instant) -> Vec<Entry> {
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while queue.peek().is_some_and(|entry| entry.due <= now) {
            if let Some(entry) = queue.pop() {
                due.push(entry);
            }
        }
        due
    }

    fn run(&self) {
        loop {
            {
                let mut queue = self.queue.lock();
                match queue.peek().map(|entry| entry.due) {
                    None => self.wake.wait(&mut queue),
                    Some(due) => {
                        let now = Instant::now();
                        if due > now {
                            let _ = self.wake.wait_for(&mut queue, due - now);
                        }
                    }
                }
            }
            fire(self.drain_due(Instant::now()));
        }
    }
}

fn fire(entries: Vec<Entry>) {
    for entry in entries {
        if entry.timer.claim(entry.generation) {
            // SAFETY: callback and user_data were supplied together by WTF
            unsafe { (entry.timer.callback)(entry.timer.user_data) };
        }
    }
}

static SCHEDULER: OnceLock<Scheduler> = OnceLock::new();

fn scheduler() -> &'static Scheduler {
    SCHEDULER.get_or_init(|| {
        let spawned = thread::Builder::new()
            .name("wtf-timer".into())
            .spawn(|| scheduler().run());
        if let Err(err) = spawned {
            // Timers then only fire through WTFTimer__runIfImminent.
            eprintln!("jscore-sys: failed to spawn WTF timer thread: {err}");
        }
        Scheduler {
            queue: Mutex::new(BinaryHeap::new()),
            wake: Condvar::new(),
        }
    })
}

impl WTFTimer {
    fn new(callback: TimerCallback, user_data: *mut c_void) -> Self {
        let shared = Arc::new(TimerShared {
            callback,
            user_data,
            state: Mutex::new(TimerState {
                generation: 0,
                deadline: None,
                interval: Duration::ZERO,
                repeat: false,
            }),
        });
        Self { shared }
    }

    fn update(&self, delay_seconds: f64, repeat: bool) {
        let interval =
            Duration::try_from_secs_f64(delay_seconds.max(0.0)).unwrap_or(Duration::MAX);
        let due = Instant::now().checked_add(interval);
        let generation = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.deadline = due;
            state.interval = interval;
            state.repeat = repeat;
            state.generation
        };
        if let Some(due) = due {
            scheduler().push(due, generation, self.shared.clone());
        }
    }

    fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        state.deadline = None;
    }

    fn is_active(&self) -> bool {
        self.shared.state.lock().deadline.is_some()
    }

    fn seconds_until_fire(&self) -> f64 {
        match self.shared.state.lock().deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .as_secs_f64(),
            None => f64::INFINITY,
        }
    }
}

/// Create a new WTF timer.
///
/// # Safety
/// - `callback` must be a valid function pointer
/// - `user_data` must remain valid for the lifetime of the timer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__create(
    callback: TimerCallback,
    user_data: *mut c_void,
) -> *mut WTFTimer {
    Box::into_raw(Box::new(WTFTimer::new(callback, user_data)))
}

/// Schedule (or reschedule) a timer.
///
/// # Safety
/// `timer` must come from `WTFTimer__create`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__update(timer: *mut WTFTimer, delay_seconds: f64, repeat: bool) {
    if let Some(timer) = timer.as_ref() {
        timer.update(delay_seconds, repeat);
    }
}

/// Cancel a timer.
///
/// # Safety
/// `timer` must come from `WTFTimer__create`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__cancel(timer: *mut WTFTimer) {
    if let Some(timer) = timer.as_ref() {
        timer.cancel();
    }
}

/// # Safety
/// `timer` must come from `WTFTimer__create`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__isActive(timer: *mut WTFTimer) -> bool {
    timer.as_ref().is_some_and(WTFTimer::is_active)
}

/// # Safety
/// `timer` must come from `WTFTimer__create`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__secondsUntilTimer(timer: *mut WTFTimer) -> f64 {
    timer
        .as_ref()
        .map_or(f64::INFINITY, WTFTimer::seconds_until_fire)
}

/// Cancel and free a timer.
///
/// # Safety
/// `timer` must come from `WTFTimer__create` and must not be used afterwards
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__deinit(timer: *mut WTFTimer) {
    if timer.is_null() {
        return;
    }
    let timer = Box::from_raw(timer);
    timer.cancel();
}

/// Fire every timer that is already due on the calling thread.
///
/// # Safety
/// Callbacks run on the caller's thread; WTF calls this from the mutator.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn WTFTimer__runIfImminent() {
    if let Some(scheduler) = SCHEDULER.get() {
        fire(scheduler.drain_due(Instant::now()));
    }
}
