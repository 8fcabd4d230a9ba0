//! Profiling helpers for the detection and render loops.

use std::{
    fmt, mem,
    sync::Mutex,
    time::{Duration, Instant},
};

use itertools::Itertools;

const EMA_ALPHA: f32 = 0.3;

/// Smoothed duration of a recurring operation.
///
/// Samples are folded into an exponential moving average. Formatting the timer with `{}` prints
/// the sample count and average, then starts a new averaging period.
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Average in seconds; `None` until the first sample of the period.
    avg: Option<f32>,
    count: usize,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    /// Runs `op` and records how long it took.
    pub fn time<T>(&self, op: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        op()
    }

    /// Records the time until the returned guard is dropped.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn record(&self, duration: Duration) {
        let secs = duration.as_secs_f32();
        let mut state = self.state.lock().unwrap();
        state.avg = Some(match state.avg {
            Some(last) => EMA_ALPHA * secs + (1.0 - EMA_ALPHA) * last,
            None => secs,
        });
        state.count += 1;
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let State { avg, count } = mem::take(&mut *self.state.lock().unwrap());
        let avg_ms = avg.unwrap_or(0.0) * 1000.0;

        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Returned by [`Timer::start`].
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Counts loop iterations and logs the rate once per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Counts one iteration.
    ///
    /// Once a second has passed, logs the iteration rate together with `timers`. The timers are
    /// only formatted (and thereby reset) when a report is logged.
    pub fn tick_with<D: fmt::Display>(&mut self, timers: impl IntoIterator<Item = D>) {
        self.frames += 1;
        if self.start.elapsed() < Duration::from_secs(1) {
            return;
        }

        let timers = timers.into_iter().join(", ");
        if timers.is_empty() {
            log::debug!("{}: {} FPS", self.name, self.frames);
        } else {
            log::debug!("{}: {} FPS ({timers})", self.name, self.frames);
        }

        self.frames = 0;
        self.start = Instant::now();
    }
}
