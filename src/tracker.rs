//! The detection loop.
//!
//! [`HandTracker`] owns the camera and the hand detector. It starts both up, then runs one
//! detection per display refresh and publishes the derived [`ControlState`] through its
//! [`ControlWriter`].

use std::{
    fmt,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::{
    control::{self, ControlState, ControlWriter},
    detector::{DetectorOptions, HandDetector, RunningMode},
    error::Result,
    refresh::Refresh,
    task::CancelToken,
    timer::{FpsCounter, Timer},
    video::{Frame, FrameStream, VideoSource},
};

/// Lifecycle of a [`HandTracker`].
///
/// The normal progression is `Uninitialized -> Initializing -> AwaitingCamera -> Running`.
/// `Failed` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    /// The detection model is loading.
    Initializing,
    /// Waiting for the camera stream.
    AwaitingCamera,
    /// Detecting hands once per refresh.
    Running,
    /// The detector or camera could not be started, or the camera was lost.
    Failed,
    /// The loop was cancelled or its refresh source closed.
    Stopped,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackerState::Uninitialized => "uninitialized",
            TrackerState::Initializing => "initializing",
            TrackerState::AwaitingCamera => "awaiting camera",
            TrackerState::Running => "running",
            TrackerState::Failed => "failed",
            TrackerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A shared view of a [`HandTracker`]'s [`TrackerState`].
#[derive(Clone)]
pub struct TrackerStatus {
    state: Arc<Mutex<TrackerState>>,
}

impl TrackerStatus {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::Uninitialized)),
        }
    }

    pub fn get(&self) -> TrackerState {
        *self.state.lock().unwrap()
    }

    fn set(&self, state: TrackerState) {
        let mut current = self.state.lock().unwrap();
        log::debug!("hand tracker: {} -> {}", *current, state);
        *current = state;
    }
}

impl fmt::Debug for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TrackerStatus").field(&self.get()).finish()
    }
}

/// Detects hands in camera frames and drives a [`ControlWriter`].
pub struct HandTracker<V: VideoSource, D: HandDetector> {
    video: V,
    detector: D,
    options: DetectorOptions,
    writer: ControlWriter,
    status: TrackerStatus,
    mode: RunningMode,
    stream_start: Option<Instant>,
    last_timestamp: Option<Duration>,
    t_read: Timer,
    t_detect: Timer,
}

impl<V: VideoSource, D: HandDetector> HandTracker<V, D> {
    pub fn new(video: V, detector: D, options: DetectorOptions, writer: ControlWriter) -> Self {
        Self {
            video,
            detector,
            options,
            writer,
            status: TrackerStatus::new(),
            mode: RunningMode::Image,
            stream_start: None,
            last_timestamp: None,
            t_read: Timer::new("read"),
            t_detect: Timer::new("detect"),
        }
    }

    /// Returns a handle that reports this tracker's state, also after it was moved to another
    /// thread.
    pub fn status(&self) -> TrackerStatus {
        self.status.clone()
    }

    pub fn state(&self) -> TrackerState {
        self.status.get()
    }

    /// Returns the profiling timers of this tracker and of `stream`.
    pub fn timers<'a>(
        &'a self,
        stream: &'a dyn FrameStream,
    ) -> impl Iterator<Item = &'a Timer> {
        [&self.t_read, &self.t_detect]
            .into_iter()
            .chain(stream.timers())
    }

    /// Initializes the detector, then acquires the camera stream.
    ///
    /// On failure, the tracker enters [`TrackerState::Failed`] and the error is returned.
    pub fn start(&mut self) -> Result<Box<dyn FrameStream>> {
        let res = self.start_impl();
        if res.is_err() {
            self.status.set(TrackerState::Failed);
        }
        res
    }

    fn start_impl(&mut self) -> Result<Box<dyn FrameStream>> {
        self.status.set(TrackerState::Initializing);
        log::debug!(
            "loading hand detection model {} (max {} hands, {:?})",
            self.options.model_ref(),
            self.options.max_hand_count(),
            self.options.delegate_kind(),
        );
        self.detector.initialize(&self.options)?;
        self.mode = RunningMode::Image;

        self.status.set(TrackerState::AwaitingCamera);
        let stream = self.video.acquire()?;
        log::info!("camera stream acquired, hand tracking running");

        self.status.set(TrackerState::Running);
        Ok(stream)
    }

    /// Runs detection on a single frame and publishes the result.
    ///
    /// The detector is switched to [`RunningMode::Video`] before the first detection. Errors are
    /// returned as-is; the control state is left untouched whenever this fails.
    pub fn process(&mut self, frame: &Frame) -> Result<Option<ControlState>> {
        if self.mode != RunningMode::Video {
            self.detector.set_running_mode(RunningMode::Video)?;
            self.mode = RunningMode::Video;
            log::debug!("hand detector switched to video mode");
        }

        let timestamp = self.timestamp(frame);
        let observation = self
            .t_detect
            .time(|| self.detector.detect(frame, timestamp))?;
        log::trace!("{} hand(s) at {:?}", observation.num_hands(), timestamp);

        let state = control::update(&mut self.writer, &observation)?;
        if let Some(state) = &state {
            log::trace!("control: {state}");
        }
        Ok(state)
    }

    /// Returns the strictly increasing detection timestamp for `frame`.
    fn timestamp(&mut self, frame: &Frame) -> Duration {
        let start = *self.stream_start.get_or_insert(frame.captured_at());
        let mut timestamp = frame.captured_at().saturating_duration_since(start);
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                timestamp = last + Duration::from_micros(1);
            }
        }
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    /// Reads and processes one frame from `stream`.
    ///
    /// Errors that only affect this frame are logged and reported as `Ok(None)`. Any other error
    /// is returned and means the loop cannot continue.
    pub fn step(&mut self, stream: &mut dyn FrameStream) -> Result<Option<ControlState>> {
        let frame = self.t_read.time(|| stream.read())?;
        match self.process(&frame) {
            Ok(state) => Ok(state),
            Err(e) if e.is_frame_local() => {
                log::warn!("skipping frame: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the detection loop until `cancel` fires or `refresh` closes.
    ///
    /// Failures never escape this method: they are logged and reflected in the
    /// [`TrackerState`].
    pub fn run(mut self, refresh: &Refresh, cancel: &CancelToken) {
        let mut stream = match self.start() {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("hand tracking unavailable: {e}");
                return;
            }
        };

        let mut fps = FpsCounter::new("hand tracker");
        while !cancel.is_cancelled() {
            if refresh.wait(cancel).is_none() {
                break;
            }

            if let Err(e) = self.step(&mut *stream) {
                log::error!("hand tracking stopped: {e}");
                self.status.set(TrackerState::Failed);
                return;
            }

            fps.tick_with(self.timers(&*stream));
        }

        self.status.set(TrackerState::Stopped);
    }
}
