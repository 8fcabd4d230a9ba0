//! Wiring of the detection loop and the render loop.

use std::env::{self, VarError};

use anyhow::{bail, Context};

use crate::{
    control::{self, ControlReader, ControlState},
    detector::{DetectorOptions, HandDetector},
    refresh::Refresh,
    render::SceneController,
    scene::{ObjectLoader, SceneRenderer, SceneSetup},
    task::Task,
    tracker::{HandTracker, TrackerState, TrackerStatus},
    video::VideoSource,
};

/// Asset loaded as the controlled object when nothing else is configured.
pub const DEFAULT_OBJECT: &str = "models/object.glb";

pub const DEFAULT_REFRESH_HZ: u32 = 60;

const ENV_VAR_OBJECT: &str = "HANDSPIN_OBJECT";
const ENV_VAR_REFRESH_HZ: &str = "HANDSPIN_REFRESH_HZ";

/// Configuration for an [`App`].
#[derive(Debug, Clone)]
pub struct AppOptions {
    detector: DetectorOptions,
    object: Option<String>,
    refresh_hz: u32,
    scene: SceneSetup,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            detector: DetectorOptions::default(),
            object: Some(DEFAULT_OBJECT.into()),
            refresh_hz: DEFAULT_REFRESH_HZ,
            scene: SceneSetup::default(),
        }
    }
}

impl AppOptions {
    /// Creates the default options, overridden by `HANDSPIN_OBJECT` and `HANDSPIN_REFRESH_HZ`.
    ///
    /// The detection model can be overridden with `HANDSPIN_MODEL`, and the webcam with
    /// `HANDSPIN_WEBCAM_NAME`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut options = Self::default();
        if let Some(uri) = env_var(ENV_VAR_OBJECT)? {
            log::debug!("object override: `{ENV_VAR_OBJECT}` is set to '{uri}'");
            options.object = Some(uri);
        }
        if let Some(hz) = env_var(ENV_VAR_REFRESH_HZ)? {
            options.refresh_hz = parse_refresh_rate(&hz)
                .with_context(|| format!("invalid value for `{ENV_VAR_REFRESH_HZ}`"))?;
        }
        Ok(options)
    }

    #[inline]
    pub fn detector(self, detector: DetectorOptions) -> Self {
        Self { detector, ..self }
    }

    /// Sets the asset to load as the controlled object.
    #[inline]
    pub fn object(self, uri: impl Into<String>) -> Self {
        Self {
            object: Some(uri.into()),
            ..self
        }
    }

    /// Renders the scene without a controlled object.
    #[inline]
    pub fn without_object(self) -> Self {
        Self {
            object: None,
            ..self
        }
    }

    /// Sets how often both loops run per second, when driven by [`App::start`].
    ///
    /// # Panics
    ///
    /// This method panics if `hz` is 0.
    #[inline]
    pub fn refresh_rate(self, hz: u32) -> Self {
        assert!(hz > 0, "refresh rate must be positive");
        Self {
            refresh_hz: hz,
            ..self
        }
    }

    #[inline]
    pub fn scene(self, scene: SceneSetup) -> Self {
        Self { scene, ..self }
    }
}

fn env_var(name: &str) -> anyhow::Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(s)) => {
            bail!("`{name}` is not valid unicode: {}", s.to_string_lossy())
        }
    }
}

fn parse_refresh_rate(s: &str) -> anyhow::Result<u32> {
    let hz: u32 = s.trim().parse()?;
    if hz == 0 {
        bail!("refresh rate must be positive");
    }
    Ok(hz)
}

/// The running application: a detection loop and a render loop sharing one control cell.
///
/// Dropping the `App` stops both loops.
pub struct App {
    // Declared first so that tracking stops before rendering does.
    tracker: Task,
    renderer: Task,
    status: TrackerStatus,
    control: ControlReader,
}

impl App {
    /// Starts both loops, each refreshing at the configured rate.
    pub fn start<V, D, R, L>(
        options: AppOptions,
        video: V,
        detector: D,
        renderer: R,
        loader: L,
    ) -> anyhow::Result<Self>
    where
        V: VideoSource,
        D: HandDetector,
        R: SceneRenderer,
        L: ObjectLoader<Object = R::Object>,
    {
        let hz = options.refresh_hz;
        log::debug!("starting at {hz} Hz");
        Self::spawn(
            options,
            video,
            detector,
            renderer,
            loader,
            Refresh::fixed_rate(hz),
            Refresh::fixed_rate(hz),
        )
    }

    /// Starts both loops, driven by the given refresh sources.
    ///
    /// The render loop starts first, and keeps rendering regardless of whether hand tracking
    /// comes up.
    pub fn spawn<V, D, R, L>(
        options: AppOptions,
        video: V,
        detector: D,
        renderer: R,
        loader: L,
        tracker_refresh: Refresh,
        render_refresh: Refresh,
    ) -> anyhow::Result<Self>
    where
        V: VideoSource,
        D: HandDetector,
        R: SceneRenderer,
        L: ObjectLoader<Object = R::Object>,
    {
        let AppOptions {
            detector: detector_options,
            object,
            refresh_hz: _,
            scene,
        } = options;
        let (writer, control) = control::cell();

        let reader = control.clone();
        let render_task = Task::builder()
            .name("scene renderer")
            .spawn(move |cancel| {
                let mut controller = SceneController::new(renderer, reader, &scene);
                if let Some(uri) = object {
                    controller.load_object(loader, uri);
                }
                controller.run(&render_refresh, &cancel);
            })
            .context("failed to spawn render loop")?;

        let tracker = HandTracker::new(video, detector, detector_options, writer);
        let status = tracker.status();
        let tracker_task = Task::builder()
            .name("hand tracker")
            .spawn(move |cancel| tracker.run(&tracker_refresh, &cancel))
            .context("failed to spawn detection loop")?;

        Ok(Self {
            tracker: tracker_task,
            renderer: render_task,
            status,
            control,
        })
    }

    /// Returns the control state currently visible to the renderer.
    pub fn control(&self) -> ControlState {
        self.control.clone().get()
    }

    /// Returns a reader for the control state, e.g. for display in a debug overlay.
    pub fn control_reader(&self) -> ControlReader {
        self.control.clone()
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.status.get()
    }

    /// Returns whether the render loop is still running.
    pub fn is_rendering(&self) -> bool {
        !self.renderer.is_finished()
    }

    /// Stops both loops and waits for them to exit.
    pub fn shutdown(self) {
        log::debug!("shutting down");
        let App {
            tracker, renderer, ..
        } = self;
        tracker.cancel();
        renderer.cancel();
    }
}
