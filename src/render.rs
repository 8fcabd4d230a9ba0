//! The render loop.
//!
//! [`SceneController`] renders one frame per display refresh. Once the controlled object has
//! loaded, each frame first applies the latest [`ControlState`] to it. Until then (and forever, if
//! loading fails) the scene is rendered without it.
//!
//! [`ControlState`]: crate::control::ControlState

use std::{fmt, mem};

use pawawwewism::{background, promise, Background, PromiseHandle};

use crate::{
    control::ControlReader,
    error::Result,
    refresh::Refresh,
    scene::{ObjectLoader, SceneRenderer, SceneSetup, Transform},
    task::CancelToken,
    timer::{FpsCounter, Timer},
};

/// Loading state of the controlled object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// No object was requested; the scene renders empty.
    NotRequested,
    /// The object is being loaded; the scene renders without it.
    Loading,
    /// The object is in the scene and follows the control state.
    Loaded,
    /// Loading failed. The scene renders without the object and loading is not retried.
    Unavailable,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectState::NotRequested => "not requested",
            ObjectState::Loading => "loading",
            ObjectState::Loaded => "loaded",
            ObjectState::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

enum ObjectSlot<T> {
    NotRequested,
    Loading {
        uri: String,
        handle: PromiseHandle<Result<T>>,
    },
    Loaded(T),
    Unavailable,
}

impl<T> ObjectSlot<T> {
    fn state(&self) -> ObjectState {
        match self {
            ObjectSlot::NotRequested => ObjectState::NotRequested,
            ObjectSlot::Loading { .. } => ObjectState::Loading,
            ObjectSlot::Loaded(_) => ObjectState::Loaded,
            ObjectSlot::Unavailable => ObjectState::Unavailable,
        }
    }
}

/// Renders the scene and keeps the controlled object in sync with a [`ControlReader`].
pub struct SceneController<R: SceneRenderer> {
    renderer: R,
    control: ControlReader,
    object: ObjectSlot<R::Object>,
    /// Joined on drop, forwarding a loader panic.
    loader: Option<Background<()>>,
    t_render: Timer,
    fps: FpsCounter,
}

impl<R: SceneRenderer> SceneController<R> {
    /// Creates a controller and builds the static scene.
    pub fn new(mut renderer: R, control: ControlReader, scene: &SceneSetup) -> Self {
        renderer.setup(scene);
        Self {
            renderer,
            control,
            object: ObjectSlot::NotRequested,
            loader: None,
            t_render: Timer::new("render"),
            fps: FpsCounter::new("renderer"),
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn object_state(&self) -> ObjectState {
        self.object.state()
    }

    /// Starts loading the controlled object in the background.
    ///
    /// The render loop keeps running while the object loads; it is picked up by the first
    /// [`SceneController::step`] after loading finishes.
    pub fn load_object<L>(&mut self, mut loader: L, uri: impl Into<String>)
    where
        L: ObjectLoader<Object = R::Object>,
    {
        let uri = uri.into();
        let (promise, handle) = promise();
        let thread = {
            let uri = uri.clone();
            background(move || {
                log::debug!("loading object '{uri}'");
                promise.fulfill(loader.load_object(&uri));
            })
        };

        self.object = ObjectSlot::Loading { uri, handle };
        self.loader = Some(thread);
    }

    fn poll_object(&mut self) {
        self.object = match mem::replace(&mut self.object, ObjectSlot::NotRequested) {
            ObjectSlot::Loading { uri, handle } if !handle.will_block() => match handle.block() {
                Ok(Ok(object)) => {
                    log::info!("object '{uri}' loaded");
                    ObjectSlot::Loaded(object)
                }
                Ok(Err(e)) => {
                    log::error!("{e}; rendering without object");
                    ObjectSlot::Unavailable
                }
                Err(_dropped) => {
                    log::error!("loader for '{uri}' exited without a result");
                    ObjectSlot::Unavailable
                }
            },
            slot => slot,
        };
    }

    /// Renders a single frame.
    ///
    /// Returns the transform applied to the object, or `None` if no object is loaded.
    pub fn step(&mut self) -> Option<Transform> {
        self.poll_object();
        let _guard = self.t_render.start();

        let applied = match &mut self.object {
            ObjectSlot::Loaded(object) => {
                let transform = Transform::from(self.control.get());
                self.renderer.apply_transform(object, &transform);
                Some(transform)
            }
            ObjectSlot::NotRequested | ObjectSlot::Loading { .. } | ObjectSlot::Unavailable => {
                None
            }
        };
        self.renderer.render_frame();
        applied
    }

    /// Runs the render loop until `cancel` fires or `refresh` closes.
    pub fn run(mut self, refresh: &Refresh, cancel: &CancelToken) {
        while !cancel.is_cancelled() {
            if refresh.wait(cancel).is_none() {
                break;
            }

            self.step();
            self.fps.tick_with([&self.t_render]);
        }

        log::debug!("render loop stopped (object {})", self.object_state());
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
        thread,
        time::{Duration, Instant},
    };

    use crossbeam::channel::{self, Receiver, Sender};

    use crate::{
        control::{cell, ControlState},
        error::Error,
        refresh,
        task::cancellation,
    };

    use super::*;

    #[derive(Default)]
    struct RecordingRenderer {
        setups: usize,
        frames: usize,
        applied: Vec<(u32, Transform)>,
    }

    impl SceneRenderer for RecordingRenderer {
        type Object = u32;

        fn setup(&mut self, _scene: &SceneSetup) {
            self.setups += 1;
        }

        fn apply_transform(&mut self, object: &mut u32, transform: &Transform) {
            self.applied.push((*object, *transform));
        }

        fn render_frame(&mut self) {
            self.frames += 1;
        }
    }

    /// Loader that completes when told to.
    struct GatedLoader {
        gate: Receiver<Result<u32>>,
    }

    impl ObjectLoader for GatedLoader {
        type Object = u32;

        fn load_object(&mut self, _uri: &str) -> Result<u32> {
            self.gate.recv().unwrap_or_else(|_| {
                Err(Error::AssetLoadError {
                    uri: "gate".into(),
                    reason: "closed".into(),
                })
            })
        }
    }

    fn gated() -> (Sender<Result<u32>>, GatedLoader) {
        let (sender, gate) = channel::bounded(1);
        (sender, GatedLoader { gate })
    }

    fn controller() -> SceneController<RecordingRenderer> {
        let (_writer, reader) = cell();
        SceneController::new(RecordingRenderer::default(), reader, &SceneSetup::default())
    }

    /// Steps until the object leaves the `Loading` state.
    fn step_until_settled(controller: &mut SceneController<RecordingRenderer>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while controller.object_state() == ObjectState::Loading {
            assert!(Instant::now() < deadline, "object never finished loading");
            controller.step();
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn renders_without_object() {
        let mut controller = controller();
        assert_eq!(controller.renderer().setups, 1);
        for _ in 0..3 {
            assert_eq!(controller.step(), None);
        }
        assert_eq!(controller.renderer().frames, 3);
        assert!(controller.renderer().applied.is_empty());
        assert_eq!(controller.object_state(), ObjectState::NotRequested);
    }

    #[test]
    fn renders_while_loading_then_applies_control() {
        let (mut writer, reader) = cell();
        let mut controller =
            SceneController::new(RecordingRenderer::default(), reader, &SceneSetup::default());
        let (gate, loader) = gated();
        controller.load_object(loader, "models/bunny.glb");

        assert_eq!(controller.step(), None);
        assert_eq!(controller.object_state(), ObjectState::Loading);
        assert!(controller.renderer().applied.is_empty());

        let state = ControlState {
            scale: 1.5,
            angle_z: 0.1,
            angle_y: 0.2,
        };
        writer.set(state);
        gate.send(Ok(7)).unwrap();
        step_until_settled(&mut controller);

        assert_eq!(controller.object_state(), ObjectState::Loaded);
        assert_eq!(controller.step(), Some(Transform::from(state)));
        let (object, transform) = *controller.renderer().applied.last().unwrap();
        assert_eq!(object, 7);
        assert_eq!(transform, Transform::from(state));
    }

    #[test]
    fn failed_load_keeps_rendering() {
        let mut controller = controller();
        let (gate, loader) = gated();
        controller.load_object(loader, "models/missing.glb");
        gate.send(Err(Error::AssetLoadError {
            uri: "models/missing.glb".into(),
            reason: "not found".into(),
        }))
        .unwrap();
        step_until_settled(&mut controller);

        assert_eq!(controller.object_state(), ObjectState::Unavailable);
        let frames = controller.renderer().frames;
        assert_eq!(controller.step(), None);
        assert_eq!(controller.renderer().frames, frames + 1);
        assert!(controller.renderer().applied.is_empty());
    }

    struct PanickingLoader;

    impl ObjectLoader for PanickingLoader {
        type Object = u32;

        fn load_object(&mut self, _uri: &str) -> Result<u32> {
            resume_unwind(Box::new("loader crashed"));
        }
    }

    #[test]
    fn loader_panic_leaves_object_unavailable() {
        let mut controller = controller();
        controller.load_object(PanickingLoader, "models/cursed.glb");
        step_until_settled(&mut controller);
        assert_eq!(controller.object_state(), ObjectState::Unavailable);
        assert_eq!(controller.step(), None);

        // The panic surfaces in the thread that owns the controller.
        catch_unwind(AssertUnwindSafe(|| drop(controller))).unwrap_err();
    }

    #[test]
    fn run_stops_on_cancel() {
        let controller = controller();
        let (canceller, token) = cancellation();
        let (trigger, refresh) = refresh::manual();

        let handle = thread::spawn(move || controller.run(&refresh, &token));
        trigger.trigger();
        canceller.cancel();
        handle.join().unwrap();
    }
}
