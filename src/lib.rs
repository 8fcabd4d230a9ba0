//! Two-handed control of a 3D object.
//!
//! `handspin` turns the landmarks of two tracked hands into a scale and a rotation, and applies
//! them to an object in a 3D scene once per display refresh:
//!
//! - the distance between both palms sets the object's scale,
//! - turning both hands around their midpoint (like a steering wheel) rotates it around Z,
//! - tilting the thumbs towards or away from the camera rotates it around Y.
//!
//! Hand landmark detection, scene rendering and asset loading are provided by the application
//! through the [`HandDetector`], [`SceneRenderer`] and [`ObjectLoader`] traits. Camera frames come
//! from any [`VideoSource`]; [`Webcam`] captures from V4L2 devices.
//!
//! [`App`] runs the detection loop and the render loop as independent tasks that only share the
//! latest [`ControlState`]. When hand tracking cannot be started, the scene is still rendered.
//!
//! # Coordinates
//!
//! Landmarks use the detector's normalized coordinates: X and Y follow the input image (so Y
//! points *down*), Z is the depth relative to the hand.
//!
//! # Environment Variables
//!
//! * `HANDSPIN_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an explicit
//!   device name. If unset, the first device that supports a compatible image format will be used.
//! * `HANDSPIN_MODEL`: Overrides the hand landmark model passed to the detector.
//! * `HANDSPIN_OBJECT`: Overrides the asset loaded as the controlled object
//!   ([`AppOptions::from_env`]).
//! * `HANDSPIN_REFRESH_HZ`: Overrides the refresh rate of both loops ([`AppOptions::from_env`]).
//!
//! [`HandDetector`]: detector::HandDetector
//! [`SceneRenderer`]: scene::SceneRenderer
//! [`ObjectLoader`]: scene::ObjectLoader
//! [`VideoSource`]: video::VideoSource
//! [`Webcam`]: video::webcam::Webcam
//! [`App`]: app::App
//! [`AppOptions::from_env`]: app::AppOptions::from_env
//! [`ControlState`]: control::ControlState

use log::LevelFilter;

pub mod app;
pub mod control;
pub mod detector;
mod error;
pub mod hand;
pub mod landmark;
pub mod refresh;
pub mod render;
pub mod scene;
pub mod task;
pub mod timer;
pub mod tracker;
pub mod video;


pub use error::{Error, Result};

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and handspin will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` overrides both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
