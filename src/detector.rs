//! The hand landmark detection capability.
//!
//! Hand landmark models are provided by an external inference library; this module only defines
//! how the detection loop talks to them.

use std::{env, fmt, time::Duration};

use crate::{error::Result, hand::FrameObservation, video::Frame};

/// The hand landmarker model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "https://storage.googleapis.com/mediapipe-models/hand_landmarker/hand_landmarker/float16/1/hand_landmarker.task";

const ENV_VAR_MODEL: &str = "HANDSPIN_MODEL";

/// An opaque reference to a detection model (a path or a URI), passed to the detector unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef(String);

impl ModelRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ModelRef {
    /// Uses the model named by `HANDSPIN_MODEL`, or [`DEFAULT_MODEL`] if it is unset.
    fn default() -> Self {
        match env::var(ENV_VAR_MODEL) {
            Ok(uri) => {
                log::debug!("model override: `{}` is set to '{}'", ENV_VAR_MODEL, uri);
                Self(uri)
            }
            Err(_) => Self(DEFAULT_MODEL.into()),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the detector should run inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delegate {
    Cpu,
    #[default]
    Gpu,
}

/// How the detector treats successive [`HandDetector::detect`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    /// Every call is an unrelated still image.
    Image,
    /// Calls are consecutive frames of one video, with increasing timestamps. Detectors may track
    /// hands across frames instead of detecting them from scratch.
    Video,
}

/// Options passed to [`HandDetector::initialize`].
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    model: ModelRef,
    max_hands: usize,
    delegate: Delegate,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            model: ModelRef::default(),
            max_hands: 2,
            delegate: Delegate::default(),
        }
    }
}

impl DetectorOptions {
    #[inline]
    pub fn model(self, model: ModelRef) -> Self {
        Self { model, ..self }
    }

    /// Sets the maximum number of hands to report per frame.
    ///
    /// The control derivation needs exactly two hands, so this defaults to 2.
    #[inline]
    pub fn max_hands(self, max_hands: usize) -> Self {
        Self { max_hands, ..self }
    }

    #[inline]
    pub fn delegate(self, delegate: Delegate) -> Self {
        Self { delegate, ..self }
    }

    pub fn model_ref(&self) -> &ModelRef {
        &self.model
    }

    pub fn max_hand_count(&self) -> usize {
        self.max_hands
    }

    pub fn delegate_kind(&self) -> Delegate {
        self.delegate
    }
}

/// Trait implemented by hand landmark detectors.
///
/// A detector is created uninitialized, initialized once by the detection loop, and then fed one
/// frame per display refresh.
pub trait HandDetector: Send + 'static {
    /// Loads the model and prepares the detector.
    ///
    /// Detectors start out in [`RunningMode::Image`].
    fn initialize(&mut self, options: &DetectorOptions) -> Result<()>;

    /// Switches the detector into a different [`RunningMode`].
    fn set_running_mode(&mut self, mode: RunningMode) -> Result<()>;

    /// Detects hands in `frame`.
    ///
    /// `timestamp` is the frame's time since the start of the stream. It increases monotonically
    /// between calls.
    ///
    /// Fails with [`Error::ModelNotReady`] if the detector is not initialized, and with
    /// [`Error::InferenceError`] if inference fails on this frame.
    ///
    /// [`Error::ModelNotReady`]: crate::Error::ModelNotReady
    /// [`Error::InferenceError`]: crate::Error::InferenceError
    fn detect(&mut self, frame: &Frame, timestamp: Duration) -> Result<FrameObservation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = DetectorOptions::default();
        assert_eq!(options.max_hand_count(), 2);
        assert_eq!(options.delegate_kind(), Delegate::Gpu);
        assert!(!options.model_ref().as_str().is_empty());
    }

    #[test]
    fn builder() {
        let options = DetectorOptions::default()
            .model(ModelRef::new("models/hand_landmarker.task"))
            .max_hands(1)
            .delegate(Delegate::Cpu);
        assert_eq!(options.model_ref().to_string(), "models/hand_landmarker.task");
        assert_eq!(options.max_hand_count(), 1);
        assert_eq!(options.delegate_kind(), Delegate::Cpu);
    }
}
