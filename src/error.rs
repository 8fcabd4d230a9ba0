//! Error taxonomy shared by the capabilities and both loops.

use thiserror::Error;

/// Errors reported by capabilities (camera, detector, asset loader) and by control derivation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The user or the OS refused access to the camera.
    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    /// No usable camera exists, or the camera went away.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// `detect` was called before the detector finished initializing.
    #[error("hand detection model is not ready")]
    ModelNotReady,

    /// The detector failed on a single frame.
    #[error("hand detection failed: {0}")]
    InferenceError(String),

    /// A hand observation did not contain enough landmarks, or produced non-finite values.
    #[error("malformed observation: hand {hand} has {landmarks} usable landmarks")]
    MalformedObservation { hand: usize, landmarks: usize },

    /// The 3D object could not be loaded.
    #[error("failed to load object '{uri}': {reason}")]
    AssetLoadError { uri: String, reason: String },
}

impl Error {
    /// Returns whether this error only affects the frame it was raised for.
    ///
    /// The detection loop skips such frames and keeps running. Any other error ends it.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Error::ModelNotReady | Error::InferenceError(_) | Error::MalformedObservation { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
