//! Hand landmark observations, as delivered by a [`HandDetector`].
//!
//! [`HandDetector`]: crate::detector::HandDetector

use crate::error::{Error, Result};
use crate::landmark::Landmark;

/// Number of landmarks a detector reports per hand.
pub const NUM_LANDMARKS: usize = 21;

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl LandmarkIdx {
    /// The landmark used as the center of the palm.
    ///
    /// The middle finger's knuckle sits close to the middle of the palm and is tracked more
    /// reliably than the wrist.
    pub const PALM_CENTER: Self = Self::MiddleFingerMcp;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// The landmarks of a single hand detected in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandObservation {
    landmarks: Vec<Landmark>,
    handedness: Option<Handedness>,
    score: Option<f32>,
}

impl HandObservation {
    /// Creates an observation from the landmarks reported by a detector, in detector order.
    ///
    /// Observations with fewer than [`NUM_LANDMARKS`] entries are accepted here; the accessors
    /// report them as [`Error::MalformedObservation`].
    pub fn new(landmarks: impl IntoIterator<Item = Landmark>) -> Self {
        Self {
            landmarks: landmarks.into_iter().collect(),
            handedness: None,
            score: None,
        }
    }

    pub fn with_handedness(self, handedness: Handedness) -> Self {
        Self {
            handedness: Some(handedness),
            ..self
        }
    }

    /// Attaches the detector's confidence that this is a hand.
    pub fn with_score(self, score: f32) -> Self {
        Self {
            score: Some(score),
            ..self
        }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    pub fn score(&self) -> Option<f32> {
        self.score
    }

    /// Returns whether all [`NUM_LANDMARKS`] landmarks are present.
    pub fn is_complete(&self) -> bool {
        self.landmarks.len() >= NUM_LANDMARKS
    }

    /// Returns the landmark at `idx`.
    ///
    /// `hand` is the position of this observation in its frame and is only used for error
    /// reporting. Incomplete observations are rejected even if `idx` happens to be in bounds, so
    /// that a truncated detector output never yields a partially valid measurement.
    pub fn get(&self, hand: usize, idx: LandmarkIdx) -> Result<Landmark> {
        if !self.is_complete() {
            return Err(Error::MalformedObservation {
                hand,
                landmarks: self.landmarks.len(),
            });
        }
        Ok(self.landmarks[idx as usize])
    }

    pub fn palm_center(&self, hand: usize) -> Result<Landmark> {
        self.get(hand, LandmarkIdx::PALM_CENTER)
    }

    pub fn thumb_tip(&self, hand: usize) -> Result<Landmark> {
        self.get(hand, LandmarkIdx::ThumbTip)
    }

    pub fn middle_fingertip(&self, hand: usize) -> Result<Landmark> {
        self.get(hand, LandmarkIdx::MiddleFingerTip)
    }
}

/// All hands detected in a single video frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameObservation {
    hands: Vec<HandObservation>,
}

impl FrameObservation {
    pub fn new(hands: Vec<HandObservation>) -> Self {
        Self { hands }
    }

    /// Returns an observation containing no hands.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn hands(&self) -> &[HandObservation] {
        &self.hands
    }

    pub fn num_hands(&self) -> usize {
        self.hands.len()
    }
}

impl FromIterator<HandObservation> for FrameObservation {
    fn from_iter<T: IntoIterator<Item = HandObservation>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
