//! Derivation of the control values from two tracked hands, and the cell that shares them.
//!
//! The detection loop holds the only [`ControlWriter`]. Render loops hold [`ControlReader`]s and
//! observe the latest complete [`ControlState`].

use std::{f32::consts::PI, fmt};

use itertools::Itertools;
use pawawwewism::reactive::{Reader, Value};

use crate::{
    error::{Error, Result},
    hand::{FrameObservation, HandObservation},
    landmark::{distance, planar_angle, Axis, Landmark},
};

const DEG_TO_RAD: f32 = PI / 180.0;

/// Scale and rotation derived from the hands' relative positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    /// Uniform scale factor, at least 1.0 once derived from hands.
    pub scale: f32,
    /// Rotation around the Z axis in radians ("steering wheel" twist of both hands).
    pub angle_z: f32,
    /// Rotation around the Y axis in radians (average thumb tilt of both hands).
    pub angle_y: f32,
}

impl ControlState {
    /// The identity transform, used until two hands have been seen.
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        angle_z: 0.0,
        angle_y: 0.0,
    };

    fn is_finite(&self) -> bool {
        self.scale.is_finite() && self.angle_z.is_finite() && self.angle_y.is_finite()
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scale={:.3} z={:.1}deg y={:.1}deg",
            self.scale,
            self.angle_z.to_degrees(),
            self.angle_y.to_degrees(),
        )
    }
}

/// Derives a new [`ControlState`] from the hands in `frame`.
///
/// Returns `Ok(None)` unless `frame` contains exactly two hands: a single hand (or none) is
/// treated as a tracking gap, not as a reason to reset the object.
///
/// - `scale` is the distance between both palm centers, plus 1.
/// - `angle_z` is the negated angle of the line from the first to the second palm center, in the
///   image plane.
/// - `angle_y` is the negated average of each hand's tilt, measured between palm center and thumb
///   tip in the Y/Z plane.
pub fn derive(frame: &FrameObservation) -> Result<Option<ControlState>> {
    let Some((h0, h1)) = frame.hands().iter().collect_tuple() else {
        return Ok(None);
    };

    let palm0 = h0.palm_center(0)?;
    let palm1 = h1.palm_center(1)?;
    let tilt0 = tilt(h0, 0)?;
    let tilt1 = tilt(h1, 1)?;

    let state = ControlState {
        scale: distance(palm0, palm1) + 1.0,
        angle_z: -twist(palm0, palm1) * DEG_TO_RAD,
        angle_y: -((tilt0 + tilt1) / 2.0) * DEG_TO_RAD,
    };

    if !state.is_finite() {
        // Non-finite landmarks poison the whole triple; report the first offending hand.
        let hand = if h0.landmarks().iter().all(Landmark::is_finite) {
            1
        } else {
            0
        };
        return Err(Error::MalformedObservation {
            hand,
            landmarks: frame.hands()[hand]
                .landmarks()
                .iter()
                .filter(|lm| lm.is_finite())
                .count(),
        });
    }

    Ok(Some(state))
}

/// Angle in degrees of the line pointing from `from` to `to` in the image plane.
fn twist(from: Landmark, to: Landmark) -> f32 {
    planar_angle(to, from, Axis::X, Axis::Y)
}

fn tilt(hand: &HandObservation, index: usize) -> Result<f32> {
    Ok(planar_angle(
        hand.palm_center(index)?,
        hand.thumb_tip(index)?,
        Axis::Y,
        Axis::Z,
    ))
}

/// Derives the control values from `frame` and publishes them through `writer`.
///
/// The cell is only written when derivation yields a new state; the previous state is retained
/// when `frame` does not contain two hands or is malformed.
pub fn update(
    writer: &mut ControlWriter,
    frame: &FrameObservation,
) -> Result<Option<ControlState>> {
    let state = derive(frame)?;
    if let Some(state) = state {
        writer.set(state);
    }
    Ok(state)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Slot {
    state: ControlState,
    generation: u64,
}

const INITIAL_SLOT: Slot = Slot {
    state: ControlState::IDENTITY,
    generation: 0,
};

/// Creates a connected pair of [`ControlWriter`] and [`ControlReader`], holding
/// [`ControlState::IDENTITY`].
pub fn cell() -> (ControlWriter, ControlReader) {
    let writer = ControlWriter {
        value: Value::new(INITIAL_SLOT),
        last: INITIAL_SLOT,
    };
    let reader = writer.reader();
    (writer, reader)
}

/// The writing half of a control cell.
///
/// There is exactly one writer per cell, so this type is not [`Clone`].
pub struct ControlWriter {
    value: Value<Slot>,
    last: Slot,
}

impl ControlWriter {
    /// Replaces the whole state in one step.
    pub fn set(&mut self, state: ControlState) {
        self.last = Slot {
            state,
            generation: self.last.generation + 1,
        };
        self.value.set(self.last);
    }

    /// Creates a new reader connected to this writer.
    pub fn reader(&self) -> ControlReader {
        ControlReader {
            reader: self.value.reader(),
            last: self.last,
        }
    }
}

/// A reading handle to a control cell.
///
/// Once the [`ControlWriter`] is gone, readers keep returning the last state it published.
#[derive(Clone)]
pub struct ControlReader {
    reader: Reader<Slot>,
    last: Slot,
}

impl ControlReader {
    fn refresh(&mut self) -> Slot {
        if self.reader.has_changed() {
            if let Ok(slot) = self.reader.get() {
                self.last = slot;
            }
        }
        self.last
    }

    /// Returns the most recently published state.
    pub fn get(&mut self) -> ControlState {
        self.refresh().state
    }

    /// Returns the number of updates published so far.
    pub fn generation(&mut self) -> u64 {
        self.refresh().generation
    }

    /// Returns the current state together with its generation, read in one step.
    pub fn snapshot(&mut self) -> (ControlState, u64) {
        let slot = self.refresh();
        (slot.state, slot.generation)
    }
}

impl fmt::Debug for ControlReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlReader")
            .field("state", &self.last.state)
            .field("generation", &self.last.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_relative_eq;

    use crate::{
        hand::{HandObservation, NUM_LANDMARKS},
        test::{hand_at, hand_with, two_hands},
    };

    use super::*;

    #[test]
    fn fewer_than_two_hands_is_ignored() {
        let (mut writer, mut reader) = cell();
        writer.set(ControlState {
            scale: 3.0,
            angle_z: 0.5,
            angle_y: -0.5,
        });
        let before = reader.snapshot();

        for frame in [
            FrameObservation::empty(),
            FrameObservation::new(vec![hand_at([0.5, 0.5, 0.0])]),
        ] {
            assert_eq!(update(&mut writer, &frame), Ok(None));
            assert_eq!(reader.snapshot(), before);
        }
    }

    #[test]
    fn three_hands_are_ignored() {
        let (mut writer, mut reader) = cell();
        let frame: FrameObservation = [
            hand_at([0.0, 0.0, 0.0]),
            hand_at([1.0, 0.0, 0.0]),
            hand_at([0.0, 1.0, 0.0]),
        ]
        .into_iter()
        .collect();
        assert_eq!(update(&mut writer, &frame), Ok(None));
        assert_eq!(reader.generation(), 0);
        assert_eq!(reader.get(), ControlState::IDENTITY);
    }

    #[test]
    fn scale_is_palm_distance_plus_one() {
        let state = derive(&two_hands([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]))
            .unwrap()
            .unwrap();
        assert_relative_eq!(state.scale, 2.0);
        assert_relative_eq!(state.angle_z, 0.0);
    }

    #[test]
    fn coincident_palms_yield_unit_scale() {
        let state = derive(&two_hands([0.4, 0.4, 0.0], [0.4, 0.4, 0.0]))
            .unwrap()
            .unwrap();
        assert_eq!(state.scale, 1.0);
        assert_eq!(state.angle_z, 0.0);
    }

    #[test]
    fn vertical_palms_twist_by_quarter_turn() {
        let state = derive(&two_hands([0.0, 0.0, 0.0], [0.0, 1.0, 0.0]))
            .unwrap()
            .unwrap();
        assert_relative_eq!(state.angle_z, -FRAC_PI_2, epsilon = 1e-5);
        assert_relative_eq!(state.scale, 2.0);
    }

    #[test]
    fn opposite_tilts_cancel() {
        // tilt = atan2(dz, dy) between palm and thumb tip: 10 and -10 degrees.
        let (s, c) = 10f32.to_radians().sin_cos();
        let h0 = hand_with([0.0, 0.0, 0.0], [0.0, -c, -s]);
        let h1 = hand_with([1.0, 0.0, 0.0], [1.0, -c, s]);
        let state = derive(&FrameObservation::new(vec![h0, h1]))
            .unwrap()
            .unwrap();
        assert_relative_eq!(state.angle_y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn tilt_is_averaged() {
        let (s, c) = 30f32.to_radians().sin_cos();
        let h0 = hand_with([0.0, 0.0, 0.0], [0.0, -c, -s]);
        let h1 = hand_with([1.0, 0.0, 0.0], [1.0, -1.0, 0.0]);
        let state = derive(&FrameObservation::new(vec![h0, h1]))
            .unwrap()
            .unwrap();
        assert_relative_eq!(state.angle_y, -15f32.to_radians(), epsilon = 1e-5);
    }

    #[test]
    fn two_hands_update_the_cell() {
        let (mut writer, mut reader) = cell();
        let state = update(&mut writer, &two_hands([0.0, 0.0, 0.0], [0.0, 1.0, 0.0]))
            .unwrap()
            .unwrap();
        assert_eq!(reader.get(), state);
        assert_eq!(reader.generation(), 1);
    }

    #[test]
    fn malformed_hand_keeps_previous_state() {
        let (mut writer, mut reader) = cell();
        update(&mut writer, &two_hands([0.0, 0.0, 0.0], [1.0, 0.0, 0.0])).unwrap();
        let before = reader.snapshot();

        let truncated = HandObservation::new(vec![Landmark::default(); NUM_LANDMARKS - 1]);
        let frame = FrameObservation::new(vec![hand_at([0.0, 0.0, 0.0]), truncated]);
        assert_eq!(
            update(&mut writer, &frame),
            Err(Error::MalformedObservation {
                hand: 1,
                landmarks: NUM_LANDMARKS - 1
            })
        );
        assert_eq!(reader.snapshot(), before);
    }

    #[test]
    fn non_finite_landmarks_are_malformed() {
        let (mut writer, mut reader) = cell();
        let frame = FrameObservation::new(vec![
            hand_at([f32::NAN, 0.0, 0.0]),
            hand_at([1.0, 0.0, 0.0]),
        ]);
        assert!(matches!(
            update(&mut writer, &frame),
            Err(Error::MalformedObservation { hand: 0, .. })
        ));
        assert_eq!(reader.generation(), 0);
    }

    #[test]
    fn reader_outlives_writer() {
        let (mut writer, mut reader) = cell();
        let state = update(&mut writer, &two_hands([0.0, 0.0, 0.0], [0.0, 1.0, 0.0]))
            .unwrap()
            .unwrap();
        let mut late = writer.reader();
        drop(writer);

        for _ in 0..2 {
            assert_eq!(reader.snapshot(), (state, 1));
            assert_eq!(late.get(), state);
        }
    }

    #[test]
    fn readers_see_complete_triples() {
        let (mut writer, mut reader) = cell();
        let a = ControlState {
            scale: 1.0,
            angle_z: 1.0,
            angle_y: 1.0,
        };
        let b = ControlState {
            scale: 2.0,
            angle_z: 2.0,
            angle_y: 2.0,
        };

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..10_000 {
                    writer.set(if i % 2 == 0 { a } else { b });
                }
            });
            let mut reader = reader.clone();
            s.spawn(move || {
                for _ in 0..10_000 {
                    let state = reader.get();
                    assert!(
                        state == a || state == b || state == ControlState::IDENTITY,
                        "torn read: {state:?}"
                    );
                }
            });
        });
        assert_eq!(reader.generation(), 10_000);
    }
}
