//! Landmark points and the geometry used to turn them into control values.

use std::{f32::consts::PI, fmt};

use nalgebra::Point3;

type Position = [f32; 3];

/// A landmark in 3D space, in the detector's normalized coordinate system.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy, Default)]
pub struct Landmark {
    pos: Position,
}

impl Landmark {
    pub const fn new(position: Position) -> Self {
        Self { pos: position }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Returns the coordinate along `axis`.
    #[inline]
    pub fn coord(&self, axis: Axis) -> f32 {
        self.pos[axis as usize]
    }

    #[inline]
    pub fn point(&self) -> Point3<f32> {
        Point3::from(self.pos)
    }

    pub fn is_finite(&self) -> bool {
        self.pos.iter().all(|c| c.is_finite())
    }
}

impl From<Position> for Landmark {
    fn from(pos: Position) -> Self {
        Self::new(pos)
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x(), self.y(), self.z())
    }
}

/// A coordinate axis of a [`Landmark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

/// Computes the Euclidean distance between two landmarks.
pub fn distance(a: Landmark, b: Landmark) -> f32 {
    nalgebra::distance(&a.point(), &b.point())
}

/// Computes the angle of the vector pointing from `b` to `a`, projected onto the plane spanned by
/// `axis1` and `axis2`.
///
/// The angle is measured from `axis1` towards `axis2` and returned in degrees, in the range
/// `(-180, 180]`. Projecting onto X/Y yields the "twist" of a line in the image plane, projecting
/// onto Y/Z yields its "tilt" towards or away from the camera.
///
/// If both deltas are zero, the result is 0.
pub fn planar_angle(a: Landmark, b: Landmark, axis1: Axis, axis2: Axis) -> f32 {
    let d1 = a.coord(axis1) - b.coord(axis1);
    let d2 = a.coord(axis2) - b.coord(axis2);
    let radians = d2.atan2(d1);
    let degrees = radians.to_degrees();
    if radians <= -PI || degrees <= -180.0 {
        // `atan2(-0.0, negative)` is `-pi`
        degrees + 360.0
    } else {
        degrees
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn random_landmark(rng: &mut fastrand::Rng) -> Landmark {
        Landmark::new([
            rng.f32() * 2.0 - 1.0,
            rng.f32() * 2.0 - 1.0,
            rng.f32() * 2.0 - 1.0,
        ])
    }

    #[test]
    fn distance_known_values() {
        let origin = Landmark::default();
        assert_eq!(distance(origin, Landmark::new([1.0, 0.0, 0.0])), 1.0);
        assert_eq!(distance(origin, Landmark::new([0.0, 3.0, 4.0])), 5.0);
        assert_relative_eq!(
            distance(Landmark::new([1.0, 1.0, 1.0]), Landmark::new([2.0, 2.0, 2.0])),
            3.0f32.sqrt()
        );
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..1000 {
            let a = random_landmark(&mut rng);
            let b = random_landmark(&mut rng);
            assert_eq!(distance(a, b), distance(b, a));
            assert_eq!(distance(a, a), 0.0);
            assert!(distance(a, b) >= 0.0);
        }
    }

    #[test]
    fn planar_angle_quadrants() {
        let b = Landmark::default();
        let angle = |a: [f32; 3]| planar_angle(Landmark::new(a), b, Axis::X, Axis::Y);

        assert_eq!(angle([1.0, 0.0, 0.0]), 0.0);
        assert_relative_eq!(angle([0.0, 1.0, 0.0]), 90.0, epsilon = 1e-4);
        assert_relative_eq!(angle([-1.0, 0.0, 0.0]), 180.0, epsilon = 1e-4);
        assert_relative_eq!(angle([0.0, -1.0, 0.0]), -90.0, epsilon = 1e-4);
        assert_relative_eq!(angle([1.0, 1.0, 0.0]), 45.0, epsilon = 1e-4);
        // Z does not contribute to the X/Y plane.
        assert_relative_eq!(angle([1.0, 1.0, 7.0]), 45.0, epsilon = 1e-4);
    }

    #[test]
    fn planar_angle_measures_from_b_to_a() {
        let a = Landmark::new([0.0, 1.0, 0.0]);
        let b = Landmark::default();
        assert_relative_eq!(planar_angle(a, b, Axis::X, Axis::Y), 90.0, epsilon = 1e-4);
        assert_relative_eq!(planar_angle(b, a, Axis::X, Axis::Y), -90.0, epsilon = 1e-4);
    }

    #[test]
    fn planar_angle_tilt_plane() {
        let palm = Landmark::new([0.3, 0.0, 0.0]);
        let thumb = Landmark::new([-5.0, -1.0, -1.0]);
        assert_relative_eq!(planar_angle(palm, thumb, Axis::Y, Axis::Z), 45.0, epsilon = 1e-4);
    }

    #[test]
    fn planar_angle_degenerate() {
        let a = Landmark::new([0.5, 0.5, 0.5]);
        assert_eq!(planar_angle(a, a, Axis::X, Axis::Y), 0.0);
    }

    #[test]
    fn planar_angle_never_returns_minus_180() {
        let a = Landmark::new([-1.0, -0.0, 0.0]);
        let b = Landmark::new([0.0, 0.0, 0.0]);
        assert_relative_eq!(planar_angle(a, b, Axis::X, Axis::Y), 180.0, epsilon = 1e-4);
    }

    #[test]
    fn planar_angle_range() {
        let mut rng = fastrand::Rng::with_seed(42);
        let axes = [Axis::X, Axis::Y, Axis::Z];
        for _ in 0..1000 {
            let a = random_landmark(&mut rng);
            let b = random_landmark(&mut rng);
            let axis1 = axes[rng.usize(..3)];
            let axis2 = axes[rng.usize(..3)];
            let angle = planar_angle(a, b, axis1, axis2);
            assert!(angle > -180.0 && angle <= 180.0, "{angle} out of range");
        }
    }
}
