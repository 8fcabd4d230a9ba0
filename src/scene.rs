//! The scene rendering capability and the static scene it displays.

use nalgebra::{Matrix4, Point3, Similarity3, Translation3, UnitQuaternion, Vector3};

use crate::{control::ControlState, error::Result};

/// An RGB color, `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u32);

impl Color {
    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }
}

/// Linear distance fog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub color: Color,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: Point3<f32>,
}

/// Orthographic frustum used to render a directional light's shadow map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCamera {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Color,
    pub position: Point3<f32>,
    pub shadow: Option<ShadowCamera>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub sky: Color,
    pub ground: Color,
    pub position: Point3<f32>,
}

/// Everything in the scene except the controlled object.
///
/// The default is a light grey, fogged backdrop, lit from far above by a warm directional light
/// and a dim hemisphere light, and seen by a wide-angle camera slightly above the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSetup {
    pub background: Color,
    pub fog: Option<Fog>,
    pub camera: PerspectiveCamera,
    pub directional_light: DirectionalLight,
    pub hemisphere_light: HemisphereLight,
}

impl Default for SceneSetup {
    fn default() -> Self {
        let grey = Color(0xa0a0a0);
        Self {
            background: grey,
            fog: Some(Fog {
                color: grey,
                near: 10.0,
                far: 50.0,
            }),
            camera: PerspectiveCamera {
                fov: 90.0,
                near: 1.0,
                far: 100.0,
                position: Point3::new(0.0, 1.0, 9.0),
            },
            directional_light: DirectionalLight {
                color: Color(0xf7e5df),
                position: Point3::new(3.0, 1000.0, 2500.0),
                shadow: Some(ShadowCamera {
                    top: 2.0,
                    bottom: -2.0,
                    left: -2.0,
                    right: 2.0,
                    near: 0.06,
                    far: 4000.0,
                }),
            },
            hemisphere_light: HemisphereLight {
                sky: Color(0x707070),
                ground: Color(0x444444),
                position: Point3::new(0.0, 120.0, 0.0),
            },
        }
    }
}

/// Scale and rotation to apply to the controlled object.
///
/// The rotation is given as intrinsic Euler angles in radians around X, then Y, then Z, so the
/// rotation matrix is `Rx * Ry * Rz`. The object is never translated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f32,
    pub rotation: [f32; 3],
}

impl Transform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        rotation: [0.0; 3],
    };

    /// Returns the object's orientation as a quaternion.
    pub fn orientation(&self) -> UnitQuaternion<f32> {
        let [x, y, z] = self.rotation;
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x)
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), y)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), z)
    }

    /// Returns the model matrix for this transform.
    pub fn matrix(&self) -> Matrix4<f32> {
        Similarity3::from_parts(Translation3::identity(), self.orientation(), self.scale)
            .to_homogeneous()
    }
}

impl From<ControlState> for Transform {
    fn from(state: ControlState) -> Self {
        Self {
            scale: state.scale,
            rotation: [0.0, state.angle_y, state.angle_z],
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Trait implemented by 3D scene renderers.
///
/// All methods are called from the render loop's thread.
pub trait SceneRenderer: Send + 'static {
    /// Handle to an object in the scene, produced by the matching [`ObjectLoader`].
    type Object: Send + 'static;

    /// Builds the static scene. Called once, before the first frame.
    fn setup(&mut self, scene: &SceneSetup);

    /// Sets the scale and rotation of `object`.
    fn apply_transform(&mut self, object: &mut Self::Object, transform: &Transform);

    /// Renders one frame of the scene, including any loaded object.
    fn render_frame(&mut self);
}

/// Trait implemented by 3D asset loaders.
///
/// Loading runs on its own task, so that the render loop keeps rendering while the asset loads.
pub trait ObjectLoader: Send + 'static {
    type Object: Send + 'static;

    /// Loads the object at `uri` and adds it to the scene.
    ///
    /// Fails with [`Error::AssetLoadError`].
    ///
    /// [`Error::AssetLoadError`]: crate::Error::AssetLoadError
    fn load_object(&mut self, uri: &str) -> Result<Self::Object>;
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn default_scene() {
        let scene = SceneSetup::default();
        assert_eq!(scene.background, Color(0xa0a0a0));
        assert_eq!(scene.camera.position, Point3::new(0.0, 1.0, 9.0));
        let shadow = scene.directional_light.shadow.unwrap();
        assert_eq!((shadow.near, shadow.far), (0.06, 4000.0));
    }

    #[test]
    fn color_channels() {
        let c = Color(0xf7e5df);
        assert_eq!((c.r(), c.g(), c.b()), (0xf7, 0xe5, 0xdf));
    }

    #[test]
    fn transform_from_control_state() {
        let transform = Transform::from(ControlState {
            scale: 2.0,
            angle_z: -FRAC_PI_2,
            angle_y: 0.25,
        });
        assert_eq!(transform.scale, 2.0);
        assert_eq!(transform.rotation, [0.0, 0.25, -FRAC_PI_2]);
        assert_eq!(Transform::from(ControlState::IDENTITY), Transform::IDENTITY);
    }

    #[test]
    fn transform_matrix() {
        let transform = Transform {
            scale: 2.0,
            rotation: [0.0, 0.0, -FRAC_PI_2],
        };
        // A quarter turn clockwise around Z maps +X to -Y, then scales.
        let p = transform.matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.coords, Vector3::new(0.0, -2.0, 0.0), epsilon = 1e-6);

        assert_relative_eq!(Transform::IDENTITY.matrix(), Matrix4::identity());
    }

    #[test]
    fn tilt_and_twist_compose_around_z_first() {
        let (y, z) = (0.5f32, 1.0f32);
        let transform = Transform {
            scale: 1.0,
            rotation: [0.0, y, z],
        };
        let p = transform.orientation() * Vector3::x();

        // Rz turns +X within the XY plane, then Ry tilts the result out of it.
        let (sz, cz) = z.sin_cos();
        let (sy, cy) = y.sin_cos();
        assert_relative_eq!(p, Vector3::new(cz * cy, sz, -cz * sy), epsilon = 1e-6);
        assert_relative_eq!(p, Vector3::new(0.4742, 0.8415, -0.2590), epsilon = 1e-4);
    }
}
