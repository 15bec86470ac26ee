use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::gpu::ViewUniforms;

/// Caller-supplied placement of the main camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 8.0],
            target: [0.0, 0.0, 0.0],
            fov_degrees: 36.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        half_width: f32,
        half_height: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    pub fn near(&self) -> f32 {
        match *self {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    pub fn far(&self) -> f32 {
        match *self {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                half_width,
                half_height,
                near,
                far,
            } => Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Camera {
    pub fn perspective(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            position: Vec3::from_array(config.position),
            target: Vec3::from_array(config.target),
            up: Vec3::Y,
            projection: Projection::Perspective {
                fov_y: config.fov_degrees.to_radians(),
                aspect: sanitize_aspect(aspect),
                near: config.near,
                far: config.far,
            },
        }
    }

    /// Top-down orthographic camera looking along -Y
    ///
    /// Used by the contact shadow: the box spans `width` x `depth` on the
    /// ground and `height` upwards from `origin`.
    pub fn top_down(origin: Vec3, width: f32, depth: f32, height: f32) -> Self {
        Self {
            position: origin,
            target: origin + Vec3::Y,
            // Looking straight up, so pick +Z as the image "up"
            up: Vec3::Z,
            projection: Projection::Orthographic {
                half_width: width * 0.5,
                half_height: depth * 0.5,
                near: 0.0,
                far: height,
            },
        }
    }

    /// Update the perspective aspect ratio; orthographic cameras ignore it
    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: current, .. } = &mut self.projection {
            *current = sanitize_aspect(aspect);
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection.matrix() * self.view()
    }

    pub fn uniforms(&self) -> ViewUniforms {
        ViewUniforms {
            view_proj: self.view_proj(),
            camera_position: self.position,
            near: self.projection.near(),
            far: self.projection.far(),
        }
    }
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perspective_uses_config() {
        let config = CameraConfig {
            position: [0.0, 1.0, 5.0],
            ..CameraConfig::default()
        };
        let camera = Camera::perspective(&config, 2.0);

        assert_eq!(camera.position, Vec3::new(0.0, 1.0, 5.0));
        assert!(matches!(
            camera.projection,
            Projection::Perspective { aspect, .. } if aspect == 2.0
        ));
    }

    #[test]
    fn zero_aspect_falls_back_to_square() {
        let mut camera = Camera::perspective(&CameraConfig::default(), 0.0);
        assert!(matches!(
            camera.projection,
            Projection::Perspective { aspect, .. } if aspect == 1.0
        ));

        camera.set_aspect(f32::NAN);
        assert!(matches!(
            camera.projection,
            Projection::Perspective { aspect, .. } if aspect == 1.0
        ));
    }

    #[test]
    fn top_down_sees_ground_in_front() {
        let camera = Camera::top_down(Vec3::new(0.0, -0.5, 0.0), 2.0, 2.0, 1.0);
        let clip = camera.view_proj().project_point3(Vec3::new(0.0, 0.0, 0.0));

        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&clip.z));
    }

    #[test]
    fn orthographic_ignores_aspect() {
        let mut camera = Camera::top_down(Vec3::ZERO, 4.0, 4.0, 1.0);
        let before = camera.projection;
        camera.set_aspect(3.0);
        assert_eq!(camera.projection, before);
    }
}
