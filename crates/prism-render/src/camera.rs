//! First-person fly camera.

use glam::{Mat4, Vec2, Vec3};

/// Lowest eye height, just above the ground slab.
pub const MIN_HEIGHT: f32 = -5.7;

/// Movement and look input sampled for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    /// Shift held
    pub fast: bool,
    /// Ctrl held
    pub faster: bool,
    /// Mouse movement in pixels while looking around
    pub look_delta: Vec2,
}

impl CameraInput {
    /// Movement direction in camera space: x right, y up, z forward.
    pub fn movement(&self) -> Vec3 {
        let axis = |pos: bool, neg: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
        Vec3::new(
            axis(self.right, self.left),
            axis(self.up, self.down),
            axis(self.forward, self.back),
        )
    }
}

/// Camera for rendering.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    /// Rotation about the world up axis, radians
    pub yaw: f32,
    /// Rotation above the horizon, radians
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Radians per pixel of look input
    pub rotation_speed: f32,
    /// Units per second
    pub move_speed: f32,
    /// Speed multipliers for Shift and Ctrl
    pub speed_up_scales: (f32, f32),
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(7.0, -0.5, -16.5),
            yaw: 0.48,
            pitch: -0.145,
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
            rotation_speed: 0.005,
            move_speed: 5.0,
            speed_up_scales: (5.0, 10.0),
        }
    }
}

impl Camera {
    const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

    /// Unit view direction.
    pub fn direction(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(-sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch)
    }

    /// Unit vector to the right of the view direction.
    pub fn right(&self) -> Vec3 {
        self.direction().cross(Vec3::Y).normalize()
    }

    /// Apply one frame of input. The eye never drops below [`MIN_HEIGHT`].
    pub fn update(&mut self, input: &CameraInput, dt: f32) {
        self.yaw += input.look_delta.x * self.rotation_speed;
        self.pitch = (self.pitch - input.look_delta.y * self.rotation_speed)
            .clamp(-Self::MAX_PITCH, Self::MAX_PITCH);

        let movement = input.movement();
        if movement != Vec3::ZERO {
            let mut speed = self.move_speed;
            if input.faster {
                speed *= self.speed_up_scales.1;
            } else if input.fast {
                speed *= self.speed_up_scales.0;
            }
            let world = self.right() * movement.x + Vec3::Y * movement.y + self.direction() * movement.z;
            self.position += world.normalize() * speed * dt;
        }

        self.position.y = self.position.y.max(MIN_HEIGHT);
    }

    /// Recompute the aspect ratio for a viewport. Zero sizes are ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction(), Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Maps normalized device coordinates back to world space.
    pub fn inverse_view_projection_matrix(&self) -> Mat4 {
        self.view_projection_matrix().inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_pose_looks_at_the_scene() {
        let camera = Camera::default();
        let dir = camera.direction();
        assert_relative_eq!(dir.length(), 1.0, epsilon = 1e-6);
        // Toward the origin from (7, -0.5, -16.5), slightly downward
        assert!(dir.x < 0.0);
        assert!(dir.y < 0.0);
        assert!(dir.z > 0.0);
    }

    #[test]
    fn height_is_clamped() {
        let mut camera = Camera {
            position: Vec3::new(0.0, -5.6, 0.0),
            ..Camera::default()
        };
        let input = CameraInput {
            down: true,
            ..CameraInput::default()
        };
        camera.update(&input, 1.0);
        assert_relative_eq!(camera.position.y, MIN_HEIGHT);

        camera.position.y = -20.0;
        camera.update(&CameraInput::default(), 0.0);
        assert_relative_eq!(camera.position.y, MIN_HEIGHT);
    }

    #[test]
    fn speed_modifiers() {
        let input = CameraInput {
            up: true,
            ..CameraInput::default()
        };
        let mut camera = Camera::default();
        let start = camera.position.y;
        camera.update(&input, 0.1);
        assert_relative_eq!(camera.position.y - start, 0.5, epsilon = 1e-5);

        let mut camera = Camera::default();
        camera.update(
            &CameraInput {
                fast: true,
                ..input
            },
            0.1,
        );
        assert_relative_eq!(camera.position.y - start, 2.5, epsilon = 1e-5);

        let mut camera = Camera::default();
        camera.update(
            &CameraInput {
                fast: true,
                faster: true,
                ..input
            },
            0.1,
        );
        assert_relative_eq!(camera.position.y - start, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn look_rotates_and_clamps_pitch() {
        let mut camera = Camera::default();
        camera.update(
            &CameraInput {
                look_delta: Vec2::new(100.0, 0.0),
                ..CameraInput::default()
            },
            0.0,
        );
        assert_relative_eq!(camera.yaw, 0.98, epsilon = 1e-6);

        camera.update(
            &CameraInput {
                look_delta: Vec2::new(0.0, -10_000.0),
                ..CameraInput::default()
            },
            0.0,
        );
        assert!(camera.pitch < std::f32::consts::FRAC_PI_2);
        assert!(camera.direction().is_finite());
    }

    #[test]
    fn viewport_updates_aspect() {
        let mut camera = Camera::default();
        camera.set_viewport(800, 400);
        assert_relative_eq!(camera.aspect, 2.0);
        camera.set_viewport(0, 400);
        assert_relative_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn inverse_view_projection_reaches_eye_ray() {
        let camera = Camera::default();
        let inv = camera.inverse_view_projection_matrix();
        // Screen center on the far plane lies along the view direction
        let far = inv.project_point3(Vec3::new(0.0, 0.0, 1.0));
        let ray = (far - camera.position).normalize();
        assert!(ray.abs_diff_eq(camera.direction(), 1e-4));
    }
}
