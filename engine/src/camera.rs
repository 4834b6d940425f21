use bitflags::bitflags;
use cgmath::{vec3, Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Vector3};

use crate::model::UniformBufferObject;

type Vec3 = Vector3<f32>;
type Mat4 = Matrix4<f32>;

const CAMERA_SPEED: f32 = 0.02;
const PITCH_STEP: f32 = 0.01;
const ROTATION_STEP: f32 = 0.1;
const DEGREES_PER_ROTATION_UNIT: f32 = 15.0;

const FIELD_OF_VIEW: Deg<f32> = Deg(30.0);
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 10.0;

bitflags! {
    /// Movement keys currently held down.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MovementKeys: u8 {
        const FORWARD = 1 << 0;
        const BACKWARD = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const PITCH_UP = 1 << 4;
        const PITCH_DOWN = 1 << 5;
        const ROTATE_LEFT = 1 << 6;
        const ROTATE_RIGHT = 1 << 7;
    }
}

impl MovementKeys {
    /// Applies a key transition to the held-key set.
    pub fn apply(&mut self, key: MovementKeys, pressed: bool) {
        if pressed {
            *self |= key;
        } else {
            *self &= !key;
        }
    }
}

/// Fly camera plus the accumulated model rotation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub front: Vec3,
    pub up: Vec3,
    pub rotation: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: vec3(2.0, 2.0, 2.0),
            front: vec3(-1.0, -1.0, -1.0).normalize(),
            up: vec3(0.0, 0.0, 1.0),
            rotation: 0.0,
        }
    }
}

impl Camera {
    /// Advances the camera by one fixed step for every held key.
    pub fn advance(&mut self, keys: MovementKeys) {
        if keys.contains(MovementKeys::FORWARD) {
            self.position += self.front * CAMERA_SPEED;
        }
        if keys.contains(MovementKeys::BACKWARD) {
            self.position -= self.front * CAMERA_SPEED;
        }

        let right = self.front.cross(self.up);
        if right.magnitude2() > f32::EPSILON {
            let right = right.normalize();
            if keys.contains(MovementKeys::LEFT) {
                self.position -= right * CAMERA_SPEED;
            }
            if keys.contains(MovementKeys::RIGHT) {
                self.position += right * CAMERA_SPEED;
            }
        }

        if keys.contains(MovementKeys::PITCH_UP) {
            self.front.x -= PITCH_STEP;
            self.front.y -= PITCH_STEP;
        }
        if keys.contains(MovementKeys::PITCH_DOWN) {
            self.front.x += PITCH_STEP;
            self.front.y += PITCH_STEP;
        }

        if keys.contains(MovementKeys::ROTATE_LEFT) {
            self.rotation -= ROTATION_STEP;
        }
        if keys.contains(MovementKeys::ROTATE_RIGHT) {
            self.rotation += ROTATION_STEP;
        }
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_angle_z(Deg(self.rotation * DEGREES_PER_ROTATION_UNIT))
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(Point3::from_vec(self.position), self.target(), self.up)
    }

    /// Perspective projection in Vulkan clip space.
    pub fn projection(&self, width: u32, height: u32) -> Mat4 {
        // cgmath targets OpenGL: flip Y and remap depth from [-1, 1] to [0, 1].
        #[rustfmt::skip]
        let correction = Mat4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, -1.0, 0.0, 0.0,
            0.0, 0.0, 1.0 / 2.0, 0.0,
            0.0, 0.0, 1.0 / 2.0, 1.0,
        );

        let aspect = width as f32 / height.max(1) as f32;
        correction * cgmath::perspective(FIELD_OF_VIEW, aspect, NEAR_PLANE, FAR_PLANE)
    }

    pub fn uniforms(&self, width: u32, height: u32) -> UniformBufferObject {
        UniformBufferObject {
            model: self.model(),
            view: self.view(),
            proj: self.projection(width, height),
        }
    }

    /// Point the camera looks at, one front vector ahead.
    pub fn target(&self) -> Point3<f32> {
        Point3::from_vec(self.position + self.front)
    }
}
