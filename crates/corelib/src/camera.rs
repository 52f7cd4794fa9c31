use crate::{Mat4, Vec3};

/// Perspective camera (right-handed). The asset/draw pipeline only ever
/// consumes `proj_view()` and `position()`; input handling lives in the
/// platform layer.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    #[allow(clippy::too_many_arguments)]
    pub fn new_perspective(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y_rad: f32,
        z_near: f32,
        z_far: f32,
        aspect: f32,
    ) -> Self {
        Self {
            eye,
            target,
            up,
            fov_y_rad,
            z_near,
            z_far,
            aspect,
        }
    }

    /// World-space camera position (feeds the specular term).
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.eye
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// NOTE: OpenGL-style projection (z in [-1,1]); the renderer remaps
    /// to wgpu's [0,1] clip range.
    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_rad,
            self.aspect.max(1e-6),
            self.z_near,
            self.z_far,
        )
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }

    #[inline]
    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3;

    #[test]
    fn target_maps_to_view_axis() {
        let cam = Camera::new_perspective(
            vec3(0.0, 0.0, 4.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            0.1,
            100.0,
            16.0 / 9.0,
        );
        // Looking down -Z: the target lands on the negative view z axis.
        let v = cam.view().transform_point3(Vec3::ZERO);
        assert!((v - vec3(0.0, 0.0, -4.0)).length() < 1e-5);
    }
}
