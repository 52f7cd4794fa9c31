//! Core types shared by asset loading and rendering: math re-exports,
//! Transform, Camera. Renderer-agnostic.

pub use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, Vec4, vec2, vec3};

pub mod camera;
pub mod transform;

use thiserror::Error;

/// Errors from core math/validation helpers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Degenerate transform: {0}")]
    DegenerateTransform(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_is_identity_matrix() {
        let t = transform::Transform::identity();
        assert_eq!(t.matrix(), Mat4::IDENTITY);
    }
}
