//! Vertex/index extraction: turns a [`RawMesh`] into a flat `MeshData`
//! with one chosen UV channel and per-vertex defaults for whatever the
//! source file left out.

use crate::mesh::{MeshData, MeshVertex};
use crate::scene::RawMesh;

/// UV transform applied in the fixed order scale -> rotation ->
/// translation. Rotation is counter-clockwise, in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvTransform {
    pub scale: [f32; 2],
    pub rotation: f32,
    pub translation: [f32; 2],
}

impl UvTransform {
    pub const IDENTITY: Self = Self {
        scale: [1.0, 1.0],
        rotation: 0.0,
        translation: [0.0, 0.0],
    };

    /// `uv' = rotate(uv * scale, rotation) + translation`.
    pub fn apply(&self, uv: [f32; 2]) -> [f32; 2] {
        let mut u = uv[0] * self.scale[0];
        let mut v = uv[1] * self.scale[1];
        if self.rotation != 0.0 {
            let (s, c) = self.rotation.sin_cos();
            (u, v) = (u * c - v * s, u * s + v * c);
        }
        [u + self.translation[0], v + self.translation[1]]
    }
}

impl Default for UvTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Pick the UV channel to feed the diffuse sampler: the material's
/// preferred channel when it exists on the mesh, otherwise the first
/// non-empty channel, otherwise none.
fn select_uv_channel(raw: &RawMesh) -> Option<&Vec<[f32; 2]>> {
    if let Some(preferred) = raw.material.preferred_uv_channel
        && let Some(channel) = raw.uv_channels.get(preferred)
        && !channel.is_empty()
    {
        return Some(channel);
    }
    raw.uv_channels.iter().find(|c| !c.is_empty())
}

/// Convert a raw mesh record into a vertex/index buffer pair.
///
/// - Positions are copied verbatim, order preserved.
/// - Normals default to the zero vector (unlit) when absent; no
///   recomputation is attempted.
/// - UVs come from the selected channel, transformed by the material's
///   UV transform when present, and default to (0,0).
/// - Faces are assumed triangulated upstream; each contributes exactly
///   three indices in source order, so `indices.len() % 3 == 0`.
pub fn extract(raw: &RawMesh) -> MeshData {
    let uv_channel = select_uv_channel(raw);
    let uv_transform = raw.material.uv_transform;

    let mut vertices = Vec::with_capacity(raw.positions.len());
    for (i, &position) in raw.positions.iter().enumerate() {
        let normal = raw
            .normals
            .as_ref()
            .and_then(|n| n.get(i).copied())
            .unwrap_or([0.0, 0.0, 0.0]);
        let mut uv = uv_channel
            .and_then(|c| c.get(i).copied())
            .unwrap_or([0.0, 0.0]);
        if let Some(t) = uv_transform {
            uv = t.apply(uv);
        }
        vertices.push(MeshVertex::new(position, normal, uv));
    }

    let mut indices = Vec::with_capacity(raw.faces.len() * 3);
    for face in &raw.faces {
        indices.extend_from_slice(face);
    }

    MeshData::new(vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::RawMaterial;

    fn triangle_raw() -> RawMesh {
        RawMesh {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: None,
            uv_channels: vec![],
            faces: vec![[0, 1, 2]],
            material: RawMaterial::default(),
        }
    }

    #[test]
    fn missing_normals_become_exact_zero() {
        let mesh = extract(&triangle_raw());
        for v in &mesh.vertices {
            assert_eq!(v.normal, [0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn missing_uvs_become_zero_and_indices_are_triangles() {
        let mesh = extract(&triangle_raw());
        assert_eq!(mesh.indices.len() % 3, 0);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        for v in &mesh.vertices {
            assert_eq!(v.uv, [0.0, 0.0]);
        }
    }

    #[test]
    fn preferred_uv_channel_wins_when_present() {
        let mut raw = triangle_raw();
        raw.uv_channels = vec![
            vec![[0.1, 0.1]; 3],
            vec![[0.9, 0.9]; 3],
        ];
        raw.material.preferred_uv_channel = Some(1);
        let mesh = extract(&raw);
        assert_eq!(mesh.vertices[0].uv, [0.9, 0.9]);
    }

    #[test]
    fn missing_preferred_channel_falls_back_to_first_nonempty() {
        let mut raw = triangle_raw();
        raw.uv_channels = vec![vec![], vec![[0.5, 0.25]; 3]];
        raw.material.preferred_uv_channel = Some(7);
        let mesh = extract(&raw);
        assert_eq!(mesh.vertices[0].uv, [0.5, 0.25]);
    }

    #[test]
    fn uv_transform_identity_is_noop() {
        let t = UvTransform::IDENTITY;
        for uv in [[0.0, 0.0], [0.25, 0.75], [-1.5, 3.0]] {
            assert_eq!(t.apply(uv), uv);
        }
    }

    #[test]
    fn uv_transform_quarter_turn() {
        let t = UvTransform {
            scale: [1.0, 1.0],
            rotation: std::f32::consts::FRAC_PI_2,
            translation: [0.0, 0.0],
        };
        let [u, v] = t.apply([1.0, 0.0]);
        assert!(u.abs() < 1e-5);
        assert!((v - 1.0).abs() < 1e-5);
    }

    #[test]
    fn uv_transform_scale_translate_without_rotation() {
        let t = UvTransform {
            scale: [2.0, 3.0],
            rotation: 0.0,
            translation: [0.5, -0.5],
        };
        assert_eq!(t.apply([1.0, 1.0]), [2.5, 2.5]);
        assert_eq!(t.apply([0.5, 2.0]), [1.5, 5.5]);
    }

    #[test]
    fn material_uv_transform_is_applied_per_vertex() {
        let mut raw = triangle_raw();
        raw.uv_channels = vec![vec![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]];
        raw.material.uv_transform = Some(UvTransform {
            scale: [2.0, 2.0],
            rotation: 0.0,
            translation: [1.0, 1.0],
        });
        let mesh = extract(&raw);
        assert_eq!(mesh.vertices[0].uv, [3.0, 1.0]);
        assert_eq!(mesh.vertices[1].uv, [1.0, 3.0]);
        assert_eq!(mesh.vertices[2].uv, [3.0, 3.0]);
    }
}
