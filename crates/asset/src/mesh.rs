//! CPU-side mesh representation shared by the format front ends and the
//! GPU uploader.

/// Vertex as uploaded to the GPU. Positions are in model space; normals
/// are unit-length when the source file provided them and exactly zero
/// otherwise (the shader treats a zero normal as "unlit").
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// Constant (1,1,1): there is no per-vertex color import path.
    pub color: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            color: [1.0, 1.0, 1.0],
        }
    }
}

/// Indexed triangle mesh with tightly-packed vertices.
///
/// Indices are u32 triangle-list, `len % 3 == 0` for every mesh produced
/// by the extractor. Vertex order is preserved from the source file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_data_validity() {
        let data = MeshData::new(vec![MeshVertex::default()], vec![0, 0, 0]);
        assert!(data.is_valid());
        assert_eq!(data.triangle_count(), 1);
        assert!(!MeshData::default().is_valid());
    }

    #[test]
    fn vertex_color_is_constant_white() {
        let v = MeshVertex::new([0.0; 3], [0.0; 3], [0.0; 2]);
        assert_eq!(v.color, [1.0, 1.0, 1.0]);
    }
}
