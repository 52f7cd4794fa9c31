//! Format-agnostic scene graph and the flattener that turns it into a
//! flat list of (mesh, world-transform) pairs.
//!
//! The glTF and FBX front ends both parse into this intermediate graph;
//! everything downstream (extraction, material binding, upload) is
//! format-independent.

use glam::Mat4;
use thiserror::Error;

use crate::extract::UvTransform;

/// Texture slot as declared by the source material, before binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TextureSlot {
    /// PBR base color (glTF metallic-roughness).
    BaseColor,
    /// Classic diffuse (FBX `DiffuseColor`, glTF spec-gloss extension).
    Diffuse,
    Specular,
    /// Any other slot the format exposes; used only as a last resort.
    Unknown,
}

/// A material's reference to a texture, unresolved.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTextureRef {
    /// Path string as written in the file. Embedded payloads are encoded
    /// as `*N` markers (the source-format convention) or `data:` URIs;
    /// the resolver maps those to the fallback texture.
    pub raw_path: String,
    pub slot: TextureSlot,
}

/// Material data the extractor and binder care about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMaterial {
    /// Texture references in source declaration order.
    pub texture_refs: Vec<RawTextureRef>,
    /// UV channel the material's texture mapping asks for, if any.
    pub preferred_uv_channel: Option<usize>,
    /// Optional UV transform (scale, then rotate, then translate).
    pub uv_transform: Option<UvTransform>,
    /// Human-readable name for diagnostics.
    pub name: String,
}

/// One mesh as parsed from the file: already triangulated, attributes
/// still in per-channel form. The extractor turns this into `MeshData`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMesh {
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex normals, parallel to `positions`, when the file has them.
    pub normals: Option<Vec<[f32; 3]>>,
    /// UV channels in channel order; each is parallel to `positions`.
    pub uv_channels: Vec<Vec<[f32; 2]>>,
    /// Triangles, three indices each, in source face order.
    pub faces: Vec<[u32; 3]>,
    pub material: RawMaterial,
}

/// Node of the intermediate scene graph. Immutable once built; the
/// flattener only reads it.
#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    /// Local transform in glam's column-major convention. Front ends are
    /// responsible for converting from their format's convention.
    pub local_transform: Mat4,
    /// Indices into [`SceneGraph::meshes`].
    pub mesh_indices: Vec<usize>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(local_transform: Mat4) -> Self {
        Self {
            local_transform,
            mesh_indices: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Parsed model: a node tree plus the mesh records it references.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    pub root: SceneNode,
    pub meshes: Vec<RawMesh>,
}

/// Recursion limit for the flattener. Real assets nest a few dozen
/// levels at most; hitting this means the hierarchy is malformed.
pub const MAX_NODE_DEPTH: usize = 256;

#[derive(Debug, Error)]
#[error("node hierarchy deeper than {MAX_NODE_DEPTH} levels; tree is cyclic or malformed")]
pub struct HierarchyTooDeep;

/// Flatten the node tree into (mesh-index, resolved-transform) pairs.
///
/// Depth-first pre-order; a node's accumulated transform is
/// `parent * local`. Emission order is traversal order and is stable for
/// a given tree. Returns an error instead of recursing unboundedly when
/// the tree exceeds [`MAX_NODE_DEPTH`].
pub fn flatten(root: &SceneNode) -> Result<Vec<(usize, Mat4)>, HierarchyTooDeep> {
    let mut out = Vec::new();
    flatten_into(root, Mat4::IDENTITY, 0, &mut out)?;
    Ok(out)
}

fn flatten_into(
    node: &SceneNode,
    parent: Mat4,
    depth: usize,
    out: &mut Vec<(usize, Mat4)>,
) -> Result<(), HierarchyTooDeep> {
    if depth > MAX_NODE_DEPTH {
        return Err(HierarchyTooDeep);
    }
    let accumulated = parent * node.local_transform;
    for &mesh_index in &node.mesh_indices {
        out.push((mesh_index, accumulated));
    }
    for child in &node.children {
        flatten_into(child, accumulated, depth + 1, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    fn chain_with_translations() -> SceneNode {
        // root -> child1 -> child2, each carrying one mesh.
        let mut root = SceneNode::new(Mat4::from_translation(vec3(1.0, 0.0, 0.0)));
        root.mesh_indices.push(0);
        let mut child1 = SceneNode::new(Mat4::from_translation(vec3(0.0, 2.0, 0.0)));
        child1.mesh_indices.push(1);
        let mut child2 = SceneNode::new(Mat4::from_translation(vec3(0.0, 0.0, 3.0)));
        child2.mesh_indices.push(2);
        child1.children.push(child2);
        root.children.push(child1);
        root
    }

    #[test]
    fn flatten_accumulates_down_the_chain() {
        let root = chain_with_translations();
        let flat = flatten(&root).expect("flatten chain");
        assert_eq!(flat.len(), 3);

        let m0 = Mat4::from_translation(vec3(1.0, 0.0, 0.0));
        let m1 = m0 * Mat4::from_translation(vec3(0.0, 2.0, 0.0));
        let m2 = m1 * Mat4::from_translation(vec3(0.0, 0.0, 3.0));

        assert_eq!(flat[0], (0, m0));
        assert_eq!(flat[1], (1, m1));
        assert_eq!(flat[2], (2, m2));
    }

    #[test]
    fn flatten_order_is_preorder() {
        let mut root = SceneNode::new(Mat4::IDENTITY);
        let mut a = SceneNode::new(Mat4::IDENTITY);
        a.mesh_indices.push(7);
        let mut b = SceneNode::new(Mat4::IDENTITY);
        b.mesh_indices.push(9);
        root.children.push(a);
        root.children.push(b);
        let flat = flatten(&root).expect("flatten");
        assert_eq!(flat.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![7, 9]);
    }

    #[test]
    fn flatten_rejects_overly_deep_tree() {
        let mut node = SceneNode::new(Mat4::IDENTITY);
        for _ in 0..(MAX_NODE_DEPTH + 2) {
            let mut parent = SceneNode::new(Mat4::IDENTITY);
            parent.children.push(node);
            node = parent;
        }
        assert!(flatten(&node).is_err());
    }

    #[test]
    fn known_translation_survives_flattening() {
        // Regression check for the transform convention: a node that
        // translates by (4,5,6) must emit exactly that glam matrix.
        let mut root = SceneNode::new(Mat4::IDENTITY);
        let mut child = SceneNode::new(Mat4::from_translation(vec3(4.0, 5.0, 6.0)));
        child.mesh_indices.push(0);
        root.children.push(child);
        let flat = flatten(&root).expect("flatten");
        let world = flat[0].1;
        assert_eq!(world.w_axis.truncate(), vec3(4.0, 5.0, 6.0));
        assert_eq!(
            world.transform_point3(vec3(0.0, 0.0, 0.0)),
            vec3(4.0, 5.0, 6.0)
        );
    }
}
