//! glTF front end: parses `.gltf`/`.glb` files into the intermediate
//! [`SceneGraph`]. Only geometry, node transforms, and base-color
//! texture references are imported; PBR parameters beyond that are out
//! of scope.

use std::path::Path;

use glam::Mat4;

use crate::extract::UvTransform;
use crate::model::LoadError;
use crate::scene::{
    MAX_NODE_DEPTH, RawMaterial, RawMesh, RawTextureRef, SceneGraph, SceneNode, TextureSlot,
};

/// Parse a glTF file. Buffers (external or GLB-embedded) are loaded;
/// images are not touched here - texture references stay as path
/// strings for the resolver.
pub fn parse(path: &Path) -> Result<SceneGraph, LoadError> {
    let gltf::Gltf { document, blob } =
        gltf::Gltf::open(path).map_err(|e| LoadError::Parse(format!("glTF: {e}")))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let buffers = gltf::import_buffers(&document, Some(base_dir), blob)
        .map_err(|e| LoadError::Parse(format!("glTF buffers: {e}")))?;

    // One RawMesh per triangle primitive; glTF meshes regroup per node.
    let mut meshes: Vec<RawMesh> = Vec::new();
    let mut records_per_mesh: Vec<Vec<usize>> = Vec::with_capacity(document.meshes().len());
    for mesh in document.meshes() {
        let mesh_name = mesh.name().unwrap_or("unnamed").to_string();
        let mut records = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "[gltf] mesh '{}': skipping non-triangle primitive {:?}",
                    mesh_name,
                    primitive.mode()
                );
                continue;
            }
            if let Some(raw) = convert_primitive(&primitive, &buffers, &mesh_name) {
                records.push(meshes.len());
                meshes.push(raw);
            }
        }
        records_per_mesh.push(records);
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| LoadError::Parse("glTF file declares no scene".into()))?;

    let mut root = SceneNode::new(Mat4::IDENTITY);
    for node in scene.nodes() {
        root.children
            .push(convert_node(&node, &records_per_mesh, 0)?);
    }

    Ok(SceneGraph { root, meshes })
}

fn convert_node(
    node: &gltf::Node,
    records_per_mesh: &[Vec<usize>],
    depth: usize,
) -> Result<SceneNode, LoadError> {
    if depth > MAX_NODE_DEPTH {
        return Err(LoadError::MalformedHierarchy(
            "glTF node graph nests deeper than the recursion limit".into(),
        ));
    }
    // glTF matrices are column-major, same as glam; no transpose.
    let local = Mat4::from_cols_array_2d(&node.transform().matrix());
    let mut out = SceneNode::new(local);
    if let Some(mesh) = node.mesh()
        && let Some(records) = records_per_mesh.get(mesh.index())
    {
        out.mesh_indices.extend(records.iter().copied());
    }
    for child in node.children() {
        out.children
            .push(convert_node(&child, records_per_mesh, depth + 1)?);
    }
    Ok(out)
}

fn convert_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    mesh_name: &str,
) -> Option<RawMesh> {
    let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));

    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    if positions.is_empty() {
        return None;
    }
    let normals = reader.read_normals().map(|it| it.collect::<Vec<_>>());

    let mut uv_channels = Vec::new();
    let mut set = 0u32;
    while let Some(tex_coords) = reader.read_tex_coords(set) {
        uv_channels.push(tex_coords.into_f32().collect::<Vec<[f32; 2]>>());
        set += 1;
    }

    // Unindexed primitives draw vertices in order.
    let indices: Vec<u32> = match reader.read_indices() {
        Some(read) => read.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    if indices.len() < 3 {
        log::warn!("[gltf] mesh '{mesh_name}': primitive has no complete triangle, skipping");
        return None;
    }
    let faces: Vec<[u32; 3]> = indices
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .collect();

    Some(RawMesh {
        positions,
        normals,
        uv_channels,
        faces,
        material: convert_material(&primitive.material()),
    })
}

/// Collect texture references in slot order: PBR base color, then the
/// spec-gloss extension's diffuse, then everything else as unknown.
fn convert_material(material: &gltf::Material) -> RawMaterial {
    let name = material.name().unwrap_or("unnamed").to_string();
    let mut texture_refs = Vec::new();
    let mut preferred_uv_channel = None;
    let mut uv_transform = None;

    if let Some(info) = material.pbr_metallic_roughness().base_color_texture() {
        preferred_uv_channel = Some(info.tex_coord() as usize);
        if let Some(tt) = info.texture_transform() {
            uv_transform = Some(UvTransform {
                scale: tt.scale(),
                rotation: tt.rotation(),
                translation: tt.offset(),
            });
            if let Some(tc) = tt.tex_coord() {
                preferred_uv_channel = Some(tc as usize);
            }
        }
        texture_refs.push(RawTextureRef {
            raw_path: image_ref(&info.texture()),
            slot: TextureSlot::BaseColor,
        });
    }

    if let Some(sg) = material.pbr_specular_glossiness()
        && let Some(info) = sg.diffuse_texture()
    {
        if preferred_uv_channel.is_none() {
            preferred_uv_channel = Some(info.tex_coord() as usize);
        }
        texture_refs.push(RawTextureRef {
            raw_path: image_ref(&info.texture()),
            slot: TextureSlot::Diffuse,
        });
    }

    if let Some(info) = material
        .pbr_metallic_roughness()
        .metallic_roughness_texture()
    {
        texture_refs.push(RawTextureRef {
            raw_path: image_ref(&info.texture()),
            slot: TextureSlot::Unknown,
        });
    }
    if let Some(nt) = material.normal_texture() {
        texture_refs.push(RawTextureRef {
            raw_path: image_ref(&nt.texture()),
            slot: TextureSlot::Unknown,
        });
    }
    if let Some(ot) = material.occlusion_texture() {
        texture_refs.push(RawTextureRef {
            raw_path: image_ref(&ot.texture()),
            slot: TextureSlot::Unknown,
        });
    }
    if let Some(info) = material.emissive_texture() {
        texture_refs.push(RawTextureRef {
            raw_path: image_ref(&info.texture()),
            slot: TextureSlot::Unknown,
        });
    }

    RawMaterial {
        texture_refs,
        preferred_uv_channel,
        uv_transform,
        name,
    }
}

/// Side-car images keep their URI (the resolver handles `data:` URIs as
/// embedded); buffer-view images are rewritten to the `*N` marker.
fn image_ref(texture: &gltf::Texture) -> String {
    match texture.source().source() {
        gltf::image::Source::Uri { uri, .. } => uri.to_string(),
        gltf::image::Source::View { .. } => format!("*{}", texture.source().index()),
    }
}
