//! FBX front end: parses binary FBX 7.x into the intermediate
//! [`SceneGraph`] by walking the raw node tree (`Objects` and
//! `Connections` documents).
//!
//! Per-corner attributes (`ByPolygonVertex` layers) are expanded into
//! flat vertices and polygons are fan-triangulated here, so the
//! extractor downstream always sees triangulated faces. ASCII FBX is
//! not supported and surfaces as a parse failure.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use fbxcel::low::v7400::AttributeValue;
use fbxcel::tree::any::AnyTree;
use fbxcel::tree::v7400::{NodeHandle, Tree};
use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::extract::UvTransform;
use crate::model::LoadError;
use crate::scene::{
    MAX_NODE_DEPTH, RawMaterial, RawMesh, RawTextureRef, SceneGraph, SceneNode, TextureSlot,
};

pub fn parse(path: &Path) -> Result<SceneGraph, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = match AnyTree::from_seekable_reader(BufReader::new(file)) {
        Ok(AnyTree::V7400(version, tree, _footer)) => {
            log::debug!("[fbx] {}: binary FBX {:?}", path.display(), version);
            tree
        }
        Ok(_) => {
            return Err(LoadError::Parse(
                "unsupported FBX version (binary FBX 7.x required)".into(),
            ));
        }
        Err(e) => return Err(LoadError::Parse(format!("FBX: {e}"))),
    };

    let doc = FbxDocument::from_tree(&tree);
    doc.into_scene_graph()
}

// ---------------------------------------------------------------------
// Attribute helpers. fbxcel hands back loosely-typed attributes;
// exporters disagree on integer widths, so accept anything numeric.

fn attr_f64(a: &AttributeValue) -> Option<f64> {
    match a {
        AttributeValue::F64(v) => Some(*v),
        AttributeValue::F32(v) => Some(f64::from(*v)),
        AttributeValue::I64(v) => Some(*v as f64),
        AttributeValue::I32(v) => Some(f64::from(*v)),
        AttributeValue::I16(v) => Some(f64::from(*v)),
        _ => None,
    }
}

fn attr_i64(a: &AttributeValue) -> Option<i64> {
    match a {
        AttributeValue::I64(v) => Some(*v),
        AttributeValue::I32(v) => Some(i64::from(*v)),
        AttributeValue::I16(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn attr_str(a: &AttributeValue) -> Option<&str> {
    match a {
        AttributeValue::String(v) => Some(v.as_str()),
        _ => None,
    }
}

fn attr_arr_f64(a: &AttributeValue) -> Option<Vec<f64>> {
    match a {
        AttributeValue::ArrF64(v) => Some(v.clone()),
        AttributeValue::ArrF32(v) => Some(v.iter().map(|x| f64::from(*x)).collect()),
        _ => None,
    }
}

fn attr_arr_i32(a: &AttributeValue) -> Option<Vec<i32>> {
    match a {
        AttributeValue::ArrI32(v) => Some(v.clone()),
        AttributeValue::ArrI64(v) => Some(v.iter().map(|x| *x as i32).collect()),
        _ => None,
    }
}

fn child_by_name<'a>(node: &NodeHandle<'a>, name: &str) -> Option<NodeHandle<'a>> {
    node.children().find(|c| c.name() == name)
}

/// Object names are stored as `Name\u{0}\u{1}Class`; keep the name half.
fn display_name(raw: &str) -> String {
    raw.split('\u{0}').next().unwrap_or(raw).to_string()
}

/// Read a `Properties70/P` vector value (three doubles after the four
/// leading name/type attributes).
fn property_vec3(node: &NodeHandle<'_>, property: &str) -> Option<[f64; 3]> {
    let props = child_by_name(node, "Properties70")?;
    for p in props.children().filter(|c| c.name() == "P") {
        let attrs = p.attributes();
        if attrs.first().and_then(attr_str) != Some(property) {
            continue;
        }
        if attrs.len() >= 7 {
            let x = attr_f64(&attrs[4])?;
            let y = attr_f64(&attrs[5])?;
            let z = attr_f64(&attrs[6])?;
            return Some([x, y, z]);
        }
    }
    None
}

/// Local transform from Lcl TRS properties. Rotation is Euler XYZ in
/// degrees. Pre/post rotation and pivots are not applied.
fn local_transform(
    translation: Option<[f64; 3]>,
    rotation_deg: Option<[f64; 3]>,
    scaling: Option<[f64; 3]>,
) -> Mat4 {
    let t = translation.unwrap_or([0.0; 3]);
    let r = rotation_deg.unwrap_or([0.0; 3]);
    let s = scaling.unwrap_or([1.0, 1.0, 1.0]);
    let rotation = Quat::from_euler(
        EulerRot::XYZ,
        (r[0] as f32).to_radians(),
        (r[1] as f32).to_radians(),
        (r[2] as f32).to_radians(),
    );
    Mat4::from_scale_rotation_translation(
        Vec3::new(s[0] as f32, s[1] as f32, s[2] as f32),
        rotation,
        Vec3::new(t[0] as f32, t[1] as f32, t[2] as f32),
    )
}

// ---------------------------------------------------------------------
// Layer elements (normals, UVs).

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LayerMapping {
    ByControlPoint,
    ByPolygonVertex,
}

#[derive(Clone, Debug)]
struct LayerElement {
    mapping: LayerMapping,
    /// Flat component array (3 per entry for normals, 2 for UVs).
    values: Vec<f64>,
    /// `IndexToDirect` indirection, when present.
    indices: Option<Vec<i32>>,
}

impl LayerElement {
    fn parse(node: &NodeHandle<'_>, value_name: &str, index_name: &str) -> Option<Self> {
        let mapping = child_by_name(node, "MappingInformationType")
            .and_then(|n| n.attributes().first().and_then(attr_str).map(str::to_string))?;
        let mapping = match mapping.as_str() {
            "ByVertice" | "ByVertex" | "ByControlPoint" => LayerMapping::ByControlPoint,
            "ByPolygonVertex" => LayerMapping::ByPolygonVertex,
            other => {
                log::warn!("[fbx] unsupported layer mapping '{other}', skipping layer");
                return None;
            }
        };
        let values = child_by_name(node, value_name)
            .and_then(|n| n.attributes().first().and_then(attr_arr_f64))?;
        let indices =
            child_by_name(node, index_name).and_then(|n| n.attributes().first().and_then(attr_arr_i32));
        Some(Self {
            mapping,
            values,
            indices,
        })
    }

    /// Fetch entry for a corner, given its control point and
    /// polygon-vertex indices. `components` is 2 or 3.
    fn fetch(&self, control_point: usize, polygon_vertex: usize, components: usize) -> Option<Vec<f64>> {
        let entry = match self.mapping {
            LayerMapping::ByControlPoint => control_point,
            LayerMapping::ByPolygonVertex => polygon_vertex,
        };
        let entry = match &self.indices {
            Some(indices) => usize::try_from(*indices.get(entry)?).ok()?,
            None => entry,
        };
        let start = entry.checked_mul(components)?;
        let slice = self.values.get(start..start + components)?;
        Some(slice.to_vec())
    }
}

// ---------------------------------------------------------------------
// Object tables.

#[derive(Clone, Debug, Default)]
struct Geometry {
    control_points: Vec<[f64; 3]>,
    polygon_vertex_index: Vec<i32>,
    normals: Option<LayerElement>,
    uv_layers: Vec<LayerElement>,
}

#[derive(Clone, Debug)]
struct ModelObject {
    name: String,
    local_transform: Mat4,
}

#[derive(Clone, Debug)]
struct TextureObject {
    file_ref: String,
    uv_transform: Option<UvTransform>,
}

#[derive(Default)]
struct FbxDocument {
    geometries: HashMap<i64, Geometry>,
    models: HashMap<i64, ModelObject>,
    material_names: HashMap<i64, String>,
    textures: HashMap<i64, TextureObject>,
    /// parent model id -> child model ids, in file order.
    model_children: HashMap<i64, Vec<i64>>,
    model_parent: HashMap<i64, i64>,
    model_geometries: HashMap<i64, Vec<i64>>,
    model_materials: HashMap<i64, Vec<i64>>,
    /// material id -> (connection property, texture id).
    material_textures: HashMap<i64, Vec<(String, i64)>>,
    root_models: Vec<i64>,
}

impl FbxDocument {
    fn from_tree(tree: &Tree) -> Self {
        let mut doc = Self::default();
        let root = tree.root();
        if let Some(objects) = child_by_name(&root, "Objects") {
            for object in objects.children() {
                doc.parse_object(&object);
            }
        }
        if let Some(connections) = child_by_name(&root, "Connections") {
            for c in connections.children().filter(|c| c.name() == "C") {
                doc.parse_connection(&c);
            }
        }
        doc.link_models();
        doc
    }

    fn parse_object(&mut self, object: &NodeHandle<'_>) {
        let attrs = object.attributes();
        let Some(id) = attrs.first().and_then(attr_i64) else {
            return;
        };
        let name = attrs.get(1).and_then(attr_str).map(display_name).unwrap_or_default();
        match object.name() {
            "Geometry" => {
                // Only mesh geometry; shapes/NURBS are skipped.
                if attrs.get(2).and_then(attr_str) == Some("Mesh") {
                    self.geometries.insert(id, parse_geometry(object));
                }
            }
            "Model" => {
                let local_transform = local_transform(
                    property_vec3(object, "Lcl Translation"),
                    property_vec3(object, "Lcl Rotation"),
                    property_vec3(object, "Lcl Scaling"),
                );
                self.models.insert(
                    id,
                    ModelObject {
                        name,
                        local_transform,
                    },
                );
            }
            "Material" => {
                self.material_names.insert(id, name);
            }
            "Texture" => {
                let relative = child_by_name(object, "RelativeFilename")
                    .and_then(|n| n.attributes().first().and_then(attr_str).map(str::to_string))
                    .filter(|s| !s.is_empty());
                let absolute = child_by_name(object, "FileName")
                    .and_then(|n| n.attributes().first().and_then(attr_str).map(str::to_string));
                let file_ref = relative.or(absolute).unwrap_or_default();
                let uv_transform = texture_uv_transform(object);
                self.textures.insert(
                    id,
                    TextureObject {
                        file_ref,
                        uv_transform,
                    },
                );
            }
            _ => {}
        }
    }

    fn parse_connection(&mut self, c: &NodeHandle<'_>) {
        let attrs = c.attributes();
        let kind = attrs.first().and_then(attr_str);
        let (Some(child), Some(parent)) = (
            attrs.get(1).and_then(attr_i64),
            attrs.get(2).and_then(attr_i64),
        ) else {
            return;
        };
        match kind {
            Some("OO") => {
                if self.models.contains_key(&child)
                    && (parent == 0 || self.models.contains_key(&parent))
                {
                    self.model_children.entry(parent).or_default().push(child);
                    self.model_parent.insert(child, parent);
                } else if self.geometries.contains_key(&child) && self.models.contains_key(&parent)
                {
                    self.model_geometries.entry(parent).or_default().push(child);
                } else if self.material_names.contains_key(&child)
                    && self.models.contains_key(&parent)
                {
                    self.model_materials.entry(parent).or_default().push(child);
                }
            }
            Some("OP") => {
                if self.textures.contains_key(&child) && self.material_names.contains_key(&parent) {
                    let property = attrs.get(3).and_then(attr_str).unwrap_or("").to_string();
                    self.material_textures
                        .entry(parent)
                        .or_default()
                        .push((property, child));
                }
            }
            _ => {}
        }
    }

    fn link_models(&mut self) {
        for (&id, _) in &self.models {
            let parent = self.model_parent.get(&id).copied().unwrap_or(0);
            if parent == 0 {
                self.root_models.push(id);
            }
        }
        self.root_models.sort_unstable();
    }

    fn material_for_model(&self, model_id: i64) -> RawMaterial {
        let Some(&material_id) = self
            .model_materials
            .get(&model_id)
            .and_then(|m| m.first())
        else {
            return RawMaterial::default();
        };
        let name = self
            .material_names
            .get(&material_id)
            .cloned()
            .unwrap_or_default();

        let mut texture_refs = Vec::new();
        let mut uv_transform = None;
        if let Some(links) = self.material_textures.get(&material_id) {
            for (property, texture_id) in links {
                let Some(texture) = self.textures.get(texture_id) else {
                    continue;
                };
                let slot = match property.as_str() {
                    "DiffuseColor" => TextureSlot::Diffuse,
                    "SpecularColor" => TextureSlot::Specular,
                    _ => TextureSlot::Unknown,
                };
                if slot == TextureSlot::Diffuse && uv_transform.is_none() {
                    uv_transform = texture.uv_transform;
                }
                texture_refs.push(RawTextureRef {
                    raw_path: texture.file_ref.clone(),
                    slot,
                });
            }
        }

        RawMaterial {
            texture_refs,
            preferred_uv_channel: None,
            uv_transform,
            name,
        }
    }

    fn into_scene_graph(self) -> Result<SceneGraph, LoadError> {
        let mut meshes = Vec::new();
        let mut mesh_cache: HashMap<i64, HashMap<i64, usize>> = HashMap::new();
        let mut visited = HashSet::new();
        let mut root = SceneNode::new(Mat4::IDENTITY);
        for &model_id in &self.root_models {
            let child =
                self.build_node(model_id, 1, &mut visited, &mut meshes, &mut mesh_cache)?;
            root.children.push(child);
        }
        Ok(SceneGraph { root, meshes })
    }

    fn build_node(
        &self,
        model_id: i64,
        depth: usize,
        visited: &mut HashSet<i64>,
        meshes: &mut Vec<RawMesh>,
        mesh_cache: &mut HashMap<i64, HashMap<i64, usize>>,
    ) -> Result<SceneNode, LoadError> {
        if depth > MAX_NODE_DEPTH {
            return Err(LoadError::MalformedHierarchy(
                "FBX model tree nests deeper than the recursion limit".into(),
            ));
        }
        if !visited.insert(model_id) {
            return Err(LoadError::MalformedHierarchy(format!(
                "FBX model {model_id} appears twice in the hierarchy"
            )));
        }
        let model = &self.models[&model_id];
        let mut node = SceneNode::new(model.local_transform);

        if let Some(geometry_ids) = self.model_geometries.get(&model_id) {
            for &geometry_id in geometry_ids {
                let per_model = mesh_cache.entry(geometry_id).or_default();
                let index = match per_model.get(&model_id) {
                    Some(&index) => index,
                    None => {
                        let geometry = &self.geometries[&geometry_id];
                        let material = self.material_for_model(model_id);
                        match convert_geometry(geometry, material) {
                            Some(raw) => {
                                let index = meshes.len();
                                meshes.push(raw);
                                per_model.insert(model_id, index);
                                index
                            }
                            None => {
                                log::warn!(
                                    "[fbx] model '{}': geometry {geometry_id} has no triangles",
                                    model.name
                                );
                                continue;
                            }
                        }
                    }
                };
                node.mesh_indices.push(index);
            }
        }

        for &child_id in self
            .model_children
            .get(&model_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
        {
            let child = self.build_node(child_id, depth + 1, visited, meshes, mesh_cache)?;
            node.children.push(child);
        }
        Ok(node)
    }
}

fn parse_geometry(object: &NodeHandle<'_>) -> Geometry {
    let mut geometry = Geometry::default();
    if let Some(flat) =
        child_by_name(object, "Vertices").and_then(|n| n.attributes().first().and_then(attr_arr_f64))
    {
        geometry.control_points = flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
    }
    if let Some(indices) = child_by_name(object, "PolygonVertexIndex")
        .and_then(|n| n.attributes().first().and_then(attr_arr_i32))
    {
        geometry.polygon_vertex_index = indices;
    }
    if let Some(layer) = child_by_name(object, "LayerElementNormal")
        .and_then(|n| LayerElement::parse(&n, "Normals", "NormalsIndex"))
    {
        geometry.normals = Some(layer);
    }
    for uv_node in object.children().filter(|c| c.name() == "LayerElementUV") {
        if let Some(layer) = LayerElement::parse(&uv_node, "UV", "UVIndex") {
            geometry.uv_layers.push(layer);
        }
    }
    geometry
}

/// UV transform from a texture object's Properties70 (`Translation`,
/// `Rotation` around W, `Scaling`). Returns `None` when every component
/// is at its default.
fn texture_uv_transform(object: &NodeHandle<'_>) -> Option<UvTransform> {
    let translation = property_vec3(object, "Translation");
    let rotation = property_vec3(object, "Rotation");
    let scaling = property_vec3(object, "Scaling");
    if translation.is_none() && rotation.is_none() && scaling.is_none() {
        return None;
    }
    let t = translation.unwrap_or([0.0; 3]);
    let r = rotation.unwrap_or([0.0; 3]);
    let s = scaling.unwrap_or([1.0, 1.0, 1.0]);
    Some(UvTransform {
        scale: [s[0] as f32, s[1] as f32],
        rotation: (r[2] as f32).to_radians(),
        translation: [t[0] as f32, t[1] as f32],
    })
}

/// Expand per-corner layers into flat vertices and fan-triangulate.
/// Negative entries in `PolygonVertexIndex` terminate a polygon and
/// encode `!index`.
fn convert_geometry(geometry: &Geometry, material: RawMaterial) -> Option<RawMesh> {
    let mut positions = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut uv_channels: Vec<Vec<[f32; 2]>> = vec![Vec::new(); geometry.uv_layers.len()];
    let mut faces = Vec::new();

    let mut polygon: Vec<u32> = Vec::new();
    for (polygon_vertex, &raw) in geometry.polygon_vertex_index.iter().enumerate() {
        let (control_point, last) = if raw < 0 {
            ((!raw) as usize, true)
        } else {
            (raw as usize, false)
        };
        let Some(&cp) = geometry.control_points.get(control_point) else {
            log::warn!("[fbx] polygon vertex {polygon_vertex} is out of bounds, skipping mesh");
            return None;
        };

        let vertex_index = positions.len() as u32;
        positions.push([cp[0] as f32, cp[1] as f32, cp[2] as f32]);
        if let Some(layer) = &geometry.normals {
            let n = layer
                .fetch(control_point, polygon_vertex, 3)
                .unwrap_or_else(|| vec![0.0, 0.0, 0.0]);
            normals.push([n[0] as f32, n[1] as f32, n[2] as f32]);
        }
        for (channel, layer) in geometry.uv_layers.iter().enumerate() {
            let uv = layer
                .fetch(control_point, polygon_vertex, 2)
                .unwrap_or_else(|| vec![0.0, 0.0]);
            uv_channels[channel].push([uv[0] as f32, uv[1] as f32]);
        }

        polygon.push(vertex_index);
        if last {
            for i in 1..polygon.len().saturating_sub(1) {
                faces.push([polygon[0], polygon[i], polygon[i + 1]]);
            }
            polygon.clear();
        }
    }

    if positions.is_empty() || faces.is_empty() {
        return None;
    }
    Some(RawMesh {
        positions,
        normals: geometry.normals.as_ref().map(|_| normals),
        uv_channels,
        faces,
        material,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_file_is_io_error() {
        assert!(matches!(
            parse(Path::new("/no/such/model.fbx")),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn garbage_file_is_parse_failure() {
        let dir = std::env::temp_dir().join(format!("veles3d-fbx-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("scratch dir");
        let path = dir.join("garbage.fbx");
        // ASCII FBX (or any non-binary payload) must fail cleanly.
        std::fs::write(&path, b"; FBX 7.4.0 project file\nObjects: {}\n").expect("write fixture");
        assert!(matches!(parse(&path), Err(LoadError::Parse(_))));
        let _ = std::fs::remove_file(&path);
    }

    fn quad_geometry() -> Geometry {
        Geometry {
            control_points: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            // One quad; the final index is bit-inverted per convention.
            polygon_vertex_index: vec![0, 1, 2, !3],
            normals: Some(LayerElement {
                mapping: LayerMapping::ByPolygonVertex,
                values: [[0.0, 0.0, 1.0]; 4].concat(),
                indices: None,
            }),
            uv_layers: vec![LayerElement {
                mapping: LayerMapping::ByControlPoint,
                values: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
                indices: None,
            }],
        }
    }

    #[test]
    fn quad_fan_triangulates_to_two_faces() {
        let raw = convert_geometry(&quad_geometry(), RawMaterial::default()).expect("convert");
        assert_eq!(raw.positions.len(), 4);
        assert_eq!(raw.faces, vec![[0, 1, 2], [0, 2, 3]]);
        let normals = raw.normals.expect("normals present");
        assert!(normals.iter().all(|n| *n == [0.0, 0.0, 1.0]));
        assert_eq!(raw.uv_channels.len(), 1);
        assert_eq!(raw.uv_channels[0][2], [1.0, 1.0]);
    }

    #[test]
    fn geometry_without_polygons_is_skipped() {
        let geometry = Geometry {
            control_points: vec![[0.0, 0.0, 0.0]],
            ..Default::default()
        };
        assert!(convert_geometry(&geometry, RawMaterial::default()).is_none());
    }

    #[test]
    fn lcl_transform_composes_trs() {
        let m = local_transform(
            Some([1.0, 2.0, 3.0]),
            Some([0.0, 90.0, 0.0]),
            Some([1.0, 1.0, 1.0]),
        );
        let p = m.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        // 90 degrees about Y sends +X to -Z, then the translation applies.
        assert!((p - Vec3::new(1.0, 2.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn index_to_direct_indirection() {
        let layer = LayerElement {
            mapping: LayerMapping::ByPolygonVertex,
            values: vec![0.25, 0.5, 0.75, 1.0],
            indices: Some(vec![1, 0]),
        };
        assert_eq!(layer.fetch(0, 0, 2), Some(vec![0.75, 1.0]));
        assert_eq!(layer.fetch(0, 1, 2), Some(vec![0.25, 0.5]));
    }
}
