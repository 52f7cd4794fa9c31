//! Model loading pipeline: format dispatch, flattening, extraction and
//! material binding, producing the CPU half of the model container.
//!
//! `load_model` is all-or-nothing: it either returns a fully built
//! `ModelData` or an error, so callers can keep the previously loaded
//! model untouched on failure.

use std::path::{Path, PathBuf};

use glam::Mat4;
use thiserror::Error;
use walkdir::WalkDir;

use crate::material::{self, BoundTexture};
use crate::mesh::MeshData;
use crate::{extract, fbx, gltf, scene};

/// Whole-model load failures. Per-texture problems never show up here;
/// they downgrade to the magenta fallback with a logged diagnostic.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported model format '{0}' (expected gltf/glb/fbx)")]
    UnsupportedFormat(String),
    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse failure: {0}")]
    Parse(String),
    #[error("Model contains no renderable meshes")]
    EmptyModel,
    #[error("Malformed node hierarchy: {0}")]
    MalformedHierarchy(String),
}

/// Source format of a loaded model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Gltf,
    Fbx,
}

impl ModelKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("gltf") || ext.eq_ignore_ascii_case("glb") {
            Some(ModelKind::Gltf)
        } else if ext.eq_ignore_ascii_case("fbx") {
            Some(ModelKind::Fbx)
        } else {
            None
        }
    }
}

/// One drawable unit: extracted mesh, bound textures, resolved world
/// transform. Draw order is the flattener's emission order.
#[derive(Clone, Debug)]
pub struct MeshBatch {
    pub mesh: MeshData,
    pub textures: Vec<BoundTexture>,
    pub transform: Mat4,
}

/// CPU side of a fully loaded model. The GPU uploader consumes this
/// without going back to the source file (textures are loaded from the
/// resolved paths at upload time).
#[derive(Clone, Debug)]
pub struct ModelData {
    pub kind: ModelKind,
    pub batches: Vec<MeshBatch>,
    /// Directory the asset was loaded from; relative texture paths were
    /// resolved against it.
    pub base_dir: PathBuf,
}

impl ModelData {
    pub fn mesh_count(&self) -> usize {
        self.batches.len()
    }
}

/// Load and flatten a model file. Blocking; meant to be called from the
/// render thread on user interaction.
pub fn load_model(path: &Path) -> Result<ModelData, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let kind = ModelKind::from_path(path).ok_or_else(|| {
        LoadError::UnsupportedFormat(
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string(),
        )
    })?;

    let graph = match kind {
        ModelKind::Gltf => gltf::parse(path)?,
        ModelKind::Fbx => fbx::parse(path)?,
    };
    let flat = scene::flatten(&graph.root)
        .map_err(|e| LoadError::MalformedHierarchy(e.to_string()))?;

    let base_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut batches = Vec::new();
    for (mesh_index, transform) in flat {
        let raw = &graph.meshes[mesh_index];
        let mesh = extract::extract(raw);
        if !mesh.is_valid() {
            continue;
        }
        let textures = material::bind(&raw.material, &base_dir);
        batches.push(MeshBatch {
            mesh,
            textures,
            transform,
        });
    }

    if batches.is_empty() {
        return Err(LoadError::EmptyModel);
    }
    log::info!(
        "Loaded {} ({:?}): {} mesh batch(es)",
        path.display(),
        kind,
        batches.len()
    );
    Ok(ModelData {
        kind,
        batches,
        base_dir,
    })
}

/// Scan a directory tree for loadable model files, sorted by path.
/// Feeds the preset list in the UI.
pub fn discover_models(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| ModelKind::from_path(p).is_some())
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use glam::vec3;
    use std::fs;

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "veles3d-model-{tag}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).expect("create scratch dir");
            Self(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    /// Triangle geometry as a base64 data-URI buffer: three VEC3
    /// positions followed by three u16 indices.
    fn triangle_buffer_uri() -> (String, usize) {
        let mut bytes = Vec::new();
        for p in [[0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in p {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in [0u16, 1, 2] {
            bytes.extend_from_slice(&i.to_le_bytes());
        }
        let len = bytes.len();
        (
            format!(
                "data:application/octet-stream;base64,{}",
                BASE64.encode(&bytes)
            ),
            len,
        )
    }

    fn write_chain_gltf(dir: &Path) -> PathBuf {
        let (uri, byte_length) = triangle_buffer_uri();
        let json = format!(
            r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [
    {{"mesh": 0, "translation": [1, 0, 0], "children": [1]}},
    {{"mesh": 0, "translation": [0, 2, 0], "children": [2]}},
    {{"mesh": 0, "translation": [0, 0, 3]}}
  ],
  "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1}}]}}],
  "buffers": [{{"uri": "{uri}", "byteLength": {byte_length}}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 6}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
    {{"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}}
  ]
}}"#
        );
        let path = dir.join("chain.gltf");
        fs::write(&path, json).expect("write gltf fixture");
        path
    }

    fn write_empty_gltf(dir: &Path) -> PathBuf {
        let path = dir.join("empty.gltf");
        fs::write(
            &path,
            r#"{"asset":{"version":"2.0"},"scene":0,"scenes":[{"nodes":[0]}],"nodes":[{}]}"#,
        )
        .expect("write gltf fixture");
        path
    }

    #[test]
    fn nonexistent_path_is_not_found() {
        assert!(matches!(
            load_model(Path::new("/no/such/model.gltf")),
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = ScratchDir::new("ext");
        let path = dir.0.join("model.obj");
        fs::write(&path, b"o cube").expect("write file");
        assert!(matches!(
            load_model(&path),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn chain_flattens_with_cumulative_transforms() {
        let dir = ScratchDir::new("chain");
        let path = write_chain_gltf(&dir.0);
        let model = load_model(&path).expect("load chain");
        assert_eq!(model.kind, ModelKind::Gltf);
        assert_eq!(model.mesh_count(), 3);

        let origins: Vec<_> = model
            .batches
            .iter()
            .map(|b| b.transform.transform_point3(vec3(0.0, 0.0, 0.0)))
            .collect();
        assert!((origins[0] - vec3(1.0, 0.0, 0.0)).length() < 1e-5);
        assert!((origins[1] - vec3(1.0, 2.0, 0.0)).length() < 1e-5);
        assert!((origins[2] - vec3(1.0, 2.0, 3.0)).length() < 1e-5);

        for batch in &model.batches {
            assert_eq!(batch.mesh.indices.len() % 3, 0);
            // No normals in the fixture: flat/unlit fallback.
            for v in &batch.mesh.vertices {
                assert_eq!(v.normal, [0.0, 0.0, 0.0]);
            }
            // No textures anywhere near the fixture either.
            assert!(batch.textures.is_empty());
        }
    }

    #[test]
    fn empty_model_is_an_error_and_previous_state_survives() {
        let dir = ScratchDir::new("transactional");
        let good = write_chain_gltf(&dir.0);
        let empty = write_empty_gltf(&dir.0);

        // Load-then-swap as the viewer does it.
        let mut slot: Option<ModelData> = None;
        if let Ok(model) = load_model(&good) {
            slot = Some(model);
        }
        assert_eq!(slot.as_ref().map(ModelData::mesh_count), Some(3));

        match load_model(&empty) {
            Err(LoadError::EmptyModel) => {} // slot intentionally untouched
            other => panic!("expected EmptyModel, got {other:?}"),
        }
        assert_eq!(slot.as_ref().map(ModelData::mesh_count), Some(3));
    }

    #[test]
    fn discover_finds_model_files_sorted() {
        let dir = ScratchDir::new("discover");
        fs::create_dir_all(dir.0.join("sub")).expect("subdir");
        fs::write(dir.0.join("b.fbx"), b"").expect("write");
        fs::write(dir.0.join("sub/a.gltf"), b"").expect("write");
        fs::write(dir.0.join("notes.txt"), b"").expect("write");
        let found = discover_models(&dir.0);
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("b.fbx"));
        assert!(found[1].ends_with("sub/a.gltf"));
    }
}
