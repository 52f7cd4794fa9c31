//! Asset loading: scene-graph flattening and mesh extraction for glTF and
//! FBX model files, plus texture path resolution with a defined fallback
//! policy. Produces CPU-side mesh batches ready for GPU upload.

pub mod extract;
pub mod fbx;
pub mod gltf;
pub mod material;
pub mod mesh;
pub mod model;
pub mod resolve;
pub mod scene;
pub mod texture;

pub use model::{LoadError, MeshBatch, ModelData, ModelKind, discover_models, load_model};
