//! Material binding: decide which of a material's texture slots feeds
//! the mesh's diffuse sampler, resolve each reference, and assign
//! per-role texture units.

use std::path::Path;

use crate::resolve::{self, TextureSource};
use crate::scene::{RawMaterial, TextureSlot};

/// Semantic role of a bound texture, as seen by the shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureRole {
    Diffuse,
    Specular,
}

impl TextureRole {
    /// Sampler name prefix; unit 0 of the diffuse role is `diffuse0`.
    pub fn sampler_prefix(self) -> &'static str {
        match self {
            TextureRole::Diffuse => "diffuse",
            TextureRole::Specular => "specular",
        }
    }
}

/// A texture as bound to one mesh batch. Units count per role and per
/// batch: every batch starts its diffuse numbering at 0.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundTexture {
    pub source: TextureSource,
    pub role: TextureRole,
    pub unit: u32,
}

/// Slot preference for the diffuse sampler. The first slot with at least
/// one declared reference wins outright; roles are never merged.
const DIFFUSE_PREFERENCE: &[TextureSlot] =
    &[TextureSlot::BaseColor, TextureSlot::Diffuse, TextureSlot::Unknown];

/// Bind one material's textures for one mesh batch.
///
/// If the winning slot resolves to no real file (or the material has no
/// references at all), the keyword heuristic scans `base_dir`; if that
/// also finds nothing the batch carries zero textures and the renderer
/// binds the magenta fallback to `diffuse0`.
pub fn bind(material: &RawMaterial, base_dir: &Path) -> Vec<BoundTexture> {
    let mut bound = Vec::new();

    let winner = DIFFUSE_PREFERENCE
        .iter()
        .copied()
        .find(|slot| material.texture_refs.iter().any(|r| r.slot == *slot));

    let mut any_real = false;
    if let Some(slot) = winner {
        let mut unit = 0u32;
        for r in material.texture_refs.iter().filter(|r| r.slot == slot) {
            let context = format!("material '{}' {:?}", material.name, slot);
            let source = resolve::resolve(&r.raw_path, base_dir, &context);
            any_real |= matches!(source, TextureSource::Path(_));
            bound.push(BoundTexture {
                source,
                role: TextureRole::Diffuse,
                unit,
            });
            unit += 1;
        }
    }

    if !any_real {
        // Nothing usable declared; guess from the asset directory.
        bound.clear();
        if let Some(found) = resolve::heuristic_base_color(base_dir) {
            log::warn!(
                "[texture] material '{}': no usable texture declared, guessed {}",
                material.name,
                found.display()
            );
            bound.push(BoundTexture {
                source: TextureSource::Path(found),
                role: TextureRole::Diffuse,
                unit: 0,
            });
        }
    }

    // Specular references pass through with their own unit counter; the
    // preference logic above only governs the diffuse sampler.
    let mut specular_unit = 0u32;
    for r in material
        .texture_refs
        .iter()
        .filter(|r| r.slot == TextureSlot::Specular)
    {
        let context = format!("material '{}' Specular", material.name);
        let source = resolve::resolve(&r.raw_path, base_dir, &context);
        if matches!(source, TextureSource::Path(_)) {
            bound.push(BoundTexture {
                source,
                role: TextureRole::Specular,
                unit: specular_unit,
            });
            specular_unit += 1;
        }
    }

    bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::RawTextureRef;
    use std::fs;
    use std::path::PathBuf;

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "veles3d-material-{tag}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).expect("create scratch dir");
            Self(dir)
        }

        fn touch(&self, rel: &str) -> PathBuf {
            let path = self.0.join(rel);
            fs::write(&path, b"x").expect("write file");
            path
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn material_with(refs: Vec<RawTextureRef>) -> RawMaterial {
        RawMaterial {
            texture_refs: refs,
            preferred_uv_channel: None,
            uv_transform: None,
            name: "test".into(),
        }
    }

    #[test]
    fn base_color_wins_over_diffuse() {
        let dir = ScratchDir::new("pref");
        let base = dir.touch("base.png");
        dir.touch("legacy.png");
        let material = material_with(vec![
            RawTextureRef {
                raw_path: "legacy.png".into(),
                slot: TextureSlot::Diffuse,
            },
            RawTextureRef {
                raw_path: "base.png".into(),
                slot: TextureSlot::BaseColor,
            },
        ]);
        let bound = bind(&material, &dir.0);
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].source, TextureSource::Path(base));
        assert_eq!(bound[0].role, TextureRole::Diffuse);
        assert_eq!(bound[0].unit, 0);
    }

    #[test]
    fn units_count_per_role_from_zero() {
        let dir = ScratchDir::new("units");
        dir.touch("a.png");
        dir.touch("b.png");
        dir.touch("s.png");
        let material = material_with(vec![
            RawTextureRef {
                raw_path: "a.png".into(),
                slot: TextureSlot::BaseColor,
            },
            RawTextureRef {
                raw_path: "b.png".into(),
                slot: TextureSlot::BaseColor,
            },
            RawTextureRef {
                raw_path: "s.png".into(),
                slot: TextureSlot::Specular,
            },
        ]);
        let bound = bind(&material, &dir.0);
        let diffuse: Vec<_> = bound.iter().filter(|b| b.role == TextureRole::Diffuse).collect();
        let specular: Vec<_> = bound.iter().filter(|b| b.role == TextureRole::Specular).collect();
        assert_eq!(diffuse.iter().map(|b| b.unit).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(specular.iter().map(|b| b.unit).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn unresolved_winner_falls_through_to_heuristic() {
        let dir = ScratchDir::new("fallthrough");
        let guessed = dir.touch("crate_albedo.png");
        let material = material_with(vec![RawTextureRef {
            raw_path: "gone.png".into(),
            slot: TextureSlot::BaseColor,
        }]);
        let bound = bind(&material, &dir.0);
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].source, TextureSource::Path(guessed));
    }

    #[test]
    fn no_refs_and_no_heuristic_hit_binds_nothing() {
        let dir = ScratchDir::new("nothing");
        dir.touch("readme.png"); // no keyword in name
        let material = material_with(vec![]);
        assert!(bind(&material, &dir.0).is_empty());
    }

    #[test]
    fn partial_resolution_keeps_fallback_entries() {
        let dir = ScratchDir::new("partial");
        let ok = dir.touch("ok.png");
        let material = material_with(vec![
            RawTextureRef {
                raw_path: "ok.png".into(),
                slot: TextureSlot::Diffuse,
            },
            RawTextureRef {
                raw_path: "broken.png".into(),
                slot: TextureSlot::Diffuse,
            },
        ]);
        let bound = bind(&material, &dir.0);
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].source, TextureSource::Path(ok));
        assert_eq!(bound[1].source, TextureSource::Fallback);
        assert_eq!(bound[1].unit, 1);
    }
}
