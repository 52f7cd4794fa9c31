//! Texture path resolution with a defined fallback policy.
//!
//! Resolution never fails the load: anything that cannot be mapped to a
//! readable file on disk resolves to [`TextureSource::Fallback`], which
//! binds the shared 1x1 magenta texture at draw time.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Outcome of resolving one texture reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextureSource {
    /// A file that existed on disk at resolution time.
    Path(PathBuf),
    /// Nothing usable; bind the magenta fallback.
    Fallback,
}

/// Filename keywords for the last-resort search, lowercase.
const BASE_COLOR_KEYWORDS: &[&str] = &["albedo", "basecolor", "base_color", "diffuse", "color"];

/// Extensions we can actually decode (see `texture.rs`).
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// `*N` is the embedded-texture convention of FBX-style exporters; glTF
/// embeds via `data:` URIs or buffer views (which the front end also
/// rewrites to `*N`). Embedded payload extraction is a known gap, so
/// these resolve to the fallback rather than being silently wrong.
fn is_embedded_marker(raw: &str) -> bool {
    if let Some(rest) = raw.strip_prefix('*') {
        return !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit());
    }
    raw.starts_with("data:")
}

fn normalize_separators(raw: &str) -> String {
    raw.replace('\\', "/")
}

/// Drive-letter (`C:/...`) or root-rooted paths count as absolute even
/// on platforms where `Path::is_absolute` would disagree.
fn is_absolute_like(normalized: &str) -> bool {
    if Path::new(normalized).is_absolute() || normalized.starts_with('/') {
        return true;
    }
    let bytes = normalized.as_bytes();
    bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

/// Recursive filename-only search under `base_dir`; first file whose
/// name matches wins. Match order is directory-traversal order, which is
/// not guaranteed to be stable across platforms.
fn search_by_filename(base_dir: &Path, file_name: &str) -> Option<PathBuf> {
    for entry in WalkDir::new(base_dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.eq_ignore_ascii_case(file_name))
        {
            return Some(entry.path().to_path_buf());
        }
    }
    None
}

/// Resolve a material's texture reference against the asset's base
/// directory. `context` identifies the material/slot in diagnostics.
pub fn resolve(raw_ref: &str, base_dir: &Path, context: &str) -> TextureSource {
    if raw_ref.is_empty() {
        log::warn!("[texture] {context}: empty texture reference, using fallback");
        return TextureSource::Fallback;
    }
    if is_embedded_marker(raw_ref) {
        log::warn!(
            "[texture] {context}: embedded texture '{raw_ref}' is unsupported, using fallback"
        );
        return TextureSource::Fallback;
    }

    let normalized = normalize_separators(raw_ref);
    let candidate = if is_absolute_like(&normalized) {
        PathBuf::from(&normalized)
    } else {
        base_dir.join(&normalized)
    };
    if candidate.is_file() {
        return TextureSource::Path(candidate);
    }

    // The declared path is stale; fall back to a filename search rooted
    // at the asset directory (exported assets frequently carry paths
    // from the author's machine).
    if let Some(file_name) = Path::new(&normalized).file_name().and_then(|n| n.to_str())
        && let Some(found) = search_by_filename(base_dir, file_name)
    {
        log::warn!(
            "[texture] {context}: '{raw_ref}' not found, substituting {}",
            found.display()
        );
        return TextureSource::Path(found);
    }

    log::warn!("[texture] {context}: could not resolve '{raw_ref}', using fallback");
    TextureSource::Fallback
}

/// Best-effort guess for materials that declare no texture at all: scan
/// the asset directory for a filename containing a base-color keyword.
/// Heuristic, not authoritative; the first hit in traversal order wins.
pub fn heuristic_base_color(base_dir: &Path) -> Option<PathBuf> {
    for entry in WalkDir::new(base_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !is_image_file(entry.path()) {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if BASE_COLOR_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Some(entry.path().to_path_buf());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Unique scratch directory, removed on drop.
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "veles3d-resolve-{tag}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).expect("create scratch dir");
            Self(dir)
        }

        fn touch(&self, rel: &str) -> PathBuf {
            let path = self.0.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create parent");
            }
            fs::write(&path, b"x").expect("write file");
            path
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn empty_ref_is_fallback() {
        assert_eq!(
            resolve("", Path::new("/nowhere"), "test"),
            TextureSource::Fallback
        );
    }

    #[test]
    fn embedded_markers_are_fallback() {
        assert_eq!(
            resolve("*0", Path::new("/nowhere"), "test"),
            TextureSource::Fallback
        );
        assert_eq!(
            resolve("*12", Path::new("/nowhere"), "test"),
            TextureSource::Fallback
        );
        assert_eq!(
            resolve("data:image/png;base64,AAAA", Path::new("/nowhere"), "test"),
            TextureSource::Fallback
        );
        // A literal '*' with no digits is just a (bad) filename.
        assert_eq!(
            resolve("*x.png", Path::new("/nowhere"), "test"),
            TextureSource::Fallback
        );
    }

    #[test]
    fn relative_ref_joins_base_dir() {
        let dir = ScratchDir::new("rel");
        let expected = dir.touch("tex/wood.png");
        assert_eq!(
            resolve("tex/wood.png", &dir.0, "test"),
            TextureSource::Path(expected)
        );
    }

    #[test]
    fn backslash_separators_are_normalized() {
        let dir = ScratchDir::new("sep");
        let expected = dir.touch("tex/wood.png");
        assert_eq!(
            resolve("tex\\wood.png", &dir.0, "test"),
            TextureSource::Path(expected)
        );
    }

    #[test]
    fn absolute_ref_is_used_as_is() {
        let dir = ScratchDir::new("abs");
        let file = dir.touch("stone.png");
        let raw = file.to_str().unwrap().to_string();
        assert_eq!(resolve(&raw, Path::new("/elsewhere"), "test"), TextureSource::Path(file));
    }

    #[test]
    fn stale_path_recovers_via_filename_search() {
        let dir = ScratchDir::new("search");
        let actual = dir.touch("nested/deeper/brick.png");
        // Path as exported on someone else's machine.
        let got = resolve("C:/Users/old/textures/brick.png", &dir.0, "test");
        assert_eq!(got, TextureSource::Path(actual));
    }

    #[test]
    fn unresolvable_ref_is_fallback() {
        let dir = ScratchDir::new("missing");
        assert_eq!(
            resolve("no_such.png", &dir.0, "test"),
            TextureSource::Fallback
        );
    }

    #[test]
    fn heuristic_finds_keyword_image() {
        let dir = ScratchDir::new("heuristic");
        dir.touch("notes.txt");
        dir.touch("mesh.bin");
        let expected = dir.touch("maps/T_Crate_BaseColor.png");
        assert_eq!(heuristic_base_color(&dir.0), Some(expected));
    }

    #[test]
    fn heuristic_ignores_non_images() {
        let dir = ScratchDir::new("heuristic-miss");
        dir.touch("diffuse_settings.json");
        assert_eq!(heuristic_base_color(&dir.0), None);
    }
}
