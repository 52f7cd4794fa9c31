//! CPU-side texture data (RGBA8) and the shared magenta fallback pixel.

use std::path::Path;

use anyhow::{Context, Result};

/// Decoded image in CPU-friendly RGBA8 layout, ready for GPU upload.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            (width * height * 4) as usize,
            "Data size doesn't match RGBA8 dimensions"
        );
        Self {
            data,
            width,
            height,
        }
    }

    /// Decode a PNG or JPEG file into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .with_context(|| format!("Failed to decode image {}", path.display()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("Loaded texture {} ({}x{})", path.display(), width, height);
        Ok(Self::new_rgba8(width, height, rgba.into_raw()))
    }

    /// The 1x1 magenta fallback bound when no usable texture resolves.
    /// A mesh is never invisible; worst case it is uniformly magenta.
    pub fn fallback_magenta() -> Self {
        Self::new_rgba8(1, 1, vec![255, 0, 255, 255])
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width * self.height * 4) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_one_magenta_pixel() {
        let t = TextureData::fallback_magenta();
        assert_eq!((t.width, t.height), (1, 1));
        assert_eq!(t.data, vec![255, 0, 255, 255]);
        assert!(t.is_valid());
    }

    #[test]
    fn load_rejects_missing_file() {
        assert!(TextureData::load("/no/such/texture.png").is_err());
    }
}
