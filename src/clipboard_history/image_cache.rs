//! Content-addressed on-disk cache for captured images
//!
//! Images are stored as PNG files named `<fingerprint>.png`, where the
//! fingerprint is taken over the decoded pixels (see [`hash_image_pixels`]).
//! Files are write-once: an existing file is never overwritten.
//!
//! Storage location: `<cache_dir>/clipnote/images/<hash>.png`

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::hasher::hash_image_pixels;
use crate::error::ClipNoteError;

/// A decoded bitmap as handed over by the clipboard (8-bit RGBA, row-major)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ClipImage {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Fingerprint of the pixel data
    pub fn fingerprint(&self) -> String {
        hash_image_pixels(self.width, self.height, &self.rgba)
    }
}

#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

/// Default cache directory (`<cache_dir>/clipnote/images`)
pub fn default_image_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("clipnote")
        .join("images")
}

impl ImageCache {
    /// Open the cache rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create image cache at {}", dir.display()))?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.png", hash))
    }

    /// Store an image and return its path and fingerprint.
    ///
    /// A failed write is logged and the path is still returned; the
    /// fingerprint stays useful for dedup even without a file behind it.
    pub fn store(&self, image: &ClipImage) -> (PathBuf, String) {
        let hash = image.fingerprint();
        let path = self.store_as(image, &hash);
        (path, hash)
    }

    /// Like [`store`](Self::store) for a caller that already holds the fingerprint
    pub fn store_as(&self, image: &ClipImage, hash: &str) -> PathBuf {
        let path = self.path_for(hash);

        if path.exists() {
            debug!(hash = %hash, "Cached image already exists, skipping write");
            return path;
        }

        match encode_png(image).and_then(|png| {
            fs::write(&path, &png)?;
            Ok(png.len())
        }) {
            Ok(size) => {
                debug!(hash = %hash, size, width = image.width, height = image.height, "Stored new image");
            }
            Err(e) => {
                warn!(hash = %hash, error = %e, "Failed to cache image, keeping entry without file");
            }
        }

        path
    }

    /// Load a cached image back into RGBA pixels
    pub fn load(&self, path: &Path) -> crate::error::Result<ClipImage> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClipNoteError::ImageNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
            .map_err(|e| ClipNoteError::ImageDecode(e.to_string()))?
            .to_rgba8();

        debug!(path = %path.display(), size = bytes.len(), "Loaded cached image");
        Ok(ClipImage::new(img.width(), img.height(), img.into_raw()))
    }

    /// Delete cache files whose fingerprint is not in `live`.
    ///
    /// Returns the number of files removed.
    pub fn sweep_orphans(&self, live: &HashSet<String>) -> Result<usize> {
        let mut deleted = 0;
        let entries = fs::read_dir(&self.dir).context("Failed to read image cache directory")?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !live.contains(stem) && fs::remove_file(&path).is_ok() {
                        debug!(hash = %stem, "Removed orphaned cached image");
                        deleted += 1;
                    }
                }
            }
        }

        if deleted > 0 {
            debug!(deleted, "Swept orphaned cached images");
        }
        Ok(deleted)
    }
}

fn encode_png(image: &ClipImage) -> crate::error::Result<Vec<u8>> {
    let rgba_image = image::RgbaImage::from_raw(image.width, image.height, image.rgba.clone())
        .ok_or_else(|| {
            ClipNoteError::ImageEncode(format!(
                "{} bytes do not match {}x{} RGBA",
                image.rgba.len(),
                image.width,
                image.height
            ))
        })?;

    let mut png = Vec::new();
    rgba_image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ClipNoteError::ImageEncode(e.to_string()))?;
    Ok(png)
}
