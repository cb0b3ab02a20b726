//! On-disk layout of a series and small path helpers shared by every pass.
//!
//! ```text
//! <root>/<series>/Capitulos_Carpetas/<chapter>/imagen_001.webp
//! <root>/<series>/cache_images/<sha256(url)>.webp
//! <root>/<series>/comics_archivos/<prefix> <chapter>.cbz
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HarvestError, Result};

pub const CHAPTERS_DIR: &str = "Capitulos_Carpetas";
pub const CACHE_DIR: &str = "cache_images";
pub const ARCHIVES_DIR: &str = "comics_archivos";

/// Extensions (lower-case, without dot) treated as chapter images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff"];

const MAX_PATH_LEN: usize = 80;
const MAX_URL_LEN: usize = 60;

/// Directory tree owned by one series
#[derive(Debug, Clone)]
pub struct SeriesLayout {
    name: String,
    root: PathBuf,
}

impl SeriesLayout {
    /// Resolve the series directory under an explicit library root
    pub fn new(library_root: impl AsRef<Path>, series: &str) -> Result<Self> {
        let name = series.trim();
        if name.is_empty() {
            return Err(HarvestError::InvalidInput("series name is empty".to_string()));
        }
        if name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(HarvestError::InvalidInput(format!(
                "series name '{}' is not a plain directory name",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            root: library_root.as_ref().join(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chapters_dir(&self) -> PathBuf {
        self.root.join(CHAPTERS_DIR)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.root.join(ARCHIVES_DIR)
    }

    pub fn chapter_dir(&self, label: &str) -> PathBuf {
        self.chapters_dir().join(sanitize_filename(label))
    }

    /// Create the chapter and cache directories used by a download run
    pub fn ensure_download_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.chapters_dir())?;
        fs::create_dir_all(self.cache_dir())?;
        Ok(())
    }

    /// Path relative to the series root, truncated for log lines
    pub fn display_path(&self, path: &Path) -> String {
        shorten_path(path, &self.root)
    }
}

/// Replace characters that cannot appear in a single path component
pub fn sanitize_filename(s: &str) -> String {
    let cleaned = s.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Whether `path` carries one of [`IMAGE_EXTENSIONS`]
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn shorten_path(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    truncate(&rel.display().to_string(), MAX_PATH_LEN)
}

pub fn shorten_url(url: &str) -> String {
    truncate(url, MAX_URL_LEN)
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
