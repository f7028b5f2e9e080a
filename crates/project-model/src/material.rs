//! Source material descriptors.
//!
//! Materials are supplied externally (stock footage, local folders) and are
//! read-only to the pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "gif"];

/// File extensions treated as video footage when scanning a directory.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v"];

/// Whether a material is moving footage or a still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    #[default]
    Video,
    Image,
}

impl MaterialKind {
    /// Infer the kind from the file extension. Unknown extensions are video.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => Self::Image,
            _ => Self::Video,
        }
    }
}

/// Pixel size and duration of a probed source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaGeometry {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

/// A single piece of source footage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMaterial {
    /// Path to the media file.
    pub path: PathBuf,

    /// Video or still image.
    #[serde(default)]
    pub kind: MaterialKind,

    /// Native resolution and duration, once probed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<MediaGeometry>,
}

impl SourceMaterial {
    /// Describe a material, inferring its kind from the extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = MaterialKind::from_path(&path);
        Self {
            path,
            kind,
            native: None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind == MaterialKind::Image
    }
}

/// Collect every video or image file directly inside `dir`, sorted by name.
pub fn scan_materials(dir: &Path) -> std::io::Result<Vec<SourceMaterial>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| {
                    let e = e.to_ascii_lowercase();
                    VIDEO_EXTENSIONS.contains(&e.as_str()) || IMAGE_EXTENSIONS.contains(&e.as_str())
                })
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths.into_iter().map(SourceMaterial::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(MaterialKind::from_path(Path::new("a/b.JPG")), MaterialKind::Image);
        assert_eq!(MaterialKind::from_path(Path::new("clip.mp4")), MaterialKind::Video);
        assert_eq!(MaterialKind::from_path(Path::new("noext")), MaterialKind::Video);
    }

    #[test]
    fn test_scan_materials_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp4", "a.png", "notes.txt", "c.MOV"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let found = scan_materials(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|m| m.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.mp4", "c.MOV"]);
        assert!(found[0].is_image());
    }
}
