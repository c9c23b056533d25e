//! Rendered frame sequences on disk.

use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;
use log::{debug, warn};

use crate::schema::{AnalysisConfig, PathConfig};

/// Subdirectory a renderer writes frames into, when present.
const FRAMES_SUBDIR: &str = "frames";

/// Reads sampled grayscale frames from render output directories.
///
/// Nothing is cached: every call lists and decodes from disk.
#[derive(Debug, Clone)]
pub struct FrameStore {
    paths: PathConfig,
    stride: usize,
    prefix: String,
    extensions: Vec<String>,
}

impl FrameStore {
    pub fn new(paths: &PathConfig, analysis: &AnalysisConfig) -> Self {
        Self {
            paths: paths.clone(),
            stride: analysis.frame_stride.max(1),
            prefix: analysis.frame_prefix.clone(),
            extensions: analysis
                .frame_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Directory holding the frame files: `frames/` if it exists, else the render root.
    pub fn frame_dir(render_dir: &Path) -> Option<PathBuf> {
        let nested = render_dir.join(FRAMES_SUBDIR);
        if nested.is_dir() {
            Some(nested)
        } else if render_dir.is_dir() {
            Some(render_dir.to_path_buf())
        } else {
            None
        }
    }

    fn is_frame_file(&self, path: &Path) -> bool {
        let name_ok = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&self.prefix));
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
        name_ok && ext_ok && path.is_file()
    }

    /// Frame index embedded in the file stem after the prefix.
    fn frame_number(&self, path: &Path) -> Option<u64> {
        let stem = path.file_stem()?.to_str()?;
        let digits: String = stem
            .strip_prefix(&self.prefix)?
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }

    /// Every frame file of a render in sequence order (not yet sampled).
    pub fn frame_files(&self, render_dir: &Path) -> Vec<PathBuf> {
        let Some(dir) = Self::frame_dir(render_dir) else {
            warn!("Render directory not found: {}", render_dir.display());
            return Vec::new();
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| self.is_frame_file(path))
            .collect();
        files.sort_by(|a, b| {
            self.frame_number(a)
                .cmp(&self.frame_number(b))
                .then_with(|| a.cmp(b))
        });
        files
    }

    /// Decode every `stride`-th frame as grayscale. Undecodable files are skipped.
    pub fn load(&self, render_dir: &Path) -> Vec<GrayImage> {
        let files = self.frame_files(render_dir);
        if files.is_empty() {
            warn!("No frame files in {}", render_dir.display());
            return Vec::new();
        }

        let frames: Vec<GrayImage> = files
            .iter()
            .step_by(self.stride)
            .filter_map(|path| match image::open(path) {
                Ok(img) => Some(img.to_luma8()),
                Err(e) => {
                    warn!("Skipping frame {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        debug!(
            "Loaded {} of {} frames from {}",
            frames.len(),
            files.len(),
            render_dir.display()
        );
        frames
    }

    /// Load the sampled frames of a pattern version.
    pub fn load_version(&self, version: i64) -> Vec<GrayImage> {
        self.load(&self.paths.render_dir(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use tempfile::TempDir;

    fn write_frames(dir: &Path, count: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            let frame = GrayImage::from_pixel(8, 8, Luma([(i * 10) as u8]));
            frame.save(dir.join(format!("frame-{:04}.png", i))).unwrap();
        }
    }

    fn store(root: &Path) -> FrameStore {
        let paths = PathConfig {
            renders_dir: root.to_path_buf(),
            ..PathConfig::default()
        };
        FrameStore::new(&paths, &AnalysisConfig::default())
    }

    #[test]
    fn test_stride_sampling() {
        let tmp = TempDir::new().unwrap();
        let render = tmp.path().join("render_v1");
        write_frames(&render, 13);

        let frames = store(tmp.path()).load(&render);
        // Files 0, 6 and 12
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].get_pixel(0, 0).0[0], 0);
        assert_eq!(frames[1].get_pixel(0, 0).0[0], 60);
        assert_eq!(frames[2].get_pixel(0, 0).0[0], 120);
    }

    #[test]
    fn test_prefers_frames_subdir() {
        let tmp = TempDir::new().unwrap();
        let render = tmp.path().join("render_v2");
        write_frames(&render, 2);
        write_frames(&render.join("frames"), 7);

        let store = store(tmp.path());
        assert_eq!(store.frame_files(&render).len(), 7);
        assert_eq!(store.load_version(2).len(), 2);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());
        assert!(store.load_version(99).is_empty());
        assert!(store.frame_files(&tmp.path().join("render_v99")).is_empty());
    }

    #[test]
    fn test_undecodable_frame_skipped() {
        let tmp = TempDir::new().unwrap();
        let render = tmp.path().join("render_v3");
        write_frames(&render, 7);
        // Replace the second sampled frame with garbage
        fs::write(render.join("frame-0006.png"), b"not a png").unwrap();
        fs::write(render.join("notes.txt"), b"ignored").unwrap();

        let frames = store(tmp.path()).load(&render);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_numeric_ordering_without_padding() {
        let tmp = TempDir::new().unwrap();
        let render = tmp.path().join("render_v4");
        fs::create_dir_all(&render).unwrap();
        for i in [10, 2, 1] {
            GrayImage::new(2, 2)
                .save(render.join(format!("frame-{}.png", i)))
                .unwrap();
        }
        let names: Vec<String> = store(tmp.path())
            .frame_files(&render)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["frame-1.png", "frame-2.png", "frame-10.png"]);
    }
}
