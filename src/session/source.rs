//! Frame sources for the live session

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use walkdir::WalkDir;

use crate::inference::preprocess::load_image;
use crate::utils::error::{CarXplainError, Result};

/// Image extensions accepted as frames
pub const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Anything that yields video frames in order
pub trait FrameSource {
    /// Next frame, or `None` once the stream has ended
    fn next_frame(&mut self) -> Result<Option<DynamicImage>>;

    fn name(&self) -> &str {
        "frames"
    }
}

/// Plays back the image files of a directory in file-name order
pub struct DirectoryFrameSource {
    root: String,
    paths: Vec<PathBuf>,
    position: usize,
}

fn is_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl DirectoryFrameSource {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(CarXplainError::Session(format!(
                "frame directory {:?} does not exist",
                dir
            )));
        }

        let paths: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && is_frame(p))
            .collect();

        if paths.is_empty() {
            tracing::warn!("No frames found in {:?}", dir);
        } else {
            tracing::info!("Playing {} frames from {:?}", paths.len(), dir);
        }

        Ok(Self {
            root: dir.display().to_string(),
            paths,
            position: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        load_image(path).map(Some)
    }

    fn name(&self) -> &str {
        &self.root
    }
}

/// Frames already held in memory
#[derive(Default)]
pub struct MemoryFrameSource {
    frames: VecDeque<DynamicImage>,
}

impl MemoryFrameSource {
    pub fn new(frames: impl IntoIterator<Item = DynamicImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for MemoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        Ok(self.frames.pop_front())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_directory_source_orders_by_name_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("frame_002.png", 2u8), ("frame_001.png", 1u8)] {
            RgbImage::from_pixel(4, 4, Rgb([shade, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = DirectoryFrameSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap().unwrap().to_rgb8();
        assert_eq!(first.get_pixel(0, 0)[0], 1);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_directory() {
        assert!(DirectoryFrameSource::open(Path::new("/nonexistent/frames")).is_err());
    }

    #[test]
    fn test_memory_source_drains() {
        let mut source = MemoryFrameSource::new(vec![DynamicImage::new_rgb8(2, 2); 2]);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }
}
