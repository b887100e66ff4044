//! Decoded frames and the directory frame source.
//!
//! A `Frame` is one decoded still from a camera. Frames are held in memory
//! only for the duration of a dedup cycle; the only pixels that leave the
//! process are blurred onboarding crops.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GenericImageView};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct Frame {
    pub camera_id: String,
    pub image: DynamicImage,
    /// Capture time, seconds since epoch.
    pub captured_at: u64,
    /// File the frame was decoded from, when there is one.
    pub source: Option<PathBuf>,
}

impl Frame {
    pub fn new(camera_id: impl Into<String>, image: DynamicImage, captured_at: u64) -> Self {
        Self {
            camera_id: camera_id.into(),
            image,
            captured_at,
            source: None,
        }
    }

    /// Decodes an image file into a frame captured now.
    pub fn open(camera_id: impl Into<String>, path: &Path) -> Result<Self> {
        let image =
            image::open(path).with_context(|| format!("decode frame {}", path.display()))?;
        Ok(Self {
            camera_id: camera_id.into(),
            image,
            captured_at: crate::now_s()?,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Statistics for a directory source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_read: u64,
    pub decode_failures: u64,
}

/// Frame source that polls a directory of still images.
///
/// Files are taken in lexical order, so a camera that drops timestamped
/// snapshots into the directory is consumed in capture order. Only paths
/// sorting after the last one handed out are picked up; a file that lands
/// behind that mark is never read. The directory is listed again only once
/// the previous listing has been drained. Unreadable files are skipped and
/// counted.
pub struct DirectorySource {
    dir: PathBuf,
    camera_id: String,
    last: Option<PathBuf>,
    queued: VecDeque<PathBuf>,
    stats: SourceStats,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, camera_id: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(anyhow!("frame directory {} does not exist", dir.display()));
        }
        Ok(Self {
            dir,
            camera_id: camera_id.into(),
            last: None,
            queued: VecDeque::new(),
            stats: SourceStats::default(),
        })
    }

    /// Next unseen frame, or `None` when the directory has nothing new.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.queued.is_empty() {
            self.queued = self.pending()?;
        }
        while let Some(path) = self.queued.pop_front() {
            self.last = Some(path.clone());
            match Frame::open(self.camera_id.clone(), &path) {
                Ok(frame) => {
                    self.stats.frames_read += 1;
                    return Ok(Some(frame));
                }
                Err(e) => {
                    self.stats.decode_failures += 1;
                    log::warn!("skipping frame {}: {:#}", path.display(), e);
                }
            }
        }
        Ok(None)
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }

    fn pending(&self) -> Result<VecDeque<PathBuf>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("list frame directory {}", self.dir.display()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let fresh = self.last.as_ref().map_or(true, |last| &path > last);
            if fresh && is_image_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths.into())
    }
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(path: &Path) {
        RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])).save(path).unwrap();
    }

    #[test]
    fn directory_source_yields_each_image_once_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("002.png"));
        write_png(&dir.path().join("001.png"));
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = DirectorySource::new(dir.path(), "cam-1").unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.camera_id, "cam-1");
        assert_eq!(first.dimensions(), (4, 3));
        assert!(first.source.unwrap().ends_with("001.png"));

        let second = source.next_frame().unwrap().unwrap();
        assert!(second.source.unwrap().ends_with("002.png"));
        assert!(source.next_frame().unwrap().is_none());

        write_png(&dir.path().join("003.png"));
        assert!(source.next_frame().unwrap().is_some());
        assert_eq!(source.stats().frames_read, 3);
    }

    #[test]
    fn files_behind_the_last_frame_are_not_read() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("010.png"));

        let mut source = DirectorySource::new(dir.path(), "cam-1").unwrap();
        assert!(source.next_frame().unwrap().is_some());

        write_png(&dir.path().join("005.png"));
        assert!(source.next_frame().unwrap().is_none());

        write_png(&dir.path().join("011.png"));
        let next = source.next_frame().unwrap().unwrap();
        assert!(next.source.unwrap().ends_with("011.png"));
        assert_eq!(source.stats().frames_read, 2);
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("001.jpg"), b"not a jpeg").unwrap();
        write_png(&dir.path().join("002.png"));

        let mut source = DirectorySource::new(dir.path(), "cam-1").unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert!(frame.source.unwrap().ends_with("002.png"));
        assert_eq!(source.stats().decode_failures, 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(DirectorySource::new("/definitely/not/here", "cam").is_err());
    }
}
