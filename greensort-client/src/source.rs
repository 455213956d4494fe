//! Frame sources for the capture loop

use crate::error::ChannelError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Produces one encoded frame per capture tick
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame as transport text, or `None` once the source is exhausted
    async fn next_frame(&mut self) -> Result<Option<String>, ChannelError>;
}

/// Replays the JPEG/PNG files of a directory in name order
pub struct DirectoryFrameSource {
    files: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
}

impl DirectoryFrameSource {
    pub async fn open(dir: impl AsRef<Path>, looping: bool) -> Result<Self, ChannelError> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_image(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(ChannelError::Source(format!(
                "no .jpg or .png files in {}",
                dir.display()
            )));
        }
        info!("Replaying {} frames from {}", files.len(), dir.display());
        Ok(Self {
            files,
            cursor: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    async fn next_frame(&mut self) -> Result<Option<String>, ChannelError> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;

        let bytes = tokio::fs::read(path).await?;
        debug!("Frame {} ({} bytes)", path.display(), bytes.len());
        Ok(Some(format!("data:{};base64,{}", mime_type(path), STANDARD.encode(bytes))))
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_image(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("jpg" | "jpeg" | "png"))
}

fn mime_type(path: &Path) -> &'static str {
    match extension(path).as_deref() {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn dir_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in files {
            tokio::fs::write(dir.path().join(name), name.as_bytes()).await.unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_replays_images_in_order() {
        let dir = dir_with(&["b.png", "a.jpg", "notes.txt"]).await;
        let mut source = DirectoryFrameSource::open(dir.path(), false).await.unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().await.unwrap().unwrap();
        assert!(first.starts_with("data:image/jpeg;base64,"));
        assert!(first.ends_with(&STANDARD.encode("a.jpg")));
        let second = source.next_frame().await.unwrap().unwrap();
        assert!(second.starts_with("data:image/png;base64,"));
        assert_eq!(source.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_looping_wraps_around() {
        let dir = dir_with(&["only.JPG"]).await;
        let mut source = DirectoryFrameSource::open(dir.path(), true).await.unwrap();
        for _ in 0..3 {
            assert!(source.next_frame().await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_empty_directory_is_an_error() {
        let dir = dir_with(&["readme.md"]).await;
        assert!(matches!(
            DirectoryFrameSource::open(dir.path(), true).await,
            Err(ChannelError::Source(_))
        ));
    }
}
