//! Uploaded files.
//!
//! Services only see the [`MediaStore`] trait. [`LocalMediaStore`] keeps files
//! under the configured media directory and hands back paths relative to it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::{
    entity::prelude::MediaKind,
    error::{ServiceError, ServiceResult},
};

const AVATAR_MAX_BYTES: usize = 2 * 1024 * 1024;
const POST_MEDIA_MAX_BYTES: usize = 10 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "png", "jpg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];

/// A file as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPurpose {
    Avatar,
    PostMedia,
}

impl MediaPurpose {
    fn dir(self) -> &'static str {
        match self {
            MediaPurpose::Avatar => "avatars",
            MediaPurpose::PostMedia => "posts",
        }
    }

    fn max_bytes(self) -> usize {
        match self {
            MediaPurpose::Avatar => AVATAR_MAX_BYTES,
            MediaPurpose::PostMedia => POST_MEDIA_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub path: String,
    pub kind: MediaKind,
}

/// Check an upload against the size and type limits for `purpose`.
/// Returns the normalized extension and the media kind it maps to.
pub fn validate(purpose: MediaPurpose, upload: &Upload) -> ServiceResult<(String, MediaKind)> {
    let extension = Path::new(&upload.file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ServiceError::validation("file has no extension"))?;

    let kind = if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Image
    } else if purpose == MediaPurpose::PostMedia && VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Video
    } else {
        return Err(ServiceError::validation(format!(
            "unsupported file type: {extension}"
        )));
    };

    if upload.bytes.is_empty() {
        return Err(ServiceError::validation("file is empty"));
    }
    if upload.bytes.len() > purpose.max_bytes() {
        return Err(ServiceError::validation(format!(
            "file exceeds {} bytes",
            purpose.max_bytes()
        )));
    }

    Ok((extension, kind))
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, purpose: MediaPurpose, upload: &Upload) -> ServiceResult<StoredMedia>;

    async fn remove(&self, path: &str) -> std::io::Result<()>;
}

/// Remove a file without failing the caller. Used once the owning row is
/// already gone or replaced.
pub async fn remove_quietly(store: &dyn MediaStore, path: &str) {
    if let Err(error) = store.remove(path).await {
        warn!(path, %error, "could not remove media file");
    }
}

#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> ServiceResult<PathBuf> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|part| matches!(part, std::path::Component::ParentDir))
        {
            return Err(ServiceError::validation("invalid media path"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, purpose: MediaPurpose, upload: &Upload) -> ServiceResult<StoredMedia> {
        let (extension, kind) = validate(purpose, upload)?;

        let dir = self.root.join(purpose.dir());
        fs::create_dir_all(&dir).await?;

        let file_name = format!("{}.{extension}", Uuid::now_v7());
        fs::write(dir.join(&file_name), &upload.bytes).await?;

        Ok(StoredMedia {
            path: format!("{}/{file_name}", purpose.dir()),
            kind,
        })
    }

    async fn remove(&self, path: &str) -> std::io::Result<()> {
        let full = self
            .resolve(path)
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidInput, error))?;
        fs::remove_file(full).await
    }
}
