//! Object storage for uploaded note media.
//!
//! Notes reference audio and image uploads by object key. Keys have the form
//! `{kind}/{yyyy}/{mm}/{uuidv7}.{ext}`; the pipeline reads the bytes back by
//! key through [`StorageBackend`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use jotter_core::{new_v7, Error, Result};

/// Storage backend trait for different storage implementations.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data under `key`, replacing any existing object.
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read the object at `key`; a missing object is `NotFound`.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the object at `key`; deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Kind of media an upload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Audio,
    Image,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Audio => "audio",
            ObjectKind::Image => "image",
        }
    }

    /// Whether a detected MIME type is acceptable for this kind.
    pub fn accepts(&self, mime_type: &str) -> bool {
        match self {
            ObjectKind::Audio => mime_type.starts_with("audio/") || mime_type == "video/webm",
            ObjectKind::Image => mime_type.starts_with("image/"),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "audio" => Ok(ObjectKind::Audio),
            "image" => Ok(ObjectKind::Image),
            other => Err(Error::InvalidInput(format!(
                "kind must be 'audio' or 'image', got '{other}'"
            ))),
        }
    }
}

/// Generate a fresh object key for an upload received at `now`.
///
/// Example: `audio/2026/10/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.m4a`
pub fn generate_object_key(kind: ObjectKind, extension: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{:04}/{:02}/{}.{}",
        kind,
        now.year(),
        now.month(),
        new_v7().as_hyphenated(),
        extension
    )
}

/// Reject keys that could escape the storage root or are not ours.
pub fn validate_object_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid object key '{key}'")))
    }
}

/// Filesystem storage backend rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        validate_object_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Round-trip a scratch object so misconfigured storage fails at startup.
    pub async fn validate(&self) -> Result<()> {
        let key = ".health-check/scratch.bin";
        let data = b"storage-health-check";
        self.write(key, data).await?;
        let read_back = self.read(key).await?;
        self.delete(key).await?;
        if read_back != data {
            return Err(Error::Storage("read-back mismatch".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key)?;
        debug!(
            subsystem = "storage",
            object_key = %key,
            size = data.len(),
            "object_store: write"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "object_store: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(to = %full_path.display(), error = %e, "object_store: rename failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(key)?;
        match fs::read(full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.full_path(key)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_path = self.full_path(key)?;
        Ok(fs::try_exists(full_path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generated_key_layout() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap();
        let key = generate_object_key(ObjectKind::Audio, "m4a", now);
        assert!(key.starts_with("audio/2026/03/"));
        assert!(key.ends_with(".m4a"));
        assert!(validate_object_key(&key).is_ok());
    }

    #[test]
    fn test_key_validation_rejects_traversal() {
        for bad in ["", "/etc/passwd", "../x", "a/../../b", "a//b", "a/./b", "a b"] {
            assert!(validate_object_key(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_kind_parsing_and_mime_acceptance() {
        assert_eq!("image".parse::<ObjectKind>().unwrap(), ObjectKind::Image);
        assert!("video".parse::<ObjectKind>().is_err());
        assert!(ObjectKind::Audio.accepts("audio/mpeg"));
        assert!(!ObjectKind::Audio.accepts("image/png"));
        assert!(ObjectKind::Image.accepts("image/png"));
    }

    #[tokio::test]
    async fn test_filesystem_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let key = "image/2026/10/photo.png";

        assert!(!backend.exists(key).await.unwrap());
        backend.write(key, b"png-bytes").await.unwrap();
        assert!(backend.exists(key).await.unwrap());
        assert_eq!(backend.read(key).await.unwrap(), b"png-bytes");

        backend.delete(key).await.unwrap();
        assert!(!backend.exists(key).await.unwrap());
        // Deleting twice is fine
        backend.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let err = backend.read("audio/none.wav").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_validate_writes_and_removes_scratch_object() {
        let dir = tempfile::tempdir().unwrap();
        FilesystemBackend::new(dir.path()).validate().await.unwrap();
    }
}
