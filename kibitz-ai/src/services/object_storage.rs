//! Object storage for uploaded game files
//!
//! References are opaque strings of the form `local://<owner-dir>/<uuid>.pgn`.
//! `retrieve` rejects anything that could escape the storage root.

use async_trait::async_trait;
use kibitz_common::Owner;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Scheme prefix for references produced by [`LocalObjectStorage`]
pub const LOCAL_SCHEME: &str = "local://";

/// Object storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage reference: {0}")]
    InvalidReference(String),

    #[error("Unsupported content in {0}: {1}")]
    Format(String, String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write/read access to stored files
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store bytes on behalf of `owner`, returning a stable reference
    async fn store(
        &self,
        bytes: &[u8],
        owner: &Owner,
        filename: Option<&str>,
    ) -> Result<String, StorageError>;

    /// Read back the bytes behind a reference
    async fn retrieve(&self, reference: &str) -> Result<Vec<u8>, StorageError>;
}

/// Filesystem-backed storage rooted at `<data_folder>/uploads`
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a reference to a path under the root, validating every segment
    fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let relative = reference
            .strip_prefix(LOCAL_SCHEME)
            .ok_or_else(|| StorageError::InvalidReference(reference.to_string()))?;

        let segments: Vec<&str> = relative.split('/').collect();
        let valid = segments.len() == 2
            && segments.iter().all(|s| is_safe_segment(s));

        if !valid {
            return Err(StorageError::InvalidReference(reference.to_string()));
        }

        Ok(self.root.join(segments[0]).join(segments[1]))
    }
}

/// Directory grouping an owner's uploads
///
/// Only groups files; uniqueness comes from the object's UUID name.
fn owner_dir(owner: &Owner) -> String {
    match owner {
        Owner::Anonymous => "anonymous".to_string(),
        Owner::Registered(id) => {
            let cleaned: String = id
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect();
            format!("u-{}", cleaned)
        }
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn store(
        &self,
        bytes: &[u8],
        owner: &Owner,
        filename: Option<&str>,
    ) -> Result<String, StorageError> {
        let dir = owner_dir(owner);
        let object_name = format!("{}.pgn", Uuid::new_v4());
        let folder = self.root.join(&dir);

        tokio::fs::create_dir_all(&folder).await?;
        tokio::fs::write(folder.join(&object_name), bytes).await?;

        let reference = format!("{}{}/{}", LOCAL_SCHEME, dir, object_name);
        tracing::info!(
            reference = %reference,
            owner = %owner,
            filename = filename.unwrap_or("-"),
            size = bytes.len(),
            "Stored uploaded file"
        );

        Ok(reference)
    }

    async fn retrieve(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(reference)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(reference.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Retrieve a reference and decode it as UTF-8 text
pub async fn retrieve_text(
    storage: &dyn ObjectStorage,
    reference: &str,
) -> Result<String, StorageError> {
    let bytes = storage.retrieve(reference).await?;
    String::from_utf8(bytes)
        .map_err(|e| StorageError::Format(reference.to_string(), e.to_string()))
}
