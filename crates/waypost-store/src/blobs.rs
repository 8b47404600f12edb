//! Filesystem blob storage for uploaded images.
//!
//! Each blob is a file named by its UUID under the base directory. Uploads
//! return a [`BlobRef`] whose `download_url` is what gets stored on the
//! referencing document (e.g. `profileImageUrl`).

use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub id: Uuid,
    pub download_url: String,
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    public_base_url: String,
    max_size: usize,
}

impl BlobStore {
    pub async fn new(base_path: PathBuf, public_base_url: &str, max_size: usize) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_size,
        })
    }

    pub async fn upload(&self, data: &[u8]) -> Result<BlobRef> {
        if data.is_empty() {
            return Err(StoreError::EmptyBlob);
        }
        if data.len() > self.max_size {
            return Err(StoreError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        fs::write(self.blob_path(&id), data).await?;

        debug!(id = %id, size = data.len(), "Stored blob");
        Ok(BlobRef {
            id,
            download_url: self.download_url(&id),
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Vec<u8>> {
        match fs::read(self.blob_path(&id)).await {
            Ok(data) => {
                debug!(id = %id, size = data.len(), "Retrieved blob");
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::BlobNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        match fs::remove_file(self.blob_path(&id)).await {
            Ok(()) => {
                debug!(id = %id, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::BlobNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn download_url(&self, id: &Uuid) -> String {
        format!("{}/blobs/{}", self.public_base_url, id)
    }

    /// Recover the blob id from a URL produced by [`Self::download_url`].
    pub fn id_from_url(&self, url: &str) -> Option<Uuid> {
        let rest = url.strip_prefix(&self.public_base_url)?;
        let id = rest.strip_prefix("/blobs/")?;
        Uuid::parse_str(id).ok()
    }

    // A formatted UUID never contains separators, so the path cannot escape
    // the base directory.
    fn blob_path(&self, id: &Uuid) -> PathBuf {
        self.base_path.join(id.to_string())
    }
}
