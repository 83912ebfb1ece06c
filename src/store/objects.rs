// src/store/objects.rs

use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use url::Url;

use crate::error::AppError;

/// Binary object storage for question images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `name` and returns the object's public reference.
    async fn upload(&self, name: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<String, AppError>;
}

fn public_ref(base: &Url, name: &str) -> Result<String, AppError> {
    base.join(name)
        .map(String::from)
        .map_err(|e| AppError::InternalServerError(format!("Invalid object name {}: {}", name, e)))
}

/// Object names are generated server-side; anything else is refused.
fn check_name(name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if !valid {
        return Err(AppError::BadRequest(format!("Invalid object name: {}", name)));
    }
    Ok(())
}

/// Writes objects into a directory that the router serves under `/uploads`.
pub struct FsObjectStore {
    root: PathBuf,
    public_base: Url,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base: Url) -> Self {
        Self {
            root: root.into(),
            public_base,
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, AppError> {
        check_name(name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(name), &bytes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to write object {}: {:?}", name, e);
                AppError::from(e)
            })?;
        tracing::info!("Stored object {} ({} bytes)", name, bytes.len());
        public_ref(&self.public_base, name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Keeps objects in memory; used by tests.
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    public_base: Url,
}

impl MemoryObjectStore {
    pub fn new(public_base: Url) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            public_base,
        }
    }

    pub async fn get(&self, name: &str) -> Option<StoredObject> {
        self.objects.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        check_name(name)?;
        self.objects.write().await.insert(
            name.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        public_ref(&self.public_base, name)
    }
}
