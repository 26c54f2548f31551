//! Local object store interface.
//!
//! The engine never talks to storage directly; it goes through the
//! [`ObjectStore`] trait so embedders can plug in their own backend.
//! [`MemoryStore`] is the reference implementation, used by the test suite
//! and suitable for caches and experiments; [`FsStore`] keeps objects on
//! disk, one file per object.

use crate::error::StoreError;
use crate::types::{ObjectId, PendingObject};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Local store consumed by the pull engine.
///
/// `commit` must be all-or-nothing: a failed commit leaves the store exactly
/// as it was, because the writer holds the batch in memory and retries the
/// whole thing.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether an object with this identifier is already committed locally.
    async fn contains(&self, id: &ObjectId) -> Result<bool, StoreError>;

    /// Stage a fetched body for later commit.
    ///
    /// The returned [`PendingObject`] is not visible to `contains` until it
    /// goes through `commit`.
    async fn stage(
        &self,
        id: &ObjectId,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<PendingObject, StoreError>;

    /// Atomically commit a batch of staged objects.
    async fn commit(&self, batch: &[PendingObject]) -> Result<(), StoreError>;
}

/// A committed object held by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Content type recorded at stage time
    pub content_type: String,
    /// Object body
    pub body: Vec<u8>,
}

#[derive(Default)]
struct MemoryStoreInner {
    objects: HashMap<ObjectId, StoredObject>,
    commit_log: Vec<Vec<ObjectId>>,
}

/// In-memory [`ObjectStore`] implementation.
///
/// Optionally verifies on commit that each sha256-addressed body actually
/// hashes to its identifier, rejecting the whole batch on any mismatch.
/// Keeps a log of committed batches for observability.
#[derive(Default)]
pub struct MemoryStore {
    verify_hashes: bool,
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    /// Create an empty store without content verification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that verifies sha256 identifiers on commit.
    pub fn with_verification() -> Self {
        Self {
            verify_hashes: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an object directly, bypassing the stage/commit path.
    ///
    /// Used to seed already-present objects.
    pub fn insert(&self, id: ObjectId, content_type: impl Into<String>, body: Vec<u8>) {
        self.lock().objects.insert(
            id,
            StoredObject {
                content_type: content_type.into(),
                body,
            },
        );
    }

    /// Look up a committed object.
    pub fn get(&self, id: &ObjectId) -> Option<StoredObject> {
        self.lock().objects.get(id).cloned()
    }

    /// Number of committed objects.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// The identifiers of every committed batch, in commit order.
    pub fn commit_log(&self) -> Vec<Vec<ObjectId>> {
        self.lock().commit_log.clone()
    }

    fn verify(&self, object: &PendingObject) -> Result<(), StoreError> {
        if !self.verify_hashes || object.id.algorithm != "sha256" {
            return Ok(());
        }
        let digest = Sha256::digest(&object.body);
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        if hex != object.id.hash {
            return Err(StoreError::Rejected(format!(
                "body of {} hashes to sha256/{hex}",
                object.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.lock().objects.contains_key(id))
    }

    async fn stage(
        &self,
        id: &ObjectId,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<PendingObject, StoreError> {
        Ok(PendingObject {
            id: id.clone(),
            content_type: content_type.to_string(),
            body,
        })
    }

    async fn commit(&self, batch: &[PendingObject]) -> Result<(), StoreError> {
        // Validate the whole batch before touching the map: all or nothing.
        for object in batch {
            self.verify(object)?;
        }
        let mut inner = self.lock();
        for object in batch {
            inner.objects.insert(
                object.id.clone(),
                StoredObject {
                    content_type: object.content_type.clone(),
                    body: object.body.clone(),
                },
            );
        }
        inner
            .commit_log
            .push(batch.iter().map(|o| o.id.clone()).collect());
        Ok(())
    }
}

/// Filesystem-backed [`ObjectStore`].
///
/// Objects live at `<root>/<algorithm>/<hash>`, with the content type in a
/// `<hash>.meta` sidecar. Commits write every body into `<root>/staging`
/// first and only then rename the whole batch into place, so a crash or a
/// failed write never leaves a partially visible batch.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("staging")).await?;
        Ok(Self { root })
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(&id.algorithm).join(&id.hash)
    }

    fn meta_path(&self, id: &ObjectId) -> PathBuf {
        self.root
            .join(&id.algorithm)
            .join(format!("{}.meta", id.hash))
    }

    fn staging_path(&self, id: &ObjectId, suffix: &str) -> PathBuf {
        self.root
            .join("staging")
            .join(format!("{}-{}{suffix}", id.algorithm, id.hash))
    }

    /// Read a committed object back, if present.
    pub async fn read(&self, id: &ObjectId) -> Result<Option<StoredObject>, StoreError> {
        let body = match tokio::fs::read(self.object_path(id)).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content_type = match tokio::fs::read_to_string(self.meta_path(id)).await {
            Ok(meta) => meta.trim_end().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                "application/octet-stream".to_string()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(StoredObject { content_type, body }))
    }
}

async fn rename_into_place(from: &Path, to: &Path) -> Result<(), StoreError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(from, to).await?;
    Ok(())
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        match tokio::fs::metadata(self.object_path(id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn stage(
        &self,
        id: &ObjectId,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<PendingObject, StoreError> {
        Ok(PendingObject {
            id: id.clone(),
            content_type: content_type.to_string(),
            body,
        })
    }

    async fn commit(&self, batch: &[PendingObject]) -> Result<(), StoreError> {
        // Write everything under staging/ before any rename, so an I/O
        // failure surfaces while nothing is visible yet.
        for object in batch {
            tokio::fs::write(self.staging_path(&object.id, ""), &object.body).await?;
            tokio::fs::write(
                self.staging_path(&object.id, ".meta"),
                object.content_type.as_bytes(),
            )
            .await?;
        }
        for object in batch {
            rename_into_place(
                &self.staging_path(&object.id, ""),
                &self.object_path(&object.id),
            )
            .await?;
            rename_into_place(
                &self.staging_path(&object.id, ".meta"),
                &self.meta_path(&object.id),
            )
            .await?;
        }
        Ok(())
    }
}
