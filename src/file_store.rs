use crate::error::{Error, Result, StoreError};
use crate::grant::{Grant, GrantMap};
use crate::persist;
use crate::store::GrantStore;
use crate::types::SubjectId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// JSON-file backed grant store.
///
/// The whole mapping is rewritten on every mutation through a temp file and
/// rename, and the in-memory copy is only replaced once the write succeeded.
#[derive(Debug)]
pub struct FileGrantStore {
    path: PathBuf,
    grants: Mutex<GrantMap>,
}

impl FileGrantStore {
    /// Opens the store at `path`, loading any existing grants.
    ///
    /// A missing file yields an empty store; undecodable content fails with
    /// [`Error::CorruptState`].
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let grants = load(&path).await?;
        info!(path = %path.display(), grants = grants.len(), "grant store loaded");
        Ok(Self {
            path,
            grants: Mutex::new(grants),
        })
    }

    /// Opens the store, discarding unreadable content instead of failing.
    ///
    /// This is the explicit recovery path for [`Error::CorruptState`]; the
    /// file is overwritten with an empty mapping.
    pub async fn open_or_reset(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match load(&path).await {
            Ok(grants) => Ok(Self {
                path,
                grants: Mutex::new(grants),
            }),
            Err(Error::CorruptState { reason, .. }) => {
                warn!(path = %path.display(), %reason, "resetting corrupt grant store");
                let empty = GrantMap::new();
                save(&path, &empty).await?;
                Ok(Self {
                    path,
                    grants: Mutex::new(empty),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn commit<F>(&self, mutate: F) -> std::result::Result<Option<Grant>, StoreError>
    where
        F: FnOnce(&mut GrantMap) -> Option<Grant> + Send,
    {
        let mut guard = self.grants.lock().await;
        let mut next = guard.clone();
        let previous = mutate(&mut next);
        save(&self.path, &next).await.map_err(into_store_error)?;
        *guard = next;
        Ok(previous)
    }
}

/// Reads the grant mapping from `path`.
pub async fn load(path: &Path) -> Result<GrantMap> {
    let Some(content) = persist::read_optional(path).await? else {
        debug!(path = %path.display(), "no grant file; starting empty");
        return Ok(GrantMap::new());
    };
    if content.trim().is_empty() {
        return Ok(GrantMap::new());
    }
    serde_json::from_str(&content).map_err(|err| Error::CorruptState {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Writes the full grant mapping to `path` atomically.
pub async fn save(path: &Path, grants: &GrantMap) -> Result<()> {
    let json = serde_json::to_vec_pretty(grants).map_err(|err| Error::Store(Box::new(err)))?;
    persist::write_atomic(path, &json).await?;
    Ok(())
}

fn into_store_error(err: Error) -> StoreError {
    match err {
        Error::Store(inner) => inner,
        other => Box::new(other),
    }
}

#[async_trait]
impl GrantStore for FileGrantStore {
    async fn get(&self, subject: &SubjectId) -> std::result::Result<Option<Grant>, StoreError> {
        Ok(self.grants.lock().await.get(subject).cloned())
    }

    async fn put(&self, subject: SubjectId, grant: Grant) -> std::result::Result<(), StoreError> {
        self.commit(move |map| map.insert(subject, grant)).await?;
        Ok(())
    }

    async fn remove(
        &self,
        subject: &SubjectId,
    ) -> std::result::Result<Option<Grant>, StoreError> {
        self.commit(|map| map.remove(subject)).await
    }

    async fn all(&self) -> std::result::Result<Vec<(SubjectId, Grant)>, StoreError> {
        Ok(self.grants.lock().await.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoleId;
    use chrono::{TimeZone, Utc};

    fn grant(role: &str) -> Grant {
        Grant::new(
            RoleId::try_from(role).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn subject(id: &str) -> SubjectId {
        SubjectId::try_from(id).unwrap()
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileGrantStore::open(dir.path().join("data.json")).await.unwrap();
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mutations_survive_reopen_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let store = FileGrantStore::open(&path).await.unwrap();
        store.put(subject("b"), grant("role_b")).await.unwrap();
        store.put(subject("a"), grant("role_a")).await.unwrap();
        store.put(subject("c"), grant("role_c")).await.unwrap();
        assert_eq!(store.remove(&subject("a")).await.unwrap(), Some(grant("role_a")));
        drop(store);

        let reopened = FileGrantStore::open(&path).await.unwrap();
        let subjects: Vec<String> = reopened
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|(subject, _)| subject.to_string())
            .collect();
        assert_eq!(subjects, vec!["b", "c"]);
        assert_eq!(reopened.get(&subject("c")).await.unwrap(), Some(grant("role_c")));
    }

    #[tokio::test]
    async fn malformed_file_is_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileGrantStore::open(&path).await.expect_err("must fail");
        assert!(matches!(err, Error::CorruptState { .. }));
    }

    #[tokio::test]
    async fn open_or_reset_recovers_from_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = FileGrantStore::open_or_reset(&path).await.unwrap();
        assert!(store.all().await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the target path makes the rename fail.
        let path = dir.path().join("data.json");
        std::fs::create_dir(&path).unwrap();
        let store = FileGrantStore {
            path: path.clone(),
            grants: Mutex::new(GrantMap::new()),
        };

        assert!(store.put(subject("a"), grant("role_a")).await.is_err());
        assert!(store.get(&subject("a")).await.unwrap().is_none());
    }
}
