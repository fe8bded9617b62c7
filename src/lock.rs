use crate::error::{Error, Result};
use crate::persist;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockState {
    #[serde(default)]
    commands_locked: bool,
}

/// Process-wide command lock, persisted to a small state file.
///
/// Reads are lock-free; toggles are serialized so the file always reflects the
/// last in-memory value.
#[derive(Debug)]
pub struct CommandLock {
    locked: AtomicBool,
    path: Option<PathBuf>,
    toggle_guard: Mutex<()>,
}

impl CommandLock {
    /// Creates an unpersisted lock, for tests and embedding.
    pub fn in_memory(locked: bool) -> Self {
        Self {
            locked: AtomicBool::new(locked),
            path: None,
            toggle_guard: Mutex::new(()),
        }
    }

    /// Loads the lock from `path`, writing an unlocked state file if none exists.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match persist::read_optional(&path).await? {
            Some(content) => {
                serde_json::from_str::<LockState>(&content).map_err(|err| Error::CorruptState {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })?
            }
            None => {
                let state = LockState::default();
                write_state(&path, &state).await?;
                state
            }
        };
        info!(locked = state.commands_locked, "command lock loaded");
        Ok(Self {
            locked: AtomicBool::new(state.commands_locked),
            path: Some(path),
            toggle_guard: Mutex::new(()),
        })
    }

    /// Returns whether mutating commands are restricted to privileged callers.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Flips the lock, persists it, and returns the new value.
    ///
    /// If persisting fails the in-memory value is left unchanged.
    pub async fn toggle(&self) -> Result<bool> {
        let _guard = self.toggle_guard.lock().await;
        let next = !self.is_locked();
        if let Some(path) = &self.path {
            write_state(path, &LockState { commands_locked: next }).await?;
        }
        self.locked.store(next, Ordering::Release);
        info!(locked = next, "command lock toggled");
        Ok(next)
    }
}

async fn write_state(path: &Path, state: &LockState) -> Result<()> {
    let json = serde_json::to_vec(state).map_err(|err| Error::Store(Box::new(err)))?;
    persist::write_atomic(path, &json).await?;
    Ok(())
}
