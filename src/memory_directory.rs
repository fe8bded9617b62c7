use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use crate::directory::RoleDirectory;
use crate::error::DirectoryError;
use crate::types::{RoleId, SubjectId};

/// In-memory role directory for tests and demos.
///
/// Roles carry a position; the acting identity may manage a role only when its
/// own position is strictly higher, as on the chat platform.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    inner: Arc<Mutex<DirectoryState>>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    own_position: u32,
    role_positions: HashMap<RoleId, u32>,
    members: HashMap<SubjectId, HashSet<RoleId>>,
    add_calls: usize,
    remove_calls: usize,
    fail_add: bool,
    fail_remove: bool,
    latency: Option<Duration>,
}

fn poisoned() -> DirectoryError {
    "poisoned lock".into()
}

impl MemoryDirectory {
    /// Creates a directory whose acting identity sits at `own_position`.
    pub fn new(own_position: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DirectoryState {
                own_position,
                ..DirectoryState::default()
            })),
        }
    }

    /// Registers a role at a hierarchy position.
    pub fn with_role(self, role: RoleId, position: u32) -> Self {
        if let Ok(mut guard) = self.inner.lock() {
            guard.role_positions.insert(role, position);
        }
        self
    }

    /// Makes `add_role` fail.
    pub fn set_fail_add(&self, fail: bool) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.fail_add = fail;
        }
    }

    /// Makes `remove_role` fail.
    pub fn set_fail_remove(&self, fail: bool) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.fail_remove = fail;
        }
    }

    /// Delays every mutating call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.latency = latency;
        }
    }

    /// Returns whether the subject holds the role, without going through the trait.
    pub fn holds(&self, subject: &SubjectId, role: &RoleId) -> bool {
        self.inner
            .lock()
            .map(|guard| {
                guard
                    .members
                    .get(subject)
                    .is_some_and(|roles| roles.contains(role))
            })
            .unwrap_or(false)
    }

    /// Number of `add_role` calls that reached the directory.
    pub fn add_calls(&self) -> usize {
        self.inner.lock().map(|guard| guard.add_calls).unwrap_or(0)
    }

    /// Number of `remove_role` calls that reached the directory.
    pub fn remove_calls(&self) -> usize {
        self.inner.lock().map(|guard| guard.remove_calls).unwrap_or(0)
    }

    fn latency(&self) -> Option<Duration> {
        self.inner.lock().ok().and_then(|guard| guard.latency)
    }
}

#[async_trait]
impl RoleDirectory for MemoryDirectory {
    async fn has_role(
        &self,
        subject: &SubjectId,
        role: &RoleId,
    ) -> std::result::Result<bool, DirectoryError> {
        Ok(self.holds(subject, role))
    }

    async fn add_role(
        &self,
        subject: &SubjectId,
        role: &RoleId,
    ) -> std::result::Result<(), DirectoryError> {
        if let Some(latency) = self.latency() {
            tokio::time::sleep(latency).await;
        }
        let mut guard = self.inner.lock().map_err(|_| poisoned())?;
        guard.add_calls += 1;
        if guard.fail_add {
            return Err("missing permissions".into());
        }
        if !guard.role_positions.contains_key(role) {
            return Err(format!("unknown role {role}").into());
        }
        guard
            .members
            .entry(subject.clone())
            .or_default()
            .insert(role.clone());
        Ok(())
    }

    async fn remove_role(
        &self,
        subject: &SubjectId,
        role: &RoleId,
    ) -> std::result::Result<(), DirectoryError> {
        if let Some(latency) = self.latency() {
            tokio::time::sleep(latency).await;
        }
        let mut guard = self.inner.lock().map_err(|_| poisoned())?;
        guard.remove_calls += 1;
        if guard.fail_remove {
            return Err("missing permissions".into());
        }
        if let Some(roles) = guard.members.get_mut(subject) {
            roles.remove(role);
        }
        Ok(())
    }

    async fn can_manage_role(&self, role: &RoleId) -> std::result::Result<bool, DirectoryError> {
        let guard = self.inner.lock().map_err(|_| poisoned())?;
        Ok(guard
            .role_positions
            .get(role)
            .is_some_and(|position| *position < guard.own_position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn role(value: &str) -> RoleId {
        RoleId::try_from(value).unwrap()
    }

    #[test]
    fn authority_requires_strictly_higher_position() {
        let directory = MemoryDirectory::new(5)
            .with_role(role("vip"), 3)
            .with_role(role("peer"), 5)
            .with_role(role("owner"), 9);

        assert!(block_on(directory.can_manage_role(&role("vip"))).unwrap());
        assert!(!block_on(directory.can_manage_role(&role("peer"))).unwrap());
        assert!(!block_on(directory.can_manage_role(&role("owner"))).unwrap());
        assert!(!block_on(directory.can_manage_role(&role("unknown"))).unwrap());
    }

    #[test]
    fn add_and_remove_track_membership() {
        let directory = MemoryDirectory::new(5).with_role(role("vip"), 1);
        let subject = SubjectId::try_from("user_1").unwrap();

        block_on(directory.add_role(&subject, &role("vip"))).unwrap();
        assert!(block_on(directory.has_role(&subject, &role("vip"))).unwrap());
        block_on(directory.remove_role(&subject, &role("vip"))).unwrap();
        assert!(!directory.holds(&subject, &role("vip")));
        assert_eq!((directory.add_calls(), directory.remove_calls()), (1, 1));
    }
}
