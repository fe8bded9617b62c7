use crate::directory::RoleDirectory;
use crate::error::{DirectoryError, Error, Result};
use crate::grant::Grant;
use crate::store::GrantStore;
use crate::types::{RoleId, SubjectId};
use chrono::{DateTime, TimeDelta, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const DEFAULT_DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a grant is being revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    /// Removed on request.
    Manual,
    /// Swept after its expiry instant.
    Expired,
}

/// Read-only view of a subject's grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantStatus {
    pub role_id: RoleId,
    pub expires_at: DateTime<Utc>,
    /// Time left, never negative.
    pub remaining: TimeDelta,
}

/// One row of a [`GrantPage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantSummary {
    pub subject: SubjectId,
    pub role_id: RoleId,
    pub expires_at: DateTime<Utc>,
    pub remaining: TimeDelta,
}

/// A page of grants in store order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantPage {
    /// 1-indexed page number that was requested.
    pub page: usize,
    pub page_size: usize,
    /// Total number of grants across all pages.
    pub total: usize,
    pub total_pages: usize,
    pub entries: Vec<GrantSummary>,
}

/// A grant removed by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub subject: SubjectId,
    pub grant: Grant,
}

/// Expiring-grant lifecycle engine.
///
/// Every mutation (`issue`, `revoke`, `sweep`) runs under one writer lock so
/// the check-then-act sequence against the store is atomic and a subject never
/// holds more than one grant. The role directory is always called before the
/// store is written.
#[derive(Debug)]
pub struct Engine<S, D> {
    store: S,
    directory: D,
    directory_timeout: Duration,
    writer: Mutex<()>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder<S, D> {
    store: S,
    directory: D,
    directory_timeout: Duration,
}

impl<S, D> EngineBuilder<S, D> {
    /// Creates a new builder with default configuration.
    pub fn new(store: S, directory: D) -> Self {
        Self {
            store,
            directory,
            directory_timeout: DEFAULT_DIRECTORY_TIMEOUT,
        }
    }

    /// Sets the upper bound for a single role directory call.
    pub fn directory_timeout(mut self, timeout: Duration) -> Self {
        self.directory_timeout = timeout;
        self
    }

    /// Builds the engine.
    pub fn build(self) -> Engine<S, D> {
        Engine {
            store: self.store,
            directory: self.directory,
            directory_timeout: self.directory_timeout,
            writer: Mutex::new(()),
        }
    }
}

impl<S, D> Engine<S, D> {
    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the underlying role directory.
    pub fn directory(&self) -> &D {
        &self.directory
    }
}

impl<S, D> Engine<S, D>
where
    S: GrantStore,
    D: RoleDirectory,
{
    /// Grants `role` to `subject` until `now + duration`.
    pub async fn issue(
        &self,
        subject: SubjectId,
        role: RoleId,
        duration: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<Grant> {
        if duration <= TimeDelta::zero() {
            return Err(Error::InvalidFormat(
                "grant duration must be positive".to_string(),
            ));
        }
        let expires_at = now
            .checked_add_signed(duration)
            .ok_or_else(|| Error::InvalidFormat("grant expiry out of range".to_string()))?;

        let _writer = self.writer.lock().await;

        if self.store.get(&subject).await?.is_some() {
            return Err(Error::AlreadyActive { subject });
        }
        if !self.call_directory(self.directory.can_manage_role(&role)).await? {
            return Err(Error::AuthorizationDenied { role });
        }
        if let Err(err) = self.call_directory(self.directory.add_role(&subject, &role)).await {
            warn!(subject = %subject, role = %role, error = %err, "failed to add role");
            return Err(err);
        }

        let grant = Grant::new(role, expires_at);
        if let Err(err) = self.store.put(subject.clone(), grant.clone()).await {
            error!(subject = %subject, role = %grant.role_id, error = %err, "failed to persist grant");
            // A role without a stored grant would never expire.
            if let Err(undo) = self
                .call_directory(self.directory.remove_role(&subject, &grant.role_id))
                .await
            {
                warn!(subject = %subject, role = %grant.role_id, error = %undo, "failed to undo role add");
            }
            return Err(err.into());
        }
        info!(
            subject = %subject,
            role = %grant.role_id,
            expires_at = %grant.expires_at,
            "grant issued"
        );
        Ok(grant)
    }

    /// Revokes the subject's grant and returns the removed record.
    ///
    /// A manual revoke is refused with [`Error::AuthorizationDenied`] when the
    /// role cannot be managed. Other directory failures are logged and the
    /// grant is dropped from the store anyway.
    pub async fn revoke(
        &self,
        subject: &SubjectId,
        now: DateTime<Utc>,
        reason: RevokeReason,
    ) -> Result<Grant> {
        let _writer = self.writer.lock().await;
        let grant = self
            .store
            .get(subject)
            .await?
            .ok_or_else(|| Error::NoActiveGrant {
                subject: subject.clone(),
            })?;
        self.revoke_locked(subject, grant, now, reason).await
    }

    /// Revokes every grant whose expiry is at or before `now`.
    ///
    /// A failure for one subject is logged and the pass continues.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Revocation>> {
        let _writer = self.writer.lock().await;
        let expired: Vec<(SubjectId, Grant)> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|(_, grant)| grant.is_expired(now))
            .collect();

        let mut revoked = Vec::with_capacity(expired.len());
        for (subject, grant) in expired {
            match self
                .revoke_locked(&subject, grant, now, RevokeReason::Expired)
                .await
            {
                Ok(grant) => revoked.push(Revocation { subject, grant }),
                Err(err) => {
                    error!(subject = %subject, error = %err, "failed to revoke expired grant");
                }
            }
        }
        if !revoked.is_empty() {
            info!(count = revoked.len(), "sweep revoked expired grants");
        }
        Ok(revoked)
    }

    /// Returns the subject's grant and the time left on it.
    pub async fn status(
        &self,
        subject: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<Option<GrantStatus>> {
        Ok(self.store.get(subject).await?.map(|grant| GrantStatus {
            remaining: grant.remaining(now),
            role_id: grant.role_id,
            expires_at: grant.expires_at,
        }))
    }

    /// Returns one 1-indexed page of grants in store order.
    ///
    /// Pages past the end, and page 0, are empty rather than an error.
    pub async fn list(
        &self,
        page: usize,
        page_size: usize,
        now: DateTime<Utc>,
    ) -> Result<GrantPage> {
        let page_size = page_size.max(1);
        let grants = self.store.all().await?;
        let total = grants.len();

        let entries = match page
            .checked_sub(1)
            .and_then(|index| index.checked_mul(page_size))
        {
            Some(start) => grants
                .into_iter()
                .skip(start)
                .take(page_size)
                .map(|(subject, grant)| GrantSummary {
                    remaining: grant.remaining(now),
                    subject,
                    role_id: grant.role_id,
                    expires_at: grant.expires_at,
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(GrantPage {
            page,
            page_size,
            total,
            total_pages: total.div_ceil(page_size),
            entries,
        })
    }

    async fn revoke_locked(
        &self,
        subject: &SubjectId,
        grant: Grant,
        now: DateTime<Utc>,
        reason: RevokeReason,
    ) -> Result<Grant> {
        let role = &grant.role_id;
        match self.call_directory(self.directory.can_manage_role(role)).await {
            Ok(true) => self.release_role(subject, role).await,
            Ok(false) if reason == RevokeReason::Manual => {
                return Err(Error::AuthorizationDenied { role: role.clone() });
            }
            Ok(false) => {
                warn!(subject = %subject, role = %role, "cannot manage role; dropping expired grant");
            }
            Err(err) => {
                warn!(subject = %subject, role = %role, error = %err, "authority check failed");
                self.release_role(subject, role).await;
            }
        }

        let removed = self.store.remove(subject).await?.unwrap_or(grant);
        info!(
            subject = %subject,
            role = %removed.role_id,
            ?reason,
            remaining = %removed.remaining(now),
            "grant revoked"
        );
        Ok(removed)
    }

    async fn release_role(&self, subject: &SubjectId, role: &RoleId) {
        match self.call_directory(self.directory.has_role(subject, role)).await {
            Ok(false) => {
                debug!(subject = %subject, role = %role, "role already absent");
                return;
            }
            Ok(true) => {}
            Err(err) => {
                warn!(subject = %subject, role = %role, error = %err, "membership check failed");
            }
        }
        if let Err(err) = self
            .call_directory(self.directory.remove_role(subject, role))
            .await
        {
            warn!(subject = %subject, role = %role, error = %err, "failed to remove role");
        }
    }

    async fn call_directory<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, DirectoryError>>,
    {
        match tokio::time::timeout(self.directory_timeout, call).await {
            Ok(result) => result.map_err(Error::Directory),
            Err(_) => Err(Error::DirectoryTimeout {
                timeout: self.directory_timeout,
            }),
        }
    }
}
