use crate::error::DirectoryError;
use crate::types::{RoleId, SubjectId};
use async_trait::async_trait;

/// Role membership capability of the chat platform.
///
/// Implementations talk to the external gateway. The engine wraps every call
/// in a timeout, so implementations need not enforce one themselves.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Returns whether the subject currently holds the role.
    async fn has_role(
        &self,
        subject: &SubjectId,
        role: &RoleId,
    ) -> std::result::Result<bool, DirectoryError>;

    /// Adds the role to the subject.
    async fn add_role(
        &self,
        subject: &SubjectId,
        role: &RoleId,
    ) -> std::result::Result<(), DirectoryError>;

    /// Removes the role from the subject.
    async fn remove_role(
        &self,
        subject: &SubjectId,
        role: &RoleId,
    ) -> std::result::Result<(), DirectoryError>;

    /// Returns whether the acting identity outranks the role and may manage it.
    async fn can_manage_role(&self, role: &RoleId) -> std::result::Result<bool, DirectoryError>;
}
