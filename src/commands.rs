//! Platform-neutral command surface.
//!
//! Every command returns a [`Reply`]; errors are rendered into the message and
//! never escape to the gateway.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::error;

use crate::config::Config;
use crate::directory::RoleDirectory;
use crate::duration;
use crate::engine::{Engine, RevokeReason};
use crate::error::Error;
use crate::lock::CommandLock;
use crate::notify::Event;
use crate::store::GrantStore;
use crate::types::{RoleId, SubjectId};

const DENIED: &str = "You do not have permission to use this command.";
const INVALID_DURATION: &str = "Invalid time format. Use 1s, 1m, 1h, 1d, 1w, or 1mo.";

/// A platform user targeted by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: SubjectId,
    /// Human-readable handle, e.g. `name#0001`.
    pub tag: String,
}

impl Member {
    pub fn new(id: SubjectId, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
        }
    }
}

/// The user invoking a command, with the roles they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: SubjectId,
    pub tag: String,
    pub roles: Vec<RoleId>,
}

/// A direct message for a user other than the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub recipient: SubjectId,
    pub message: String,
}

/// Outcome of a command: a message for the invoker, an optional event for
/// the log channel, and an optional direct message for the target user.
///
/// Delivering the notice is best effort; a user with closed DMs does not
/// change the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: String,
    pub event: Option<Event>,
    pub notice: Option<Notice>,
}

impl Reply {
    fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            event: None,
            notice: None,
        }
    }

    fn with_event(message: impl Into<String>, event: Event) -> Self {
        Self {
            message: message.into(),
            event: Some(event),
            notice: None,
        }
    }

    fn notify(mut self, recipient: &SubjectId, message: impl Into<String>) -> Self {
        self.notice = Some(Notice {
            recipient: recipient.clone(),
            message: message.into(),
        });
        self
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Command façade over the [`Engine`] and the [`CommandLock`].
pub struct Commands<S, D> {
    engine: Arc<Engine<S, D>>,
    lock: Arc<CommandLock>,
    config: Arc<Config>,
    clock: Clock,
}

impl<S, D> Commands<S, D>
where
    S: GrantStore,
    D: RoleDirectory,
{
    pub fn new(engine: Arc<Engine<S, D>>, lock: Arc<CommandLock>, config: Arc<Config>) -> Self {
        Self {
            engine,
            lock,
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock, for tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn is_privileged(&self, actor: &Actor) -> bool {
        actor
            .roles
            .iter()
            .any(|role| self.config.allowed_roles.contains(role))
    }

    fn gate(&self, actor: &Actor) -> Option<Reply> {
        (self.lock.is_locked() && !self.is_privileged(actor)).then(|| Reply::text(DENIED))
    }

    /// Grants the chosen role to `user` for `duration_text`.
    pub async fn issue_priority(
        &self,
        actor: &Actor,
        user: &Member,
        role_choice: &str,
        duration_text: &str,
    ) -> Reply {
        if let Some(denied) = self.gate(actor) {
            return denied;
        }
        let Ok(duration) = duration::parse(duration_text) else {
            return Reply::text(INVALID_DURATION);
        };
        let Some(choice) = self.config.role_choice(role_choice) else {
            return Reply::text("Invalid priority or role.");
        };

        let now = (self.clock)();
        match self
            .engine
            .issue(user.id.clone(), choice.value.clone(), duration, now)
            .await
        {
            Ok(grant) => Reply::with_event(
                format!(
                    "Priority {} has been assigned to {} for {duration_text} by {}.",
                    choice.name, user.tag, actor.tag,
                ),
                Event::grant_issued(&user.id, &choice.name, duration, &actor.id),
            )
            .notify(
                &user.id,
                format!(
                    "You have been given the {} priority for {duration_text}. It will be active until <t:{}:F>.",
                    choice.name,
                    grant.expires_at.timestamp(),
                ),
            ),
            Err(Error::AlreadyActive { .. }) => {
                Reply::text(format!("{} already has a priority.", user.tag))
            }
            Err(Error::AuthorizationDenied { .. }) => Reply::text(format!(
                "I cannot assign the {} role because it is higher than or equal to my highest role.",
                choice.name
            )),
            Err(err) if err.is_directory() => Reply::text(format!(
                "Could not assign {} to {}: {err}",
                choice.name, user.tag
            )),
            Err(err) => internal(err),
        }
    }

    /// Revokes `user`'s grant immediately.
    pub async fn remove_priority(&self, actor: &Actor, user: &Member) -> Reply {
        if let Some(denied) = self.gate(actor) {
            return denied;
        }

        let now = (self.clock)();
        match self.engine.revoke(&user.id, now, RevokeReason::Manual).await {
            Ok(grant) => {
                let name = self.config.role_name(&grant.role_id);
                Reply::with_event(
                    format!(
                        "Priority {name} has been removed from {} by {}.",
                        user.tag, actor.tag
                    ),
                    Event::grant_removed(&user.id, &name, &actor.id),
                )
            }
            Err(Error::NoActiveGrant { .. }) => {
                Reply::text(format!("{} does not have an assigned priority.", user.tag))
            }
            Err(Error::AuthorizationDenied { role }) => Reply::text(format!(
                "I cannot remove the {} role because it is higher than or equal to my highest role.",
                self.config.role_name(&role)
            )),
            Err(err) => internal(err),
        }
    }

    /// Lists active grants; `page` defaults to 1.
    pub async fn list_priorities(&self, page: Option<usize>) -> Reply {
        let now = (self.clock)();
        let page = page.unwrap_or(1);
        let listing = match self.engine.list(page, self.config.page_size, now).await {
            Ok(listing) => listing,
            Err(err) => return internal(err),
        };

        let mut message = String::from("Priority Assignments\n");
        for entry in &listing.entries {
            let _ = write!(
                message,
                "\n{}\nPriority: {}\nExpires in: {}\nUser ID: {}\nExpires at: <t:{}:F>\n",
                entry.subject.mention(),
                self.config.role_name(&entry.role_id),
                duration::format(entry.remaining),
                entry.subject,
                entry.expires_at.timestamp(),
            );
        }
        let _ = write!(
            message,
            "\nPage {} of {} • Total: {} items",
            listing.page, listing.total_pages, listing.total
        );
        Reply::text(message)
    }

    /// Reports `user`'s current grant.
    pub async fn check_priority(&self, user: &Member) -> Reply {
        let now = (self.clock)();
        match self.engine.status(&user.id, now).await {
            Ok(Some(status)) => Reply::text(format!(
                "{} ({}) has the {} priority.\nExpires in: {}\nExpires at: <t:{}:F>",
                user.id.mention(),
                user.tag,
                self.config.role_name(&status.role_id),
                duration::format(status.remaining),
                status.expires_at.timestamp(),
            )),
            Ok(None) => Reply::text(format!(
                "{} does not have any assigned priority.",
                user.tag
            )),
            Err(err) => internal(err),
        }
    }

    /// Flips the command lock. Always requires a privileged role.
    pub async fn toggle_lock(&self, actor: &Actor) -> Reply {
        if !self.is_privileged(actor) {
            return Reply::text(DENIED);
        }
        match self.lock.toggle().await {
            Ok(locked) => Reply::text(format!(
                "Command lock is now {}.",
                if locked { "enabled" } else { "disabled" }
            )),
            Err(err) => internal(err),
        }
    }
}

fn internal(err: Error) -> Reply {
    error!(error = %err, "command failed");
    Reply::text(format!("Something went wrong: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineBuilder;
    use crate::error::{DirectoryError, StoreError};
    use crate::grant::{Grant, GrantMap};
    use crate::notify::Severity;
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone};
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct TestStore {
        grants: StdMutex<GrantMap>,
    }

    #[async_trait]
    impl GrantStore for TestStore {
        async fn get(
            &self,
            subject: &SubjectId,
        ) -> std::result::Result<Option<Grant>, StoreError> {
            Ok(self.grants.lock().unwrap().get(subject).cloned())
        }

        async fn put(
            &self,
            subject: SubjectId,
            grant: Grant,
        ) -> std::result::Result<(), StoreError> {
            self.grants.lock().unwrap().insert(subject, grant);
            Ok(())
        }

        async fn remove(
            &self,
            subject: &SubjectId,
        ) -> std::result::Result<Option<Grant>, StoreError> {
            Ok(self.grants.lock().unwrap().remove(subject))
        }

        async fn all(&self) -> std::result::Result<Vec<(SubjectId, Grant)>, StoreError> {
            Ok(self.grants.lock().unwrap().to_vec())
        }
    }

    /// Manages every role except those listed in `outranked`.
    #[derive(Default)]
    struct TestDirectory {
        outranked: HashSet<RoleId>,
    }

    #[async_trait]
    impl RoleDirectory for TestDirectory {
        async fn has_role(
            &self,
            _subject: &SubjectId,
            _role: &RoleId,
        ) -> std::result::Result<bool, DirectoryError> {
            Ok(true)
        }

        async fn add_role(
            &self,
            _subject: &SubjectId,
            _role: &RoleId,
        ) -> std::result::Result<(), DirectoryError> {
            Ok(())
        }

        async fn remove_role(
            &self,
            _subject: &SubjectId,
            _role: &RoleId,
        ) -> std::result::Result<(), DirectoryError> {
            Ok(())
        }

        async fn can_manage_role(
            &self,
            role: &RoleId,
        ) -> std::result::Result<bool, DirectoryError> {
            Ok(!self.outranked.contains(role))
        }
    }

    fn config() -> Config {
        Config::from_toml_str(
            r#"
            allowed_roles = ["staff"]
            page_size = 2

            [[roles]]
            name = "Gold"
            value = "role_gold"

            [[roles]]
            name = "Owner"
            value = "role_owner"
            "#,
        )
        .unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn commands(locked: bool) -> Commands<TestStore, TestDirectory> {
        let directory = TestDirectory {
            outranked: HashSet::from([RoleId::try_from("role_owner").unwrap()]),
        };
        let engine = Arc::new(EngineBuilder::new(TestStore::default(), directory).build());
        Commands::new(
            engine,
            Arc::new(CommandLock::in_memory(locked)),
            Arc::new(config()),
        )
        .with_clock(t0)
    }

    fn actor(roles: &[&str]) -> Actor {
        Actor {
            id: SubjectId::try_from("admin_1").unwrap(),
            tag: "admin#0001".to_string(),
            roles: roles.iter().map(|r| RoleId::try_from(*r).unwrap()).collect(),
        }
    }

    fn member(id: &str) -> Member {
        Member::new(SubjectId::try_from(id).unwrap(), format!("{id}#0001"))
    }

    #[tokio::test]
    async fn issue_replies_and_emits_event() {
        let commands = commands(false);

        let reply = commands
            .issue_priority(&actor(&[]), &member("u1"), "Gold", "1d")
            .await;

        assert_eq!(
            reply.message,
            "Priority Gold has been assigned to u1#0001 for 1d by admin#0001."
        );
        let expires = (t0() + TimeDelta::days(1)).timestamp();
        let notice = reply.notice.unwrap();
        assert_eq!(notice.recipient, SubjectId::try_from("u1").unwrap());
        assert_eq!(
            notice.message,
            format!("You have been given the Gold priority for 1d. It will be active until <t:{expires}:F>.")
        );
        let event = reply.event.unwrap();
        assert_eq!(event.title, "Priority Given");
        assert_eq!(event.severity, Severity::Granted);
    }

    #[tokio::test]
    async fn issue_reports_user_errors() {
        let commands = commands(false);
        let admin = actor(&[]);

        let reply = commands.issue_priority(&admin, &member("u1"), "Gold", "1y").await;
        assert_eq!(reply.message, INVALID_DURATION);

        let reply = commands.issue_priority(&admin, &member("u1"), "Silver", "1d").await;
        assert_eq!(reply.message, "Invalid priority or role.");

        let reply = commands.issue_priority(&admin, &member("u1"), "Owner", "1d").await;
        assert!(reply.message.starts_with("I cannot assign the Owner role"));
        assert!(reply.event.is_none());
        assert!(reply.notice.is_none());

        commands.issue_priority(&admin, &member("u1"), "Gold", "1d").await;
        let reply = commands.issue_priority(&admin, &member("u1"), "Gold", "1d").await;
        assert_eq!(reply.message, "u1#0001 already has a priority.");
    }

    #[tokio::test]
    async fn lock_blocks_unprivileged_mutations_only() {
        let commands = commands(true);

        let reply = commands
            .issue_priority(&actor(&["member"]), &member("u1"), "Gold", "1d")
            .await;
        assert_eq!(reply.message, DENIED);
        let reply = commands.remove_priority(&actor(&[]), &member("u1")).await;
        assert_eq!(reply.message, DENIED);

        let reply = commands
            .issue_priority(&actor(&["staff"]), &member("u1"), "Gold", "1d")
            .await;
        assert!(reply.event.is_some());

        let reply = commands.check_priority(&member("u1")).await;
        assert!(reply.message.contains("has the Gold priority"));
    }

    #[tokio::test]
    async fn remove_then_check_reports_absent() {
        let commands = commands(false);
        let admin = actor(&[]);
        commands.issue_priority(&admin, &member("u1"), "Gold", "2h").await;

        let reply = commands.remove_priority(&admin, &member("u1")).await;
        assert_eq!(
            reply.message,
            "Priority Gold has been removed from u1#0001 by admin#0001."
        );
        assert_eq!(reply.event.unwrap().severity, Severity::Revoked);

        let reply = commands.remove_priority(&admin, &member("u1")).await;
        assert_eq!(reply.message, "u1#0001 does not have an assigned priority.");
        let reply = commands.check_priority(&member("u1")).await;
        assert_eq!(reply.message, "u1#0001 does not have any assigned priority.");
    }

    #[tokio::test]
    async fn check_formats_remaining_time() {
        let commands = commands(false);
        commands.issue_priority(&actor(&[]), &member("u1"), "Gold", "2h").await;

        let reply = commands.check_priority(&member("u1")).await;
        assert!(reply.message.starts_with("<@u1> (u1#0001) has the Gold priority."));
        assert!(reply.message.contains("Expires in: 2 hour(s)"));
    }

    #[tokio::test]
    async fn list_pages_with_footer() {
        let commands = commands(false);
        for id in ["u1", "u2", "u3"] {
            commands.issue_priority(&actor(&[]), &member(id), "Gold", "1w").await;
        }

        let first = commands.list_priorities(None).await;
        assert!(first.message.contains("<@u1>"));
        assert!(first.message.contains("<@u2>"));
        assert!(!first.message.contains("<@u3>"));
        assert!(first.message.ends_with("Page 1 of 2 • Total: 3 items"));

        let second = commands.list_priorities(Some(2)).await;
        assert!(second.message.contains("Expires in: 1 week(s)"));
        assert!(second.message.contains("<@u3>"));

        let empty = commands.list_priorities(Some(9)).await;
        assert!(!empty.message.contains("<@"));
    }

    #[tokio::test]
    async fn toggle_requires_privilege() {
        let commands = commands(false);

        let reply = commands.toggle_lock(&actor(&["member"])).await;
        assert_eq!(reply.message, DENIED);

        let reply = commands.toggle_lock(&actor(&["staff"])).await;
        assert_eq!(reply.message, "Command lock is now enabled.");
        let reply = commands.toggle_lock(&actor(&["staff"])).await;
        assert_eq!(reply.message, "Command lock is now disabled.");
    }
}
