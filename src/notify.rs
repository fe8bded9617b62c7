use crate::duration;
use crate::types::SubjectId;
use async_trait::async_trait;
use chrono::TimeDelta;
use tokio::sync::mpsc;

/// Event category, rendered as an embed color by the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A grant was issued.
    Granted,
    /// A grant was revoked, manually or by expiry.
    Revoked,
    /// A newer release is available.
    Update,
    /// Informational status.
    Status,
}

impl Severity {
    /// Hex color tag for the event.
    pub fn color(self) -> &'static str {
        match self {
            Self::Granted => "#0000FF",
            Self::Revoked => "#FF0000",
            Self::Update => "#FFFF00",
            Self::Status => "#00FF00",
        }
    }
}

/// Notification payload handed to an external notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Event {
    pub fn new(title: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
        }
    }

    /// A grant was issued by `executor`.
    pub fn grant_issued(
        subject: &SubjectId,
        role_name: &str,
        duration: TimeDelta,
        executor: &SubjectId,
    ) -> Self {
        Self::new(
            "Priority Given",
            format!(
                "Priority {role_name} assigned to {} (ID: {subject}) for {} by {} (ID: {executor}).",
                subject.mention(),
                duration::format(duration),
                executor.mention(),
            ),
            Severity::Granted,
        )
    }

    /// A grant was removed by `executor`.
    pub fn grant_removed(subject: &SubjectId, role_name: &str, executor: &SubjectId) -> Self {
        Self::new(
            "Priority Removed",
            format!(
                "Priority {role_name} removed from {} (ID: {subject}) by {} (ID: {executor}).",
                subject.mention(),
                executor.mention(),
            ),
            Severity::Revoked,
        )
    }

    /// A grant ran out and was swept.
    pub fn grant_expired(subject: &SubjectId, role_name: &str) -> Self {
        Self::new(
            "Priority Removed",
            format!(
                "Removed priority {role_name} from {} (ID: {subject})",
                subject.mention(),
            ),
            Severity::Revoked,
        )
    }

    /// A newer release than the running one exists.
    pub fn update_available(current: &str, latest: &str) -> Self {
        Self::new(
            "Update Available",
            format!(
                "A new version of the bot is available!\nCurrent version: {current}\nLatest version: {latest}\nPlease update the bot to the latest version."
            ),
            Severity::Update,
        )
    }
}

/// Sink for notification events.
///
/// Delivery is fire-and-forget: implementations log their own failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: Event);
}

/// Notifier that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNotifier;

#[async_trait]
impl Notifier for NoNotifier {
    async fn notify(&self, _event: Event) {}
}

/// Notifier that forwards events over an unbounded channel.
///
/// The receiving side typically posts them to a webhook.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: Event) {
        if self.sender.send(event).is_err() {
            tracing::warn!("notification receiver dropped; event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_notifier_forwards_events() {
        let (notifier, mut receiver) = ChannelNotifier::new();
        let subject = SubjectId::try_from("42").unwrap();

        notifier.notify(Event::grant_expired(&subject, "Gold")).await;

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.title, "Priority Removed");
        assert_eq!(event.severity.color(), "#FF0000");
        assert_eq!(event.description, "Removed priority Gold from <@42> (ID: 42)");
    }

    #[test]
    fn issued_event_formats_duration() {
        let event = Event::grant_issued(
            &SubjectId::try_from("1").unwrap(),
            "Owner",
            TimeDelta::days(2),
            &SubjectId::try_from("2").unwrap(),
        );
        assert_eq!(
            event.description,
            "Priority Owner assigned to <@1> (ID: 1) for 2 day(s) by <@2> (ID: 2)."
        );
        assert_eq!(event.severity, Severity::Granted);
    }
}
