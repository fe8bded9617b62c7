use crate::error::{Error, Result, StoreError};
use crate::notify::{Event, Severity};
use async_trait::async_trait;
use tracing::info;

/// Source of the latest published release tag, e.g. a releases API.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_version(&self) -> std::result::Result<String, StoreError>;
}

/// Result of comparing the running version against the latest release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate { version: String },
    Available { current: String, latest: String },
}

impl UpdateStatus {
    /// Notification for this result.
    pub fn event(&self) -> Event {
        match self {
            Self::Available { current, latest } => Event::update_available(current, latest),
            Self::UpToDate { version } => Event::new(
                "Up To Date",
                format!("Bot is up-to-date. Version: {version}"),
                Severity::Status,
            ),
        }
    }
}

/// Compares `current` with the latest release. A leading `v` is ignored on
/// either side.
pub async fn check_for_updates<R: ReleaseSource + ?Sized>(
    source: &R,
    current: &str,
) -> Result<UpdateStatus> {
    let latest = source.latest_version().await.map_err(Error::UpdateCheck)?;
    let status = if normalize(&latest) == normalize(current) {
        UpdateStatus::UpToDate {
            version: current.to_string(),
        }
    } else {
        UpdateStatus::Available {
            current: current.to_string(),
            latest,
        }
    };
    info!(?status, "update check finished");
    Ok(status)
}

fn normalize(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed)
}
