//! Expiring role grants for chat-platform bots.
//!
//! This crate grants a role to a user for a bounded time, persists the grant,
//! and revokes it again from a periodic sweep. The platform itself stays
//! behind two seams: a [`RoleDirectory`] that adds and removes roles, and a
//! [`Notifier`] that receives log events. Use [`Engine`] for the grant
//! lifecycle, [`SweepScheduler`] to expire grants, and [`Commands`] as the
//! command surface for a gateway.
//!
//! # Examples
//!
//! Issuing and sweeping a grant with the in-memory store and directory
//! (enable `memory-store` and `memory-directory`):
//! ```no_run
//! use rs_priority::{EngineBuilder, RoleId, SubjectId, duration};
//! # #[cfg(all(feature = "memory-store", feature = "memory-directory"))]
//! # async fn demo() -> rs_priority::Result<()> {
//! use rs_priority::{MemoryDirectory, MemoryGrantStore};
//! let role = RoleId::try_from("vip")?;
//! let directory = MemoryDirectory::new(10).with_role(role.clone(), 1);
//! let engine = EngineBuilder::new(MemoryGrantStore::new(), directory).build();
//!
//! let now = chrono::Utc::now();
//! let subject = SubjectId::try_from("844831449994887209")?;
//! engine.issue(subject, role, duration::parse("1d")?, now).await?;
//! let revoked = engine.sweep(now + chrono::TimeDelta::days(1)).await?;
//! assert_eq!(revoked.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! Running the sweep on a timer:
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "memory-directory"))]
//! # async fn demo() {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rs_priority::{EngineBuilder, MemoryDirectory, MemoryGrantStore, NoNotifier, SweepScheduler};
//! let engine = Arc::new(EngineBuilder::new(MemoryGrantStore::new(), MemoryDirectory::new(10)).build());
//! let handle = SweepScheduler::new(engine, Arc::new(NoNotifier))
//!     .interval(Duration::from_secs(60))
//!     .spawn();
//! handle.shutdown().await;
//! # }
//! ```
#![forbid(unsafe_code)]

mod commands;
mod config;
mod directory;
pub mod duration;
mod engine;
mod error;
mod file_store;
mod grant;
mod lock;
mod notify;
mod persist;
mod scheduler;
mod store;
mod types;
mod update;
#[cfg(feature = "memory-directory")]
mod memory_directory;

#[cfg(feature = "memory-store")]
mod memory_store;

pub use crate::commands::{Actor, Commands, Member, Notice, Reply};
pub use crate::config::{Config, RoleChoice};
pub use crate::directory::RoleDirectory;
pub use crate::engine::{
    Engine, EngineBuilder, GrantPage, GrantStatus, GrantSummary, RevokeReason, Revocation,
};
pub use crate::error::{DirectoryError, Error, Result, StoreError};
pub use crate::file_store::FileGrantStore;
pub use crate::grant::{Grant, GrantMap};
pub use crate::lock::CommandLock;
pub use crate::notify::{ChannelNotifier, Event, NoNotifier, Notifier, Severity};
pub use crate::scheduler::{SweepHandle, SweepScheduler};
pub use crate::store::GrantStore;
pub use crate::types::{RoleId, SubjectId};
pub use crate::update::{ReleaseSource, UpdateStatus, check_for_updates};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryGrantStore;

#[cfg(feature = "memory-directory")]
pub use crate::memory_directory::MemoryDirectory;
