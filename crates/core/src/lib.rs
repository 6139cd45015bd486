//! Coordinator for concurrent physical backups of a WAL-based storage engine.
//!
//! An engine's backup protection is one global toggle. This crate lets any
//! number of independent backup sessions share it: the [`SessionRegistry`]
//! reference-counts the toggle so it is switched on by the first open session and
//! off by the last, and the [`BackupCoordinator`] runs each session's lifecycle
//! (begin, end, abort) and computes the label text and stop segment a backup tool
//! needs.
//!
//! Sessions are anonymous. The label text returned by
//! [`BackupCoordinator::start_backup`] is the only handle to a session; whoever
//! presents it can finish or abort the session, from any thread.

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod session;

pub use auth::{Caller, Role};
pub use config::CoordinatorConfig;
pub use coordinator::{BackupCoordinator, StopInfo};
pub use error::{BackupError, Result};
pub use registry::{ProtectionState, ProtectionStatus, RegistryGuard, Release, SessionRegistry};
pub use session::{BackupSession, SessionState, SessionSummary};
pub use walguard_protocol as protocol;
pub use walguard_runtime as runtime;
