//! Primitives a storage engine exposes to the backup coordinator.

use std::sync::Arc;

use thiserror::Error;
use walguard_protocol::{SegmentSize, WalPoint};

/// Failure reported by an engine primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
	#[error("engine is read-only and cannot start a backup")]
	ReadOnly,

	#[error("checkpoint failed: {0}")]
	CheckpointFailed(String),

	#[error("engine is not replaying WAL")]
	NotInRecovery,

	#[error("backup protection is not active")]
	NotProtected,

	#[error("engine unavailable: {0}")]
	Unavailable(String),
}

/// Backup-protection primitives of a WAL-based storage engine.
///
/// Protection is a single engine-wide toggle: while it is on, WAL needed to
/// recover a copy taken since [`begin_protection`](Self::begin_protection) is
/// not recycled. Implementations do not count callers; the coordinator calls
/// `begin_protection` once when the first session opens and `end_protection`
/// or `cancel_protection` once when the last one closes.
pub trait StorageEngine: Send + Sync {
	/// Turns protection on and forces a checkpoint.
	///
	/// `fast` requests an immediate checkpoint instead of a throttled one. May
	/// block for the duration of the checkpoint. Returns the position replay of
	/// a copy has to start from. While the engine is replaying WAL the timeline
	/// in the result is not meaningful; use
	/// [`current_replay_position`](Self::current_replay_position).
	fn begin_protection(&self, label: &str, fast: bool) -> Result<WalPoint, EngineError>;

	/// Turns protection off and returns the point a copy has to be replayed to.
	fn end_protection(&self, label_text: &str, wait_for_archive: bool) -> Result<WalPoint, EngineError>;

	/// Turns protection off without computing a stop point.
	///
	/// Must be callable from cleanup paths, so it cannot fail.
	fn cancel_protection(&self);

	/// Last replayed record and the timeline it was replayed on.
	///
	/// Only valid while [`is_in_recovery`](Self::is_in_recovery) is `true`.
	fn current_replay_position(&self) -> Result<WalPoint, EngineError>;

	/// Current WAL insert location. During recovery, the replay location.
	fn current_insert_position(&self) -> Result<WalPoint, EngineError>;

	fn is_in_recovery(&self) -> bool;

	fn segment_size(&self) -> SegmentSize;
}

impl<E: StorageEngine + ?Sized> StorageEngine for Arc<E> {
	fn begin_protection(&self, label: &str, fast: bool) -> Result<WalPoint, EngineError> {
		(**self).begin_protection(label, fast)
	}

	fn end_protection(&self, label_text: &str, wait_for_archive: bool) -> Result<WalPoint, EngineError> {
		(**self).end_protection(label_text, wait_for_archive)
	}

	fn cancel_protection(&self) {
		(**self).cancel_protection()
	}

	fn current_replay_position(&self) -> Result<WalPoint, EngineError> {
		(**self).current_replay_position()
	}

	fn current_insert_position(&self) -> Result<WalPoint, EngineError> {
		(**self).current_insert_position()
	}

	fn is_in_recovery(&self) -> bool {
		(**self).is_in_recovery()
	}

	fn segment_size(&self) -> SegmentSize {
		(**self).segment_size()
	}
}

impl<E: StorageEngine + ?Sized> StorageEngine for &E {
	fn begin_protection(&self, label: &str, fast: bool) -> Result<WalPoint, EngineError> {
		(**self).begin_protection(label, fast)
	}

	fn end_protection(&self, label_text: &str, wait_for_archive: bool) -> Result<WalPoint, EngineError> {
		(**self).end_protection(label_text, wait_for_archive)
	}

	fn cancel_protection(&self) {
		(**self).cancel_protection()
	}

	fn current_replay_position(&self) -> Result<WalPoint, EngineError> {
		(**self).current_replay_position()
	}

	fn current_insert_position(&self) -> Result<WalPoint, EngineError> {
		(**self).current_insert_position()
	}

	fn is_in_recovery(&self) -> bool {
		(**self).is_in_recovery()
	}

	fn segment_size(&self) -> SegmentSize {
		(**self).segment_size()
	}
}
