//! Lifecycle of individual backup sessions.
//!
//! Each operation checks the caller's privilege first, then runs entirely inside
//! one registry critical section, so a session's state change and the matching
//! protection reference change are never observed apart.

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walguard_protocol::{BackupLabel, CONCURRENT_METHOD, TimelineId, WalPoint};
use walguard_runtime::{EngineError, StorageEngine};

use crate::auth::{Caller, authorize};
use crate::config::CoordinatorConfig;
use crate::error::{BackupError, Result};
use crate::registry::{ProtectionStatus, SessionRegistry};
use crate::session::{BackupSession, SessionState, SessionSummary};

#[cfg(test)]
mod tests;

/// Result of a successful [`BackupCoordinator::end`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopInfo {
	/// Last WAL segment a restore of this copy needs. Must be archived before the
	/// backup counts as complete.
	pub stop_filename: String,
	pub stop: WalPoint,
	/// `false` when other sessions kept protection on. `stop` is then only the
	/// insert position at the time of the call, not an engine-confirmed stop point.
	pub protection_released: bool,
	pub session: SessionSummary,
}

/// Runs begin, end and abort for any number of overlapping backup sessions.
///
/// Shareable across threads (`Arc<BackupCoordinator<E>>`); sessions are not tied
/// to the thread or connection that opened them.
pub struct BackupCoordinator<E> {
	registry: SessionRegistry<E>,
	config: CoordinatorConfig,
}

impl<E: StorageEngine> BackupCoordinator<E> {
	pub fn new(engine: E, config: CoordinatorConfig) -> Self {
		Self {
			registry: SessionRegistry::new(engine),
			config,
		}
	}

	pub fn engine(&self) -> &E {
		self.registry.engine()
	}

	pub fn config(&self) -> &CoordinatorConfig {
		&self.config
	}

	pub fn status(&self) -> ProtectionStatus {
		self.registry.status()
	}

	/// Opens a session and returns its label text.
	///
	/// See [`begin`](Self::begin).
	pub fn start_backup(&self, caller: &Caller, label: &str, fast: bool) -> Result<String> {
		self.begin(caller, label, fast).map(|session| session.token)
	}

	/// Closes the session identified by `label_text` and returns the stop segment name.
	///
	/// See [`end`](Self::end).
	pub fn stop_backup(&self, caller: &Caller, label_text: &str) -> Result<String> {
		self.end(caller, label_text).map(|info| info.stop_filename)
	}

	/// Aborts the session identified by `label_text`, or the newest open session.
	///
	/// See [`abort`](Self::abort).
	pub fn abort_backup(&self, caller: &Caller, label_text: Option<&str>) -> Result<()> {
		self.abort(caller, label_text).map(|_| ())
	}

	/// Opens a backup session.
	///
	/// The first open session switches engine protection on and waits for the
	/// checkpoint (`fast` asks for an immediate one); later sessions share the
	/// protection and its start point. While the engine replays WAL, the label's
	/// timeline comes from the replay position.
	///
	/// On error no backup is in progress on behalf of this call: nothing was
	/// registered and no protection reference is held.
	pub fn begin(&self, caller: &Caller, label: &str, fast: bool) -> Result<BackupSession> {
		authorize(caller)?;
		self.config.validate_label(label)?;

		let mut registry = self.registry.lock()?;
		let replay_timeline = replay_timeline(registry.engine())?;
		let was_active = registry.protection().active;
		let baseline = registry.acquire(label, fast, replay_timeline)?;
		let source = registry.protection().source;

		let backup_id = Uuid::new_v4();
		let started_at = Utc::now().trunc_subsecs(0);
		let document = BackupLabel {
			start: baseline,
			method: CONCURRENT_METHOD.to_string(),
			source,
			backup_id: Some(backup_id),
			start_time: Some(started_at),
			label: label.to_string(),
		};
		let token = document.render(registry.engine().segment_size());
		let session = BackupSession::open(token, &document, backup_id, started_at);

		if let Err(err) = registry.insert(session.clone()) {
			registry.release_abrupt()?;
			return Err(err);
		}
		registry.verify()?;

		info!(
			target = "walguard.session",
			caller = %caller.name,
			%backup_id,
			label,
			start = %baseline.position,
			timeline = %baseline.timeline,
			shared = was_active,
			"backup session opened"
		);
		Ok(session)
	}

	/// Closes a backup session.
	///
	/// The last open session switches engine protection off and gets the
	/// engine's stop point. While other sessions stay open the stop point is the
	/// current insert position and [`StopInfo::protection_released`] is `false`.
	/// The stop segment is named on the replay timeline while the engine
	/// replays WAL, on the engine's timeline otherwise.
	///
	/// Fails with [`BackupError::UnknownSession`] for a label text that is not
	/// open. On any error the session is still open: retry `end` or call
	/// [`abort`](Self::abort).
	pub fn end(&self, caller: &Caller, label_text: &str) -> Result<StopInfo> {
		authorize(caller)?;

		let mut registry = self.registry.lock()?;
		if registry.open_session(label_text).is_none() {
			return Err(BackupError::UnknownSession);
		}
		let replay_timeline = replay_timeline(registry.engine())?;
		let release = registry.release_graceful(label_text, self.config.wait_for_archive)?;

		let stop = release.stop.on_timeline(replay_timeline.unwrap_or(release.stop.timeline));
		let stop_filename = stop.stop_segment_filename(registry.engine().segment_size());

		let Some(session) = registry.finish(label_text, SessionState::Closed) else {
			return Err(registry.poison("session vanished while being closed"));
		};
		registry.verify()?;

		if !release.protection_released {
			warn!(
				target = "walguard.session",
				backup_id = %session.backup_id,
				stop = %stop.position,
				"other sessions still hold protection; stop position is the current insert position, not an engine stop point"
			);
		}
		if stop.timeline != session.start_timeline {
			info!(
				target = "walguard.session",
				backup_id = %session.backup_id,
				start_timeline = %session.start_timeline,
				stop_timeline = %stop.timeline,
				"timeline changed while the backup was running"
			);
		}
		info!(
			target = "walguard.session",
			caller = %caller.name,
			backup_id = %session.backup_id,
			%stop_filename,
			protection_released = release.protection_released,
			"backup session closed"
		);

		Ok(StopInfo {
			stop_filename,
			stop,
			protection_released: release.protection_released,
			session: session.summary(),
		})
	}

	/// Aborts a backup session without computing a stop point.
	///
	/// With `label_text` it targets that session; without, the most recently
	/// opened one. A label text that is not open (never issued, already closed
	/// or already aborted) and an empty registry are not errors: the call
	/// returns `Ok(None)` and the engine is not touched. Only the privilege check
	/// and an inconsistent protection state can fail.
	pub fn abort(&self, caller: &Caller, label_text: Option<&str>) -> Result<Option<BackupSession>> {
		authorize(caller)?;

		let mut registry = self.registry.lock()?;
		let target = match label_text {
			Some(token) => registry.open_session(token),
			None => registry.newest_session(),
		};
		let Some(token) = target.map(|session| session.token.clone()) else {
			debug!(target = "walguard.session", caller = %caller.name, "abort: no matching open session");
			return Ok(None);
		};

		let released = registry.release_abrupt()?;
		let Some(session) = registry.finish(&token, SessionState::Aborted) else {
			return Err(registry.poison("session vanished while being aborted"));
		};
		registry.verify()?;

		warn!(
			target = "walguard.session",
			caller = %caller.name,
			backup_id = %session.backup_id,
			protection_released = released,
			"backup session aborted"
		);
		Ok(Some(session))
	}
}

/// Timeline to label with while the engine replays WAL.
///
/// The engine's nominal timeline is not meaningful during recovery; the replay
/// position carries the real one. An engine promoted between the two calls
/// counts as not in recovery.
fn replay_timeline<E: StorageEngine>(engine: &E) -> Result<Option<TimelineId>> {
	if !engine.is_in_recovery() {
		return Ok(None);
	}
	match engine.current_replay_position() {
		Ok(replay) => {
			debug!(target = "walguard.session", timeline = %replay.timeline, "in recovery; using replay timeline");
			Ok(Some(replay.timeline))
		}
		Err(EngineError::NotInRecovery) => Ok(None),
		Err(err) => Err(err.into()),
	}
}
