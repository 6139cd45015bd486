//! Reference-counted ownership of the engine's backup protection.
//!
//! The registry holds the only copy of [`ProtectionState`] and the table of open
//! sessions behind a single mutex. Every counter transition happens together with
//! the engine call that belongs to it and the session-table change that caused
//! it, while that mutex is held:
//!
//! - 0 → 1: `begin_protection`, baseline recorded
//! - n → n+1: no engine call, baseline reused
//! - n+1 → n: no engine call (graceful releases read the insert position)
//! - 1 → 0: `end_protection` or `cancel_protection`, baseline dropped
//!
//! An engine failure leaves the counter where it was. A release with no
//! reference held, or a counter that disagrees with the session table, poisons
//! the registry: from then on [`SessionRegistry::lock`] fails until the process
//! restarts.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, error, info};
use walguard_protocol::{BackupSource, TimelineId, WalPoint};
use walguard_runtime::StorageEngine;

use crate::error::{BackupError, Result};
use crate::session::{BackupSession, SessionState, SessionSummary};

/// Engine-wide protection toggle shared by all sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionState {
	pub reference_count: u32,
	pub active: bool,
	/// Start point recorded when protection went from off to on.
	pub baseline: Option<WalPoint>,
	/// Where the baseline was taken; shared by every session in the window.
	pub source: BackupSource,
}

/// Outcome of giving back one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
	/// Engine stop point when `protection_released`, otherwise the current
	/// insert position, which is not a safe stop point for a copy.
	pub stop: WalPoint,
	pub protection_released: bool,
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionStatus {
	#[serde(flatten)]
	pub protection: ProtectionState,
	pub sessions: Vec<SessionSummary>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub poisoned: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
	protection: ProtectionState,
	sessions: HashMap<String, BackupSession>,
	next_sequence: u64,
	poisoned: Option<String>,
}

/// Owner of the open-session table and the protection reference count.
pub struct SessionRegistry<E> {
	engine: E,
	state: Mutex<RegistryState>,
}

impl<E: StorageEngine> SessionRegistry<E> {
	pub fn new(engine: E) -> Self {
		Self {
			engine,
			state: Mutex::new(RegistryState::default()),
		}
	}

	pub fn engine(&self) -> &E {
		&self.engine
	}

	/// Enters the registry's critical section.
	///
	/// Blocks while another caller is inside, including while that caller waits
	/// for a checkpoint. Fails once the registry is poisoned.
	pub fn lock(&self) -> Result<RegistryGuard<'_, E>> {
		let state = self.state.lock();
		if let Some(reason) = &state.poisoned {
			return Err(BackupError::InconsistentProtectionState(reason.clone()));
		}
		Ok(RegistryGuard { engine: &self.engine, state })
	}

	/// Current counter, baseline and open sessions. Works on a poisoned registry.
	pub fn status(&self) -> ProtectionStatus {
		let state = self.state.lock();
		let mut sessions: Vec<&BackupSession> = state.sessions.values().collect();
		sessions.sort_by_key(|session| session.sequence);
		ProtectionStatus {
			protection: state.protection,
			sessions: sessions.into_iter().map(BackupSession::summary).collect(),
			poisoned: state.poisoned.clone(),
		}
	}
}

/// Exclusive access to the registry for the duration of one operation.
pub struct RegistryGuard<'a, E> {
	engine: &'a E,
	state: MutexGuard<'a, RegistryState>,
}

impl<E: StorageEngine> RegistryGuard<'_, E> {
	pub fn engine(&self) -> &E {
		self.engine
	}

	pub fn protection(&self) -> ProtectionState {
		self.state.protection
	}

	/// Takes one reference on engine protection and returns the baseline.
	///
	/// The first reference calls `begin_protection` and records its result,
	/// with the timeline replaced by `replay_timeline` when the caller resolved
	/// one. A resolved replay timeline also marks the baseline as taken on a
	/// standby. Later references get the recorded baseline back unchanged.
	pub fn acquire(&mut self, label: &str, fast: bool, replay_timeline: Option<TimelineId>) -> Result<WalPoint> {
		if self.state.protection.reference_count == 0 {
			let start = self.engine.begin_protection(label, fast)?;
			let baseline = replay_timeline.map_or(start, |timeline| start.on_timeline(timeline));
			self.state.protection = ProtectionState {
				reference_count: 0,
				active: true,
				baseline: Some(baseline),
				source: if replay_timeline.is_some() { BackupSource::Standby } else { BackupSource::Primary },
			};
			info!(
				target = "walguard.registry",
				start = %baseline.position,
				timeline = %baseline.timeline,
				fast,
				"backup protection activated"
			);
		}

		let protection = self.state.protection;
		let Some(baseline) = protection.baseline else {
			return Err(self.poison("protection held without a baseline"));
		};
		let Some(count) = protection.reference_count.checked_add(1) else {
			return Err(self.poison("reference count overflow"));
		};
		self.state.protection.reference_count = count;
		debug!(target = "walguard.registry", reference_count = count, "reference acquired");
		Ok(baseline)
	}

	/// Gives back one reference, graceful variant.
	///
	/// The last reference calls `end_protection`. If the engine fails, the
	/// reference is kept and protection stays on.
	pub fn release_graceful(&mut self, label_text: &str, wait_for_archive: bool) -> Result<Release> {
		let count = self.state.protection.reference_count;
		match count {
			0 => Err(self.poison("release with no reference held")),
			1 => {
				let stop = self.engine.end_protection(label_text, wait_for_archive)?;
				self.state.protection = ProtectionState::default();
				info!(target = "walguard.registry", stop = %stop.position, wait_for_archive, "backup protection released");
				Ok(Release { stop, protection_released: true })
			}
			_ => {
				let stop = self.engine.current_insert_position()?;
				self.state.protection.reference_count = count - 1;
				debug!(target = "walguard.registry", reference_count = count - 1, "reference released; protection stays active");
				Ok(Release { stop, protection_released: false })
			}
		}
	}

	/// Gives back one reference, abrupt variant.
	///
	/// The last reference calls `cancel_protection`. Makes no other engine call,
	/// so it only fails on an inconsistent counter. Returns whether protection
	/// was switched off.
	pub fn release_abrupt(&mut self) -> Result<bool> {
		let count = self.state.protection.reference_count;
		match count {
			0 => Err(self.poison("abort with no reference held")),
			1 => {
				self.engine.cancel_protection();
				self.state.protection = ProtectionState::default();
				info!(target = "walguard.registry", "backup protection cancelled");
				Ok(true)
			}
			_ => {
				self.state.protection.reference_count = count - 1;
				debug!(target = "walguard.registry", reference_count = count - 1, "reference dropped; protection stays active");
				Ok(false)
			}
		}
	}

	pub fn open_session(&self, token: &str) -> Option<&BackupSession> {
		self.state.sessions.get(token)
	}

	/// Most recently registered open session.
	pub fn newest_session(&self) -> Option<&BackupSession> {
		self.state.sessions.values().max_by_key(|session| session.sequence)
	}

	/// Adds a freshly opened session to the table.
	pub fn insert(&mut self, mut session: BackupSession) -> Result<()> {
		if self.state.sessions.contains_key(&session.token) {
			return Err(BackupError::InvalidLabel("label text collides with an open session".to_string()));
		}
		self.state.next_sequence += 1;
		session.sequence = self.state.next_sequence;
		self.state.sessions.insert(session.token.clone(), session);
		Ok(())
	}

	/// Removes an open session, moving it to the terminal `state`.
	pub fn finish(&mut self, token: &str, state: SessionState) -> Option<BackupSession> {
		debug_assert!(state.is_terminal());
		let mut session = self.state.sessions.remove(token)?;
		session.state = state;
		Some(session)
	}

	/// Checks `active == (count > 0)` and `count == open sessions`.
	pub fn verify(&mut self) -> Result<()> {
		let protection = self.state.protection;
		let open = self.state.sessions.len();
		if protection.active != (protection.reference_count > 0) {
			return Err(self.poison(&format!("active={} with reference count {}", protection.active, protection.reference_count)));
		}
		if open != protection.reference_count as usize {
			return Err(self.poison(&format!("{open} open sessions but reference count {}", protection.reference_count)));
		}
		Ok(())
	}

	/// Marks the registry unusable and returns the matching error.
	pub fn poison(&mut self, reason: &str) -> BackupError {
		error!(target = "walguard.registry", reason, "backup protection state inconsistent; refusing further backup operations");
		self.state.poisoned = Some(reason.to_string());
		BackupError::InconsistentProtectionState(reason.to_string())
	}
}

#[cfg(test)]
mod tests {
	use walguard_protocol::WalPosition;
	use walguard_runtime::{EngineError, SimulatedEngine};

	use super::*;

	#[test]
	fn first_acquire_begins_protection_once() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		let mut guard = registry.lock().unwrap();

		let first = guard.acquire("a", true, None).unwrap();
		let second = guard.acquire("b", false, None).unwrap();

		assert_eq!(first, second);
		assert_eq!(guard.protection().reference_count, 2);
		assert!(guard.protection().active);
		assert_eq!(guard.engine().calls().begin, 1);
		assert_eq!(guard.engine().calls().last_fast, Some(true));
	}

	#[test]
	fn replay_timeline_replaces_nominal_baseline_timeline() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		let mut guard = registry.lock().unwrap();
		let baseline = guard.acquire("a", true, Some(TimelineId(7))).unwrap();
		assert_eq!(baseline.timeline, TimelineId(7));
		assert_eq!(guard.protection().baseline, Some(baseline));
		assert_eq!(guard.protection().source, BackupSource::Standby);

		guard.acquire("b", true, None).unwrap();
		assert_eq!(guard.protection().source, BackupSource::Standby);
	}

	#[test]
	fn failed_begin_leaves_counter_untouched() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		registry.engine().fail_next_begin(EngineError::ReadOnly);
		let mut guard = registry.lock().unwrap();

		let err = guard.acquire("a", true, None).unwrap_err();
		assert_eq!(err, BackupError::EngineUnavailable(EngineError::ReadOnly));
		assert_eq!(guard.protection(), ProtectionState::default());
	}

	#[test]
	fn only_last_release_reaches_the_engine() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		let mut guard = registry.lock().unwrap();
		guard.acquire("a", true, None).unwrap();
		guard.acquire("b", true, None).unwrap();

		let early = guard.release_graceful("a", false).unwrap();
		assert!(!early.protection_released);
		assert_eq!(guard.engine().calls().end, 0);
		assert!(guard.protection().active);

		let last = guard.release_graceful("b", false).unwrap();
		assert!(last.protection_released);
		assert_eq!(guard.engine().calls().end, 1);
		assert_eq!(guard.protection(), ProtectionState::default());
	}

	#[test]
	fn failed_end_keeps_the_reference() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		let mut guard = registry.lock().unwrap();
		guard.acquire("a", true, None).unwrap();
		guard.engine().fail_next_end(EngineError::Unavailable("archiver stuck".into()));

		assert!(guard.release_graceful("a", false).is_err());
		assert_eq!(guard.protection().reference_count, 1);
		assert!(guard.engine().is_protected());
	}

	#[test]
	fn abrupt_release_cancels_on_last_reference() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		let mut guard = registry.lock().unwrap();
		guard.acquire("a", true, None).unwrap();
		guard.acquire("b", true, None).unwrap();

		assert!(!guard.release_abrupt().unwrap());
		assert!(guard.release_abrupt().unwrap());
		assert_eq!(guard.engine().calls().cancel, 1);
		assert!(!guard.engine().is_protected());
	}

	#[test]
	fn release_without_reference_poisons() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		{
			let mut guard = registry.lock().unwrap();
			assert!(guard.release_abrupt().unwrap_err().is_fatal());
		}
		assert!(matches!(registry.lock(), Err(BackupError::InconsistentProtectionState(_))));
		assert!(registry.status().poisoned.is_some());
	}

	#[test]
	fn verify_detects_counter_and_table_mismatch() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		let mut guard = registry.lock().unwrap();
		guard.acquire("a", true, None).unwrap();
		assert!(guard.verify().is_err());
		drop(guard);
		assert!(registry.lock().is_err());
	}

	#[test]
	fn status_serializes_flat_counter_fields() {
		let registry = SessionRegistry::new(SimulatedEngine::default());
		registry.lock().unwrap().acquire("a", true, None).unwrap();
		let json = serde_json::to_value(registry.status()).unwrap();
		assert_eq!(json["referenceCount"], 1);
		assert_eq!(json["active"], true);
		assert_eq!(json["baseline"]["position"], WalPosition(0x0100_0028).to_string());
		assert!(json.get("poisoned").is_none());
	}
}
