//! In-memory storage engine for tests and the command shim.
//!
//! Provides the [`StorageEngine`] primitives without a real data directory. WAL
//! is just a position that advances when records are "written", protection is a
//! flag, and every primitive call is counted so tests can assert how often the
//! coordinator reached the engine.
//!
//! # Example
//!
//! ```ignore
//! let engine = SimulatedEngine::new(SimulatedEngineConfig::default());
//! engine.enter_recovery(TimelineId(2));
//! assert_eq!(engine.current_replay_position()?.timeline, TimelineId(2));
//! engine.promote(TimelineId(3));
//! ```

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walguard_protocol::{SegmentSize, TimelineId, WalPoint, WalPosition};

use crate::engine::{EngineError, StorageEngine};

/// Bytes appended to the WAL by a checkpoint record.
const CHECKPOINT_RECORD_LEN: u64 = 0x78;
/// Bytes appended to the WAL by a backup-end record.
const BACKUP_END_RECORD_LEN: u64 = 0x28;

/// The timeline a backend reports while replaying; the real one is only
/// available through the replay position.
const STALE_RECOVERY_TIMELINE: TimelineId = TimelineId(0);

/// Initial state of a [`SimulatedEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulatedEngineConfig {
	pub timeline: TimelineId,
	pub insert_position: WalPosition,
	pub segment_size: SegmentSize,
	/// Start as a server replaying `timeline`.
	pub in_recovery: bool,
	pub read_only: bool,
	pub fast_checkpoint_ms: u64,
	pub spread_checkpoint_ms: u64,
}

impl Default for SimulatedEngineConfig {
	fn default() -> Self {
		Self {
			timeline: TimelineId(1),
			insert_position: WalPosition(0x0100_0028),
			segment_size: SegmentSize::DEFAULT,
			in_recovery: false,
			read_only: false,
			fast_checkpoint_ms: 0,
			spread_checkpoint_ms: 0,
		}
	}
}

/// Counters of primitive calls made against a [`SimulatedEngine`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCalls {
	pub begin: u32,
	pub end: u32,
	pub cancel: u32,
	/// `begin_protection` while protection was already on.
	pub overlapping_begins: u32,
	/// `cancel_protection` while protection was already off.
	pub redundant_cancels: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_fast: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_wait_for_archive: Option<bool>,
}

#[derive(Debug)]
struct EngineState {
	insert: WalPosition,
	timeline: TimelineId,
	/// Replay point while the engine is in recovery.
	replay: Option<WalPoint>,
	read_only: bool,
	protected: bool,
	fail_next_begin: Option<EngineError>,
	fail_next_end: Option<EngineError>,
	fail_next_replay: Option<EngineError>,
	calls: EngineCalls,
}

/// In-memory [`StorageEngine`].
#[derive(Debug)]
pub struct SimulatedEngine {
	segment_size: SegmentSize,
	fast_checkpoint: Duration,
	spread_checkpoint: Duration,
	state: Mutex<EngineState>,
}

impl SimulatedEngine {
	pub fn new(config: SimulatedEngineConfig) -> Self {
		let replay = config.in_recovery.then(|| WalPoint::new(config.insert_position, config.timeline));
		Self {
			segment_size: config.segment_size,
			fast_checkpoint: Duration::from_millis(config.fast_checkpoint_ms),
			spread_checkpoint: Duration::from_millis(config.spread_checkpoint_ms),
			state: Mutex::new(EngineState {
				insert: config.insert_position,
				timeline: config.timeline,
				replay,
				read_only: config.read_only,
				protected: false,
				fail_next_begin: None,
				fail_next_end: None,
				fail_next_replay: None,
				calls: EngineCalls::default(),
			}),
		}
	}

	/// Snapshot of the primitive call counters.
	pub fn calls(&self) -> EngineCalls {
		self.state.lock().calls.clone()
	}

	pub fn is_protected(&self) -> bool {
		self.state.lock().protected
	}

	/// Replay point while in recovery; ignores any armed replay failure.
	pub fn replay_point(&self) -> Option<WalPoint> {
		self.state.lock().replay
	}

	/// Appends `bytes` of WAL, or replays them while in recovery.
	pub fn advance(&self, bytes: u64) {
		let mut state = self.state.lock();
		state.insert = state.insert.offset(bytes);
		if let Some(replay) = state.replay.as_mut() {
			replay.position = replay.position.offset(bytes);
		}
	}

	/// Switches to replaying WAL of `timeline` from the current position.
	pub fn enter_recovery(&self, timeline: TimelineId) {
		let mut state = self.state.lock();
		state.replay = Some(WalPoint::new(state.insert, timeline));
		debug!(target = "walguard.engine", %timeline, "simulated engine entered recovery");
	}

	/// Follows an upstream timeline switch while staying in recovery.
	pub fn switch_replay_timeline(&self, timeline: TimelineId) {
		let mut state = self.state.lock();
		if let Some(replay) = state.replay.as_mut() {
			replay.timeline = timeline;
		}
	}

	/// Ends recovery and starts generating WAL on `timeline`.
	pub fn promote(&self, timeline: TimelineId) {
		let mut state = self.state.lock();
		if let Some(replay) = state.replay.take() {
			state.insert = replay.position;
		}
		state.timeline = timeline;
		debug!(target = "walguard.engine", %timeline, "simulated engine promoted");
	}

	pub fn set_read_only(&self, read_only: bool) {
		self.state.lock().read_only = read_only;
	}

	/// Makes the next `begin_protection` fail with `error`.
	pub fn fail_next_begin(&self, error: EngineError) {
		self.state.lock().fail_next_begin = Some(error);
	}

	/// Makes the next `end_protection` fail with `error`.
	pub fn fail_next_end(&self, error: EngineError) {
		self.state.lock().fail_next_end = Some(error);
	}

	/// Makes the next `current_replay_position` fail with `error`.
	pub fn fail_next_replay(&self, error: EngineError) {
		self.state.lock().fail_next_replay = Some(error);
	}

	fn checkpoint_delay(&self, fast: bool) -> Duration {
		if fast { self.fast_checkpoint } else { self.spread_checkpoint }
	}
}

impl Default for SimulatedEngine {
	fn default() -> Self {
		Self::new(SimulatedEngineConfig::default())
	}
}

impl StorageEngine for SimulatedEngine {
	fn begin_protection(&self, label: &str, fast: bool) -> Result<WalPoint, EngineError> {
		{
			let mut state = self.state.lock();
			state.calls.begin += 1;
			state.calls.last_fast = Some(fast);
			if let Some(error) = state.fail_next_begin.take() {
				return Err(error);
			}
			if state.read_only {
				return Err(EngineError::ReadOnly);
			}
		}

		let delay = self.checkpoint_delay(fast);
		if !delay.is_zero() {
			std::thread::sleep(delay);
		}

		let mut state = self.state.lock();
		if state.protected {
			state.calls.overlapping_begins += 1;
		}
		state.protected = true;

		let start = match state.replay {
			// A restartpoint starts from the last replayed record.
			Some(replay) => WalPoint::new(replay.position, STALE_RECOVERY_TIMELINE),
			None => {
				let redo = state.insert;
				state.insert = state.insert.offset(CHECKPOINT_RECORD_LEN);
				WalPoint::new(redo, state.timeline)
			}
		};
		debug!(target = "walguard.engine", %label, fast, start = %start.position, "protection on");
		Ok(start)
	}

	fn end_protection(&self, label_text: &str, wait_for_archive: bool) -> Result<WalPoint, EngineError> {
		let mut state = self.state.lock();
		state.calls.end += 1;
		state.calls.last_wait_for_archive = Some(wait_for_archive);
		if let Some(error) = state.fail_next_end.take() {
			return Err(error);
		}
		if !state.protected {
			return Err(EngineError::NotProtected);
		}

		let stop = match state.replay {
			Some(replay) => WalPoint::new(replay.position, STALE_RECOVERY_TIMELINE),
			None => {
				// Switch to a fresh segment so the one holding the stop point can be archived.
				let size = self.segment_size.bytes();
				let Some((stop, next)) = state
					.insert
					.0
					.checked_add(BACKUP_END_RECORD_LEN)
					.and_then(|stop| stop.div_ceil(size).checked_mul(size).map(|next| (stop, next)))
				else {
					return Err(EngineError::Unavailable("WAL address space exhausted".to_string()));
				};
				state.insert = WalPosition(next);
				WalPoint::new(WalPosition(stop), state.timeline)
			}
		};
		state.protected = false;
		debug!(target = "walguard.engine", label_bytes = label_text.len(), stop = %stop.position, "protection off");
		Ok(stop)
	}

	fn cancel_protection(&self) {
		let mut state = self.state.lock();
		state.calls.cancel += 1;
		if !state.protected {
			state.calls.redundant_cancels += 1;
		}
		state.protected = false;
		debug!(target = "walguard.engine", "protection cancelled");
	}

	fn current_replay_position(&self) -> Result<WalPoint, EngineError> {
		let mut state = self.state.lock();
		if let Some(error) = state.fail_next_replay.take() {
			return Err(error);
		}
		state.replay.ok_or(EngineError::NotInRecovery)
	}

	fn current_insert_position(&self) -> Result<WalPoint, EngineError> {
		let state = self.state.lock();
		Ok(match state.replay {
			Some(replay) => WalPoint::new(replay.position, STALE_RECOVERY_TIMELINE),
			None => WalPoint::new(state.insert, state.timeline),
		})
	}

	fn is_in_recovery(&self) -> bool {
		self.state.lock().replay.is_some()
	}

	fn segment_size(&self) -> SegmentSize {
		self.segment_size
	}
}
