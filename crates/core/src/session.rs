//! Per-session record kept by the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walguard_protocol::{BackupLabel, BackupSource, TimelineId, WalPoint, WalPosition};

/// Lifecycle of a session: `Open` moves to `Closed` on end or to `Aborted` on
/// abort; neither terminal state is ever left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
	Open,
	Closed,
	Aborted,
}

impl SessionState {
	pub fn is_terminal(self) -> bool {
		!matches!(self, SessionState::Open)
	}
}

/// One backup session.
///
/// `token` is the label text handed to the caller; it is the session's only
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSession {
	pub token: String,
	pub backup_id: Uuid,
	pub label: String,
	pub start_position: WalPosition,
	pub start_timeline: TimelineId,
	pub source: BackupSource,
	pub started_at: DateTime<Utc>,
	pub state: SessionState,
	/// Order in which sessions were registered.
	pub(crate) sequence: u64,
}

impl BackupSession {
	pub(crate) fn open(token: String, label: &BackupLabel, backup_id: Uuid, started_at: DateTime<Utc>) -> Self {
		Self {
			token,
			backup_id,
			label: label.label.clone(),
			start_position: label.start.position,
			start_timeline: label.start.timeline,
			source: label.source,
			started_at,
			state: SessionState::Open,
			sequence: 0,
		}
	}

	pub fn start(&self) -> WalPoint {
		WalPoint::new(self.start_position, self.start_timeline)
	}

	/// The session without its token, for status output.
	pub fn summary(&self) -> SessionSummary {
		SessionSummary {
			backup_id: self.backup_id,
			label: self.label.clone(),
			start_position: self.start_position,
			start_timeline: self.start_timeline,
			source: self.source,
			started_at: self.started_at,
			state: self.state,
		}
	}
}

/// Serializable view of a session that omits the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
	pub backup_id: Uuid,
	pub label: String,
	pub start_position: WalPosition,
	pub start_timeline: TimelineId,
	pub source: BackupSource,
	pub started_at: DateTime<Utc>,
	pub state: SessionState,
}
