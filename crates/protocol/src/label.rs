//! Backup label text.
//!
//! The label text is both the metadata a backup tool installs next to the copied
//! data directory and the token a caller presents to finish the session. Its
//! layout is fixed: one `KEY: value` pair per line, in this order:
//!
//! ```text
//! START WAL LOCATION: 0/2000028 (file 000000010000000000000002)
//! BACKUP METHOD: concurrent
//! BACKUP FROM: primary
//! BACKUP ID: 5b0f9f0e-8a57-4c5e-9d55-3f0c7a8f2a61
//! START TIME: 2026-10-18 12:00:00 UTC
//! LABEL: nightly to s3://bucket/base
//! START TIMELINE: 1
//! ```
//!
//! [`BackupLabel::parse`] accepts the keys in any order and skips keys it does
//! not know, so labels written by newer versions stay readable.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::wal::{SegmentSize, TimelineId, WalError, WalPoint, WalPosition};

pub const KEY_START_WAL_LOCATION: &str = "START WAL LOCATION";
pub const KEY_BACKUP_METHOD: &str = "BACKUP METHOD";
pub const KEY_BACKUP_FROM: &str = "BACKUP FROM";
pub const KEY_BACKUP_ID: &str = "BACKUP ID";
pub const KEY_START_TIME: &str = "START TIME";
pub const KEY_LABEL: &str = "LABEL";
pub const KEY_START_TIMELINE: &str = "START TIMELINE";

/// Method recorded for sessions started through the coordinator.
pub const CONCURRENT_METHOD: &str = "concurrent";

const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised while reading a label text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LabelError {
	#[error("backup label is missing '{0}'")]
	MissingField(&'static str),

	#[error("backup label repeats '{0}'")]
	DuplicateField(String),

	#[error("malformed backup label line: '{0}'")]
	MalformedLine(String),

	#[error("invalid value for '{field}': '{value}'")]
	InvalidValue { field: &'static str, value: String },

	#[error(transparent)]
	Wal(#[from] WalError),
}

/// Whether the backup was taken from a primary or from a server replaying WAL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupSource {
	#[default]
	Primary,
	Standby,
}

impl BackupSource {
	pub fn as_str(self) -> &'static str {
		match self {
			BackupSource::Primary => "primary",
			BackupSource::Standby => "standby",
		}
	}
}

/// Parsed form of a label text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupLabel {
	pub start: WalPoint,
	pub method: String,
	pub source: BackupSource,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub backup_id: Option<Uuid>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub start_time: Option<DateTime<Utc>>,
	pub label: String,
}

impl BackupLabel {
	/// Renders the label text.
	///
	/// `START TIME` is written with second precision, so a label built from a
	/// timestamp with sub-second digits does not compare equal to its parsed form.
	pub fn render(&self, segment_size: SegmentSize) -> String {
		let mut text = String::new();
		let _ = writeln!(text, "{KEY_START_WAL_LOCATION}: {} (file {})", self.start.position, self.start.segment_filename(segment_size));
		let _ = writeln!(text, "{KEY_BACKUP_METHOD}: {}", self.method);
		let _ = writeln!(text, "{KEY_BACKUP_FROM}: {}", self.source.as_str());
		if let Some(id) = self.backup_id {
			let _ = writeln!(text, "{KEY_BACKUP_ID}: {id}");
		}
		if let Some(time) = self.start_time {
			let _ = writeln!(text, "{KEY_START_TIME}: {} UTC", time.format(START_TIME_FORMAT));
		}
		let _ = writeln!(text, "{KEY_LABEL}: {}", self.label);
		let _ = writeln!(text, "{KEY_START_TIMELINE}: {}", self.start.timeline);
		text
	}

	/// Reads a label text produced by [`BackupLabel::render`].
	pub fn parse(text: &str) -> Result<Self, LabelError> {
		let mut fields = LabelFields::default();

		for line in text.lines() {
			if line.trim().is_empty() {
				continue;
			}
			let (key, value) = line.split_once(": ").or_else(|| line.strip_suffix(':').map(|key| (key, ""))).ok_or_else(|| LabelError::MalformedLine(line.to_string()))?;

			let slot = match key {
				KEY_START_WAL_LOCATION => &mut fields.start_location,
				KEY_BACKUP_METHOD => &mut fields.method,
				KEY_BACKUP_FROM => &mut fields.source,
				KEY_BACKUP_ID => &mut fields.backup_id,
				KEY_START_TIME => &mut fields.start_time,
				KEY_LABEL => &mut fields.label,
				KEY_START_TIMELINE => &mut fields.timeline,
				_ => continue,
			};
			if slot.replace(value).is_some() {
				return Err(LabelError::DuplicateField(key.to_string()));
			}
		}

		let location = fields.start_location.ok_or(LabelError::MissingField(KEY_START_WAL_LOCATION))?;
		let position: WalPosition = location.split_whitespace().next().unwrap_or_default().parse()?;
		let timeline: TimelineId = fields.timeline.ok_or(LabelError::MissingField(KEY_START_TIMELINE))?.parse()?;
		let label = fields.label.ok_or(LabelError::MissingField(KEY_LABEL))?.to_string();

		let source = match fields.source {
			None | Some("primary") => BackupSource::Primary,
			Some("standby") => BackupSource::Standby,
			Some(other) => {
				return Err(LabelError::InvalidValue {
					field: KEY_BACKUP_FROM,
					value: other.to_string(),
				});
			}
		};

		let backup_id = fields
			.backup_id
			.map(|raw| {
				Uuid::parse_str(raw).map_err(|_| LabelError::InvalidValue {
					field: KEY_BACKUP_ID,
					value: raw.to_string(),
				})
			})
			.transpose()?;

		let start_time = fields.start_time.map(parse_start_time).transpose()?;

		Ok(Self {
			start: WalPoint::new(position, timeline),
			method: fields.method.unwrap_or(CONCURRENT_METHOD).to_string(),
			source,
			backup_id,
			start_time,
			label,
		})
	}
}

#[derive(Default)]
struct LabelFields<'a> {
	start_location: Option<&'a str>,
	method: Option<&'a str>,
	source: Option<&'a str>,
	backup_id: Option<&'a str>,
	start_time: Option<&'a str>,
	label: Option<&'a str>,
	timeline: Option<&'a str>,
}

fn parse_start_time(raw: &str) -> Result<DateTime<Utc>, LabelError> {
	let invalid = || LabelError::InvalidValue {
		field: KEY_START_TIME,
		value: raw.to_string(),
	};
	let naive = raw.strip_suffix(" UTC").ok_or_else(invalid)?;
	NaiveDateTime::parse_from_str(naive, START_TIME_FORMAT).map(|time| time.and_utc()).map_err(|_| invalid())
}
