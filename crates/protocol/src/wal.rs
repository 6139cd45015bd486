//! WAL positions, timelines and segment naming.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Size of one "xlog id" worth of WAL: the high 32 bits of a position select it.
const XLOG_ID_SPAN: u64 = 0x1_0000_0000;

/// Errors raised while parsing or validating WAL primitives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalError {
	#[error("invalid WAL position '{0}': expected <hex>/<hex>")]
	InvalidPosition(String),

	#[error("invalid timeline '{0}'")]
	InvalidTimeline(String),

	#[error("invalid WAL segment size {0}: must be a power of two between 1 MiB and 1 GiB")]
	InvalidSegmentSize(u64),
}

/// Byte offset into the WAL stream.
///
/// Rendered as `<hex high>/<hex low>`, the high and low 32 bits in upper-case
/// hexadecimal without padding (`0/2000028`, `1A/FF000000`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WalPosition(pub u64);

impl WalPosition {
	pub const ZERO: WalPosition = WalPosition(0);

	pub fn new(high: u32, low: u32) -> Self {
		Self(((high as u64) << 32) | low as u64)
	}

	pub fn high(self) -> u32 {
		(self.0 >> 32) as u32
	}

	pub fn low(self) -> u32 {
		self.0 as u32
	}

	/// Returns the position `bytes` further along the stream, saturating at the end.
	pub fn offset(self, bytes: u64) -> Self {
		Self(self.0.saturating_add(bytes))
	}
}

impl fmt::Display for WalPosition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:X}/{:X}", self.high(), self.low())
	}
}

impl FromStr for WalPosition {
	type Err = WalError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let invalid = || WalError::InvalidPosition(s.to_string());
		let (high, low) = s.trim().split_once('/').ok_or_else(invalid)?;
		if high.is_empty() || low.is_empty() {
			return Err(invalid());
		}
		let high = u32::from_str_radix(high, 16).map_err(|_| invalid())?;
		let low = u32::from_str_radix(low, 16).map_err(|_| invalid())?;
		Ok(Self::new(high, low))
	}
}

impl Serialize for WalPosition {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for WalPosition {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// Identifier of one WAL history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelineId(pub u32);

impl fmt::Display for TimelineId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for TimelineId {
	type Err = WalError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.trim().parse::<u32>().map(TimelineId).map_err(|_| WalError::InvalidTimeline(s.to_string()))
	}
}

/// A WAL position together with the timeline it belongs to.
///
/// Every engine primitive reports its result in this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalPoint {
	pub position: WalPosition,
	pub timeline: TimelineId,
}

impl WalPoint {
	pub fn new(position: WalPosition, timeline: TimelineId) -> Self {
		Self { position, timeline }
	}

	/// Same position, different timeline.
	pub fn on_timeline(self, timeline: TimelineId) -> Self {
		Self { timeline, ..self }
	}

	/// Name of the segment file that contains this point.
	pub fn segment_filename(&self, size: SegmentSize) -> String {
		segment_filename(self.timeline, SegmentNumber::containing(self.position, size), size)
	}

	/// Name of the last segment that is completely written before this point.
	///
	/// For a backup stop point this is the final segment a restore needs.
	pub fn stop_segment_filename(&self, size: SegmentSize) -> String {
		segment_filename(self.timeline, SegmentNumber::preceding(self.position, size), size)
	}
}

impl fmt::Display for WalPoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (timeline {})", self.position, self.timeline)
	}
}

/// Fixed size of one WAL segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SegmentSize(u32);

impl SegmentSize {
	pub const MIN: u32 = 1024 * 1024;
	pub const MAX: u32 = 1024 * 1024 * 1024;
	pub const DEFAULT: SegmentSize = SegmentSize(16 * 1024 * 1024);

	pub fn new(bytes: u64) -> Result<Self, WalError> {
		if bytes < Self::MIN as u64 || bytes > Self::MAX as u64 || !bytes.is_power_of_two() {
			return Err(WalError::InvalidSegmentSize(bytes));
		}
		Ok(Self(bytes as u32))
	}

	pub fn from_megabytes(megabytes: u32) -> Result<Self, WalError> {
		Self::new(megabytes as u64 * 1024 * 1024)
	}

	pub fn bytes(self) -> u64 {
		self.0 as u64
	}

	/// Number of segments covered by one value of the position's high 32 bits.
	pub fn segments_per_xlog_id(self) -> u64 {
		XLOG_ID_SPAN / self.bytes()
	}
}

impl Default for SegmentSize {
	fn default() -> Self {
		Self::DEFAULT
	}
}

impl<'de> Deserialize<'de> for SegmentSize {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let bytes = u64::deserialize(deserializer)?;
		SegmentSize::new(bytes).map_err(serde::de::Error::custom)
	}
}

/// Sequential number of a segment file in the WAL stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentNumber(pub u64);

impl SegmentNumber {
	/// Segment holding the byte at `position`.
	pub fn containing(position: WalPosition, size: SegmentSize) -> Self {
		Self(position.0 / size.bytes())
	}

	/// Segment holding the byte just before `position`.
	///
	/// A position on a segment boundary therefore maps to the previous,
	/// complete segment. Position zero has no predecessor and maps to segment 0.
	pub fn preceding(position: WalPosition, size: SegmentSize) -> Self {
		Self(position.0.saturating_sub(1) / size.bytes())
	}
}

/// Builds the 24-character segment file name: timeline, high and low segment parts.
pub fn segment_filename(timeline: TimelineId, segment: SegmentNumber, size: SegmentSize) -> String {
	let per_id = size.segments_per_xlog_id();
	format!("{:08X}{:08X}{:08X}", timeline.0, (segment.0 / per_id) as u32, (segment.0 % per_id) as u32)
}
