use serde_json::{Value, json};
use walguard_protocol::{SegmentSize, TimelineId, WalPoint, WalPosition};

use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_result};

pub fn execute(position: WalPosition, timeline: TimelineId, preceding: bool, segment_size_mb: u32, format: OutputFormat) -> Result<()> {
	let size = SegmentSize::from_megabytes(segment_size_mb)?;
	print_result(&ResultBuilder::new("segment").data(describe(WalPoint::new(position, timeline), preceding, size)).build(), format);
	Ok(())
}

fn describe(point: WalPoint, preceding: bool, size: SegmentSize) -> Value {
	let filename = if preceding { point.stop_segment_filename(size) } else { point.segment_filename(size) };
	json!({
		"filename": filename,
		"position": point.position,
		"timeline": point.timeline,
		"segmentSize": size.bytes(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn boundary_position_names_previous_segment_only_when_preceding() {
		let point = WalPoint::new(WalPosition(0x0300_0000), TimelineId(1));

		assert_eq!(describe(point, false, SegmentSize::DEFAULT)["filename"], "000000010000000000000003");
		assert_eq!(describe(point, true, SegmentSize::DEFAULT)["filename"], "000000010000000000000002");
	}

	#[test]
	fn larger_segments_change_the_split() {
		let size = SegmentSize::from_megabytes(64).unwrap();
		let point = WalPoint::new(WalPosition::new(1, 0x4000_0010), TimelineId(3));

		assert_eq!(describe(point, false, size)["filename"], "000000030000000100000010");
	}

	#[test]
	fn non_power_of_two_size_is_rejected() {
		let err = execute(WalPosition::ZERO, TimelineId(1), false, 3, OutputFormat::Json).unwrap_err();
		assert_eq!(err.code(), crate::output::ErrorCode::InvalidInput);
	}
}
