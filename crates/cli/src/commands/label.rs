use std::path::Path;

use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use walguard_protocol::BackupLabel;

use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_result};

pub async fn execute(file: &Path, format: OutputFormat) -> Result<()> {
	let text = if file == Path::new("-") {
		let mut text = String::new();
		tokio::io::stdin().read_to_string(&mut text).await?;
		text
	} else {
		tokio::fs::read_to_string(file).await?
	};

	let label = BackupLabel::parse(&text)?;
	print_result(&ResultBuilder::new("label").data(describe(&label)).build(), format);
	Ok(())
}

fn describe(label: &BackupLabel) -> Value {
	json!({
		"label": label.label,
		"startPosition": label.start.position,
		"startTimeline": label.start.timeline,
		"method": label.method,
		"source": label.source,
		"backupId": label.backup_id,
		"startTime": label.start_time,
	})
}
