use serde::{Deserialize, Serialize};

use crate::error::{BackupError, Result};

/// Upper bound on the caller label, in bytes.
pub const DEFAULT_MAX_LABEL_BYTES: usize = 1024;

/// Tunables of a [`BackupCoordinator`](crate::BackupCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
	/// Passed to the engine when the last session ends. The stop segment is
	/// returned to the caller either way; archiving it stays the caller's job.
	pub wait_for_archive: bool,
	pub max_label_bytes: usize,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self {
			wait_for_archive: false,
			max_label_bytes: DEFAULT_MAX_LABEL_BYTES,
		}
	}
}

impl CoordinatorConfig {
	/// Checks that `label` fits on one line of the label text.
	pub fn validate_label(&self, label: &str) -> Result<()> {
		if label.len() > self.max_label_bytes {
			return Err(BackupError::InvalidLabel(format!("label too long (max {} bytes)", self.max_label_bytes)));
		}
		if label.contains(['\n', '\r']) {
			return Err(BackupError::InvalidLabel("label must be a single line".to_string()));
		}
		Ok(())
	}
}
