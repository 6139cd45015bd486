//! Settings file for the command shim.
//!
//! One JSON document with two optional sections:
//!
//! ```json
//! {
//!   "coordinator": { "waitForArchive": false, "maxLabelBytes": 1024 },
//!   "engine": { "timeline": 1, "insertPosition": "0/1000028", "segmentSize": 16777216 }
//! }
//! ```
//!
//! Missing sections and fields take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use walguard::CoordinatorConfig;
use walguard_runtime::SimulatedEngineConfig;

use crate::error::Result;


#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WalguardConfig {
	pub coordinator: CoordinatorConfig,
	pub engine: SimulatedEngineConfig,
}

impl WalguardConfig {
	/// Reads `path`, or returns the defaults when no path is given. A path that
	/// cannot be read or parsed is an error.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let Some(path) = path else {
			return Ok(Self::default());
		};
		let content = fs::read_to_string(path)?;
		let config: Self = serde_json::from_str(&content)?;
		debug!(target = "walguard.cli", path = %path.display(), "loaded config");
		Ok(config)
	}
}
