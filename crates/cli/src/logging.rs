//! Tracing subscriber setup.
//!
//! Logs go to stderr; stdout carries command results only.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `-v` enables info, `-vv` debug; `RUST_LOG`
/// takes precedence when set.
pub fn init_logging(verbose: u8) {
	let default_level = match verbose {
		0 => "warn",
		1 => "info",
		_ => "debug",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(true).try_init();
}
