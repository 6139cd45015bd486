pub mod label;
pub mod registry;
pub mod run;
pub mod segment;

use tracing::debug;
use walguard::Caller;

use crate::cli::{Cli, Commands};
use crate::config::WalguardConfig;
use crate::error::Result;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let format = cli.format;
	debug!(target = "walguard.cli", command = cli.command.name(), %format, "dispatching");

	match cli.command {
		Commands::Run => {
			let config = WalguardConfig::load(cli.config.as_deref())?;
			let caller = Caller::new(cli.caller, cli.role.into());
			run::execute(config, caller, format).await
		}
		Commands::Label { file } => label::execute(&file, format).await,
		Commands::Segment {
			position,
			timeline,
			preceding,
			segment_size_mb,
		} => segment::execute(position, timeline, preceding, segment_size_mb, format),
	}
}
