use clap::Parser;
use tracing::error;
use walguard_cli::cli::Cli;
use walguard_cli::output::{ResultBuilder, print_result};
use walguard_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let command = cli.command.name();
	let format = cli.format;
	if let Err(err) = commands::dispatch(cli).await {
		let result = ResultBuilder::<()>::new(command).error(err.code(), err.to_string()).build();
		print_result(&result, format);
		error!(target = "walguard.cli", error = %err, "command failed");
		std::process::exit(1);
	}
}
