use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use walguard::Role;
use walguard_protocol::{TimelineId, WalPosition};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "walguard")]
#[command(about = "Coordinate concurrent physical backups of a WAL-based storage engine")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// JSON config file (coordinator and simulated engine settings)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Privilege of the calling identity
	#[arg(long, global = true, value_enum, default_value = "superuser")]
	pub role: RoleArg,

	/// Name of the calling identity, used in logs
	#[arg(long, global = true, default_value = "walguard")]
	pub caller: String,

	/// Output format for results
	#[arg(short, long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Serve NDJSON session requests from stdin against an in-process coordinator
	Run,

	/// Parse a backup label file and print its fields
	Label {
		/// Label file, or - for stdin
		#[arg(default_value = "-")]
		file: PathBuf,
	},

	/// Print the WAL segment file name for a position
	#[command(alias = "seg")]
	Segment {
		/// WAL position as <hex>/<hex>
		position: WalPosition,
		/// Timeline of the position
		#[arg(short, long, default_value = "1")]
		timeline: TimelineId,
		/// Name the segment before the one holding the position (stop segment)
		#[arg(long)]
		preceding: bool,
		/// WAL segment size in MiB
		#[arg(long, default_value = "16")]
		segment_size_mb: u32,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Run => "run",
			Commands::Label { .. } => "label",
			Commands::Segment { .. } => "segment",
		}
	}
}

/// Caller privilege as accepted on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
	#[default]
	Superuser,
	Replication,
	Regular,
}

impl From<RoleArg> for Role {
	fn from(role: RoleArg) -> Self {
		match role {
			RoleArg::Superuser => Role::Superuser,
			RoleArg::Replication => Role::Replication,
			RoleArg::Regular => Role::Regular,
		}
	}
}
