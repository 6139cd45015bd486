//! Names accepted in batch requests.

/// A command understood by `walguard run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchCommand {
	Start,
	Stop,
	Abort,
	Status,
	EngineRecovery,
	EnginePromote,
	EngineAdvance,
	EngineFail,
	Quit,
}

/// Primary name first, aliases after.
const NAMES: &[(BatchCommand, &[&str])] = &[
	(BatchCommand::Start, &["start", "start_backup", "begin"]),
	(BatchCommand::Stop, &["stop", "stop_backup", "end"]),
	(BatchCommand::Abort, &["abort", "abort_backup"]),
	(BatchCommand::Status, &["status"]),
	(BatchCommand::EngineRecovery, &["engine.recovery"]),
	(BatchCommand::EnginePromote, &["engine.promote"]),
	(BatchCommand::EngineAdvance, &["engine.advance"]),
	(BatchCommand::EngineFail, &["engine.fail"]),
	(BatchCommand::Quit, &["quit", "exit"]),
];

pub fn lookup_command(name: &str) -> Option<BatchCommand> {
	NAMES.iter().find(|(_, names)| names.contains(&name)).map(|(command, _)| *command)
}

pub fn command_name(command: BatchCommand) -> &'static str {
	NAMES.iter().find(|(candidate, _)| *candidate == command).map(|(_, names)| names[0]).unwrap_or("unknown")
}
