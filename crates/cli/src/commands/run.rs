//! `walguard run`: NDJSON request loop against an in-process coordinator.
//!
//! Each stdin line is one request:
//!
//! ```json
//! {"id": "1", "command": "start", "args": {"label": "nightly", "fast": true}}
//! ```
//!
//! Each request gets exactly one result envelope on stdout, in order. A line
//! that is not a valid request gets an `INVALID_INPUT` envelope and the loop
//! continues; `quit` or end of input ends it.

use std::sync::Arc;

use anyhow::anyhow;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use walguard::{BackupCoordinator, Caller, Role};
use walguard_protocol::TimelineId;
use walguard_runtime::{EngineError, SimulatedEngine, StorageEngine};

use crate::commands::registry::{BatchCommand, command_name, lookup_command};
use crate::config::WalguardConfig;
use crate::error::{CliError, Result};
use crate::output::{CommandResult, ErrorCode, OutputFormat, ResultBuilder, render_result};

type Coordinator = BackupCoordinator<Arc<SimulatedEngine>>;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
	#[serde(default)]
	pub id: Option<String>,
	pub command: String,
	#[serde(default)]
	pub args: Value,
	/// Overrides the role given on the command line for this request only.
	#[serde(default)]
	pub role: Option<Role>,
}

/// State shared by all requests of one `walguard run`.
pub struct BatchContext {
	coordinator: Arc<Coordinator>,
	engine: Arc<SimulatedEngine>,
	caller: Caller,
}

impl BatchContext {
	pub fn new(config: WalguardConfig, caller: Caller) -> Self {
		let engine = Arc::new(SimulatedEngine::new(config.engine));
		let coordinator = Arc::new(BackupCoordinator::new(Arc::clone(&engine), config.coordinator));
		Self { coordinator, engine, caller }
	}

	/// Runs one request. The flag is `true` when the loop should stop.
	pub async fn execute(&self, request: BatchRequest) -> (CommandResult<Value>, bool) {
		let id = request.id;
		let Some(command) = lookup_command(&request.command) else {
			let message = format!("unknown command: {}", request.command);
			return (ResultBuilder::new(request.command).id(id).error(ErrorCode::InvalidInput, message).build(), false);
		};
		let name = command_name(command);
		let caller = match request.role {
			Some(role) => Caller::new(self.caller.name.clone(), role),
			None => self.caller.clone(),
		};

		let result = match self.run_command(command, caller, request.args).await {
			Ok(data) => ResultBuilder::new(name).id(id).data(data).build(),
			Err(err) => {
				debug!(target = "walguard.cli", command = name, error = %err, "request failed");
				ResultBuilder::new(name).id(id).error(err.code(), err.to_string()).build()
			}
		};
		(result, command == BatchCommand::Quit)
	}

	async fn run_command(&self, command: BatchCommand, caller: Caller, args: Value) -> Result<Value> {
		match command {
			BatchCommand::Start => {
				let args: StartArgs = parse_args(args)?;
				let coordinator = Arc::clone(&self.coordinator);
				let session = blocking(move || coordinator.begin(&caller, &args.label, args.fast)).await?;
				Ok(json!({
					"labelText": session.token,
					"backupId": session.backup_id,
					"startPosition": session.start_position,
					"startTimeline": session.start_timeline,
				}))
			}
			BatchCommand::Stop => {
				let args: StopArgs = parse_args(args)?;
				let coordinator = Arc::clone(&self.coordinator);
				let info = blocking(move || coordinator.end(&caller, &args.label_text)).await?;
				Ok(serde_json::to_value(info)?)
			}
			BatchCommand::Abort => {
				let args: AbortArgs = parse_args(args)?;
				let coordinator = Arc::clone(&self.coordinator);
				let session = blocking(move || coordinator.abort(&caller, args.label_text.as_deref())).await?;
				Ok(json!({
					"aborted": session.is_some(),
					"session": session.map(|session| session.summary()),
				}))
			}
			BatchCommand::Status => Ok(json!({
				"protection": self.coordinator.status(),
				"engineCalls": self.engine.calls(),
				"engine": self.engine_view(),
			})),
			BatchCommand::EngineRecovery => {
				let args: TimelineArgs = parse_args(args)?;
				if self.engine.is_in_recovery() {
					self.engine.switch_replay_timeline(args.timeline);
				} else {
					self.engine.enter_recovery(args.timeline);
				}
				Ok(self.engine_view())
			}
			BatchCommand::EnginePromote => {
				let args: TimelineArgs = parse_args(args)?;
				self.engine.promote(args.timeline);
				Ok(self.engine_view())
			}
			BatchCommand::EngineAdvance => {
				let args: AdvanceArgs = parse_args(args)?;
				self.engine.advance(args.bytes);
				Ok(self.engine_view())
			}
			BatchCommand::EngineFail => {
				let args: FailArgs = parse_args(args)?;
				let error = args.error.into_engine_error(args.message);
				match args.operation {
					FailOperation::Begin => self.engine.fail_next_begin(error.clone()),
					FailOperation::End => self.engine.fail_next_end(error.clone()),
					FailOperation::Replay => self.engine.fail_next_replay(error.clone()),
				}
				Ok(json!({ "armed": args.operation, "error": error.to_string() }))
			}
			BatchCommand::Quit => Ok(json!({ "quit": true })),
		}
	}

	fn engine_view(&self) -> Value {
		let position = self.engine.current_insert_position().ok();
		json!({
			"inRecovery": self.engine.is_in_recovery(),
			"insertPosition": position.map(|point| point.position),
			"timeline": position.map(|point| point.timeline),
			"replay": self.engine.replay_point(),
			"protected": self.engine.is_protected(),
		})
	}
}

#[derive(Debug, Deserialize)]
struct StartArgs {
	label: String,
	#[serde(default)]
	fast: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopArgs {
	label_text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AbortArgs {
	label_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineArgs {
	timeline: TimelineId,
}

#[derive(Debug, Deserialize)]
struct AdvanceArgs {
	bytes: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum FailOperation {
	Begin,
	End,
	Replay,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum FailKind {
	ReadOnly,
	CheckpointFailed,
	Unavailable,
}

impl FailKind {
	fn into_engine_error(self, message: String) -> EngineError {
		match self {
			FailKind::ReadOnly => EngineError::ReadOnly,
			FailKind::CheckpointFailed => EngineError::CheckpointFailed(message),
			FailKind::Unavailable => EngineError::Unavailable(message),
		}
	}
}

#[derive(Debug, Deserialize)]
struct FailArgs {
	operation: FailOperation,
	error: FailKind,
	#[serde(default)]
	message: String,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
	let args = if args.is_null() { Value::Object(Default::default()) } else { args };
	serde_json::from_value(args).map_err(|err| CliError::InvalidInput(format!("invalid args: {err}")))
}

/// Runs a coordinator call off the async runtime; engine primitives block.
async fn blocking<T, F>(call: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce() -> walguard::Result<T> + Send + 'static,
{
	let value = tokio::task::spawn_blocking(call)
		.await
		.map_err(|err| CliError::Anyhow(anyhow!("coordinator task failed: {err}")))??;
	Ok(value)
}

pub async fn execute(config: WalguardConfig, caller: Caller, format: OutputFormat) -> Result<()> {
	let context = BatchContext::new(config, caller);
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut stdout = tokio::io::stdout();
	info!(target = "walguard.cli", caller = %context.caller.name, role = ?context.caller.role, "serving batch requests from stdin");

	let mut served = 0u64;
	while let Some(line) = lines.next_line().await? {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		let (result, quit) = match serde_json::from_str::<BatchRequest>(line) {
			Ok(request) => context.execute(request).await,
			Err(err) => {
				warn!(target = "walguard.cli", error = %err, "malformed request line");
				let result = ResultBuilder::new("invalid").error(ErrorCode::InvalidInput, format!("malformed request: {err}")).build();
				(result, false)
			}
		};

		let mut rendered = render_result(&result, format);
		rendered.push('\n');
		stdout.write_all(rendered.as_bytes()).await?;
		stdout.flush().await?;
		served += 1;

		if quit {
			break;
		}
	}

	info!(target = "walguard.cli", served, "batch input finished");
	Ok(())
}
