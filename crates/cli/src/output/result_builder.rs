use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use crate::output::format::OutputFormat;
use crate::output::model::{CommandError, CommandResult, ErrorCode};

/// Builder for constructing command results.
pub struct ResultBuilder<T: Serialize> {
	command: String,
	id: Option<String>,
	data: Option<T>,
	error: Option<CommandError>,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			id: None,
			data: None,
			error: None,
		}
	}

	pub fn id(mut self, id: Option<String>) -> Self {
		self.id = id;
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
		});
		self
	}

	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();

		CommandResult {
			ok,
			command: self.command,
			id: self.id,
			data: self.data,
			error: self.error,
		}
	}
}

/// Renders a result as the text that [`print_result`] would emit, without the
/// trailing newline.
pub fn render_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) -> String {
	match format {
		OutputFormat::Json => serde_json::to_string(result).unwrap_or_else(|err| {
			format!(r#"{{"ok":false,"command":"{}","error":{{"code":"INTERNAL_ERROR","message":"{err}"}}}}"#, result.command)
		}),
		OutputFormat::Text => render_text(result),
	}
}

/// Print a command result to stdout in the specified format.
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	let mut stdout = io::stdout().lock();
	let _ = writeln!(stdout, "{}", render_result(result, format));
}

fn render_text<T: Serialize>(result: &CommandResult<T>) -> String {
	if let Some(ref error) = result.error {
		return format!("error[{}]: {}", error.code, error.message);
	}

	let Some(ref data) = result.data else {
		return String::new();
	};

	match serde_json::to_value(data) {
		Ok(Value::String(text)) => text.trim_end_matches('\n').to_string(),
		Ok(Value::Object(fields)) => fields
			.iter()
			.map(|(key, value)| match value {
				Value::String(s) => format!("{key}: {s}"),
				other => format!("{key}: {other}"),
			})
			.collect::<Vec<_>>()
			.join("\n"),
		Ok(other) => other.to_string(),
		Err(err) => format!("error[{}]: {err}", ErrorCode::InternalError),
	}
}
