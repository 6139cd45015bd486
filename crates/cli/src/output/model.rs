use serde::{Deserialize, Serialize};

/// The result envelope returned by all commands and by every batch request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	/// Echo of the batch request id.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
}

/// Error information for failed commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	PermissionDenied,
	UnknownSession,
	EngineUnavailable,
	InconsistentProtectionState,
	InvalidLabel,
	InvalidInput,
	IoError,
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::PermissionDenied => write!(f, "PERMISSION_DENIED"),
			ErrorCode::UnknownSession => write!(f, "UNKNOWN_SESSION"),
			ErrorCode::EngineUnavailable => write!(f, "ENGINE_UNAVAILABLE"),
			ErrorCode::InconsistentProtectionState => write!(f, "INCONSISTENT_PROTECTION_STATE"),
			ErrorCode::InvalidLabel => write!(f, "INVALID_LABEL"),
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::IoError => write!(f, "IO_ERROR"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}
