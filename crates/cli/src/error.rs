use thiserror::Error;
use walguard::BackupError;
use walguard_protocol::{LabelError, WalError};

use crate::output::ErrorCode;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Backup(#[from] BackupError),

	#[error("malformed backup label: {0}")]
	Label(#[from] LabelError),

	#[error(transparent)]
	Wal(#[from] WalError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("{0}")]
	InvalidInput(String),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CliError::Backup(err) => match err {
				BackupError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
				BackupError::UnknownSession => ErrorCode::UnknownSession,
				BackupError::EngineUnavailable(_) => ErrorCode::EngineUnavailable,
				BackupError::InconsistentProtectionState(_) => ErrorCode::InconsistentProtectionState,
				BackupError::InvalidLabel(_) => ErrorCode::InvalidLabel,
			},
			CliError::Label(_) | CliError::Wal(_) | CliError::Json(_) | CliError::InvalidInput(_) => ErrorCode::InvalidInput,
			CliError::Io(_) => ErrorCode::IoError,
			CliError::Anyhow(_) => ErrorCode::InternalError,
		}
	}
}

pub type Result<T> = std::result::Result<T, CliError>;
