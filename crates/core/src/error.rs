use thiserror::Error;
use walguard_runtime::EngineError;

/// Errors returned by backup session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackupError {
	#[error("must be superuser or replication role to run a backup (caller '{caller}')")]
	PermissionDenied { caller: String },

	#[error("no open backup session matches the given label text")]
	UnknownSession,

	#[error("engine cannot serve the backup: {0}")]
	EngineUnavailable(#[from] EngineError),

	#[error("backup protection state is inconsistent ({0}); no further backups until restart")]
	InconsistentProtectionState(String),

	#[error("invalid backup label: {0}")]
	InvalidLabel(String),
}

impl BackupError {
	/// `true` for errors after which the coordinator refuses all further work.
	pub fn is_fatal(&self) -> bool {
		matches!(self, BackupError::InconsistentProtectionState(_))
	}
}

pub type Result<T> = std::result::Result<T, BackupError>;
