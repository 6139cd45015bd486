//! Privilege check performed before any backup operation.

use serde::{Deserialize, Serialize};

use crate::error::{BackupError, Result};

/// Privilege level of the caller as established by the command shim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Superuser,
	Replication,
	#[default]
	Regular,
}

impl Role {
	pub fn can_run_backups(self) -> bool {
		matches!(self, Role::Superuser | Role::Replication)
	}
}

/// Who is asking. Only used for the privilege check and log lines; sessions are
/// not tied to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
	pub name: String,
	pub role: Role,
}

impl Caller {
	pub fn new(name: impl Into<String>, role: Role) -> Self {
		Self { name: name.into(), role }
	}

	pub fn superuser(name: impl Into<String>) -> Self {
		Self::new(name, Role::Superuser)
	}
}

pub fn authorize(caller: &Caller) -> Result<()> {
	if caller.role.can_run_backups() {
		Ok(())
	} else {
		Err(BackupError::PermissionDenied { caller: caller.name.clone() })
	}
}
