//! Authorization for canvas operations.
//!
//! [`is_allowed`] is a pure function with no I/O. Every mutation entry point
//! of an editing session calls it before touching the document, and the
//! store consults the same rules for incoming saves.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::PermissionLevel;
use crate::{Error, Result};

/// The caller's relationship to a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Edit,
    View,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Edit => "edit",
            Role::View => "view",
        }
    }
}

impl From<PermissionLevel> for Role {
    fn from(level: PermissionLevel) -> Self {
        match level {
            PermissionLevel::View => Role::View,
            PermissionLevel::Edit => Role::Edit,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the caller is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Mutate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Mutate => "mutate",
        }
    }
}

/// Whether `role` may perform `operation`.
pub fn is_allowed(role: Role, operation: Operation) -> bool {
    match (role, operation) {
        (_, Operation::Read) => true,
        (Role::Owner | Role::Edit, Operation::Mutate) => true,
        (Role::View, Operation::Mutate) => false,
    }
}

/// Like [`is_allowed`], but returns a `Permission` error naming the action.
pub fn require(role: Role, operation: Operation, action: &str) -> Result<()> {
    if is_allowed(role, operation) {
        Ok(())
    } else {
        Err(Error::Permission(format!(
            "{} access cannot {} ({})",
            role,
            operation.as_str(),
            action
        )))
    }
}

/// Share listing and editing is reserved for the canvas owner.
pub fn require_owner(role: Role, action: &str) -> Result<()> {
    if role == Role::Owner {
        Ok(())
    } else {
        Err(Error::Permission(format!(
            "only the canvas owner can {}",
            action
        )))
    }
}
