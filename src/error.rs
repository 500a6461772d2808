use thiserror::Error;

use crate::statement::StatementState;
use crate::status::{Diagnostics, SQLCODE_INVALID_HANDLE};

/// Errors surfaced by the binding.
///
/// Each native failure is tagged with the operation that produced it and carries the
/// [`Diagnostics`] read from the status vector of that call.
#[derive(Debug, Error)]
pub enum IscError {
    #[error("attach failed: {0}")]
    Attach(Diagnostics),

    #[error("detach failed: {0}")]
    Detach(Diagnostics),

    #[error("create database failed: {0}")]
    CreateDatabase(Diagnostics),

    #[error("drop database failed: {0}")]
    DropDatabase(Diagnostics),

    #[error("begin transaction failed: {0}")]
    Begin(Diagnostics),

    #[error("commit failed: {0}")]
    Commit(Diagnostics),

    #[error("rollback failed: {0}")]
    Rollback(Diagnostics),

    #[error("statement allocation failed: {0}")]
    Allocate(Diagnostics),

    #[error("prepare failed: {0}")]
    Prepare(Diagnostics),

    #[error("describe failed: {0}")]
    Describe(Diagnostics),

    #[error("bind failed: {0}")]
    Bind(Diagnostics),

    #[error("execute failed: {0}")]
    Execute(Diagnostics),

    #[error("fetch failed: {0}")]
    Fetch(Diagnostics),

    #[error("close failed: {0}")]
    Close(Diagnostics),

    #[error("blob operation failed: {0}")]
    Blob(Diagnostics),

    #[error("cannot {operation} a statement in the {state} state")]
    InvalidState {
        operation: &'static str,
        state: StatementState,
    },

    #[error("statement has no result set")]
    NoResultSet,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IscError {
    /// Diagnostics of the failed native call, if the error came from one.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            IscError::Attach(d)
            | IscError::Detach(d)
            | IscError::CreateDatabase(d)
            | IscError::DropDatabase(d)
            | IscError::Begin(d)
            | IscError::Commit(d)
            | IscError::Rollback(d)
            | IscError::Allocate(d)
            | IscError::Prepare(d)
            | IscError::Describe(d)
            | IscError::Bind(d)
            | IscError::Execute(d)
            | IscError::Fetch(d)
            | IscError::Close(d)
            | IscError::Blob(d) => Some(d),
            IscError::InvalidState { .. }
            | IscError::NoResultSet
            | IscError::Decode(_)
            | IscError::Config(_) => None,
        }
    }

    /// SQL error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.diagnostics().map(|d| d.code)
    }

    /// True when the call was refused because a handle is no longer valid.
    #[must_use]
    pub fn is_invalid_handle(&self) -> bool {
        self.code() == Some(SQLCODE_INVALID_HANDLE)
    }
}

pub type Result<T, E = IscError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::HandleKind;

    #[test]
    fn exposes_diagnostics_of_native_failures() {
        let err = IscError::Begin(Diagnostics::invalid_handle(HandleKind::Database));
        assert!(err.is_invalid_handle());
        assert_eq!(err.code(), Some(-901));
        assert_eq!(
            err.to_string(),
            "begin transaction failed: -901: invalid database handle (no active connection)"
        );
    }

    #[test]
    fn client_side_errors_carry_no_code() {
        let err = IscError::InvalidState {
            operation: "fetch",
            state: StatementState::Prepared,
        };
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "cannot fetch a statement in the prepared state");
    }
}
