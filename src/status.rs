//! Translation of status vectors into structured diagnostics.

use std::fmt;

use serde::Serialize;

use crate::ibase::{ISC_STATUS_LENGTH, IscApi, StatusVector};

/// SQL code the server uses for invalid handles.
pub const SQLCODE_INVALID_HANDLE: i32 = -901;
/// SQL code the server uses for descriptor (SQLDA) errors.
pub const SQLCODE_SQLDA: i32 = -804;

/// Outcome of a native call in structured form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub ok: bool,
    /// Primary SQL error code (`isc_sqlcode`), zero on success
    pub code: i32,
    /// One line per error cluster of the status vector
    pub message: String,
}

/// Kind of native handle, used when a consumed handle is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Database,
    Transaction,
    Statement,
}

impl Diagnostics {
    /// Build diagnostics from the status vector of the call that just returned.
    ///
    /// The message is assembled by walking the error clusters until the terminator.
    /// Never fails.
    pub fn from_status<A: IscApi + ?Sized>(api: &A, status: &StatusVector) -> Self {
        if !status.is_error() {
            return Self::success();
        }

        let mut lines = Vec::new();
        let mut cursor = 0;
        // A vector cannot hold more clusters than words
        for _ in 0..ISC_STATUS_LENGTH {
            match api.interpret(status, &mut cursor) {
                Some(line) => lines.push(line),
                None => break,
            }
        }

        let message = if lines.is_empty() {
            format!("unknown error (gds code {})", status.as_slice()[1])
        } else {
            lines.join("\n")
        };

        Self {
            ok: false,
            code: api.sqlcode(status),
            message,
        }
    }

    #[must_use]
    pub fn success() -> Self {
        Self {
            ok: true,
            code: 0,
            message: String::new(),
        }
    }

    /// Diagnostics for a call refused because its handle was already released.
    #[must_use]
    pub fn invalid_handle(kind: HandleKind) -> Self {
        let message = match kind {
            HandleKind::Database => "invalid database handle (no active connection)",
            HandleKind::Transaction => {
                "invalid transaction handle (expecting explicit transaction start)"
            }
            HandleKind::Statement => "invalid statement handle",
        };
        Self::client(SQLCODE_INVALID_HANDLE, message)
    }

    /// Diagnostics produced by this layer without a native call.
    pub(crate) fn client(code: i32, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibase::{
        BlobHandle, DbHandle, ISC_ARG_END, ISC_ARG_GDS, ISC_ARG_NUMBER, ISC_BAD_DB_HANDLE,
        ISC_DSQL_ERROR, ISC_DSQL_RELATION_ERR, IscStatus, QuadId, StmtHandle, TrHandle, Xsqlda,
    };

    /// Renders each GDS cluster as `gds <code>` and skips number arguments.
    struct Interpreter;

    impl IscApi for Interpreter {
        fn attach_database(
            &mut self,
            _: &mut StatusVector,
            _: &str,
            _: &mut DbHandle,
            _: &[u8],
        ) -> IscStatus {
            0
        }

        fn detach_database(&mut self, _: &mut StatusVector, _: &mut DbHandle) -> IscStatus {
            0
        }

        fn create_database(
            &mut self,
            _: &mut StatusVector,
            _: &str,
            _: &mut DbHandle,
            _: &[u8],
        ) -> IscStatus {
            0
        }

        fn drop_database(&mut self, _: &mut StatusVector, _: &mut DbHandle) -> IscStatus {
            0
        }

        fn start_transaction(
            &mut self,
            _: &mut StatusVector,
            _: &mut TrHandle,
            _: &mut DbHandle,
            _: &[u8],
        ) -> IscStatus {
            0
        }

        fn commit_transaction(&mut self, _: &mut StatusVector, _: &mut TrHandle) -> IscStatus {
            0
        }

        fn commit_retaining(&mut self, _: &mut StatusVector, _: &mut TrHandle) -> IscStatus {
            0
        }

        fn rollback_transaction(&mut self, _: &mut StatusVector, _: &mut TrHandle) -> IscStatus {
            0
        }

        fn rollback_retaining(&mut self, _: &mut StatusVector, _: &mut TrHandle) -> IscStatus {
            0
        }

        fn dsql_allocate_statement(
            &mut self,
            _: &mut StatusVector,
            _: &mut DbHandle,
            _: &mut StmtHandle,
        ) -> IscStatus {
            0
        }

        fn dsql_prepare(
            &mut self,
            _: &mut StatusVector,
            _: &mut TrHandle,
            _: &mut StmtHandle,
            _: &[u8],
            _: u16,
            _: &mut Xsqlda,
        ) -> IscStatus {
            0
        }

        fn dsql_describe(
            &mut self,
            _: &mut StatusVector,
            _: &mut StmtHandle,
            _: &mut Xsqlda,
        ) -> IscStatus {
            0
        }

        fn dsql_describe_bind(
            &mut self,
            _: &mut StatusVector,
            _: &mut StmtHandle,
            _: &mut Xsqlda,
        ) -> IscStatus {
            0
        }

        fn dsql_execute(
            &mut self,
            _: &mut StatusVector,
            _: &mut TrHandle,
            _: &mut StmtHandle,
            _: Option<&Xsqlda>,
        ) -> IscStatus {
            0
        }

        fn dsql_execute_immediate(
            &mut self,
            _: &mut StatusVector,
            _: &mut DbHandle,
            _: &mut TrHandle,
            _: &[u8],
            _: u16,
        ) -> IscStatus {
            0
        }

        fn dsql_fetch(
            &mut self,
            _: &mut StatusVector,
            _: &mut StmtHandle,
            _: &mut Xsqlda,
        ) -> IscStatus {
            0
        }

        fn dsql_free_statement(
            &mut self,
            _: &mut StatusVector,
            _: &mut StmtHandle,
            _: u16,
        ) -> IscStatus {
            0
        }

        fn create_blob(
            &mut self,
            _: &mut StatusVector,
            _: &mut DbHandle,
            _: &mut TrHandle,
            _: &mut BlobHandle,
            _: &mut QuadId,
        ) -> IscStatus {
            0
        }

        fn open_blob(
            &mut self,
            _: &mut StatusVector,
            _: &mut DbHandle,
            _: &mut TrHandle,
            _: &mut BlobHandle,
            _: &QuadId,
        ) -> IscStatus {
            0
        }

        fn put_segment(&mut self, _: &mut StatusVector, _: &mut BlobHandle, _: &[u8]) -> IscStatus {
            0
        }

        fn get_segment(
            &mut self,
            _: &mut StatusVector,
            _: &mut BlobHandle,
            _: &mut [u8],
            _: &mut usize,
        ) -> IscStatus {
            0
        }

        fn close_blob(&mut self, _: &mut StatusVector, _: &mut BlobHandle) -> IscStatus {
            0
        }

        fn sqlcode(&self, status: &StatusVector) -> i32 {
            if status.gds_code() == Some(ISC_BAD_DB_HANDLE) {
                -901
            } else {
                -204
            }
        }

        fn interpret(&self, status: &StatusVector, cursor: &mut usize) -> Option<String> {
            let words = status.as_slice();
            while *cursor + 1 < words.len() {
                let (tag, value) = (words[*cursor], words[*cursor + 1]);
                *cursor += 2;
                match tag {
                    ISC_ARG_END => return None,
                    ISC_ARG_GDS => return Some(format!("gds {value}")),
                    _ => {}
                }
            }
            None
        }
    }

    #[test]
    fn success_vector_is_ok() {
        let mut status = StatusVector::new();
        status.clear();
        let diag = Diagnostics::from_status(&Interpreter, &status);
        assert!(diag.ok);
        assert_eq!(diag.code, 0);
        assert!(diag.message.is_empty());
    }

    #[test]
    fn walks_every_cluster_until_the_terminator() {
        let mut status = StatusVector::new();
        status.set(&[
            ISC_ARG_GDS,
            ISC_DSQL_ERROR,
            ISC_ARG_NUMBER,
            7,
            ISC_ARG_GDS,
            ISC_DSQL_RELATION_ERR,
        ]);
        let diag = Diagnostics::from_status(&Interpreter, &status);
        assert!(!diag.ok);
        assert_eq!(diag.code, -204);
        assert_eq!(
            diag.message,
            format!("gds {ISC_DSQL_ERROR}\ngds {ISC_DSQL_RELATION_ERR}")
        );
    }

    #[test]
    fn invalid_handle_uses_sqlcode_901() {
        let diag = Diagnostics::invalid_handle(HandleKind::Statement);
        assert!(!diag.ok);
        assert_eq!(diag.code, SQLCODE_INVALID_HANDLE);
        assert_eq!(diag.to_string(), "-901: invalid statement handle");
    }
}
