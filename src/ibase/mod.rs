//! Boundary with the vendor client library.
//!
//! The `isc_*` API reports every outcome through an out-parameter status vector and
//! passes handles by reference. [`IscApi`] reproduces that convention as a trait so the
//! safe layers above it (connection, transaction, statement) can run against the linked
//! `fbclient` library or against the in-process server used by tests.

mod consts;
mod xsqlda;

pub use consts::*;
pub use xsqlda::{Xsqlda, Xsqlvar};

/// One word of a status vector (`ISC_STATUS`, pointer sized).
pub type IscStatus = isize;
/// Attachment handle (`isc_db_handle`); zero is "no handle".
pub type DbHandle = u32;
/// Transaction handle (`isc_tr_handle`); zero is "no handle".
pub type TrHandle = u32;
/// Statement handle (`isc_stmt_handle`); zero is "no handle".
pub type StmtHandle = u32;
/// Blob handle (`isc_blob_handle`); zero is "no handle".
pub type BlobHandle = u32;
/// Blob id as stored in a row (`ISC_QUAD`, eight bytes).
pub type QuadId = [u8; 8];

/// Fixed size status vector filled by every native call.
///
/// Laid out as clusters of `(tag, value)` words terminated by [`ISC_ARG_END`]. A fresh
/// vector is created for each call; nothing is shared between operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusVector([IscStatus; ISC_STATUS_LENGTH]);

impl Default for StatusVector {
    fn default() -> Self {
        StatusVector([0; ISC_STATUS_LENGTH])
    }
}

impl StatusVector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the vector carries an error cluster.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.0[0] == ISC_ARG_GDS && self.0[1] != 0
    }

    /// Primary GDS code, if the vector reports an error.
    #[must_use]
    pub fn gds_code(&self) -> Option<IscStatus> {
        self.is_error().then_some(self.0[1])
    }

    #[must_use]
    pub fn as_slice(&self) -> &[IscStatus] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [IscStatus] {
        &mut self.0
    }

    /// Reset to the success state (`isc_arg_gds, 0, isc_arg_end`).
    pub fn clear(&mut self) {
        self.0 = [0; ISC_STATUS_LENGTH];
        self.0[0] = ISC_ARG_GDS;
    }

    /// Overwrite the vector with `words`, always keeping a trailing terminator.
    pub fn set(&mut self, words: &[IscStatus]) {
        self.0 = [0; ISC_STATUS_LENGTH];
        let len = words.len().min(ISC_STATUS_LENGTH - 1);
        self.0[..len].copy_from_slice(&words[..len]);
        self.0[len] = ISC_ARG_END;
    }
}

/// The vendor's native client call convention.
///
/// Each call writes its outcome into `status` and returns the status word: zero on
/// success, non-zero otherwise (consult [`crate::Diagnostics`]). [`IscApi::dsql_fetch`]
/// additionally returns [`FETCH_END_OF_SET`] once the cursor is exhausted.
///
/// Implementations are not required to be thread safe; the safe layers give each handle
/// a single owner.
pub trait IscApi {
    fn attach_database(
        &mut self,
        status: &mut StatusVector,
        endpoint: &str,
        db: &mut DbHandle,
        dpb: &[u8],
    ) -> IscStatus;

    fn detach_database(&mut self, status: &mut StatusVector, db: &mut DbHandle) -> IscStatus;

    /// Create the database at `endpoint` and attach to it.
    fn create_database(
        &mut self,
        status: &mut StatusVector,
        endpoint: &str,
        db: &mut DbHandle,
        dpb: &[u8],
    ) -> IscStatus;

    /// Drop the attached database; the handle is released on success.
    fn drop_database(&mut self, status: &mut StatusVector, db: &mut DbHandle) -> IscStatus;

    fn start_transaction(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        db: &mut DbHandle,
        tpb: &[u8],
    ) -> IscStatus;

    fn commit_transaction(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus;

    fn commit_retaining(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus;

    fn rollback_transaction(&mut self, status: &mut StatusVector, tr: &mut TrHandle)
    -> IscStatus;

    fn rollback_retaining(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus;

    fn dsql_allocate_statement(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        stmt: &mut StmtHandle,
    ) -> IscStatus;

    /// Compile `sql` and describe its output columns into `out`.
    fn dsql_prepare(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        stmt: &mut StmtHandle,
        sql: &[u8],
        dialect: u16,
        out: &mut Xsqlda,
    ) -> IscStatus;

    /// Describe the output columns of a prepared statement.
    fn dsql_describe(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        out: &mut Xsqlda,
    ) -> IscStatus;

    /// Describe the input parameters of a prepared statement.
    fn dsql_describe_bind(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        input: &mut Xsqlda,
    ) -> IscStatus;

    fn dsql_execute(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        stmt: &mut StmtHandle,
        input: Option<&Xsqlda>,
    ) -> IscStatus;

    fn dsql_execute_immediate(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        sql: &[u8],
        dialect: u16,
    ) -> IscStatus;

    /// Fill the buffers of `out` with the next row.
    fn dsql_fetch(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        out: &mut Xsqlda,
    ) -> IscStatus;

    /// Close the cursor ([`DSQL_CLOSE`]) or release the statement ([`DSQL_DROP`]).
    fn dsql_free_statement(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        option: u16,
    ) -> IscStatus;

    /// Create a blob for writing; `id` receives the id to store in a row.
    fn create_blob(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        blob: &mut BlobHandle,
        id: &mut QuadId,
    ) -> IscStatus;

    fn open_blob(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        blob: &mut BlobHandle,
        id: &QuadId,
    ) -> IscStatus;

    fn put_segment(
        &mut self,
        status: &mut StatusVector,
        blob: &mut BlobHandle,
        segment: &[u8],
    ) -> IscStatus;

    /// Read the next segment into `buffer`, storing the byte count in `actual`.
    ///
    /// A partial segment reports [`ISC_SEGMENT`]; the end of the blob reports
    /// [`ISC_SEGSTR_EOF`].
    fn get_segment(
        &mut self,
        status: &mut StatusVector,
        blob: &mut BlobHandle,
        buffer: &mut [u8],
        actual: &mut usize,
    ) -> IscStatus;

    fn close_blob(&mut self, status: &mut StatusVector, blob: &mut BlobHandle) -> IscStatus;

    /// SQL error code of the vector (`isc_sqlcode`).
    fn sqlcode(&self, status: &StatusVector) -> i32;

    /// Render the error cluster at `cursor` and advance past it (`fb_interpret`).
    ///
    /// Returns `None` once the terminator is reached.
    fn interpret(&self, status: &StatusVector, cursor: &mut usize) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_vector_is_not_an_error() {
        let status = StatusVector::new();
        assert!(!status.is_error());
        assert_eq!(status.gds_code(), None);
    }

    #[test]
    fn set_keeps_a_terminator() {
        let mut status = StatusVector::new();
        let words = [ISC_ARG_GDS; 30];
        status.set(&words);
        assert_eq!(status.as_slice()[ISC_STATUS_LENGTH - 1], ISC_ARG_END);

        status.set(&[ISC_ARG_GDS, ISC_BAD_DB_HANDLE]);
        assert!(status.is_error());
        assert_eq!(status.gds_code(), Some(ISC_BAD_DB_HANDLE));

        status.clear();
        assert!(!status.is_error());
    }
}
