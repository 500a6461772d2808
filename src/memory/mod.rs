//! In-process server speaking the `isc_*` call convention.
//!
//! [`MemoryServer`] holds databases made of typed tables and understands a small SQL
//! subset (single-table SELECT with WHERE and ORDER BY, INSERT, UPDATE, DELETE, CREATE
//! TABLE and DROP TABLE, `?` parameter markers) parsed with `sqlparser`. Each
//! [`MemoryIsc`] client implements [`IscApi`], so the whole binding can run without a
//! vendor library. Transactions work on a private copy of the database that replaces the
//! committed state on commit. Attachments decode SQL and encode text in their `lc_ctype`,
//! and BLOB columns keep their contents in a per-database blob store.
//!
//! The server also counts calls and can be told to fail the next call of a kind, which
//! makes resource release and error paths observable from tests.
//!
//! ```rust
//! use isc_binding::ibase::ISC_LOGIN;
//! use isc_binding::memory::{MemoryServer, Op};
//! use isc_binding::prelude::*;
//!
//! let server = MemoryServer::new();
//! server.create_database("employee");
//! server.fail_next(Op::Attach, ISC_LOGIN);
//!
//! let opts = ConnectionOptions::new("employee", "SYSDBA", "masterkey");
//! let err = Connection::open(server.client(), &opts).unwrap_err();
//! assert_eq!(err.code(), Some(-902));
//! assert_eq!(server.calls(Op::Attach), 1);
//! ```

mod engine;
mod messages;
mod parser;
mod store;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

pub use store::ColumnDef;

use crate::error::{IscError, Result};
use crate::ibase::{
    BlobHandle, DbHandle, IscApi, IscStatus, QuadId, StatusVector, StmtHandle, TrHandle, Xsqlda,
};
use crate::types::Value;
use engine::ServerState;
use messages::Fault;
use store::Table;

/// Kind of native call, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Attach,
    Detach,
    CreateDatabase,
    DropDatabase,
    StartTransaction,
    Commit,
    CommitRetaining,
    Rollback,
    RollbackRetaining,
    Allocate,
    Prepare,
    Describe,
    DescribeBind,
    Execute,
    ExecuteImmediate,
    Fetch,
    FreeStatement,
    CreateBlob,
    OpenBlob,
    PutSegment,
    GetSegment,
    CloseBlob,
}

/// Shared handle to one in-process server.
///
/// Clones refer to the same server.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// A server with no databases and the `SYSDBA`/`masterkey` account.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty database reachable as `name` or `host:name`.
    /// An existing database of that name is kept.
    pub fn create_database(&self, name: &str) {
        self.lock()
            .databases
            .entry(name.to_string())
            .or_default();
    }

    /// Add an account; user names are case-insensitive.
    pub fn add_user(&self, user: &str, password: &str) {
        self.lock()
            .users
            .insert(user.to_ascii_uppercase(), password.to_string());
    }

    /// Create a committed table outside any transaction.
    ///
    /// # Errors
    /// Returns [`IscError::Config`] when the database does not exist or already has a
    /// table of that name.
    pub fn create_table(&self, database: &str, table: &str, columns: Vec<ColumnDef>) -> Result<()> {
        let mut state = self.lock();
        let db = state
            .databases
            .get_mut(database)
            .ok_or_else(|| IscError::Config(format!("unknown database {database}")))?;
        let name = table.to_ascii_uppercase();
        if db.tables.contains_key(&name) {
            return Err(IscError::Config(format!("table {name} already exists")));
        }
        db.tables.insert(
            name.clone(),
            Table {
                name,
                columns,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Page size a database was created with, `None` when it does not exist.
    #[must_use]
    pub fn page_size(&self, database: &str) -> Option<u32> {
        self.lock().databases.get(database).map(|db| db.page_size)
    }

    /// Committed rows of a table, `None` when it does not exist.
    #[must_use]
    pub fn table_rows(&self, database: &str, table: &str) -> Option<Vec<Vec<Value>>> {
        self.lock()
            .databases
            .get(database)?
            .tables
            .get(&table.to_ascii_uppercase())
            .map(|t| t.rows.clone())
    }

    /// A new client connected to this server.
    #[must_use]
    pub fn client(&self) -> MemoryIsc {
        MemoryIsc {
            server: self.clone(),
            strings: Vec::new(),
        }
    }

    /// Make the next call of kind `op` fail with GDS code `code` without running it.
    pub fn fail_next(&self, op: Op, code: IscStatus) {
        self.lock().faults.insert(op, code);
    }

    /// Number of calls of kind `op` received so far, failed ones included.
    #[must_use]
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn open_attachments(&self) -> usize {
        self.lock().open_attachments()
    }

    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.lock().open_transactions()
    }

    #[must_use]
    pub fn open_statements(&self) -> usize {
        self.lock().open_statements()
    }

    #[must_use]
    pub fn open_blobs(&self) -> usize {
        self.lock().open_blobs()
    }
}

/// Client side of a [`MemoryServer`].
///
/// String arguments of the last failed call are kept here, the status vector only
/// refers to them by position.
#[derive(Debug)]
pub struct MemoryIsc {
    server: MemoryServer,
    strings: Vec<String>,
}

impl MemoryIsc {
    fn run<F>(&mut self, op: Op, status: &mut StatusVector, f: F) -> IscStatus
    where
        F: FnOnce(&mut ServerState) -> std::result::Result<IscStatus, Fault>,
    {
        self.strings.clear();
        let mut state = self.server.lock();
        *state.calls.entry(op).or_default() += 1;

        let outcome = match state.faults.remove(&op) {
            Some(code) => Err(Fault::new(code)),
            None => f(&mut *state),
        };
        match outcome {
            Ok(ret) => {
                status.clear();
                ret
            }
            Err(fault) => {
                trace!(?op, code = fault.primary(), "memory server call failed");
                fault.write(status, &mut self.strings);
                status.as_slice()[1]
            }
        }
    }
}

impl IscApi for MemoryIsc {
    fn attach_database(
        &mut self,
        status: &mut StatusVector,
        endpoint: &str,
        db: &mut DbHandle,
        dpb: &[u8],
    ) -> IscStatus {
        self.run(Op::Attach, status, |s| s.attach(endpoint, db, dpb))
    }

    fn detach_database(&mut self, status: &mut StatusVector, db: &mut DbHandle) -> IscStatus {
        self.run(Op::Detach, status, |s| s.detach(db))
    }

    fn create_database(
        &mut self,
        status: &mut StatusVector,
        endpoint: &str,
        db: &mut DbHandle,
        dpb: &[u8],
    ) -> IscStatus {
        self.run(Op::CreateDatabase, status, |s| {
            s.create_database(endpoint, db, dpb)
        })
    }

    fn drop_database(&mut self, status: &mut StatusVector, db: &mut DbHandle) -> IscStatus {
        self.run(Op::DropDatabase, status, |s| s.drop_database(db))
    }

    fn start_transaction(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        db: &mut DbHandle,
        tpb: &[u8],
    ) -> IscStatus {
        let db = *db;
        self.run(Op::StartTransaction, status, |s| {
            s.start_transaction(tr, db, tpb)
        })
    }

    fn commit_transaction(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus {
        self.run(Op::Commit, status, |s| s.commit(tr, false))
    }

    fn commit_retaining(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus {
        self.run(Op::CommitRetaining, status, |s| s.commit(tr, true))
    }

    fn rollback_transaction(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
    ) -> IscStatus {
        self.run(Op::Rollback, status, |s| s.rollback(tr, false))
    }

    fn rollback_retaining(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus {
        self.run(Op::RollbackRetaining, status, |s| s.rollback(tr, true))
    }

    fn dsql_allocate_statement(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        stmt: &mut StmtHandle,
    ) -> IscStatus {
        let db = *db;
        self.run(Op::Allocate, status, |s| s.allocate(db, stmt))
    }

    fn dsql_prepare(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        stmt: &mut StmtHandle,
        sql: &[u8],
        _dialect: u16,
        out: &mut Xsqlda,
    ) -> IscStatus {
        let (tr, stmt) = (*tr, *stmt);
        self.run(Op::Prepare, status, |s| s.prepare(tr, stmt, sql, out))
    }

    fn dsql_describe(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        out: &mut Xsqlda,
    ) -> IscStatus {
        let stmt = *stmt;
        self.run(Op::Describe, status, |s| s.describe(stmt, out, false))
    }

    fn dsql_describe_bind(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        input: &mut Xsqlda,
    ) -> IscStatus {
        let stmt = *stmt;
        self.run(Op::DescribeBind, status, |s| s.describe(stmt, input, true))
    }

    fn dsql_execute(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        stmt: &mut StmtHandle,
        input: Option<&Xsqlda>,
    ) -> IscStatus {
        let (tr, stmt) = (*tr, *stmt);
        self.run(Op::Execute, status, |s| s.execute(tr, stmt, input))
    }

    fn dsql_execute_immediate(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        sql: &[u8],
        _dialect: u16,
    ) -> IscStatus {
        let (db, tr) = (*db, *tr);
        self.run(Op::ExecuteImmediate, status, |s| {
            s.execute_immediate(db, tr, sql)
        })
    }

    fn dsql_fetch(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        out: &mut Xsqlda,
    ) -> IscStatus {
        let stmt = *stmt;
        self.run(Op::Fetch, status, |s| s.fetch(stmt, out))
    }

    fn dsql_free_statement(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        option: u16,
    ) -> IscStatus {
        self.run(Op::FreeStatement, status, |s| s.free(stmt, option))
    }

    fn create_blob(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        blob: &mut BlobHandle,
        id: &mut QuadId,
    ) -> IscStatus {
        let (db, tr) = (*db, *tr);
        self.run(Op::CreateBlob, status, |s| s.create_blob(db, tr, blob, id))
    }

    fn open_blob(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        blob: &mut BlobHandle,
        id: &QuadId,
    ) -> IscStatus {
        let (db, tr) = (*db, *tr);
        self.run(Op::OpenBlob, status, |s| s.open_blob(db, tr, blob, id))
    }

    fn put_segment(
        &mut self,
        status: &mut StatusVector,
        blob: &mut BlobHandle,
        segment: &[u8],
    ) -> IscStatus {
        let blob = *blob;
        self.run(Op::PutSegment, status, |s| s.put_segment(blob, segment))
    }

    fn get_segment(
        &mut self,
        status: &mut StatusVector,
        blob: &mut BlobHandle,
        buffer: &mut [u8],
        actual: &mut usize,
    ) -> IscStatus {
        let blob = *blob;
        self.run(Op::GetSegment, status, |s| {
            s.get_segment(blob, buffer, actual)
        })
    }

    fn close_blob(&mut self, status: &mut StatusVector, blob: &mut BlobHandle) -> IscStatus {
        self.run(Op::CloseBlob, status, |s| s.close_blob(blob))
    }

    fn sqlcode(&self, status: &StatusVector) -> i32 {
        messages::sqlcode(status)
    }

    fn interpret(&self, status: &StatusVector, cursor: &mut usize) -> Option<String> {
        messages::interpret(status, cursor, &self.strings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibase::{ISC_ARG_GDS, ISC_BAD_DB_HANDLE, ISC_DPB_VERSION1, ISC_SEGMENT};

    #[test]
    fn injected_fault_fails_once() {
        let server = MemoryServer::new();
        let mut client = server.client();
        server.fail_next(Op::Detach, ISC_BAD_DB_HANDLE);

        let mut status = StatusVector::new();
        let mut db = 7;
        let ret = client.detach_database(&mut status, &mut db);
        assert_eq!(ret, ISC_BAD_DB_HANDLE);
        assert_eq!(status.as_slice()[..2], [ISC_ARG_GDS, ISC_BAD_DB_HANDLE]);
        assert_eq!(client.sqlcode(&status), -901);

        // the real call also rejects the unknown handle
        let ret = client.detach_database(&mut status, &mut db);
        assert_eq!(ret, ISC_BAD_DB_HANDLE);
        assert_eq!(server.calls(Op::Detach), 2);
    }

    #[test]
    fn unknown_database_names_the_file() {
        let server = MemoryServer::new();
        let mut client = server.client();
        let mut dpb = vec![ISC_DPB_VERSION1, crate::ibase::ISC_DPB_USER_NAME, 6];
        dpb.extend_from_slice(b"SYSDBA");
        dpb.extend([crate::ibase::ISC_DPB_PASSWORD, 9]);
        dpb.extend_from_slice(b"masterkey");

        let mut status = StatusVector::new();
        let mut db = 0;
        client.attach_database(&mut status, "localhost:missing.fdb", &mut db, &dpb);
        let mut cursor = 0;
        assert_eq!(
            client.interpret(&status, &mut cursor).as_deref(),
            Some("I/O error during \"open\" operation for file \"missing.fdb\"")
        );
        assert_eq!(client.sqlcode(&status), -902);
    }

    #[test]
    fn partial_segments_report_their_code() {
        let server = MemoryServer::new();
        server.create_database("employee");
        let mut client = server.client();
        let mut dpb = vec![ISC_DPB_VERSION1, crate::ibase::ISC_DPB_USER_NAME, 6];
        dpb.extend_from_slice(b"SYSDBA");
        dpb.extend([crate::ibase::ISC_DPB_PASSWORD, 9]);
        dpb.extend_from_slice(b"masterkey");

        let mut status = StatusVector::new();
        let (mut db, mut tr, mut blob, mut id) = (0, 0, 0, [0u8; 8]);
        client.attach_database(&mut status, "employee", &mut db, &dpb);
        client.start_transaction(&mut status, &mut tr, &mut db, &[]);
        client.create_blob(&mut status, &mut db, &mut tr, &mut blob, &mut id);
        client.put_segment(&mut status, &mut blob, b"0123456789");
        assert_eq!(client.close_blob(&mut status, &mut blob), 0);

        client.open_blob(&mut status, &mut db, &mut tr, &mut blob, &id);
        let (mut buffer, mut actual) = ([0u8; 4], 0);
        let ret = client.get_segment(&mut status, &mut blob, &mut buffer, &mut actual);
        assert_eq!((ret, actual), (ISC_SEGMENT, 4));
        assert_eq!(client.sqlcode(&status), 101);
        assert_eq!(server.calls(Op::GetSegment), 1);
        assert_eq!(server.open_blobs(), 1);
    }

    #[test]
    fn tables_are_created_upper_case() {
        let server = MemoryServer::new();
        assert!(server.create_table("nope", "t", vec![]).is_err());
        server.create_database("employee");
        server
            .create_table("employee", "cross_rate", vec![ColumnDef::float("conv_rate")])
            .unwrap();
        assert_eq!(server.table_rows("employee", "CROSS_RATE"), Some(Vec::new()));
        assert!(matches!(
            server.create_table("employee", "CROSS_RATE", vec![]),
            Err(IscError::Config(_))
        ));
    }
}
