use tracing::{debug, trace, warn};

use crate::charset::Charset;
use crate::config::{ConnectionOptions, Dialect, TransactionOptions};
use crate::error::{IscError, Result};
use crate::ibase::{DbHandle, IscApi, IscStatus, StatusVector};
use crate::params::SQLCODE_TRUNCATION;
use crate::status::{Diagnostics, HandleKind};
use crate::transaction::Transaction;

/// An attachment to one database.
///
/// Owns the client API it was opened with. Transactions borrow the connection mutably,
/// so at most one transaction is active per connection and the connection cannot be
/// closed while one is alive.
///
/// ```rust
/// use isc_binding::memory::MemoryServer;
/// use isc_binding::prelude::*;
///
/// let server = MemoryServer::new();
/// server.create_database("employee");
/// let opts = ConnectionOptions::builder("localhost:employee")
///     .user("SYSDBA")
///     .password("masterkey")
///     .finish();
/// let mut conn = Connection::open(server.client(), &opts)?;
/// conn.close()?;
/// assert!(conn.begin().is_err());
/// # Ok::<(), IscError>(())
/// ```
pub struct Connection<A: IscApi> {
    api: A,
    handle: Option<DbHandle>,
    options: ConnectionOptions,
    charset: Charset,
}

impl<A: IscApi> Connection<A> {
    /// Attach to the database named by `options.endpoint`.
    ///
    /// # Arguments
    /// * `api` - the client library (or in-process server) the connection will own.
    /// * `options` - endpoint, credentials and charset; copied into the connection.
    ///
    /// # Returns
    /// An attached connection. Text crossing it is encoded in `options.charset`.
    ///
    /// # Errors
    /// Returns [`IscError::Config`] when the credentials cannot be encoded or the charset
    /// is unsupported, and [`IscError::Attach`] when the server refuses the attachment.
    pub fn open(api: A, options: &ConnectionOptions) -> Result<Self> {
        let dpb = options.build_dpb()?;
        let mut conn = Self::detached(api, options)?;

        let mut handle: DbHandle = 0;
        let endpoint = options.endpoint.as_str();
        conn.call("attach_database", |api, status| {
            api.attach_database(status, endpoint, &mut handle, &dpb)
        })
        .map_err(IscError::Attach)?;

        debug!(endpoint, user = %options.user, charset = %conn.charset, "attached");
        conn.handle = Some(handle);
        Ok(conn)
    }

    /// Create the database named by `options.endpoint` and attach to it.
    ///
    /// # Arguments
    /// * `api` - the client library the new connection will own.
    /// * `options` - as for [`Connection::open`]; `page_size` is sent when set.
    ///
    /// # Returns
    /// A connection attached to the new, empty database.
    ///
    /// # Errors
    /// Returns [`IscError::Config`] as [`Connection::open`] and
    /// [`IscError::CreateDatabase`] when the server refuses, for example because the
    /// database already exists.
    pub fn create_database(api: A, options: &ConnectionOptions) -> Result<Self> {
        let dpb = options.build_create_dpb()?;
        let mut conn = Self::detached(api, options)?;

        let mut handle: DbHandle = 0;
        let endpoint = options.endpoint.as_str();
        conn.call("create_database", |api, status| {
            api.create_database(status, endpoint, &mut handle, &dpb)
        })
        .map_err(IscError::CreateDatabase)?;

        debug!(endpoint, page_size = ?options.page_size, "database created");
        conn.handle = Some(handle);
        Ok(conn)
    }

    /// Drop the attached database and release the attachment.
    ///
    /// On failure the connection stays attached.
    ///
    /// # Errors
    /// Returns [`IscError::DropDatabase`] when the connection is closed or the server
    /// refuses (open transactions, other attachments).
    pub fn drop_database(&mut self) -> Result<()> {
        let mut handle = self.db_handle().map_err(IscError::DropDatabase)?;
        self.call("drop_database", |api, status| {
            api.drop_database(status, &mut handle)
        })
        .map_err(IscError::DropDatabase)?;

        self.handle = None;
        debug!(endpoint = %self.options.endpoint, "database dropped");
        Ok(())
    }

    fn detached(api: A, options: &ConnectionOptions) -> Result<Self> {
        Ok(Self {
            api,
            handle: None,
            charset: options.character_set()?,
            options: options.clone(),
        })
    }

    /// Parse a `firebird://` connection string and attach.
    ///
    /// # Errors
    /// Returns [`IscError::Config`] for a malformed string, otherwise as [`Connection::open`].
    pub fn open_str(api: A, conn_string: &str) -> Result<Self> {
        let options = ConnectionOptions::from_conn_string(conn_string)?;
        Self::open(api, &options)
    }

    /// Detach from the database.
    ///
    /// The handle is consumed whether or not the server reports an error; every later
    /// operation fails with an invalid-handle error without reaching the client API.
    ///
    /// # Errors
    /// Returns [`IscError::Detach`] when the server reports a failure or the connection
    /// was already closed.
    pub fn close(&mut self) -> Result<()> {
        let mut handle = self
            .handle
            .take()
            .ok_or_else(|| IscError::Detach(Diagnostics::invalid_handle(HandleKind::Database)))?;

        self.call("detach_database", |api, status| {
            api.detach_database(status, &mut handle)
        })
        .map_err(IscError::Detach)?;

        debug!(endpoint = %self.options.endpoint, "detached");
        Ok(())
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.options.endpoint
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.options.dialect
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    #[must_use]
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Start a read-committed, read-write transaction that waits on lock conflicts.
    ///
    /// # Errors
    /// Returns [`IscError::Begin`] when the connection is closed or the server refuses.
    pub fn begin(&mut self) -> Result<Transaction<'_, A>> {
        self.begin_with(TransactionOptions::default())
    }

    /// Start a transaction with explicit options.
    ///
    /// # Errors
    /// Returns [`IscError::Begin`] when the connection is closed or the server refuses.
    pub fn begin_with(&mut self, options: TransactionOptions) -> Result<Transaction<'_, A>> {
        Transaction::start(self, options)
    }

    /// Run one statement in its own transaction, committing on success.
    ///
    /// # Errors
    /// Returns the error of whichever step failed; the transaction is rolled back when
    /// the statement fails.
    pub fn execute_immediate(&mut self, sql: &str) -> Result<()> {
        let mut tr = self.begin()?;
        tr.execute_immediate(sql)?;
        tr.commit()
    }

    /// SQL text in the connection charset.
    pub(crate) fn encode_sql(&self, sql: &str) -> std::result::Result<Vec<u8>, Diagnostics> {
        self.charset.encode(sql).map_err(|e| {
            Diagnostics::client(
                SQLCODE_TRUNCATION,
                format!("Cannot transliterate SQL text to {}: {e}", self.charset),
            )
        })
    }

    /// Native handle, or the invalid-handle diagnostics once closed.
    pub(crate) fn db_handle(&self) -> std::result::Result<DbHandle, Diagnostics> {
        self.handle
            .ok_or_else(|| Diagnostics::invalid_handle(HandleKind::Database))
    }

    /// Run one native call against a fresh status vector.
    ///
    /// Returns the status word when the vector reports no error, so callers can tell
    /// end-of-set apart from success.
    pub(crate) fn call<F>(
        &mut self,
        name: &'static str,
        f: F,
    ) -> std::result::Result<IscStatus, Diagnostics>
    where
        F: FnOnce(&mut A, &mut StatusVector) -> IscStatus,
    {
        self.call_allowing(name, &[], f)
    }

    /// As [`Connection::call`], treating the GDS codes in `allowed` as informational.
    ///
    /// Used by segment reads, where a partial segment or the end of the blob is reported
    /// through the status vector.
    pub(crate) fn call_allowing<F>(
        &mut self,
        name: &'static str,
        allowed: &[IscStatus],
        f: F,
    ) -> std::result::Result<IscStatus, Diagnostics>
    where
        F: FnOnce(&mut A, &mut StatusVector) -> IscStatus,
    {
        let mut status = StatusVector::new();
        let ret = f(&mut self.api, &mut status);
        trace!(call = name, status = ret, "native call");
        match status.gds_code() {
            Some(code) if allowed.contains(&code) => Ok(code),
            Some(_) => Err(Diagnostics::from_status(&self.api, &status)),
            None => Ok(ret),
        }
    }
}

impl<A: IscApi> Drop for Connection<A> {
    fn drop(&mut self) {
        if self.handle.is_some()
            && let Err(err) = self.close()
        {
            warn!(endpoint = %self.options.endpoint, error = %err, "detach on drop failed");
        }
    }
}

impl<A: IscApi> std::fmt::Debug for Connection<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.options.endpoint)
            .field("attached", &self.handle.is_some())
            .field("charset", &self.charset)
            .finish_non_exhaustive()
    }
}
