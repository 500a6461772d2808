use tracing::{debug, warn};

use crate::config::TransactionOptions;
use crate::connection::Connection;
use crate::error::{IscError, Result};
use crate::ibase::{IscApi, TrHandle};
use crate::results::ResultSet;
use crate::statement::Statement;
use crate::status::{Diagnostics, HandleKind};
use crate::types::Value;

/// A transaction on one connection.
///
/// `commit` and `rollback` consume the value. A transaction that goes out of scope while
/// still active is rolled back.
pub struct Transaction<'c, A: IscApi> {
    conn: &'c mut Connection<A>,
    handle: TrHandle,
    needs_rollback: bool,
}

impl<'c, A: IscApi> Transaction<'c, A> {
    pub(crate) fn start(conn: &'c mut Connection<A>, options: TransactionOptions) -> Result<Self> {
        let mut db = conn.db_handle().map_err(IscError::Begin)?;
        let tpb = options.build_tpb();
        let mut handle: TrHandle = 0;
        conn.call("start_transaction", |api, status| {
            api.start_transaction(status, &mut handle, &mut db, &tpb)
        })
        .map_err(IscError::Begin)?;

        debug!(?options, "transaction started");
        Ok(Self {
            conn,
            handle,
            needs_rollback: true,
        })
    }

    /// Make the changes permanent and end the transaction.
    ///
    /// # Errors
    /// Returns [`IscError::Commit`] when the server refuses; the transaction then stays
    /// active and is rolled back when dropped.
    pub fn commit(mut self) -> Result<()> {
        let mut tr = self.handle;
        self.conn
            .call("commit_transaction", |api, status| {
                api.commit_transaction(status, &mut tr)
            })
            .map_err(IscError::Commit)?;
        self.needs_rollback = false;
        debug!("transaction committed");
        Ok(())
    }

    /// Discard the changes and end the transaction.
    ///
    /// # Errors
    /// Returns [`IscError::Rollback`] when the server refuses.
    pub fn rollback(mut self) -> Result<()> {
        self.rollback_inner().map_err(IscError::Rollback)
    }

    /// Commit the work done so far and keep the transaction open.
    ///
    /// # Errors
    /// Returns [`IscError::Commit`] when the server refuses.
    pub fn commit_retaining(&mut self) -> Result<()> {
        let mut tr = self.handle;
        self.conn
            .call("commit_retaining", |api, status| {
                api.commit_retaining(status, &mut tr)
            })
            .map_err(IscError::Commit)?;
        debug!("transaction committed (retaining)");
        Ok(())
    }

    /// Undo the work done so far and keep the transaction open.
    ///
    /// # Errors
    /// Returns [`IscError::Rollback`] when the server refuses.
    pub fn rollback_retaining(&mut self) -> Result<()> {
        let mut tr = self.handle;
        self.conn
            .call("rollback_retaining", |api, status| {
                api.rollback_retaining(status, &mut tr)
            })
            .map_err(IscError::Rollback)?;
        debug!("transaction rolled back (retaining)");
        Ok(())
    }

    /// Run a statement that takes no parameters and returns no rows.
    ///
    /// The text is encoded in the connection charset.
    ///
    /// # Errors
    /// Returns [`IscError::Execute`] with the server diagnostics, or with code -802 when
    /// the text cannot be encoded.
    pub fn execute_immediate(&mut self, sql: &str) -> Result<()> {
        let mut db = self.conn.db_handle().map_err(IscError::Execute)?;
        let mut tr = self.handle;
        let dialect = self.conn.dialect().as_u16();
        let text = self.conn.encode_sql(sql).map_err(IscError::Execute)?;
        self.conn
            .call("dsql_execute_immediate", |api, status| {
                api.dsql_execute_immediate(status, &mut db, &mut tr, &text, dialect)
            })
            .map_err(IscError::Execute)?;
        Ok(())
    }

    /// Allocate a statement and compile `sql`.
    ///
    /// # Errors
    /// Returns [`IscError::Allocate`] or [`IscError::Prepare`].
    pub fn prepare(&mut self, sql: &str) -> Result<Statement<'_, 'c, A>> {
        let mut stmt = Statement::allocate(self)?;
        stmt.prepare(sql)?;
        Ok(stmt)
    }

    /// Prepare, bind and execute a statement that returns no rows.
    ///
    /// # Errors
    /// Returns the error of the first step that fails.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        let mut stmt = self.prepare(sql)?;
        stmt.describe()?;
        stmt.describe_bind()?;
        stmt.bind(params)?;
        stmt.execute()?;
        stmt.close()
    }

    /// Prepare, bind and execute a query and collect every row.
    ///
    /// # Arguments
    /// * `sql` - a single SELECT, with `?` markers for parameters.
    /// * `params` - one value per marker, in order.
    ///
    /// # Returns
    /// Every row with its column descriptions. Blob columns carry their contents.
    ///
    /// # Errors
    /// Returns the error of the first step that fails.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let mut stmt = self.prepare(sql)?;
        stmt.describe()?;
        stmt.describe_bind()?;
        stmt.bind(params)?;
        stmt.execute()?;
        let rows = stmt.fetch_all()?;
        stmt.close()?;
        Ok(rows)
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection<A> {
        self.conn
    }

    pub(crate) fn handle(&self) -> TrHandle {
        self.handle
    }

    fn rollback_inner(&mut self) -> std::result::Result<(), Diagnostics> {
        if !self.needs_rollback {
            return Err(Diagnostics::invalid_handle(HandleKind::Transaction));
        }
        let mut tr = self.handle;
        self.conn.call("rollback_transaction", |api, status| {
            api.rollback_transaction(status, &mut tr)
        })?;
        self.needs_rollback = false;
        debug!("transaction rolled back");
        Ok(())
    }
}

impl<A: IscApi> Drop for Transaction<'_, A> {
    fn drop(&mut self) {
        if self.needs_rollback
            && let Err(diag) = self.rollback_inner()
        {
            warn!(error = %diag, "rollback on drop failed");
        }
    }
}
