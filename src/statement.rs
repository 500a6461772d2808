use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::blob::BlobId;
use crate::decode::decode_row;
use crate::error::{IscError, Result};
use crate::ibase::{
    BLOB_SUB_TYPE_TEXT, DSQL_CLOSE, DSQL_DROP, FETCH_END_OF_SET, IscApi, SQL_BLOB, StmtHandle,
    Xsqlda,
};
use crate::params::{SQLCODE_TRUNCATION, bind_all};
use crate::results::{ResultSet, Row, build_index};
use crate::status::{Diagnostics, HandleKind, SQLCODE_SQLDA};
use crate::transaction::Transaction;
use crate::types::{ColumnInfo, SqlType, Value};

/// Lifecycle position of a [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Allocated,
    Prepared,
    Described,
    Bound,
    Executed,
    Closed,
}

impl fmt::Display for StatementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementState::Allocated => "allocated",
            StatementState::Prepared => "prepared",
            StatementState::Described => "described",
            StatementState::Bound => "bound",
            StatementState::Executed => "executed",
            StatementState::Closed => "closed",
        })
    }
}

/// A prepared statement inside one transaction.
///
/// Follows `allocate -> prepare -> describe -> [describe_bind -> bind] -> execute ->
/// fetch* -> close`. A call made out of order fails with [`IscError::InvalidState`] and
/// a failed native call leaves the state untouched. Dropping a statement that was not
/// closed releases its native handle.
pub struct Statement<'t, 'c, A: IscApi> {
    tr: &'t mut Transaction<'c, A>,
    handle: StmtHandle,
    state: StatementState,
    sql: String,
    output: Xsqlda,
    input: Xsqlda,
    input_described: bool,
    bound: Option<Xsqlda>,
    columns: Vec<ColumnInfo>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
    row: Option<Row>,
    cursor_open: bool,
    exhausted: bool,
}

impl<'t, 'c, A: IscApi> Statement<'t, 'c, A> {
    /// Allocate a statement handle on the transaction's attachment.
    ///
    /// # Errors
    /// Returns [`IscError::Allocate`] when the server refuses.
    pub fn allocate(tr: &'t mut Transaction<'c, A>) -> Result<Self> {
        let conn = tr.conn_mut();
        let mut db = conn.db_handle().map_err(IscError::Allocate)?;
        let mut handle: StmtHandle = 0;
        conn.call("dsql_allocate_statement", |api, status| {
            api.dsql_allocate_statement(status, &mut db, &mut handle)
        })
        .map_err(IscError::Allocate)?;

        Ok(Self {
            tr,
            handle,
            state: StatementState::Allocated,
            sql: String::new(),
            output: Xsqlda::default(),
            input: Xsqlda::default(),
            input_described: false,
            bound: None,
            columns: Vec::new(),
            column_names: Arc::default(),
            column_index: Arc::default(),
            row: None,
            cursor_open: false,
            exhausted: false,
        })
    }

    /// Compile `sql`, describing its output columns.
    ///
    /// When the statement has more columns than the pre-allocated slots the descriptor is
    /// grown to the reported size and described again.
    ///
    /// # Errors
    /// Returns [`IscError::Prepare`] with the server diagnostics, or
    /// [`IscError::InvalidState`] unless the statement is freshly allocated.
    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        self.expect_state("prepare", &[StatementState::Allocated])?;

        let mut output = Xsqlda::new(self.tr.conn_mut().options().initial_columns);
        let mut tr = self.tr.handle();
        let mut handle = self.handle;
        let dialect = self.tr.conn_mut().dialect().as_u16();
        let text = self.tr.conn_mut().encode_sql(sql).map_err(IscError::Prepare)?;
        self.tr
            .conn_mut()
            .call("dsql_prepare", |api, status| {
                api.dsql_prepare(status, &mut tr, &mut handle, &text, dialect, &mut output)
            })
            .map_err(IscError::Prepare)?;

        if output.needs_resize() {
            output = Xsqlda::new(output.sqld);
            self.tr
                .conn_mut()
                .call("dsql_describe", |api, status| {
                    api.dsql_describe(status, &mut handle, &mut output)
                })
                .map_err(IscError::Prepare)?;
        }

        debug!(sql, columns = output.sqld, "statement prepared");
        self.output = output;
        self.sql = sql.to_string();
        self.state = StatementState::Prepared;
        Ok(())
    }

    /// Describe the output columns and allocate a buffer for each.
    ///
    /// # Errors
    /// Returns [`IscError::Describe`] with the server diagnostics, or
    /// [`IscError::InvalidState`] unless the statement is prepared.
    pub fn describe(&mut self) -> Result<()> {
        self.expect_state("describe", &[StatementState::Prepared])?;

        let mut output = Xsqlda::new(self.output.sqld.max(self.output.sqln));
        self.describe_into(&mut output, false)?;
        for var in output.vars_mut() {
            var.allocate();
        }

        self.columns = output
            .vars()
            .iter()
            .map(|var| ColumnInfo {
                name: var.name().to_string(),
                relation: var.relname.clone(),
                sql_type: SqlType::from_tag(var.sqltype),
                sub_type: if var.base_type() == SQL_BLOB {
                    var.sqlsubtype
                } else {
                    0
                },
                length: var.sqllen,
                scale: var.sqlscale,
                nullable: var.is_nullable(),
            })
            .collect();
        let names: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        self.column_index = Arc::new(build_index(&names));
        self.column_names = Arc::new(names);
        self.output = output;
        self.state = StatementState::Described;
        Ok(())
    }

    /// Describe the input parameters.
    ///
    /// # Errors
    /// Returns [`IscError::Describe`] with the server diagnostics, or
    /// [`IscError::InvalidState`] unless the statement is prepared or described.
    pub fn describe_bind(&mut self) -> Result<()> {
        self.expect_state(
            "describe parameters of",
            &[StatementState::Prepared, StatementState::Described],
        )?;

        let mut input = Xsqlda::new(self.tr.conn_mut().options().initial_columns);
        self.describe_into(&mut input, true)?;
        trace!(params = input.sqld, "parameters described");
        self.input = input;
        self.input_described = true;
        Ok(())
    }

    /// Encode `params` into the input descriptor.
    ///
    /// # Arguments
    /// * `params` - one value per declared parameter, in order. Text or binary values
    ///   bound to a BLOB parameter are written as a new blob first and the slot carries
    ///   its id.
    ///
    /// A bound statement may be bound again before each execute.
    ///
    /// # Errors
    /// Returns [`IscError::Bind`] on a count mismatch, an unencodable value or when the
    /// parameters were never described, [`IscError::Blob`] when writing a blob fails,
    /// and [`IscError::InvalidState`] before describe.
    pub fn bind(&mut self, params: &[Value]) -> Result<()> {
        self.expect_state(
            "bind",
            &[
                StatementState::Described,
                StatementState::Bound,
                StatementState::Executed,
            ],
        )?;
        if !self.input_described {
            return Err(IscError::Bind(Diagnostics::client(
                SQLCODE_SQLDA,
                "parameters must be described before binding",
            )));
        }

        let charset = self.tr.conn_mut().charset();
        let mut values = params.to_vec();
        if values.len() == self.input.len() {
            for (var, value) in self.input.vars().iter().zip(values.iter_mut()) {
                if var.base_type() != SQL_BLOB {
                    continue;
                }
                let contents = match value {
                    Value::Text(text) => charset.encode(text).map_err(|e| {
                        IscError::Bind(Diagnostics::client(
                            SQLCODE_TRUNCATION,
                            format!("Cannot transliterate character to {charset}: {e}"),
                        ))
                    })?,
                    Value::Binary(bytes) => std::mem::take(bytes),
                    _ => continue,
                };
                let id = self.tr.write_blob(&contents)?;
                *value = Value::Raw {
                    sql_type: SQL_BLOB,
                    bytes: id.0.to_vec(),
                };
            }
        }

        self.bound = Some(bind_all(&self.input, &values, &charset)?);
        self.state = StatementState::Bound;
        Ok(())
    }

    /// Run the statement.
    ///
    /// An executed statement can run again; its open cursor is closed first.
    ///
    /// # Errors
    /// Returns [`IscError::Execute`] with the server diagnostics, [`IscError::Close`] when
    /// the previous cursor cannot be closed, or [`IscError::InvalidState`] when declared
    /// parameters were never bound.
    pub fn execute(&mut self) -> Result<()> {
        self.expect_state(
            "execute",
            &[
                StatementState::Described,
                StatementState::Bound,
                StatementState::Executed,
            ],
        )?;
        if self.bound.is_none() && self.input_described && !self.input.is_empty() {
            return Err(IscError::InvalidState {
                operation: "execute",
                state: self.state,
            });
        }

        if self.cursor_open {
            self.free(DSQL_CLOSE).map_err(IscError::Close)?;
            self.cursor_open = false;
        }

        let mut tr = self.tr.handle();
        let mut handle = self.handle;
        let input = self.bound.as_ref().filter(|da| !da.is_empty());
        self.tr
            .conn_mut()
            .call("dsql_execute", |api, status| {
                api.dsql_execute(status, &mut tr, &mut handle, input)
            })
            .map_err(IscError::Execute)?;

        self.cursor_open = !self.output.is_empty();
        self.exhausted = false;
        self.state = StatementState::Executed;
        Ok(())
    }

    /// Fetch the next row.
    ///
    /// Returns `None` at end of set, and again on every later call without asking the
    /// server. The returned row is overwritten by the next fetch. Blob columns are read
    /// in full: text blobs become [`Value::Text`], others [`Value::Binary`].
    ///
    /// # Errors
    /// Returns [`IscError::Fetch`] with the server diagnostics, [`IscError::Decode`] for an
    /// undecodable column, [`IscError::Blob`] when a blob cannot be read,
    /// [`IscError::NoResultSet`] when the statement returns no rows and
    /// [`IscError::InvalidState`] before execute.
    pub fn fetch(&mut self) -> Result<Option<&Row>> {
        self.expect_state("fetch", &[StatementState::Executed])?;
        if self.output.is_empty() {
            return Err(IscError::NoResultSet);
        }
        if self.exhausted {
            return Ok(None);
        }

        let mut handle = self.handle;
        let output = &mut self.output;
        let ret = self
            .tr
            .conn_mut()
            .call("dsql_fetch", |api, status| {
                api.dsql_fetch(status, &mut handle, output)
            })
            .map_err(IscError::Fetch)?;

        if ret == FETCH_END_OF_SET {
            trace!("end of result set");
            self.exhausted = true;
            return Ok(None);
        }

        let charset = self.tr.conn_mut().charset();
        let row = self.row.get_or_insert_with(|| {
            Row::with_index(
                Arc::clone(&self.column_names),
                Arc::clone(&self.column_index),
                Vec::with_capacity(self.columns.len()),
            )
        });
        decode_row(self.output.vars(), &mut row.values, &charset)?;

        for (var, value) in self.output.vars().iter().zip(row.values.iter_mut()) {
            if var.base_type() != SQL_BLOB {
                continue;
            }
            if let Value::Raw { bytes, .. } = value
                && let Some(id) = BlobId::from_slot(bytes)
            {
                let contents = self.tr.read_blob(id)?;
                *value = if var.sqlsubtype == BLOB_SUB_TYPE_TEXT {
                    charset.decode(&contents).map(Value::Text).map_err(|e| {
                        IscError::Decode(format!("column {} ({charset}): {e}", var.name()))
                    })?
                } else {
                    Value::Binary(contents)
                };
            }
        }
        Ok(Some(&*row))
    }

    /// Fetch every remaining row.
    ///
    /// # Errors
    /// As [`Statement::fetch`].
    pub fn fetch_all(&mut self) -> Result<ResultSet> {
        let mut rows = ResultSet::new(self.columns.clone());
        while let Some(row) = self.fetch()? {
            rows.add_row_values(row.values.clone());
        }
        Ok(rows)
    }

    /// Release the statement.
    ///
    /// # Errors
    /// Returns [`IscError::Close`] when the server refuses or the statement was already
    /// closed.
    pub fn close(&mut self) -> Result<()> {
        if self.state == StatementState::Closed {
            return Err(IscError::Close(Diagnostics::invalid_handle(
                HandleKind::Statement,
            )));
        }
        self.free(DSQL_DROP).map_err(IscError::Close)?;
        self.state = StatementState::Closed;
        self.cursor_open = false;
        self.handle = 0;
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> StatementState {
        self.state
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Output columns, known once described.
    #[must_use]
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.output.len()
    }

    /// Declared parameters, zero until described.
    #[must_use]
    pub fn param_count(&self) -> usize {
        if self.input_described {
            self.input.len()
        } else {
            0
        }
    }

    fn expect_state(&self, operation: &'static str, allowed: &[StatementState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(IscError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Describe into `da`, growing it once if the server reports more slots.
    fn describe_into(&mut self, da: &mut Xsqlda, input: bool) -> Result<()> {
        let mut handle = self.handle;
        let name = if input {
            "dsql_describe_bind"
        } else {
            "dsql_describe"
        };
        let mut run = |conn: &mut crate::connection::Connection<A>, da: &mut Xsqlda| {
            conn.call(name, |api, status| {
                if input {
                    api.dsql_describe_bind(status, &mut handle, da)
                } else {
                    api.dsql_describe(status, &mut handle, da)
                }
            })
            .map_err(IscError::Describe)
        };

        run(self.tr.conn_mut(), da)?;
        if da.needs_resize() {
            *da = Xsqlda::new(da.sqld);
            run(self.tr.conn_mut(), da)?;
        }
        Ok(())
    }

    fn free(&mut self, option: u16) -> std::result::Result<(), Diagnostics> {
        let mut handle = self.handle;
        self.tr
            .conn_mut()
            .call("dsql_free_statement", |api, status| {
                api.dsql_free_statement(status, &mut handle, option)
            })
            .map(|_| ())
    }
}

impl<A: IscApi> Drop for Statement<'_, '_, A> {
    fn drop(&mut self) {
        if self.state != StatementState::Closed
            && let Err(diag) = self.free(DSQL_DROP)
        {
            warn!(sql = %self.sql, error = %diag, "statement release on drop failed");
        }
    }
}
