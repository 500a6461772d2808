//! Server side of the memory backend: handle tables, transactions and statement plans.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::Op;
use super::messages::Fault;
use super::parser::{CmpOp, Command, Condition, Operand, Test, parse};
use super::store::{ColumnDef, DEFAULT_PAGE_SIZE, Database, Table, compare};
use crate::charset::Charset;
use crate::date_time::{encode_date, encode_time, encode_timestamp};
use crate::decode::decode_var;
use crate::ibase::{
    BlobHandle, DSQL_CLOSE, DSQL_DROP, DbHandle, FETCH_END_OF_SET, ISC_ARITH_EXCEPT,
    ISC_BAD_DPB_CONTENT, ISC_BAD_SEGSTR_ID, ISC_DPB_LC_CTYPE, ISC_DPB_PAGE_SIZE,
    ISC_DPB_PASSWORD, ISC_DPB_USER_NAME, ISC_DPB_VERSION1, ISC_DSQL_CURSOR_ERR,
    ISC_DSQL_CURSOR_OPEN_ERR, ISC_DSQL_ERROR, ISC_DSQL_FIELD_ERR, ISC_DSQL_RELATION_ERR,
    ISC_IO_ERROR, ISC_LOGIN, ISC_NO_META_UPDATE, ISC_OBJ_IN_USE, ISC_OPEN_TRANS, ISC_RANDOM,
    ISC_SEGMENT, ISC_SEGSTR_EOF, ISC_TOKEN_ERR, ISC_TPB_VERSION3, ISC_TRANSLITERATION_FAILED,
    ISC_UNPREPARED_STMT, IscStatus, MAX_TEXT_LENGTH, QuadId, StmtHandle, TrHandle, Xsqlda,
    Xsqlvar,
};
use crate::types::{SqlType, Value};

type Outcome = Result<IscStatus, Fault>;

#[derive(Debug, Clone)]
struct Output {
    column: ColumnDef,
    label: String,
    relation: String,
    index: usize,
}

/// A compiled statement.
#[derive(Debug, Clone)]
struct Plan {
    command: Command,
    params: Vec<ColumnDef>,
    outputs: Vec<Output>,
}

#[derive(Debug)]
struct Txn {
    db: DbHandle,
    /// Private copy of the database, published on commit
    working: Database,
}

#[derive(Debug)]
struct Cursor {
    tr: TrHandle,
    rows: Vec<Vec<Value>>,
    next: usize,
}

#[derive(Debug)]
enum BlobMode {
    /// Contents collected until close
    Writing(Vec<u8>),
    Reading { data: Vec<u8>, pos: usize },
}

#[derive(Debug)]
struct OpenBlob {
    tr: TrHandle,
    id: QuadId,
    mode: BlobMode,
}

#[derive(Debug)]
struct Attachment {
    database: String,
    charset: Charset,
}

#[derive(Debug)]
struct Stmt {
    db: DbHandle,
    plan: Option<Plan>,
    cursor: Option<Cursor>,
}

/// Everything the memory server knows, behind the server mutex.
#[derive(Debug, Default)]
pub(super) struct ServerState {
    pub databases: HashMap<String, Database>,
    pub users: HashMap<String, String>,
    pub faults: HashMap<Op, IscStatus>,
    pub calls: HashMap<Op, usize>,
    last_handle: u32,
    attachments: HashMap<DbHandle, Attachment>,
    transactions: HashMap<TrHandle, Txn>,
    statements: HashMap<StmtHandle, Stmt>,
    blobs: HashMap<BlobHandle, OpenBlob>,
}

impl ServerState {
    pub(super) fn new() -> Self {
        let mut state = Self::default();
        state
            .users
            .insert("SYSDBA".to_string(), "masterkey".to_string());
        state
    }

    pub(super) fn open_attachments(&self) -> usize {
        self.attachments.len()
    }

    pub(super) fn open_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub(super) fn open_statements(&self) -> usize {
        self.statements.len()
    }

    pub(super) fn open_blobs(&self) -> usize {
        self.blobs.len()
    }

    fn next_handle(&mut self) -> u32 {
        self.last_handle += 1;
        self.last_handle
    }

    /// Check the credentials of a parameter block and pick its character set.
    fn authorize(&self, items: &HashMap<u8, Vec<u8>>) -> Result<Charset, Fault> {
        let text = |tag| {
            items
                .get(&tag)
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default()
        };
        let user = text(ISC_DPB_USER_NAME).to_ascii_uppercase();
        let password = text(ISC_DPB_PASSWORD);
        let authorized = self.users.get(&user).is_some_and(|p| *p == password);
        if !authorized {
            return Err(Fault::new(ISC_LOGIN));
        }

        let lc_ctype = text(ISC_DPB_LC_CTYPE);
        Charset::from_name(&lc_ctype).map_err(|_| {
            Fault::new(ISC_BAD_DPB_CONTENT).detail(format!(
                "CHARACTER SET {} is not defined",
                lc_ctype.to_ascii_uppercase()
            ))
        })
    }

    fn add_attachment(&mut self, database: &str, charset: Charset, db: &mut DbHandle) {
        let handle = self.next_handle();
        self.attachments.insert(
            handle,
            Attachment {
                database: database.to_string(),
                charset,
            },
        );
        *db = handle;
    }

    fn charset_of(&self, db: DbHandle) -> Result<Charset, Fault> {
        self.attachments
            .get(&db)
            .map(|a| a.charset)
            .ok_or_else(Fault::bad_db_handle)
    }

    pub(super) fn attach(&mut self, endpoint: &str, db: &mut DbHandle, dpb: &[u8]) -> Outcome {
        let items = parse_dpb(dpb)?;
        let charset = self.authorize(&items)?;

        let name = database_name(endpoint);
        if !self.databases.contains_key(name) {
            return Err(Fault::new(ISC_IO_ERROR).arg("open").arg(name));
        }
        self.add_attachment(name, charset, db);
        Ok(0)
    }

    /// Create an empty database and attach to it.
    pub(super) fn create_database(
        &mut self,
        endpoint: &str,
        db: &mut DbHandle,
        dpb: &[u8],
    ) -> Outcome {
        let items = parse_dpb(dpb)?;
        let charset = self.authorize(&items)?;

        let name = database_name(endpoint);
        if self.databases.contains_key(name) {
            return Err(Fault::new(ISC_IO_ERROR).arg("open O_CREAT").arg(name));
        }
        let page_size = match items.get(&ISC_DPB_PAGE_SIZE) {
            None => DEFAULT_PAGE_SIZE,
            Some(raw) => {
                let bytes: [u8; 4] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| Fault::new(ISC_BAD_DPB_CONTENT))?;
                u32::from_le_bytes(bytes)
            }
        };
        self.databases.insert(
            name.to_string(),
            Database {
                page_size,
                ..Database::default()
            },
        );
        self.add_attachment(name, charset, db);
        Ok(0)
    }

    /// Remove the attached database. Refused while this attachment has transactions or
    /// another attachment uses the database.
    pub(super) fn drop_database(&mut self, db: &mut DbHandle) -> Outcome {
        let name = self
            .attachments
            .get(&*db)
            .map(|a| a.database.clone())
            .ok_or_else(Fault::bad_db_handle)?;
        let open = self.transactions.values().filter(|t| t.db == *db).count();
        if open > 0 {
            return Err(Fault::new(ISC_OPEN_TRANS).num(isize::try_from(open).unwrap_or(isize::MAX)));
        }
        let shared = self
            .attachments
            .iter()
            .any(|(handle, a)| *handle != *db && a.database == name);
        if shared {
            return Err(Fault::new(ISC_OBJ_IN_USE).arg(name));
        }

        self.databases.remove(&name);
        self.statements.retain(|_, stmt| stmt.db != *db);
        self.attachments.remove(&*db);
        *db = 0;
        Ok(0)
    }

    pub(super) fn detach(&mut self, db: &mut DbHandle) -> Outcome {
        if !self.attachments.contains_key(&*db) {
            return Err(Fault::bad_db_handle());
        }
        let open = self.transactions.values().filter(|t| t.db == *db).count();
        if open > 0 {
            return Err(Fault::new(ISC_OPEN_TRANS).num(isize::try_from(open).unwrap_or(isize::MAX)));
        }
        self.statements.retain(|_, stmt| stmt.db != *db);
        self.attachments.remove(&*db);
        *db = 0;
        Ok(0)
    }

    pub(super) fn start_transaction(
        &mut self,
        tr: &mut TrHandle,
        db: DbHandle,
        tpb: &[u8],
    ) -> Outcome {
        let attachment = self.attachments.get(&db).ok_or_else(Fault::bad_db_handle)?;
        if tpb.first().is_some_and(|v| *v != ISC_TPB_VERSION3) {
            return Err(Fault::new(ISC_RANDOM).arg("bad transaction parameter block"));
        }
        let working = self
            .databases
            .get(&attachment.database)
            .cloned()
            .unwrap_or_default();
        let handle = self.next_handle();
        self.transactions.insert(handle, Txn { db, working });
        *tr = handle;
        Ok(0)
    }

    pub(super) fn commit(&mut self, tr: &mut TrHandle, retaining: bool) -> Outcome {
        let txn = self
            .transactions
            .get(&*tr)
            .ok_or_else(Fault::bad_trans_handle)?;
        let attachment = self
            .attachments
            .get(&txn.db)
            .ok_or_else(Fault::bad_db_handle)?;
        self.databases
            .insert(attachment.database.clone(), txn.working.clone());
        if !retaining {
            self.end_transaction(tr);
        }
        Ok(0)
    }

    pub(super) fn rollback(&mut self, tr: &mut TrHandle, retaining: bool) -> Outcome {
        let txn = self
            .transactions
            .get_mut(&*tr)
            .ok_or_else(Fault::bad_trans_handle)?;
        if retaining {
            let committed = self
                .attachments
                .get(&txn.db)
                .and_then(|a| self.databases.get(&a.database))
                .cloned()
                .unwrap_or_default();
            txn.working = committed;
        } else {
            self.end_transaction(tr);
        }
        Ok(0)
    }

    fn end_transaction(&mut self, tr: &mut TrHandle) {
        self.transactions.remove(&*tr);
        self.blobs.retain(|_, blob| blob.tr != *tr);
        for stmt in self.statements.values_mut() {
            if stmt.cursor.as_ref().is_some_and(|c| c.tr == *tr) {
                stmt.cursor = None;
            }
        }
        *tr = 0;
    }

    pub(super) fn allocate(&mut self, db: DbHandle, stmt: &mut StmtHandle) -> Outcome {
        if !self.attachments.contains_key(&db) {
            return Err(Fault::bad_db_handle());
        }
        let handle = self.next_handle();
        self.statements.insert(
            handle,
            Stmt {
                db,
                plan: None,
                cursor: None,
            },
        );
        *stmt = handle;
        Ok(0)
    }

    pub(super) fn prepare(
        &mut self,
        tr: TrHandle,
        stmt: StmtHandle,
        sql: &[u8],
        out: &mut Xsqlda,
    ) -> Outcome {
        let db = self
            .statements
            .get(&stmt)
            .ok_or_else(Fault::bad_stmt_handle)?
            .db;
        let sql = sql_text(sql, self.charset_of(db)?)?;
        let entry = self
            .statements
            .get_mut(&stmt)
            .ok_or_else(Fault::bad_stmt_handle)?;
        let txn = self
            .transactions
            .get(&tr)
            .ok_or_else(Fault::bad_trans_handle)?;
        let plan = compile(&sql, &txn.working)?;
        fill(out, output_slots(&plan));
        entry.plan = Some(plan);
        entry.cursor = None;
        Ok(0)
    }

    /// Describe the output columns, or the input parameters when `input` is set.
    pub(super) fn describe(&mut self, stmt: StmtHandle, da: &mut Xsqlda, input: bool) -> Outcome {
        let entry = self
            .statements
            .get(&stmt)
            .ok_or_else(Fault::bad_stmt_handle)?;
        let plan = entry
            .plan
            .as_ref()
            .ok_or_else(|| Fault::new(ISC_UNPREPARED_STMT))?;
        let slots = if input {
            plan.params.iter().map(|p| p.slot("", "")).collect()
        } else {
            output_slots(plan)
        };
        fill(da, slots);
        Ok(0)
    }

    pub(super) fn execute(
        &mut self,
        tr: TrHandle,
        stmt: StmtHandle,
        input: Option<&Xsqlda>,
    ) -> Outcome {
        let db = self
            .statements
            .get(&stmt)
            .ok_or_else(Fault::bad_stmt_handle)?
            .db;
        let charset = self.charset_of(db)?;
        let entry = self
            .statements
            .get_mut(&stmt)
            .ok_or_else(Fault::bad_stmt_handle)?;
        let txn = self
            .transactions
            .get_mut(&tr)
            .ok_or_else(Fault::bad_trans_handle)?;
        let plan = entry
            .plan
            .as_ref()
            .ok_or_else(|| Fault::new(ISC_UNPREPARED_STMT))?;
        if entry.cursor.is_some() {
            return Err(Fault::dsql(ISC_DSQL_CURSOR_OPEN_ERR));
        }

        let inputs = read_inputs(&plan.params, input, &charset)?;
        if let Some(rows) = run(plan, &inputs, &mut txn.working, &charset)? {
            entry.cursor = Some(Cursor { tr, rows, next: 0 });
        }
        Ok(0)
    }

    pub(super) fn execute_immediate(
        &mut self,
        db: DbHandle,
        tr: TrHandle,
        sql: &[u8],
    ) -> Outcome {
        let charset = self.charset_of(db)?;
        let sql = sql_text(sql, charset)?;
        let txn = self
            .transactions
            .get_mut(&tr)
            .ok_or_else(Fault::bad_trans_handle)?;
        let plan = compile(&sql, &txn.working)?;
        if !plan.params.is_empty() {
            return Err(Fault::sqlda(
                "parameter markers are not allowed in execute immediate",
            ));
        }
        run(&plan, &[], &mut txn.working, &charset)?;
        Ok(0)
    }

    pub(super) fn fetch(&mut self, stmt: StmtHandle, out: &mut Xsqlda) -> Outcome {
        let db = self
            .statements
            .get(&stmt)
            .ok_or_else(Fault::bad_stmt_handle)?
            .db;
        let charset = self.charset_of(db)?;
        let entry = self
            .statements
            .get_mut(&stmt)
            .ok_or_else(Fault::bad_stmt_handle)?;
        let Some(cursor) = entry.cursor.as_mut() else {
            return Err(Fault::dsql(ISC_DSQL_CURSOR_ERR));
        };
        let Some(row) = cursor.rows.get(cursor.next) else {
            entry.cursor = None;
            return Ok(FETCH_END_OF_SET);
        };

        let vars = out.vars_mut();
        if vars.len() < row.len() {
            return Err(Fault::sqlda(format!(
                "output descriptor has {} slots for {} columns",
                vars.len(),
                row.len()
            )));
        }
        for (var, value) in vars.iter_mut().zip(row) {
            write_slot(var, value, &charset)?;
        }
        cursor.next += 1;
        Ok(0)
    }

    pub(super) fn free(&mut self, stmt: &mut StmtHandle, option: u16) -> Outcome {
        let entry = self
            .statements
            .get_mut(&*stmt)
            .ok_or_else(Fault::bad_stmt_handle)?;
        match option {
            DSQL_CLOSE => entry.cursor = None,
            DSQL_DROP => {
                self.statements.remove(&*stmt);
                *stmt = 0;
            }
            other => {
                return Err(Fault::new(ISC_RANDOM).arg(format!("unknown free option {other}")));
            }
        }
        Ok(0)
    }

    /// Open a new blob for writing; its id is reserved in the transaction's database.
    pub(super) fn create_blob(
        &mut self,
        db: DbHandle,
        tr: TrHandle,
        blob: &mut BlobHandle,
        id: &mut QuadId,
    ) -> Outcome {
        self.charset_of(db)?;
        let txn = self
            .transactions
            .get_mut(&tr)
            .ok_or_else(Fault::bad_trans_handle)?;
        let new_id = txn.working.new_blob_id();
        let handle = self.next_handle();
        self.blobs.insert(
            handle,
            OpenBlob {
                tr,
                id: new_id,
                mode: BlobMode::Writing(Vec::new()),
            },
        );
        *blob = handle;
        *id = new_id;
        Ok(0)
    }

    pub(super) fn open_blob(
        &mut self,
        db: DbHandle,
        tr: TrHandle,
        blob: &mut BlobHandle,
        id: &QuadId,
    ) -> Outcome {
        self.charset_of(db)?;
        let txn = self
            .transactions
            .get(&tr)
            .ok_or_else(Fault::bad_trans_handle)?;
        let data = txn
            .working
            .blob(id)
            .cloned()
            .ok_or_else(|| Fault::new(ISC_BAD_SEGSTR_ID))?;
        let handle = self.next_handle();
        self.blobs.insert(
            handle,
            OpenBlob {
                tr,
                id: *id,
                mode: BlobMode::Reading { data, pos: 0 },
            },
        );
        *blob = handle;
        Ok(0)
    }

    pub(super) fn put_segment(&mut self, blob: BlobHandle, segment: &[u8]) -> Outcome {
        match self.blobs.get_mut(&blob).map(|b| &mut b.mode) {
            Some(BlobMode::Writing(data)) => {
                data.extend_from_slice(segment);
                Ok(0)
            }
            _ => Err(Fault::bad_blob_handle()),
        }
    }

    /// Copy the next piece into `buffer`. A piece cut short by the buffer reports
    /// [`ISC_SEGMENT`], a read past the end [`ISC_SEGSTR_EOF`].
    pub(super) fn get_segment(
        &mut self,
        blob: BlobHandle,
        buffer: &mut [u8],
        actual: &mut usize,
    ) -> Outcome {
        let Some(BlobMode::Reading { data, pos }) = self.blobs.get_mut(&blob).map(|b| &mut b.mode)
        else {
            return Err(Fault::bad_blob_handle());
        };
        let rest = &data[*pos..];
        if rest.is_empty() {
            *actual = 0;
            return Err(Fault::new(ISC_SEGSTR_EOF));
        }
        let n = rest.len().min(buffer.len());
        buffer[..n].copy_from_slice(&rest[..n]);
        *pos += n;
        *actual = n;
        if n < rest.len() {
            Err(Fault::new(ISC_SEGMENT))
        } else {
            Ok(0)
        }
    }

    /// Close a blob; a written blob becomes readable in its transaction.
    pub(super) fn close_blob(&mut self, blob: &mut BlobHandle) -> Outcome {
        let open = self
            .blobs
            .remove(&*blob)
            .ok_or_else(Fault::bad_blob_handle)?;
        if let BlobMode::Writing(data) = open.mode {
            let txn = self
                .transactions
                .get_mut(&open.tr)
                .ok_or_else(Fault::bad_trans_handle)?;
            txn.working.blobs.insert(u64::from_le_bytes(open.id), data);
        }
        *blob = 0;
        Ok(0)
    }
}

/// SQL text of a call, decoded in the attachment's character set.
fn sql_text(sql: &[u8], charset: Charset) -> Result<String, Fault> {
    charset
        .decode(sql)
        .map_err(|_| Fault::new(ISC_TRANSLITERATION_FAILED))
}

/// Database name of an endpoint: the part after `host:`. A one letter prefix is a drive.
fn database_name(endpoint: &str) -> &str {
    match endpoint.split_once(':') {
        Some((host, path)) if host.len() > 1 => path,
        _ => endpoint,
    }
}

fn parse_dpb(dpb: &[u8]) -> Result<HashMap<u8, Vec<u8>>, Fault> {
    let bad = || Fault::new(ISC_BAD_DPB_CONTENT);
    let (&version, mut rest) = dpb.split_first().ok_or_else(bad)?;
    if version != ISC_DPB_VERSION1 {
        return Err(bad());
    }
    let mut items = HashMap::new();
    while let [tag, len, tail @ ..] = rest {
        let len = usize::from(*len);
        let value = tail.get(..len).ok_or_else(bad)?;
        items.insert(*tag, value.to_vec());
        rest = &tail[len..];
    }
    if rest.is_empty() {
        Ok(items)
    } else {
        Err(bad())
    }
}

fn fill(da: &mut Xsqlda, slots: Vec<Xsqlvar>) {
    da.sqld = i16::try_from(slots.len()).unwrap_or(i16::MAX);
    for (var, slot) in da.sqlvar.iter_mut().zip(slots) {
        *var = slot;
    }
}

fn output_slots(plan: &Plan) -> Vec<Xsqlvar> {
    plan.outputs
        .iter()
        .map(|o| o.column.slot(&o.label, &o.relation))
        .collect()
}

fn table<'d>(db: &'d Database, name: &str) -> Result<&'d Table, Fault> {
    db.tables
        .get(name)
        .ok_or_else(|| Fault::dsql(ISC_DSQL_RELATION_ERR).detail(name))
}

fn table_mut<'d>(db: &'d mut Database, name: &str) -> Result<&'d mut Table, Fault> {
    db.tables
        .get_mut(name)
        .ok_or_else(|| Fault::dsql(ISC_DSQL_RELATION_ERR).detail(name))
}

fn column(t: &Table, name: &str) -> Result<usize, Fault> {
    t.column_index(name)
        .ok_or_else(|| Fault::dsql(ISC_DSQL_FIELD_ERR).detail(name))
}

/// Column positions an INSERT writes, in value order.
fn insert_targets(
    t: &Table,
    columns: Option<&[String]>,
    values: usize,
) -> Result<Vec<usize>, Fault> {
    let targets = match columns {
        Some(names) => names
            .iter()
            .map(|name| column(t, name))
            .collect::<Result<Vec<_>, _>>()?,
        None => (0..t.columns.len()).collect(),
    };
    if targets.len() != values {
        return Err(Fault::new(ISC_DSQL_ERROR)
            .detail("Count of column list and variable list do not match"));
    }
    Ok(targets)
}

fn compile(sql: &str, db: &Database) -> Result<Plan, Fault> {
    let (command, param_count) = parse(sql).map_err(|e| {
        Fault::dsql(ISC_TOKEN_ERR)
            .num(isize::try_from(e.line).unwrap_or(isize::MAX))
            .num(isize::try_from(e.column).unwrap_or(isize::MAX))
            .detail(e.text)
    })?;

    let mut params: Vec<Option<ColumnDef>> = vec![None; param_count];
    let mut type_param = |operand: &Operand, def: &ColumnDef| {
        if let Operand::Param(idx) = operand
            && let Some(slot) = params.get_mut(*idx)
        {
            *slot = Some(def.clone());
        }
    };
    let mut outputs = Vec::new();

    match &command {
        Command::Select {
            table: name,
            items,
            filter,
            order_by,
        } => {
            let t = table(db, name)?;
            type_filter(t, filter, &mut type_param)?;
            if let Some((col, _)) = order_by {
                column(t, col)?;
            }
            match items {
                None => {
                    for (index, col) in t.columns.iter().enumerate() {
                        outputs.push(Output {
                            column: col.clone(),
                            label: col.name.clone(),
                            relation: t.name.clone(),
                            index,
                        });
                    }
                }
                Some(items) => {
                    for item in items {
                        let index = column(t, &item.column)?;
                        outputs.push(Output {
                            column: t.columns[index].clone(),
                            label: item.alias.clone().unwrap_or_else(|| item.column.clone()),
                            relation: t.name.clone(),
                            index,
                        });
                    }
                }
            }
        }
        Command::Insert {
            table: name,
            columns,
            values,
        } => {
            let t = table(db, name)?;
            let targets = insert_targets(t, columns.as_deref(), values.len())?;
            for (index, operand) in targets.into_iter().zip(values) {
                type_param(operand, &t.columns[index]);
            }
        }
        Command::Update {
            table: name,
            assignments,
            filter,
        } => {
            let t = table(db, name)?;
            for (col, operand) in assignments {
                type_param(operand, &t.columns[column(t, col)?]);
            }
            type_filter(t, filter, &mut type_param)?;
        }
        Command::Delete {
            table: name,
            filter,
        } => {
            let t = table(db, name)?;
            type_filter(t, filter, &mut type_param)?;
        }
        Command::CreateTable { .. } => {}
        Command::DropTable { table: name } => {
            table(db, name)?;
        }
    }

    let params = params
        .into_iter()
        .map(|def| match def {
            Some(def) => ColumnDef {
                nullable: true,
                ..def
            },
            None => ColumnDef::varchar("", i16::try_from(MAX_TEXT_LENGTH).unwrap_or(i16::MAX)),
        })
        .collect();
    Ok(Plan {
        command,
        params,
        outputs,
    })
}

fn type_filter(
    t: &Table,
    filter: &[Condition],
    type_param: &mut impl FnMut(&Operand, &ColumnDef),
) -> Result<(), Fault> {
    for cond in filter {
        let index = column(t, &cond.column)?;
        if let Test::Cmp(_, operand) = &cond.test {
            type_param(operand, &t.columns[index]);
        }
    }
    Ok(())
}

fn read_inputs(
    params: &[ColumnDef],
    input: Option<&Xsqlda>,
    charset: &Charset,
) -> Result<Vec<Value>, Fault> {
    let vars = input.map_or(&[][..], Xsqlda::vars);
    if vars.len() != params.len() {
        return Err(Fault::sqlda(format!(
            "statement expects {} parameters, descriptor carries {}",
            params.len(),
            vars.len()
        )));
    }
    params
        .iter()
        .zip(vars)
        .map(|(param, var)| -> Result<Value, Fault> {
            let value = decode_var(var, charset).map_err(|e| Fault::sqlda(e.to_string()))?;
            param.coerce(value)
        })
        .collect()
}

/// Value of an operand converted to the type of the column it meets.
fn operand(op: &Operand, col: &ColumnDef, inputs: &[Value]) -> Result<Value, Fault> {
    let value = match op {
        Operand::Literal(v) => v.clone(),
        Operand::Param(idx) => inputs.get(*idx).cloned().unwrap_or(Value::Null),
    };
    if value.is_null() {
        Ok(Value::Null)
    } else {
        col.coerce(value)
    }
}

enum Predicate {
    Cmp(CmpOp, Value),
    IsNull { negated: bool },
}

fn predicates(
    t: &Table,
    filter: &[Condition],
    inputs: &[Value],
) -> Result<Vec<(usize, Predicate)>, Fault> {
    filter
        .iter()
        .map(|cond| -> Result<(usize, Predicate), Fault> {
            let index = column(t, &cond.column)?;
            let predicate = match &cond.test {
                Test::Cmp(op, rhs) => Predicate::Cmp(*op, operand(rhs, &t.columns[index], inputs)?),
                Test::IsNull { negated } => Predicate::IsNull { negated: *negated },
            };
            Ok((index, predicate))
        })
        .collect()
}

fn keep(row: &[Value], predicates: &[(usize, Predicate)]) -> bool {
    predicates.iter().all(|(index, predicate)| {
        let cell = &row[*index];
        match predicate {
            Predicate::IsNull { negated } => cell.is_null() != *negated,
            Predicate::Cmp(op, value) => compare(cell, value).is_some_and(|ord| match op {
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Ne => ord != Ordering::Equal,
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Ge => ord != Ordering::Less,
            }),
        }
    })
}

/// NULLs sort first.
fn order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

/// Run a compiled statement against `db`; queries return their rows.
fn run(
    plan: &Plan,
    inputs: &[Value],
    db: &mut Database,
    charset: &Charset,
) -> Result<Option<Vec<Vec<Value>>>, Fault> {
    match &plan.command {
        Command::Select {
            table: name,
            filter,
            order_by,
            ..
        } => {
            let t = table(db, name)?;
            let preds = predicates(t, filter, inputs)?;
            let mut rows: Vec<&Vec<Value>> = t.rows.iter().filter(|r| keep(r, &preds)).collect();
            if let Some((col, descending)) = order_by {
                let index = column(t, col)?;
                rows.sort_by(|a, b| {
                    let ord = order(&a[index], &b[index]);
                    if *descending { ord.reverse() } else { ord }
                });
            }
            let projected = rows
                .into_iter()
                .map(|row| plan.outputs.iter().map(|o| row[o.index].clone()).collect())
                .collect();
            Ok(Some(projected))
        }
        Command::Insert {
            table: name,
            columns,
            values,
        } => {
            let t = table(db, name)?;
            let targets = insert_targets(t, columns.as_deref(), values.len())?;
            let mut row = vec![Value::Null; t.columns.len()];
            for (index, op) in targets.into_iter().zip(values) {
                row[index] = operand(op, &t.columns[index], inputs)?;
            }
            // unsupplied NOT NULL columns fail here
            for (cell, col) in row.iter_mut().zip(&t.columns) {
                *cell = col.coerce(std::mem::replace(cell, Value::Null))?;
            }
            let blob_columns: Vec<usize> = t
                .columns
                .iter()
                .enumerate()
                .filter(|(_, col)| col.sql_type == SqlType::Blob)
                .map(|(index, _)| index)
                .collect();
            for index in blob_columns {
                let value = std::mem::replace(&mut row[index], Value::Null);
                row[index] = db.keep_blob(value, charset)?;
            }
            table_mut(db, name)?.rows.push(row);
            Ok(None)
        }
        Command::Update {
            table: name,
            assignments,
            filter,
        } => {
            let t = table(db, name)?;
            let preds = predicates(t, filter, inputs)?;
            let mut changes = Vec::with_capacity(assignments.len());
            for (col, op) in assignments {
                let index = column(t, col)?;
                let def = &t.columns[index];
                let value = def.coerce(operand(op, def, inputs)?)?;
                changes.push((index, def.sql_type == SqlType::Blob, value));
            }
            let changes = changes
                .into_iter()
                .map(|(index, is_blob, value)| {
                    let value = if is_blob {
                        db.keep_blob(value, charset)?
                    } else {
                        value
                    };
                    Ok((index, value))
                })
                .collect::<Result<Vec<_>, Fault>>()?;
            let t = table_mut(db, name)?;
            for row in t.rows.iter_mut().filter(|r| keep(r, &preds)) {
                for (index, value) in &changes {
                    row[*index] = value.clone();
                }
            }
            Ok(None)
        }
        Command::Delete {
            table: name,
            filter,
        } => {
            let t = table_mut(db, name)?;
            let preds = predicates(t, filter, inputs)?;
            t.rows.retain(|r| !keep(r, &preds));
            Ok(None)
        }
        Command::CreateTable {
            table: name,
            columns,
        } => {
            if db.tables.contains_key(name) {
                return Err(Fault::new(ISC_NO_META_UPDATE)
                    .detail(format!("Table {name} already exists")));
            }
            db.tables.insert(
                name.clone(),
                Table {
                    name: name.clone(),
                    columns: columns.clone(),
                    rows: Vec::new(),
                },
            );
            Ok(None)
        }
        Command::DropTable { table: name } => {
            db.tables
                .remove(name)
                .ok_or_else(|| Fault::dsql(ISC_DSQL_RELATION_ERR).detail(name.clone()))?;
            Ok(None)
        }
    }
}

/// Encode a stored value into an output slot in the slot's declared type.
#[allow(clippy::cast_possible_truncation)]
fn write_slot(var: &mut Xsqlvar, value: &Value, charset: &Charset) -> Result<(), Fault> {
    if value.is_null() {
        if !var.is_nullable() {
            return Err(Fault::sqlda(format!(
                "column {} holds NULL but its slot is not nullable",
                var.name()
            )));
        }
        var.sqlind = -1;
        return Ok(());
    }

    let needed = var.buffer_len();
    if var.data.len() < needed {
        return Err(Fault::sqlda(format!(
            "buffer for column {} holds {} of {needed} bytes",
            var.name(),
            var.data.len()
        )));
    }

    let len = usize::try_from(var.sqllen).unwrap_or(0);
    let name = var.name().to_string();
    let mismatch = || Fault::sqlda(format!("cannot store {value} in column {name}"));
    let encode = |s: &str| -> Result<Vec<u8>, Fault> {
        let encoded = charset
            .encode(s)
            .map_err(|_| Fault::new(ISC_TRANSLITERATION_FAILED))?;
        if encoded.len() > len {
            return Err(Fault::truncation());
        }
        Ok(encoded)
    };
    let bytes = match (SqlType::from_tag(var.sqltype), value) {
        (SqlType::VarText, Value::Text(s)) => {
            let encoded = encode(s)?;
            let prefix = u16::try_from(encoded.len()).map_err(|_| Fault::truncation())?;
            let mut bytes = prefix.to_ne_bytes().to_vec();
            bytes.extend_from_slice(&encoded);
            bytes
        }
        (SqlType::Text, Value::Text(s)) => {
            let mut bytes = encode(s)?;
            bytes.resize(len, b' ');
            bytes
        }
        (SqlType::Short, v) => i16::try_from(unscale(v, var.sqlscale).ok_or_else(mismatch)?)
            .map_err(|_| Fault::new(ISC_ARITH_EXCEPT))?
            .to_ne_bytes()
            .to_vec(),
        (SqlType::Long, v) => i32::try_from(unscale(v, var.sqlscale).ok_or_else(mismatch)?)
            .map_err(|_| Fault::new(ISC_ARITH_EXCEPT))?
            .to_ne_bytes()
            .to_vec(),
        (SqlType::Int64, v) => unscale(v, var.sqlscale)
            .ok_or_else(mismatch)?
            .to_ne_bytes()
            .to_vec(),
        (SqlType::Float, v) => (v.as_float().ok_or_else(mismatch)? as f32)
            .to_ne_bytes()
            .to_vec(),
        (SqlType::Double, v) => v.as_float().ok_or_else(mismatch)?.to_ne_bytes().to_vec(),
        (SqlType::Date, v) => encode_date(v.as_date().ok_or_else(mismatch)?)
            .to_ne_bytes()
            .to_vec(),
        (SqlType::Time, v) => encode_time(v.as_time().ok_or_else(mismatch)?)
            .to_ne_bytes()
            .to_vec(),
        (SqlType::Timestamp, v) => {
            let (days, ticks) = encode_timestamp(v.as_timestamp().ok_or_else(mismatch)?);
            let mut bytes = days.to_ne_bytes().to_vec();
            bytes.extend_from_slice(&ticks.to_ne_bytes());
            bytes
        }
        (SqlType::Boolean, Value::Bool(b)) => vec![u8::from(*b)],
        (SqlType::Blob, Value::Raw { bytes, .. }) if bytes.len() == 8 => bytes.clone(),
        (SqlType::Unknown(_), Value::Raw { bytes, .. }) => bytes.clone(),
        _ => return Err(mismatch()),
    };

    let target = var.data.get_mut(..bytes.len()).ok_or_else(mismatch)?;
    target.copy_from_slice(&bytes);
    var.sqlind = 0;
    Ok(())
}

/// Raw integer of a logical value at `scale`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn unscale(value: &Value, scale: i16) -> Option<i64> {
    match value {
        Value::Int(i) if scale == 0 => Some(*i),
        other => {
            let raw = (other.as_float()? * 10f64.powi(-i32::from(scale))).round();
            (raw.is_finite() && raw >= i64::MIN as f64 && raw <= i64::MAX as f64)
                .then_some(raw as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibase::{ISC_DSQL_SQLDA_ERR, SQL_VARYING};

    fn state_with_rates() -> (ServerState, DbHandle, TrHandle) {
        let mut state = ServerState::new();
        let mut db = Database::default();
        db.tables.insert(
            "CROSS_RATE".into(),
            Table {
                name: "CROSS_RATE".into(),
                columns: vec![
                    ColumnDef::varchar("from_currency", 10),
                    ColumnDef::varchar("to_currency", 10),
                    ColumnDef::float("conv_rate"),
                ],
                rows: Vec::new(),
            },
        );
        state.databases.insert("employee".into(), db);

        let mut dpb = vec![ISC_DPB_VERSION1, ISC_DPB_USER_NAME, 6];
        dpb.extend_from_slice(b"sysdba");
        dpb.extend([ISC_DPB_PASSWORD, 9]);
        dpb.extend_from_slice(b"masterkey");
        let (mut h, mut tr) = (0, 0);
        state.attach("localhost:employee", &mut h, &dpb).unwrap();
        state.start_transaction(&mut tr, h, &[ISC_TPB_VERSION3]).unwrap();
        (state, h, tr)
    }

    #[test]
    fn endpoint_names() {
        assert_eq!(database_name("localhost:employe2.fdb"), "employe2.fdb");
        assert_eq!(database_name("C:/data/employee.fdb"), "C:/data/employee.fdb");
        assert_eq!(database_name("employee"), "employee");
    }

    #[test]
    fn wrong_password_is_a_login_failure() {
        let mut state = ServerState::new();
        state.databases.insert("employee".into(), Database::default());
        let dpb = [ISC_DPB_VERSION1, ISC_DPB_USER_NAME, 1, b'x'];
        let mut db = 0;
        let fault = state.attach("employee", &mut db, &dpb).unwrap_err();
        assert_eq!(fault.primary(), ISC_LOGIN);
        assert_eq!(db, 0);
    }

    #[test]
    fn committed_rows_are_visible_to_later_transactions() {
        let (mut state, db, mut tr) = state_with_rates();
        state
            .execute_immediate(db, tr, b"insert into cross_rate values ('Dollar', 'Real', 10)")
            .unwrap();
        assert!(state.databases["employee"].tables["CROSS_RATE"].rows.is_empty());

        state.commit(&mut tr, false).unwrap();
        assert_eq!(tr, 0);
        let rows = &state.databases["employee"].tables["CROSS_RATE"].rows;
        assert_eq!(rows[0][2], Value::Float(10.0));
    }

    #[test]
    fn detach_refuses_open_transactions() {
        let (mut state, mut db, mut tr) = state_with_rates();
        assert_eq!(state.detach(&mut db).unwrap_err().primary(), ISC_OPEN_TRANS);
        state.rollback(&mut tr, false).unwrap();
        state.detach(&mut db).unwrap();
        assert_eq!(state.open_attachments(), 0);
    }

    #[test]
    fn cursor_walks_rows_then_reports_end_of_set() {
        let (mut state, db, tr) = state_with_rates();
        state
            .execute_immediate(db, tr, b"insert into cross_rate values ('Euro', 'Real', 0.5)")
            .unwrap();

        let mut stmt = 0;
        state.allocate(db, &mut stmt).unwrap();
        let mut out = Xsqlda::new(4);
        state
            .prepare(tr, stmt, b"select from_currency from cross_rate", &mut out)
            .unwrap();
        assert_eq!(out.sqld, 1);
        assert_eq!(out.sqlvar[0].base_type(), SQL_VARYING);
        for var in out.vars_mut() {
            var.allocate();
        }

        state.execute(tr, stmt, None).unwrap();
        assert_eq!(state.fetch(stmt, &mut out), Ok(0));
        assert_eq!(&out.sqlvar[0].data[2..6], b"Euro");
        assert_eq!(state.fetch(stmt, &mut out), Ok(FETCH_END_OF_SET));
        assert_eq!(
            state.fetch(stmt, &mut out).unwrap_err(),
            Fault::dsql(ISC_DSQL_CURSOR_ERR)
        );
    }

    #[test]
    fn missing_parameters_are_a_descriptor_error() {
        let (mut state, db, tr) = state_with_rates();
        let mut stmt = 0;
        state.allocate(db, &mut stmt).unwrap();
        let mut out = Xsqlda::new(1);
        state
            .prepare(tr, stmt, b"delete from cross_rate where from_currency = ?", &mut out)
            .unwrap();
        assert_eq!(out.sqld, 0);
        let fault = state.execute(tr, stmt, None).unwrap_err();
        assert_eq!(fault, Fault::sqlda("statement expects 1 parameters, descriptor carries 0"));
        assert_eq!(Fault::dsql(ISC_DSQL_SQLDA_ERR).primary(), ISC_DSQL_ERROR);
    }

    #[test]
    fn unknown_names_fail_at_prepare() {
        let (mut state, db, tr) = state_with_rates();
        let mut stmt = 0;
        state.allocate(db, &mut stmt).unwrap();
        let mut out = Xsqlda::new(1);
        let fault = state
            .prepare(tr, stmt, b"select * from cross_rates", &mut out)
            .unwrap_err();
        assert_eq!(fault, Fault::dsql(ISC_DSQL_RELATION_ERR).detail("CROSS_RATES"));
        let fault = state
            .prepare(tr, stmt, b"select rate from cross_rate", &mut out)
            .unwrap_err();
        assert_eq!(fault, Fault::dsql(ISC_DSQL_FIELD_ERR).detail("RATE"));
        assert_eq!(
            state.describe(stmt, &mut out, false).unwrap_err(),
            Fault::new(ISC_UNPREPARED_STMT)
        );
    }

    fn dpb(extra: &[(u8, &[u8])]) -> Vec<u8> {
        let mut dpb = vec![ISC_DPB_VERSION1];
        let login: [(u8, &[u8]); 2] = [
            (ISC_DPB_USER_NAME, b"sysdba"),
            (ISC_DPB_PASSWORD, b"masterkey"),
        ];
        for (tag, value) in login.iter().chain(extra) {
            dpb.push(*tag);
            dpb.push(u8::try_from(value.len()).unwrap());
            dpb.extend_from_slice(value);
        }
        dpb
    }

    #[test]
    fn create_then_drop_a_database() {
        let mut state = ServerState::new();
        let mut db = 0;
        let page = 4096u32.to_le_bytes();
        let params = dpb(&[(ISC_DPB_PAGE_SIZE, &page)]);
        state
            .create_database("localhost:scratch.fdb", &mut db, &params)
            .unwrap();
        assert_eq!(state.databases["scratch.fdb"].page_size, 4096);

        let mut again = 0;
        let fault = state
            .create_database("scratch.fdb", &mut again, &dpb(&[]))
            .unwrap_err();
        assert_eq!(fault.primary(), ISC_IO_ERROR);

        let mut other = 0;
        state.attach("scratch.fdb", &mut other, &dpb(&[])).unwrap();
        assert_eq!(state.drop_database(&mut db).unwrap_err().primary(), ISC_OBJ_IN_USE);
        state.detach(&mut other).unwrap();

        state.drop_database(&mut db).unwrap();
        assert_eq!(db, 0);
        assert!(!state.databases.contains_key("scratch.fdb"));
        assert_eq!(state.open_attachments(), 0);
    }

    #[test]
    fn unknown_character_set_is_refused_at_attach() {
        let mut state = ServerState::new();
        state.databases.insert("employee".into(), Database::default());
        let mut db = 0;
        let fault = state
            .attach("employee", &mut db, &dpb(&[(ISC_DPB_LC_CTYPE, b"EBCDIC")]))
            .unwrap_err();
        assert_eq!(
            fault,
            Fault::new(ISC_BAD_DPB_CONTENT).detail("CHARACTER SET EBCDIC is not defined")
        );
        // item length runs past the block
        let truncated = [ISC_DPB_VERSION1, ISC_DPB_USER_NAME, 5, b'x'];
        assert_eq!(
            parse_dpb(&truncated).unwrap_err().primary(),
            ISC_BAD_DPB_CONTENT
        );
    }

    #[test]
    fn sql_and_slots_use_the_attachment_charset() {
        let (mut state, _, _) = state_with_rates();
        let mut db = 0;
        state
            .attach("employee", &mut db, &dpb(&[(ISC_DPB_LC_CTYPE, b"ISO8859_1")]))
            .unwrap();
        let mut tr = 0;
        state.start_transaction(&mut tr, db, &[ISC_TPB_VERSION3]).unwrap();
        let insert = b"insert into cross_rate values ('Dollar', 'S\xe3o', 1)";
        state.execute_immediate(db, tr, insert).unwrap();

        let mut stmt = 0;
        state.allocate(db, &mut stmt).unwrap();
        let mut out = Xsqlda::new(1);
        state
            .prepare(tr, stmt, b"select to_currency from cross_rate", &mut out)
            .unwrap();
        out.sqlvar[0].allocate();
        state.execute(tr, stmt, None).unwrap();
        state.fetch(stmt, &mut out).unwrap();
        let mut expected = 3u16.to_ne_bytes().to_vec();
        expected.extend_from_slice(b"S\xe3o");
        assert_eq!(&out.sqlvar[0].data[..5], expected.as_slice());

        // a UTF-8 attachment refuses latin1 bytes
        let (mut utf8, db, tr) = state_with_rates();
        assert_eq!(
            utf8.execute_immediate(db, tr, insert).unwrap_err(),
            Fault::new(ISC_TRANSLITERATION_FAILED)
        );
    }

    #[test]
    fn blobs_are_written_and_read_in_segments() {
        let (mut state, db, tr) = state_with_rates();
        let (mut blob, mut id) = (0, [0u8; 8]);
        state.create_blob(db, tr, &mut blob, &mut id).unwrap();
        state.put_segment(blob, b"hello ").unwrap();
        state.put_segment(blob, b"world").unwrap();
        state.close_blob(&mut blob).unwrap();
        assert_eq!(blob, 0);

        state.open_blob(db, tr, &mut blob, &id).unwrap();
        assert_eq!(state.put_segment(blob, b"x").unwrap_err(), Fault::bad_blob_handle());
        let mut buffer = [0u8; 8];
        let mut actual = 0;
        assert_eq!(
            state.get_segment(blob, &mut buffer, &mut actual).unwrap_err(),
            Fault::new(ISC_SEGMENT)
        );
        assert_eq!(&buffer[..actual], b"hello wo");
        assert_eq!(state.get_segment(blob, &mut buffer, &mut actual), Ok(0));
        assert_eq!(&buffer[..actual], b"rld");
        assert_eq!(
            state.get_segment(blob, &mut buffer, &mut actual).unwrap_err(),
            Fault::new(ISC_SEGSTR_EOF)
        );
        assert_eq!(actual, 0);
        assert_eq!(state.open_blobs(), 1);

        let missing = 77u64.to_le_bytes();
        let mut other = 0;
        assert_eq!(
            state.open_blob(db, tr, &mut other, &missing).unwrap_err(),
            Fault::new(ISC_BAD_SEGSTR_ID)
        );
    }

    #[test]
    fn ending_a_transaction_releases_its_blobs() {
        let (mut state, db, mut tr) = state_with_rates();
        let (mut blob, mut id) = (0, [0u8; 8]);
        state.create_blob(db, tr, &mut blob, &mut id).unwrap();
        state.rollback(&mut tr, false).unwrap();
        assert_eq!(state.open_blobs(), 0);
        assert_eq!(state.close_blob(&mut blob).unwrap_err(), Fault::bad_blob_handle());
    }

    #[test]
    fn text_blob_columns_store_literals_as_blobs() {
        let (mut state, db, mut tr) = state_with_rates();
        let create = b"create table notes (id integer, body blob sub_type text)";
        state.execute_immediate(db, tr, create).unwrap();
        state
            .execute_immediate(db, tr, b"insert into notes values (1, 'first note')")
            .unwrap();
        state.commit(&mut tr, false).unwrap();

        let stored = &state.databases["employee"];
        let Value::Raw { bytes, .. } = &stored.tables["NOTES"].rows[0][1] else {
            panic!("expected a blob id");
        };
        let id: QuadId = bytes.as_slice().try_into().unwrap();
        assert_eq!(stored.blob(&id).map(Vec::as_slice), Some(&b"first note"[..]));
    }

    #[test]
    fn slot_writes_respect_declared_shapes() {
        let mut var = ColumnDef::varchar("c", 4).slot("C", "T");
        var.allocate();
        write_slot(&mut var, &Value::from("abcd"), &Charset::UTF8).unwrap();
        let mut expected = 4u16.to_ne_bytes().to_vec();
        expected.extend_from_slice(b"abcd");
        assert_eq!(var.data, expected);
        assert_eq!(
            write_slot(&mut var, &Value::from("abcde"), &Charset::UTF8).unwrap_err().primary(),
            ISC_ARITH_EXCEPT
        );

        let mut money = ColumnDef::numeric("price", 2).slot("PRICE", "T");
        money.allocate();
        write_slot(&mut money, &Value::Float(1.25), &Charset::UTF8).unwrap();
        assert_eq!(money.data, 125i64.to_ne_bytes());

        let mut undersized = ColumnDef::integer("n").slot("N", "T");
        assert!(write_slot(&mut undersized, &Value::Int(1), &Charset::UTF8).is_err());
        write_slot(&mut undersized, &Value::Null, &Charset::UTF8).unwrap();
        assert!(undersized.is_null());
    }
}
