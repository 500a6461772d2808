//! Status vector construction and message catalogue of the memory server.

use crate::ibase::{
    ISC_ARG_END, ISC_ARG_GDS, ISC_ARG_INTERPRETED, ISC_ARG_NUMBER, ISC_ARG_STRING,
    ISC_ARITH_EXCEPT, ISC_BAD_DB_HANDLE, ISC_BAD_DPB_CONTENT, ISC_BAD_SEGSTR_HANDLE,
    ISC_BAD_SEGSTR_ID, ISC_BAD_STMT_HANDLE, ISC_BAD_TRANS_HANDLE, ISC_CONVERT_ERROR,
    ISC_DSQL_CURSOR_ERR, ISC_DSQL_CURSOR_OPEN_ERR, ISC_DSQL_ERROR, ISC_DSQL_FIELD_ERR,
    ISC_DSQL_RELATION_ERR, ISC_DSQL_SQLDA_ERR, ISC_IO_ERROR, ISC_LOGIN, ISC_NO_META_UPDATE,
    ISC_NOT_VALID, ISC_OBJ_IN_USE, ISC_OPEN_TRANS, ISC_RANDOM, ISC_SEGMENT, ISC_SEGSTR_EOF,
    ISC_TOKEN_ERR, ISC_TRANSLITERATION_FAILED, ISC_UNPREPARED_STMT, IscStatus, StatusVector,
};

/// Unknown code, as `isc_sqlcode` reports it.
const SQLCODE_UNKNOWN: i32 = -999;

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Gds(IscStatus),
    Str(String),
    Num(IscStatus),
}

/// A failed server call: GDS clusters with their arguments.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Fault(Vec<Arg>);

impl Fault {
    pub(super) fn new(code: IscStatus) -> Self {
        Fault(vec![Arg::Gds(code)])
    }

    /// `Dynamic SQL Error` followed by the specific cluster.
    pub(super) fn dsql(code: IscStatus) -> Self {
        Fault::new(ISC_DSQL_ERROR).then(code)
    }

    /// Start another cluster.
    pub(super) fn then(mut self, code: IscStatus) -> Self {
        self.0.push(Arg::Gds(code));
        self
    }

    pub(super) fn arg(mut self, text: impl Into<String>) -> Self {
        self.0.push(Arg::Str(text.into()));
        self
    }

    pub(super) fn num(mut self, n: IscStatus) -> Self {
        self.0.push(Arg::Num(n));
        self
    }

    /// Extra detail line rendered verbatim.
    pub(super) fn detail(self, text: impl Into<String>) -> Self {
        self.then(ISC_RANDOM).arg(text)
    }

    pub(super) fn primary(&self) -> IscStatus {
        match self.0.first() {
            Some(Arg::Gds(code)) => *code,
            _ => ISC_RANDOM,
        }
    }

    pub(super) fn bad_db_handle() -> Self {
        Fault::new(ISC_BAD_DB_HANDLE)
    }

    pub(super) fn bad_trans_handle() -> Self {
        Fault::new(ISC_BAD_TRANS_HANDLE)
    }

    pub(super) fn bad_stmt_handle() -> Self {
        Fault::new(ISC_BAD_STMT_HANDLE)
    }

    pub(super) fn bad_blob_handle() -> Self {
        Fault::new(ISC_BAD_SEGSTR_HANDLE)
    }

    pub(super) fn sqlda(detail: impl Into<String>) -> Self {
        Fault::dsql(ISC_DSQL_SQLDA_ERR).detail(detail)
    }

    pub(super) fn truncation() -> Self {
        Fault::new(ISC_ARITH_EXCEPT).detail("string right truncation")
    }

    pub(super) fn conversion(text: impl Into<String>) -> Self {
        Fault::new(ISC_CONVERT_ERROR).arg(text)
    }

    /// Write the clusters into `status`, storing string arguments in `strings`.
    pub(super) fn write(&self, status: &mut StatusVector, strings: &mut Vec<String>) {
        let mut words = Vec::with_capacity(self.0.len() * 2 + 1);
        for arg in &self.0 {
            match arg {
                Arg::Gds(code) => words.extend([ISC_ARG_GDS, *code]),
                Arg::Num(n) => words.extend([ISC_ARG_NUMBER, *n]),
                Arg::Str(text) => {
                    strings.push(text.clone());
                    let idx = IscStatus::try_from(strings.len() - 1).unwrap_or(IscStatus::MAX);
                    words.extend([ISC_ARG_STRING, idx]);
                }
            }
        }
        words.push(ISC_ARG_END);
        status.set(&words);
    }
}

fn template(code: IscStatus) -> &'static str {
    match code {
        ISC_ARITH_EXCEPT => "arithmetic exception, numeric overflow, or string truncation",
        ISC_BAD_DB_HANDLE => "invalid database handle (no active connection)",
        ISC_BAD_TRANS_HANDLE => "invalid transaction handle (expecting explicit transaction start)",
        ISC_BAD_STMT_HANDLE => "invalid statement handle",
        ISC_BAD_DPB_CONTENT => "bad parameters on attach or create database",
        ISC_BAD_SEGSTR_HANDLE => "invalid BLOB handle",
        ISC_BAD_SEGSTR_ID => "invalid BLOB ID",
        ISC_SEGMENT => "segment buffer length shorter than expected",
        ISC_SEGSTR_EOF => "attempted retrieval of more segments than exist",
        ISC_TRANSLITERATION_FAILED => "Cannot transliterate character between character sets",
        ISC_OBJ_IN_USE => "object @1 is in use",
        ISC_CONVERT_ERROR => "conversion error from string \"@1\"",
        ISC_IO_ERROR => "I/O error during \"@1\" operation for file \"@2\"",
        ISC_NOT_VALID => "validation error for column @1, value \"@2\"",
        ISC_NO_META_UPDATE => "unsuccessful metadata update",
        ISC_OPEN_TRANS => "cannot disconnect database with open transactions (@1 active)",
        ISC_RANDOM => "@1",
        ISC_LOGIN => {
            "Your user name and password are not defined. Ask your database administrator to set up a Firebird login."
        }
        ISC_DSQL_ERROR => "Dynamic SQL Error",
        ISC_DSQL_CURSOR_ERR => "Attempt to fetch from a cursor that is not open",
        ISC_DSQL_CURSOR_OPEN_ERR => "Attempt to reopen an open cursor",
        ISC_DSQL_FIELD_ERR => "Column unknown",
        ISC_DSQL_RELATION_ERR => "Table unknown",
        ISC_DSQL_SQLDA_ERR => "Incorrect values within SQLDA structure",
        ISC_TOKEN_ERR => "Token unknown - line @1, column @2",
        ISC_UNPREPARED_STMT => "Attempt to execute an unprepared dynamic SQL statement.",
        _ => "unknown ISC error @0",
    }
}

fn render(code: IscStatus, args: &[String]) -> String {
    let mut message = template(code).replace("@0", &code.to_string());
    for (i, arg) in args.iter().enumerate() {
        message = message.replace(&format!("@{}", i + 1), arg);
    }
    message
}

/// Render the cluster at `cursor` and move past it and its arguments.
pub(super) fn interpret(
    status: &StatusVector,
    cursor: &mut usize,
    strings: &[String],
) -> Option<String> {
    let words = status.as_slice();
    while *cursor + 1 < words.len() {
        let (tag, value) = (words[*cursor], words[*cursor + 1]);
        *cursor += 2;
        match tag {
            ISC_ARG_END => return None,
            ISC_ARG_GDS if value == 0 => return None,
            ISC_ARG_GDS => {
                let mut args = Vec::new();
                while *cursor + 1 < words.len() {
                    let (tag, value) = (words[*cursor], words[*cursor + 1]);
                    match tag {
                        ISC_ARG_STRING | ISC_ARG_INTERPRETED => args.push(
                            usize::try_from(value)
                                .ok()
                                .and_then(|idx| strings.get(idx))
                                .cloned()
                                .unwrap_or_default(),
                        ),
                        ISC_ARG_NUMBER => args.push(value.to_string()),
                        _ => break,
                    }
                    *cursor += 2;
                }
                return Some(render(value, &args));
            }
            // warnings and SQLSTATE clusters are not rendered
            _ => {}
        }
    }
    None
}

fn sqlcode_of(code: IscStatus) -> Option<i32> {
    Some(match code {
        ISC_BAD_DB_HANDLE | ISC_BAD_TRANS_HANDLE | ISC_BAD_STMT_HANDLE | ISC_OPEN_TRANS
        | ISC_UNPREPARED_STMT | ISC_BAD_SEGSTR_HANDLE | ISC_BAD_SEGSTR_ID | ISC_OBJ_IN_USE => {
            -901
        }
        ISC_LOGIN | ISC_IO_ERROR | ISC_BAD_DPB_CONTENT => -902,
        ISC_SEGMENT => 101,
        ISC_SEGSTR_EOF => 100,
        ISC_DSQL_RELATION_ERR => -204,
        ISC_DSQL_FIELD_ERR => -206,
        ISC_DSQL_SQLDA_ERR => -804,
        ISC_TOKEN_ERR => -104,
        ISC_NOT_VALID => -625,
        ISC_CONVERT_ERROR => -413,
        ISC_ARITH_EXCEPT | ISC_TRANSLITERATION_FAILED => -802,
        ISC_DSQL_CURSOR_ERR => -504,
        ISC_DSQL_CURSOR_OPEN_ERR => -502,
        ISC_NO_META_UPDATE => -607,
        _ => return None,
    })
}

/// SQL code of the first cluster that has one; a bare DSQL error is a syntax error.
pub(super) fn sqlcode(status: &StatusVector) -> i32 {
    if !status.is_error() {
        return 0;
    }
    let words = status.as_slice();
    let mut saw_dsql = false;
    for pair in words.chunks_exact(2) {
        match (pair[0], pair[1]) {
            (ISC_ARG_END, _) => break,
            (ISC_ARG_GDS, ISC_DSQL_ERROR) => saw_dsql = true,
            (ISC_ARG_GDS, code) => {
                if let Some(sqlcode) = sqlcode_of(code) {
                    return sqlcode;
                }
            }
            _ => {}
        }
    }
    if saw_dsql { -104 } else { SQLCODE_UNKNOWN }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_cluster_with_its_arguments() {
        let mut status = StatusVector::new();
        let mut strings = Vec::new();
        Fault::dsql(ISC_DSQL_RELATION_ERR)
            .detail("CROSS_RATES")
            .write(&mut status, &mut strings);

        let mut cursor = 0;
        let mut lines = Vec::new();
        while let Some(line) = interpret(&status, &mut cursor, &strings) {
            lines.push(line);
        }
        assert_eq!(lines, vec!["Dynamic SQL Error", "Table unknown", "CROSS_RATES"]);
        assert_eq!(sqlcode(&status), -204);
    }

    #[test]
    fn numbers_fill_placeholders() {
        let mut status = StatusVector::new();
        let mut strings = Vec::new();
        Fault::dsql(ISC_TOKEN_ERR)
            .num(1)
            .num(8)
            .detail("FROM")
            .write(&mut status, &mut strings);
        let mut cursor = 0;
        interpret(&status, &mut cursor, &strings);
        assert_eq!(
            interpret(&status, &mut cursor, &strings).as_deref(),
            Some("Token unknown - line 1, column 8")
        );
        assert_eq!(sqlcode(&status), -104);
    }

    #[test]
    fn blob_and_charset_codes() {
        let mut status = StatusVector::new();
        let mut strings = Vec::new();
        Fault::new(ISC_SEGSTR_EOF).write(&mut status, &mut strings);
        assert_eq!(sqlcode(&status), 100);

        Fault::new(ISC_OBJ_IN_USE)
            .arg("employee")
            .write(&mut status, &mut strings);
        let mut cursor = 0;
        assert_eq!(
            interpret(&status, &mut cursor, &strings).as_deref(),
            Some("object employee is in use")
        );
        assert_eq!(sqlcode(&status), -901);

        Fault::new(ISC_TRANSLITERATION_FAILED).write(&mut status, &mut strings);
        assert_eq!(sqlcode(&status), -802);
    }

    #[test]
    fn success_has_no_code() {
        let mut status = StatusVector::new();
        status.clear();
        assert_eq!(sqlcode(&status), 0);
        assert_eq!(interpret(&status, &mut 0, &[]), None);
    }
}
