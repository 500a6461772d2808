//! Conversion of `sqlparser` statements into the memory server's commands.
//!
//! ```text
//! SELECT * | col [[AS] alias], ... FROM t [WHERE cond AND ...] [ORDER BY col [ASC|DESC]]
//! INSERT INTO t [(col, ...)] VALUES (operand, ...)
//! UPDATE t SET col = operand, ... [WHERE ...]
//! DELETE FROM t [WHERE ...]
//! CREATE TABLE t (col type [NOT NULL], ...)
//! DROP TABLE t
//! ```
//!
//! A condition compares a column with a literal or a `?` marker, or tests it for NULL.
//! Unquoted identifiers are upper-cased; quoted ones keep their case.

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::{self as sql_ast, Spanned};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Span;

use super::store::ColumnDef;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// The operator seen from the other side: `? < col` is `col > ?`.
    fn flipped(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Operand {
    Literal(Value),
    /// Zero-based position of a `?` marker
    Param(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Test {
    Cmp(CmpOp, Operand),
    IsNull { negated: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Condition {
    pub column: String,
    pub test: Test,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct SelectItem {
    pub column: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Command {
    Select {
        table: String,
        /// `None` for `*`
        items: Option<Vec<SelectItem>>,
        filter: Vec<Condition>,
        /// Column and descending flag
        order_by: Option<(String, bool)>,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        values: Vec<Operand>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Operand)>,
        filter: Vec<Condition>,
    },
    Delete {
        table: String,
        filter: Vec<Condition>,
    },
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        table: String,
    },
}

/// Offending token and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ParseError {
    pub text: String,
    pub line: usize,
    pub column: usize,
}

const END_OF_COMMAND: &str = "end of command";

// "Expected: an expression, found: = at Line: 2, Column: 23"
static PARSER_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:.*found: )?(?P<text>.*?)(?: at Line: (?P<line>\d+), Column: (?P<col>\d+))?$")
        .expect("parser message pattern compiles")
});

// Firebird blob declarations, unknown to the generic dialect
static BLOB_SUB_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bBLOB\s+SUB_TYPE\s+(?:(?P<text>1|TEXT)|0|BINARY)\b")
        .expect("blob sub type pattern compiles")
});

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*CREATE\s+TABLE\b").expect("create table pattern compiles")
});

/// Parse one statement, returning it with its number of `?` markers.
pub(super) fn parse(sql: &str) -> Result<(Command, usize), ParseError> {
    let source = rewrite_blob_types(sql);
    let mut statements =
        Parser::parse_sql(&GenericDialect {}, &source).map_err(|e| syntax_error(&e, sql))?;

    if statements.len() > 1 {
        return Err(first_word(&statements[1]));
    }
    let Some(statement) = statements.pop() else {
        return Err(end_of_command(sql));
    };

    let mut converter = Converter { params: 0 };
    let command = converter.statement(statement)?;
    Ok((command, converter.params))
}

/// Replace `BLOB SUB_TYPE n` with a type the dialect parses. Every other character keeps
/// its position so error locations still point into the caller's text.
fn rewrite_blob_types(sql: &str) -> String {
    if !CREATE_TABLE.is_match(sql) {
        return sql.to_string();
    }
    BLOB_SUB_TYPE
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            let keyword = if caps.name("text").is_some() {
                "TEXT"
            } else {
                "BLOB"
            };
            let padding: String = caps[0]
                .chars()
                .skip(keyword.len())
                .map(|c| if c == '\n' { '\n' } else { ' ' })
                .collect();
            format!("{keyword}{padding}")
        })
        .into_owned()
}

fn syntax_error(err: &ParserError, sql: &str) -> ParseError {
    let message = match err {
        ParserError::ParserError(m) | ParserError::TokenizerError(m) => m.as_str(),
        ParserError::RecursionLimitExceeded => "recursion limit exceeded",
    };
    let Some(caps) = PARSER_MESSAGE.captures(message) else {
        return ParseError {
            text: message.to_string(),
            line: 1,
            column: 1,
        };
    };
    let text = caps.name("text").map_or(message, |m| m.as_str());
    if text == "EOF" {
        return end_of_command(sql);
    }
    let number = |name: &str| {
        caps.name(name)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(1)
    };
    ParseError {
        text: text.to_string(),
        line: number("line"),
        column: number("col"),
    }
}

/// Error positioned just past the last token.
fn end_of_command(sql: &str) -> ParseError {
    let trimmed = sql.trim_end();
    let line = trimmed.matches('\n').count() + 1;
    let last = trimmed.rsplit('\n').next().unwrap_or_default();
    ParseError {
        text: END_OF_COMMAND.to_string(),
        line,
        column: last.chars().count() + 1,
    }
}

fn located(span: Span, text: impl Into<String>) -> ParseError {
    let (line, column) = if span.start.line == 0 {
        (1, 1)
    } else {
        (
            usize::try_from(span.start.line).unwrap_or(usize::MAX),
            usize::try_from(span.start.column).unwrap_or(usize::MAX),
        )
    };
    ParseError {
        text: text.into(),
        line,
        column,
    }
}

fn unsupported<N: Spanned + ToString + ?Sized>(node: &N) -> ParseError {
    located(node.span(), node.to_string())
}

/// Located at the node, naming its leading keyword.
fn first_word<N: Spanned + ToString>(node: &N) -> ParseError {
    let text = node.to_string();
    let word = text.split_whitespace().next().unwrap_or(END_OF_COMMAND);
    located(node.span(), word)
}

fn ident(id: &sql_ast::Ident) -> String {
    if id.quote_style.is_some() {
        id.value.clone()
    } else {
        id.value.to_ascii_uppercase()
    }
}

/// Last part of a possibly qualified name.
fn object_name(name: &sql_ast::ObjectName) -> Result<String, ParseError> {
    match name.0.last() {
        Some(sql_ast::ObjectNamePart::Identifier(id)) => Ok(ident(id)),
        _ => Err(unsupported(name)),
    }
}

fn table_factor(factor: &sql_ast::TableFactor) -> Result<String, ParseError> {
    match factor {
        sql_ast::TableFactor::Table { name, .. } => object_name(name),
        other => Err(unsupported(other)),
    }
}

fn single_table(tables: &[sql_ast::TableWithJoins], at: Span) -> Result<String, ParseError> {
    match tables {
        [only] => {
            if let Some(join) = only.joins.first() {
                return Err(located(join.relation.span(), "JOIN"));
            }
            table_factor(&only.relation)
        }
        [] => Err(located(at, END_OF_COMMAND)),
        [_, second, ..] => Err(unsupported(second)),
    }
}

fn column_ref(expr: &sql_ast::Expr) -> Option<String> {
    match expr {
        sql_ast::Expr::Identifier(id) => Some(ident(id)),
        sql_ast::Expr::CompoundIdentifier(parts) => parts.last().map(ident),
        sql_ast::Expr::Nested(inner) => column_ref(inner),
        _ => None,
    }
}

fn cmp_op(op: &sql_ast::BinaryOperator) -> Option<CmpOp> {
    use sql_ast::BinaryOperator as B;
    Some(match op {
        B::Eq => CmpOp::Eq,
        B::NotEq => CmpOp::Ne,
        B::Lt => CmpOp::Lt,
        B::LtEq => CmpOp::Le,
        B::Gt => CmpOp::Gt,
        B::GtEq => CmpOp::Ge,
        _ => return None,
    })
}

fn number(text: &str, negative: bool) -> Option<Value> {
    let text = if negative {
        format!("-{text}")
    } else {
        text.to_string()
    };
    match text.parse::<i64>() {
        Ok(i) => Some(Value::Int(i)),
        Err(_) => text.parse::<f64>().ok().map(Value::Float),
    }
}

/// Declared length of a character type; CHAR without one is a single character.
fn char_length(
    len: Option<&sql_ast::CharacterLength>,
    required: bool,
    at: &sql_ast::Ident,
) -> Result<i16, ParseError> {
    match len {
        Some(sql_ast::CharacterLength::IntegerLength { length, .. }) => i16::try_from(*length)
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| located(at.span, length.to_string())),
        Some(sql_ast::CharacterLength::Max) => Err(located(at.span, "MAX")),
        None if required => Err(located(at.span, "VARCHAR")),
        None => Ok(1),
    }
}

fn column_def(col: &sql_ast::ColumnDef) -> Result<ColumnDef, ParseError> {
    use sql_ast::DataType as T;
    let name = ident(&col.name);
    let def = match &col.data_type {
        T::Varchar(len) | T::CharacterVarying(len) | T::CharVarying(len) => {
            ColumnDef::varchar(name, char_length(len.as_ref(), true, &col.name)?)
        }
        T::Char(len) | T::Character(len) => {
            ColumnDef::char(name, char_length(len.as_ref(), false, &col.name)?)
        }
        T::SmallInt(_) => ColumnDef::smallint(name),
        T::Int(_) | T::Integer(_) => ColumnDef::integer(name),
        T::BigInt(_) => ColumnDef::bigint(name),
        T::Numeric(info) | T::Decimal(info) => {
            let scale = match info {
                sql_ast::ExactNumberInfo::PrecisionAndScale(_, scale) => i16::try_from(*scale)
                    .ok()
                    .filter(|s| (0..=18).contains(s))
                    .ok_or_else(|| located(col.name.span, scale.to_string()))?,
                _ => 0,
            };
            ColumnDef::numeric(name, scale)
        }
        T::Float(_) | T::Real => ColumnDef::float(name),
        T::Double(_) | T::DoublePrecision => ColumnDef::double(name),
        T::Date => ColumnDef::date(name),
        T::Time(..) => ColumnDef::time(name),
        T::Timestamp(..) => ColumnDef::timestamp(name),
        T::Boolean | T::Bool => ColumnDef::boolean(name),
        T::Text | T::Clob(_) => ColumnDef::text_blob(name),
        T::Blob(_) | T::Bytea => ColumnDef::blob(name),
        other => return Err(located(col.name.span, other.to_string())),
    };
    let not_null = col
        .options
        .iter()
        .any(|opt| matches!(opt.option, sql_ast::ColumnOption::NotNull));
    Ok(if not_null { def.not_null() } else { def })
}

/// Walks one statement, numbering `?` markers in the order they appear.
struct Converter {
    params: usize,
}

impl Converter {
    fn statement(&mut self, statement: sql_ast::Statement) -> Result<Command, ParseError> {
        let span = statement.span();
        match statement {
            sql_ast::Statement::Query(query) => self.select(*query, span),
            sql_ast::Statement::Insert(insert) => self.insert(insert, span),
            sql_ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => {
                let name = single_table(std::slice::from_ref(&table), span)?;
                let assignments = assignments
                    .iter()
                    .map(|assign| {
                        let column = match &assign.target {
                            sql_ast::AssignmentTarget::ColumnName(col) => object_name(col)?,
                            other => return Err(unsupported(other)),
                        };
                        Ok((column, self.operand(&assign.value)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let filter = self.filter(selection.as_ref())?;
                Ok(Command::Update {
                    table: name,
                    assignments,
                    filter,
                })
            }
            sql_ast::Statement::Delete(delete) => {
                let tables = match &delete.from {
                    sql_ast::FromTable::WithFromKeyword(tables)
                    | sql_ast::FromTable::WithoutKeyword(tables) => tables,
                };
                let table = single_table(tables, span)?;
                let filter = self.filter(delete.selection.as_ref())?;
                Ok(Command::Delete { table, filter })
            }
            sql_ast::Statement::CreateTable(create) => {
                let table = object_name(&create.name)?;
                let columns = create
                    .columns
                    .iter()
                    .map(column_def)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Command::CreateTable { table, columns })
            }
            sql_ast::Statement::Drop {
                object_type: sql_ast::ObjectType::Table,
                names,
                ..
            } => match names.as_slice() {
                [name] => Ok(Command::DropTable {
                    table: object_name(name)?,
                }),
                [_, second, ..] => Err(unsupported(second)),
                [] => Err(located(span, END_OF_COMMAND)),
            },
            other => Err(first_word(&other)),
        }
    }

    fn select(&mut self, query: sql_ast::Query, span: Span) -> Result<Command, ParseError> {
        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(located(span, "UNION"));
        };
        let table = single_table(&select.from, span)?;

        let items = match select.projection.as_slice() {
            [sql_ast::SelectItem::Wildcard(_)] => None,
            projection => Some(
                projection
                    .iter()
                    .map(|item| {
                        let (expr, alias) = match item {
                            sql_ast::SelectItem::UnnamedExpr(expr) => (expr, None),
                            sql_ast::SelectItem::ExprWithAlias { expr, alias } => {
                                (expr, Some(ident(alias)))
                            }
                            other => return Err(unsupported(other)),
                        };
                        let column = column_ref(expr).ok_or_else(|| unsupported(expr))?;
                        Ok(SelectItem { column, alias })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        let filter = self.filter(select.selection.as_ref())?;

        let order_by = match query.order_by.map(|o| o.kind) {
            None => None,
            Some(sql_ast::OrderByKind::Expressions(exprs)) => match exprs.as_slice() {
                [] => None,
                [only] => {
                    let name = column_ref(&only.expr).ok_or_else(|| unsupported(&only.expr))?;
                    // an alias orders by the column it names
                    let column = items
                        .iter()
                        .flatten()
                        .find(|item| item.alias.as_deref() == Some(name.as_str()))
                        .map_or(name, |item| item.column.clone());
                    Some((column, only.options.asc == Some(false)))
                }
                [_, second, ..] => return Err(unsupported(&second.expr)),
            },
            Some(_) => return Err(located(span, "ALL")),
        };

        Ok(Command::Select {
            table,
            items,
            filter,
            order_by,
        })
    }

    fn insert(&mut self, insert: sql_ast::Insert, span: Span) -> Result<Command, ParseError> {
        let table = match &insert.table {
            sql_ast::TableObject::TableName(name) => object_name(name)?,
            other => return Err(located(span, other.to_string())),
        };
        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.iter().map(ident).collect())
        };

        let Some(source) = insert.source else {
            return Err(located(span, "DEFAULT"));
        };
        let body_span = source.body.span();
        let sql_ast::SetExpr::Values(values) = *source.body else {
            return Err(located(body_span, "SELECT"));
        };
        let row = match values.rows.as_slice() {
            [row] => row,
            [_, second, ..] => {
                let at = second.first().map_or(body_span, Spanned::span);
                return Err(located(at, "("));
            }
            [] => return Err(located(body_span, END_OF_COMMAND)),
        };
        let values = row
            .iter()
            .map(|expr| self.operand(expr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Command::Insert {
            table,
            columns,
            values,
        })
    }

    fn filter(&mut self, selection: Option<&sql_ast::Expr>) -> Result<Vec<Condition>, ParseError> {
        let mut conditions = Vec::new();
        if let Some(expr) = selection {
            self.conditions(expr, &mut conditions)?;
        }
        Ok(conditions)
    }

    fn conditions(
        &mut self,
        expr: &sql_ast::Expr,
        out: &mut Vec<Condition>,
    ) -> Result<(), ParseError> {
        use sql_ast::Expr as E;
        match expr {
            E::BinaryOp {
                left,
                op: sql_ast::BinaryOperator::And,
                right,
            } => {
                self.conditions(left, out)?;
                self.conditions(right, out)
            }
            E::Nested(inner) => self.conditions(inner, out),
            E::IsNull(inner) | E::IsNotNull(inner) => {
                let column = column_ref(inner).ok_or_else(|| unsupported(&**inner))?;
                out.push(Condition {
                    column,
                    test: Test::IsNull {
                        negated: matches!(expr, E::IsNotNull(_)),
                    },
                });
                Ok(())
            }
            E::BinaryOp { left, op, right } => {
                let Some(cmp) = cmp_op(op) else {
                    return Err(located(expr.span(), op.to_string()));
                };
                let (column, test) = if let Some(column) = column_ref(left) {
                    (column, Test::Cmp(cmp, self.operand(right)?))
                } else if let Some(column) = column_ref(right) {
                    (column, Test::Cmp(cmp.flipped(), self.operand(left)?))
                } else {
                    return Err(unsupported(&**left));
                };
                out.push(Condition { column, test });
                Ok(())
            }
            other => Err(unsupported(other)),
        }
    }

    fn operand(&mut self, expr: &sql_ast::Expr) -> Result<Operand, ParseError> {
        use sql_ast::Value as V;
        let literal = match expr {
            sql_ast::Expr::Value(v) => match &v.value {
                V::Placeholder(marker) if marker == "?" => {
                    self.params += 1;
                    return Ok(Operand::Param(self.params - 1));
                }
                V::Number(n, _) => number(n, false),
                V::SingleQuotedString(s) => Some(Value::Text(s.clone())),
                V::Boolean(b) => Some(Value::Bool(*b)),
                V::Null => Some(Value::Null),
                _ => None,
            },
            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Minus,
                expr: inner,
            } => match inner.as_ref() {
                sql_ast::Expr::Value(v) => match &v.value {
                    V::Number(n, _) => number(n, true),
                    _ => None,
                },
                _ => None,
            },
            sql_ast::Expr::Nested(inner) => return self.operand(inner),
            _ => None,
        };
        literal
            .map(Operand::Literal)
            .ok_or_else(|| unsupported(expr))
    }
}
