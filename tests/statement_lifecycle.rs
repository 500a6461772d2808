#![cfg(feature = "memory")]

use isc_binding::memory::{ColumnDef, MemoryServer, Op};
use isc_binding::prelude::*;

fn setup() -> Result<(MemoryServer, ConnectionOptions), IscError> {
    let server = MemoryServer::new();
    server.create_database("rates");
    server.create_table(
        "rates",
        "cross_rate",
        vec![
            ColumnDef::varchar("from_currency", 10).not_null(),
            ColumnDef::varchar("to_currency", 10).not_null(),
            ColumnDef::double("conv_rate"),
            ColumnDef::date("update_date"),
        ],
    )?;
    let opts = ConnectionOptions::new("localhost:rates", "SYSDBA", "masterkey");
    let mut conn = Connection::open(server.client(), &opts)?;
    for to in ["CdnDlr", "FFranc", "Lira"] {
        conn.execute_immediate(&format!(
            "insert into cross_rate (from_currency, to_currency, conv_rate) values ('Dollar', '{to}', 2)"
        ))?;
    }
    conn.close()?;
    Ok((server, opts))
}

fn assert_invalid(err: IscError, op: &str, expected: StatementState) {
    match err {
        IscError::InvalidState { operation, state } => {
            assert_eq!(operation, op);
            assert_eq!(state, expected);
        }
        other => panic!("expected an invalid state error, got {other:?}"),
    }
}

#[test]
fn out_of_order_calls_are_rejected() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = Statement::allocate(&mut tr)?;
        assert_eq!(stmt.state(), StatementState::Allocated);
        assert_invalid(stmt.describe().unwrap_err(), "describe", StatementState::Allocated);
        assert_invalid(stmt.execute().unwrap_err(), "execute", StatementState::Allocated);

        stmt.prepare("select * from cross_rate")?;
        assert_eq!(stmt.sql(), "select * from cross_rate");
        assert_invalid(
            stmt.prepare("select * from cross_rate").unwrap_err(),
            "prepare",
            StatementState::Prepared,
        );
        assert_invalid(stmt.fetch().unwrap_err(), "fetch", StatementState::Prepared);
        assert_invalid(stmt.bind(&[]).unwrap_err(), "bind", StatementState::Prepared);

        stmt.describe()?;
        assert_invalid(stmt.describe().unwrap_err(), "describe", StatementState::Described);
        assert_invalid(stmt.fetch().unwrap_err(), "fetch", StatementState::Described);

        stmt.close()?;
        assert_invalid(stmt.execute().unwrap_err(), "execute", StatementState::Closed);
    }
    tr.commit()?;
    Ok(())
}

#[test]
fn failed_prepare_keeps_the_statement_allocated() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = Statement::allocate(&mut tr)?;
        let err = stmt.prepare("select * from cross_rates").unwrap_err();
        assert!(matches!(err, IscError::Prepare(_)));
        assert_eq!(stmt.state(), StatementState::Allocated);

        stmt.prepare("select * from cross_rate")?;
        assert_eq!(stmt.state(), StatementState::Prepared);
    }
    tr.commit()?;
    Ok(())
}

#[test]
fn fetch_past_the_end_stays_at_the_end() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = tr.prepare("select to_currency from cross_rate")?;
        stmt.describe()?;
        stmt.execute()?;

        let mut seen = Vec::new();
        while let Some(row) = stmt.fetch()? {
            seen.push(row.values[0].to_string());
        }
        assert_eq!(seen, vec!["CdnDlr", "FFranc", "Lira"]);

        let fetches = server.calls(Op::Fetch);
        assert_eq!(fetches, 4);
        assert!(stmt.fetch()?.is_none());
        assert!(stmt.fetch()?.is_none());
        assert_eq!(server.calls(Op::Fetch), fetches);
        stmt.close()?;
    }
    tr.commit()?;
    Ok(())
}

#[test]
fn executing_again_restarts_the_cursor() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = tr.prepare("select to_currency from cross_rate")?;
        stmt.describe()?;
        stmt.execute()?;
        let first = stmt.fetch()?.map(|r| r.values[0].clone());
        assert_eq!(first, Some(Value::from("CdnDlr")));

        stmt.execute()?;
        assert_eq!(stmt.fetch_all()?.len(), 3);

        stmt.execute()?;
        assert_eq!(stmt.fetch_all()?.len(), 3);
        stmt.close()?;
    }
    tr.commit()?;
    Ok(())
}

#[test]
fn parameters_can_be_bound_again() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = tr.prepare("select conv_rate from cross_rate where to_currency = ?")?;
        stmt.describe()?;
        stmt.describe_bind()?;
        assert_eq!(stmt.param_count(), 1);

        stmt.bind(&[Value::from("Lira")])?;
        assert_eq!(stmt.state(), StatementState::Bound);
        stmt.execute()?;
        assert_eq!(stmt.fetch_all()?.len(), 1);

        stmt.bind(&[Value::from("Peso")])?;
        stmt.execute()?;
        assert!(stmt.fetch_all()?.is_empty());
        assert_eq!(stmt.state(), StatementState::Executed);
        stmt.close()?;
    }
    tr.commit()?;
    Ok(())
}

#[test]
fn declared_parameters_must_be_bound() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = tr.prepare("delete from cross_rate where to_currency = ?")?;
        stmt.describe()?;
        stmt.describe_bind()?;
        assert_invalid(stmt.execute().unwrap_err(), "execute", StatementState::Described);

        let err = stmt
            .bind(&[Value::from("Lira"), Value::from("Yen")])
            .unwrap_err();
        assert!(matches!(err, IscError::Bind(_)));
        assert_eq!(err.code(), Some(-804));
        assert_eq!(stmt.state(), StatementState::Described);
    }
    tr.commit()?;
    Ok(())
}

#[test]
fn binding_needs_described_parameters() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = tr.prepare("delete from cross_rate where to_currency = ?")?;
        stmt.describe()?;
        assert_eq!(stmt.param_count(), 0);
        let err = stmt.bind(&[Value::from("Lira")]).unwrap_err();
        assert_eq!(err.code(), Some(-804));
    }
    tr.commit()?;
    Ok(())
}

#[test]
fn statements_without_rows_have_no_result_set() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = tr.prepare("update cross_rate set conv_rate = 3 where to_currency = 'Lira'")?;
        stmt.describe()?;
        stmt.execute()?;
        assert!(matches!(stmt.fetch(), Err(IscError::NoResultSet)));
        stmt.close()?;
    }
    let rows = tr.query(
        "select conv_rate from cross_rate where to_currency = ?",
        &[Value::from("Lira")],
    )?;
    assert_eq!(rows.rows[0].values[0], Value::Float(3.0));
    tr.commit()?;
    Ok(())
}

#[test]
fn closing_twice_reports_an_invalid_handle() -> Result<(), IscError> {
    let (server, opts) = setup()?;
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = tr.prepare("select * from cross_rate")?;
        stmt.close()?;
        let err = stmt.close().unwrap_err();
        assert!(matches!(err, IscError::Close(_)));
        assert!(err.is_invalid_handle());
    }
    assert_eq!(server.calls(Op::FreeStatement), 1);
    tr.commit()?;
    Ok(())
}

#[test]
fn small_descriptors_grow_to_the_column_count() -> Result<(), IscError> {
    let (server, _) = setup()?;
    let opts = ConnectionOptions::builder("localhost:rates")
        .user("sysdba")
        .password("masterkey")
        .initial_columns(1)
        .finish();
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    {
        let mut stmt = tr.prepare("select * from cross_rate")?;
        assert_eq!(server.calls(Op::Describe), 1);
        assert_eq!(stmt.column_count(), 4);

        stmt.describe()?;
        assert_eq!(server.calls(Op::Describe), 2);
        let names: Vec<&str> = stmt.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["FROM_CURRENCY", "TO_CURRENCY", "CONV_RATE", "UPDATE_DATE"]
        );
        stmt.execute()?;
        let rows = stmt.fetch_all()?;
        assert_eq!(rows.rows[2].get("to_currency"), Some(&Value::from("Lira")));
        stmt.close()?;
    }
    tr.commit()?;
    Ok(())
}

#[test]
fn wide_parameter_lists_are_described_in_full() -> Result<(), IscError> {
    let (server, _) = setup()?;
    let opts = ConnectionOptions::builder("localhost:rates")
        .user("SYSDBA")
        .password("masterkey")
        .initial_columns(1)
        .finish();
    let mut conn = Connection::open(server.client(), &opts)?;
    let mut tr = conn.begin()?;
    tr.execute(
        "insert into cross_rate values (?, ?, ?, ?)",
        &[
            Value::from("Euro"),
            Value::from("Real"),
            Value::Float(0.5),
            Value::Null,
        ],
    )?;
    assert_eq!(server.calls(Op::DescribeBind), 2);
    let rows = tr.query("select * from cross_rate where from_currency = 'Euro'", &[])?;
    assert_eq!(rows.len(), 1);
    tr.commit()?;
    Ok(())
}
