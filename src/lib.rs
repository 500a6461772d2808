//! Safe, blocking wrappers over the InterBase/Firebird native client call convention.
//!
//! The client API is consumed through the [`ibase::IscApi`] trait. The `native` feature
//! links `fbclient`; the default `memory` feature provides an in-process server speaking
//! the same convention.
//!
//! ```rust
//! use isc_binding::memory::{ColumnDef, MemoryServer};
//! use isc_binding::prelude::*;
//!
//! let server = MemoryServer::new();
//! server.create_database("employee");
//! server.create_table(
//!     "employee",
//!     "cross_rate",
//!     vec![
//!         ColumnDef::varchar("from_currency", 10),
//!         ColumnDef::varchar("to_currency", 10),
//!         ColumnDef::float("conv_rate"),
//!     ],
//! )?;
//!
//! let opts = ConnectionOptions::new("localhost:employee", "SYSDBA", "masterkey");
//! let mut conn = Connection::open(server.client(), &opts)?;
//!
//! let mut tr = conn.begin()?;
//! tr.execute(
//!     "insert into cross_rate (from_currency, to_currency, conv_rate) values (?, ?, ?)",
//!     &[Value::from("Dollar"), Value::from("Real"), Value::Float(10.0)],
//! )?;
//! tr.commit()?;
//!
//! let mut tr = conn.begin()?;
//! let rows = tr.query("select conv_rate from cross_rate", &[])?;
//! assert_eq!(rows.rows[0].get("conv_rate").and_then(Value::as_float), Some(10.0));
//! # Ok::<(), IscError>(())
//! ```

pub mod blob;
pub mod charset;
pub mod config;
pub mod connection;
pub mod date_time;
pub mod decode;
pub mod error;
pub mod ibase;
pub mod params;
pub mod prelude;
pub mod results;
pub mod statement;
pub mod status;
pub mod transaction;
pub mod types;

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "native")]
pub mod native;

pub use blob::BlobId;
pub use charset::Charset;
pub use config::{
    AccessMode, ConnectionOptions, ConnectionOptionsBuilder, Dialect, Isolation,
    LockResolution, TransactionOptions,
};
pub use connection::Connection;
pub use error::{IscError, Result};
pub use results::{ResultSet, Row};
pub use statement::{Statement, StatementState};
pub use status::Diagnostics;
pub use transaction::Transaction;
pub use types::{ColumnInfo, SqlType, Value};
