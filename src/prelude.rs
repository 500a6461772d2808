//! Convenient imports for common functionality.

pub use crate::config::{
    AccessMode, ConnectionOptions, ConnectionOptionsBuilder, Dialect, Isolation,
    LockResolution, TransactionOptions,
};
pub use crate::connection::Connection;
pub use crate::error::IscError;
pub use crate::ibase::IscApi;
pub use crate::results::{ResultSet, Row};
pub use crate::statement::{Statement, StatementState};
pub use crate::status::Diagnostics;
pub use crate::transaction::Transaction;
pub use crate::types::{ColumnInfo, SqlType, Value};
