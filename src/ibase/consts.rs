//! Numeric constants of the `ibase.h` call convention.

use super::IscStatus;

/// Words in a status vector (`ISC_STATUS_ARRAY`).
pub const ISC_STATUS_LENGTH: usize = 20;

/// `isc_dsql_fetch` return value signalling the end of the result set.
pub const FETCH_END_OF_SET: IscStatus = 100;

/// Descriptor layout version understood by every supported server.
pub const SQLDA_VERSION1: i16 = 1;

/// Largest payload a VARCHAR slot can carry (32 767 minus the length prefix).
pub const MAX_TEXT_LENGTH: usize = 32_765;

/// Largest segment a single `isc_put_segment`/`isc_get_segment` call moves.
pub const MAX_SEGMENT_LENGTH: usize = 16_384;

/// Time values are expressed in units of 1/10 000 second.
pub const ISC_TIME_SECONDS_PRECISION: u32 = 10_000;

// Status vector cluster tags
pub const ISC_ARG_END: IscStatus = 0;
pub const ISC_ARG_GDS: IscStatus = 1;
pub const ISC_ARG_STRING: IscStatus = 2;
pub const ISC_ARG_CSTRING: IscStatus = 3;
pub const ISC_ARG_NUMBER: IscStatus = 4;
pub const ISC_ARG_INTERPRETED: IscStatus = 5;
pub const ISC_ARG_WARNING: IscStatus = 18;
pub const ISC_ARG_SQL_STATE: IscStatus = 19;

// Column / parameter type tags. Bit 0 flags a nullable slot.
pub const SQL_VARYING: i16 = 448;
pub const SQL_TEXT: i16 = 452;
pub const SQL_DOUBLE: i16 = 480;
pub const SQL_FLOAT: i16 = 482;
pub const SQL_LONG: i16 = 496;
pub const SQL_SHORT: i16 = 500;
pub const SQL_TIMESTAMP: i16 = 510;
pub const SQL_BLOB: i16 = 520;
pub const SQL_D_FLOAT: i16 = 530;
pub const SQL_ARRAY: i16 = 540;
pub const SQL_QUAD: i16 = 550;
pub const SQL_TYPE_TIME: i16 = 560;
pub const SQL_TYPE_DATE: i16 = 570;
pub const SQL_INT64: i16 = 580;
pub const SQL_BOOLEAN: i16 = 32_764;
pub const SQL_NULL: i16 = 32_766;

/// `sqlsubtype` of a blob holding text in the connection charset.
pub const BLOB_SUB_TYPE_TEXT: i16 = 1;

// isc_dsql_free_statement options
pub const DSQL_CLOSE: u16 = 1;
pub const DSQL_DROP: u16 = 2;

// Database parameter block
pub const ISC_DPB_VERSION1: u8 = 1;
pub const ISC_DPB_PAGE_SIZE: u8 = 4;
pub const ISC_DPB_USER_NAME: u8 = 28;
pub const ISC_DPB_PASSWORD: u8 = 29;
pub const ISC_DPB_LC_CTYPE: u8 = 48;
pub const ISC_DPB_SQL_ROLE_NAME: u8 = 60;

// Transaction parameter block
pub const ISC_TPB_VERSION3: u8 = 3;
pub const ISC_TPB_CONSISTENCY: u8 = 1;
pub const ISC_TPB_CONCURRENCY: u8 = 2;
pub const ISC_TPB_WAIT: u8 = 6;
pub const ISC_TPB_NOWAIT: u8 = 7;
pub const ISC_TPB_READ: u8 = 8;
pub const ISC_TPB_WRITE: u8 = 9;
pub const ISC_TPB_READ_COMMITTED: u8 = 15;
pub const ISC_TPB_REC_VERSION: u8 = 17;
pub const ISC_TPB_NO_REC_VERSION: u8 = 18;
pub const ISC_TPB_LOCK_TIMEOUT: u8 = 21;

// GDS error codes carried in `ISC_ARG_GDS` clusters
pub const ISC_ARITH_EXCEPT: IscStatus = 335_544_321;
pub const ISC_BAD_DB_HANDLE: IscStatus = 335_544_324;
pub const ISC_BAD_DPB_CONTENT: IscStatus = 335_544_326;
pub const ISC_BAD_SEGSTR_HANDLE: IscStatus = 335_544_328;
pub const ISC_BAD_SEGSTR_ID: IscStatus = 335_544_329;
pub const ISC_BAD_TRANS_HANDLE: IscStatus = 335_544_332;
pub const ISC_CONVERT_ERROR: IscStatus = 335_544_334;
pub const ISC_IO_ERROR: IscStatus = 335_544_344;
pub const ISC_NOT_VALID: IscStatus = 335_544_347;
pub const ISC_NO_META_UPDATE: IscStatus = 335_544_351;
pub const ISC_OPEN_TRANS: IscStatus = 335_544_357;
pub const ISC_SEGMENT: IscStatus = 335_544_366;
pub const ISC_SEGSTR_EOF: IscStatus = 335_544_367;
pub const ISC_RANDOM: IscStatus = 335_544_382;
pub const ISC_OBJ_IN_USE: IscStatus = 335_544_453;
pub const ISC_LOGIN: IscStatus = 335_544_472;
pub const ISC_BAD_STMT_HANDLE: IscStatus = 335_544_485;
pub const ISC_TRANSLITERATION_FAILED: IscStatus = 335_544_565;
pub const ISC_DSQL_ERROR: IscStatus = 335_544_569;
pub const ISC_DSQL_CURSOR_ERR: IscStatus = 335_544_572;
pub const ISC_DSQL_CURSOR_OPEN_ERR: IscStatus = 335_544_577;
pub const ISC_DSQL_FIELD_ERR: IscStatus = 335_544_578;
pub const ISC_DSQL_RELATION_ERR: IscStatus = 335_544_580;
pub const ISC_DSQL_SQLDA_ERR: IscStatus = 335_544_583;
pub const ISC_TOKEN_ERR: IscStatus = 335_544_634;
pub const ISC_UNPREPARED_STMT: IscStatus = 335_544_711;
