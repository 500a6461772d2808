//! [`IscApi`] over the vendor client library (`fbclient`).
//!
//! Descriptors are marshalled into the C `XSQLDA` layout for the duration of each call.
//! Output and input slots point straight into the buffers owned by [`crate::ibase::Xsqlvar`], so a
//! fetch writes its row in place.
#![allow(unsafe_code)]

use std::ffi::{CString, c_char, c_int, c_short, c_uint, c_ushort};
use std::mem::size_of;
use std::ptr::addr_of_mut;

use tracing::trace;

use crate::ibase::{
    BlobHandle, DbHandle, ISC_ARG_GDS, ISC_ARG_NUMBER, ISC_DSQL_ERROR, ISC_DSQL_SQLDA_ERR,
    ISC_TOKEN_ERR, IscApi, IscStatus, QuadId, SQLDA_VERSION1, StatusVector, StmtHandle, TrHandle,
    Xsqlda,
};

const NAME_LENGTH: usize = 32;
const MESSAGE_BUFFER: usize = 1024;

#[repr(C)]
#[derive(Clone, Copy)]
struct RawXsqlvar {
    sqltype: c_short,
    sqlscale: c_short,
    sqlsubtype: c_short,
    sqllen: c_short,
    sqldata: *mut c_char,
    sqlind: *mut c_short,
    sqlname_length: c_short,
    sqlname: [c_char; NAME_LENGTH],
    relname_length: c_short,
    relname: [c_char; NAME_LENGTH],
    ownname_length: c_short,
    ownname: [c_char; NAME_LENGTH],
    aliasname_length: c_short,
    aliasname: [c_char; NAME_LENGTH],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawXsqlda {
    version: c_short,
    sqldaid: [c_char; 8],
    sqldabc: c_int,
    sqln: c_short,
    sqld: c_short,
    sqlvar: [RawXsqlvar; 1],
}

/// C `ISC_QUAD`; rows carry it as eight bytes in native order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IscQuad {
    high: i32,
    low: u32,
}

impl From<&QuadId> for IscQuad {
    fn from(id: &QuadId) -> Self {
        Self {
            high: i32::from_ne_bytes([id[0], id[1], id[2], id[3]]),
            low: u32::from_ne_bytes([id[4], id[5], id[6], id[7]]),
        }
    }
}

impl From<IscQuad> for QuadId {
    fn from(quad: IscQuad) -> Self {
        let mut id = [0; 8];
        id[..4].copy_from_slice(&quad.high.to_ne_bytes());
        id[4..].copy_from_slice(&quad.low.to_ne_bytes());
        id
    }
}

#[link(name = "fbclient")]
unsafe extern "C" {
    fn isc_attach_database(
        status: *mut IscStatus,
        name_length: c_short,
        name: *const c_char,
        db: *mut DbHandle,
        dpb_length: c_short,
        dpb: *const c_char,
    ) -> IscStatus;
    fn isc_detach_database(status: *mut IscStatus, db: *mut DbHandle) -> IscStatus;
    fn isc_create_database(
        status: *mut IscStatus,
        name_length: c_short,
        name: *const c_char,
        db: *mut DbHandle,
        dpb_length: c_short,
        dpb: *const c_char,
        db_type: c_short,
    ) -> IscStatus;
    fn isc_drop_database(status: *mut IscStatus, db: *mut DbHandle) -> IscStatus;
    fn isc_start_transaction(
        status: *mut IscStatus,
        tr: *mut TrHandle,
        count: c_short,
        ...
    ) -> IscStatus;
    fn isc_commit_transaction(status: *mut IscStatus, tr: *mut TrHandle) -> IscStatus;
    fn isc_commit_retaining(status: *mut IscStatus, tr: *mut TrHandle) -> IscStatus;
    fn isc_rollback_transaction(status: *mut IscStatus, tr: *mut TrHandle) -> IscStatus;
    fn isc_rollback_retaining(status: *mut IscStatus, tr: *mut TrHandle) -> IscStatus;
    fn isc_dsql_allocate_statement(
        status: *mut IscStatus,
        db: *mut DbHandle,
        stmt: *mut StmtHandle,
    ) -> IscStatus;
    fn isc_dsql_prepare(
        status: *mut IscStatus,
        tr: *mut TrHandle,
        stmt: *mut StmtHandle,
        length: c_ushort,
        sql: *const c_char,
        dialect: c_ushort,
        out: *mut RawXsqlda,
    ) -> IscStatus;
    fn isc_dsql_describe(
        status: *mut IscStatus,
        stmt: *mut StmtHandle,
        version: c_ushort,
        out: *mut RawXsqlda,
    ) -> IscStatus;
    fn isc_dsql_describe_bind(
        status: *mut IscStatus,
        stmt: *mut StmtHandle,
        version: c_ushort,
        input: *mut RawXsqlda,
    ) -> IscStatus;
    fn isc_dsql_execute(
        status: *mut IscStatus,
        tr: *mut TrHandle,
        stmt: *mut StmtHandle,
        version: c_ushort,
        input: *const RawXsqlda,
    ) -> IscStatus;
    fn isc_dsql_execute_immediate(
        status: *mut IscStatus,
        db: *mut DbHandle,
        tr: *mut TrHandle,
        length: c_ushort,
        sql: *const c_char,
        dialect: c_ushort,
        input: *const RawXsqlda,
    ) -> IscStatus;
    fn isc_dsql_fetch(
        status: *mut IscStatus,
        stmt: *mut StmtHandle,
        version: c_ushort,
        out: *const RawXsqlda,
    ) -> IscStatus;
    fn isc_dsql_free_statement(
        status: *mut IscStatus,
        stmt: *mut StmtHandle,
        option: c_ushort,
    ) -> IscStatus;
    fn isc_create_blob(
        status: *mut IscStatus,
        db: *mut DbHandle,
        tr: *mut TrHandle,
        blob: *mut BlobHandle,
        id: *mut IscQuad,
    ) -> IscStatus;
    fn isc_open_blob(
        status: *mut IscStatus,
        db: *mut DbHandle,
        tr: *mut TrHandle,
        blob: *mut BlobHandle,
        id: *mut IscQuad,
    ) -> IscStatus;
    fn isc_put_segment(
        status: *mut IscStatus,
        blob: *mut BlobHandle,
        length: c_ushort,
        segment: *const c_char,
    ) -> IscStatus;
    fn isc_get_segment(
        status: *mut IscStatus,
        blob: *mut BlobHandle,
        actual: *mut c_ushort,
        length: c_ushort,
        buffer: *mut c_char,
    ) -> IscStatus;
    fn isc_close_blob(status: *mut IscStatus, blob: *mut BlobHandle) -> IscStatus;
    fn isc_sqlcode(status: *const IscStatus) -> c_int;
    fn fb_interpret(buffer: *mut c_char, length: c_uint, status: *mut *const IscStatus) -> c_int;
}

/// C `XSQLDA` with room for `sqln` slots, backed by owned memory.
struct RawDescriptor {
    blocks: Vec<RawXsqlda>,
    sqln: usize,
}

impl RawDescriptor {
    fn new(sqln: i16) -> Self {
        let sqln = sqln.max(1);
        let slots = usize::try_from(sqln).unwrap_or(1);
        let bytes = size_of::<RawXsqlda>() + (slots - 1) * size_of::<RawXsqlvar>();
        // SAFETY: every field is an integer, an integer array or a raw pointer.
        let zeroed: RawXsqlda = unsafe { std::mem::zeroed() };
        let mut raw = Self {
            blocks: vec![zeroed; bytes.div_ceil(size_of::<RawXsqlda>())],
            sqln: slots,
        };
        raw.blocks[0].version = SQLDA_VERSION1;
        raw.blocks[0].sqln = sqln;
        raw
    }

    /// Shape-only copy of a descriptor, for describe calls.
    fn shaped(da: &Xsqlda) -> Self {
        let mut raw = Self::new(da.sqln);
        raw.blocks[0].sqld = da.sqld;
        for (slot, var) in raw.vars_mut().iter_mut().zip(&da.sqlvar) {
            slot.sqltype = var.sqltype;
            slot.sqlscale = var.sqlscale;
            slot.sqlsubtype = var.sqlsubtype;
            slot.sqllen = var.sqllen;
        }
        raw
    }

    fn vars_mut(&mut self) -> &mut [RawXsqlvar] {
        let first = self.blocks.as_mut_ptr();
        // SAFETY: the blocks were sized for the header followed by `sqln` contiguous
        // slots, starting at the header's `sqlvar` field.
        unsafe {
            let vars = addr_of_mut!((*first).sqlvar).cast::<RawXsqlvar>();
            std::slice::from_raw_parts_mut(vars, self.sqln)
        }
    }

    fn as_mut_ptr(&mut self) -> *mut RawXsqlda {
        self.blocks.as_mut_ptr()
    }

    /// Copy the reported count and slot shapes back into `da`.
    fn describe_into(&mut self, da: &mut Xsqlda) {
        da.sqld = self.blocks[0].sqld;
        for (var, slot) in da.sqlvar.iter_mut().zip(self.vars_mut().iter()) {
            var.sqltype = slot.sqltype;
            var.sqlscale = slot.sqlscale;
            var.sqlsubtype = slot.sqlsubtype;
            var.sqllen = slot.sqllen;
            var.sqlname = name(&slot.sqlname, slot.sqlname_length);
            var.relname = name(&slot.relname, slot.relname_length);
            var.ownname = name(&slot.ownname, slot.ownname_length);
            var.aliasname = name(&slot.aliasname, slot.aliasname_length);
        }
    }
}

fn name(bytes: &[c_char; NAME_LENGTH], len: c_short) -> String {
    let len = usize::try_from(len).unwrap_or(0).min(NAME_LENGTH);
    let bytes: Vec<u8> = bytes[..len].iter().map(|&c| c.to_ne_bytes()[0]).collect();
    String::from_utf8_lossy(&bytes).trim_end().to_string()
}

/// Slot buffers are too small for the declared shape.
fn undersized(status: &mut StatusVector) -> IscStatus {
    status.set(&[ISC_ARG_GDS, ISC_DSQL_ERROR, ISC_ARG_GDS, ISC_DSQL_SQLDA_ERR]);
    ISC_DSQL_ERROR
}

/// Text argument with an interior NUL, reported as an unknown token at `position`.
fn embedded_nul(status: &mut StatusVector, position: usize) -> IscStatus {
    let column = IscStatus::try_from(position + 1).unwrap_or(IscStatus::MAX);
    status.set(&[
        ISC_ARG_GDS,
        ISC_DSQL_ERROR,
        ISC_ARG_GDS,
        ISC_TOKEN_ERR,
        ISC_ARG_NUMBER,
        1,
        ISC_ARG_NUMBER,
        column,
    ]);
    ISC_DSQL_ERROR
}

fn status_ptr(status: &mut StatusVector) -> *mut IscStatus {
    status.as_mut_slice().as_mut_ptr()
}

/// Descriptor version as the C API expects it.
fn da_version() -> c_ushort {
    c_ushort::try_from(SQLDA_VERSION1).unwrap_or(1)
}

/// Client for the dynamically linked `fbclient` library.
#[derive(Debug, Default)]
pub struct NativeIsc {
    _private: (),
}

impl NativeIsc {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IscApi for NativeIsc {
    fn attach_database(
        &mut self,
        status: &mut StatusVector,
        endpoint: &str,
        db: &mut DbHandle,
        dpb: &[u8],
    ) -> IscStatus {
        let name = match CString::new(endpoint) {
            Ok(name) => name,
            Err(e) => return embedded_nul(status, e.nul_position()),
        };
        let Ok(dpb_len) = c_short::try_from(dpb.len()) else {
            return undersized(status);
        };
        trace!(endpoint, "isc_attach_database");
        // SAFETY: all pointers are valid for the duration of the call; name is NUL
        // terminated and dpb_len matches the buffer.
        unsafe {
            isc_attach_database(
                status_ptr(status),
                0,
                name.as_ptr(),
                db,
                dpb_len,
                dpb.as_ptr().cast(),
            )
        }
    }

    fn detach_database(&mut self, status: &mut StatusVector, db: &mut DbHandle) -> IscStatus {
        // SAFETY: status and handle outlive the call.
        unsafe { isc_detach_database(status_ptr(status), db) }
    }

    fn create_database(
        &mut self,
        status: &mut StatusVector,
        endpoint: &str,
        db: &mut DbHandle,
        dpb: &[u8],
    ) -> IscStatus {
        let name = match CString::new(endpoint) {
            Ok(name) => name,
            Err(e) => return embedded_nul(status, e.nul_position()),
        };
        let Ok(dpb_len) = c_short::try_from(dpb.len()) else {
            return undersized(status);
        };
        trace!(endpoint, "isc_create_database");
        // SAFETY: as for attach; the trailing zero selects the default database type.
        unsafe {
            isc_create_database(
                status_ptr(status),
                0,
                name.as_ptr(),
                db,
                dpb_len,
                dpb.as_ptr().cast(),
                0,
            )
        }
    }

    fn drop_database(&mut self, status: &mut StatusVector, db: &mut DbHandle) -> IscStatus {
        // SAFETY: status and handle outlive the call.
        unsafe { isc_drop_database(status_ptr(status), db) }
    }

    fn start_transaction(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        db: &mut DbHandle,
        tpb: &[u8],
    ) -> IscStatus {
        let Ok(tpb_len) = c_int::try_from(tpb.len()) else {
            return undersized(status);
        };
        let db: *mut DbHandle = db;
        // SAFETY: one (handle, length, block) triple follows the count, as the variadic
        // convention requires.
        unsafe {
            isc_start_transaction(
                status_ptr(status),
                tr,
                1,
                db,
                tpb_len,
                tpb.as_ptr().cast::<c_char>(),
            )
        }
    }

    fn commit_transaction(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus {
        // SAFETY: status and handle outlive the call.
        unsafe { isc_commit_transaction(status_ptr(status), tr) }
    }

    fn commit_retaining(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus {
        // SAFETY: status and handle outlive the call.
        unsafe { isc_commit_retaining(status_ptr(status), tr) }
    }

    fn rollback_transaction(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
    ) -> IscStatus {
        // SAFETY: status and handle outlive the call.
        unsafe { isc_rollback_transaction(status_ptr(status), tr) }
    }

    fn rollback_retaining(&mut self, status: &mut StatusVector, tr: &mut TrHandle) -> IscStatus {
        // SAFETY: status and handle outlive the call.
        unsafe { isc_rollback_retaining(status_ptr(status), tr) }
    }

    fn dsql_allocate_statement(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        stmt: &mut StmtHandle,
    ) -> IscStatus {
        // SAFETY: status and handles outlive the call.
        unsafe { isc_dsql_allocate_statement(status_ptr(status), db, stmt) }
    }

    fn dsql_prepare(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        stmt: &mut StmtHandle,
        sql: &[u8],
        dialect: u16,
        out: &mut Xsqlda,
    ) -> IscStatus {
        let text = match CString::new(sql.to_vec()) {
            Ok(text) => text,
            Err(e) => return embedded_nul(status, e.nul_position()),
        };
        let mut raw = RawDescriptor::shaped(out);
        // SAFETY: a zero length means NUL terminated text; raw describes `sqln` slots.
        let ret = unsafe {
            isc_dsql_prepare(
                status_ptr(status),
                tr,
                stmt,
                0,
                text.as_ptr(),
                dialect,
                raw.as_mut_ptr(),
            )
        };
        raw.describe_into(out);
        ret
    }

    fn dsql_describe(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        out: &mut Xsqlda,
    ) -> IscStatus {
        let mut raw = RawDescriptor::shaped(out);
        // SAFETY: raw describes `sqln` slots and outlives the call.
        let ret =
            unsafe { isc_dsql_describe(status_ptr(status), stmt, da_version(), raw.as_mut_ptr()) };
        raw.describe_into(out);
        ret
    }

    fn dsql_describe_bind(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        input: &mut Xsqlda,
    ) -> IscStatus {
        let mut raw = RawDescriptor::shaped(input);
        // SAFETY: raw describes `sqln` slots and outlives the call.
        let ret = unsafe {
            isc_dsql_describe_bind(status_ptr(status), stmt, da_version(), raw.as_mut_ptr())
        };
        raw.describe_into(input);
        ret
    }

    fn dsql_execute(
        &mut self,
        status: &mut StatusVector,
        tr: &mut TrHandle,
        stmt: &mut StmtHandle,
        input: Option<&Xsqlda>,
    ) -> IscStatus {
        let Some(input) = input else {
            // SAFETY: a null descriptor means "no parameters".
            return unsafe {
                isc_dsql_execute(status_ptr(status), tr, stmt, da_version(), std::ptr::null())
            };
        };
        if input.vars().iter().any(|v| v.data.len() < v.buffer_len()) {
            return undersized(status);
        }

        let mut indicators: Vec<c_short> = input.vars().iter().map(|v| v.sqlind).collect();
        let mut raw = RawDescriptor::shaped(input);
        for ((slot, var), ind) in raw
            .vars_mut()
            .iter_mut()
            .zip(input.vars())
            .zip(indicators.iter_mut())
        {
            slot.sqldata = var.data.as_ptr().cast_mut().cast();
            slot.sqlind = ind;
        }
        // SAFETY: every slot points at a buffer of at least its declared length; the
        // library only reads input data.
        unsafe { isc_dsql_execute(status_ptr(status), tr, stmt, da_version(), raw.as_mut_ptr()) }
    }

    fn dsql_execute_immediate(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        sql: &[u8],
        dialect: u16,
    ) -> IscStatus {
        let text = match CString::new(sql.to_vec()) {
            Ok(text) => text,
            Err(e) => return embedded_nul(status, e.nul_position()),
        };
        // SAFETY: NUL terminated text and no parameter descriptor.
        unsafe {
            isc_dsql_execute_immediate(
                status_ptr(status),
                db,
                tr,
                0,
                text.as_ptr(),
                dialect,
                std::ptr::null(),
            )
        }
    }

    fn dsql_fetch(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        out: &mut Xsqlda,
    ) -> IscStatus {
        if out.vars().iter().any(|v| v.data.len() < v.buffer_len()) {
            return undersized(status);
        }
        let mut raw = RawDescriptor::shaped(out);
        for (slot, var) in raw.vars_mut().iter_mut().zip(out.vars_mut()) {
            slot.sqldata = var.data.as_mut_ptr().cast();
            slot.sqlind = &mut var.sqlind;
        }
        // SAFETY: slots point into `out`, which is not touched until the call returns.
        unsafe { isc_dsql_fetch(status_ptr(status), stmt, da_version(), raw.as_mut_ptr()) }
    }

    fn dsql_free_statement(
        &mut self,
        status: &mut StatusVector,
        stmt: &mut StmtHandle,
        option: u16,
    ) -> IscStatus {
        // SAFETY: status and handle outlive the call.
        unsafe { isc_dsql_free_statement(status_ptr(status), stmt, option) }
    }

    fn create_blob(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        blob: &mut BlobHandle,
        id: &mut QuadId,
    ) -> IscStatus {
        let mut quad = IscQuad::default();
        // SAFETY: handles and the quad outlive the call.
        let ret = unsafe { isc_create_blob(status_ptr(status), db, tr, blob, &mut quad) };
        *id = quad.into();
        ret
    }

    fn open_blob(
        &mut self,
        status: &mut StatusVector,
        db: &mut DbHandle,
        tr: &mut TrHandle,
        blob: &mut BlobHandle,
        id: &QuadId,
    ) -> IscStatus {
        let mut quad = IscQuad::from(id);
        // SAFETY: handles and the quad outlive the call; the library only reads the id.
        unsafe { isc_open_blob(status_ptr(status), db, tr, blob, &mut quad) }
    }

    fn put_segment(
        &mut self,
        status: &mut StatusVector,
        blob: &mut BlobHandle,
        segment: &[u8],
    ) -> IscStatus {
        let Ok(len) = c_ushort::try_from(segment.len()) else {
            return undersized(status);
        };
        // SAFETY: len matches the segment, which outlives the call.
        unsafe { isc_put_segment(status_ptr(status), blob, len, segment.as_ptr().cast()) }
    }

    fn get_segment(
        &mut self,
        status: &mut StatusVector,
        blob: &mut BlobHandle,
        buffer: &mut [u8],
        actual: &mut usize,
    ) -> IscStatus {
        let len = c_ushort::try_from(buffer.len()).unwrap_or(c_ushort::MAX);
        let mut read: c_ushort = 0;
        // SAFETY: the library writes at most `len` bytes, which fit in `buffer`.
        let ret = unsafe {
            isc_get_segment(
                status_ptr(status),
                blob,
                &mut read,
                len,
                buffer.as_mut_ptr().cast(),
            )
        };
        *actual = usize::from(read);
        ret
    }

    fn close_blob(&mut self, status: &mut StatusVector, blob: &mut BlobHandle) -> IscStatus {
        // SAFETY: status and handle outlive the call.
        unsafe { isc_close_blob(status_ptr(status), blob) }
    }

    fn sqlcode(&self, status: &StatusVector) -> i32 {
        // SAFETY: the vector is terminated and outlives the call.
        unsafe { isc_sqlcode(status.as_slice().as_ptr()) }
    }

    fn interpret(&self, status: &StatusVector, cursor: &mut usize) -> Option<String> {
        let words = status.as_slice();
        if *cursor >= words.len() {
            return None;
        }
        let mut buffer = vec![0 as c_char; MESSAGE_BUFFER];
        let base = words.as_ptr();
        // SAFETY: cursor is within the vector.
        let mut position = unsafe { base.add(*cursor) };
        // SAFETY: fb_interpret writes at most MESSAGE_BUFFER bytes and advances the
        // pointer within the terminated vector.
        let len = unsafe {
            fb_interpret(
                buffer.as_mut_ptr(),
                c_uint::try_from(MESSAGE_BUFFER).unwrap_or(c_uint::MAX),
                &mut position,
            )
        };
        if len <= 0 {
            return None;
        }
        // SAFETY: both pointers are within the same vector.
        let advanced = unsafe { position.offset_from(base) };
        *cursor = usize::try_from(advanced).unwrap_or(words.len());

        let len = usize::try_from(len).unwrap_or(0).min(MESSAGE_BUFFER);
        let bytes: Vec<u8> = buffer[..len].iter().map(|&c| c.to_ne_bytes()[0]).collect();
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_descriptor_has_room_for_every_slot() {
        let mut raw = RawDescriptor::new(5);
        assert_eq!(raw.vars_mut().len(), 5);
        assert_eq!(raw.blocks[0].sqln, 5);
        let needed = size_of::<RawXsqlda>() + 4 * size_of::<RawXsqlvar>();
        assert!(raw.blocks.len() * size_of::<RawXsqlda>() >= needed);
        raw.vars_mut()[4].sqllen = 9;
        assert_eq!(raw.vars_mut()[4].sqllen, 9);
    }

    #[test]
    fn names_are_trimmed_to_their_length() {
        let mut bytes = [0 as c_char; NAME_LENGTH];
        for (dst, src) in bytes.iter_mut().zip(b"CONV_RATE  ") {
            *dst = c_char::from_ne_bytes([*src]);
        }
        assert_eq!(name(&bytes, 11), "CONV_RATE");
        assert_eq!(name(&bytes, 4), "CONV");
    }

    #[test]
    fn quad_ids_keep_their_bytes() {
        let id: QuadId = [1, 2, 3, 4, 5, 6, 7, 8];
        let quad = IscQuad::from(&id);
        assert_eq!(QuadId::from(quad), id);
        assert_eq!(size_of::<IscQuad>(), 8);
    }

    #[test]
    fn oversized_segments_are_refused_before_the_call() {
        let mut status = StatusVector::new();
        let mut blob = 0;
        let segment = vec![0u8; usize::from(c_ushort::MAX) + 1];
        let ret = NativeIsc::new().put_segment(&mut status, &mut blob, &segment);
        assert_eq!(ret, ISC_DSQL_ERROR);
        assert_eq!(status.as_slice()[3], ISC_DSQL_SQLDA_ERR);
    }

    #[test]
    fn interior_nul_becomes_a_token_error() {
        let mut status = StatusVector::new();
        let mut db = 0;
        let ret = NativeIsc::new().attach_database(&mut status, "bad\0name", &mut db, &[1]);
        assert_eq!(ret, ISC_DSQL_ERROR);
        assert_eq!(status.as_slice()[3], ISC_TOKEN_ERR);
        assert_eq!(status.as_slice()[7], 4);
    }
}
