//! Blob contents.
//!
//! A row only stores the 8-byte id of a blob. Contents move through their own calls:
//! `create_blob` then `put_segment` per chunk then `close_blob` to write, `open_blob` then
//! `get_segment` until end of blob then `close_blob` to read. Both run inside the
//! transaction that owns the row.

use tracing::{trace, warn};

use crate::connection::Connection;
use crate::error::{IscError, Result};
use crate::ibase::{
    BlobHandle, ISC_SEGMENT, ISC_SEGSTR_EOF, IscApi, MAX_SEGMENT_LENGTH, QuadId,
};
use crate::transaction::Transaction;

/// Id of a stored blob, as carried in a row slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub QuadId);

impl BlobId {
    /// Read an id out of a slot buffer; `None` unless it holds exactly eight bytes.
    #[must_use]
    pub fn from_slot(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(BlobId)
    }
}

impl<A: IscApi> Transaction<'_, A> {
    /// Store `data` as a new blob.
    ///
    /// # Arguments
    /// * `data` - the contents, already encoded; written in segments of at most
    ///   [`MAX_SEGMENT_LENGTH`] bytes.
    ///
    /// # Returns
    /// The id of the closed blob. It is only meaningful once bound into a row of this
    /// transaction.
    ///
    /// # Errors
    /// Returns [`IscError::Blob`] with the diagnostics of the first call that fails.
    pub fn write_blob(&mut self, data: &[u8]) -> Result<BlobId> {
        let mut tr = self.handle();
        let conn = self.conn_mut();
        let mut db = conn.db_handle().map_err(IscError::Blob)?;
        let mut blob: BlobHandle = 0;
        let mut id: QuadId = [0; 8];
        conn.call("create_blob", |api, status| {
            api.create_blob(status, &mut db, &mut tr, &mut blob, &mut id)
        })
        .map_err(IscError::Blob)?;

        for segment in data.chunks(MAX_SEGMENT_LENGTH) {
            if let Err(diag) = conn.call("put_segment", |api, status| {
                api.put_segment(status, &mut blob, segment)
            }) {
                close_quietly(conn, &mut blob);
                return Err(IscError::Blob(diag));
            }
        }

        conn.call("close_blob", |api, status| api.close_blob(status, &mut blob))
            .map_err(IscError::Blob)?;
        trace!(bytes = data.len(), "blob written");
        Ok(BlobId(id))
    }

    /// Read the whole contents of a blob.
    ///
    /// # Errors
    /// Returns [`IscError::Blob`] when the id is unknown to this transaction or a
    /// segment read fails.
    pub fn read_blob(&mut self, id: BlobId) -> Result<Vec<u8>> {
        let mut tr = self.handle();
        let conn = self.conn_mut();
        let mut db = conn.db_handle().map_err(IscError::Blob)?;
        let mut blob: BlobHandle = 0;
        conn.call("open_blob", |api, status| {
            api.open_blob(status, &mut db, &mut tr, &mut blob, &id.0)
        })
        .map_err(IscError::Blob)?;

        let mut data = Vec::new();
        let mut buffer = vec![0u8; MAX_SEGMENT_LENGTH];
        loop {
            let mut actual = 0usize;
            let step = conn.call_allowing(
                "get_segment",
                &[ISC_SEGMENT, ISC_SEGSTR_EOF],
                |api, status| api.get_segment(status, &mut blob, &mut buffer, &mut actual),
            );
            match step {
                Ok(code) => {
                    data.extend_from_slice(&buffer[..actual.min(buffer.len())]);
                    if code == ISC_SEGSTR_EOF {
                        break;
                    }
                }
                Err(diag) => {
                    close_quietly(conn, &mut blob);
                    return Err(IscError::Blob(diag));
                }
            }
        }

        conn.call("close_blob", |api, status| api.close_blob(status, &mut blob))
            .map_err(IscError::Blob)?;
        trace!(bytes = data.len(), "blob read");
        Ok(data)
    }
}

fn close_quietly<A: IscApi>(conn: &mut Connection<A>, blob: &mut BlobHandle) {
    if let Err(diag) = conn.call("close_blob", |api, status| api.close_blob(status, blob)) {
        warn!(error = %diag, "blob close after failure also failed");
    }
}
