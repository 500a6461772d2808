use super::consts::{SQL_VARYING, SQLDA_VERSION1};

/// One typed slot of a descriptor: an input parameter or an output column.
///
/// Mirrors `XSQLVAR`, except that the data buffer and the null indicator are owned by
/// the slot instead of being raw pointers into caller memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Xsqlvar {
    /// Type tag; bit 0 set means the slot honours `sqlind`
    pub sqltype: i16,
    /// Decimal scale: the real value is `data * 10^sqlscale`
    pub sqlscale: i16,
    pub sqlsubtype: i16,
    /// Declared byte length (payload only for VARYING slots)
    pub sqllen: i16,
    /// Null indicator, negative means NULL
    pub sqlind: i16,
    pub sqlname: String,
    pub relname: String,
    pub ownname: String,
    pub aliasname: String,
    /// Slot data buffer, sized by [`Xsqlvar::allocate`]
    pub data: Vec<u8>,
}

impl Xsqlvar {
    /// Type tag without the nullable bit.
    #[must_use]
    pub fn base_type(&self) -> i16 {
        self.sqltype & !1
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.sqltype & 1 == 1
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.sqlind < 0
    }

    /// Bytes needed to hold a value of the declared shape.
    ///
    /// VARYING slots carry a two byte length prefix in front of the payload.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        let declared = usize::try_from(self.sqllen).unwrap_or(0);
        if self.base_type() == SQL_VARYING {
            declared + 2
        } else {
            declared
        }
    }

    /// Size the data buffer to the declared length and reset the null indicator.
    pub fn allocate(&mut self) {
        self.data.clear();
        self.data.resize(self.buffer_len(), 0);
        self.sqlind = 0;
    }

    /// Column label: the alias when present, the field name otherwise.
    #[must_use]
    pub fn name(&self) -> &str {
        if self.aliasname.is_empty() {
            &self.sqlname
        } else {
            &self.aliasname
        }
    }
}

/// Ordered list of slots describing a statement's parameters or columns (`XSQLDA`).
///
/// `sqln` is the number of slots the caller allocated, `sqld` the number the server
/// reports. When `sqld > sqln` the server only filled the first `sqln` slots and the
/// descriptor must be reallocated and described again.
#[derive(Debug, Clone, PartialEq)]
pub struct Xsqlda {
    pub version: i16,
    pub sqln: i16,
    pub sqld: i16,
    pub sqlvar: Vec<Xsqlvar>,
}

impl Xsqlda {
    /// Allocate a descriptor with room for `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: i16) -> Self {
        let capacity = capacity.max(1);
        Self {
            version: SQLDA_VERSION1,
            sqln: capacity,
            sqld: 0,
            sqlvar: vec![Xsqlvar::default(); usize::try_from(capacity).unwrap_or(1)],
        }
    }

    /// True when the server reported more slots than were allocated.
    #[must_use]
    pub fn needs_resize(&self) -> bool {
        self.sqld > self.sqln
    }

    /// Number of slots that are both reported and allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(self.sqld.min(self.sqln)).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The reported slots.
    #[must_use]
    pub fn vars(&self) -> &[Xsqlvar] {
        &self.sqlvar[..self.len().min(self.sqlvar.len())]
    }

    pub fn vars_mut(&mut self) -> &mut [Xsqlvar] {
        let len = self.len().min(self.sqlvar.len());
        &mut self.sqlvar[..len]
    }
}

impl Default for Xsqlda {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibase::{SQL_FLOAT, SQL_TEXT};

    #[test]
    fn varying_buffers_reserve_the_length_prefix() {
        let mut var = Xsqlvar {
            sqltype: SQL_VARYING + 1,
            sqllen: 10,
            ..Xsqlvar::default()
        };
        var.allocate();
        assert_eq!(var.data.len(), 12);
        assert!(var.is_nullable());
        assert_eq!(var.base_type(), SQL_VARYING);

        let mut fixed = Xsqlvar {
            sqltype: SQL_TEXT,
            sqllen: 3,
            ..Xsqlvar::default()
        };
        fixed.allocate();
        assert_eq!(fixed.data.len(), 3);
        assert!(!fixed.is_nullable());
    }

    #[test]
    fn descriptor_reports_resize_and_visible_slots() {
        let mut da = Xsqlda::new(2);
        assert_eq!(da.sqlvar.len(), 2);
        da.sqld = 4;
        assert!(da.needs_resize());
        assert_eq!(da.vars().len(), 2);

        da.sqld = 1;
        da.sqlvar[0].sqltype = SQL_FLOAT;
        assert!(!da.needs_resize());
        assert_eq!(da.vars().len(), 1);
        assert_eq!(da.vars()[0].base_type(), SQL_FLOAT);
    }

    #[test]
    fn zero_capacity_still_allocates_one_slot() {
        let da = Xsqlda::new(0);
        assert_eq!(da.sqln, 1);
        assert!(da.is_empty());
    }

    #[test]
    fn alias_wins_over_field_name() {
        let var = Xsqlvar {
            sqlname: "CONV_RATE".into(),
            aliasname: "RATE".into(),
            ..Xsqlvar::default()
        };
        assert_eq!(var.name(), "RATE");
    }
}
