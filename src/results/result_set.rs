use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::row::{Row, build_index};
use crate::types::{ColumnInfo, Value};

/// Every row of a query, collected in delivery order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    /// Shape of each output column
    pub columns: Vec<ColumnInfo>,
    /// The rows returned by the query
    pub rows: Vec<Row>,
    #[serde(skip)]
    column_names: Arc<Vec<String>>,
    #[serde(skip)]
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Create an empty result set for the given columns.
    #[must_use]
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let cache = Arc::new(build_index(&names));
        Self {
            columns,
            rows: Vec::new(),
            column_names: Arc::new(names),
            column_index_cache: cache,
        }
    }

    /// Column labels shared by all rows
    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        &self.column_names
    }

    /// Append a row of values, sharing this set's labels and index.
    pub fn add_row_values(&mut self, values: Vec<Value>) {
        self.rows.push(Row::with_index(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index_cache),
            values,
        ));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlType;

    #[test]
    fn rows_share_labels() {
        let mut set = ResultSet::new(vec![ColumnInfo {
            name: "CONV_RATE".into(),
            relation: "CROSS_RATE".into(),
            sql_type: SqlType::Float,
            sub_type: 0,
            length: 4,
            scale: 0,
            nullable: true,
        }]);
        set.add_row_values(vec![Value::Float(10.0)]);
        set.add_row_values(vec![Value::Null]);

        assert_eq!(set.len(), 2);
        assert!(Arc::ptr_eq(&set.rows[0].column_names, &set.rows[1].column_names));
        let rates: Vec<Option<f64>> = set
            .iter()
            .map(|r| r.get("conv_rate").and_then(Value::as_float))
            .collect();
        assert_eq!(rates, vec![Some(10.0), None]);
    }
}
