//! Small helpers for nullable columns

use crate::error::{Error, Result};

pub(crate) fn nullable(text: Option<String>) -> libsql::Value {
    text.map_or(libsql::Value::Null, libsql::Value::Text)
}

pub(crate) fn opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(s) => Ok(Some(s)),
        other => Err(Error::Database(format!(
            "unexpected value in column {idx}: {other:?}"
        ))),
    }
}

pub(crate) fn opt_int(row: &libsql::Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(i) => Ok(Some(i)),
        other => Err(Error::Database(format!(
            "unexpected value in column {idx}: {other:?}"
        ))),
    }
}
