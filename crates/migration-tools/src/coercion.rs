//! Conversion of raw text fields into column-typed values.

use crate::error::{MigrationError, MigrationResult};
use colmigrate_core::{CqlValue, DataTypeTag};

/// Coerce one raw field into the value shape `target` requires.
///
/// Empty text means "unset" for integer and timestamp columns and yields
/// [`CqlValue::Null`]. Timestamps are expected as epoch milliseconds. Text and
/// passthrough columns receive the string unchanged.
pub fn coerce(raw: &str, target: DataTypeTag) -> MigrationResult<CqlValue> {
    if raw.is_empty() && target.is_numeric_like() {
        return Ok(CqlValue::Null);
    }

    let fail = |reason: String| MigrationError::Coercion {
        text: raw.to_string(),
        data_type: target,
        reason,
    };

    match target {
        DataTypeTag::Long | DataTypeTag::Timestamp => raw
            .trim()
            .parse::<i64>()
            .map(CqlValue::Int64)
            .map_err(|e| fail(e.to_string())),
        DataTypeTag::Int32 => raw
            .trim()
            .parse::<i32>()
            .map(CqlValue::Int32)
            .map_err(|e| fail(e.to_string())),
        DataTypeTag::Int16 => raw
            .trim()
            .parse::<i16>()
            .map(CqlValue::Int16)
            .map_err(|e| fail(e.to_string())),
        DataTypeTag::Boolean => {
            let text = raw.trim();
            if text.eq_ignore_ascii_case("true") {
                Ok(CqlValue::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(CqlValue::Bool(false))
            } else {
                Err(fail("expected true or false".to_string()))
            }
        }
        DataTypeTag::Text | DataTypeTag::Other => Ok(CqlValue::Text(raw.to_string())),
    }
}
