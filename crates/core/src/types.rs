//! Core domain types shared by every migration phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column data types that carry a dedicated coercion or serialization rule.
///
/// Any type without a special rule (uuid, double, collections, ...) is reported as
/// [`DataTypeTag::Other`] and flows through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataTypeTag {
    /// 64-bit signed integer (`bigint`)
    Long,
    /// 32-bit signed integer (`int`)
    Int32,
    /// 16-bit signed integer (`smallint`)
    Int16,
    /// Instant, carried as epoch milliseconds once it leaves the source cluster
    Timestamp,
    /// Boolean
    Boolean,
    /// Text (`text`, `varchar`, `ascii`)
    Text,
    /// Passthrough for every other type
    Other,
}

impl DataTypeTag {
    /// Whether an empty raw field coerces to an absent value for this type.
    pub fn is_numeric_like(self) -> bool {
        matches!(
            self,
            DataTypeTag::Long | DataTypeTag::Int32 | DataTypeTag::Int16 | DataTypeTag::Timestamp
        )
    }
}

impl fmt::Display for DataTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataTypeTag::Long => "bigint",
            DataTypeTag::Int32 => "int",
            DataTypeTag::Int16 => "smallint",
            DataTypeTag::Timestamp => "timestamp",
            DataTypeTag::Boolean => "boolean",
            DataTypeTag::Text => "text",
            DataTypeTag::Other => "other",
        };
        f.write_str(name)
    }
}

/// Column metadata as reported by a catalog lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name, unique within its table
    pub name: String,
    /// Declared data type
    pub data_type: DataTypeTag,
}

impl Column {
    /// Create a column description.
    pub fn new(name: impl Into<String>, data_type: DataTypeTag) -> Self {
        Column {
            name: name.into(),
            data_type,
        }
    }
}

/// A single scalar cell value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CqlValue {
    /// 64-bit integer
    Int64(i64),
    /// 32-bit integer
    Int32(i32),
    /// 16-bit integer
    Int16(i16),
    /// Boolean
    Bool(bool),
    /// Text, also used for passthrough types
    Text(String),
    /// Instant as read from a source cluster
    Timestamp(DateTime<Utc>),
    /// Absent value
    Null,
}

impl CqlValue {
    /// Returns true for [`CqlValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    /// Whether this value may be stored in a column declared as `data_type`.
    ///
    /// `Null` fits every column. `Other` columns accept text passthrough values.
    /// Timestamp columns accept both instants and epoch milliseconds.
    pub fn fits(&self, data_type: DataTypeTag) -> bool {
        match (self, data_type) {
            (CqlValue::Null, _) => true,
            (CqlValue::Int64(_), DataTypeTag::Long | DataTypeTag::Timestamp) => true,
            (CqlValue::Timestamp(_), DataTypeTag::Timestamp) => true,
            (CqlValue::Int32(_), DataTypeTag::Int32) => true,
            (CqlValue::Int16(_), DataTypeTag::Int16) => true,
            (CqlValue::Bool(_), DataTypeTag::Boolean) => true,
            (CqlValue::Text(_), DataTypeTag::Text | DataTypeTag::Other) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CqlValue {
    /// Canonical text form; `Null` renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlValue::Int64(v) => write!(f, "{}", v),
            CqlValue::Int32(v) => write!(f, "{}", v),
            CqlValue::Int16(v) => write!(f, "{}", v),
            CqlValue::Bool(v) => write!(f, "{}", v),
            CqlValue::Text(v) => f.write_str(v),
            CqlValue::Timestamp(v) => write!(f, "{}", v.timestamp_millis()),
            CqlValue::Null => Ok(()),
        }
    }
}

/// One cell of an extracted row, tagged with its column.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Cell value
    pub value: CqlValue,
    /// Name of the column the value came from
    pub column_name: String,
    /// Type the value is serialized as
    pub data_type: DataTypeTag,
}

impl Field {
    /// Create a field.
    pub fn new(value: CqlValue, column_name: impl Into<String>, data_type: DataTypeTag) -> Self {
        Field {
            value,
            column_name: column_name.into(),
            data_type,
        }
    }
}

/// Contact information for one cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    /// Contact point host names or addresses
    pub endpoints: Vec<String>,
    /// Native protocol port
    pub port: u16,
}

impl ClusterEndpoint {
    /// Contact points rendered as `host:port`.
    pub fn contact_points(&self) -> Vec<String> {
        self.endpoints
            .iter()
            .map(|host| format!("{}:{}", host, self.port))
            .collect()
    }
}

/// Rows returned by a query together with the result's column metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    /// Column metadata, in result order
    pub columns: Vec<Column>,
    /// Row values, positionally aligned with `columns`
    pub rows: Vec<Vec<CqlValue>>,
}

impl ResultSet {
    /// Number of rows in the result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
