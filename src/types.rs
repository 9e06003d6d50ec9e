//! Type Mapper: polars column types to SQL column types.
//!
//! A column's polars [`DataType`] is first reduced to a [`TypeTag`], and the
//! tag is then looked up in the dialect's static [`TypeMap`]. Tags with no
//! entry fall back to the dialect's text type so an unusual column type never
//! aborts an upload on its own.

use polars::prelude::DataType;
use std::fmt;

/// Semantic column type, independent of any SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Float64,
    Float32,
    Int64,
    Int32,
    Int16,
    Int8,
    UInt64,
    UInt32,
    UInt16,
    UInt8,
    Boolean,
    Text,
    Date,
    Timestamp,
    TimestampTz,
    Time,
    Duration,
    Binary,
    /// Anything polars can hold that has no dedicated tag (lists, structs, nulls, ...).
    Other,
}

impl TypeTag {
    pub fn from_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Float64 => Self::Float64,
            DataType::Float32 => Self::Float32,
            DataType::Int64 => Self::Int64,
            DataType::Int32 => Self::Int32,
            DataType::Int16 => Self::Int16,
            DataType::Int8 => Self::Int8,
            DataType::UInt64 => Self::UInt64,
            DataType::UInt32 => Self::UInt32,
            DataType::UInt16 => Self::UInt16,
            DataType::UInt8 => Self::UInt8,
            DataType::Boolean => Self::Boolean,
            DataType::String => Self::Text,
            DataType::Date => Self::Date,
            DataType::Datetime(_, Some(_)) => Self::TimestampTz,
            DataType::Datetime(_, None) => Self::Timestamp,
            DataType::Time => Self::Time,
            DataType::Duration(_) => Self::Duration,
            DataType::Binary => Self::Binary,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Float32 => "float32",
            Self::Int64 => "int64",
            Self::Int32 => "int32",
            Self::Int16 => "int16",
            Self::Int8 => "int8",
            Self::UInt64 => "uint64",
            Self::UInt32 => "uint32",
            Self::UInt16 => "uint16",
            Self::UInt8 => "uint8",
            Self::Boolean => "bool",
            Self::Text => "text",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::TimestampTz => "timestamptz",
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Binary => "binary",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static mapping table for one dialect.
///
/// `default_text` is mandatory: it is what every unmapped tag becomes.
#[derive(Debug)]
pub struct TypeMap {
    entries: &'static [(TypeTag, &'static str)],
    default_text: &'static str,
}

impl TypeMap {
    /// The explicit entry for `tag`, if the dialect has one.
    pub fn lookup(&self, tag: TypeTag) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, sql)| *sql)
    }

    /// SQL type for `tag`, falling back to the dialect's text type.
    pub fn sql_type(&self, tag: TypeTag) -> &'static str {
        self.lookup(tag).unwrap_or(self.default_text)
    }

    pub fn default_text(&self) -> &'static str {
        self.default_text
    }
}

// Unsigned 64-bit values do not fit BIGINT and durations have no lossless
// CSV form for INTERVAL, so both are left to the text fallback.
pub static POSTGRES_TYPES: TypeMap = TypeMap {
    entries: &[
        (TypeTag::Float64, "DOUBLE PRECISION"),
        (TypeTag::Float32, "REAL"),
        (TypeTag::Int64, "BIGINT"),
        (TypeTag::Int32, "INT"),
        (TypeTag::Int16, "SMALLINT"),
        (TypeTag::Int8, "SMALLINT"),
        (TypeTag::UInt32, "BIGINT"),
        (TypeTag::UInt16, "INT"),
        (TypeTag::UInt8, "SMALLINT"),
        (TypeTag::Boolean, "BOOLEAN"),
        (TypeTag::Text, "TEXT"),
        (TypeTag::Date, "DATE"),
        (TypeTag::Timestamp, "TIMESTAMP"),
        (TypeTag::TimestampTz, "TIMESTAMPTZ"),
        (TypeTag::Time, "TIME"),
    ],
    default_text: "TEXT",
};
