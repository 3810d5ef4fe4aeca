//! Typed values and time-value pairs
//!
//! The atomic unit exchanged between readers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TsError};

/// Data type of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Text,
}

impl DataType {
    /// Canonical name, as written in spill file headers
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Text => "TEXT",
        }
    }

    /// Parse a canonical name back into a data type
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "BOOLEAN" => Ok(DataType::Boolean),
            "INT32" => Ok(DataType::Int32),
            "INT64" => Ok(DataType::Int64),
            "FLOAT" => Ok(DataType::Float),
            "DOUBLE" => Ok(DataType::Double),
            "TEXT" => Ok(DataType::Text),
            other => Err(TsError::UnknownDataType(other.to_string())),
        }
    }

    /// Encoded value width in bytes; `None` for variable-length text
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DataType::Boolean => Some(1),
            DataType::Int32 | DataType::Float => Some(4),
            DataType::Int64 | DataType::Double => Some(8),
            DataType::Text => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single value of one of the supported data types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl TypedValue {
    pub fn data_type(&self) -> DataType {
        match self {
            TypedValue::Boolean(_) => DataType::Boolean,
            TypedValue::Int32(_) => DataType::Int32,
            TypedValue::Int64(_) => DataType::Int64,
            TypedValue::Float(_) => DataType::Float,
            TypedValue::Double(_) => DataType::Double,
            TypedValue::Text(_) => DataType::Text,
        }
    }

    /// Integer view of the value, for the integral types
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Int32(v) => Some(*v as i64),
            TypedValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Error unless this value has the given type
    pub fn expect_type(&self, expected: DataType) -> Result<()> {
        let actual = self.data_type();
        if actual != expected {
            return Err(TsError::TypeMismatch {
                expected: expected.name().to_string(),
                actual: actual.name().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Boolean(v) => write!(f, "{}", v),
            TypedValue::Int32(v) => write!(f, "{}", v),
            TypedValue::Int64(v) => write!(f, "{}", v),
            TypedValue::Float(v) => write!(f, "{}", v),
            TypedValue::Double(v) => write!(f, "{}", v),
            TypedValue::Text(v) => f.write_str(v),
        }
    }
}

/// A timestamped value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeValuePair {
    pub timestamp: i64,
    pub value: TypedValue,
}

impl TimeValuePair {
    pub fn new(timestamp: i64, value: TypedValue) -> Self {
        Self { timestamp, value }
    }
}
