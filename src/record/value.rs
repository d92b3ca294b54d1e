use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{RecordError, RecordResult};

/// Represents a column data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int,         // 4 bytes
    Float,       // 8 bytes
    Char(usize), // n bytes (fixed length)
}

impl DataType {
    /// Get the size in bytes for this data type
    pub fn size(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Float => 8,
            DataType::Char(n) => *n,
        }
    }

    /// Parse a type name as written on the command line: `int`, `float`, `char(n)`
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "int" => Some(DataType::Int),
            "float" => Some(DataType::Float),
            _ => lower
                .strip_prefix("char(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|n| n.parse().ok())
                .filter(|&n: &usize| n > 0)
                .map(DataType::Char),
        }
    }
}

/// Represents a single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    String(String),
    Null,
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Serialize value to exactly `data_type.size()` bytes
    pub fn serialize(&self, data_type: &DataType) -> RecordResult<Vec<u8>> {
        match (self, data_type) {
            (Value::Int(i), DataType::Int) => Ok(i.to_le_bytes().to_vec()),
            (Value::Float(f), DataType::Float) => Ok(f.to_le_bytes().to_vec()),
            (Value::String(s), DataType::Char(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *max_len {
                    return Err(RecordError::Serialization(format!(
                        "String length {} exceeds max length {}",
                        bytes.len(),
                        max_len
                    )));
                }
                let mut result = vec![0u8; *max_len];
                result[..bytes.len()].copy_from_slice(bytes);
                Ok(result)
            }
            (Value::Null, _) => Ok(vec![0u8; data_type.size()]),
            _ => Err(RecordError::TypeMismatch {
                expected: format!("{:?}", data_type),
                actual: format!("{:?}", self),
            }),
        }
    }

    /// Deserialize value from bytes
    pub fn deserialize(bytes: &[u8], data_type: &DataType, is_null: bool) -> RecordResult<Self> {
        if is_null {
            return Ok(Value::Null);
        }

        let width_error = || {
            RecordError::Deserialization(format!(
                "Expected {} bytes for {:?}, got {}",
                data_type.size(),
                data_type,
                bytes.len()
            ))
        };

        match data_type {
            DataType::Int => {
                let buf: [u8; 4] = bytes.try_into().map_err(|_| width_error())?;
                Ok(Value::Int(i32::from_le_bytes(buf)))
            }
            DataType::Float => {
                let buf: [u8; 8] = bytes.try_into().map_err(|_| width_error())?;
                Ok(Value::Float(f64::from_le_bytes(buf)))
            }
            DataType::Char(max_len) => {
                if bytes.len() != *max_len {
                    return Err(width_error());
                }
                // Strings are zero padded
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = String::from_utf8(bytes[..end].to_vec())
                    .map_err(|e| RecordError::Deserialization(format!("Invalid UTF-8: {}", e)))?;
                Ok(Value::String(s))
            }
        }
    }

    /// Parse a literal for a column of the given type. `NULL` is accepted for any type.
    pub fn parse(text: &str, data_type: &DataType) -> RecordResult<Self> {
        if text.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }
        let mismatch = || RecordError::TypeMismatch {
            expected: format!("{:?}", data_type),
            actual: text.to_string(),
        };
        match data_type {
            DataType::Int => text.parse().map(Value::Int).map_err(|_| mismatch()),
            DataType::Float => text.parse().map(Value::Float).map_err(|_| mismatch()),
            DataType::Char(_) => Ok(Value::String(text.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Null => write!(f, "NULL"),
        }
    }
}
