use serde::{Deserialize, Serialize};

use super::error::{RecordError, RecordResult};
use super::value::{DataType, Value};

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub not_null: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType, not_null: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null,
        }
    }

    /// Get the size of this column in bytes
    pub fn size(&self) -> usize {
        self.data_type.size()
    }
}

/// Describes the fixed-width tuples stored in one table.
///
/// Serialized tuple layout: `[NULL bitmap] [col0] [col1] ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
    null_bitmap_size: usize,
    record_size: usize,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        let null_bitmap_size = columns.len().div_ceil(8);
        let record_size = null_bitmap_size + columns.iter().map(|c| c.size()).sum::<usize>();

        Self {
            columns,
            null_bitmap_size,
            record_size,
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Find column index by name
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Total serialized tuple size in bytes, NULL bitmap included
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Check that `values` has this schema's shape
    pub fn validate_record(&self, values: &[Value]) -> RecordResult<()> {
        if values.len() != self.columns.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} columns, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        for (value, col) in values.iter().zip(&self.columns) {
            if value.is_null() {
                if col.not_null {
                    return Err(RecordError::NullConstraintViolation(col.name.clone()));
                }
                continue;
            }

            match (&col.data_type, value) {
                (DataType::Char(max_len), Value::String(s)) if s.len() > *max_len => {
                    return Err(RecordError::Serialization(format!(
                        "String length {} exceeds max length {} of column {}",
                        s.len(),
                        max_len,
                        col.name
                    )));
                }
                (DataType::Int, Value::Int(_))
                | (DataType::Float, Value::Float(_))
                | (DataType::Char(_), Value::String(_)) => {}
                (dt, val) => {
                    return Err(RecordError::TypeMismatch {
                        expected: format!("{:?}", dt),
                        actual: format!("{:?}", val),
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse one text literal per column
    pub fn parse_values<S: AsRef<str>>(&self, texts: &[S]) -> RecordResult<Vec<Value>> {
        if texts.len() != self.columns.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} columns, got {}",
                self.columns.len(),
                texts.len()
            )));
        }
        texts
            .iter()
            .zip(&self.columns)
            .map(|(text, col)| Value::parse(text.as_ref(), &col.data_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::new("id", DataType::Int, true),
            ColumnDef::new("name", DataType::Char(20), false),
            ColumnDef::new("score", DataType::Float, false),
        ])
    }

    #[test]
    fn test_schema_sizes() {
        let schema = create_test_schema();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.null_bitmap_size(), 1);
        assert_eq!(schema.record_size(), 1 + 4 + 20 + 8);
    }

    #[test]
    fn test_find_column() {
        let schema = create_test_schema();
        assert_eq!(schema.find_column("name"), Some(1));
        assert_eq!(schema.find_column("nonexistent"), None);
    }

    #[test]
    fn test_validate_record() {
        let schema = create_test_schema();
        let ok = vec![
            Value::Int(1),
            Value::String("Alice".to_string()),
            Value::Float(95.5),
        ];
        assert!(schema.validate_record(&ok).is_ok());

        let nullable = vec![Value::Int(1), Value::Null, Value::Null];
        assert!(schema.validate_record(&nullable).is_ok());
    }

    #[test]
    fn test_validate_record_rejects_bad_shapes() {
        let schema = create_test_schema();

        let not_null = vec![Value::Null, Value::Null, Value::Null];
        assert!(matches!(
            schema.validate_record(&not_null),
            Err(RecordError::NullConstraintViolation(_))
        ));

        let wrong_type = vec![Value::String("x".into()), Value::Null, Value::Null];
        assert!(matches!(
            schema.validate_record(&wrong_type),
            Err(RecordError::TypeMismatch { .. })
        ));

        let too_long = vec![Value::Int(1), Value::String("x".repeat(21)), Value::Null];
        assert!(matches!(
            schema.validate_record(&too_long),
            Err(RecordError::Serialization(_))
        ));

        let short = vec![Value::Int(1)];
        assert!(matches!(
            schema.validate_record(&short),
            Err(RecordError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_parse_values() {
        let schema = create_test_schema();
        let values = schema.parse_values(&["3", "bob", "null"]).unwrap();
        assert_eq!(
            values,
            vec![Value::Int(3), Value::String("bob".into()), Value::Null]
        );
        assert!(schema.parse_values(&["3"]).is_err());
    }
}
