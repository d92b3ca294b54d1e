use super::error::{RecordError, RecordResult};
use super::schema::TableSchema;
use super::value::Value;
use crate::file::PageId;

/// Slot index within a heap page
pub type SlotId = usize;

/// Where a stored tuple lives: page + slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

/// A single tuple, plus its location once it has been stored
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
    rid: Option<RecordId>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    /// Serialize according to `schema`: `[NULL bitmap] [col0 data] [col1 data] ...`
    pub fn serialize(&self, schema: &TableSchema) -> RecordResult<Vec<u8>> {
        schema.validate_record(&self.values)?;

        let mut result = vec![0u8; schema.null_bitmap_size()];
        result.reserve(schema.record_size());

        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                result[i / 8] |= 1 << (i % 8);
            }
        }

        for (value, col) in self.values.iter().zip(schema.columns()) {
            result.extend_from_slice(&value.serialize(&col.data_type)?);
        }

        Ok(result)
    }

    /// Deserialize a tuple that has no location yet
    pub fn deserialize(data: &[u8], schema: &TableSchema) -> RecordResult<Self> {
        if data.len() != schema.record_size() {
            return Err(RecordError::Deserialization(format!(
                "Expected {} bytes, got {}",
                schema.record_size(),
                data.len()
            )));
        }

        let bitmap_size = schema.null_bitmap_size();
        let (bitmap, mut rest) = data.split_at(bitmap_size);

        let mut values = Vec::with_capacity(schema.column_count());
        for (i, col) in schema.columns().iter().enumerate() {
            let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
            let (col_data, tail) = rest.split_at(col.size());
            values.push(Value::deserialize(col_data, &col.data_type, is_null)?);
            rest = tail;
        }

        Ok(Record::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ColumnDef, DataType};

    fn create_test_schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::new("id", DataType::Int, true),
            ColumnDef::new("name", DataType::Char(10), false),
            ColumnDef::new("score", DataType::Float, false),
        ])
    }

    #[test]
    fn test_record_serialization_with_nulls() {
        let schema = create_test_schema();
        let record = Record::new(vec![Value::Int(42), Value::Null, Value::Null]);

        let bytes = record.serialize(&schema).unwrap();
        assert_eq!(bytes.len(), schema.record_size());
        // bits 1 and 2 set
        assert_eq!(bytes[0], 0b0000_0110);

        let restored = Record::deserialize(&bytes, &schema).unwrap();
        assert_eq!(record, restored);
    }

    #[test]
    fn test_deserialize_has_no_location() {
        let schema = create_test_schema();
        let mut record = Record::new(vec![
            Value::Int(1),
            Value::String("x".into()),
            Value::Float(0.5),
        ]);
        let bytes = record.serialize(&schema).unwrap();

        let pid = PageId::new(crate::file::TableId(1), 0);
        record.set_record_id(Some(RecordId::new(pid, 3)));
        let restored = Record::deserialize(&bytes, &schema).unwrap();
        assert_eq!(restored.record_id(), None);
        assert_eq!(restored.values(), record.values());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let schema = create_test_schema();
        let result = Record::deserialize(&[0u8; 3], &schema);
        assert!(matches!(result, Err(RecordError::Deserialization(_))));
    }

    #[test]
    fn test_record_validation_error() {
        let schema = create_test_schema();
        let record = Record::new(vec![Value::Null, Value::Null, Value::Float(1.0)]);
        assert!(record.serialize(&schema).is_err());
    }
}
