//! Arrow schema for the LanceDB memories table.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for
//! lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// The single shared memories table, filtered by `user_id` at query time.
pub const MEMORIES_TABLE: &str = "memories";

/// Schema for the memories table.
///
/// The vector column width is the configured embedding dimension; every
/// stored embedding must match it exactly.
pub fn memory_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("prev_content", DataType::Utf8, true),
        Field::new("category", DataType::Utf8, false),
        Field::new("importance", DataType::Float32, false),
        Field::new("confidence", DataType::Float32, false),
        Field::new("action", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("updated_at", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_schema_has_expected_fields() {
        let schema = memory_schema(1536);
        assert_eq!(schema.fields().len(), 11);
        assert!(schema.field_with_name("id").is_ok());
        assert!(schema.field_with_name("user_id").is_ok());
        assert!(schema.field_with_name("prev_content").is_ok());
        assert!(schema.field_with_name("vector").is_ok());

        assert!(schema.field_with_name("prev_content").unwrap().is_nullable());

        let vector_field = schema.field_with_name("vector").unwrap();
        match vector_field.data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, 1536),
            other => panic!("expected FixedSizeList, got {other:?}"),
        }
    }

    #[test]
    fn test_memory_schema_dimension_is_parameterized() {
        let schema = memory_schema(32);
        match schema.field_with_name("vector").unwrap().data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, 32),
            other => panic!("expected FixedSizeList, got {other:?}"),
        }
    }
}
