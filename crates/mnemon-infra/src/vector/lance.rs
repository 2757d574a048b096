//! LanceDB connection wrapper and table lifecycle helpers.

use std::path::Path;
use std::sync::Arc;

use lancedb::{Connection, Table};

use mnemon_types::error::RepositoryError;

use super::schema::{memory_schema, MEMORIES_TABLE};

/// Wraps a `lancedb::Connection` with the memories-table lifecycle.
pub struct LanceStore {
    conn: Connection,
    dimension: usize,
}

impl LanceStore {
    /// Open (or create) a LanceDB database rooted at `dir`.
    pub async fn connect(dir: &Path, dimension: usize) -> Result<Self, RepositoryError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to create vector dir: {e}")))?;
        let uri = dir
            .to_str()
            .ok_or_else(|| RepositoryError::Query("non-UTF-8 vector dir path".to_string()))?;
        let conn = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to connect lancedb: {e}")))?;
        Ok(Self { conn, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn table_exists(&self) -> Result<bool, RepositoryError> {
        let names = self
            .conn
            .table_names()
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to list tables: {e}")))?;
        Ok(names.iter().any(|n| n == MEMORIES_TABLE))
    }

    /// Open the memories table, creating it on first use.
    pub async fn ensure_memories_table(&self) -> Result<Table, RepositoryError> {
        if self.table_exists().await? {
            return self
                .conn
                .open_table(MEMORIES_TABLE)
                .execute()
                .await
                .map_err(|e| RepositoryError::Query(format!("failed to open table: {e}")));
        }

        let schema = Arc::new(memory_schema(self.dimension as i32));
        match self
            .conn
            .create_empty_table(MEMORIES_TABLE, schema)
            .execute()
            .await
        {
            Ok(table) => Ok(table),
            // Lost a creation race; open whatever won.
            Err(_) => self
                .conn
                .open_table(MEMORIES_TABLE)
                .execute()
                .await
                .map_err(|e| RepositoryError::Query(format!("failed to open table: {e}"))),
        }
    }
}
