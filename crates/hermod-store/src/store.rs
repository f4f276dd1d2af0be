//! The document store the broker persists intercepted messages into.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use hermod_core::Principal;

use crate::connection::{ConnectionPool, PooledConnection};
use crate::errors::{Result, StoreError};

/// The collections the broker writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    /// Process instance documents.
    Process,
    /// Log and event documents.
    Log,
}

/// Pooled document store over the process and log collections.
///
/// Author attribution: when a document arrives from an external peer the
/// caller passes that peer's authenticated principal, which is stamped as
/// `writtenBy` on log documents and recorded next to process documents.
pub struct DocumentStore {
    pool: ConnectionPool,
}

impl DocumentStore {
    /// Create a store over the given pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Persist a document into a collection, returning its id.
    ///
    /// Documents keep their own `_id` when they carry one; otherwise a
    /// UUID v7 is assigned.
    pub fn persist(
        &self,
        collection: Collection,
        document: &Value,
        author: Option<&Principal>,
    ) -> Result<String> {
        let obj = document
            .as_object()
            .ok_or(StoreError::NotADocument(json_type_name(document)))?;

        let id = obj
            .get("_id")
            .and_then(Value::as_str)
            .map_or_else(|| Uuid::now_v7().to_string(), ToOwned::to_owned);
        let schema_ref = obj
            .get("schemaRef")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let written_by = author.map(|p| p.id.clone());
        let created_at = Utc::now().to_rfc3339();
        let body = serde_json::to_string(document)?;

        let conn = self.conn()?;
        match collection {
            Collection::Process => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let _ = conn.execute(
                    "INSERT OR REPLACE INTO process_documents
                        (id, name, schema_ref, written_by, document, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![id, name, schema_ref, written_by, body, created_at],
                )?;
            }
            Collection::Log => {
                let process_id = obj
                    .get("processId")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned);
                let address = obj
                    .get("address")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned);
                let _ = conn.execute(
                    "INSERT INTO log_documents
                        (id, schema_ref, process_id, address, written_by, document, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        id, schema_ref, process_id, address, written_by, body, created_at
                    ],
                )?;
            }
        }

        debug!(collection = ?collection, id, schema_ref, "document persisted");
        Ok(id)
    }

    /// Find a process document by its `name` field.
    pub fn find_process_by_name(&self, name: &str) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT document FROM process_documents WHERE name = ?1 LIMIT 1")?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => {
                let body: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    /// All log documents recorded for a process, oldest first.
    pub fn logs_for_process(&self, process_id: &str) -> Result<Vec<Value>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT document FROM log_documents WHERE process_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([process_id], |row| row.get::<_, String>(0))?;
        let mut documents = Vec::new();
        for body in rows {
            documents.push(serde_json::from_str(&body?)?);
        }
        Ok(documents)
    }

    /// Total number of log documents.
    pub fn count_logs(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM log_documents", [], |row| row.get(0))?)
    }

    /// Total number of process documents.
    pub fn count_processes(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM process_documents", [], |row| row.get(0))?)
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{new_in_memory, ConnectionConfig};
    use crate::migrations::run_migrations;
    use serde_json::json;

    fn make_store() -> DocumentStore {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        run_migrations(&pool.get().unwrap()).unwrap();
        DocumentStore::new(pool)
    }

    #[test]
    fn persist_process_and_find_by_name() {
        let store = make_store();
        let doc = json!({
            "schemaRef": "ref://hermod.process.system",
            "_id": "proc_1",
            "name": "Test_process_name",
        });
        let id = store.persist(Collection::Process, &doc, None).unwrap();
        assert_eq!(id, "proc_1");

        let found = store.find_process_by_name("Test_process_name").unwrap().unwrap();
        assert_eq!(found["_id"], "proc_1");
        assert!(store.find_process_by_name("absent").unwrap().is_none());
    }

    #[test]
    fn persist_log_attributes_author() {
        let store = make_store();
        let author = Principal::new("user_1", "alice");
        let doc = json!({
            "schemaRef": "ref://hermod.log.process_state",
            "processId": "proc_1",
            "writtenBy": "user_1",
            "state": "running",
        });
        let _ = store.persist(Collection::Log, &doc, Some(&author)).unwrap();

        let logs = store.logs_for_process("proc_1").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["writtenBy"], "user_1");
    }

    #[test]
    fn documents_without_id_get_one() {
        let store = make_store();
        let doc = json!({"schemaRef": "ref://hermod.log.progression", "text": "hello"});
        let id = store.persist(Collection::Log, &doc, None).unwrap();
        assert!(!id.is_empty());
        assert_eq!(store.count_logs().unwrap(), 1);
    }

    #[test]
    fn persist_rejects_non_objects() {
        let store = make_store();
        let err = store.persist(Collection::Log, &json!([1, 2]), None).unwrap_err();
        assert!(matches!(err, StoreError::NotADocument("array")));
    }

    #[test]
    fn process_documents_replace_on_same_id() {
        let store = make_store();
        let first = json!({"_id": "proc_9", "name": "before", "schemaRef": "ref://hermod.process.system"});
        let second = json!({"_id": "proc_9", "name": "after", "schemaRef": "ref://hermod.process.system"});
        let _ = store.persist(Collection::Process, &first, None).unwrap();
        let _ = store.persist(Collection::Process, &second, None).unwrap();
        assert_eq!(store.count_processes().unwrap(), 1);
        assert!(store.find_process_by_name("after").unwrap().is_some());
    }

    #[test]
    fn logs_for_process_are_ordered_oldest_first() {
        let store = make_store();
        for i in 0..3 {
            let doc = json!({
                "schemaRef": "ref://hermod.log.progression",
                "processId": "proc_2",
                "seq": i,
            });
            let _ = store.persist(Collection::Log, &doc, None).unwrap();
        }
        let logs = store.logs_for_process("proc_2").unwrap();
        let seqs: Vec<i64> = logs.iter().map(|l| l["seq"].as_i64().unwrap()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
