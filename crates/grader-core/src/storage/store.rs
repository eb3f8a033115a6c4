use crate::errors::StoreError;
use crate::model::{Evaluation, Question, Response, Rubric};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub type StoreResult<T> = Result<T, StoreError>;

/// SQLite-backed store for questions, rubrics, responses and evaluations.
///
/// The connection is opened on construction and released by [`Store::close`] or when the
/// last clone is dropped. Every operation after `close` fails with [`StoreError::Closed`].
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        tracing::debug!(event = "store.opened", path = ?conn.path());
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Closes the connection. Clones of this store observe the closed state too.
    pub fn close(&self) -> StoreResult<()> {
        let mut guard = self.lock();
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            tracing::debug!(event = "store.closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // --- inserts ---

    pub fn add_question(&self, text: &str) -> StoreResult<String> {
        let id = new_id();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO question(id, question, created_at) VALUES (?1, ?2, ?3)",
                params![id, text, now_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    /// Adds a rubric component under `question_id`. `rubric_index` only orders rubrics.
    pub fn add_rubric(
        &self,
        component: &str,
        question_id: &str,
        rubric_index: i64,
    ) -> StoreResult<String> {
        let id = new_id();
        self.with_conn(|conn| {
            ensure_exists(conn, "question", question_id)?;
            conn.execute(
                "INSERT INTO rubric(id, component, question_id, rubric_index, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, component, question_id, rubric_index, now_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    pub fn add_response(&self, text: &str, question_id: &str) -> StoreResult<String> {
        let id = new_id();
        self.with_conn(|conn| {
            ensure_exists(conn, "question", question_id)?;
            conn.execute(
                "INSERT INTO response(id, response, question_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, text, question_id, now_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    /// Records a verdict. `debug_path` must point to a log written before this call.
    pub fn add_evaluation(
        &self,
        outcome: bool,
        debug_path: &str,
        rubric_id: &str,
        response_id: &str,
    ) -> StoreResult<String> {
        let id = new_id();
        self.with_conn(|conn| {
            ensure_exists(conn, "rubric", rubric_id)?;
            ensure_exists(conn, "response", response_id)?;
            conn.execute(
                "INSERT INTO evaluation(id, evaluation, debug_path, rubric_id, response_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, outcome, debug_path, rubric_id, response_id, now_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    // --- deletes ---

    /// Deletes a question with its rubrics, responses and every evaluation hanging off them.
    pub fn delete_question(&self, question_id: &str) -> StoreResult<()> {
        self.with_tx(|tx| {
            ensure_exists(tx, "question", question_id)?;
            let evaluations = tx.execute(
                "DELETE FROM evaluation
                 WHERE rubric_id IN (SELECT id FROM rubric WHERE question_id = ?1)
                    OR response_id IN (SELECT id FROM response WHERE question_id = ?1)",
                params![question_id],
            )?;
            let rubrics = tx.execute(
                "DELETE FROM rubric WHERE question_id = ?1",
                params![question_id],
            )?;
            let responses = tx.execute(
                "DELETE FROM response WHERE question_id = ?1",
                params![question_id],
            )?;
            tx.execute("DELETE FROM question WHERE id = ?1", params![question_id])?;
            tracing::info!(
                event = "store.question_deleted",
                question_id = %question_id,
                rubrics,
                responses,
                evaluations
            );
            Ok(())
        })
    }

    pub fn delete_rubric(&self, rubric_id: &str) -> StoreResult<()> {
        self.with_tx(|tx| {
            ensure_exists(tx, "rubric", rubric_id)?;
            tx.execute(
                "DELETE FROM evaluation WHERE rubric_id = ?1",
                params![rubric_id],
            )?;
            tx.execute("DELETE FROM rubric WHERE id = ?1", params![rubric_id])?;
            Ok(())
        })
    }

    pub fn delete_response(&self, response_id: &str) -> StoreResult<()> {
        self.with_tx(|tx| {
            ensure_exists(tx, "response", response_id)?;
            tx.execute(
                "DELETE FROM evaluation WHERE response_id = ?1",
                params![response_id],
            )?;
            tx.execute("DELETE FROM response WHERE id = ?1", params![response_id])?;
            Ok(())
        })
    }

    // --- reads ---

    pub fn get_question(&self, id: &str) -> StoreResult<Option<Question>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, question FROM question WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(Question {
                            id: row.get(0)?,
                            text: row.get(1)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn get_rubric(&self, id: &str) -> StoreResult<Option<Rubric>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, component, question_id, rubric_index FROM rubric WHERE id = ?1",
                    params![id],
                    rubric_from_row,
                )
                .optional()?)
        })
    }

    pub fn get_response(&self, id: &str) -> StoreResult<Option<Response>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, response, question_id FROM response WHERE id = ?1",
                    params![id],
                    response_from_row,
                )
                .optional()?)
        })
    }

    pub fn get_evaluation(&self, id: &str) -> StoreResult<Option<Evaluation>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, evaluation, debug_path, rubric_id, response_id
                     FROM evaluation WHERE id = ?1",
                    params![id],
                    evaluation_from_row,
                )
                .optional()?)
        })
    }

    /// Rubrics of a question ordered by `rubric_index`, ties broken by insertion order.
    pub fn rubrics_for_question(&self, question_id: &str) -> StoreResult<Vec<Rubric>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, component, question_id, rubric_index FROM rubric
                 WHERE question_id = ?1
                 ORDER BY rubric_index ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![question_id], rubric_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn responses_for_question(&self, question_id: &str) -> StoreResult<Vec<Response>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, response, question_id FROM response
                 WHERE question_id = ?1
                 ORDER BY rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![question_id], response_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every evaluation recorded for `response_id`, oldest first.
    pub fn get_evaluations_for_response(&self, response_id: &str) -> StoreResult<Vec<Evaluation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, evaluation, debug_path, rubric_id, response_id
                 FROM evaluation
                 WHERE response_id = ?1
                 ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map(params![response_id], evaluation_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_rows(&self, table: &str) -> StoreResult<i64> {
        let table = crate::storage::schema::TABLES
            .iter()
            .find(|t| **t == table)
            .ok_or_else(|| StoreError::not_found("table", table))?;
        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            Ok(conn.query_row(&sql, [], |r| r.get(0))?)
        })
    }
}

fn ensure_exists(conn: &Connection, table: &'static str, id: &str) -> StoreResult<()> {
    // table names come from this module only
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", table);
    let found = conn
        .query_row(&sql, params![id], |_| Ok(()))
        .optional()?
        .is_some();
    if found {
        Ok(())
    } else {
        Err(StoreError::not_found(table, id))
    }
}

fn rubric_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Rubric> {
    Ok(Rubric {
        id: row.get(0)?,
        component: row.get(1)?,
        question_id: row.get(2)?,
        rubric_index: row.get(3)?,
    })
}

fn response_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Response> {
    Ok(Response {
        id: row.get(0)?,
        text: row.get(1)?,
        question_id: row.get(2)?,
    })
}

fn evaluation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evaluation> {
    Ok(Evaluation {
        id: row.get(0)?,
        outcome: row.get(1)?,
        debug_path: row.get(2)?,
        rubric_id: row.get(3)?,
        response_id: row.get(4)?,
    })
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let store = Store::memory().unwrap();
        let a = store.add_question("one").unwrap();
        let b = store.add_question("one").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count_rows("question").unwrap(), 2);
    }

    #[test]
    fn count_rows_rejects_unknown_tables() {
        let store = Store::memory().unwrap();
        let err = store.count_rows("sqlite_master; --").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = Store::memory().unwrap();
        let clone = store.clone();
        store.close().unwrap();
        assert!(clone.is_closed());
        assert!(matches!(clone.add_question("x"), Err(StoreError::Closed)));
        // closing twice is harmless
        store.close().unwrap();
    }
}
