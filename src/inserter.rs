//! Batched multi-row inserts
//!
//! SQLite caps a statement at 999 bound parameters. The inserter buffers
//! rows until a full batch fits under that cap, then issues a single
//! multi-row INSERT. Callers must `flush` once done to write the final
//! partial batch.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::error::Result;

const MAX_PARAMETERS: usize = 999;

pub struct BatchInserter<'conn> {
    conn: &'conn Connection,
    table: &'static str,
    columns: &'static [&'static str],
    rows: Vec<Value>,
    max_rows_per_batch: usize,
}

impl<'conn> BatchInserter<'conn> {
    pub fn new(
        conn: &'conn Connection,
        table: &'static str,
        columns: &'static [&'static str],
    ) -> BatchInserter<'conn> {
        BatchInserter {
            conn,
            table,
            columns,
            rows: Vec::new(),
            max_rows_per_batch: MAX_PARAMETERS / columns.len(),
        }
    }

    /// Queue one row. Flushes automatically when a full batch accumulates.
    pub fn insert(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(rusqlite::Error::InvalidParameterCount(
                values.len(),
                self.columns.len(),
            )
            .into());
        }

        self.rows.extend(values);

        if self.rows.len() / self.columns.len() >= self.max_rows_per_batch {
            self.write()?;
        }
        Ok(())
    }

    /// Write any buffered partial batch.
    pub fn flush(&mut self) -> Result<()> {
        if !self.rows.is_empty() {
            self.write()?;
        }
        Ok(())
    }

    fn write(&mut self) -> Result<()> {
        let row_count = self.rows.len() / self.columns.len();
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        let rows_sql = vec![format!("({})", placeholders); row_count].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            self.columns.join(", "),
            rows_sql
        );

        // Full batches share identical SQL, so the prepared statement cache
        // does the heavy lifting across flushes.
        let mut statement = self.conn.prepare_cached(&sql)?;
        statement.execute(params_from_iter(self.rows.drain(..)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_with_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE pairs (a INTEGER, b TEXT)")
            .unwrap();
        conn
    }

    fn row(a: i64, b: &str) -> Vec<Value> {
        vec![Value::Integer(a), Value::Text(b.to_string())]
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM pairs", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn flush_writes_partial_batch() {
        let conn = open_with_table();
        let mut inserter = BatchInserter::new(&conn, "pairs", &["a", "b"]);

        inserter.insert(row(1, "one")).unwrap();
        inserter.insert(row(2, "two")).unwrap();
        assert_eq!(count(&conn), 0);

        inserter.flush().unwrap();
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn full_batches_flush_automatically() {
        let conn = open_with_table();
        let mut inserter = BatchInserter::new(&conn, "pairs", &["a", "b"]);

        // 999 / 2 columns = 499 rows per batch.
        for i in 0..499 {
            inserter.insert(row(i, "x")).unwrap();
        }
        assert_eq!(count(&conn), 499);

        inserter.insert(row(500, "x")).unwrap();
        inserter.flush().unwrap();
        assert_eq!(count(&conn), 500);
    }

    #[test]
    fn flush_on_empty_buffer_is_a_noop() {
        let conn = open_with_table();
        let mut inserter = BatchInserter::new(&conn, "pairs", &["a", "b"]);
        inserter.flush().unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn rejects_mismatched_row_width() {
        let conn = open_with_table();
        let mut inserter = BatchInserter::new(&conn, "pairs", &["a", "b"]);
        assert!(inserter.insert(vec![Value::Integer(1)]).is_err());
    }
}
