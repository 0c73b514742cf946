use super::{Dialect, Rows, SqlExecutor};
use crate::error::Result;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Batch, Connection, Statement};
use std::path::Path;

/// In-process SQLite backend.
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened sqlite database");
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SqlExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&mut self, sql: &str, params: &[String]) -> Result<Option<Rows>> {
        let mut stmt = self.conn.prepare(sql)?;
        run_statement(&mut stmt, params)
    }

    fn run_batch(&mut self, sql: &str) -> Result<Option<Rows>> {
        let mut batch = Batch::new(&self.conn, sql);
        let mut last = None;
        while let Some(mut stmt) = batch.next()? {
            if let Some(rows) = run_statement(&mut stmt, &[])? {
                last = Some(rows);
            }
        }
        Ok(last)
    }
}

fn run_statement(stmt: &mut Statement<'_>, params: &[String]) -> Result<Option<Rows>> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    if columns.is_empty() {
        stmt.execute(params_from_iter(params.iter()))?;
        return Ok(None);
    }
    let width = columns.len();
    let mut values = Vec::new();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(width);
        for i in 0..width {
            record.push(render(row.get_ref(i)?));
        }
        values.push(record);
    }
    Ok(Some(Rows { columns, values }))
}

fn render(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn query_binds_positional_params() {
        let mut exec = SqliteExecutor::in_memory().unwrap();
        exec.run_batch("CREATE TABLE clients (name TEXT); INSERT INTO clients VALUES ('ada'), ('bob');")
            .unwrap();
        let rows = exec
            .query(
                "SELECT name FROM clients WHERE name = ?1",
                &["bob".to_string()],
            )
            .unwrap()
            .unwrap();
        assert_eq!(rows.columns, vec!["name".to_string()]);
        assert_eq!(rows.values, vec![vec!["bob".to_string()]]);
    }

    #[test]
    fn statements_without_result_return_none() {
        let mut exec = SqliteExecutor::in_memory().unwrap();
        assert!(exec.query("CREATE TABLE t (id INTEGER)", &[]).unwrap().is_none());
    }

    #[test]
    fn batch_returns_last_result_set() {
        let mut exec = SqliteExecutor::in_memory().unwrap();
        let rows = exec
            .run_batch("SELECT 1 AS a; SELECT NULL AS b, 2.5 AS c;")
            .unwrap()
            .unwrap();
        assert_eq!(rows.columns, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(rows.values, vec![vec!["NULL".to_string(), "2.5".to_string()]]);
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/db.sqlite3");
        let mut exec = SqliteExecutor::open(&path).unwrap();
        exec.run_batch("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(path.exists());
    }
}
