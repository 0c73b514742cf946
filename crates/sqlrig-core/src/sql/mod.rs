//! SQL execution primitives.
//!
//! Everything above this module talks to the database through the
//! [`SqlExecutor`] trait. Two backends exist: [`sqlite::SqliteExecutor`]
//! (in-process, rusqlite) and [`sqlcmd::SqlcmdExecutor`] (SQL Server via the
//! `sqlcmd` client binary).

pub mod sqlcmd;
pub mod sqlite;

use crate::error::{Result, SqlrigError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

pub use sqlcmd::SqlcmdExecutor;
pub use sqlite::SqliteExecutor;

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Sqlite,
    Mssql,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Mssql => "mssql",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A result set rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rows {
    pub columns: Vec<String>,
    pub values: Vec<Vec<String>>,
}

impl Rows {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Display for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.columns.join(" | "))?;
        for row in &self.values {
            write!(f, "\n{}", row.join(" | "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqlExecutor
// ---------------------------------------------------------------------------

pub trait SqlExecutor {
    fn dialect(&self) -> Dialect;

    /// Run a single statement with positional parameters. Returns the result
    /// set for statements that produce one.
    fn query(&mut self, sql: &str, params: &[String]) -> Result<Option<Rows>>;

    /// Run a script chunk that may hold several statements. Returns the last
    /// result set produced, if any.
    fn run_batch(&mut self, sql: &str) -> Result<Option<Rows>>;
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for Box<T> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query(&mut self, sql: &str, params: &[String]) -> Result<Option<Rows>> {
        (**self).query(sql, params)
    }

    fn run_batch(&mut self, sql: &str) -> Result<Option<Rows>> {
        (**self).run_batch(sql)
    }
}

pub fn execute_query(
    executor: &mut dyn SqlExecutor,
    sql: &str,
    params: &[String],
) -> Result<Option<Rows>> {
    tracing::debug!(dialect = %executor.dialect(), "execute query");
    executor.query(sql, params)
}

/// Run `sql` so that a failure leaves no partial changes behind, then report
/// the failure to the caller.
pub fn execute_try_catch(executor: &mut dyn SqlExecutor, sql: &str) -> Result<()> {
    match executor.dialect() {
        Dialect::Mssql => {
            let guarded = format!(
                "BEGIN TRY\n\
                 BEGIN TRANSACTION;\n\
                 {sql};\n\
                 COMMIT TRANSACTION;\n\
                 END TRY\n\
                 BEGIN CATCH\n\
                 IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION;\n\
                 THROW;\n\
                 END CATCH"
            );
            executor.run_batch(&guarded)?;
            Ok(())
        }
        Dialect::Sqlite => {
            executor.run_batch("SAVEPOINT sqlrig_try")?;
            match executor.run_batch(sql) {
                Ok(_) => {
                    executor.run_batch("RELEASE sqlrig_try")?;
                    Ok(())
                }
                Err(e) => {
                    if let Err(rollback) =
                        executor.run_batch("ROLLBACK TO sqlrig_try; RELEASE sqlrig_try")
                    {
                        tracing::warn!(error = %rollback, "rollback after failed statement failed");
                    }
                    Err(e)
                }
            }
        }
    }
}

/// Execute a script file: decode, substitute `$(NAME)` variables, split into
/// batches for the executor's dialect and run each batch in order.
pub fn execute_from_file(
    executor: &mut dyn SqlExecutor,
    path: &Path,
    variables: &BTreeMap<String, String>,
) -> Result<Vec<Rows>> {
    let script = read_script(path)?;
    let script = substitute_variables(&script, variables);
    let mut results = Vec::new();
    for batch in split_batches(&script, executor.dialect()) {
        if let Some(rows) = executor.run_batch(&batch)? {
            results.push(rows);
        }
    }
    Ok(results)
}

/// Read a script as UTF-8, stripping a UTF-8 byte order mark.
pub fn read_script(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return Err(SqlrigError::InvalidEncoding {
            file: path.to_path_buf(),
        });
    }
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    String::from_utf8(body.to_vec()).map_err(|_| SqlrigError::InvalidEncoding {
        file: path.to_path_buf(),
    })
}

static VARIABLE_RE: OnceLock<Regex> = OnceLock::new();

fn variable_re() -> &'static Regex {
    VARIABLE_RE.get_or_init(|| Regex::new(r"\$\((\w+)\)").unwrap())
}

/// Replace `$(NAME)` with the value of `NAME`. Unknown names are left as-is.
pub fn substitute_variables(script: &str, variables: &BTreeMap<String, String>) -> String {
    if variables.is_empty() {
        return script.to_string();
    }
    variable_re()
        .replace_all(script, |caps: &regex::Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                tracing::debug!(variable = &caps[1], "no value for scripting variable");
                caps[0].to_string()
            }
        })
        .into_owned()
}

static GO_RE: OnceLock<Regex> = OnceLock::new();

fn go_re() -> &'static Regex {
    GO_RE.get_or_init(|| Regex::new(r"(?im)^[ \t]*GO[ \t]*\r?$").unwrap())
}

/// Split a script into the batches the dialect executes separately. Blank
/// batches are dropped.
pub fn split_batches(script: &str, dialect: Dialect) -> Vec<String> {
    let parts: Vec<&str> = match dialect {
        Dialect::Mssql => go_re().split(script).collect(),
        Dialect::Sqlite => vec![script],
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
