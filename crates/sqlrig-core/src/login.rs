//! Server login (re)creation for SQL Server targets.

use crate::error::{Result, SqlrigError};
use crate::operation::Operation;
use crate::sql::{execute_query, Dialect, SqlExecutor};

const LOGIN_SESSIONS: &str = "SELECT session_id FROM sys.dm_exec_sessions WHERE login_name = ?";
const LOGIN_EXISTS: &str = "SELECT loginname FROM master.dbo.syslogins WHERE name = ?";

/// Fail unless `executor` talks to SQL Server.
pub fn require_mssql(executor: &dyn SqlExecutor) -> Result<()> {
    match executor.dialect() {
        Dialect::Mssql => Ok(()),
        other => Err(SqlrigError::InvalidConfig(format!(
            "logins can only be created on mssql targets, not {other}"
        ))),
    }
}

/// Kill every session of `login`, drop the login if it exists, then create
/// it with `password` and `default_db`.
pub fn create_db_login(
    executor: &mut dyn SqlExecutor,
    login: &str,
    password: &str,
    default_db: &str,
) -> Result<()> {
    require_mssql(executor)?;
    let op = Operation::start("Creating database login");
    let params = [login.to_string()];

    let sessions = execute_query(executor, LOGIN_SESSIONS, &params)?.unwrap_or_default();
    for row in &sessions.values {
        let Some(raw) = row.first() else { continue };
        let sid: u32 = raw
            .trim()
            .parse()
            .map_err(|_| SqlrigError::Sql(format!("unexpected session id '{raw}'")))?;
        tracing::debug!(login, session = sid, "killing session");
        execute_query(executor, &format!("KILL {sid}"), &[])?;
    }

    let existing = execute_query(executor, LOGIN_EXISTS, &params)?.unwrap_or_default();
    if !existing.is_empty() {
        execute_query(executor, &format!("DROP LOGIN {}", quote_name(login)), &[])?;
    }

    execute_query(executor, &create_login_sql(login, password, default_db), &[])?;
    tracing::info!(login, default_db, "login created");
    op.done();
    Ok(())
}

fn create_login_sql(login: &str, password: &str, default_db: &str) -> String {
    format!(
        "CREATE LOGIN {} WITH PASSWORD = {}, DEFAULT_DATABASE = {}, \
         DEFAULT_LANGUAGE = [us_english], CHECK_EXPIRATION = OFF, CHECK_POLICY = OFF",
        quote_name(login),
        quote_literal(password),
        quote_name(default_db)
    )
}

fn quote_name(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
