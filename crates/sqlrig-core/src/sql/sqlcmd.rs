//! SQL Server backend driving the `sqlcmd` client binary.
//!
//! Each batch is piped to a fresh `sqlcmd` process on stdin. Output is
//! requested pipe-separated without headers padding so it can be turned back
//! into [`Rows`]. The password travels through `SQLCMDPASSWORD`, never argv.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{Dialect, Rows, SqlExecutor};
use crate::error::{Result, SqlrigError};

const COLUMN_SEPARATOR: &str = "|";

/// Locate the `sqlcmd` client on `PATH`.
pub fn detect_client() -> Option<PathBuf> {
    which::which("sqlcmd").ok()
}

#[derive(Debug, Clone)]
pub struct SqlcmdExecutor {
    client: PathBuf,
    server: String,
    port: Option<u16>,
    database: String,
    login: Option<(String, String)>,
    extra_args: Vec<String>,
}

impl SqlcmdExecutor {
    /// Build an executor using the `sqlcmd` found on `PATH`.
    pub fn connect(server: &str, port: Option<u16>, database: &str) -> Result<Self> {
        let client = detect_client().ok_or(SqlrigError::NoSqlClient)?;
        Ok(Self::with_client(client, server, port, database))
    }

    pub fn with_client(client: PathBuf, server: &str, port: Option<u16>, database: &str) -> Self {
        Self {
            client,
            server: server.to_string(),
            port,
            database: database.to_string(),
            login: None,
            extra_args: Vec::new(),
        }
    }

    /// SQL authentication. Without a login the client uses a trusted connection.
    pub fn login(mut self, username: &str, password: &str) -> Self {
        self.login = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn extra_args(mut self, args: &[String]) -> Self {
        self.extra_args = args.to_vec();
        self
    }

    fn server_arg(&self) -> String {
        match self.port {
            Some(port) => format!("{},{}", self.server, port),
            None => self.server.clone(),
        }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.client);
        let server = self.server_arg();
        cmd.args(["-S", server.as_str(), "-d", self.database.as_str()]);
        match &self.login {
            Some((user, password)) => {
                cmd.args(["-U", user.as_str()]);
                cmd.env("SQLCMDPASSWORD", password);
            }
            None => {
                cmd.arg("-E");
            }
        }
        // -b: exit non-zero on error, -I: quoted identifiers on,
        // -W: trim trailing spaces, -s: column separator.
        cmd.args(["-b", "-I", "-W", "-s", COLUMN_SEPARATOR]);
        cmd.args(&self.extra_args);
        cmd
    }

    fn run(&self, script: &str) -> Result<String> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SqlrigError::SqlClientFailed(e.to_string()))?;

        if let Some(stdin) = child.stdin.as_mut() {
            let written = stdin
                .write_all(script.as_bytes())
                .and_then(|_| stdin.write_all(b"\nGO\n"));
            if let Err(e) = written {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SqlrigError::SqlClientFailed(format!(
                    "failed to write stdin: {e}"
                )));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SqlrigError::SqlClientFailed(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = format!("{}{}", stdout.trim(), stderr.trim());
            let hint = detail.chars().take(500).collect::<String>();
            return Err(SqlrigError::SqlClientFailed(hint));
        }
        Ok(stdout)
    }
}

impl SqlExecutor for SqlcmdExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }

    fn query(&mut self, sql: &str, params: &[String]) -> Result<Option<Rows>> {
        let sql = bind_literals(sql, params)?;
        self.run_batch(&sql)
    }

    fn run_batch(&mut self, sql: &str) -> Result<Option<Rows>> {
        tracing::debug!(server = %self.server, database = %self.database, "sqlcmd batch");
        let stdout = self.run(sql)?;
        Ok(parse_output(&stdout))
    }
}

/// Replace `?` placeholders with quoted string literals, in order.
fn bind_literals(sql: &str, params: &[String]) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut next = params.iter();
    for ch in sql.chars() {
        if ch == '?' {
            let value = next.next().ok_or_else(|| {
                SqlrigError::Sql("more placeholders than parameters".to_string())
            })?;
            out.push_str("N'");
            out.push_str(&value.replace('\'', "''"));
            out.push('\'');
        } else {
            out.push(ch);
        }
    }
    if next.next().is_some() {
        return Err(SqlrigError::Sql(
            "more parameters than placeholders".to_string(),
        ));
    }
    Ok(out)
}

/// Parse `sqlcmd -W -s|` output: a header line, a dashes line, data lines,
/// then a blank line and a "(n rows affected)" footer.
fn parse_output(stdout: &str) -> Option<Rows> {
    let mut lines = stdout.lines().filter(|l| !l.trim().is_empty());
    let mut last = None;
    while let Some(header) = lines.next() {
        if is_footer(header) {
            continue;
        }
        let columns: Vec<String> = header
            .split(COLUMN_SEPARATOR)
            .map(|c| c.trim().to_string())
            .collect();
        let mut values = Vec::new();
        for line in lines.by_ref() {
            if is_footer(line) {
                break;
            }
            if line.chars().all(|c| c == '-' || c == '|') {
                continue;
            }
            values.push(
                line.split(COLUMN_SEPARATOR)
                    .map(|v| v.trim().to_string())
                    .collect(),
            );
        }
        last = Some(Rows { columns, values });
    }
    last
}

fn is_footer(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('(') && line.ends_with("affected)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_arg_includes_port() {
        let exec = SqlcmdExecutor::with_client("sqlcmd".into(), "db.local", Some(14330), "DW");
        assert_eq!(exec.server_arg(), "db.local,14330");
        let exec = SqlcmdExecutor::with_client("sqlcmd".into(), "db.local", None, "DW");
        assert_eq!(exec.server_arg(), "db.local");
    }

    #[test]
    fn command_uses_env_for_password() {
        let exec = SqlcmdExecutor::with_client("sqlcmd".into(), "srv", None, "DW")
            .login("deployer", "s3cret");
        let cmd = exec.build_command();
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"deployer".to_string()));
        assert!(!args.contains(&"s3cret".to_string()));
        assert!(!args.contains(&"-E".to_string()));
    }

    #[test]
    fn trusted_connection_without_login() {
        let exec = SqlcmdExecutor::with_client("sqlcmd".into(), "srv", None, "DW");
        let args: Vec<String> = exec
            .build_command()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"-E".to_string()));
    }

    #[test]
    fn bind_literals_quotes_values() {
        let sql = bind_literals(
            "SELECT * FROM t WHERE a = ? AND b = ?",
            &["x".to_string(), "o'neil".to_string()],
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = N'x' AND b = N'o''neil'");
    }

    #[test]
    fn bind_literals_counts_must_match() {
        assert!(bind_literals("SELECT ?", &[]).is_err());
        assert!(bind_literals("SELECT 1", &["x".to_string()]).is_err());
    }

    #[test]
    fn parses_result_set() {
        let out = "name|rows\n----|----\nclients|3\norders|12\n\n(2 rows affected)\n";
        let rows = parse_output(out).unwrap();
        assert_eq!(rows.columns, vec!["name".to_string(), "rows".to_string()]);
        assert_eq!(
            rows.values,
            vec![
                vec!["clients".to_string(), "3".to_string()],
                vec!["orders".to_string(), "12".to_string()],
            ]
        );
    }

    #[test]
    fn no_output_means_no_rows() {
        assert!(parse_output("").is_none());
        assert!(parse_output("\n(1 rows affected)\n").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn client_that_ignores_stdin_fails_the_batch() {
        // `true` exits without reading, so a script larger than the pipe
        // buffer cannot be written.
        let mut exec = SqlcmdExecutor::with_client("true".into(), "srv", None, "DW");
        let script = "SELECT 1;\n".repeat(200_000);
        let err = exec.run_batch(&script).unwrap_err();
        match err {
            SqlrigError::SqlClientFailed(msg) => assert!(msg.contains("failed to write stdin")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
