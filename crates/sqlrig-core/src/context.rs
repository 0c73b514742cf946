use crate::config::Config;
use crate::credentials::{CredentialPrompt, CredentialStore};
use crate::error::{Result, SqlrigError};
use crate::paths;
use crate::sql::{Dialect, SqlExecutor, SqlcmdExecutor, SqliteExecutor};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where a run is pointed. Shown in confirmation prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnInfo {
    pub dialect: Dialect,
    pub server: String,
    pub database: String,
    pub port: Option<u16>,
}

impl ConnInfo {
    pub fn from_config(root: &Path, config: &Config) -> Self {
        let target = &config.target;
        match target.dialect {
            Dialect::Sqlite => Self {
                dialect: Dialect::Sqlite,
                server: "localhost".to_string(),
                database: paths::resolve(root, &target.sqlite_path)
                    .display()
                    .to_string(),
                port: None,
            },
            Dialect::Mssql => Self {
                dialect: Dialect::Mssql,
                server: target.server.clone().unwrap_or_default(),
                database: target.database.clone().unwrap_or_default(),
                port: target.port,
            },
        }
    }
}

/// Everything an action needs: the project, its config and a live
/// connection to the target database.
pub struct Context {
    pub root: PathBuf,
    pub config: Config,
    conn: ConnInfo,
    executor: Box<dyn SqlExecutor>,
}

impl Context {
    pub fn new(root: PathBuf, config: Config, executor: Box<dyn SqlExecutor>) -> Self {
        let conn = ConnInfo::from_config(&root, &config);
        Self {
            root,
            config,
            conn,
            executor,
        }
    }

    /// Open the connection described by `config.target`, asking for a login
    /// through `prompt` when the mssql target needs one that is not stored.
    pub fn connect(
        root: PathBuf,
        config: Config,
        credentials: &mut CredentialStore,
        prompt: &mut dyn CredentialPrompt,
    ) -> Result<Self> {
        let executor: Box<dyn SqlExecutor> = match config.target.dialect {
            Dialect::Sqlite => {
                let path = paths::resolve(&root, &config.target.sqlite_path);
                Box::new(SqliteExecutor::open(&path)?)
            }
            Dialect::Mssql => Box::new(connect_mssql(&root, &config, credentials, prompt)?),
        };
        Ok(Self::new(root, config, executor))
    }

    pub fn conn_info(&self) -> &ConnInfo {
        &self.conn
    }

    pub fn executor(&mut self) -> &mut dyn SqlExecutor {
        self.executor.as_mut()
    }

    /// Resolve a config path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        paths::resolve(&self.root, path)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.root)
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

fn connect_mssql(
    root: &Path,
    config: &Config,
    credentials: &mut CredentialStore,
    prompt: &mut dyn CredentialPrompt,
) -> Result<SqlcmdExecutor> {
    let target = &config.target;
    let server = target
        .server
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SqlrigError::InvalidConfig("target.server is required for mssql".into()))?;
    let database = target
        .database
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            SqlrigError::InvalidConfig("target.database is required for mssql".into())
        })?;

    let executor =
        SqlcmdExecutor::connect(server, target.port, database)?.extra_args(&target.client_args);

    let Some(cred_cfg) = &config.credentials else {
        return Ok(executor);
    };
    if cred_cfg.trusted_connection {
        return Ok(executor);
    }

    let username_file = match &cred_cfg.username_file {
        Some(p) => paths::resolve(root, p),
        None => paths::default_credential_file(paths::USERNAME_FILE)?,
    };
    let password_file = match &cred_cfg.password_file {
        Some(p) => paths::resolve(root, p),
        None => paths::default_credential_file(paths::PASSWORD_FILE)?,
    };
    let key = format!("{server}_{database}");
    let login = credentials.get_credentials(
        &key,
        Some(&username_file),
        Some(&password_file),
        prompt,
    )?;
    Ok(executor.login(&login.username, &login.password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Unreachable;

    impl CredentialPrompt for Unreachable {
        fn username(&mut self, _: &str) -> Result<String> {
            panic!("sqlite never asks for a login")
        }
        fn password(&mut self, _: &str) -> Result<String> {
            panic!("sqlite never asks for a login")
        }
    }

    #[test]
    fn sqlite_conn_info_points_at_file() {
        let cfg = Config::new("proj");
        let info = ConnInfo::from_config(Path::new("/srv/proj"), &cfg);
        assert_eq!(info.server, "localhost");
        assert_eq!(info.database, "/srv/proj/database.sqlite3");
    }

    #[test]
    fn mssql_conn_info_from_target() {
        let mut cfg = Config::new("proj");
        cfg.target.dialect = Dialect::Mssql;
        cfg.target.server = Some("sql01".into());
        cfg.target.database = Some("DW".into());
        cfg.target.port = Some(1433);
        let info = ConnInfo::from_config(Path::new("/srv/proj"), &cfg);
        assert_eq!(info.server, "sql01");
        assert_eq!(info.database, "DW");
        assert_eq!(info.port, Some(1433));
    }

    #[test]
    fn connect_sqlite_creates_database() {
        let dir = TempDir::new().unwrap();
        let mut ctx = Context::connect(
            dir.path().to_path_buf(),
            Config::new("proj"),
            &mut CredentialStore::new(),
            &mut Unreachable,
        )
        .unwrap();
        ctx.executor().run_batch("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(dir.path().join("database.sqlite3").exists());
        assert_eq!(ctx.conn_info().dialect, Dialect::Sqlite);
    }

    #[test]
    fn connect_mssql_without_server_is_invalid() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("proj");
        cfg.target.dialect = Dialect::Mssql;
        let err = Context::connect(
            dir.path().to_path_buf(),
            cfg,
            &mut CredentialStore::new(),
            &mut Unreachable,
        )
        .unwrap_err();
        assert!(matches!(err, SqlrigError::InvalidConfig(_)));
    }
}
