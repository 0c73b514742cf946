use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlrigError {
    #[error("action already registered: {0}")]
    DuplicateAction(String),

    #[error("cannot compose '{composite}': unknown action '{missing}'")]
    UnknownAction { composite: String, missing: String },

    #[error("action {action} is not permitted, allowed actions: {allowed}")]
    NotPermitted { action: String, allowed: String },

    #[error("no action {action} found, available actions: {available}")]
    NotRegistered { action: String, available: String },

    #[error("no actions defined")]
    EmptyRegistry,

    #[error("file {file} not in <{expected}> format")]
    NamingConvention { file: PathBuf, expected: &'static str },

    #[error("{}", render_batch_failure(.operation, .failures))]
    BatchExecution {
        operation: String,
        failures: Vec<(PathBuf, Vec<String>)>,
    },

    #[error("unknown object type '{0}'")]
    UnknownObjectType(String),

    #[error("sql error: {0}")]
    Sql(String),

    #[error("{file} is not valid UTF-8 (save it as UTF-8 with or without BOM)")]
    InvalidEncoding { file: PathBuf },

    #[error("no sql client found: install sqlcmd or use the sqlite dialect")]
    NoSqlClient,

    #[error("sql client failed: {0}")]
    SqlClientFailed(String),

    #[error("config not found: {0} (run 'sqlrig init')")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("confirmation requires an interactive terminal: pass --yes to proceed")]
    ConfirmationUnavailable,

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, SqlrigError>;

fn render_batch_failure(operation: &str, failures: &[(PathBuf, Vec<String>)]) -> String {
    let mut msg = format!("failed to {operation} the following files:");
    for (path, _) in failures {
        msg.push('\n');
        msg.push_str(&path.display().to_string());
    }
    for (_, errors) in failures {
        for e in errors {
            msg.push_str(e);
        }
    }
    msg
}
