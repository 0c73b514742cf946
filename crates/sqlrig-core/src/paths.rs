use crate::error::{Result, SqlrigError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "sqlrig.yaml";

pub const DATABASE_DIR: &str = "database";
pub const ASSEMBLIES_DIR: &str = "database/assemblies";
pub const FUNCTIONS_DIR: &str = "database/functions";
pub const PROCEDURES_DIR: &str = "database/procedures";
pub const VIEWS_DIR: &str = "database/views";
pub const DATA_DIR: &str = "database/data";
pub const TESTDATA_DIR: &str = "database/testdata";
pub const TESTS_DIR: &str = "database/tests";

pub const CREDENTIALS_DIR: &str = ".sqlrig";
pub const USERNAME_FILE: &str = "username";
pub const PASSWORD_FILE: &str = "password";
pub const LOGINS_FILE: &str = "logins";

/// Every directory scaffolded by `sqlrig init`, in deploy order.
pub const SCAFFOLD_DIRS: &[&str] = &[
    ASSEMBLIES_DIR,
    FUNCTIONS_DIR,
    PROCEDURES_DIR,
    VIEWS_DIR,
    DATA_DIR,
    TESTDATA_DIR,
    TESTS_DIR,
];

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a config-relative path against the project root. Absolute paths
/// are returned unchanged.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Default location for stored credentials: `~/.sqlrig/<file>`.
pub fn default_credential_file(file: &str) -> Result<PathBuf> {
    let home = home::home_dir().ok_or(SqlrigError::HomeNotFound)?;
    Ok(home.join(CREDENTIALS_DIR).join(file))
}

// ---------------------------------------------------------------------------
// Action name validation
// ---------------------------------------------------------------------------

static ACTION_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn action_name_re() -> &'static Regex {
    ACTION_NAME_RE
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn is_valid_action_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 64 && action_name_re().is_match(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
