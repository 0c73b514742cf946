use crate::error::{Result, SqlrigError};
use crate::paths;
use crate::retry::PermanentErrorPolicy;
use crate::sql::Dialect;
use crate::sqlfiles::ObjectType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Allow-list entry that permits every registered action.
pub const ALLOW_ALL: &str = "ALL";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TargetConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Database file for the sqlite dialect, relative to the project root.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    /// Extra arguments passed verbatim to the sql client (mssql dialect).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_args: Vec<String>,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("database.sqlite3")
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            server: None,
            port: None,
            database: None,
            sqlite_path: default_sqlite_path(),
            client_args: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
    /// Use integrated authentication instead of a username and password.
    #[serde(default)]
    pub trusted_connection: bool,
}

// ---------------------------------------------------------------------------
// DeployConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployDirectory {
    pub object_type: ObjectType,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Script directories in deploy order. `drop` walks them in reverse.
    #[serde(default = "default_directories")]
    pub directories: Vec<DeployDirectory>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_testdata_dir")]
    pub testdata_dir: PathBuf,
    #[serde(default = "default_test_dir")]
    pub test_dir: PathBuf,
    #[serde(default)]
    pub display_output: bool,
    /// `$(NAME)` substitutions applied to every script before execution.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripting_variables: BTreeMap<String, String>,
    /// Round budget override; defaults to the number of files in a batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<usize>,
    #[serde(default)]
    pub permanent_errors: PermanentErrorPolicy,
}

fn default_directories() -> Vec<DeployDirectory> {
    vec![
        DeployDirectory {
            object_type: ObjectType::Assembly,
            path: PathBuf::from(paths::ASSEMBLIES_DIR),
        },
        DeployDirectory {
            object_type: ObjectType::Function,
            path: PathBuf::from(paths::FUNCTIONS_DIR),
        },
        DeployDirectory {
            object_type: ObjectType::Procedure,
            path: PathBuf::from(paths::PROCEDURES_DIR),
        },
        DeployDirectory {
            object_type: ObjectType::View,
            path: PathBuf::from(paths::VIEWS_DIR),
        },
    ]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(paths::DATA_DIR)
}

fn default_testdata_dir() -> PathBuf {
    PathBuf::from(paths::TESTDATA_DIR)
}

fn default_test_dir() -> PathBuf {
    PathBuf::from(paths::TESTS_DIR)
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            directories: default_directories(),
            data_dir: default_data_dir(),
            testdata_dir: default_testdata_dir(),
            test_dir: default_test_dir(),
            display_output: false,
            scripting_variables: BTreeMap::new(),
            max_rounds: None,
            permanent_errors: PermanentErrorPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoginConfig
// ---------------------------------------------------------------------------

/// The server login `create-db-login` (re)creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginConfig {
    pub name: String,
    /// Defaults to `target.database`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_database: Option<String>,
    /// `name=<obfuscated password>` file. Defaults to `~/.sqlrig/logins`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginConfig>,
    /// Composite action whose runs do not print dependency notices.
    #[serde(default = "default_top_level_action")]
    pub top_level_action: String,
}

fn default_version() -> u32 {
    1
}

fn default_top_level_action() -> String {
    "complete-build".to_string()
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            allowed_actions: vec![ALLOW_ALL.to_string()],
            target: TargetConfig::default(),
            credentials: None,
            deploy: DeployConfig::default(),
            login: None,
            top_level_action: default_top_level_action(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(SqlrigError::ConfigNotFound(path));
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.allowed_actions.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "allowed_actions is empty: every action will be refused".to_string(),
            });
        }
        for entry in &self.allowed_actions {
            if entry != ALLOW_ALL && !paths::is_valid_action_name(entry) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("allowed_actions entry '{entry}' is not a valid action name"),
                });
            }
        }

        if !paths::is_valid_action_name(&self.top_level_action) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "top_level_action '{}' is not a valid action name",
                    self.top_level_action
                ),
            });
        }

        if self.target.dialect == Dialect::Mssql {
            if self.target.server.as_deref().unwrap_or("").trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "target.server is required for the mssql dialect".to_string(),
                });
            }
            if self.target.database.as_deref().unwrap_or("").trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "target.database is required for the mssql dialect".to_string(),
                });
            }
        }

        if let Some(creds) = &self.credentials {
            if !creds.trusted_connection
                && creds.username_file.is_some() != creds.password_file.is_some()
            {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "credentials: username_file and password_file must be set together; \
                              credentials will be asked on every run"
                        .to_string(),
                });
            }
        }

        for dir in &self.deploy.directories {
            if dir.path.as_os_str().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("deploy directory for {} has an empty path", dir.object_type),
                });
            }
        }

        if self.deploy.max_rounds == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "deploy.max_rounds=0 would never run a single file".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
