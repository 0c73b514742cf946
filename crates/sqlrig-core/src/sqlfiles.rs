//! Deploy and drop the objects scripted in a directory of `.sql` files.
//!
//! Both directions run through [`RetryLoop`]: a view that selects from a
//! function deployed later in the listing simply fails in round one and
//! succeeds in round two. Drops go through [`execute_try_catch`], so a failed
//! drop leaves no partial state behind.
//!
//! Drop derives the object name from the file name, which must follow
//! `schema.object.sql` (or `name.sql` for assemblies, which have no schema).

use crate::config::DeployConfig;
use crate::error::{Result, SqlrigError};
use crate::operation::Operation;
use crate::retry::{Attempt, ItemError, RetryLoop, RoundBudget};
use crate::sql::{execute_from_file, execute_try_catch, Rows, SqlExecutor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ObjectType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Assembly,
    Function,
    Procedure,
    View,
    Table,
    Trigger,
    Type,
}

impl ObjectType {
    pub const ALL: &'static [ObjectType] = &[
        ObjectType::Assembly,
        ObjectType::Function,
        ObjectType::Procedure,
        ObjectType::View,
        ObjectType::Table,
        ObjectType::Trigger,
        ObjectType::Type,
    ];

    /// The SQL keyword used in `DROP <keyword> <name>`.
    pub fn keyword(&self) -> &'static str {
        match self {
            ObjectType::Assembly => "ASSEMBLY",
            ObjectType::Function => "FUNCTION",
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::View => "VIEW",
            ObjectType::Table => "TABLE",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Type => "TYPE",
        }
    }

    /// Objects of this type live outside any schema.
    pub fn is_schemaless(&self) -> bool {
        matches!(self, ObjectType::Assembly)
    }

    fn naming_pattern(&self) -> &'static str {
        if self.is_schemaless() {
            "name.sql"
        } else {
            "schema.object.sql"
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for ObjectType {
    type Err = SqlrigError;

    fn from_str(s: &str) -> Result<Self> {
        ObjectType::ALL
            .iter()
            .copied()
            .find(|t| t.keyword().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SqlrigError::UnknownObjectType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// File listing and naming
// ---------------------------------------------------------------------------

/// Derive the object name to drop from a script's file name.
pub fn drop_object_name(file: &Path, object_type: ObjectType) -> Result<String> {
    let base = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parts: Vec<&str> = base.split('.').collect();
    let expected_parts = if object_type.is_schemaless() { 2 } else { 3 };
    if parts.len() != expected_parts || parts.iter().any(|p| p.is_empty()) {
        return Err(SqlrigError::NamingConvention {
            file: file.to_path_buf(),
            expected: object_type.naming_pattern(),
        });
    }
    Ok(parts[..expected_parts - 1].join("."))
}

/// Every `*.sql` file directly inside `dir`, sorted by file name.
pub fn list_sql_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "sql") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

// ---------------------------------------------------------------------------
// Options and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Log the rows each script returns.
    pub display_output: bool,
    pub variables: BTreeMap<String, String>,
    pub retry: RetryLoop,
}

impl DeployOptions {
    pub fn from_config(deploy: &DeployConfig) -> Result<Self> {
        Ok(Self {
            display_output: deploy.display_output,
            variables: deploy.scripting_variables.clone(),
            retry: RetryLoop::new()
                .budget(RoundBudget::from_override(deploy.max_rounds)?)
                .policy(deploy.permanent_errors),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutput {
    pub file: PathBuf,
    pub rows: Vec<Rows>,
}

/// What a deploy did. A missing directory is reported, not an error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    pub directory: PathBuf,
    pub found: bool,
    /// Files in the order they succeeded.
    pub deployed: Vec<FileOutput>,
}

// ---------------------------------------------------------------------------
// Deploy / drop
// ---------------------------------------------------------------------------

/// Execute every script in `dir`, retrying failures for the configured
/// number of rounds.
pub fn deploy_sqlfiles(
    executor: &mut dyn SqlExecutor,
    dir: &Path,
    message: &str,
    opts: &DeployOptions,
) -> Result<DeployReport> {
    let op = Operation::start(message);
    let mut report = DeployReport {
        directory: dir.to_path_buf(),
        ..Default::default()
    };
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "directory not found");
        op.done();
        return Ok(report);
    }
    report.found = true;

    let files = list_sql_files(dir)?;
    let failures = opts.retry.run(&files, &mut |file: &PathBuf| -> Attempt {
        let rows = execute_from_file(executor, file, &opts.variables).map_err(ItemError::from)?;
        tracing::info!(file = %display_name(file), "deployed");
        if opts.display_output {
            for set in &rows {
                tracing::info!("\n{set}");
            }
        }
        report.deployed.push(FileOutput {
            file: file.clone(),
            rows,
        });
        Ok(())
    });

    if !failures.is_empty() {
        return Err(SqlrigError::BatchExecution {
            operation: "deploy".to_string(),
            failures: failures.into_iter().map(|f| (f.item, f.errors)).collect(),
        });
    }
    op.done();
    Ok(report)
}

/// Drop every object scripted in `dir`. Returns the dropped object names.
pub fn drop_sqlfile_objects(
    executor: &mut dyn SqlExecutor,
    object_type: ObjectType,
    dir: &Path,
    message: &str,
    opts: &DeployOptions,
) -> Result<Vec<String>> {
    let op = Operation::start(message);
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "directory not found");
        op.done();
        return Ok(Vec::new());
    }

    let files = list_sql_files(dir)?;
    let mut dropped = Vec::new();
    let failures = opts.retry.run(&files, &mut |file: &PathBuf| -> Attempt {
        let name = drop_object_name(file, object_type)?;
        execute_try_catch(executor, &format!("DROP {object_type} {name}"))?;
        tracing::info!(object = %name, kind = %object_type, "dropped");
        dropped.push(name);
        Ok(())
    });

    if !failures.is_empty() {
        return Err(SqlrigError::BatchExecution {
            operation: "drop".to_string(),
            failures: failures.into_iter().map(|f| (f.item, f.errors)).collect(),
        });
    }
    op.done();
    Ok(dropped)
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
