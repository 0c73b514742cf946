//! The stock actions every project gets.

use crate::action::Action;
use crate::context::Context;
use crate::credentials::{deobfuscate, lookup_from_file};
use crate::error::{Result, SqlrigError};
use crate::login::{create_db_login, require_mssql};
use crate::paths;
use crate::registry::RegistryBuilder;
use crate::sqlfiles::{deploy_sqlfiles, drop_sqlfile_objects, DeployOptions, DeployReport};
use serde_json::{json, Value};
use std::path::Path;

pub const DEPLOY: &str = "deploy";
pub const DATA: &str = "data";
pub const TESTDATA: &str = "testdata";
pub const DROP: &str = "drop";
pub const TEST: &str = "test";
pub const COMPLETE_BUILD: &str = "complete-build";
pub const CREATE_DB_LOGIN: &str = "create-db-login";

/// Register the stock actions. Projects may replace any of them afterwards
/// with [`RegistryBuilder::register`].
pub fn register_defaults(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .register(
            Action::new(DEPLOY, deploy)
                .describe("Create database objects from the configured script directories.")
                .affects_state(),
        )
        .register(
            Action::new(DATA, data)
                .describe("Insert data from the data directory.")
                .affects_state()
                .depends_on([DEPLOY]),
        )
        .register(
            Action::new(TESTDATA, testdata)
                .describe("Insert test data from the testdata directory.")
                .affects_state()
                .depends_on([DEPLOY]),
        )
        .register(
            Action::new(DROP, drop_objects)
                .describe("Drop the database objects created by deploy.")
                .affects_state(),
        )
        .register(
            Action::new(TEST, run_tests)
                .describe("Run the test scripts and return their results.")
                .depends_on([DEPLOY, DATA]),
        )
        .register(
            Action::new(CREATE_DB_LOGIN, create_login)
                .describe("Recreate the configured server login (mssql only).")
                .affects_state(),
        );
    builder.compose(
        COMPLETE_BUILD,
        &[DEPLOY, DATA],
        "Run deploy and data in order.",
    )?;
    Ok(())
}

fn deploy(ctx: &mut Context, _args: &[String]) -> Result<Value> {
    let opts = DeployOptions::from_config(&ctx.config.deploy)?;
    let directories = ctx.config.deploy.directories.clone();
    let mut reports = Vec::with_capacity(directories.len());
    for dir in &directories {
        let path = ctx.resolve(&dir.path);
        let message = format!("Deploying {} scripts", dir.object_type);
        reports.push(deploy_sqlfiles(ctx.executor(), &path, &message, &opts)?);
    }
    Ok(json!({ "deployed": file_names(&reports) }))
}

fn data(ctx: &mut Context, _args: &[String]) -> Result<Value> {
    let dir = ctx.config.deploy.data_dir.clone();
    let report = deploy_dir(ctx, &dir, "Inserting data")?;
    Ok(json!({ "deployed": file_names(&[report]) }))
}

fn testdata(ctx: &mut Context, _args: &[String]) -> Result<Value> {
    let dir = ctx.config.deploy.testdata_dir.clone();
    let report = deploy_dir(ctx, &dir, "Inserting test data")?;
    Ok(json!({ "deployed": file_names(&[report]) }))
}

fn drop_objects(ctx: &mut Context, _args: &[String]) -> Result<Value> {
    let opts = DeployOptions::from_config(&ctx.config.deploy)?;
    let directories = ctx.config.deploy.directories.clone();
    let mut dropped = Vec::new();
    for dir in directories.iter().rev() {
        let path = ctx.resolve(&dir.path);
        let message = format!("Dropping {} objects", dir.object_type);
        dropped.extend(drop_sqlfile_objects(
            ctx.executor(),
            dir.object_type,
            &path,
            &message,
            &opts,
        )?);
    }
    Ok(json!({ "dropped": dropped }))
}

fn run_tests(ctx: &mut Context, _args: &[String]) -> Result<Value> {
    let dir = ctx.config.deploy.test_dir.clone();
    let report = deploy_dir(ctx, &dir, "Running tests")?;
    Ok(serde_json::to_value(&report.deployed)?)
}

fn create_login(ctx: &mut Context, args: &[String]) -> Result<Value> {
    require_mssql(ctx.executor())?;
    let login = ctx.config.login.clone().ok_or_else(|| {
        SqlrigError::InvalidConfig("create-db-login needs a login section in sqlrig.yaml".into())
    })?;
    let name = args.first().cloned().unwrap_or(login.name);
    let default_db = login
        .default_database
        .unwrap_or_else(|| ctx.conn_info().database.clone());
    let file = match &login.password_file {
        Some(p) => ctx.resolve(p),
        None => paths::default_credential_file(paths::LOGINS_FILE)?,
    };
    let stored = lookup_from_file(&file, &name)?.ok_or_else(|| {
        SqlrigError::Credentials(format!(
            "no password stored for login {name} in {}",
            file.display()
        ))
    })?;
    let password = deobfuscate(&stored)?;
    create_db_login(ctx.executor(), &name, &password, &default_db)?;
    Ok(json!({ "login": name, "default_database": default_db }))
}

fn deploy_dir(ctx: &mut Context, dir: &Path, message: &str) -> Result<DeployReport> {
    let opts = DeployOptions::from_config(&ctx.config.deploy)?;
    let path = ctx.resolve(dir);
    deploy_sqlfiles(ctx.executor(), &path, message, &opts)
}

fn file_names(reports: &[DeployReport]) -> Vec<String> {
    reports
        .iter()
        .flat_map(|r| &r.deployed)
        .filter_map(|f| f.file.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}
