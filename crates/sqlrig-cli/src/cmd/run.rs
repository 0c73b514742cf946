use crate::cmd::list::default_registry;
use crate::output::print_json;
use crate::prompt::{TerminalConfirm, TerminalCredentials};
use anyhow::Context as _;
use serde_json::{json, Value};
use sqlrig_core::config::Config;
use sqlrig_core::context::Context;
use sqlrig_core::credentials::CredentialStore;
use sqlrig_core::executor::{ActionExecutor, ExecutionOutcome, SkipReason};
use std::path::Path;

pub fn run(root: &Path, action: &str, args: &[String], yes: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let registry = default_registry()?;

    let mut credentials = CredentialStore::new();
    let mut ctx = Context::connect(
        root.to_path_buf(),
        config,
        &mut credentials,
        &mut TerminalCredentials,
    )
    .context("failed to connect to the target database")?;

    let outcome = ActionExecutor::new(&registry).execute(
        &mut ctx,
        action,
        args,
        &mut TerminalConfirm::new(yes),
    )?;

    match outcome {
        ExecutionOutcome::Completed(value) => {
            if json {
                print_json(&json!({
                    "action": action,
                    "status": "completed",
                    "result": value,
                }))?;
            } else {
                print_result(&value)?;
                println!("{action}: completed");
            }
        }
        ExecutionOutcome::Skipped(reason) => {
            if json {
                print_json(&json!({
                    "action": action,
                    "status": "skipped",
                    "reason": reason,
                }))?;
            } else {
                println!("{action}: skipped ({})", describe(reason));
            }
        }
    }
    Ok(())
}

fn print_result(value: &Value) -> anyhow::Result<()> {
    if value.is_null() {
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Declined => "declined at the confirmation prompt",
        SkipReason::NotPermitted => "not in allowed_actions",
        SkipReason::NotRegistered => "no such action",
        SkipReason::EmptyRegistry => "no actions defined",
    }
}
