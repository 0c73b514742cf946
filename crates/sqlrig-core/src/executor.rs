//! Runs one action: dependency notice, confirmation, validity check and
//! dispatch, in that order.

use crate::action::Action;
use crate::context::Context;
use crate::error::{Result, SqlrigError};
use crate::operation::Operation;
use crate::registry::Registry;
use serde::Serialize;
use serde_json::Value;

/// Asks the user to approve a state-changing run.
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Approves everything. Used for `--yes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        tracing::info!("{message}: confirmed by --yes");
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Declined,
    NotPermitted,
    NotRegistered,
    EmptyRegistry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed(Value),
    Skipped(SkipReason),
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActionExecutor<'r> {
    registry: &'r Registry,
}

impl<'r> ActionExecutor<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Run `name` with `args`. The allow-list and top-level action come from
    /// `ctx.config`. Errors raised by the action itself are returned as-is.
    pub fn execute(
        &self,
        ctx: &mut Context,
        name: &str,
        args: &[String],
        confirm: &mut dyn Confirm,
    ) -> Result<ExecutionOutcome> {
        let op = Operation::start(format!("Starting to execute \"{name}\""));
        let action = self.registry.get(name);

        if let Some(action) = action {
            for notice in dependency_notices(action, &ctx.config.top_level_action) {
                tracing::info!("{notice}");
            }

            if action.modifies_state() {
                let conn = ctx.conn_info();
                let message = format!(
                    "Warning! You are about to commit changes to server {} database {}",
                    conn.server, conn.database
                );
                if !confirm.confirm(&message)? {
                    tracing::info!(action = %name, "declined");
                    op.done();
                    return Ok(ExecutionOutcome::Skipped(SkipReason::Declined));
                }
            }
        }

        let action = match self.registry.check(name, &ctx.config.allowed_actions) {
            Ok(action) => action,
            Err(e) => {
                op.done();
                return Ok(ExecutionOutcome::Skipped(skip_reason(e)?));
            }
        };

        let value = action.call(ctx, args)?;
        op.done();
        Ok(ExecutionOutcome::Completed(value))
    }
}

/// One line per dependency the action assumes has already run. The
/// configured top-level action runs everything itself and gets none.
fn dependency_notices(action: &Action, top_level_action: &str) -> Vec<String> {
    if action.name() == top_level_action {
        return Vec::new();
    }
    action
        .dependencies()
        .iter()
        .map(|dep| {
            format!(
                "Note! this command ({}) assumes that the {dep} action has been \
                 successfully completed already",
                action.name()
            )
        })
        .collect()
}

fn skip_reason(e: SqlrigError) -> Result<SkipReason> {
    match e {
        SqlrigError::NotPermitted { .. } => Ok(SkipReason::NotPermitted),
        SqlrigError::NotRegistered { .. } => Ok(SkipReason::NotRegistered),
        SqlrigError::EmptyRegistry => Ok(SkipReason::EmptyRegistry),
        other => Err(other),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
