use dialoguer::{Confirm as ConfirmPrompt, Input, Password};
use sqlrig_core::credentials::CredentialPrompt;
use sqlrig_core::executor::Confirm;
use sqlrig_core::{Result, SqlrigError};
use std::io::IsTerminal;

/// Confirms on the terminal, or approves everything under `--yes`.
pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        if self.assume_yes {
            tracing::info!("{message}: confirmed by --yes");
            return Ok(true);
        }
        if !std::io::stdin().is_terminal() {
            return Err(SqlrigError::ConfirmationUnavailable);
        }
        ConfirmPrompt::new()
            .with_prompt(format!("{message}. Continue?"))
            .default(false)
            .interact()
            .map_err(|_| SqlrigError::ConfirmationUnavailable)
    }
}

/// Reads a login from the terminal.
pub struct TerminalCredentials;

impl CredentialPrompt for TerminalCredentials {
    fn username(&mut self, prompt: &str) -> Result<String> {
        require_terminal()?;
        Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| SqlrigError::Credentials(e.to_string()))
    }

    fn password(&mut self, prompt: &str) -> Result<String> {
        require_terminal()?;
        Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(|e| SqlrigError::Credentials(e.to_string()))
    }
}

fn require_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() {
        Ok(())
    } else {
        Err(SqlrigError::Credentials(
            "no stored login and no terminal to ask for one".to_string(),
        ))
    }
}
