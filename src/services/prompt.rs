use anyhow::{bail, Result};
use dialoguer::{console::Term, Confirm, Password};

/// Operator questions asked during the login repair
pub trait Prompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;

    /// Read a new password, hidden and confirmed
    fn new_password(&mut self) -> Result<String>;
}

/// Interactive prompts on stderr
pub struct ConsolePrompter {
    term: Term,
}

impl ConsolePrompter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for ConsolePrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for ConsolePrompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact_on(&self.term)?)
    }

    fn new_password(&mut self) -> Result<String> {
        Ok(Password::new()
            .with_prompt("New password")
            .with_confirmation("Repeat password", "Passwords do not match")
            .interact_on(&self.term)?)
    }
}

/// Takes the default answer for every question (`--yes`)
///
/// Restores are accepted, password resets declined.
pub struct UnattendedPrompter;

impl Prompter for UnattendedPrompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        tracing::info!("{}? {}", question, if default { "yes" } else { "no" });
        Ok(default)
    }

    fn new_password(&mut self) -> Result<String> {
        bail!("Cannot read a new password in unattended mode")
    }
}
