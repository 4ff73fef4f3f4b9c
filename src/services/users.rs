// Login repair for locked-out local users
// Lock-out state is split between users.db (the JSON document holding the
// password and PIN hashes) and two XML files per user: policy.xml (disabled
// flag, failed login counter) and config.xml (PIN login switch).

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::db;
use crate::models::{format_guid, LocalUserRow, UserData};
use crate::services::preflight::ensure_writable;
use crate::services::prompt::Prompter;
use crate::services::xml::{require_text, set_element_text};

/// Hash a password in the legacy `$SHA1$` format the server still accepts
pub fn hash_password(password: &str) -> String {
    format!("$SHA1${:X}", Sha1::digest(password.as_bytes()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub disabled: bool,
    pub pin_set: bool,
    pub local_pin_login: bool,
}

impl LockoutState {
    pub fn needs_restore(&self) -> bool {
        self.failed_attempts > 0 || self.disabled || self.pin_set || self.local_pin_login
    }
}

/// Read a user's lock-out symptoms from their policy, config and JSON data
pub fn assess(policy_xml: &str, config_xml: &str, data: &UserData) -> Result<LockoutState> {
    let disabled = require_text(policy_xml, "IsDisabled")?.trim() == "true";

    let attempts = require_text(policy_xml, "InvalidLoginAttemptCount")?;
    let failed_attempts = attempts
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid InvalidLoginAttemptCount {:?}", attempts))?;

    let local_pin_login = require_text(config_xml, "EnableLocalPassword")?.trim() == "true";

    Ok(LockoutState {
        failed_attempts,
        disabled,
        pin_set: data.has_pin(),
        local_pin_login,
    })
}

#[derive(Debug, Clone)]
pub struct LoginRepairOptions {
    pub users_db: PathBuf,
    pub users_dir: PathBuf,
    /// Only visit the user with this name (case-insensitive)
    pub only_user: Option<String>,
    pub backup: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginReport {
    pub users_seen: usize,
    pub users_restored: usize,
    pub passwords_reset: usize,
}

pub struct LoginRepairer {
    pool: SqlitePool,
    options: LoginRepairOptions,
    backed_up: HashSet<PathBuf>,
}

impl LoginRepairer {
    pub fn new(pool: SqlitePool, options: LoginRepairOptions) -> Self {
        Self {
            pool,
            options,
            backed_up: HashSet::new(),
        }
    }

    pub async fn run(&mut self, prompter: &mut dyn Prompter) -> Result<LoginReport> {
        // data may be stored as TEXT or BLOB depending on the server version
        let users: Vec<LocalUserRow> = sqlx::query_as(
            "SELECT Id AS id, guid, CAST(data AS BLOB) AS data FROM LocalUsersv2 ORDER BY Id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read LocalUsersv2")?;

        let mut report = LoginReport::default();

        for user in users {
            let data: UserData = serde_json::from_slice(&user.data)
                .with_context(|| format!("Invalid user data for row {}", user.id))?;

            if let Some(only) = &self.options.only_user {
                let matches = data
                    .name()
                    .map(|name| name.eq_ignore_ascii_case(only))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }

            report.users_seen += 1;
            self.repair_user(&user, data, prompter, &mut report).await?;
        }

        if report.users_seen == 0 {
            match &self.options.only_user {
                Some(only) => tracing::warn!("No user named {:?} found", only),
                None => tracing::warn!("No local users found"),
            }
        }

        Ok(report)
    }

    async fn repair_user(
        &mut self,
        user: &LocalUserRow,
        mut data: UserData,
        prompter: &mut dyn Prompter,
        report: &mut LoginReport,
    ) -> Result<()> {
        let user_dir = self.options.users_dir.join(format_guid(&user.guid));
        let policy_path = user_dir.join("policy.xml");
        let config_path = user_dir.join("config.xml");

        let policy = read_sidecar(&policy_path).await?;
        let config = read_sidecar(&config_path).await?;
        let state = assess(&policy, &config, &data)
            .with_context(|| format!("Failed to read lock-out state from {}", user_dir.display()))?;

        tracing::info!("---------");
        tracing::info!("User {}", data.display_name());
        if state.failed_attempts > 0 {
            tracing::info!("Account has {} failed login attempts.", state.failed_attempts);
        }
        if state.disabled {
            tracing::info!("Account is disabled.");
        }
        if state.pin_set {
            tracing::info!("PIN code is set.");
        }
        if state.local_pin_login {
            tracing::info!("Local PIN login is enabled.");
        }

        let mut restore = false;
        if state.needs_restore() && prompter.confirm("Restore user", true)? {
            ensure_writable(&policy_path)?;
            ensure_writable(&config_path)?;
            ensure_writable(&self.options.users_db)?;
            restore = true;
        }

        let mut new_password = None;
        if prompter.confirm("Reset password", false)? {
            ensure_writable(&self.options.users_db)?;
            new_password = Some(hash_password(&prompter.new_password()?));
        }

        let mut data_changed = false;

        if restore {
            if state.disabled || state.failed_attempts > 0 {
                let mut policy = policy;
                if state.disabled {
                    tracing::info!("Enabling account...");
                    policy = set_element_text(&policy, "IsDisabled", "false")?;
                }
                if state.failed_attempts > 0 {
                    tracing::info!("Resetting login attempts...");
                    policy = set_element_text(&policy, "InvalidLoginAttemptCount", "0")?;
                }
                self.write_sidecar(&policy_path, policy).await?;
            }

            if state.local_pin_login {
                tracing::info!("Disabling local PIN login...");
                let config = set_element_text(&config, "EnableLocalPassword", "false")?;
                self.write_sidecar(&config_path, config).await?;
            }

            if state.pin_set {
                tracing::info!("Clearing PIN code...");
                data.clear_pin();
                data_changed = true;
            }

            report.users_restored += 1;
        }

        if let Some(hash) = new_password {
            tracing::info!("Changing user password...");
            data.set_password(hash);
            data_changed = true;
            report.passwords_reset += 1;
        }

        if data_changed {
            let users_db = self.options.users_db.clone();
            self.backup_once(&users_db).await?;

            let json = serde_json::to_string(&data).context("Failed to serialize user data")?;
            sqlx::query("UPDATE LocalUsersv2 SET data = ? WHERE Id = ?")
                .bind(json)
                .bind(user.id)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to update user {}", data.display_name()))?;
        }

        Ok(())
    }

    async fn write_sidecar(&mut self, path: &Path, contents: String) -> Result<()> {
        self.backup_once(path).await?;
        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn backup_once(&mut self, path: &Path) -> Result<()> {
        if self.options.backup && self.backed_up.insert(path.to_path_buf()) {
            db::backup_store(path).await?;
        }
        Ok(())
    }
}

async fn read_sidecar(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
