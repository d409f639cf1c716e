use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use dialoguer::Password;

use crate::runner::{BudgetRef, SessionConfig};
use crate::utils::config_file::{ConfigError, ConfigFile};

/// Sync server connection and budget selection.
///
/// Every field falls back to its environment variable; anything still unset
/// is taken from the optional `key=value` config file.
#[derive(Args, Debug, Clone)]
pub struct FetchConfig {
    /// Sync server URL
    #[arg(long, env = "ACTUAL_URL")]
    pub server_url: Option<String>,

    /// Account password for the sync server
    #[arg(long, env = "ACTUAL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Sync id of the budget to download
    #[arg(long, env = "BUDGET_ID")]
    pub budget_id: Option<String>,

    /// Password protecting an end-to-end encrypted budget
    #[arg(long, env = "BUDGET_PASSWORD", hide_env_values = true)]
    pub budget_password: Option<String>,

    /// Local directory the budget is written to
    #[arg(long, env = "ACTUAL_DATA_DIR", default_value = "./data/")]
    pub data_dir: PathBuf,

    /// Optional key=value configuration file
    #[arg(long, env = "ACTUAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ask for the account password when none is configured
    #[arg(long)]
    pub prompt_password: bool,
}

impl FetchConfig {
    /// Load the config file named by `--config`, if any
    pub fn config_file(&self) -> Result<ConfigFile, ConfigError> {
        match &self.config {
            Some(path) => ConfigFile::load(path),
            None => Ok(ConfigFile::default()),
        }
    }

    pub fn apply_config_file(&mut self, file: &ConfigFile) {
        file.fill(&mut self.server_url, "actual_url");
        file.fill(&mut self.password, "actual_password");
        file.fill(&mut self.budget_id, "budget_id");
        file.fill(&mut self.budget_password, "budget_password");
    }

    /// Prompt for the account password when asked to and none is set
    pub fn prompt_if_needed(&mut self) -> Result<()> {
        if self.prompt_password && self.password.is_none() {
            let password = Password::new()
                .with_prompt("Sync server password")
                .allow_empty_password(true)
                .interact()?;
            self.password = Some(password);
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            data_dir: self.data_dir.clone(),
            server_url: self.server_url.clone(),
            password: self.password.clone(),
        }
    }

    pub fn budget_ref(&self) -> BudgetRef {
        BudgetRef {
            budget_id: self.budget_id.clone(),
            budget_password: self.budget_password.clone(),
        }
    }
}

/// Target database for the ETL migration
#[derive(Args, Debug, Clone, Default)]
pub struct MySqlConfig {
    #[arg(long, env = "MYSQL_HOST")]
    pub mysql_host: Option<String>,

    #[arg(long, env = "MYSQL_PORT")]
    pub mysql_port: Option<String>,

    #[arg(long, env = "MYSQL_USER")]
    pub mysql_user: Option<String>,

    #[arg(long, env = "MYSQL_PASSWORD", hide_env_values = true)]
    pub mysql_password: Option<String>,

    #[arg(long, env = "MYSQL_DB")]
    pub mysql_db: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl MySqlConfig {
    pub fn apply_config_file(&mut self, file: &ConfigFile) {
        file.fill(&mut self.mysql_host, "mysql_host");
        file.fill(&mut self.mysql_port, "mysql_port");
        file.fill(&mut self.mysql_user, "mysql_user");
        file.fill(&mut self.mysql_password, "mysql_password");
        file.fill(&mut self.mysql_db, "mysql_db");
    }

    /// `None` when no migration target is configured
    pub fn settings(&self) -> Result<Option<MySqlSettings>, ConfigError> {
        let (Some(host), Some(user), Some(database)) =
            (&self.mysql_host, &self.mysql_user, &self.mysql_db)
        else {
            return Ok(None);
        };
        let port = match &self.mysql_port {
            Some(port) => parse_port("mysql_port", port)?,
            None => 3306,
        };
        Ok(Some(MySqlSettings {
            host: host.clone(),
            port,
            user: user.clone(),
            password: self.mysql_password.clone(),
            database: database.clone(),
        }))
    }
}

/// Outgoing mail for the archive backup
#[derive(Args, Debug, Clone, Default)]
pub struct SmtpConfig {
    #[arg(long, env = "EMAIL_ADDRESS")]
    pub email_address: Option<String>,

    #[arg(long, env = "EMAIL_PASSWORD", hide_env_values = true)]
    pub email_password: Option<String>,

    #[arg(long, env = "RECIPIENT_EMAIL")]
    pub recipient_email: Option<String>,

    #[arg(long, env = "SMTP_SERVER")]
    pub smtp_server: Option<String>,

    #[arg(long, env = "SMTP_PORT")]
    pub smtp_port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub address: String,
    pub password: String,
    pub recipient: String,
    pub server: String,
    pub port: u16,
}

impl SmtpConfig {
    pub fn apply_config_file(&mut self, file: &ConfigFile) {
        file.fill(&mut self.email_address, "email_address");
        file.fill(&mut self.email_password, "email_password");
        file.fill(&mut self.recipient_email, "recipient_email");
        file.fill(&mut self.smtp_server, "smtp_server");
        file.fill(&mut self.smtp_port, "smtp_port");
    }

    pub fn settings(&self) -> Result<SmtpSettings, ConfigError> {
        let require = |key: &str, value: &Option<String>| {
            value.clone().ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: "not set".to_string(),
            })
        };
        let port = require("smtp_port", &self.smtp_port)?;
        Ok(SmtpSettings {
            address: require("email_address", &self.email_address)?,
            password: require("email_password", &self.email_password)?,
            recipient: require("recipient_email", &self.recipient_email)?,
            server: require("smtp_server", &self.smtp_server)?,
            port: parse_port("smtp_port", &port)?,
        })
    }
}

fn parse_port(key: &str, raw: &str) -> Result<u16, ConfigError> {
    raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
