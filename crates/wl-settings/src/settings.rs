use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use wl_session::config::DEFAULT_BASE_URL;
use wl_session::{EndpointPaths, HttpTimeouts, SessionConfig};

use crate::SettingsError;

/// Prefix of the environment variables that override the settings file
pub const ENV_PREFIX: &str = "WANDERLOG_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub user_agent: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub paths: EndpointPaths,
}

impl Default for ApiSettings {
    fn default() -> Self {
        let timeouts = HttpTimeouts::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            connect_timeout_secs: timeouts.connect.as_secs(),
            request_timeout_secs: timeouts.request.as_secs(),
            paths: EndpointPaths::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sign out after this many minutes without activity
    pub idle_timeout_minutes: u64,
    /// Forget a stored credential after this many days
    pub credential_retention_days: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 30,
            credential_retention_days: 7,
        }
    }
}

impl Settings {
    /// Apply `WANDERLOG_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `WANDERLOG_*` overrides from `vars`. Unknown variables are ignored.
    pub fn apply_overrides(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), SettingsError> {
        for (var, value) in vars {
            let Some(key) = var.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match key {
                "BASE_URL" => self.api.base_url = value,
                "USER_AGENT" => self.api.user_agent = Some(value),
                "CONNECT_TIMEOUT_SECS" => self.api.connect_timeout_secs = parse(&var, &value)?,
                "REQUEST_TIMEOUT_SECS" => self.api.request_timeout_secs = parse(&var, &value)?,
                "REFRESH_PATH" => self.api.paths.refresh = value,
                "LOGIN_PATH" => self.api.paths.login = value,
                "LOGOUT_PATH" => self.api.paths.logout = value,
                "REGISTER_PATH" => self.api.paths.register = value,
                "PROFILE_PATH" => self.api.paths.profile = value,
                "IDLE_TIMEOUT_MINUTES" => {
                    self.session.idle_timeout_minutes = parse(&var, &value)?
                }
                "CREDENTIAL_RETENTION_DAYS" => {
                    self.session.credential_retention_days = parse(&var, &value)?
                }
                _ => continue,
            }
            debug!("Setting overridden by {}", var);
        }
        Ok(())
    }

    /// Build the session layer's configuration
    pub fn to_session_config(&self) -> Result<SessionConfig, SettingsError> {
        let base_url =
            Url::parse(&self.api.base_url).map_err(|e| SettingsError::InvalidValue {
                field: "api.base_url",
                reason: e.to_string(),
            })?;
        if self.session.idle_timeout_minutes == 0 {
            return Err(SettingsError::InvalidValue {
                field: "session.idle_timeout_minutes",
                reason: "must be at least one minute".to_string(),
            });
        }

        let idle_timeout = seconds(
            "session.idle_timeout_minutes",
            self.session.idle_timeout_minutes,
            60,
        )?;
        let retention = seconds(
            "session.credential_retention_days",
            self.session.credential_retention_days,
            24 * 60 * 60,
        )?;

        let mut config = SessionConfig::new(base_url).with_idle_timeout(idle_timeout);
        config.credential_retention = retention;
        config.http_timeouts = HttpTimeouts {
            connect: Duration::from_secs(self.api.connect_timeout_secs),
            request: Duration::from_secs(self.api.request_timeout_secs),
        };
        config.paths = self.api.paths.clone();
        if self.api.user_agent.is_some() {
            config.user_agent = self.api.user_agent.clone();
        }
        Ok(config)
    }
}

fn seconds(field: &'static str, count: u64, unit_secs: u64) -> Result<Duration, SettingsError> {
    count
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| SettingsError::InvalidValue {
            field,
            reason: format!("{count} is too large"),
        })
}

fn parse(var: &str, value: &str) -> Result<u64, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidOverride {
            var: var.to_string(),
            value: value.to_string(),
        })
}
