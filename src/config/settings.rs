//! Runtime settings: candidate principals, ports and timeouts

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, UrSecretError};
use crate::ssh::ReadLimits;

/// Accounts tried after the invoking one
pub const FALLBACK_USERS: &[&str] = &["root", "pi"];
/// Ports tried for every candidate account
pub const DEFAULT_PORTS: &[u16] = &[22, 222, 993];

const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
const POLL_SLICE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct Settings {
    /// Candidate principals, tried in order (outer loop)
    pub users: Vec<String>,
    /// Candidate ports, tried in order (inner loop)
    pub ports: Vec<u16>,
    /// Connect timeout, also the idle limit while reading a channel
    pub timeout: Duration,
    /// Upper bound for one remote command, whatever the remote does
    pub command_timeout: Duration,
}

/// On-disk overrides, every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    users: Option<Vec<String>>,
    ports: Option<Vec<u16>>,
    timeout_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut users = Vec::new();
        if let Some(me) = current_user() {
            users.push(me);
        }
        for user in FALLBACK_USERS {
            if !users.iter().any(|u| u == user) {
                users.push(user.to_string());
            }
        }

        Self {
            users,
            ports: DEFAULT_PORTS.to_vec(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Defaults, overlaid with `path` when it exists
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = Self::default();
        if !path.exists() {
            return Ok(settings);
        }

        let content = fs::read_to_string(path)?;
        let file: SettingsFile = serde_json::from_str(&content).map_err(|e| {
            UrSecretError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;

        if let Some(users) = file.users {
            settings.users = users;
        }
        if let Some(ports) = file.ports {
            settings.ports = ports;
        }
        if let Some(secs) = file.timeout_secs {
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.command_timeout_secs {
            settings.command_timeout = Duration::from_secs(secs);
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn with_users(mut self, users: Vec<String>) -> Self {
        if !users.is_empty() {
            self.users = users;
        }
        self
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        if !ports.is_empty() {
            self.ports = ports;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let Some(timeout) = timeout {
            self.timeout = timeout;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.users.is_empty() {
            return Err(UrSecretError::InvalidConfig("no candidate users".into()));
        }
        if self.ports.is_empty() {
            return Err(UrSecretError::InvalidConfig("no candidate ports".into()));
        }
        if self.timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(UrSecretError::InvalidConfig("timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits {
            poll: POLL_SLICE.min(self.timeout),
            idle: self.timeout,
            total: self.command_timeout,
        }
    }
}

/// Name of the invoking local account
pub fn current_user() -> Option<String> {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.is_empty())
}
