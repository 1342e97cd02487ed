//! Command-line front end

pub mod get;
pub mod install;
pub mod put;
pub mod serve;

use std::fmt::Display;
use std::time::Duration;

use colored::Colorize;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use ursecret::config::{HostIdentity, LocalPaths, Settings};
use ursecret::{Result, UrSecretError};

/// Everything a command needs to know about the invocation
pub struct Context {
    pub identity: HostIdentity,
    pub paths: LocalPaths,
    pub settings: Settings,
}

impl Context {
    /// Resolve the identity, the local layout and the settings file,
    /// command-line values taking precedence
    pub fn new(
        remote: &str,
        local: &str,
        users: Vec<String>,
        ports: Vec<u16>,
        timeout: Option<u64>,
    ) -> Result<Self> {
        let identity = HostIdentity::new(remote, local)?;
        let paths = LocalPaths::discover()?;
        let settings = Settings::load(&paths.config_file())?
            .with_users(users)
            .with_ports(ports)
            .with_timeout(timeout.map(Duration::from_secs));
        settings.validate()?;

        Ok(Self {
            identity,
            paths,
            settings,
        })
    }

    pub fn remote(&self) -> &str {
        self.identity.remote()
    }
}

/// One runtime per invocation; every remote step runs in order on it
pub fn runtime() -> Result<Runtime> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime)
}

/// Diagnostics go to stderr so that stdout stays parseable
pub fn init_logging(debug: bool) {
    let default = if debug { "warn,ursecret=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

pub fn info(message: impl Display) {
    println!("{} {}", "I:".green().bold(), message);
}

pub fn secret(value: &str) {
    println!("{} {}", "K:".cyan().bold(), value);
}

/// Relay a line the remote handler printed
pub fn relay(line: &str) {
    println!("{} {}", "E (from remote):".yellow(), line);
}

pub fn fatal(error: &UrSecretError) {
    if let UrSecretError::CouldNotGetSecret { remote } = error {
        for line in remote {
            relay(line);
        }
    }
    eprintln!("{} {}", "F:".red().bold(), error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_drives_timers() {
        let runtime = runtime().unwrap();

        let value = runtime.block_on(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            7
        });

        assert_eq!(value, 7);
    }
}
