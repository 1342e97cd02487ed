//! Transport seams: connecting, running commands, writing remote files

use std::ops::ControlFlow;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::Endpoint;
use crate::error::Result;

use super::lines::{read_lines, ChannelSource, ReadLimits};

/// How a session proves its identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// Whatever the local account already has: agent identities, then the
    /// default identity files
    Ambient,
    /// Exactly this private key and nothing else
    Key(PathBuf),
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Session: RemoteSession;

    async fn connect(&self, host: &str, endpoint: &Endpoint, auth: &Auth) -> Result<Self::Session>;
}

/// An authenticated session. Remote paths are relative to the remote home.
#[async_trait]
pub trait RemoteSession: Send {
    type Channel: ChannelSource;

    /// Start `command` on a fresh channel
    async fn exec(&mut self, command: &str) -> Result<Self::Channel>;

    /// Create `path` with `mode` unless it already exists
    async fn ensure_dir(&mut self, path: &str, mode: u32) -> Result<()>;

    /// Create or truncate `path`, write `contents`, then set `mode`
    async fn write_file(&mut self, path: &str, contents: &[u8], mode: u32) -> Result<()>;

    /// Append `contents` to `path`; a newly created file gets `mode`
    async fn append_file(&mut self, path: &str, contents: &[u8], mode: u32) -> Result<()>;

    async fn close(&mut self);
}

/// Everything a finished command produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_status: Option<u32>,
    pub timed_out: bool,
}

/// Run `command` and collect all of its output
pub async fn run_command<S>(session: &mut S, command: &str, limits: ReadLimits) -> Result<CommandOutput>
where
    S: RemoteSession + ?Sized,
{
    let mut channel = session.exec(command).await?;
    let mut stdout = Vec::new();
    let done = read_lines(&mut channel, limits, |line| {
        stdout.push(line.to_string());
        ControlFlow::Continue(())
    })
    .await;

    Ok(CommandOutput {
        stdout,
        stderr: done.stderr,
        exit_status: done.exit_status,
        timed_out: done.timed_out,
    })
}
