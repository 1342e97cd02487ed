//! SSH transport on russh

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::{Endpoint, Settings};
use crate::error::{Result, UrSecretError};

use super::lines::{ChannelEvent, ChannelSource};
use super::session::{Auth, Connector, RemoteSession};

/// Identity files tried for ambient authentication, best first
const DEFAULT_IDENTITIES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// SSH client handler
pub struct SshClient {
    host: String,
    port: u16,
    known_hosts: PathBuf,
}

impl SshClient {
    pub fn new(host: &str, port: u16, known_hosts: PathBuf) -> Self {
        Self {
            host: host.to_string(),
            port,
            known_hosts,
        }
    }
}

#[async_trait]
impl client::Handler for SshClient {
    type Error = russh::Error;

    /// Known keys must match; unknown hosts are accepted and left unrecorded
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match russh_keys::check_known_hosts_path(
            &self.host,
            self.port,
            server_public_key,
            &self.known_hosts,
        ) {
            Ok(true) => Ok(true),
            Ok(false) => {
                debug!("{}:{} not in known_hosts, accepting", self.host, self.port);
                Ok(true)
            }
            Err(e) => {
                warn!("host key for {}:{} rejected: {}", self.host, self.port, e);
                Ok(false)
            }
        }
    }
}

/// Who we were talking to, for error context
#[derive(Debug, Clone)]
struct Target {
    host: String,
    endpoint: Endpoint,
}

impl Target {
    fn fail(&self, message: impl Display) -> UrSecretError {
        UrSecretError::Transport {
            host: self.host.clone(),
            principal: self.endpoint.principal.clone(),
            port: self.endpoint.port,
            message: message.to_string(),
        }
    }
}

/// Opens russh sessions
pub struct SshConnector {
    config: Arc<client::Config>,
    timeout: Duration,
    ssh_dir: PathBuf,
}

impl SshConnector {
    /// `settings.timeout` bounds connect, key exchange and authentication
    /// together; a session idle for `settings.command_timeout` is dropped
    pub fn new(settings: &Settings, ssh_dir: &Path) -> Self {
        let config = client::Config {
            inactivity_timeout: Some(settings.command_timeout),
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            timeout: settings.timeout,
            ssh_dir: ssh_dir.to_path_buf(),
        }
    }

    async fn authenticate_ambient(
        &self,
        handle: &mut client::Handle<SshClient>,
        principal: &str,
    ) -> std::result::Result<bool, russh::Error> {
        #[cfg(unix)]
        {
            match russh_keys::agent::client::AgentClient::connect_env().await {
                Ok(mut agent) => {
                    let identities = agent.request_identities().await.unwrap_or_default();
                    for key in identities {
                        let (returned, result) =
                            handle.authenticate_future(principal, key, agent).await;
                        agent = returned;
                        match result {
                            Ok(true) => return Ok(true),
                            Ok(false) => {}
                            Err(e) => debug!("agent signing failed: {:?}", e),
                        }
                    }
                }
                Err(e) => debug!("no ssh-agent: {}", e),
            }
        }

        for name in DEFAULT_IDENTITIES {
            let path = self.ssh_dir.join(name);
            if !path.is_file() {
                continue;
            }
            match russh_keys::load_secret_key(&path, None) {
                Ok(key) => {
                    if handle.authenticate_publickey(principal, Arc::new(key)).await? {
                        return Ok(true);
                    }
                }
                Err(e) => debug!("skipping {}: {}", path.display(), e),
            }
        }

        Ok(false)
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, host: &str, endpoint: &Endpoint, auth: &Auth) -> Result<SshSession> {
        let target = Target {
            host: host.to_string(),
            endpoint: endpoint.clone(),
        };

        let handler = SshClient::new(host, endpoint.port, self.ssh_dir.join("known_hosts"));
        let attempt = async {
            // The handshake only completes once authentication starts
            let mut handle = client::connect(self.config.clone(), (host, endpoint.port), handler)
                .await
                .map_err(|e| target.fail(e))?;

            let authenticated = match auth {
                Auth::Ambient => self
                    .authenticate_ambient(&mut handle, &endpoint.principal)
                    .await
                    .map_err(|e| target.fail(e))?,
                Auth::Key(path) => {
                    let key = russh_keys::load_secret_key(path, None).map_err(|e| {
                        target.fail(format!("cannot load {}: {}", path.display(), e))
                    })?;
                    handle
                        .authenticate_publickey(endpoint.principal.as_str(), Arc::new(key))
                        .await
                        .map_err(|e| target.fail(e))?
                }
            };

            if !authenticated {
                return Err(target.fail("Invalid username, or password required"));
            }
            Ok::<_, UrSecretError>(handle)
        };

        let handle = tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| target.fail("connection timed out"))??;

        Ok(SshSession {
            handle,
            target,
            sftp: None,
        })
    }
}

/// Authenticated russh session with a lazily opened SFTP channel
pub struct SshSession {
    handle: client::Handle<SshClient>,
    target: Target,
    sftp: Option<SftpSession>,
}

impl SshSession {
    async fn sftp(&mut self) -> Result<&SftpSession> {
        let sftp = match self.sftp.take() {
            Some(sftp) => sftp,
            None => {
                let mut channel = self
                    .handle
                    .channel_open_session()
                    .await
                    .map_err(|e| self.target.fail(e))?;
                channel
                    .request_subsystem(true, "sftp")
                    .await
                    .map_err(|e| self.target.fail(e))?;
                SftpSession::new(channel.into_stream())
                    .await
                    .map_err(|e| self.target.fail(e))?
            }
        };
        Ok(self.sftp.insert(sftp))
    }
}

fn permissions(mode: u32) -> FileAttributes {
    let mut attrs = FileAttributes::empty();
    attrs.permissions = Some(mode);
    attrs
}

#[async_trait]
impl RemoteSession for SshSession {
    type Channel = ExecChannel;

    async fn exec(&mut self, command: &str) -> Result<ExecChannel> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| self.target.fail(e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| self.target.fail(e))?;
        Ok(ExecChannel { channel })
    }

    async fn ensure_dir(&mut self, path: &str, mode: u32) -> Result<()> {
        let target = self.target.clone();
        let sftp = self.sftp().await?;
        if sftp.try_exists(path).await.map_err(|e| target.fail(e))? {
            return Ok(());
        }
        sftp.create_dir(path).await.map_err(|e| target.fail(e))?;
        sftp.set_metadata(path, permissions(mode))
            .await
            .map_err(|e| target.fail(e))
    }

    async fn write_file(&mut self, path: &str, contents: &[u8], mode: u32) -> Result<()> {
        let target = self.target.clone();
        let sftp = self.sftp().await?;
        let mut file = sftp.create(path).await.map_err(|e| target.fail(e))?;
        file.write_all(contents).await?;
        file.shutdown().await?;
        sftp.set_metadata(path, permissions(mode))
            .await
            .map_err(|e| target.fail(e))
    }

    async fn append_file(&mut self, path: &str, contents: &[u8], mode: u32) -> Result<()> {
        let target = self.target.clone();
        let sftp = self.sftp().await?;
        let existed = sftp.try_exists(path).await.map_err(|e| target.fail(e))?;
        let flags = OpenFlags::CREATE | OpenFlags::APPEND | OpenFlags::WRITE;
        let mut file = sftp
            .open_with_flags(path, flags)
            .await
            .map_err(|e| target.fail(e))?;
        file.write_all(contents).await?;
        file.shutdown().await?;
        if !existed {
            sftp.set_metadata(path, permissions(mode))
                .await
                .map_err(|e| target.fail(e))?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.sftp = None;
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .ok();
    }
}

/// A running remote command
pub struct ExecChannel {
    channel: Channel<Msg>,
}

#[async_trait]
impl ChannelSource for ExecChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { data } => return Some(ChannelEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    return Some(ChannelEvent::Stderr(data.to_vec()))
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ChannelEvent::Exit(exit_status))
                }
                ChannelMsg::Close => return Some(ChannelEvent::Closed),
                _ => {}
            }
        }
    }
}
