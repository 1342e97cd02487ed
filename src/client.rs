//! Secret get/put over the dedicated key
//!
//! The session is authenticated with the provisioned private key only; the
//! remote side answers through the forced handler. Callers must not run
//! concurrent puts against the same remote account.

use std::ops::ControlFlow;

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{Endpoint, HostIdentity, LocalPaths, Settings};
use crate::error::{Result, UrSecretError};
use crate::protocol::{decode_value, Request};
use crate::provision::discover;
use crate::ssh::{read_lines, run_command, Auth, Connector, ReadLimits, RemoteSession};

/// What the handler said about a put
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// Lines the handler printed on either stream
    pub remote: Vec<String>,
    pub exit_status: Option<u32>,
}

pub struct SecretClient<S> {
    session: S,
    endpoint: Endpoint,
    limits: ReadLimits,
}

impl<S: RemoteSession> SecretClient<S> {
    pub fn new(session: S, endpoint: Endpoint, limits: ReadLimits) -> Self {
        Self {
            session,
            endpoint,
            limits,
        }
    }

    /// Open a session with the identity's dedicated key: the recorded
    /// endpoint first, then every candidate user and port
    pub async fn connect<C>(
        connector: &C,
        identity: &HostIdentity,
        paths: &LocalPaths,
        settings: &Settings,
    ) -> Result<Self>
    where
        C: Connector<Session = S>,
    {
        let key = paths.locate_key(identity)?;
        debug!("located {}", key.display());
        let auth = Auth::Key(key);
        let host = identity.remote();

        if let Some(record) = paths.load_host_record(identity)? {
            let endpoint = record.endpoint();
            match connector.connect(host, &endpoint, &auth).await {
                Ok(session) => return Ok(Self::new(session, endpoint, settings.read_limits())),
                Err(e) => debug!("recorded endpoint failed: {}", e),
            }
        }

        let connected = discover(connector, host, &settings.users, &settings.ports, &auth).await?;
        Ok(Self::new(
            connected.session,
            connected.endpoint,
            settings.read_limits(),
        ))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// First stdout line of `get <key>`, decoded
    pub async fn get(&mut self, key: &str) -> Result<Zeroizing<String>> {
        let request = Request::get(key)?;
        let mut channel = self.session.exec(&request.to_string()).await?;

        let mut token: Option<Zeroizing<String>> = None;
        let done = read_lines(&mut channel, self.limits, |line| {
            token = Some(Zeroizing::new(line.trim().to_string()));
            ControlFlow::Break(())
        })
        .await;

        match token {
            Some(token) => Ok(Zeroizing::new(decode_value(&token)?)),
            None => Err(UrSecretError::CouldNotGetSecret { remote: done.stderr }),
        }
    }

    /// Send `put <key> <value>`. Output from the handler is returned for the
    /// caller to relay; it is not an error by itself.
    pub async fn put(&mut self, key: &str, value: &str) -> Result<PutOutcome> {
        let command = Zeroizing::new(Request::put(key, value)?.to_string());
        let output = run_command(&mut self.session, &command, self.limits).await?;

        let mut remote = output.stdout;
        remote.extend(output.stderr);
        Ok(PutOutcome {
            remote,
            exit_status: output.exit_status,
        })
    }

    pub async fn close(mut self) {
        self.session.close().await;
    }
}
