//! Host identity and credential structures

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UrSecretError};

/// Remote host plus a caller-chosen label for the local context.
///
/// Several local contexts can each hold an independent credential for the
/// same remote; the pair is what names the key files and the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    remote: String,
    local: String,
}

impl HostIdentity {
    pub fn new(remote: impl Into<String>, local: impl Into<String>) -> Result<Self> {
        let remote = remote.into();
        let local = local.into();
        for (what, value) in [("remote", &remote), ("local", &local)] {
            if value.is_empty()
                || value.starts_with('.')
                || value.chars().any(|c| c == '/' || c == '\\' || c.is_whitespace())
            {
                return Err(UrSecretError::InvalidConfig(format!(
                    "invalid {} name: {:?}",
                    what, value
                )));
            }
        }
        Ok(Self { remote, local })
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    /// `<remote>-<local>`, the tag carried in the key comment
    pub fn marker(&self) -> String {
        format!("{}-{}", self.remote, self.local)
    }

    /// Base file name of the dedicated key pair
    pub fn key_file_name(&self) -> String {
        format!("{}-ursecret-{}", self.remote, self.local)
    }
}

/// Supported asymmetric key algorithms, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    Rsa,
    Ecdsa,
    Ed25519,
}

impl KeyAlgorithm {
    /// Arguments for `ssh-keygen` selecting this algorithm
    pub fn keygen_args(self) -> &'static [&'static str] {
        match self {
            KeyAlgorithm::Rsa => &["-t", "rsa", "-b", "4096"],
            KeyAlgorithm::Ecdsa => &["-t", "ecdsa", "-b", "521"],
            KeyAlgorithm::Ed25519 => &["-t", "ed25519", "-a", "100"],
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyAlgorithm::Rsa => "rsa",
            KeyAlgorithm::Ecdsa => "ecdsa",
            KeyAlgorithm::Ed25519 => "ed25519",
        };
        f.write_str(name)
    }
}

/// A (principal, port) pair that accepted authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub principal: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(principal: impl Into<String>, port: u16) -> Self {
        Self {
            principal: principal.into(),
            port,
        }
    }

    pub fn with_algorithm(self, key_algorithm: KeyAlgorithm) -> AccessCredential {
        AccessCredential {
            endpoint: self,
            key_algorithm,
        }
    }

    /// Get the SSH connection string (user@host:port)
    pub fn connection_string(&self, host: &str) -> String {
        format!("{}@{}:{}", self.principal, host, self.port)
    }
}

/// Working identity for one installation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCredential {
    pub endpoint: Endpoint,
    pub key_algorithm: KeyAlgorithm,
}

impl AccessCredential {
    pub fn principal(&self) -> &str {
        &self.endpoint.principal
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }
}

/// What an install leaves behind locally so later get/put calls can skip
/// endpoint discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub remote: String,
    pub local: String,
    pub principal: String,
    pub port: u16,
    pub key_algorithm: KeyAlgorithm,
    pub installed_at: String,
}

impl HostRecord {
    pub fn new(identity: &HostIdentity, credential: &AccessCredential, installed_at: String) -> Self {
        Self {
            remote: identity.remote().to_string(),
            local: identity.local().to_string(),
            principal: credential.principal().to_string(),
            port: credential.port(),
            key_algorithm: credential.key_algorithm,
            installed_at,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.principal.clone(), self.port)
    }
}
