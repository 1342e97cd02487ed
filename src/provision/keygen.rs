//! Key pair generation through the external `ssh-keygen`

use std::path::Path;
use std::process::{Command, Stdio};

use ssh_key::{HashAlg, PublicKey};
use tracing::debug;

use crate::config::KeyAlgorithm;
use crate::error::{Result, UrSecretError};

/// Something that can write a private key to `private_path` and its public
/// half to `private_path.pub`
pub trait KeyGenerator {
    fn generate(&self, algorithm: KeyAlgorithm, private_path: &Path, comment: &str) -> Result<()>;
}

/// Runs OpenSSH `ssh-keygen` with an empty passphrase
#[derive(Debug, Clone)]
pub struct SshKeygen {
    program: String,
}

impl SshKeygen {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SshKeygen {
    fn default() -> Self {
        Self::new("ssh-keygen")
    }
}

impl KeyGenerator for SshKeygen {
    fn generate(&self, algorithm: KeyAlgorithm, private_path: &Path, comment: &str) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .arg("-f")
            .arg(private_path)
            .args(["-C", comment, "-N", ""])
            .args(algorithm.keygen_args())
            .stdin(Stdio::null());
        debug!("running {:?}", command);

        let output = command.output().map_err(|e| {
            UrSecretError::KeyGeneration(format!("cannot run {}: {}", self.program, e))
        })?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("{}", line);
        }

        if !output.status.success() {
            return Err(UrSecretError::KeyGeneration(format!(
                "{} failed ({}): {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Parse an OpenSSH public key line
pub fn parse_public_key(line: &str) -> Result<PublicKey> {
    PublicKey::from_openssh(line.trim())
        .map_err(|e| UrSecretError::KeyGeneration(format!("unusable public key: {}", e)))
}

/// SHA-256 fingerprint as printed by `ssh-keygen -l`
pub fn fingerprint(public_key: &PublicKey) -> String {
    public_key.fingerprint(HashAlg::Sha256).to_string()
}
