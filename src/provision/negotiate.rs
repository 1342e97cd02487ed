//! Pick the strongest key algorithm the remote sshd supports

use std::ops::ControlFlow;

use tracing::debug;

use crate::config::KeyAlgorithm;
use crate::error::{Result, UrSecretError};
use crate::ssh::{read_lines, ReadLimits, RemoteSession};

/// Lists the public key algorithms of the remote OpenSSH
pub const KEY_QUERY: &str = "ssh -Q key";

/// Map one line of `ssh -Q key` output. Anything that looks like a key
/// algorithm name counts, with RSA as the floor.
fn classify(line: &str) -> Option<KeyAlgorithm> {
    let name = line.trim();
    if name == "ssh-ed25519" {
        Some(KeyAlgorithm::Ed25519)
    } else if name.starts_with("ecdsa-sha2-") {
        Some(KeyAlgorithm::Ecdsa)
    } else if ["ssh-", "rsa-", "sk-"].iter().any(|p| name.starts_with(p)) {
        Some(KeyAlgorithm::Rsa)
    } else {
        None
    }
}

/// Scan the remote's algorithm list. Ed25519 ends the scan at once; ECDSA
/// is remembered while scanning continues; otherwise RSA. Fails when no
/// line names an algorithm before the limits run out.
pub async fn negotiate<S>(session: &mut S, host: &str, limits: ReadLimits) -> Result<KeyAlgorithm>
where
    S: RemoteSession + ?Sized,
{
    let mut channel = session.exec(KEY_QUERY).await?;
    let mut best: Option<KeyAlgorithm> = None;

    read_lines(&mut channel, limits, |line| {
        debug!("{}", line);
        match classify(line) {
            Some(KeyAlgorithm::Ed25519) => {
                best = Some(KeyAlgorithm::Ed25519);
                ControlFlow::Break(())
            }
            found => {
                best = best.max(found);
                ControlFlow::Continue(())
            }
        }
    })
    .await;

    best.ok_or_else(|| UrSecretError::KeyTypeUnknown(host.to_string()))
}
