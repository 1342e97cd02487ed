//! Provisioning a restricted credential on a remote host
//!
//! Install order: look for an existing entry, (re)write the handler, stop if
//! an entry exists, generate the key pair, append the restricted entry.
//! Only the idempotent handler write can happen before a duplicate is
//! detected. Concurrent installs against one account are not guarded.

mod authorized;
mod bootstrap;
mod keygen;
mod negotiate;

use std::fs;

use tracing::debug;

use crate::config::{AccessCredential, HostIdentity, HostRecord, KeyPair, LocalPaths};
use crate::error::{Result, UrSecretError};
use crate::protocol::{HANDLER_NAME, HANDLER_SCRIPT};
use crate::ssh::{run_command, ReadLimits, RemoteSession};

pub use authorized::{has_marker, key_comment, timestamp, AuthorizedEntry, AUTHORIZED_KEYS, RESTRICTIONS};
pub use bootstrap::{discover, Connected};
pub use keygen::{fingerprint, parse_public_key, KeyGenerator, SshKeygen};
pub use negotiate::{negotiate, KEY_QUERY};

const REMOTE_SSH_DIR: &str = ".ssh";

/// Steps reported while installing
#[derive(Debug)]
pub enum Progress<'a> {
    HandlerInstalled { path: &'a str },
    KeyGenerated { pair: &'a KeyPair },
    EntryInstalled { fingerprint: &'a str },
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub key_pair: KeyPair,
    pub fingerprint: String,
    pub record: HostRecord,
}

/// Remote path of the installed handler, relative to the remote home
pub fn handler_path() -> String {
    format!("{}/{}", REMOTE_SSH_DIR, HANDLER_NAME)
}

pub struct Provisioner<'a, S: ?Sized, G: ?Sized> {
    session: &'a mut S,
    identity: &'a HostIdentity,
    credential: &'a AccessCredential,
    paths: &'a LocalPaths,
    keygen: &'a G,
    limits: ReadLimits,
    timestamp: String,
}

impl<'a, S, G> Provisioner<'a, S, G>
where
    S: RemoteSession + ?Sized,
    G: KeyGenerator + ?Sized,
{
    pub fn new(
        session: &'a mut S,
        identity: &'a HostIdentity,
        credential: &'a AccessCredential,
        paths: &'a LocalPaths,
        keygen: &'a G,
        limits: ReadLimits,
    ) -> Self {
        Self {
            session,
            identity,
            credential,
            paths,
            keygen,
            limits,
            timestamp: timestamp(),
        }
    }

    /// Current `authorized_keys` lines, and whether our marker is among them
    pub async fn get_authorized_keys(&mut self) -> Result<(Vec<String>, bool)> {
        let output = run_command(&mut *self.session, "cat ~/.ssh/authorized_keys", self.limits).await?;
        for line in output.stdout.iter().chain(&output.stderr) {
            debug!("{}", line);
        }
        let found = has_marker(&output.stdout, self.identity);
        Ok((output.stdout, found))
    }

    /// Write the handler into the remote `~/.ssh`, owner-executable only.
    /// Overwrites any previous version.
    pub async fn install_handler(&mut self) -> Result<String> {
        let path = handler_path();
        self.session.ensure_dir(REMOTE_SSH_DIR, 0o700).await?;
        self.session
            .write_file(&path, HANDLER_SCRIPT.as_bytes(), 0o700)
            .await?;
        Ok(path)
    }

    /// Generate the dedicated key pair for the negotiated algorithm.
    /// Refuses to touch an existing pair.
    pub fn generate_key_pair(&self) -> Result<KeyPair> {
        let pair = self.paths.key_pair(self.identity);
        for path in [&pair.private_path, &pair.public_path] {
            if path.exists() {
                return Err(UrSecretError::KeyExists(path.clone()));
            }
        }

        let ssh_dir = self.paths.ssh_dir();
        if !ssh_dir.exists() {
            fs::create_dir_all(ssh_dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(ssh_dir, fs::Permissions::from_mode(0o700))?;
            }
        }

        let comment = key_comment(self.credential.principal(), self.identity, &self.timestamp);
        self.keygen
            .generate(self.credential.key_algorithm, &pair.private_path, &comment)?;

        if !pair.private_path.is_file() || !pair.public_path.is_file() {
            return Err(UrSecretError::KeyGeneration(format!(
                "no key pair at {}",
                pair.private_path.display()
            )));
        }
        Ok(pair)
    }

    /// Append the restricted entry for `pair` to the remote `authorized_keys`,
    /// unless an entry for this identity is already there
    pub async fn install_authorized_entry(&mut self, pair: &KeyPair) -> Result<String> {
        let (_, found) = self.get_authorized_keys().await?;
        if found {
            return Err(self.conflict());
        }

        let line = fs::read_to_string(&pair.public_path)?;
        let public_key = parse_public_key(&line)?;
        let entry = AuthorizedEntry::new(&handler_path(), &line);

        self.session
            .append_file(AUTHORIZED_KEYS, format!("{}\n", entry).as_bytes(), 0o600)
            .await?;
        Ok(fingerprint(&public_key))
    }

    /// The whole install, reporting each completed step
    pub async fn install<F>(&mut self, mut progress: F) -> Result<InstallReport>
    where
        F: FnMut(Progress<'_>),
    {
        let (_, found) = self.get_authorized_keys().await?;

        let path = self.install_handler().await?;
        progress(Progress::HandlerInstalled { path: &path });
        if found {
            return Err(self.conflict());
        }

        let key_pair = self.generate_key_pair()?;
        progress(Progress::KeyGenerated { pair: &key_pair });

        let fingerprint = self.install_authorized_entry(&key_pair).await?;
        progress(Progress::EntryInstalled {
            fingerprint: &fingerprint,
        });

        let record = HostRecord::new(self.identity, self.credential, self.timestamp.clone());
        self.paths.save_host_record(self.identity, &record)?;

        Ok(InstallReport {
            key_pair,
            fingerprint,
            record,
        })
    }

    fn conflict(&self) -> UrSecretError {
        UrSecretError::EntryExists {
            remote: self.identity.remote().to_string(),
            marker: self.identity.marker(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{Endpoint, KeyAlgorithm};
    use crate::ssh::{Auth, Connector};
    use crate::testing::{FakeKeygen, FakeRemote, FakeSession};

    struct Fixture {
        remote: FakeRemote,
        session: FakeSession,
        identity: HostIdentity,
        credential: AccessCredential,
        paths: LocalPaths,
        keygen: FakeKeygen,
        _local: tempfile::TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            let remote = FakeRemote::accepting(&[("root", 22)]);
            let endpoint = Endpoint::new("root", 22);
            let session = remote.connect("nas", &endpoint, &Auth::Ambient).await.unwrap();
            let local = tempfile::tempdir().unwrap();
            Self {
                remote,
                session,
                identity: HostIdentity::new("nas", "work").unwrap(),
                credential: endpoint.with_algorithm(KeyAlgorithm::Ed25519),
                paths: LocalPaths::new(local.path().join("ssh"), local.path().join("app")),
                keygen: FakeKeygen::default(),
                _local: local,
            }
        }

        fn provisioner(&mut self) -> Provisioner<'_, FakeSession, FakeKeygen> {
            Provisioner::new(
                &mut self.session,
                &self.identity,
                &self.credential,
                &self.paths,
                &self.keygen,
                ReadLimits {
                    poll: Duration::from_millis(10),
                    idle: Duration::from_secs(1),
                    total: Duration::from_secs(5),
                },
            )
        }
    }

    #[tokio::test]
    async fn test_fresh_install() {
        let mut fx = Fixture::new().await;
        let mut steps = Vec::new();

        let report = fx
            .provisioner()
            .install(|step| steps.push(format!("{:?}", step)))
            .await
            .unwrap();

        assert_eq!(steps.len(), 3);
        assert!(report.key_pair.private_path.is_file());
        assert!(report.fingerprint.starts_with("SHA256:"));
        assert_eq!(fx.keygen.calls(), vec![KeyAlgorithm::Ed25519]);

        let state = fx.remote.state();
        assert_eq!(state.text(".ssh/ursecret-helper"), HANDLER_SCRIPT);
        assert_eq!(state.modes[".ssh/ursecret-helper"], 0o700);
        assert_eq!(state.modes[AUTHORIZED_KEYS], 0o600);
        let entry = state.text(AUTHORIZED_KEYS);
        assert!(entry.starts_with("command=\"./.ssh/ursecret-helper\",no-agent-forwarding"));
        assert!(entry.trim_end().ends_with(&format!("root@nas-work-{}", report.record.installed_at)));
        drop(state);

        let (_, found) = fx.provisioner().get_authorized_keys().await.unwrap();
        assert!(found);
        assert_eq!(fx.paths.load_host_record(&fx.identity).unwrap(), Some(report.record));
    }

    #[tokio::test]
    async fn test_handler_install_is_idempotent() {
        let mut fx = Fixture::new().await;

        fx.provisioner().install_handler().await.unwrap();
        let first = fx.remote.state().text(".ssh/ursecret-helper");
        fx.provisioner().install_handler().await.unwrap();

        assert_eq!(fx.remote.state().text(".ssh/ursecret-helper"), first);
    }

    #[tokio::test]
    async fn test_existing_entry_aborts_before_keygen() {
        let mut fx = Fixture::new().await;
        let existing = "ssh-ed25519 AAAA root@nas-work-20200101-000000\n";
        fx.remote.state().put_file(AUTHORIZED_KEYS, existing);

        let err = fx.provisioner().install(|_| {}).await.unwrap_err();

        assert_eq!(err.to_string(), "key for nas-work found on nas: will not replace");
        assert!(fx.keygen.calls().is_empty());
        assert!(!fx.paths.key_pair(&fx.identity).exists());
        assert_eq!(fx.remote.state().text(AUTHORIZED_KEYS), existing);
        assert!(fx.remote.state().files.contains_key(".ssh/ursecret-helper"));
    }

    #[tokio::test]
    async fn test_existing_local_key_leaves_remote_alone() {
        let mut fx = Fixture::new().await;
        let pair = fx.paths.key_pair(&fx.identity);
        fs::create_dir_all(pair.private_path.parent().unwrap()).unwrap();
        fs::write(&pair.private_path, "old").unwrap();

        let err = fx.provisioner().install(|_| {}).await.unwrap_err();

        assert!(matches!(err, UrSecretError::KeyExists(_)));
        assert_eq!(fs::read_to_string(&pair.private_path).unwrap(), "old");
        assert!(!fx.remote.state().files.contains_key(AUTHORIZED_KEYS));
    }

    #[tokio::test]
    async fn test_authorized_entry_refuses_duplicate() {
        let mut fx = Fixture::new().await;
        let pair = fx.provisioner().generate_key_pair().unwrap();
        fx.provisioner().install_authorized_entry(&pair).await.unwrap();

        let err = fx
            .provisioner()
            .install_authorized_entry(&pair)
            .await
            .unwrap_err();

        assert!(matches!(err, UrSecretError::EntryExists { .. }));
        assert_eq!(fx.remote.state().text(AUTHORIZED_KEYS).lines().count(), 1);
    }
}
