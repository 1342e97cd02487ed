//! File-backed secret storage on the remote side
//!
//! One file per key under `~/.ursecret`. The directory is owner-only and
//! created on first write. There is no locking: callers must not run
//! concurrent puts against the same directory.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{validate_key, ProtocolError};

pub const SECRETS_DIR: &str = ".ursecret";

#[derive(Debug, Clone)]
pub struct SecretStore {
    dir: PathBuf,
}

impl SecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.ursecret` of the current account
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join(SECRETS_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, key: &str) -> Result<String, ProtocolError> {
        let path = self.dir.join(validate_key(key)?);
        if !path.is_file() {
            return Err(ProtocolError::UnknownKey);
        }
        Ok(fs::read_to_string(path)?)
    }

    pub fn put(&self, key: &str, value: &str) -> Result<(), ProtocolError> {
        let path = self.dir.join(validate_key(key)?);
        self.ensure_dir()?;

        let mut file = create_private(&path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn ensure_dir(&self) -> std::io::Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}
