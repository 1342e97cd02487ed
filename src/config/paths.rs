//! Local file layout
//!
//! - `~/.ssh/<remote>-ursecret-<local>` and `.pub`: dedicated key pair
//! - `<config_dir>/ursecret/config.json`: optional settings overrides
//! - `<config_dir>/ursecret/hosts/<remote>-<local>.json`: install record

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, UrSecretError};

use super::{HostIdentity, HostRecord};

const APP_DIR: &str = "ursecret";
const CONFIG_FILE: &str = "config.json";
const HOSTS_DIR: &str = "hosts";

/// Private and public halves of a dedicated key, one pair per identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_path: PathBuf,
    pub public_path: PathBuf,
}

impl KeyPair {
    pub fn exists(&self) -> bool {
        self.private_path.exists() || self.public_path.exists()
    }
}

#[derive(Debug, Clone)]
pub struct LocalPaths {
    ssh_dir: PathBuf,
    app_dir: PathBuf,
}

impl LocalPaths {
    pub fn new(ssh_dir: impl Into<PathBuf>, app_dir: impl Into<PathBuf>) -> Self {
        Self {
            ssh_dir: ssh_dir.into(),
            app_dir: app_dir.into(),
        }
    }

    /// Standard locations for the current user
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| UrSecretError::InvalidConfig("cannot locate home directory".into()))?;
        let config = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
        Ok(Self::new(home.join(".ssh"), config.join(APP_DIR)))
    }

    pub fn ssh_dir(&self) -> &Path {
        &self.ssh_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.app_dir.join(CONFIG_FILE)
    }

    pub fn key_pair(&self, identity: &HostIdentity) -> KeyPair {
        let private_path = self.ssh_dir.join(identity.key_file_name());
        let mut public_path = private_path.clone().into_os_string();
        public_path.push(".pub");
        KeyPair {
            private_path,
            public_path: public_path.into(),
        }
    }

    /// Private key of an installed identity, if present
    pub fn locate_key(&self, identity: &HostIdentity) -> Result<PathBuf> {
        let pair = self.key_pair(identity);
        if pair.private_path.is_file() {
            Ok(pair.private_path)
        } else {
            Err(UrSecretError::KeyNotFound(pair.private_path))
        }
    }

    fn host_record_path(&self, identity: &HostIdentity) -> PathBuf {
        self.app_dir
            .join(HOSTS_DIR)
            .join(format!("{}.json", identity.marker()))
    }

    pub fn save_host_record(&self, identity: &HostIdentity, record: &HostRecord) -> Result<()> {
        let path = self.host_record_path(identity);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(record)?;
        let mut file = File::create(&path)?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        Ok(())
    }

    /// Install record for `identity`; `None` when absent
    pub fn load_host_record(&self, identity: &HostIdentity) -> Result<Option<HostRecord>> {
        let path = self.host_record_path(identity);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
