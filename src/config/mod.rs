//! Configuration management for ursecret
//!
//! Handles:
//! - Host identity and discovered credentials
//! - Candidate users, ports and timeouts
//! - Local key and install-record locations

mod host;
mod paths;
mod settings;

pub use host::{AccessCredential, Endpoint, HostIdentity, HostRecord, KeyAlgorithm};
pub use paths::{KeyPair, LocalPaths};
pub use settings::{current_user, Settings, DEFAULT_PORTS, FALLBACK_USERS};
