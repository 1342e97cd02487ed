//! ursecret - small secrets on remote hosts behind a restricted SSH key
//!
//! This crate provides:
//! - Discovery of a working user and port on a host
//! - Negotiation of the strongest supported key algorithm
//! - Provisioning of a dedicated key bound to a forced-command handler
//! - A get/put client speaking to that handler

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod provision;
pub mod ssh;

#[cfg(test)]
mod testing;

pub use client::{PutOutcome, SecretClient};
pub use error::{Result, UrSecretError};
