//! The restricted remote command
//!
//! `HANDLER_SCRIPT` is what gets installed on hosts: plain `sh`, so it runs
//! on anything with an sshd. `serve` is the same handler in Rust for hosts
//! that carry this binary (`ursecret --serve`).

use std::io::Write;

use super::{ProtocolError, Request, SecretStore};

/// File name of the handler inside the remote `~/.ssh`
pub const HANDLER_NAME: &str = "ursecret-helper";

pub const HANDLER_SCRIPT: &str = include_str!("ursecret-helper.sh");

/// Handle one request. `get` writes the stored token and a newline to
/// `out`; `put` writes nothing.
pub fn serve<W: Write>(
    original: Option<&str>,
    store: &SecretStore,
    out: &mut W,
) -> Result<(), ProtocolError> {
    match Request::parse(original)? {
        Request::Get { key } => {
            let value = store.get(&key)?;
            writeln!(out, "{}", value)?;
            out.flush()?;
        }
        Request::Put { key, value } => store.put(&key, &value)?,
    }
    Ok(())
}
