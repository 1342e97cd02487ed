//! Restricted `authorized_keys` entries

use std::fmt;

use chrono::NaiveDateTime;

use crate::config::HostIdentity;

pub const AUTHORIZED_KEYS: &str = ".ssh/authorized_keys";

/// Everything except the forced command is switched off
pub const RESTRICTIONS: &[&str] = &[
    "no-agent-forwarding",
    "no-port-forwarding",
    "no-pty",
    "no-user-rc",
    "no-x11-forwarding",
];

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// One `authorized_keys` line binding a public key to the handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedEntry {
    handler_path: String,
    public_key: String,
}

impl AuthorizedEntry {
    pub fn new(handler_path: &str, public_key: &str) -> Self {
        Self {
            handler_path: handler_path.to_string(),
            public_key: public_key.trim().to_string(),
        }
    }
}

impl fmt::Display for AuthorizedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command=\"./{}\",{} {}",
            self.handler_path,
            RESTRICTIONS.join(","),
            self.public_key
        )
    }
}

pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `<principal>@<remote>-<local>-<timestamp>`
pub fn key_comment(principal: &str, identity: &HostIdentity, timestamp: &str) -> String {
    format!("{}@{}-{}", principal, identity.marker(), timestamp)
}

/// Whether any line carries a key comment made for `identity`
pub fn has_marker(lines: &[String], identity: &HostIdentity) -> bool {
    let needle = format!("@{}-", identity.marker());
    lines.iter().any(|line| {
        line.match_indices(&needle)
            .any(|(at, _)| is_timestamp_prefix(&line[at + needle.len()..]))
    })
}

/// A real `YYYYmmdd-HHMMSS` at the start of `rest`, ending the comment
fn is_timestamp_prefix(rest: &str) -> bool {
    let Some(stamp) = rest.get(..TIMESTAMP_LEN) else {
        return false;
    };
    // chrono tolerates signs and padding in numeric fields
    let digits_and_dash = stamp
        .bytes()
        .enumerate()
        .all(|(i, b)| if i == 8 { b == b'-' } else { b.is_ascii_digit() });
    if !digits_and_dash {
        return false;
    }
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok()
        && rest[TIMESTAMP_LEN..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace)
}
