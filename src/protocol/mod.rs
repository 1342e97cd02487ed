//! Request grammar spoken to the restricted remote command
//!
//! A request is one whitespace-tokenized line:
//!
//! - `get <key>`
//! - `put <key> <value>`
//!
//! Protocol version 2 percent-encodes the value on the client, so the value
//! token never contains whitespace. The handler stores the token verbatim
//! and hands it back on `get`; only the client decodes it.

mod handler;
mod store;

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

pub use handler::{serve, HANDLER_NAME, HANDLER_SCRIPT};
pub use store::{SecretStore, SECRETS_DIR};

/// Longest accepted key name
pub const MAX_KEY_LEN: usize = 128;

/// Token separators, the same set `sh` splits on with its default IFS
const SEPARATORS: [char; 3] = [' ', '\t', '\n'];

/// Bytes left as they are in an encoded value; everything else is `%XX`
const VALUE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'+')
    .remove(b'/')
    .remove(b'=')
    .remove(b':')
    .remove(b'@')
    .remove(b',');

/// Wire diagnostics of the remote handler
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid command")]
    InvalidCommand,

    #[error("illegal command")]
    IllegalCommand,

    #[error("illegal get")]
    IllegalGet,

    #[error("illegal put")]
    IllegalPut,

    #[error("illegal key")]
    IllegalKey,

    #[error("unknown key")]
    UnknownKey,

    #[error("illegal value")]
    IllegalValue,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get { key: String },
    Put { key: String, value: String },
}

impl Request {
    /// Parse the original command string handed to the forced command
    pub fn parse(original: Option<&str>) -> Result<Self, ProtocolError> {
        let args: Vec<&str> = original
            .ok_or(ProtocolError::InvalidCommand)?
            .split(&SEPARATORS[..])
            .filter(|arg| !arg.is_empty())
            .collect();
        if args.len() <= 1 {
            return Err(ProtocolError::InvalidCommand);
        }

        match args[0] {
            "get" => {
                if args.len() != 2 {
                    return Err(ProtocolError::IllegalGet);
                }
                let key = validate_key(args[1])?;
                Ok(Request::Get { key: key.to_string() })
            }
            "put" => {
                if args.len() != 3 {
                    return Err(ProtocolError::IllegalPut);
                }
                let key = validate_key(args[1])?;
                Ok(Request::Put {
                    key: key.to_string(),
                    value: args[2].to_string(),
                })
            }
            _ => Err(ProtocolError::IllegalCommand),
        }
    }

    pub fn get(key: &str) -> Result<Self, ProtocolError> {
        Ok(Request::Get {
            key: validate_key(key)?.to_string(),
        })
    }

    /// Build a put of the plain `value`, encoding it for the wire
    pub fn put(key: &str, value: &str) -> Result<Self, ProtocolError> {
        Ok(Request::Put {
            key: validate_key(key)?.to_string(),
            value: encode_value(value)?,
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Get { key } => write!(f, "get {}", key),
            Request::Put { key, value } => write!(f, "put {} {}", key, value),
        }
    }
}

/// Keys become file names: 1 to 128 of `[A-Za-z0-9._-]`, no leading dot
pub fn validate_key(key: &str) -> Result<&str, ProtocolError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(key)
    } else {
        Err(ProtocolError::IllegalKey)
    }
}

/// Percent-encode everything outside the plain set; empty values have no
/// wire form
pub fn encode_value(value: &str) -> Result<String, ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::IllegalValue);
    }
    Ok(utf8_percent_encode(value, VALUE_SET).to_string())
}

/// Every `%` must start a two-digit hex escape, and the bytes must be UTF-8
pub fn decode_value(encoded: &str) -> Result<String, ProtocolError> {
    let bytes = encoded.as_bytes();
    let stray = bytes.iter().enumerate().any(|(i, &b)| {
        b == b'%'
            && !bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if stray {
        return Err(ProtocolError::IllegalValue);
    }

    percent_decode_str(encoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ProtocolError::IllegalValue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_and_put() {
        assert_eq!(
            Request::parse(Some("get db-pass")).unwrap(),
            Request::Get { key: "db-pass".into() }
        );
        assert_eq!(
            Request::parse(Some("  put  token  abc%20def ")).unwrap(),
            Request::Put {
                key: "token".into(),
                value: "abc%20def".into()
            }
        );
    }

    #[test]
    fn test_parse_diagnostics() {
        let cases = [
            (None, "invalid command"),
            (Some(""), "invalid command"),
            (Some("get"), "invalid command"),
            (Some("delete everything"), "illegal command"),
            (Some("get a b"), "illegal get"),
            (Some("put a"), "illegal put"),
            (Some("put a b c"), "illegal put"),
            (Some("get ../etc/passwd"), "illegal key"),
            (Some("put .ssh x"), "illegal key"),
        ];
        for (input, expected) in cases {
            let err = Request::parse(input).unwrap_err();
            assert_eq!(err.to_string(), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_key_policy() {
        assert!(validate_key("db-pass_2.txt").is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN)).is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("ключ").is_err());
    }

    #[test]
    fn test_plain_values_are_unchanged() {
        assert_eq!(encode_value("s3cr3t").unwrap(), "s3cr3t");
        assert_eq!(decode_value("s3cr3t").unwrap(), "s3cr3t");
    }

    #[test]
    fn test_encoded_value_is_one_token() {
        let value = "two words\nnew line 100% *glob* пароль";
        let encoded = encode_value(value).unwrap();

        assert_eq!(encoded.split_whitespace().count(), 1);
        assert!(!encoded.contains('*'));
        assert_eq!(decode_value(&encoded).unwrap(), value);

        let request = Request::put("k", value).unwrap();
        assert_eq!(Request::parse(Some(request.to_string().as_str())).unwrap(), request);
    }

    #[test]
    fn test_only_shell_separators_split() {
        assert_eq!(
            Request::parse(Some("put\tk\nv")).unwrap(),
            Request::Put {
                key: "k".into(),
                value: "v".into()
            }
        );
        let err = Request::parse(Some("get\u{a0}k")).unwrap_err();
        assert_eq!(err.to_string(), "invalid command");
    }

    #[test]
    fn test_every_ascii_char_survives_encoding() {
        for byte in 1u8..=0x7f {
            let value = char::from(byte).to_string();
            let encoded = encode_value(&value).unwrap();
            assert_eq!(encoded.split(&SEPARATORS[..]).count(), 1, "{:?}", value);
            assert_eq!(decode_value(&encoded).unwrap(), value);
        }
        assert_eq!(encode_value("a b%").unwrap(), "a%20b%25");
        assert_eq!(encode_value("-_.~+/=:@,").unwrap(), "-_.~+/=:@,");
    }

    #[test]
    fn test_bad_encodings() {
        assert!(encode_value("").is_err());
        assert!(decode_value("abc%2").is_err());
        assert!(decode_value("%zz").is_err());
        assert!(decode_value("%+1").is_err());
        assert!(decode_value("%FF").is_err());
        assert!(decode_value("50%").is_err());
        assert!(decode_value("%%41").is_err());
    }
}
