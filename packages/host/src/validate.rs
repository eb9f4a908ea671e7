//! Payload validation that must run before a host call.
//!
//! The host call layer never validates. Builtins call these checks first so
//! a malformed name or key is rejected locally, with no host traffic.

use thiserror::Error;

/// Maximum byte length of dictionary names, dictionary keys, log endpoint
/// names and object store names.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum byte length of an object store key.
pub const MAX_OBJECT_KEY_LEN: usize = 1024;

const ACME_CHALLENGE_PREFIX: &str = ".well-known/acme-challenge/";

/// A name or key was rejected before reaching the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{what} cannot be empty")]
    Empty { what: &'static str },

    #[error("{what} cannot be more than {max} bytes, got {len}")]
    TooLong {
        what: &'static str,
        max: usize,
        len: usize,
    },

    #[error("{what} must start with an ascii alphabetical character")]
    InvalidStart { what: &'static str },

    #[error("{what} contains invalid character {ch:?}")]
    InvalidChar { what: &'static str, ch: char },

    #[error("{what} {reason}")]
    Reserved {
        what: &'static str,
        reason: &'static str,
    },
}

fn check_len(what: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { what });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong {
            what,
            max,
            len: value.len(),
        });
    }
    Ok(())
}

/// Ascii alphabetic first character, then ascii alphanumerics, `_` or space.
fn identifier(what: &'static str, name: &str) -> Result<(), ValidationError> {
    check_len(what, name, MAX_NAME_LEN)?;

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(ValidationError::InvalidStart { what }),
    }
    if let Some(ch) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == ' ')) {
        return Err(ValidationError::InvalidChar { what, ch });
    }
    Ok(())
}

/// Dictionary names: 1..=255 bytes, ascii alphabetic first character, then
/// ascii alphanumerics, `_` or space.
pub fn dictionary_name(name: &str) -> Result<(), ValidationError> {
    identifier("dictionary name", name)
}

/// Dictionary keys: 1..=255 bytes.
pub fn dictionary_key(key: &str) -> Result<(), ValidationError> {
    check_len("dictionary key", key, MAX_NAME_LEN)
}

/// Config store names follow the dictionary name rules.
pub fn config_store_name(name: &str) -> Result<(), ValidationError> {
    identifier("config store name", name)
}

pub fn config_store_key(key: &str) -> Result<(), ValidationError> {
    check_len("config store key", key, MAX_NAME_LEN)
}

/// Log endpoint names: 1..=255 bytes, no control characters.
pub fn log_endpoint_name(name: &str) -> Result<(), ValidationError> {
    const WHAT: &str = "log endpoint name";
    check_len(WHAT, name, MAX_NAME_LEN)?;
    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(ValidationError::InvalidChar { what: WHAT, ch });
    }
    Ok(())
}

/// Object store names: 1..=255 bytes.
pub fn object_store_name(name: &str) -> Result<(), ValidationError> {
    check_len("object store name", name, MAX_NAME_LEN)
}

/// Object store keys: 1..=1024 bytes, not `.` or `..`, no line breaks, none
/// of `#;?^|`, and not under the ACME challenge path.
pub fn object_store_key(key: &str) -> Result<(), ValidationError> {
    const WHAT: &str = "object store key";
    check_len(WHAT, key, MAX_OBJECT_KEY_LEN)?;

    if key == "." || key == ".." {
        return Err(ValidationError::Reserved {
            what: WHAT,
            reason: "cannot be '.' or '..'",
        });
    }
    if key.starts_with(ACME_CHALLENGE_PREFIX) {
        return Err(ValidationError::Reserved {
            what: WHAT,
            reason: "cannot start with .well-known/acme-challenge/",
        });
    }
    if let Some(ch) = key
        .chars()
        .find(|c| matches!(c, '\r' | '\n' | '#' | ';' | '?' | '^' | '|'))
    {
        return Err(ValidationError::InvalidChar { what: WHAT, ch });
    }
    Ok(())
}
