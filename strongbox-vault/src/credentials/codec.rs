//! Secret record wire format.
//!
//! A record packs every credential of one service into a single value:
//!
//! ```text
//! alice:s3cret,bob:hunter2
//! ```
//!
//! Entries are separated by `,` and each entry is split on its first `:`, so
//! secrets may contain `:` but usernames may not. Neither may contain `,`.

use std::collections::BTreeMap;

use zeroize::Zeroizing;

use crate::error::EncodingError;

/// Largest encoded record the parameter store accepts, in bytes.
pub const MAX_RECORD_BYTES: usize = 4096;

const ENTRY_SEPARATOR: char = ',';
const FIELD_SEPARATOR: char = ':';

/// Username to secret mapping of one service.
pub type Entries = BTreeMap<String, Zeroizing<String>>;

/// A service name is one segment of the record path.
pub fn validate_service(service: &str) -> Result<(), EncodingError> {
    if service.is_empty() {
        return Err(EncodingError::InvalidField {
            field: "service",
            reason: "must not be empty",
        });
    }
    if service.contains('/') {
        return Err(EncodingError::InvalidField {
            field: "service",
            reason: "must not contain '/'",
        });
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), EncodingError> {
    if username.is_empty() {
        return Err(EncodingError::InvalidField {
            field: "username",
            reason: "must not be empty",
        });
    }
    if username.contains(ENTRY_SEPARATOR) || username.contains(FIELD_SEPARATOR) {
        return Err(EncodingError::InvalidField {
            field: "username",
            reason: "must not contain ',' or ':'",
        });
    }
    Ok(())
}

pub fn validate_secret(secret: &str) -> Result<(), EncodingError> {
    if secret.contains(ENTRY_SEPARATOR) {
        return Err(EncodingError::InvalidField {
            field: "secret",
            reason: "must not contain ','",
        });
    }
    Ok(())
}

/// Pack entries into a record value.
pub fn encode(entries: &Entries) -> Result<Zeroizing<String>, EncodingError> {
    if entries.is_empty() {
        return Err(EncodingError::Empty);
    }

    let mut encoded = Zeroizing::new(String::new());
    for (username, secret) in entries {
        validate_username(username)?;
        validate_secret(secret)?;

        if !encoded.is_empty() {
            encoded.push(ENTRY_SEPARATOR);
        }
        encoded.push_str(username);
        encoded.push(FIELD_SEPARATOR);
        encoded.push_str(secret);
    }

    if encoded.len() > MAX_RECORD_BYTES {
        return Err(EncodingError::Oversize {
            len: encoded.len(),
            max: MAX_RECORD_BYTES,
        });
    }
    Ok(encoded)
}

/// Unpack a record value. Any malformed entry fails the whole record.
pub fn decode(raw: &str) -> Result<Entries, EncodingError> {
    let mut entries = Entries::new();

    for (index, piece) in raw.split(ENTRY_SEPARATOR).enumerate() {
        let (username, secret) = piece
            .split_once(FIELD_SEPARATOR)
            .filter(|(username, _)| !username.is_empty())
            .ok_or(EncodingError::Malformed { index })?;
        entries.insert(username.to_string(), Zeroizing::new(secret.to_string()));
    }

    Ok(entries)
}
