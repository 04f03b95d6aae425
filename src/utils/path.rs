//! Request path normalization.
//!
//! The path is split on `/` with the empty element produced by the leading
//! slash dropped, then every segment is percent-decoded exactly once. A
//! decoded `%2F` therefore stays inside its segment instead of splitting it.
use std::borrow::Cow;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathError {
    #[error("invalid percent-encoding in segment {segment:?}")]
    InvalidEscape { segment: String },

    #[error("segment {segment:?} does not decode to UTF-8")]
    InvalidUtf8 { segment: String },
}

/// Split a raw (still encoded) request path into decoded segments.
///
/// Only the element before the leading slash is dropped: `""` yields no
/// segments, `"/"` a single empty one, and a trailing slash a final empty
/// segment.
pub fn split_path(raw: &str) -> Result<Vec<String>, PathError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split('/').skip(1).map(decode_segment).collect()
}

/// Percent-decode a single path segment.
pub fn decode_segment(segment: &str) -> Result<String, PathError> {
    if !segment.contains('%') {
        return Ok(segment.to_string());
    }
    check_escapes(segment)?;
    urlencoding::decode(segment)
        .map(Cow::into_owned)
        .map_err(|_| PathError::InvalidUtf8 {
            segment: segment.to_string(),
        })
}

fn check_escapes(segment: &str) -> Result<(), PathError> {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        let valid = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(PathError::InvalidEscape {
                segment: segment.to_string(),
            });
        }
        i += 3;
    }
    Ok(())
}
