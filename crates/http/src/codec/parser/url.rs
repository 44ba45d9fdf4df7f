//! Lazy percent-decoding of request target pieces.
//!
//! The parser only records whether a `%` or `+` was seen while accumulating a
//! piece; [`decode`] is then called once on the finished bytes and copies
//! nothing beyond the final string when no decoding is needed.

use std::borrow::Cow;

use crate::protocol::{ParseError, UrlCharset};

/// How one piece of the request target is decoded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Decoding {
    pub(crate) charset: UrlCharset,
    /// Decode `%2F` into `/`.
    pub(crate) allow_encoded_slash: bool,
    /// Decode `+` into a space.
    pub(crate) plus_as_space: bool,
}

/// Converts raw target bytes into a string using `charset`.
pub(crate) fn to_string(raw: &[u8], charset: UrlCharset) -> Result<String, ParseError> {
    match charset {
        UrlCharset::Utf8 => std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| ParseError::invalid_encoding(format!("request target is not utf-8: {e}"))),
        UrlCharset::Latin1 => Ok(raw.iter().copied().map(char::from).collect()),
    }
}

/// Decodes `raw` if `required`, otherwise converts it unchanged.
pub(crate) fn decode(raw: &[u8], required: bool, decoding: Decoding) -> Result<String, ParseError> {
    if !required {
        return to_string(raw, decoding.charset);
    }

    let raw: Cow<'_, [u8]> = if decoding.plus_as_space && raw.contains(&b'+') {
        Cow::Owned(raw.iter().map(|&b| if b == b'+' { b' ' } else { b }).collect())
    } else {
        Cow::Borrowed(raw)
    };

    if decoding.allow_encoded_slash {
        return to_string(&urlencoding::decode_binary(&raw), decoding.charset);
    }

    // keep %2F encoded so it can't be confused with a path separator
    let mut decoded = Vec::with_capacity(raw.len());
    let mut rest: &[u8] = &raw;
    while let Some(index) = find_encoded_slash(rest) {
        decoded.extend_from_slice(&urlencoding::decode_binary(&rest[..index]));
        decoded.extend_from_slice(&rest[index..index + 3]);
        rest = &rest[index + 3..];
    }
    decoded.extend_from_slice(&urlencoding::decode_binary(rest));
    to_string(&decoded, decoding.charset)
}

fn find_encoded_slash(bytes: &[u8]) -> Option<usize> {
    bytes.windows(3).position(|w| w[0] == b'%' && w[1] == b'2' && (w[2] == b'f' || w[2] == b'F'))
}
