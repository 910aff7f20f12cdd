//! Byte-faithful file access.
//!
//! Program files are not reliably UTF-8. Every byte is mapped to the char
//! with the same code point on the way in and back on the way out, so any
//! byte sequence survives a merge untouched.

use std::path::Path;

use crate::errors::{Result, SmwError};
use crate::record::NEWLINE;

pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Inverse of [`decode`]. Chars above U+00FF cannot come from decoded input
/// and are written as `?`.
pub fn encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

pub fn read_smw_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| SmwError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode(&bytes))
}

/// Encode merged output, terminated by a line break.
pub fn encode_output(output: &str) -> Vec<u8> {
    let mut bytes = encode(output);
    bytes.extend_from_slice(NEWLINE.as_bytes());
    bytes
}
