//! Hex memory image loader.
//!
//! The format is a text file of whitespace-separated 16-hex-digit
//! doublewords, optionally preceded by an address line `@<hex-address>`
//! that selects the current write pointer for the lines that follow.
//! The first `@` line seen fixes the image's start address.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::memory::Memory;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("could not read image file: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected 16 hex digits, got {token:?}")]
    BadWord { line: usize, token: String },
    #[error("line {line}: malformed address directive {token:?}")]
    BadAddress { line: usize, token: String },
}

/// Outcome of a successful image load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub start_address: u64,
}

/// Load `path` into `memory`. On a malformed line, returns an error;
/// doublewords written by lines preceding the bad one remain in
/// `memory` (the loader does not roll back).
pub fn load_image(memory: &mut Memory, path: &Path) -> Result<LoadedImage, ImageError> {
    let text = fs::read_to_string(path)?;

    let mut pointer: u64 = 0;
    let mut start_address: Option<u64> = None;

    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(addr_text) = line.strip_prefix('@') {
            let addr = u64::from_str_radix(addr_text.trim(), 16).map_err(|_| ImageError::BadAddress {
                line: line_no,
                token: line.to_string(),
            })?;
            pointer = addr;
            start_address.get_or_insert(addr);
            continue;
        }

        for token in line.split_whitespace() {
            if token.len() != 16 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ImageError::BadWord {
                    line: line_no,
                    token: token.to_string(),
                });
            }
            let word = u64::from_str_radix(token, 16).map_err(|_| ImageError::BadWord {
                line: line_no,
                token: token.to_string(),
            })?;
            memory.write_doubleword(pointer, word, u64::MAX);
            pointer = pointer.wrapping_add(8);
        }
    }

    Ok(LoadedImage {
        start_address: start_address.unwrap_or(0),
    })
}
