// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type and the stable, language-neutral error
//! codes used throughout the decoder.

use std::fmt;

/// `AcmError` enumerates every way the decoder can fail. Each variant carries a stable integer
/// code (see [`AcmError::code`]) so that callers embedding this decoder behind a C-style ABI can
/// surface failures without depending on Rust's `Error` trait.
#[derive(Debug)]
pub enum AcmError {
    /// A generic, otherwise uncategorized error.
    Other(&'static str),
    /// The byte source could not be opened or an I/O error occurred while opening it.
    Open(std::io::Error),
    /// The stream does not begin with the ACM magic.
    NotAcm,
    /// An I/O error occurred while reading the stream.
    Read(std::io::Error),
    /// The header was well-formed but described an unsupported or invalid configuration.
    BadFormat(&'static str),
    /// The stream contains a value (most commonly a pack code) outside its legal range.
    Corrupt(&'static str),
    /// The byte source ended in the middle of a big block.
    UnexpectedEof,
    /// A backward seek was requested on a byte source that cannot seek.
    NotSeekable,
}

impl AcmError {
    /// The stable integer code for this error, matching the reference decoder's `ACM_ERR_*`
    /// constants.
    pub fn code(&self) -> i32 {
        match self {
            AcmError::Other(_) => -1,
            AcmError::Open(_) => -2,
            AcmError::NotAcm => -3,
            AcmError::Read(_) => -4,
            AcmError::BadFormat(_) => -5,
            AcmError::Corrupt(_) => -6,
            AcmError::UnexpectedEof => -7,
            AcmError::NotSeekable => -8,
        }
    }

    /// The short, human-readable phrase associated with this error's code.
    pub fn as_str(&self) -> &'static str {
        match self {
            AcmError::Other(_) => "other error",
            AcmError::Open(_) => "cannot open file",
            AcmError::NotAcm => "not an ACM file",
            AcmError::Read(_) => "read error",
            AcmError::BadFormat(_) => "bad format",
            AcmError::Corrupt(_) => "corrupt file",
            AcmError::UnexpectedEof => "unexpected eof",
            AcmError::NotSeekable => "stream not seekable",
        }
    }
}

impl fmt::Display for AcmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::error::Error for AcmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AcmError::Open(err) | AcmError::Read(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AcmError {
    fn from(err: std::io::Error) -> AcmError {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => AcmError::UnexpectedEof,
            _ => AcmError::Read(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, AcmError>;

/// Convenience function to create a corrupt-stream error.
pub fn corrupt_error<T>(desc: &'static str) -> Result<T> {
    Err(AcmError::Corrupt(desc))
}

/// Convenience function to create a bad-format error.
pub fn bad_format_error<T>(desc: &'static str) -> Result<T> {
    Err(AcmError::BadFormat(desc))
}

/// Convenience function to create a not-seekable error.
pub fn not_seekable_error<T>() -> Result<T> {
    Err(AcmError::NotSeekable)
}

/// Convenience function to create an unexpected-eof error.
pub fn unexpected_eof_error<T>() -> Result<T> {
    Err(AcmError::UnexpectedEof)
}

/// Maps a stable error code back to its short, human-readable phrase, mirroring the reference
/// decoder's `acm_strerror`. Returns `"unknown error"` for any value outside the known range.
pub fn strerror(code: i32) -> &'static str {
    match code {
        0 => "no error",
        -1 => "other error",
        -2 => "cannot open file",
        -3 => "not an ACM file",
        -4 => "read error",
        -5 => "bad format",
        -6 => "corrupt file",
        -7 => "unexpected eof",
        -8 => "stream not seekable",
        _ => "unknown error",
    }
}
