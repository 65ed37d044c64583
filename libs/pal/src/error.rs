// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by PAL operations.
///
/// Every fallible operation in this crate reports one of these. The numeric
/// [`Error::code`] is stable and is what the suites print in their failure
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// The resource is initialized already and must be finalized first.
    AlreadyInitialized,
    /// The resource has not been initialized yet.
    NotInitialized,
    /// A size, priority, pointer or handle argument was rejected.
    InvalidArgument,
    /// A bounded resource is exhausted, or a binary semaphore is already full.
    OutOfRange,
    /// The native call backing the operation failed.
    NativeFailure,
    /// A bounded wait elapsed before the operation could complete.
    Timeout,
}

impl Error {
    /// Returns the stable numeric code of this error. Success is `0`.
    pub const fn code(self) -> u32 {
        match self {
            Error::AlreadyInitialized => 1,
            Error::NotInitialized => 2,
            Error::InvalidArgument => 3,
            Error::OutOfRange => 4,
            Error::NativeFailure => 5,
            Error::Timeout => 6,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadyInitialized => f.write_str("resource is already initialized"),
            Error::NotInitialized => f.write_str("resource is not initialized"),
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::OutOfRange => f.write_str("out of range"),
            Error::NativeFailure => f.write_str("native call failed"),
            Error::Timeout => f.write_str("timed out"),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Error::Timeout,
            std::io::ErrorKind::InvalidInput => Error::InvalidArgument,
            _ => Error::NativeFailure,
        }
    }
}

/// Emits the one-line failure diagnostic for `call`.
pub(crate) fn report(call: &str, err: Error) {
    log::error!("`{call}` failed: {err} (code {})", err.code());
}
