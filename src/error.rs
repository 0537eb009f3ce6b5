//! Error taxonomy shared by the table, its enumerators and the scope stack.

use std::collections::TryReserveError;

/// Represents errors that can occur while operating on a [`Table`](crate::Table)
/// or a [`ScopeStack`](crate::ScopeStack).
///
/// Apart from [`Error::OutOfMemory`] every variant is a usage fault: the
/// caller broke the protocol and the operation was refused without
/// touching the table.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error {
    /// Memory for an entry or a bucket array could not be obtained
    OutOfMemory,

    /// Enumerator was not started on this table, or has already been ended
    ForeignEnumerator,

    /// `start` was called on an enumerator that is still open
    EnumeratorOpen,

    /// `delete` was called on an enumerator that is not positioned on an entry
    NotPositioned,

    /// Table still has the given number of open enumerators
    EnumeratorsOpen(usize),

    /// Scope stack already holds its maximum number of tables
    StackFull(usize),

    /// Scope stack has no table to pop
    StackEmpty,
}

impl Error {
    /// Returns `true` for caller programming errors, `false` for resource exhaustion.
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        !matches!(self, Self::OutOfMemory)
    }

    /// Numeric form used by the find-or-insert return-code contract.
    #[must_use]
    pub fn code(&self) -> i32 {
        crate::FATAL
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashtbError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Table result
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn only_out_of_memory_is_not_misuse() {
        assert!(!Error::OutOfMemory.is_misuse());
        assert!(Error::ForeignEnumerator.is_misuse());
        assert!(Error::EnumeratorsOpen(2).is_misuse());
        assert!(Error::StackFull(3).is_misuse());
        assert!(Error::StackEmpty.is_misuse());
    }

    #[test]
    fn try_reserve_failure_maps_to_out_of_memory() {
        let mut v: Vec<u8> = Vec::new();
        let err = v.try_reserve_exact(usize::MAX).unwrap_err();
        assert_eq!(Error::from(err), Error::OutOfMemory);
        assert_eq!(Error::OutOfMemory.code(), -1);
    }
}
