use core::fmt;

use thiserror::Error;

// -----------------------------------------------------------------------------
// AccessError

/// Why an owner or observer could not produce its object.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessError {
    #[error("UniqueOwner holds no object")]
    Empty,

    #[error("UniqueWeak is not bound to any liveness cell")]
    Unbound,

    #[error("UniqueWeak observes an object that is no longer owned")]
    Expired,
}

impl AccessError {
    #[cold]
    #[inline(never)]
    pub fn handle_error(&self) -> ! {
        panic!("{self}");
    }
}

// -----------------------------------------------------------------------------
// CoerceError

/// A coercion whose result is not the object it started from.
///
/// Carries the object that was produced instead, in a fresh owner.
#[derive(Error)]
#[error("cannot coerce UniqueOwner: the view points to a different address")]
pub struct CoerceError<O> {
    pub owner: O,
}

impl<O> CoerceError<O> {
    /// Recover the owner of the produced object.
    #[inline]
    pub fn into_owner(self) -> O {
        self.owner
    }
}

impl<O> fmt::Debug for CoerceError<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoerceError").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn messages() {
        assert_eq!(AccessError::Empty.to_string(), "UniqueOwner holds no object");
        let err = CoerceError { owner: () };
        assert_eq!(
            err.to_string(),
            "cannot coerce UniqueOwner: the view points to a different address"
        );
    }
}
