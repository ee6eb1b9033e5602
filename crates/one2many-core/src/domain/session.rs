//! Per-connection session identifiers.
//!
//! Every signaling connection is tagged with a [`SessionId`] at accept time.
//! All registry operations are keyed by it, so an identifier must never be
//! handed out twice while the process runs.
//!
//! # Thread safety
//!
//! [`SessionIdGenerator`] uses an `AtomicU64` so the accept loop (or several
//! accept loops) can draw identifiers without taking a lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque identifier correlating every operation with one connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a raw identifier value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A thread-safe, monotonically increasing source of [`SessionId`]s.
///
/// The first identifier issued is `1`.  The counter wraps at `u64::MAX`
/// without panicking.
///
/// # Examples
///
/// ```rust
/// use one2many_core::domain::session::SessionIdGenerator;
///
/// let ids = SessionIdGenerator::new();
/// assert_eq!(ids.next().get(), 1);
/// assert_eq!(ids.next().get(), 2);
/// ```
pub struct SessionIdGenerator {
    inner: AtomicU64,
}

impl SessionIdGenerator {
    /// Creates a generator whose first identifier is `1`.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next identifier and advances the counter.
    ///
    /// `Relaxed` ordering is enough: the value only has to be unique, it does
    /// not publish any other memory.
    pub fn next(&self) -> SessionId {
        SessionId(self.inner.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_session_id_is_one() {
        let ids = SessionIdGenerator::new();
        assert_eq!(ids.next(), SessionId::new(1));
    }

    #[test]
    fn test_session_ids_increase_by_one() {
        let ids = SessionIdGenerator::new();
        let a = ids.next();
        let b = ids.next();
        assert_eq!(b.get(), a.get() + 1);
    }

    #[test]
    fn test_session_id_displays_as_decimal() {
        assert_eq!(SessionId::new(42).to_string(), "42");
    }

    #[test]
    fn test_concurrent_generation_never_repeats() {
        // Arrange: eight threads drawing 500 identifiers each
        let ids = Arc::new(SessionIdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..500).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        // Act
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                // Assert
                assert!(seen.insert(id), "duplicate session id {id}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
