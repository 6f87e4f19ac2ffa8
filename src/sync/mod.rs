pub mod bakery;

use std::error;
use std::fmt;

/// Mutex acquired on behalf of one fixed participant.
///
/// The requirements for implementors are
/// 1. Mutual Exclusion - at most one participant's `acquire` returns a live
///    guard at any instant.
/// 2. Release on drop - dropping the returned guard runs `release`, so a
///    critical section cannot outlive its guard by accident.
///
/// `acquire` is fallible because misuse (a participant re-acquiring before it
/// released) is detected at runtime, not by the type system.
pub trait Mutex {
    /// Blocks until the participant may enter its critical section.
    fn acquire(&self) -> Result<MutexGuard<'_, Self>, LockError>
    where
        Self: Sized;

    /// Returns the participant's slot to idle.
    fn release(&self);
}

/// Releases the underlying mutex when dropped.
pub struct MutexGuard<'a, M: Mutex> {
    pub(crate) mutex: &'a M,
}

impl<M: Mutex> Drop for MutexGuard<'_, M> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

/// Caller-facing failures of lock construction and use.
///
/// Contention is never an error: competing requests wait, they do not fail.
/// Every variant here is a misuse surfaced synchronously to the misbehaving
/// caller before any shared slot is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// A lock needs at least one participant slot.
    InvalidConfiguration,
    /// Participant id outside the population fixed at construction.
    InvalidParticipant { id: usize, participants: usize },
    /// A participant called acquire again before releasing.
    NotReentrant { id: usize },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LockError::InvalidConfiguration => {
                write!(f, "participant count must be at least 1")
            }
            LockError::InvalidParticipant { id, participants } => {
                write!(
                    f,
                    "participant id {} outside population 0..{}",
                    id, participants
                )
            }
            LockError::NotReentrant { id } => {
                write!(f, "participant {} already holds or awaits the lock", id)
            }
        }
    }
}

impl error::Error for LockError {}
