use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use tracing::trace;

use super::{LockError, Mutex, MutexGuard};

/// Lamport's bakery lock over a fixed population of participants.
///
/// Each participant owns one `choosing` flag and one `ticket` slot and is the
/// only writer of them; every participant reads every slot. A requester
/// announces itself, takes a ticket one above every ticket it can see, then
/// waits until no other participant holds a lexicographically smaller
/// `(ticket, id)` pair. Equal tickets are legitimate (two choosing phases may
/// overlap), so the participant id breaks ties, giving a strict total order
/// over outstanding requests.
///
/// The single-writer discipline is why plain SeqCst loads and stores suffice:
/// no slot is ever contended for writing, so no read-modify-write instruction
/// is needed anywhere in the protocol.
#[derive(Debug)]
pub struct BakeryLock {
    choosing: Vec<AtomicBool>,
    tickets: Vec<AtomicU64>,
}

impl BakeryLock {
    const FREE: u64 = 0;

    /// Builds a lock for participants `0..n_participants`.
    ///
    /// The population is fixed for the lifetime of the lock; there is no
    /// join or leave.
    pub fn new(n_participants: usize) -> Result<Self, LockError> {
        if n_participants == 0 {
            return Err(LockError::InvalidConfiguration);
        }
        Ok(Self {
            choosing: (0..n_participants)
                .map(|_| AtomicBool::new(false))
                .collect(),
            tickets: (0..n_participants)
                .map(|_| AtomicU64::new(Self::FREE))
                .collect(),
        })
    }

    pub fn participants(&self) -> usize {
        self.tickets.len()
    }

    /// Blocks until participant `id` may enter its critical section.
    pub fn acquire(&self, id: usize) -> Result<(), LockError> {
        let ticket = self.take_ticket(id)?;
        self.wait_turn(id, ticket, None);
        trace!(id, ticket, "acquired");
        Ok(())
    }

    /// Deadline variant of [`BakeryLock::acquire`]. `Ok(false)` means the
    /// deadline passed first; that is an outcome, not an error.
    ///
    /// The choosing phase always runs to completion, so no peer ever observes
    /// a half-written announcement. On expiry the ticket is withdrawn before
    /// returning, leaving the slot idle for everyone still waiting.
    pub fn try_acquire_for(&self, id: usize, timeout: Duration) -> Result<bool, LockError> {
        let deadline = Instant::now() + timeout;
        let ticket = self.take_ticket(id)?;
        if self.wait_turn(id, ticket, Some(deadline)) {
            trace!(id, ticket, "acquired");
            Ok(true)
        } else {
            self.clear(id);
            trace!(id, ticket, "timed out");
            Ok(false)
        }
    }

    /// Returns participant `id`'s slot to idle. Safe to call when the
    /// participant holds nothing; releasing twice is a no-op.
    pub fn release(&self, id: usize) -> Result<(), LockError> {
        self.check_id(id)?;
        self.clear(id);
        trace!(id, "released");
        Ok(())
    }

    fn check_id(&self, id: usize) -> Result<(), LockError> {
        if id >= self.tickets.len() {
            return Err(LockError::InvalidParticipant {
                id,
                participants: self.tickets.len(),
            });
        }
        Ok(())
    }

    // Infallible once the id is known valid; `Participant` releases through
    // here so guard drop cannot fail.
    fn clear(&self, id: usize) {
        self.tickets[id].store(Self::FREE, Ordering::SeqCst);
    }

    /// Choosing phase: announce, take a ticket above every ticket in sight,
    /// withdraw the announcement. The three steps must stay in exactly this
    /// order - a peer that sees the flag down must be able to trust the
    /// ticket it reads next.
    fn take_ticket(&self, id: usize) -> Result<u64, LockError> {
        self.check_id(id)?;
        // Own slot, own writes: a nonzero ticket here can only be this
        // participant's earlier request, still unreleased.
        if self.tickets[id].load(Ordering::SeqCst) != Self::FREE {
            return Err(LockError::NotReentrant { id });
        }
        self.choosing[id].store(true, Ordering::SeqCst);
        let ticket = 1 + self
            .tickets
            .iter()
            .fold(0, |acc, t| t.load(Ordering::SeqCst).max(acc));
        self.tickets[id].store(ticket, Ordering::SeqCst);
        self.choosing[id].store(false, Ordering::SeqCst);
        trace!(id, ticket, "ticket taken");
        Ok(ticket)
    }

    /// Waiting phase: scan the whole population once; for each peer, first
    /// wait out its choosing phase, then wait until it no longer holds a
    /// strictly prior request. Returns false if the deadline passed first.
    fn wait_turn(&self, id: usize, ticket: u64, deadline: Option<Instant>) -> bool {
        for (other, (flag, slot)) in self.choosing.iter().zip(&self.tickets).enumerate() {
            if other == id {
                continue;
            }

            // Never judge a ticket that may still be half-computed.
            let backoff = Backoff::new();
            while flag.load(Ordering::SeqCst) {
                if expired(deadline) {
                    return false;
                }
                backoff.snooze();
            }

            let backoff = Backoff::new();
            loop {
                let theirs = slot.load(Ordering::SeqCst);
                if theirs == Self::FREE || (ticket, id) < (theirs, other) {
                    break;
                }
                if expired(deadline) {
                    return false;
                }
                backoff.snooze();
            }
        }
        true
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |d| Instant::now() >= d)
}

/// Per-participant handle: a participant index bound to a shared lock.
///
/// The intended shape is one handle per thread; the id is validated once at
/// construction so the guard path has no failure case left but reentrancy.
pub struct Participant {
    id: usize,
    lock: Arc<BakeryLock>,
}

impl Participant {
    pub fn new(id: usize, lock: &Arc<BakeryLock>) -> Result<Self, LockError> {
        lock.check_id(id)?;
        Ok(Self {
            id,
            lock: lock.clone(),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Guard when acquired within `timeout`, `None` when the deadline passed.
    pub fn try_acquire_for(
        &self,
        timeout: Duration,
    ) -> Result<Option<MutexGuard<'_, Self>>, LockError> {
        if self.lock.try_acquire_for(self.id, timeout)? {
            Ok(Some(MutexGuard { mutex: self }))
        } else {
            Ok(None)
        }
    }
}

impl Mutex for Participant {
    fn acquire(&self) -> Result<MutexGuard<'_, Self>, LockError> {
        self.lock.acquire(self.id)?;
        Ok(MutexGuard { mutex: self })
    }

    fn release(&self) {
        self.lock.clear(self.id);
    }
}
