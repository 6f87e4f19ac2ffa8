use std::cell::UnsafeCell;

use tracing::debug;

use crate::sync::bakery::BakeryLock;
use crate::sync::LockError;

/// Fixed set of items shared by a fixed population of participants, every
/// mutation serialized through one [`BakeryLock`].
///
/// The item store is deliberately plain (no atomics, no inner mutex): the
/// bakery lock alone makes it safe to touch from several threads, which is
/// exactly the collaboration the lock exists for.
pub struct Pool<T> {
    lock: BakeryLock,
    items: UnsafeCell<Vec<T>>,
}

// All access to `items` happens between acquire and release.
unsafe impl<T: Send> Sync for Pool<T> {}

impl<T> Pool<T> {
    pub fn new(items: Vec<T>, n_participants: usize) -> Result<Self, LockError> {
        Ok(Self {
            lock: BakeryLock::new(n_participants)?,
            items: UnsafeCell::new(items),
        })
    }

    /// Takes one item, or `None` when the pool is currently empty. Emptiness
    /// is an outcome; only misuse of the lock is an error.
    pub fn checkout(&self, id: usize) -> Result<Option<T>, LockError> {
        self.lock.acquire(id)?;
        let item = unsafe { (*self.items.get()).pop() };
        self.lock.release(id)?;
        debug!(id, hit = item.is_some(), "checkout");
        Ok(item)
    }

    /// Returns an item to the pool.
    pub fn checkin(&self, id: usize, item: T) -> Result<(), LockError> {
        self.lock.acquire(id)?;
        unsafe { (*self.items.get()).push(item) };
        self.lock.release(id)?;
        debug!(id, "checkin");
        Ok(())
    }

    /// Item count as observed inside the critical section.
    pub fn len(&self, id: usize) -> Result<usize, LockError> {
        self.lock.acquire(id)?;
        let len = unsafe { (*self.items.get()).len() };
        self.lock.release(id)?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const N_THREADS: usize = 4;
    const ROUNDS: usize = 2_000;

    #[test]
    fn items_are_conserved_under_contention() {
        // Fewer items than participants so emptiness actually happens.
        let pool = Arc::new(Pool::new(vec![1u64, 2, 3], N_THREADS).unwrap());
        let ths = (0..N_THREADS)
            .map(|id| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let mut misses = 0usize;
                    for _ in 0..ROUNDS {
                        match pool.checkout(id).unwrap() {
                            Some(item) => pool.checkin(id, item).unwrap(),
                            None => misses += 1,
                        }
                    }
                    misses
                })
            })
            .collect::<Vec<_>>();
        ths.into_iter().for_each(|th| {
            th.join().unwrap();
        });

        let mut left = Vec::new();
        while let Some(item) = pool.checkout(0).unwrap() {
            left.push(item);
        }
        left.sort_unstable();
        assert_eq!(left, vec![1, 2, 3]);
    }

    #[test]
    fn len_tracks_checkouts() {
        let pool = Pool::new(vec!["a", "b"], 1).unwrap();
        assert_eq!(pool.len(0).unwrap(), 2);
        let item = pool.checkout(0).unwrap().unwrap();
        assert_eq!(pool.len(0).unwrap(), 1);
        pool.checkin(0, item).unwrap();
        assert_eq!(pool.len(0).unwrap(), 2);
    }

    #[test]
    fn unknown_participant_rejected() {
        let pool = Pool::new(vec![1], 1).unwrap();
        assert!(matches!(
            pool.checkout(1),
            Err(LockError::InvalidParticipant { id: 1, .. })
        ));
        assert_eq!(pool.len(0).unwrap(), 1);
    }
}
