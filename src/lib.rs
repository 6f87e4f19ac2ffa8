//! Mutual exclusion for a fixed population of threads via Lamport's bakery
//! algorithm: only per-slot atomic loads and stores, no read-modify-write
//! instructions, with FIFO-like fairness over `(ticket, id)` order.

pub mod pool;
pub mod sync;

pub use pool::Pool;
pub use sync::bakery::{BakeryLock, Participant};
pub use sync::{LockError, Mutex, MutexGuard};
