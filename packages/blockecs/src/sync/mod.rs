//! Threading primitives for callers who want to spread work over blocks.
//!
//! Nothing in the entity store uses these itself. A caller running queries
//! in parallel must make sure each block is touched by at most one task at a
//! time, and that no entity is created, destroyed or reshaped meanwhile.

mod pool;
mod rwlock;

pub use pool::{PoolError, TaskHandle, WorkerPool};
pub use rwlock::{ReadGuard, ReadWriteLock, WriteGuard};
