//! Lease-based distributed locks.
//!
//! Every lock carries a lease: a holder that crashes or stalls loses the
//! lock once the lease runs out, so no key stays locked forever. Only the
//! holder that acquired a lock can release it.
//!
//! - [`DistributedLockService::with_lock`]: run a future under one key
//! - [`DistributedLockService::with_multi_lock`]: all-or-nothing over many keys
//! - [`DistributedLockService::with_read_lock`] and
//!   [`DistributedLockService::with_write_lock`]: shared readers, exclusive writer

pub mod backend;
pub mod error;
pub mod service;

pub use backend::{InMemoryLockBackend, LockBackend, RedisLockBackend};
pub use error::{LockError, Result};
pub use service::{DistributedLockService, LockHandle, LockMode};
