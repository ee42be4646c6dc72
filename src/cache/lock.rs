//! Poison-tolerant lock acquisition.
//!
//! A panic while holding a cache lock must not take the serving path down with
//! it; the guard is recovered and the event is logged instead.

use std::sync::{
    LockResult, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use tracing::warn;

fn recover<G>(
    result: LockResult<G>,
    lock_kind: &'static str,
    source: &'static str,
    op: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned: PoisonError<G>| {
        warn!(
            op,
            source,
            lock_kind,
            result = "poisoned_recovered",
            "Recovered from poisoned lock; state may predate the panic"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), "rwlock.read", source, op)
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), "rwlock.write", source, op)
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), "mutex.lock", source, op)
}
