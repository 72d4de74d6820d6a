use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::{ops::compute::Op, sync::Cache};

/// Default lifetime of a check-in lock if its holder never releases it.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Named, non-blocking, per-user mutual exclusion with a TTL.
///
/// A held lock is an entry in the cache; it disappears when the guard drops
/// or, if the holder dies, when the TTL elapses.
pub struct UserLocks {
    held: Cache<u64, u64>,
    tokens: AtomicU64,
}

impl UserLocks {
    pub fn new(ttl: Duration) -> Self {
        Self {
            held: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
            tokens: AtomicU64::new(1),
        }
    }

    /// Returns `None` immediately when another caller holds the lock.
    pub fn try_acquire(&self, user_id: u64) -> Option<UserLockGuard<'_>> {
        let token = self.tokens.fetch_add(1, Ordering::Relaxed);
        let entry = self.held.entry(user_id).or_insert(token);

        if entry.is_fresh() {
            Some(UserLockGuard {
                locks: self,
                user_id,
                token,
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    pub fn is_held(&self, user_id: u64) -> bool {
        self.held.contains_key(&user_id)
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TTL)
    }
}

pub struct UserLockGuard<'a> {
    locks: &'a UserLocks,
    user_id: u64,
    token: u64,
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        // After a TTL expiry the entry may belong to a newer holder, so the
        // token is compared and removed in one step.
        let token = self.token;
        let _ = self
            .locks
            .held
            .entry(self.user_id)
            .and_compute_with(|held| match held {
                Some(entry) if *entry.value() == token => Op::Remove,
                _ => Op::Nop,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let locks = UserLocks::default();
        let guard = locks.try_acquire(7).expect("first acquire");
        assert!(locks.try_acquire(7).is_none());
        assert!(locks.try_acquire(8).is_some(), "other users are independent");
        drop(guard);
        assert!(!locks.is_held(7));
        assert!(locks.try_acquire(7).is_some());
    }

    #[test]
    fn expired_lock_can_be_taken_over() {
        let locks = UserLocks::new(Duration::from_millis(20));
        let stale = locks.try_acquire(3).expect("first acquire");
        std::thread::sleep(Duration::from_millis(50));

        let fresh = locks.try_acquire(3).expect("lock expired");
        drop(stale);
        assert!(locks.is_held(3), "stale guard must not release the new holder");
        drop(fresh);
        assert!(!locks.is_held(3));
    }

    #[test]
    fn stale_guard_leaves_every_later_holder_alone() {
        let locks = UserLocks::new(Duration::from_millis(20));
        let stale = locks.try_acquire(4).expect("first acquire");
        std::thread::sleep(Duration::from_millis(50));

        let fresh = locks.try_acquire(4).expect("lock expired");
        drop(stale);
        assert!(locks.try_acquire(4).is_none(), "new holder still owns the lock");
        drop(fresh);
        assert!(locks.try_acquire(4).is_some());
    }
}
