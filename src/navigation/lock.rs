//! Reference-counted navigation lock.
//!
//! Independent holders (a pan gesture, a zoom, an API caller) each take a
//! [`LockToken`]. Restoration and viewport driving stay suspended until the
//! last token is released.

/// Proof of one lock acquisition. Consumed by [`NavigationLock::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a token without releasing it keeps the navigator locked"]
pub struct LockToken {
    id: u64,
}

impl LockToken {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Result of releasing one token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockRelease {
    /// Other holders remain.
    StillHeld,
    /// That was the last holder.
    Released,
    /// The token does not belong to this lock or was already released.
    Unknown,
}

#[derive(Debug, Default)]
pub struct NavigationLock {
    holders: Vec<u64>,
    next_id: u64,
}

impl NavigationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self) -> LockToken {
        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        self.holders.push(id);
        log::trace!("navigation lock {} acquired ({} holders)", id, self.holders.len());
        LockToken { id }
    }

    pub fn release(&mut self, token: LockToken) -> LockRelease {
        let Some(slot) = self.holders.iter().position(|id| *id == token.id) else {
            log::warn!("release of unknown navigation lock token {}", token.id);
            return LockRelease::Unknown;
        };
        self.holders.swap_remove(slot);
        log::trace!(
            "navigation lock {} released ({} holders)",
            token.id,
            self.holders.len()
        );
        if self.holders.is_empty() {
            LockRelease::Released
        } else {
            LockRelease::StillHeld
        }
    }

    pub fn is_locked(&self) -> bool {
        !self.holders.is_empty()
    }

    pub fn holders(&self) -> usize {
        self.holders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_holder_releases() {
        let mut lock = NavigationLock::new();
        let pan = lock.acquire();
        let zoom = lock.acquire();
        assert!(lock.is_locked());
        assert_eq!(lock.holders(), 2);
        assert_eq!(lock.release(pan), LockRelease::StillHeld);
        assert!(lock.is_locked());
        assert_eq!(lock.release(zoom), LockRelease::Released);
        assert!(!lock.is_locked());
    }

    #[test]
    fn foreign_tokens_are_ignored() {
        let mut other = NavigationLock::new();
        let mut lock = NavigationLock::new();
        let _held = lock.acquire();
        let _first = other.acquire();
        let foreign = other.acquire();
        assert_eq!(lock.release(foreign), LockRelease::Unknown);
        assert_eq!(lock.holders(), 1);
    }
}
