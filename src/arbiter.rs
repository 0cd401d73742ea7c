//! Round-robin arbitration with fragment locking.
//!
//! Selection is a pure function of the readiness vector and the arbiter
//! state (last served index, optional lock); state only changes in
//! [`RoundRobinArbiter::commit`]. While a multi-part item is in flight
//! the arbiter stays locked to its source so parts never interleave on
//! the shared channel.

#[derive(Debug)]
pub struct RoundRobinArbiter {
    n: usize,
    last: usize,
    locked: Option<usize>,
}

impl RoundRobinArbiter {
    pub fn new(n: usize) -> Self {
        RoundRobinArbiter {
            n,
            // First grant starts the scan at index 0.
            last: n.saturating_sub(1),
            locked: None,
        }
    }

    /// Pick the source to serve, without mutating state. Ties break to
    /// the next index after the last served. A locked arbiter serves
    /// only its locked source, or nothing while that source is stalled.
    pub fn select(&self, ready: &[bool]) -> Option<usize> {
        debug_assert_eq!(ready.len(), self.n);
        if let Some(k) = self.locked {
            return ready[k].then_some(k);
        }
        (1..=self.n)
            .map(|i| (self.last + i) % self.n)
            .find(|&idx| ready[idx])
    }

    /// Record that one part from `idx` was forwarded. `last_fragment`
    /// releases the lock; a non-final part acquires it.
    pub fn commit(&mut self, idx: usize, last_fragment: bool) {
        debug_assert!(idx < self.n);
        debug_assert!(self.locked.is_none() || self.locked == Some(idx));
        self.last = idx;
        self.locked = (!last_fragment).then_some(idx);
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }
}
