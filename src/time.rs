use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(1);

/// Modification stamp taken from a process-wide logical clock.
///
/// Every call to [`Stamp::now`] returns a value strictly greater than all
/// previous ones, so comparing the stamp of a CPU resource with the stamp
/// recorded when it was uploaded tells exactly whether the GPU copy is stale,
/// even when two edits land within the same wall-clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(u64);

impl Stamp {
    /// Older than anything produced by [`Stamp::now`].
    pub const NEVER: Stamp = Stamp(0);

    pub fn now() -> Self {
        Stamp(CLOCK.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl Default for Stamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_are_strictly_increasing() {
        let a = Stamp::now();
        let b = Stamp::now();
        let c = Stamp::now();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn never_is_older_than_everything() {
        assert!(Stamp::NEVER < Stamp::now());
    }
}
