//! Container name generation (§5 "Container names: drawn from a
//! process-wide monotonic counter; never reused"; §9 DESIGN NOTES:
//! "Generator for container tags becomes an atomic counter").

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns the next deterministic, collision-free container name,
/// `n-<monotonic>` (§4.B).
pub fn next_tag() -> String {
    let id = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("n-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique_and_monotonic() {
        let a = next_tag();
        let b = next_tag();
        assert_ne!(a, b);
    }
}
