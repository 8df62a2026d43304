//! Session key issuance.
//!
//! Every registration probe carries a 64-bit session key that the game
//! server must echo in its response. Keys come from a single counter
//! seeded from the clock and advanced by a random step, so they are
//! strictly increasing within a process lifetime and not guessable from
//! an observed key.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct SessionKeys {
    current: u64,
}

impl SessionKeys {
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        SessionKeys::with_seed(seconds << 16)
    }

    /// Fixed seed, for deterministic tests.
    pub fn with_seed(seed: u64) -> Self {
        SessionKeys { current: seed }
    }

    /// Advances by `1 + random(0..=255)` and returns the new key.
    pub fn next_key(&mut self) -> u64 {
        self.current = self
            .current
            .wrapping_add(1 + rand::thread_rng().gen::<u8>() as u64);
        self.current
    }
}

impl Default for SessionKeys {
    fn default() -> Self {
        SessionKeys::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_strictly_increase_with_bounded_gaps() {
        let mut keys = SessionKeys::with_seed(0);
        let mut previous = 0u64;
        for _ in 0..1000 {
            let key = keys.next_key();
            let gap = key - previous;
            assert!((1..=256).contains(&gap), "gap {} out of range", gap);
            previous = key;
        }
    }

    #[test]
    fn keys_are_never_reused() {
        let mut keys = SessionKeys::with_seed(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(keys.next_key()));
        }
    }

    #[test]
    fn seed_is_starting_point_not_first_key() {
        let mut keys = SessionKeys::with_seed(100);
        let first = keys.next_key();
        assert!(first > 100);
        assert!(first <= 356);
    }
}
