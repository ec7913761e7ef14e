//! Isolation keys
//!
//! Every scenario run embeds a random token in the names of the resources it
//! creates, so concurrent runs against the same account never collide. The
//! generator is passed explicitly and remembers every key it issued.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{Error, Result};

/// Placeholder replaced by the isolation key in scenario variables and expectations
pub const PLACEHOLDER: &str = "{{isolation_key}}";

/// Number of distinct keys; keys are decimal strings below this bound
const KEY_SPACE: u32 = 100_000;

/// Random token embedded in resource names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IsolationKey(String);

impl IsolationKey {
    /// Use a fixed key, e.g. to reproduce a failed run
    pub fn fixed(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Replace every placeholder in `template` with this key
    pub fn render(&self, template: &str) -> String {
        template.replace(PLACEHOLDER, &self.0)
    }
}

impl fmt::Display for IsolationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct GeneratorState {
    rng: StdRng,
    issued: HashSet<String>,
}

/// Session-scoped source of unique isolation keys
pub struct KeyGenerator {
    state: Mutex<GeneratorState>,
}

impl KeyGenerator {
    /// Generator seeded from the operating system
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic generator, for reproducing a session
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                rng,
                issued: HashSet::new(),
            }),
        }
    }

    /// Issue a key never issued before by this generator
    pub fn next_key(&self) -> Result<IsolationKey> {
        let mut state = self.state.lock();
        if state.issued.len() >= KEY_SPACE as usize {
            return Err(Error::Internal(format!(
                "All {KEY_SPACE} isolation keys have been issued"
            )));
        }
        loop {
            let candidate = state.rng.gen_range(0..KEY_SPACE).to_string();
            if state.issued.insert(candidate.clone()) {
                return Ok(IsolationKey(candidate));
            }
        }
    }

    /// Mark an externally chosen key as taken
    pub fn reserve(&self, key: &IsolationKey) -> bool {
        self.state.lock().issued.insert(key.0.clone())
    }

    /// Number of keys issued so far
    pub fn issued(&self) -> usize {
        self.state.lock().issued.len()
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousand_keys_are_distinct() {
        let gen = KeyGenerator::from_entropy();
        let keys: HashSet<IsolationKey> = (0..1000).map(|_| gen.next_key().unwrap()).collect();
        assert_eq!(keys.len(), 1000);
        assert_eq!(gen.issued(), 1000);
    }

    #[test]
    fn test_seeded_generators_repeat() {
        let a = KeyGenerator::seeded(7);
        let b = KeyGenerator::seeded(7);
        for _ in 0..10 {
            assert_eq!(a.next_key().unwrap(), b.next_key().unwrap());
        }
    }

    #[test]
    fn test_keys_are_decimal_in_range() {
        let gen = KeyGenerator::seeded(1);
        for _ in 0..100 {
            let key = gen.next_key().unwrap();
            let n: u32 = key.as_str().parse().unwrap();
            assert!(n < KEY_SPACE);
        }
    }

    #[test]
    fn test_reserved_key_is_not_reissued() {
        let gen = KeyGenerator::seeded(3);
        let first = KeyGenerator::seeded(3).next_key().unwrap();
        assert!(gen.reserve(&first));
        assert!(!gen.reserve(&first));
        assert_ne!(gen.next_key().unwrap(), first);
    }

    #[test]
    fn test_render_replaces_every_placeholder() {
        let key = IsolationKey::fixed("42");
        assert_eq!(
            key.render("eg-ue2-test-sg-{{isolation_key}}-{{isolation_key}}"),
            "eg-ue2-test-sg-42-42"
        );
        assert_eq!(key.render("no placeholder"), "no placeholder");
    }
}
