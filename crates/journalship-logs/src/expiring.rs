use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Slot<V> {
    value: V,
    deadline: Instant,
}

/// Thread-safe string-keyed map whose entries expire after a fixed TTL
pub struct ExpiringMap<V> {
    entries: RwLock<HashMap<String, Slot<V>>>,
    ttl: Duration,
}

impl<V: Clone> ExpiringMap<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry and push its deadline out by one TTL
    pub fn get_and_touch(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(slot) if now < slot.deadline => {
                slot.deadline = now + self.ttl;
                Some(slot.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert unless a live entry already exists. Returns whether it inserted.
    pub fn insert_if_absent(&self, key: &str, value: V) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.write();
        if let Some(slot) = entries.get(key) {
            if now < slot.deadline {
                return false;
            }
        }
        entries.insert(
            key.to_string(),
            Slot {
                value,
                deadline: now + self.ttl,
            },
        );
        true
    }

    /// Return the live entry for `key`, inserting `value` if there is none.
    /// When two callers race, the first insert wins.
    pub fn get_or_insert(&self, key: &str, value: V) -> V {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(slot) if now < slot.deadline => {
                slot.deadline = now + self.ttl;
                slot.value.clone()
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Slot {
                        value: value.clone(),
                        deadline: now + self.ttl,
                    },
                );
                value
            }
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, slot| now < slot.deadline);
        before - entries.len()
    }

    /// All live entries
    pub fn items(&self) -> Vec<(String, V)> {
        self.purge_expired();
        self.entries
            .read()
            .iter()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent() {
        let map = ExpiringMap::new(Duration::from_secs(60));
        assert!(map.insert_if_absent("a", 1));
        assert!(!map.insert_if_absent("a", 2));
        assert_eq!(map.get_and_touch("a"), Some(1));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let map = ExpiringMap::new(Duration::ZERO);
        assert!(map.insert_if_absent("a", 1));
        assert_eq!(map.get_and_touch("a"), None);
        assert!(map.insert_if_absent("a", 2));
        assert!(map.items().is_empty());
    }

    #[test]
    fn test_get_or_insert_first_wins() {
        let map = ExpiringMap::new(Duration::from_secs(60));
        assert_eq!(map.get_or_insert("k", "first"), "first");
        assert_eq!(map.get_or_insert("k", "second"), "first");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let map = ExpiringMap::new(Duration::ZERO);
        map.insert_if_absent("a", ());
        map.insert_if_absent("b", ());
        assert_eq!(map.purge_expired(), 2);
        assert!(map.is_empty());
    }
}
