//! In-process TTL caches.
//!
//! Thread-safe caches for values the engine would otherwise re-fetch from
//! collaborators on every send: derived addresses, token decimals, and
//! indexer balances. Balances are explicitly invalidated after every
//! successful send so the next read reflects the new state.

use crate::config::CacheConfig;
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::{
    hash::Hash,
    time::{Duration, Instant},
};
use tracing::trace;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A concurrent map whose entries expire after a fixed TTL.
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash + std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("entries", &self.entries)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<V> std::fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry").field("expires_at", &self.expires_at).finish_non_exhaustive()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Creates a cache with the given display name and entry lifetime.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self { name, entries: DashMap::new(), ttl }
    }

    /// Returns the live value for `key`, dropping it if expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                metrics::counter!("custodia_cache_hits", "cache" => self.name).increment(1);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        metrics::counter!("custodia_cache_misses", "cache" => self.name).increment(1);
        None
    }

    /// Inserts a value with a fresh TTL.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, Entry { value, expires_at: Instant::now() + self.ttl });
    }

    /// Removes a single entry.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Removes all entries failing the predicate.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.entries.retain(|key, entry| keep(key, &entry.value));
    }

    /// Drops expired entries, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            trace!(cache = self.name, removed, "swept expired cache entries");
        }
        removed
    }

    /// Number of entries, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Key for cached balances.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BalanceKey {
    /// Base chain key.
    pub chain: String,
    /// Account address the balance belongs to.
    pub address: Address,
    /// Token address, or `None` for the native asset.
    pub token: Option<Address>,
}

/// The engine's cache set, scoped to one orchestrator instance.
#[derive(Debug)]
pub struct EngineCaches {
    /// Derived address per (owner, base chain key).
    pub address: TtlCache<(String, String), Address>,
    /// Token decimals per (chain id, token).
    pub decimals: TtlCache<(u64, Address), u8>,
    /// Indexer balances per [`BalanceKey`].
    pub balance: TtlCache<BalanceKey, U256>,
}

impl EngineCaches {
    /// Creates the cache set from configured lifetimes.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            address: TtlCache::new("address", config.address_ttl),
            decimals: TtlCache::new("decimals", config.decimals_ttl),
            balance: TtlCache::new("balance", config.balance_ttl),
        }
    }

    /// Drops every cached balance for (chain, address).
    ///
    /// Called after each successful send so the next affordability check
    /// observes the post-send state.
    pub fn invalidate_balances(&self, chain: &str, address: Address) {
        self.balance.retain(|key, _| !(key.chain == chain && key.address == address));
    }

    /// Drops expired entries across all caches.
    pub fn sweep_expired(&self) -> usize {
        self.address.sweep_expired() + self.decimals.sweep_expired() + self.balance.sweep_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_respects_ttl() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_millis(20));
        cache.insert(1, 10);
        assert_eq!(cache.get(&1), Some(10));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_millis(20));
        cache.insert(1, 10);
        std::thread::sleep(Duration::from_millis(30));
        cache.insert(2, 20);
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.get(&2), Some(20));
    }

    #[test]
    fn balance_invalidation_is_scoped() {
        let caches = EngineCaches::new(&CacheConfig::default());
        let alice = Address::repeat_byte(0xaa);
        let bob = Address::repeat_byte(0xbb);
        let token = Address::repeat_byte(0x01);

        for (address, token) in [(alice, None), (alice, Some(token)), (bob, None)] {
            caches.balance.insert(
                BalanceKey { chain: "base-sepolia".into(), address, token },
                U256::from(100),
            );
        }

        caches.invalidate_balances("base-sepolia", alice);

        let key = |address, token| BalanceKey { chain: "base-sepolia".into(), address, token };
        assert_eq!(caches.balance.get(&key(alice, None)), None);
        assert_eq!(caches.balance.get(&key(alice, Some(token))), None);
        assert_eq!(caches.balance.get(&key(bob, None)), Some(U256::from(100)));
    }
}
