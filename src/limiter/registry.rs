//! Per-client bucket lifecycle and tier lookup.
//!
//! A `DashMap<client_id, Mutex<ClientRecord>>` gives entry-level locking
//! so unrelated clients never contend. The `Mutex` wraps the whole
//! [`ClientRecord`], not just the bucket, because
//! [`RateLimiterRegistry::set_tier`] replaces tier and bucket together.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::bucket::{TakeResult, TokenBucket};
use super::tier::Tier;

/// One client's rate-limit state: its tier and its live bucket.
struct ClientRecord {
    tier: Tier,
    bucket: TokenBucket,
}

/// A point-in-time view of a [`ClientRecord`], for the admin `list()` call.
#[derive(Debug, Clone, Serialize)]
pub struct ClientRecordSnapshot {
    pub client_id: String,
    pub tier: Tier,
    pub tokens_available: f64,
}

/// Maps `client_id -> ClientRecord`. Mutations are linearizable per
/// client_id via `DashMap`'s entry-level sharded locking; different
/// clients never contend.
pub struct RateLimiterRegistry {
    default_tier: Tier,
    clients: DashMap<String, Mutex<ClientRecord>>,
    /// Last-touched timestamp per client, used by the idle-eviction sweep.
    /// Kept separate from `clients` so the sweep can read it without
    /// locking every record.
    last_touched: DashMap<String, Instant>,
}

impl RateLimiterRegistry {
    pub fn new(default_tier: Tier) -> Self {
        Self {
            default_tier,
            clients: DashMap::new(),
            last_touched: DashMap::new(),
        }
    }

    /// Resolve (lazily creating) the client's bucket and attempt to take
    /// `cost` tokens.
    pub fn check(&self, client_id: &str, cost: f64, now: Instant) -> TakeResult {
        self.last_touched.insert(client_id.to_string(), now);

        let entry = self.clients.entry(client_id.to_string()).or_insert_with(|| {
            Mutex::new(ClientRecord {
                tier: self.default_tier,
                bucket: TokenBucket::new(
                    self.default_tier.capacity(),
                    self.default_tier.refill_per_second(),
                    now,
                ),
            })
        });

        let mut record = entry.lock().expect("client record lock poisoned");
        record.bucket.try_take(cost, now)
    }

    /// Replace the client's bucket with a fresh, full bucket for `tier`.
    ///
    /// A tier change is a policy change, not a refill event: carrying
    /// drained state across a tier boundary would either punish a
    /// promotion or reward a demotion, so the bucket is reset to the new
    /// tier's full capacity rather than scaled by capacity ratio.
    pub fn set_tier(&self, client_id: &str, tier: Tier, now: Instant) {
        self.last_touched.insert(client_id.to_string(), now);
        let record = Mutex::new(ClientRecord {
            tier,
            bucket: TokenBucket::new(tier.capacity(), tier.refill_per_second(), now),
        });
        self.clients.insert(client_id.to_string(), record);
    }

    /// Snapshot of all known client records, for the admin endpoint.
    pub fn list(&self, now: Instant) -> Vec<ClientRecordSnapshot> {
        self.clients
            .iter()
            .map(|entry| {
                let mut record = entry.value().lock().expect("client record lock poisoned");
                ClientRecordSnapshot {
                    client_id: entry.key().clone(),
                    tier: record.tier,
                    tokens_available: record.bucket.available(now),
                }
            })
            .collect()
    }

    /// Remove client records untouched for at least `ttl`. Returns the
    /// number evicted. Called periodically by the idle-eviction
    /// background task (see `main.rs`), never from the request path.
    pub fn evict_idle(&self, ttl: Duration, now: Instant) -> usize {
        let stale: Vec<String> = self
            .last_touched
            .iter()
            .filter(|entry| now.saturating_duration_since(*entry.value()) >= ttl)
            .map(|entry| entry.key().clone())
            .collect();

        for client_id in &stale {
            self.clients.remove(client_id);
            self.last_touched.remove(client_id);
        }
        stale.len()
    }
}
