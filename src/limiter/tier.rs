//! Rate-limit tiers — named `(capacity, refill_rate)` pairs.

use serde::{Deserialize, Serialize};

/// A named capacity/refill-rate pair governing a client's token bucket.
///
/// Canonical values per the gateway's policy table: `(refill_per_second,
/// capacity)` — `FREE (1, 10)`, `BASIC (5, 50)`, `PREMIUM (20, 200)`,
/// `ENTERPRISE (100, 1000)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Premium, Tier::Enterprise];

    pub fn refill_per_second(self) -> f64 {
        match self {
            Tier::Free => 1.0,
            Tier::Basic => 5.0,
            Tier::Premium => 20.0,
            Tier::Enterprise => 100.0,
        }
    }

    pub fn capacity(self) -> f64 {
        match self {
            Tier::Free => 10.0,
            Tier::Basic => 50.0,
            Tier::Premium => 200.0,
            Tier::Enterprise => 1000.0,
        }
    }

    /// Parse a tier name case-insensitively (`"free"`, `"FREE"`, `"Free"`
    /// all resolve). Returns `None` for anything outside the canonical set
    /// — callers surface that as [`crate::error::GatewayError::UnknownTier`].
    pub fn parse(name: &str) -> Option<Tier> {
        match name.to_ascii_uppercase().as_str() {
            "FREE" => Some(Tier::Free),
            "BASIC" => Some(Tier::Basic),
            "PREMIUM" => Some(Tier::Premium),
            "ENTERPRISE" => Some(Tier::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Basic => "BASIC",
            Tier::Premium => "PREMIUM",
            Tier::Enterprise => "ENTERPRISE",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}
