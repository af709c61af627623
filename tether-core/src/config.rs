//! Configuration types

use crate::{ConfigError, TetherResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capacity used for LRU caches when none is configured.
pub const DEFAULT_LRU_CAPACITY: usize = 1024;

/// Retention strategy backing an object cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheStrategyKind {
    /// Unbounded, holds strong references
    Strong,
    /// Entries vanish once callers drop every handle
    Weak,
    /// Bounded, least recently used entry evicted first
    Lru { capacity: usize },
}

impl CacheStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategyKind::Strong => "strong",
            CacheStrategyKind::Weak => "weak",
            CacheStrategyKind::Lru { .. } => "lru",
        }
    }
}

impl fmt::Display for CacheStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategyKind::Lru { capacity } => write!(f, "lru({})", capacity),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for CacheStrategyKind {
    type Err = ConfigError;

    /// Parses `strong`, `weak`, `lru` or `lru:<capacity>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let (name, capacity) = match lowered.split_once(':') {
            Some((name, capacity)) => (name, Some(capacity)),
            None => (lowered.as_str(), None),
        };
        match (name, capacity) {
            ("strong", None) => Ok(CacheStrategyKind::Strong),
            ("weak", None) => Ok(CacheStrategyKind::Weak),
            ("lru", None) => Ok(CacheStrategyKind::Lru {
                capacity: DEFAULT_LRU_CAPACITY,
            }),
            ("lru", Some(capacity)) => capacity
                .parse()
                .map(|capacity| CacheStrategyKind::Lru { capacity })
                .map_err(|_| ConfigError::InvalidValue {
                    field: "strategy.capacity".to_string(),
                    value: capacity.to_string(),
                    reason: "capacity must be an unsigned integer".to_string(),
                }),
            _ => Err(ConfigError::InvalidValue {
                field: "strategy".to_string(),
                value: s.to_string(),
                reason: "expected strong, weak, lru or lru:<capacity>".to_string(),
            }),
        }
    }
}

/// Object cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Retention strategy for cached instances
    pub strategy: CacheStrategyKind,
    /// Load every persisted row into the cache when it is first bound
    pub backfill_on_bind: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategyKind::Weak,
            backfill_on_bind: false,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: CacheStrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_backfill(mut self, enabled: bool) -> Self {
        self.backfill_on_bind = enabled;
        self
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(TetherError::Config) if invalid.
    pub fn validate(&self) -> TetherResult<()> {
        if let CacheStrategyKind::Lru { capacity } = self.strategy {
            if capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "strategy.capacity".to_string(),
                    value: capacity.to_string(),
                    reason: "lru capacity must be greater than 0".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TETHER_CACHE_STRATEGY`: `strong`, `weak` or `lru` (default: weak)
    /// - `TETHER_CACHE_CAPACITY`: LRU capacity (default: 1024)
    /// - `TETHER_CACHE_BACKFILL`: `true`/`1` to backfill on bind (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let capacity: Option<usize> =
            lookup("TETHER_CACHE_CAPACITY").and_then(|s| s.trim().parse().ok());

        let strategy = lookup("TETHER_CACHE_STRATEGY")
            .and_then(|s| s.parse::<CacheStrategyKind>().ok())
            .map(|kind| match (kind, capacity) {
                (CacheStrategyKind::Lru { .. }, Some(capacity)) => {
                    CacheStrategyKind::Lru { capacity }
                }
                (kind, _) => kind,
            })
            .unwrap_or(defaults.strategy);

        Self {
            strategy,
            backfill_on_bind: lookup("TETHER_CACHE_BACKFILL")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.backfill_on_bind),
        }
    }
}
