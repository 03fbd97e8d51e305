//! Token Registry
//!
//! Issues opaque admission tokens and validates each one at most once.
//! Tokens that are never presented expire after a configurable lifetime and
//! are swept by a background task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Thread-safe map of issued, not yet consumed admission tokens to the time
/// they were issued.
///
/// A token moves `issued -> consumed` inside a single `remove`, so two
/// concurrent admissions presenting the same token can never both succeed.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    issued: DashMap<String, Instant>,
    /// Lifetime of an unconsumed token. `None` keeps tokens forever.
    ttl: Option<Duration>,
}

impl TokenRegistry {
    /// Create an empty registry whose tokens never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry whose tokens expire after `ttl`.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            issued: DashMap::new(),
            ttl,
        }
    }

    /// Generate a fresh, globally unique token and mark it issued.
    pub fn issue(&self) -> String {
        loop {
            let token = Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.issued.entry(token.clone()) {
                slot.insert(Instant::now());
                return token;
            }
        }
    }

    /// Consume `token`.
    ///
    /// Returns `true` and forgets the token iff it is currently issued and
    /// not expired; unknown, expired or already consumed tokens return
    /// `false`. An expired token is forgotten either way.
    pub fn consume(&self, token: &str) -> bool {
        self.issued
            .remove(token)
            .is_some_and(|(_, issued_at)| !self.is_expired(issued_at))
    }

    /// Number of tokens issued but not yet consumed or swept.
    pub fn outstanding(&self) -> usize {
        self.issued.len()
    }

    /// Forget every expired token. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let mut purged = 0;
        self.issued.retain(|_, issued_at| {
            let keep = issued_at.elapsed() < ttl;
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    /// Sweep expired tokens every `period`.
    ///
    /// The first tick is skipped so nothing runs during startup. The task
    /// runs until aborted.
    pub fn start_cleanup_task(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = registry.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = registry.outstanding(), "Expired admission tokens swept");
                }
            }
        })
    }

    fn is_expired(&self, issued_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| issued_at.elapsed() >= ttl)
    }
}
