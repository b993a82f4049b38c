//! Cooldown tracking and enforcement decisions
//!
//! This module owns the per-user cooldown map and the lockout set. The
//! decision path is strictly synchronous: the check-and-set happens inside
//! the map's entry lock with no I/O, so two events for the same user can
//! never interleave between the read and the write.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use derive_more::Display;
use serenity::model::prelude::*;
use tracing::{info, warn};

use crate::store::MemberStore;

/// Fallback cooldown when the store carries no override
pub const DEFAULT_SLOWMODE_INTERVAL_SECS: u64 = 10;

/// Store constant overriding the cooldown interval
pub const SLOWMODE_INTERVAL_KEY: &str = "SLOWMODE_INTERVAL_SECONDS";

/// Which restriction marker a member carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Marker {
    /// Delete-and-warn cooldown
    #[display("Slow")]
    Slow,
    /// Cooldown plus a timed channel send lockout
    #[display("Hush")]
    Hush,
}

/// What a rejection entails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    /// Delete the message and warn the member
    DeleteAndWarn,
    /// Delete, warn, and hold a channel send lockout until the cooldown
    /// expires. `install` is true only when this rejection claimed the
    /// lockout; repeat rejections while locked keep it false.
    Lockout { install: bool },
}

/// Outcome of observing a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject {
        /// Seconds left on the cooldown, rounded up
        remaining_secs: u64,
        enforcement: Enforcement,
    },
}

/// Per-user cooldown state and lockout membership
pub struct SlowmodeEngine {
    threshold: Duration,
    last_message: DashMap<UserId, DateTime<Utc>>,
    locked: DashSet<UserId>,
}

impl SlowmodeEngine {
    #[must_use]
    pub fn new(threshold_secs: u64) -> Self {
        Self {
            threshold: Duration::seconds(threshold_secs as i64),
            last_message: DashMap::new(),
            locked: DashSet::new(),
        }
    }

    /// Build an engine with the threshold from the store's
    /// `SLOWMODE_INTERVAL_SECONDS` constant, falling back to the default.
    pub async fn from_store(store: &dyn MemberStore) -> Self {
        let threshold_secs = match store.get_constant(SLOWMODE_INTERVAL_KEY).await {
            Ok(Some(value)) => value.parse().unwrap_or_else(|_| {
                warn!(
                    value = %value,
                    "Invalid {SLOWMODE_INTERVAL_KEY} constant, using default"
                );
                DEFAULT_SLOWMODE_INTERVAL_SECS
            }),
            Ok(None) => DEFAULT_SLOWMODE_INTERVAL_SECS,
            Err(err) => {
                warn!(error = %err, "Could not read slowmode interval, using default");
                DEFAULT_SLOWMODE_INTERVAL_SECS
            }
        };
        info!(threshold_secs, "Slowmode engine configured");
        Self::new(threshold_secs)
    }

    #[must_use]
    pub fn threshold_secs(&self) -> u64 {
        self.threshold.num_seconds().max(0) as u64
    }

    /// Pick the marker for a member's role set. When a member carries both
    /// restriction roles, `Slow` wins and the lockout path is never taken.
    #[must_use]
    pub fn marker_for(
        roles: &[RoleId],
        slow_role: Option<RoleId>,
        hush_role: Option<RoleId>,
    ) -> Option<Marker> {
        if slow_role.is_some_and(|role| roles.contains(&role)) {
            return Some(Marker::Slow);
        }
        if hush_role.is_some_and(|role| roles.contains(&role)) {
            return Some(Marker::Hush);
        }
        None
    }

    /// Observe a message from a user and decide whether it may stand.
    ///
    /// An accepted message updates the user's cooldown clock; a rejected one
    /// leaves it untouched, so rejected attempts never extend the cooldown.
    /// No entry yet means the user has never sent an accepted message and is
    /// always allowed.
    pub fn observe(
        &self,
        user: UserId,
        marker: Option<Marker>,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(marker) = marker else {
            return Decision::Allow;
        };

        // Check-and-set under the entry lock; nothing here may await.
        let remaining = match self.last_message.entry(user) {
            Entry::Occupied(mut entry) => {
                let elapsed = now - *entry.get();
                if elapsed < self.threshold {
                    Some(self.threshold - elapsed)
                } else {
                    entry.insert(now);
                    None
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                None
            }
        };

        let Some(remaining) = remaining else {
            return Decision::Allow;
        };

        let enforcement = match marker {
            Marker::Slow => Enforcement::DeleteAndWarn,
            Marker::Hush => Enforcement::Lockout {
                install: self.locked.insert(user),
            },
        };

        Decision::Reject {
            remaining_secs: ceil_secs(remaining),
            enforcement,
        }
    }

    /// Whether the user currently holds a lockout
    #[must_use]
    pub fn is_locked(&self, user: UserId) -> bool {
        self.locked.contains(&user)
    }

    /// Clear a user's lockout membership. Called by the restore timer, and
    /// by the enforcer when an overwrite install fails.
    pub fn release(&self, user: UserId) {
        self.locked.remove(&user);
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}
