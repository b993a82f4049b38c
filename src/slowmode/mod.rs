//! Slowmode enforcement for rate-limited members
//!
//! Members carrying the `Slow` role get a delete-and-warn cooldown between
//! messages; members carrying the `Hush` role additionally get a temporary
//! channel-level send lockout that a timer lifts once the cooldown expires.
//! The cooldown decision itself is a synchronous check-and-set; everything
//! with I/O in it lives in the enforcer.

mod channel;
mod engine;
mod enforcer;

pub use channel::{GuildChannelOverwrites, HttpOverwriteFactory, OverwriteFactory};
pub use channel::SupportsPermissionOverwrites;
pub use engine::{
    DEFAULT_SLOWMODE_INTERVAL_SECS, Decision, Enforcement, Marker, SLOWMODE_INTERVAL_KEY,
    SlowmodeEngine,
};
pub use enforcer::{RejectedMessage, SlowmodeEnforcer, WARNING_TTL_SECS};

#[cfg(test)]
pub(crate) use channel::testing;
