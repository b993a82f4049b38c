//! Member state synchronization
//!
//! Snapshots a member's profile and role set and upserts it into the member
//! store. Consulted by the join/leave/role-update listeners and by the daily
//! sync task.

use chrono::{DateTime, Utc};
use serenity::model::prelude::*;
use tracing::info;

use crate::platform::{MemberProfile, Platform};
use crate::store::{MemberSnapshot, MemberStore};
use crate::{ERROR_TARGET, Error};

/// Build a store snapshot from a platform profile
#[must_use]
pub fn snapshot_from_profile(
    guild: GuildId,
    profile: &MemberProfile,
    now: DateTime<Utc>,
) -> MemberSnapshot {
    MemberSnapshot {
        id: MemberSnapshot::key(profile.user_id.get(), guild.get()),
        user_id: profile.user_id.get(),
        user_name: profile.user_name.clone(),
        display_name: profile.display_name.clone(),
        guild_id: guild.get(),
        joined_at: profile.joined_at,
        created_at: profile.created_at,
        avatar_url: profile.avatar_url.clone(),
        roles: profile.roles.iter().map(|r| r.get()).collect(),
        synced_at: now,
    }
}

/// Fetch a member's current state and upsert it into the store
pub async fn sync_member(
    platform: &dyn Platform,
    store: &dyn MemberStore,
    guild: GuildId,
    user: UserId,
) -> Result<(), Error> {
    let profile = platform.member_profile(guild, user).await?;
    store
        .upsert_member(snapshot_from_profile(guild, &profile, Utc::now()))
        .await?;
    info!(
        guild_id = %guild,
        user_id = %user,
        "Synced member snapshot to store"
    );
    Ok(())
}

/// Like `sync_member`, but logs and swallows failures for call sites where
/// a missed sync must not interrupt the surrounding handler.
pub async fn sync_member_best_effort(
    platform: &dyn Platform,
    store: &dyn MemberStore,
    guild: GuildId,
    user: UserId,
) {
    if let Err(err) = sync_member(platform, store, guild, user).await {
        tracing::warn!(
            target: ERROR_TARGET,
            guild_id = %guild,
            user_id = %user,
            error = %err,
            "Member sync failed"
        );
    }
}
