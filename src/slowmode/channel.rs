//! Channel permission-overwrite capability
//!
//! The enforcer only needs two operations on a channel: deny sending for one
//! member and undo that. Channels that support per-member overwrites expose
//! them through this capability trait, keeping the enforcement path free of
//! concrete channel types.

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::prelude::*;
use std::sync::Arc;

use crate::platform::PlatformResult;

/// Capability of installing per-member send overwrites on a channel
#[async_trait]
pub trait SupportsPermissionOverwrites: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Install a deny-send overwrite for the user
    async fn deny_send(&self, user: UserId) -> PlatformResult<()>;

    /// Remove the user's overwrite. Must tolerate the overwrite (or the
    /// channel) already being gone.
    async fn restore_send(&self, user: UserId) -> PlatformResult<()>;
}

/// Builds overwrite capabilities for channels as lockouts come and go
pub trait OverwriteFactory: Send + Sync {
    fn for_channel(&self, channel: ChannelId) -> Arc<dyn SupportsPermissionOverwrites>;
}

/// Overwrite capability for a guild text channel
pub struct GuildChannelOverwrites {
    http: Arc<Http>,
    channel: ChannelId,
}

impl GuildChannelOverwrites {
    #[must_use]
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        Self { http, channel }
    }

    fn denied_permissions() -> Permissions {
        Permissions::SEND_MESSAGES
            | Permissions::CREATE_PUBLIC_THREADS
            | Permissions::CREATE_PRIVATE_THREADS
            | Permissions::SEND_MESSAGES_IN_THREADS
    }
}

#[async_trait]
impl SupportsPermissionOverwrites for GuildChannelOverwrites {
    fn channel_id(&self) -> ChannelId {
        self.channel
    }

    async fn deny_send(&self, user: UserId) -> PlatformResult<()> {
        let overwrite = PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Self::denied_permissions(),
            kind: PermissionOverwriteType::Member(user),
        };
        self.channel.create_permission(&*self.http, overwrite).await?;
        Ok(())
    }

    async fn restore_send(&self, user: UserId) -> PlatformResult<()> {
        self.channel
            .delete_permission(&*self.http, PermissionOverwriteType::Member(user))
            .await?;
        Ok(())
    }
}

/// Production factory handing out HTTP-backed capabilities
pub struct HttpOverwriteFactory {
    http: Arc<Http>,
}

impl HttpOverwriteFactory {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl OverwriteFactory for HttpOverwriteFactory {
    fn for_channel(&self, channel: ChannelId) -> Arc<dyn SupportsPermissionOverwrites> {
        Arc::new(GuildChannelOverwrites::new(Arc::clone(&self.http), channel))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_permissions_cover_threads() {
        let denied = GuildChannelOverwrites::denied_permissions();
        assert!(denied.contains(Permissions::SEND_MESSAGES));
        assert!(denied.contains(Permissions::CREATE_PUBLIC_THREADS));
        assert!(denied.contains(Permissions::CREATE_PRIVATE_THREADS));
        assert!(denied.contains(Permissions::SEND_MESSAGES_IN_THREADS));
        assert!(!denied.contains(Permissions::VIEW_CHANNEL));
    }

    #[test]
    fn test_capability_is_object_safe() {
        fn assert_object_safe(_: &dyn SupportsPermissionOverwrites) {}
        let _ = assert_object_safe;
    }
}
