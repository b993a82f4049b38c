//! Outbound platform actions
//!
//! This module defines the side-effect surface handlers use to act on the
//! platform, with a serenity-backed implementation for production use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::builder::{
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage, EditMember,
    GetMessages,
};
use serenity::http::Http;
use serenity::model::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::router::{InteractionEvent, Responder};

/// Errors that can occur while acting on the platform
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Discord API error
    #[error("Discord API error: {0}")]
    Api(#[from] Box<serenity::Error>),

    /// Could not open or use a direct-message channel
    #[error("Direct message channel unavailable for user {0}")]
    DmUnavailable(UserId),

    /// Failed to get guild or member
    #[error("Failed to get member {user} in guild {guild}")]
    MemberNotFound { guild: GuildId, user: UserId },

    /// Generic error
    #[error("Platform error: {0}")]
    Other(String),
}

impl From<serenity::Error> for PlatformError {
    fn from(error: serenity::Error) -> Self {
        Self::Api(Box::new(error))
    }
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Profile fields mirrored into the member store
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub user_id: UserId,
    pub user_name: String,
    pub display_name: String,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub avatar_url: String,
    pub roles: Vec<RoleId>,
}

/// Side-effect surface consumed by handlers, commands and tasks
#[async_trait]
pub trait Platform: Send + Sync {
    /// Send a message to a channel and return its id
    async fn send_message(&self, channel: ChannelId, content: &str) -> PlatformResult<MessageId>;

    /// Delete a message from a channel
    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<()>;

    /// Send a direct message to a user
    async fn direct_message(&self, user: UserId, content: &str) -> PlatformResult<()>;

    /// Add a role to a guild member
    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> PlatformResult<()>;

    /// Remove a role from a guild member
    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> PlatformResult<()>;

    /// Fetch a single member's profile
    async fn member_profile(&self, guild: GuildId, user: UserId) -> PlatformResult<MemberProfile>;

    /// Fetch every member's profile for a guild
    async fn guild_members(&self, guild: GuildId) -> PlatformResult<Vec<MemberProfile>>;

    /// Move a member to a voice channel
    async fn move_to_voice(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
    ) -> PlatformResult<()>;

    /// Fetch up to `limit` messages before the given id, newest first
    async fn recent_messages(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> PlatformResult<Vec<(MessageId, DateTime<Utc>)>>;

    /// Bulk-delete messages younger than the platform's two-week limit
    async fn delete_messages_bulk(
        &self,
        channel: ChannelId,
        messages: Vec<MessageId>,
    ) -> PlatformResult<()>;
}

/// Production platform backed by the serenity HTTP client
pub struct SerenityPlatform {
    http: Arc<Http>,
}

impl SerenityPlatform {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    fn profile_from_member(member: &Member) -> MemberProfile {
        MemberProfile {
            user_id: member.user.id,
            user_name: member.user.name.clone(),
            display_name: member.display_name().to_string(),
            joined_at: member
                .joined_at
                .and_then(|t| DateTime::from_timestamp(t.unix_timestamp(), 0)),
            created_at: DateTime::from_timestamp(member.user.created_at().unix_timestamp(), 0)
                .unwrap_or_default(),
            avatar_url: member.face(),
            roles: member.roles.clone(),
        }
    }
}

#[async_trait]
impl Platform for SerenityPlatform {
    async fn send_message(&self, channel: ChannelId, content: &str) -> PlatformResult<MessageId> {
        let message = channel
            .send_message(&*self.http, CreateMessage::new().content(content))
            .await?;
        Ok(message.id)
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<()> {
        channel.delete_message(&*self.http, message).await?;
        Ok(())
    }

    async fn direct_message(&self, user: UserId, content: &str) -> PlatformResult<()> {
        let dm = user
            .create_dm_channel(&*self.http)
            .await
            .map_err(|_| PlatformError::DmUnavailable(user))?;
        dm.id
            .send_message(&*self.http, CreateMessage::new().content(content))
            .await
            .map_err(|_| PlatformError::DmUnavailable(user))?;
        Ok(())
    }

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> PlatformResult<()> {
        self.http
            .add_member_role(guild, user, role, Some(reason))
            .await?;
        Ok(())
    }

    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> PlatformResult<()> {
        self.http
            .remove_member_role(guild, user, role, Some(reason))
            .await?;
        Ok(())
    }

    async fn member_profile(&self, guild: GuildId, user: UserId) -> PlatformResult<MemberProfile> {
        let member = guild
            .member(&*self.http, user)
            .await
            .map_err(|_| PlatformError::MemberNotFound { guild, user })?;
        Ok(Self::profile_from_member(&member))
    }

    async fn guild_members(&self, guild: GuildId) -> PlatformResult<Vec<MemberProfile>> {
        const PAGE_SIZE: u64 = 1000;

        let mut profiles = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = guild.members(&*self.http, Some(PAGE_SIZE), after).await?;
            let Some(last) = page.last() else { break };
            after = Some(last.user.id);
            let full_page = page.len() as u64 == PAGE_SIZE;
            profiles.extend(page.iter().map(Self::profile_from_member));
            if !full_page {
                break;
            }
        }
        info!(
            guild_id = %guild,
            member_count = profiles.len(),
            "Fetched guild member list"
        );
        Ok(profiles)
    }

    async fn move_to_voice(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
    ) -> PlatformResult<()> {
        guild
            .edit_member(&*self.http, user, EditMember::new().voice_channel(channel))
            .await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> PlatformResult<Vec<(MessageId, DateTime<Utc>)>> {
        let mut builder = GetMessages::new().limit(limit);
        if let Some(before) = before {
            builder = builder.before(before);
        }
        let messages = channel.messages(&*self.http, builder).await?;
        Ok(messages
            .iter()
            .map(|m| {
                (
                    m.id,
                    DateTime::from_timestamp(m.timestamp.unix_timestamp(), 0).unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn delete_messages_bulk(
        &self,
        channel: ChannelId,
        messages: Vec<MessageId>,
    ) -> PlatformResult<()> {
        channel.delete_messages(&*self.http, messages).await?;
        Ok(())
    }
}

/// Ephemeral interaction replies backed by the serenity HTTP client
pub struct SerenityResponder {
    http: Arc<Http>,
}

impl SerenityResponder {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Responder for SerenityResponder {
    async fn reply_ephemeral(
        &self,
        interaction: &InteractionEvent,
        content: &str,
    ) -> PlatformResult<()> {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(true),
        );
        self.http
            .create_interaction_response(
                interaction.interaction_id,
                &interaction.token,
                &response,
                vec![],
            )
            .await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PlatformError::DmUnavailable(UserId::new(42));
        assert_eq!(
            error.to_string(),
            "Direct message channel unavailable for user 42"
        );

        let error = PlatformError::MemberNotFound {
            guild: GuildId::new(1),
            user: UserId::new(2),
        };
        assert_eq!(error.to_string(), "Failed to get member 2 in guild 1");

        let error = PlatformError::Other("backend offline".to_string());
        assert_eq!(error.to_string(), "Platform error: backend offline");
    }

    #[test]
    fn test_platform_is_object_safe() {
        fn assert_object_safe(_: &dyn Platform) {}
        let _ = assert_object_safe;
    }
}
