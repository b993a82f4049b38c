//! Gateway event listeners
//!
//! Each listener is registered with the dispatcher for one event kind and
//! owns the glue between the event payload and the subsystems it drives.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::platform::Platform;
use crate::resolver::Resolver;
use crate::router::{EventListener, GatewayEvent};
use crate::slowmode::{Decision, RejectedMessage, SlowmodeEngine, SlowmodeEnforcer};
use crate::store::MemberStore;
use crate::sync::sync_member_best_effort;
use crate::{
    CHANNEL_ADMISSIONS, CHANNEL_STAFF_LOG, CHANNEL_VC_LOGS, CHANNEL_WELCOME, ERROR_TARGET,
    EVENT_TARGET, Error, ROLE_HUSH, ROLE_SLOW,
};

/// Applies the slowmode cooldown to messages from restricted members
pub struct SlowmodeListener {
    engine: Arc<SlowmodeEngine>,
    enforcer: Arc<SlowmodeEnforcer>,
    resolver: Arc<Resolver>,
}

impl SlowmodeListener {
    #[must_use]
    pub fn new(
        engine: Arc<SlowmodeEngine>,
        enforcer: Arc<SlowmodeEnforcer>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            engine,
            enforcer,
            resolver,
        }
    }
}

#[async_trait]
impl EventListener for SlowmodeListener {
    fn label(&self) -> &'static str {
        "slowmode"
    }

    async fn handle(&self, event: &GatewayEvent) -> Result<(), Error> {
        let GatewayEvent::MessageCreated(message) = event else {
            return Ok(());
        };
        if message.author_is_bot {
            return Ok(());
        }
        let Some(guild_id) = message.guild_id else {
            return Ok(());
        };

        let slow_role = self.resolver.role(Some(guild_id), ROLE_SLOW);
        let hush_role = self.resolver.role(Some(guild_id), ROLE_HUSH);
        if slow_role.is_none() && hush_role.is_none() {
            warn!(
                target: ERROR_TARGET,
                guild_id = %guild_id,
                "Neither restriction role exists; slowmode inactive"
            );
            return Ok(());
        }

        let marker = SlowmodeEngine::marker_for(&message.author_roles, slow_role, hush_role);
        match self
            .engine
            .observe(message.author_id, marker, message.timestamp)
        {
            Decision::Allow => {}
            Decision::Reject {
                remaining_secs,
                enforcement,
            } => {
                info!(
                    target: EVENT_TARGET,
                    user_id = %message.author_id,
                    channel_id = %message.channel_id,
                    remaining_secs,
                    "Slowmode rejected a message"
                );
                self.enforcer
                    .enforce(
                        RejectedMessage {
                            channel_id: message.channel_id,
                            message_id: message.message_id,
                            author_id: message.author_id,
                            remaining_secs,
                        },
                        enforcement,
                    )
                    .await;
            }
        }
        Ok(())
    }
}

/// Deletes a bot reply when the member it replied to reacts with ❌
pub struct ReactionCleanupListener {
    platform: Arc<dyn Platform>,
}

impl ReactionCleanupListener {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl EventListener for ReactionCleanupListener {
    fn label(&self) -> &'static str {
        "reaction-cleanup"
    }

    async fn handle(&self, event: &GatewayEvent) -> Result<(), Error> {
        let GatewayEvent::ReactionAdded(reaction) = event else {
            return Ok(());
        };
        if reaction.user_is_bot || !reaction.message_author_is_self {
            return Ok(());
        }
        if reaction.replied_to_author_id != Some(reaction.user_id) {
            return Ok(());
        }
        if reaction.emoji != "❌" {
            return Ok(());
        }

        self.platform
            .delete_message(reaction.channel_id, reaction.message_id)
            .await?;
        Ok(())
    }
}

/// Posts voice channel join/leave notices to the vc-logs channel
pub struct VoiceLogListener {
    platform: Arc<dyn Platform>,
    resolver: Arc<Resolver>,
}

impl VoiceLogListener {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, resolver: Arc<Resolver>) -> Self {
        Self { platform, resolver }
    }
}

#[async_trait]
impl EventListener for VoiceLogListener {
    fn label(&self) -> &'static str {
        "voice-log"
    }

    async fn handle(&self, event: &GatewayEvent) -> Result<(), Error> {
        let GatewayEvent::VoiceStateChanged(voice) = event else {
            return Ok(());
        };
        let Some(vc_logs) = self
            .resolver
            .text_channel(Some(voice.guild_id), CHANNEL_VC_LOGS)
        else {
            return Ok(());
        };

        if let Some(channel) = voice.joined {
            self.platform
                .send_message(
                    vc_logs,
                    &format!("**{}** has joined <#{channel}>.", voice.display_name),
                )
                .await?;
        }
        if let Some(channel) = voice.left {
            self.platform
                .send_message(
                    vc_logs,
                    &format!("`{}` has left <#{channel}>.", voice.display_name),
                )
                .await?;
        }
        Ok(())
    }
}

/// Welcomes new members, notifies staff, and mirrors the join to the store
pub struct MemberJoinListener {
    platform: Arc<dyn Platform>,
    store: Arc<dyn MemberStore>,
    resolver: Arc<Resolver>,
}

impl MemberJoinListener {
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn MemberStore>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            platform,
            store,
            resolver,
        }
    }
}

#[async_trait]
impl EventListener for MemberJoinListener {
    fn label(&self) -> &'static str {
        "member-join"
    }

    async fn handle(&self, event: &GatewayEvent) -> Result<(), Error> {
        let GatewayEvent::MemberJoined(member) = event else {
            return Ok(());
        };
        info!(
            target: EVENT_TARGET,
            guild_id = %member.guild_id,
            user_id = %member.user_id,
            member_count = member.member_count,
            "Member joined"
        );

        // A prior snapshot means this is a returning member
        let returning = self
            .store
            .get_member(member.user_id.get(), member.guild_id.get())
            .await?
            .is_some();

        if returning {
            if let Some(staff_log) = self
                .resolver
                .text_channel(Some(member.guild_id), CHANNEL_STAFF_LOG)
            {
                self.platform
                    .send_message(
                        staff_log,
                        &format!(
                            "**{}** (<@{}>) has rejoined the server.",
                            member.user_name, member.user_id
                        ),
                    )
                    .await?;
            }
        } else {
            if let Some(welcome) = self
                .resolver
                .text_channel(Some(member.guild_id), CHANNEL_WELCOME)
            {
                let count_note = member
                    .member_count
                    .map(|count| format!(" You are member #{count}."))
                    .unwrap_or_default();
                self.platform
                    .send_message(
                        welcome,
                        &format!(
                            "Welcome to the server, <@{}>!{count_note} \
                             Feel free to look around and pick your roles with `/roles`.",
                            member.user_id
                        ),
                    )
                    .await?;
            }
            if let Some(admissions) = self
                .resolver
                .text_channel(Some(member.guild_id), CHANNEL_ADMISSIONS)
            {
                self.platform
                    .send_message(
                        admissions,
                        &format!(
                            "**{}** (<@{}>) has joined. Member count: {}.",
                            member.user_name,
                            member.user_id,
                            member
                                .member_count
                                .map_or_else(|| "unknown".to_string(), |c| c.to_string())
                        ),
                    )
                    .await?;
            }
        }

        sync_member_best_effort(
            self.platform.as_ref(),
            self.store.as_ref(),
            member.guild_id,
            member.user_id,
        )
        .await;
        Ok(())
    }
}

/// Posts a staff notice when a member leaves
pub struct MemberLeaveListener {
    platform: Arc<dyn Platform>,
    resolver: Arc<Resolver>,
}

impl MemberLeaveListener {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, resolver: Arc<Resolver>) -> Self {
        Self { platform, resolver }
    }
}

#[async_trait]
impl EventListener for MemberLeaveListener {
    fn label(&self) -> &'static str {
        "member-leave"
    }

    async fn handle(&self, event: &GatewayEvent) -> Result<(), Error> {
        let GatewayEvent::MemberLeft(member) = event else {
            return Ok(());
        };
        let Some(staff_log) = self
            .resolver
            .text_channel(Some(member.guild_id), CHANNEL_STAFF_LOG)
        else {
            return Ok(());
        };
        self.platform
            .send_message(
                staff_log,
                &format!(
                    "**{}** (<@{}>) has left the server.",
                    member.user_name, member.user_id
                ),
            )
            .await?;
        Ok(())
    }
}

/// Mirrors role changes into the member store
pub struct RoleSyncListener {
    platform: Arc<dyn Platform>,
    store: Arc<dyn MemberStore>,
}

impl RoleSyncListener {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, store: Arc<dyn MemberStore>) -> Self {
        Self { platform, store }
    }
}

#[async_trait]
impl EventListener for RoleSyncListener {
    fn label(&self) -> &'static str {
        "role-sync"
    }

    async fn handle(&self, event: &GatewayEvent) -> Result<(), Error> {
        let GatewayEvent::RoleUpdated(update) = event else {
            return Ok(());
        };
        sync_member_best_effort(
            self.platform.as_ref(),
            self.store.as_ref(),
            update.guild_id,
            update.user_id,
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{PlatformCall, RecordingPlatform, profile};
    use crate::resolver::testing::MemoryDirectory;
    use crate::router::{GatewayEvent, MessageEvent, ReactionEvent};
    use crate::slowmode::testing::RecordingOverwriteFactory;
    use crate::store::MemoryMemberStore;
    use chrono::{Duration, Utc};
    use serenity::model::prelude::*;

    const GUILD: GuildId = GuildId::new(100);
    const CHANNEL: ChannelId = ChannelId::new(200);
    const USER: UserId = UserId::new(300);
    const SLOW_ROLE: RoleId = RoleId::new(400);

    struct Fixture {
        platform: Arc<RecordingPlatform>,
        overwrites: Arc<RecordingOverwriteFactory>,
        listener: SlowmodeListener,
    }

    fn slowmode_fixture() -> Fixture {
        let directory = MemoryDirectory::new();
        directory.add_role(GUILD, SLOW_ROLE, ROLE_SLOW);
        directory.add_role(GUILD, RoleId::new(401), ROLE_HUSH);
        let resolver = Arc::new(Resolver::new(Arc::new(directory), GUILD));

        let engine = Arc::new(SlowmodeEngine::new(10));
        let platform = Arc::new(RecordingPlatform::new());
        let overwrites = Arc::new(RecordingOverwriteFactory::new());
        let enforcer = Arc::new(SlowmodeEnforcer::new(
            Arc::clone(&engine),
            Arc::clone(&platform) as Arc<dyn Platform>,
            Arc::clone(&overwrites) as _,
        ));
        Fixture {
            platform,
            overwrites,
            listener: SlowmodeListener::new(engine, enforcer, resolver),
        }
    }

    fn message(author_roles: Vec<RoleId>, secs_offset: i64, bot: bool) -> GatewayEvent {
        GatewayEvent::MessageCreated(MessageEvent {
            guild_id: Some(GUILD),
            channel_id: CHANNEL,
            message_id: MessageId::new(1),
            author_id: USER,
            author_is_bot: bot,
            author_roles,
            content: "hello".to_string(),
            has_attachments: false,
            timestamp: Utc::now() + Duration::seconds(secs_offset),
        })
    }

    #[tokio::test]
    async fn test_slowmode_ignores_bots_and_unmarked_users() {
        let fx = slowmode_fixture();

        fx.listener
            .handle(&message(vec![SLOW_ROLE], 0, true))
            .await
            .unwrap();
        fx.listener.handle(&message(vec![], 0, false)).await.unwrap();
        fx.listener.handle(&message(vec![], 1, false)).await.unwrap();

        assert!(fx.platform.calls().is_empty());
        assert_eq!(fx.overwrites.install_count(), 0);
    }

    #[tokio::test]
    async fn test_slowmode_rejects_rapid_marked_messages() {
        let fx = slowmode_fixture();

        fx.listener
            .handle(&message(vec![SLOW_ROLE], 0, false))
            .await
            .unwrap();
        assert!(fx.platform.calls().is_empty());

        fx.listener
            .handle(&message(vec![SLOW_ROLE], 4, false))
            .await
            .unwrap();

        assert_eq!(
            fx.platform
                .count(|c| matches!(c, PlatformCall::DeleteMessage { .. })),
            1
        );
        assert_eq!(
            fx.platform
                .count(|c| matches!(c, PlatformCall::DirectMessage { .. })),
            1
        );
        // Soft marker: no lockout
        assert_eq!(fx.overwrites.install_count(), 0);
    }

    fn reaction(emoji: &str, own_message: bool, replied_to: Option<UserId>) -> GatewayEvent {
        GatewayEvent::ReactionAdded(ReactionEvent {
            guild_id: Some(GUILD),
            channel_id: CHANNEL,
            message_id: MessageId::new(77),
            user_id: USER,
            user_is_bot: false,
            emoji: emoji.to_string(),
            message_author_is_self: own_message,
            replied_to_author_id: replied_to,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_reaction_cleanup_deletes_own_reply_on_cross() {
        let platform = Arc::new(RecordingPlatform::new());
        let listener = ReactionCleanupListener::new(Arc::clone(&platform) as _);

        listener
            .handle(&reaction("❌", true, Some(USER)))
            .await
            .unwrap();
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::DeleteMessage { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_reaction_cleanup_ignores_other_cases() {
        let platform = Arc::new(RecordingPlatform::new());
        let listener = ReactionCleanupListener::new(Arc::clone(&platform) as _);

        // Wrong emoji
        listener.handle(&reaction("👍", true, Some(USER))).await.unwrap();
        // Not the bot's message
        listener.handle(&reaction("❌", false, Some(USER))).await.unwrap();
        // Reply to someone else
        listener
            .handle(&reaction("❌", true, Some(UserId::new(999))))
            .await
            .unwrap();
        // Not a reply at all
        listener.handle(&reaction("❌", true, None)).await.unwrap();

        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_member_join_welcomes_new_members_and_syncs() {
        let directory = MemoryDirectory::new();
        directory.add_text_channel(GUILD, ChannelId::new(10), CHANNEL_WELCOME);
        directory.add_text_channel(GUILD, ChannelId::new(11), CHANNEL_ADMISSIONS);
        directory.add_text_channel(GUILD, ChannelId::new(12), CHANNEL_STAFF_LOG);
        let resolver = Arc::new(Resolver::new(Arc::new(directory), GUILD));

        let platform = Arc::new(RecordingPlatform::new());
        platform.insert_profile(GUILD, profile(USER, vec![RoleId::new(1)]));
        let store = Arc::new(MemoryMemberStore::new());
        let listener = MemberJoinListener::new(
            Arc::clone(&platform) as _,
            Arc::clone(&store) as _,
            resolver,
        );

        let event = GatewayEvent::MemberJoined(crate::router::MemberEvent {
            guild_id: GUILD,
            user_id: USER,
            user_name: "newcomer".to_string(),
            display_name: "Newcomer".to_string(),
            member_count: Some(57),
            timestamp: Utc::now(),
        });
        listener.handle(&event).await.unwrap();

        // Welcome and admissions notices, no staff rejoin notice
        assert_eq!(
            platform.count(|c| matches!(
                c,
                PlatformCall::SendMessage { channel, .. } if *channel == ChannelId::new(10)
            )),
            1
        );
        assert_eq!(
            platform.count(|c| matches!(
                c,
                PlatformCall::SendMessage { channel, .. } if *channel == ChannelId::new(11)
            )),
            1
        );
        assert_eq!(
            platform.count(|c| matches!(
                c,
                PlatformCall::SendMessage { channel, .. } if *channel == ChannelId::new(12)
            )),
            0
        );
        assert!(store.get_member(USER.get(), GUILD.get()).await.unwrap().is_some());

        // The same member joining again takes the returning path
        listener.handle(&event).await.unwrap();
        assert_eq!(
            platform.count(|c| matches!(
                c,
                PlatformCall::SendMessage { channel, .. } if *channel == ChannelId::new(12)
            )),
            1
        );
    }
}
