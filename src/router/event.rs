//! Gateway event model
//!
//! Events arrive from the serenity glue layer already flattened into these
//! payloads, so listeners and the dispatcher never touch gateway types and
//! tests can construct events directly.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serenity::model::prelude::*;
use std::collections::HashMap;

/// Kind tag for a gateway event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EventKind {
    #[display("message-created")]
    MessageCreated,
    #[display("reaction-added")]
    ReactionAdded,
    #[display("voice-state-changed")]
    VoiceStateChanged,
    #[display("member-joined")]
    MemberJoined,
    #[display("member-left")]
    MemberLeft,
    #[display("role-updated")]
    RoleUpdated,
    #[display("interaction-created")]
    InteractionCreated,
}

/// A typed gateway event with its payload
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    MessageCreated(MessageEvent),
    ReactionAdded(ReactionEvent),
    VoiceStateChanged(VoiceEvent),
    MemberJoined(MemberEvent),
    MemberLeft(MemberEvent),
    RoleUpdated(RoleUpdateEvent),
    InteractionCreated(InteractionEvent),
}

impl GatewayEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageCreated(_) => EventKind::MessageCreated,
            Self::ReactionAdded(_) => EventKind::ReactionAdded,
            Self::VoiceStateChanged(_) => EventKind::VoiceStateChanged,
            Self::MemberJoined(_) => EventKind::MemberJoined,
            Self::MemberLeft(_) => EventKind::MemberLeft,
            Self::RoleUpdated(_) => EventKind::RoleUpdated,
            Self::InteractionCreated(_) => EventKind::InteractionCreated,
        }
    }
}

/// A message posted to a channel
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub author_is_bot: bool,
    pub author_roles: Vec<RoleId>,
    pub content: String,
    pub has_attachments: bool,
    pub timestamp: DateTime<Utc>,
}

/// A reaction added to a message
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub user_is_bot: bool,
    pub emoji: String,
    /// Whether the reacted-to message was authored by this bot
    pub message_author_is_self: bool,
    /// Author of the message the reacted-to message replied to, if any
    pub replied_to_author_id: Option<UserId>,
    pub timestamp: DateTime<Utc>,
}

/// A member joining or leaving a voice channel
#[derive(Debug, Clone)]
pub struct VoiceEvent {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub display_name: String,
    pub joined: Option<ChannelId>,
    pub left: Option<ChannelId>,
    pub timestamp: DateTime<Utc>,
}

/// A member joining or leaving the guild
#[derive(Debug, Clone)]
pub struct MemberEvent {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub user_name: String,
    pub display_name: String,
    pub member_count: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// A member's role set changing
#[derive(Debug, Clone)]
pub struct RoleUpdateEvent {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
    pub timestamp: DateTime<Utc>,
}

/// The three disjoint command namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CommandNamespace {
    #[display("slash")]
    Slash,
    #[display("user")]
    User,
    #[display("message")]
    Message,
}

/// The member invoking an interaction
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
    pub user_name: String,
    pub role_names: Vec<String>,
}

impl Caller {
    #[must_use]
    pub fn new(user_id: UserId, user_name: impl Into<String>, role_names: Vec<String>) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            role_names,
        }
    }
}

/// A single interaction option value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    User(UserId),
    Text(String),
    Integer(i64),
    Boolean(bool),
}

/// Named options supplied with a command interaction
#[derive(Debug, Clone, Default)]
pub struct CommandArgs(HashMap<String, ArgValue>);

impl CommandArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.0.insert(name.into(), value);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn user(&self, name: &str) -> Option<UserId> {
        match self.0.get(name) {
            Some(ArgValue::User(id)) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ArgValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ArgValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(ArgValue::Boolean(value)) => Some(*value),
            _ => None,
        }
    }
}

/// A command-shaped interaction
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    pub interaction_id: InteractionId,
    pub token: String,
    pub namespace: CommandNamespace,
    pub command_name: String,
    pub guild_id: Option<GuildId>,
    pub channel_id: Option<ChannelId>,
    pub caller: Caller,
    pub args: CommandArgs,
    /// Target of a user-context command
    pub target_user: Option<UserId>,
    /// Target of a message-context command
    pub target_message: Option<(ChannelId, MessageId)>,
    pub timestamp: DateTime<Utc>,
}

impl InteractionEvent {
    /// The user a moderation command acts on: the context-menu target, or
    /// the `user` option for slash commands.
    #[must_use]
    pub fn subject_user(&self) -> Option<UserId> {
        self.target_user.or_else(|| self.args.user("user"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Build a minimal interaction for dispatcher and command tests.
    pub(crate) fn interaction(
        namespace: CommandNamespace,
        name: &str,
        guild_id: Option<GuildId>,
        caller: Caller,
    ) -> InteractionEvent {
        InteractionEvent {
            interaction_id: InteractionId::new(1),
            token: "test-token".to_string(),
            namespace,
            command_name: name.to_string(),
            guild_id,
            channel_id: Some(ChannelId::new(1)),
            caller,
            args: CommandArgs::new(),
            target_user: None,
            target_message: None,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn caller(user_id: u64, role_names: &[&str]) -> Caller {
        Caller::new(
            UserId::new(user_id),
            format!("user-{user_id}"),
            role_names.iter().map(ToString::to_string).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_mapping() {
        let event = GatewayEvent::MessageCreated(MessageEvent {
            guild_id: None,
            channel_id: ChannelId::new(1),
            message_id: MessageId::new(2),
            author_id: UserId::new(3),
            author_is_bot: false,
            author_roles: Vec::new(),
            content: String::new(),
            has_attachments: false,
            timestamp: Utc::now(),
        });
        assert_eq!(event.kind(), EventKind::MessageCreated);
        assert_eq!(event.kind().to_string(), "message-created");
    }

    #[test]
    fn test_command_args_accessors() {
        let args = CommandArgs::new()
            .with("user", ArgValue::User(UserId::new(5)))
            .with("reason", ArgValue::Text("spam".to_string()))
            .with("days", ArgValue::Integer(3))
            .with("silent", ArgValue::Boolean(true));

        assert_eq!(args.user("user"), Some(UserId::new(5)));
        assert_eq!(args.text("reason"), Some("spam"));
        assert_eq!(args.integer("days"), Some(3));
        assert_eq!(args.boolean("silent"), Some(true));

        // Wrong accessor for a name yields None rather than a panic
        assert_eq!(args.text("user"), None);
        assert_eq!(args.user("missing"), None);
    }

    #[test]
    fn test_subject_user_prefers_context_target() {
        let mut interaction = testing::interaction(
            CommandNamespace::User,
            "Jail User",
            Some(GuildId::new(1)),
            testing::caller(9, &[]),
        );
        interaction.args.insert("user", ArgValue::User(UserId::new(2)));
        interaction.target_user = Some(UserId::new(7));

        assert_eq!(interaction.subject_user(), Some(UserId::new(7)));

        interaction.target_user = None;
        assert_eq!(interaction.subject_user(), Some(UserId::new(2)));
    }
}
