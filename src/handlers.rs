//! Gateway glue
//!
//! Translates serenity events into the router's event model and forwards
//! them to the dispatcher. Application commands are registered with the
//! platform once the gateway reports ready.

use chrono::{DateTime, Utc};
use serenity::all::{
    Command as ApplicationCommand, CommandDataOptionValue, CommandInteraction, CommandOptionType,
    CommandType, Context, CreateCommand, CreateCommandOption, EventHandler, GuildId,
    GuildMemberUpdateEvent, Interaction, Member, Message, Reaction, Ready, Timestamp, User,
    VoiceState,
};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use crate::router::{
    ArgValue, Caller, CommandArgs, CommandNamespace, Dispatcher, GatewayEvent, InteractionEvent,
    MemberEvent, MessageEvent, ReactionEvent, RoleUpdateEvent, VoiceEvent,
};
use crate::{ERROR_TARGET, EVENT_TARGET};

pub struct Handler {
    dispatcher: OnceLock<Arc<Dispatcher>>,
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dispatcher: OnceLock::new(),
        }
    }

    /// Install the dispatcher. Called once during startup, before the
    /// gateway connection is opened.
    pub fn install(&self, dispatcher: Arc<Dispatcher>) {
        if self.dispatcher.set(dispatcher).is_err() {
            warn!(target: ERROR_TARGET, "Dispatcher was already installed");
        }
    }

    async fn forward(&self, event: GatewayEvent) {
        match self.dispatcher.get() {
            Some(dispatcher) => dispatcher.dispatch(event).await,
            None => warn!(
                target: ERROR_TARGET,
                "Dispatcher not installed; event dropped"
            ),
        }
    }
}

fn to_utc(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

fn interaction_event(ctx: &Context, command: &CommandInteraction) -> Option<InteractionEvent> {
    let namespace = match command.data.kind {
        CommandType::ChatInput => CommandNamespace::Slash,
        CommandType::User => CommandNamespace::User,
        CommandType::Message => CommandNamespace::Message,
        other => {
            info!(
                target: EVENT_TARGET,
                kind = ?other,
                "Unhandled interaction command kind"
            );
            return None;
        }
    };

    let role_names = match (command.guild_id, command.member.as_deref()) {
        (Some(guild_id), Some(member)) => ctx
            .cache
            .guild(guild_id)
            .map(|guild| {
                member
                    .roles
                    .iter()
                    .filter_map(|id| guild.roles.get(id).map(|role| role.name.clone()))
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let mut args = CommandArgs::new();
    for option in &command.data.options {
        let value = match &option.value {
            CommandDataOptionValue::User(id) => Some(ArgValue::User(*id)),
            CommandDataOptionValue::String(value) => Some(ArgValue::Text(value.clone())),
            CommandDataOptionValue::Integer(value) => Some(ArgValue::Integer(*value)),
            CommandDataOptionValue::Boolean(value) => Some(ArgValue::Boolean(*value)),
            _ => None,
        };
        if let Some(value) = value {
            args.insert(option.name.clone(), value);
        }
    }

    let target_user = match command.data.kind {
        CommandType::User => command.data.target_id.map(|target| target.to_user_id()),
        _ => None,
    };
    let target_message = match command.data.kind {
        CommandType::Message => command
            .data
            .target_id
            .map(|target| (command.channel_id, target.to_message_id())),
        _ => None,
    };

    Some(InteractionEvent {
        interaction_id: command.id,
        token: command.token.clone(),
        namespace,
        command_name: command.data.name.clone(),
        guild_id: command.guild_id,
        channel_id: Some(command.channel_id),
        caller: Caller::new(command.user.id, command.user.name.clone(), role_names),
        args,
        target_user,
        target_message,
        timestamp: Utc::now(),
    })
}

/// Application command definitions synced with the platform on ready
#[must_use]
pub fn command_definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("hush")
            .description("Applies slowdown to a user")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "User to slow")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "reason",
                    "Why is the user being hushed?",
                )
                .required(false),
            ),
        CreateCommand::new("unhush")
            .description("Removes slowdown from a user")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "User to release")
                    .required(true),
            ),
        CreateCommand::new("jail")
            .description("Jail a user")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "The user to jail")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "reason",
                    "The reason for the jail",
                )
                .required(true)
                .max_length(76),
            ),
        CreateCommand::new("unjail")
            .description("Release a user from jail")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "The user to release")
                    .required(true),
            ),
        CreateCommand::new("verify")
            .description("Verify a user")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "The user to verify")
                    .required(true),
            ),
        CreateCommand::new("roles")
            .description("Choose a self-assignable server role")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "category",
                    "The role category",
                )
                .required(true),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "role", "The role to take")
                    .required(true),
            ),
        CreateCommand::new("Jail User").kind(CommandType::User),
        CreateCommand::new("Unjail User").kind(CommandType::User),
        CreateCommand::new("Request Log Deletion").kind(CommandType::Message),
    ]
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");

        match ApplicationCommand::set_global_commands(&ctx.http, command_definitions()).await {
            Ok(commands) => {
                let names: Vec<&str> = commands.iter().map(|c| c.name.as_str()).collect();
                info!("Application commands synced: {}", names.join(", "));
            }
            Err(err) => {
                error!(
                    target: ERROR_TARGET,
                    error = %err,
                    "Failed to sync application commands"
                );
            }
        }
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn message(&self, _ctx: Context, message: Message) {
        let event = MessageEvent {
            guild_id: message.guild_id,
            channel_id: message.channel_id,
            message_id: message.id,
            author_id: message.author.id,
            author_is_bot: message.author.bot,
            author_roles: message
                .member
                .as_ref()
                .map(|member| member.roles.clone())
                .unwrap_or_default(),
            content: message.content.clone(),
            has_attachments: !message.attachments.is_empty(),
            timestamp: to_utc(message.timestamp),
        };
        self.forward(GatewayEvent::MessageCreated(event)).await;
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let Some(user_id) = reaction.user_id else {
            return;
        };
        // The reacted-to message (and its reply reference) are needed to
        // decide anything; fetch it up front
        let Ok(message) = reaction.message(&ctx.http).await else {
            warn!(
                target: ERROR_TARGET,
                channel_id = %reaction.channel_id,
                message_id = %reaction.message_id,
                "Could not fetch reacted-to message"
            );
            return;
        };

        let message_author_is_self = message.author.id == ctx.cache.current_user().id;
        let event = ReactionEvent {
            guild_id: reaction.guild_id,
            channel_id: reaction.channel_id,
            message_id: reaction.message_id,
            user_id,
            user_is_bot: reaction
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .unwrap_or(false),
            emoji: reaction.emoji.to_string(),
            message_author_is_self,
            replied_to_author_id: message
                .referenced_message
                .as_ref()
                .map(|replied| replied.author.id),
            timestamp: Utc::now(),
        };
        self.forward(GatewayEvent::ReactionAdded(event)).await;
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let old_channel = old.as_ref().and_then(|state| state.channel_id);
        let (joined, left) = match (old_channel, new.channel_id) {
            (None, Some(channel)) => (Some(channel), None),
            (Some(channel), None) => (None, Some(channel)),
            // Channel moves and mute/deafen updates are not logged
            _ => return,
        };

        let event = VoiceEvent {
            guild_id,
            user_id: new.user_id,
            display_name: new
                .member
                .as_ref()
                .map(|member| member.display_name().to_string())
                .unwrap_or_else(|| new.user_id.to_string()),
            joined,
            left,
            timestamp: Utc::now(),
        };
        self.forward(GatewayEvent::VoiceStateChanged(event)).await;
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let event = MemberEvent {
            guild_id: member.guild_id,
            user_id: member.user.id,
            user_name: member.user.name.clone(),
            display_name: member.display_name().to_string(),
            member_count: ctx.cache.guild(member.guild_id).map(|g| g.member_count),
            timestamp: Utc::now(),
        };
        self.forward(GatewayEvent::MemberJoined(event)).await;
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member: Option<Member>,
    ) {
        let event = MemberEvent {
            guild_id,
            user_id: user.id,
            user_name: user.name.clone(),
            display_name: user.name.clone(),
            member_count: ctx.cache.guild(guild_id).map(|g| g.member_count),
            timestamp: Utc::now(),
        };
        self.forward(GatewayEvent::MemberLeft(event)).await;
    }

    async fn guild_member_update(
        &self,
        _ctx: Context,
        _old: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        let update = RoleUpdateEvent {
            guild_id: event.guild_id,
            user_id: event.user.id,
            roles: event.roles.clone(),
            timestamp: Utc::now(),
        };
        self.forward(GatewayEvent::RoleUpdated(update)).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        let Some(event) = interaction_event(&ctx, &command) else {
            return;
        };
        self.forward(GatewayEvent::InteractionCreated(event)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // This test verifies at compile time that Handler implements EventHandler
    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[test]
    fn test_command_definitions_cover_all_registrations() {
        let definitions = command_definitions();
        assert_eq!(definitions.len(), 9);
    }

    #[test]
    fn test_install_is_idempotent() {
        use crate::platform::testing::RecordingResponder;
        use crate::router::RoleAccessPolicy;

        let handler = Handler::new();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(RoleAccessPolicy::default()),
            Arc::new(RecordingResponder::new()),
        ));
        handler.install(Arc::clone(&dispatcher));
        // A second install is ignored rather than panicking
        handler.install(dispatcher);
    }
}
