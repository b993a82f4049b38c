//! Moderation and self-service commands
//!
//! Thin glue over the resolver and platform: fetch the target, resolve the
//! roles and channels involved, act, notify staff, reply ephemerally.
//! Access-control and DM gating happen in the dispatcher before any of
//! these run.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};

use crate::data::Data;
use crate::platform::Platform;
use crate::resolver::Resolver;
use crate::store::{DeferredDeletion, MemberStore};
use crate::router::{
    AccessCategory, AccessPolicy, Caller, CommandExecutor, CommandNamespace, CommandRegistration,
    Dispatcher, InteractionEvent, Responder,
};
use crate::{
    CHANNEL_JAIL, CHANNEL_JAIL_VC, CHANNEL_STAFF_LOG, CHANNEL_VERIFY, ERROR_TARGET, Error,
    ROLE_JAIL, ROLE_SLOW, ROLE_UNVERIFIED, ROLE_VERIFIED,
};

/// Shared dependencies of every command executor
#[derive(Clone)]
pub struct CommandDeps {
    pub platform: Arc<dyn Platform>,
    pub resolver: Arc<Resolver>,
    pub responder: Arc<dyn Responder>,
    pub access: Arc<dyn AccessPolicy>,
}

impl CommandDeps {
    async fn reply(&self, interaction: &InteractionEvent, content: &str) {
        if let Err(err) = self.responder.reply_ephemeral(interaction, content).await {
            error!(
                target: ERROR_TARGET,
                command = %interaction.command_name,
                error = %err,
                "Failed to send command reply"
            );
        }
    }

    async fn staff_log(&self, interaction: &InteractionEvent, content: &str) {
        let Some(guild_id) = interaction.guild_id else {
            return;
        };
        let Some(staff_log) = self.resolver.text_channel(Some(guild_id), CHANNEL_STAFF_LOG) else {
            warn!(
                target: ERROR_TARGET,
                guild_id = %guild_id,
                "staff-log channel not found; audit notice dropped"
            );
            return;
        };
        if let Err(err) = self.platform.send_message(staff_log, content).await {
            error!(
                target: ERROR_TARGET,
                guild_id = %guild_id,
                error = %err,
                "Failed to post staff-log notice"
            );
        }
    }
}

fn guild_of(interaction: &InteractionEvent) -> Result<serenity::model::id::GuildId, Error> {
    interaction
        .guild_id
        .ok_or_else(|| "guild-only command invoked outside a guild".into())
}

fn reason_of(interaction: &InteractionEvent) -> String {
    interaction
        .args
        .text("reason")
        .unwrap_or("No reason provided")
        .to_string()
}

/// `/hush`: applies the Slow role so the cooldown engine picks the member up
pub struct HushCommand {
    deps: CommandDeps,
}

impl HushCommand {
    #[must_use]
    pub fn new(deps: CommandDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandExecutor for HushCommand {
    async fn execute(&self, interaction: &InteractionEvent) -> Result<(), Error> {
        let guild_id = guild_of(interaction)?;
        let Some(target) = interaction.subject_user() else {
            self.deps.reply(interaction, "`No target user provided`").await;
            return Ok(());
        };
        let Some(slow_role) = self.deps.resolver.role(Some(guild_id), ROLE_SLOW) else {
            self.deps.reply(interaction, "`Slow role not found`").await;
            return Ok(());
        };

        let reason = reason_of(interaction);
        if self
            .deps
            .platform
            .add_role(guild_id, target, slow_role, &reason)
            .await
            .is_err()
        {
            self.deps
                .reply(
                    interaction,
                    &format!("Failed to hush user \"<@{target}>\" (permission/role error)."),
                )
                .await;
            return Ok(());
        }

        self.deps
            .staff_log(
                interaction,
                &format!(
                    "<@{target}> was hushed by **{}**: {reason}",
                    interaction.caller.user_name
                ),
            )
            .await;
        self.deps
            .reply(interaction, &format!("✅ Hushed <@{target}>."))
            .await;
        Ok(())
    }
}

/// `/unhush`: removes the Slow role
pub struct UnhushCommand {
    deps: CommandDeps,
}

impl UnhushCommand {
    #[must_use]
    pub fn new(deps: CommandDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandExecutor for UnhushCommand {
    async fn execute(&self, interaction: &InteractionEvent) -> Result<(), Error> {
        let guild_id = guild_of(interaction)?;
        let Some(target) = interaction.subject_user() else {
            self.deps.reply(interaction, "`No target user provided`").await;
            return Ok(());
        };
        let Some(slow_role) = self.deps.resolver.role(Some(guild_id), ROLE_SLOW) else {
            self.deps.reply(interaction, "`Slow role not found`").await;
            return Ok(());
        };

        if self
            .deps
            .platform
            .remove_role(guild_id, target, slow_role, "Unhushed by moderator")
            .await
            .is_err()
        {
            self.deps
                .reply(
                    interaction,
                    &format!("Failed to unhush user \"<@{target}>\" (permission/role error)."),
                )
                .await;
            return Ok(());
        }

        self.deps
            .staff_log(
                interaction,
                &format!(
                    "<@{target}> was unhushed by **{}**",
                    interaction.caller.user_name
                ),
            )
            .await;
        self.deps
            .reply(interaction, &format!("✅ Unhushed <@{target}>."))
            .await;
        Ok(())
    }
}

/// `/jail`: moves a member into the jail role and channel
pub struct JailCommand {
    deps: CommandDeps,
}

impl JailCommand {
    #[must_use]
    pub fn new(deps: CommandDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandExecutor for JailCommand {
    async fn execute(&self, interaction: &InteractionEvent) -> Result<(), Error> {
        let guild_id = guild_of(interaction)?;
        let Some(target) = interaction.subject_user() else {
            self.deps.reply(interaction, "`No target user provided`").await;
            return Ok(());
        };

        let Some(jail_role) = self.deps.resolver.role(Some(guild_id), ROLE_JAIL) else {
            self.deps.reply(interaction, "`Jail role not found`").await;
            return Ok(());
        };
        let jail_channel = self.deps.resolver.text_channel(Some(guild_id), CHANNEL_JAIL);
        let staff_log = self
            .deps
            .resolver
            .text_channel(Some(guild_id), CHANNEL_STAFF_LOG);
        let (Some(jail_channel), Some(staff_log)) = (jail_channel, staff_log) else {
            self.deps
                .reply(
                    interaction,
                    "`At least one channel is missing: jail, staff-log`",
                )
                .await;
            return Ok(());
        };

        let Ok(profile) = self.deps.platform.member_profile(guild_id, target).await else {
            self.deps
                .reply(interaction, &format!("User \"<@{target}>\" not found"))
                .await;
            return Ok(());
        };

        // Members in verification are handled by /verify, not /jail
        if let Some(unverified) = self.deps.resolver.role(Some(guild_id), ROLE_UNVERIFIED) {
            if profile.roles.contains(&unverified) {
                self.deps
                    .reply(
                        interaction,
                        &format!(
                            "User \"<@{target}>\" is currently in verification. \
                             To move them out, use `/verify`."
                        ),
                    )
                    .await;
                return Ok(());
            }
        }

        // No friendly fire
        let target_caller = Caller::new(
            target,
            profile.user_name.clone(),
            self.deps.resolver.role_names(guild_id, &profile.roles),
        );
        if self
            .deps
            .access
            .authenticate(&target_caller, AccessCategory::ModAndAbove)
        {
            self.deps.reply(interaction, "No friendly fire!").await;
            return Ok(());
        }

        let reason = reason_of(interaction);
        if self
            .deps
            .platform
            .add_role(guild_id, target, jail_role, &reason)
            .await
            .is_err()
        {
            self.deps
                .reply(
                    interaction,
                    &format!("Failed to jail user \"<@{target}>\" (permission/role error)."),
                )
                .await;
            return Ok(());
        }

        if !reason.contains("!testing") {
            if let Err(err) = self
                .deps
                .platform
                .send_message(
                    jail_channel,
                    &format!(
                        "<@{target}> **You have been jailed.** Please wait for a moderator \
                         to review the incident.\nReason: {reason}"
                    ),
                )
                .await
            {
                error!(
                    target: ERROR_TARGET,
                    guild_id = %guild_id,
                    error = %err,
                    "Failed to post jail notice"
                );
            }
            if let Err(err) = self
                .deps
                .platform
                .send_message(
                    staff_log,
                    &format!(
                        "**{}** was jailed by **{}**: {reason}",
                        profile.user_name, interaction.caller.user_name
                    ),
                )
                .await
            {
                error!(
                    target: ERROR_TARGET,
                    guild_id = %guild_id,
                    error = %err,
                    "Failed to post staff-log notice"
                );
            }
        }

        // Pull the member out of voice if they are connected; failure just
        // means they were not in a voice channel
        if let Some(jail_vc) = self.deps.resolver.voice_channel(Some(guild_id), CHANNEL_JAIL_VC) {
            let _ = self
                .deps
                .platform
                .move_to_voice(guild_id, target, jail_vc)
                .await;
        }

        self.deps
            .reply(interaction, &format!("✅ Jailed <@{target}>."))
            .await;
        Ok(())
    }
}

/// `/unjail`: removes the jail role
pub struct UnjailCommand {
    deps: CommandDeps,
}

impl UnjailCommand {
    #[must_use]
    pub fn new(deps: CommandDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandExecutor for UnjailCommand {
    async fn execute(&self, interaction: &InteractionEvent) -> Result<(), Error> {
        let guild_id = guild_of(interaction)?;
        let Some(target) = interaction.subject_user() else {
            self.deps.reply(interaction, "`No target user provided`").await;
            return Ok(());
        };
        let Some(jail_role) = self.deps.resolver.role(Some(guild_id), ROLE_JAIL) else {
            self.deps.reply(interaction, "`Jail role not found`").await;
            return Ok(());
        };

        if self
            .deps
            .platform
            .remove_role(guild_id, target, jail_role, "Released from jail")
            .await
            .is_err()
        {
            self.deps
                .reply(
                    interaction,
                    &format!("Failed to unjail user \"<@{target}>\" (permission/role error)."),
                )
                .await;
            return Ok(());
        }

        self.deps
            .staff_log(
                interaction,
                &format!(
                    "<@{target}> was released from jail by **{}**",
                    interaction.caller.user_name
                ),
            )
            .await;
        self.deps
            .reply(interaction, &format!("✅ Unjailed <@{target}>."))
            .await;
        Ok(())
    }
}

/// `/verify`: moves a member out of verification
pub struct VerifyCommand {
    deps: CommandDeps,
}

impl VerifyCommand {
    #[must_use]
    pub fn new(deps: CommandDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl CommandExecutor for VerifyCommand {
    async fn execute(&self, interaction: &InteractionEvent) -> Result<(), Error> {
        let guild_id = guild_of(interaction)?;
        let Some(target) = interaction.subject_user() else {
            self.deps.reply(interaction, "`No target user provided`").await;
            return Ok(());
        };
        let Some(unverified_role) = self.deps.resolver.role(Some(guild_id), ROLE_UNVERIFIED)
        else {
            self.deps
                .reply(interaction, "`Unverified role not found`")
                .await;
            return Ok(());
        };

        let Ok(profile) = self.deps.platform.member_profile(guild_id, target).await else {
            self.deps
                .reply(interaction, &format!("User \"<@{target}>\" not found"))
                .await;
            return Ok(());
        };

        if !profile.roles.contains(&unverified_role) {
            self.deps
                .reply(
                    interaction,
                    &format!("User \"<@{target}>\" is already verified."),
                )
                .await;
            return Ok(());
        }

        if self
            .deps
            .platform
            .remove_role(guild_id, target, unverified_role, "Verified by moderator")
            .await
            .is_err()
        {
            self.deps
                .reply(
                    interaction,
                    &format!("Failed to verify user \"<@{target}>\" (permission/role error)."),
                )
                .await;
            return Ok(());
        }

        if let Some(verified_role) = self.deps.resolver.role(Some(guild_id), ROLE_VERIFIED) {
            if let Err(err) = self
                .deps
                .platform
                .add_role(guild_id, target, verified_role, "Verified by moderator")
                .await
            {
                error!(
                    target: ERROR_TARGET,
                    guild_id = %guild_id,
                    user_id = %target,
                    error = %err,
                    "Failed to grant the Verified role"
                );
            }
        }

        if let Some(verify_channel) = self.deps.resolver.text_channel(Some(guild_id), CHANNEL_VERIFY)
        {
            if let Err(err) = self
                .deps
                .platform
                .send_message(
                    verify_channel,
                    &format!("**{}** has been verified. Welcome in!", profile.user_name),
                )
                .await
            {
                error!(
                    target: ERROR_TARGET,
                    guild_id = %guild_id,
                    error = %err,
                    "Failed to post verify notice"
                );
            }
        }
        self.deps
            .staff_log(
                interaction,
                &format!(
                    "**{}** was verified by **{}**",
                    profile.user_name, interaction.caller.user_name
                ),
            )
            .await;

        self.deps
            .reply(interaction, &format!("✅ Verified <@{target}>."))
            .await;
        Ok(())
    }
}

/// `/roles`: self-service role selection validated against the configured
/// categories; no access control.
pub struct RolesCommand {
    deps: CommandDeps,
    data: Data,
}

impl RolesCommand {
    #[must_use]
    pub fn new(deps: CommandDeps, data: Data) -> Self {
        Self { deps, data }
    }
}

#[async_trait]
impl CommandExecutor for RolesCommand {
    async fn execute(&self, interaction: &InteractionEvent) -> Result<(), Error> {
        let guild_id = guild_of(interaction)?;
        let (Some(category_name), Some(choice)) = (
            interaction.args.text("category"),
            interaction.args.text("role"),
        ) else {
            self.deps
                .reply(interaction, "`Usage: /roles category role`")
                .await;
            return Ok(());
        };

        let Some(category) = self.data.role_category(category_name) else {
            self.deps
                .reply(
                    interaction,
                    &format!(
                        "Unknown category `{category_name}`. Available: {}",
                        self.data.category_names().join(", ")
                    ),
                )
                .await;
            return Ok(());
        };

        let Some(canonical) = category.canonical_role_name(choice) else {
            self.deps
                .reply(
                    interaction,
                    &format!(
                        "`{choice}` is not a {} role. Choose one of: {}",
                        category.category,
                        category.role_names.join(", ")
                    ),
                )
                .await;
            return Ok(());
        };

        let Some(role_id) = self.deps.resolver.role(Some(guild_id), canonical) else {
            self.deps
                .reply(
                    interaction,
                    &format!("`The {canonical} role is not set up on this server`"),
                )
                .await;
            return Ok(());
        };

        let caller_id = interaction.caller.user_id;
        let Ok(profile) = self.deps.platform.member_profile(guild_id, caller_id).await else {
            self.deps.reply(interaction, "`Internal Server Error`").await;
            return Ok(());
        };

        // Single-select categories drop the member's other roles first
        if !category.allow_multiple {
            for other_name in category
                .role_names
                .iter()
                .filter(|name| name.as_str() != canonical)
            {
                let Some(other_role) = self.deps.resolver.role(Some(guild_id), other_name) else {
                    continue;
                };
                if profile.roles.contains(&other_role) {
                    let _ = self
                        .deps
                        .platform
                        .remove_role(guild_id, caller_id, other_role, "Role menu reselection")
                        .await;
                }
            }
        }

        if self
            .deps
            .platform
            .add_role(guild_id, caller_id, role_id, "Role menu selection")
            .await
            .is_err()
        {
            self.deps
                .reply(interaction, "`Could not assign that role (permission error)`")
                .await;
            return Ok(());
        }

        self.deps
            .reply(
                interaction,
                &format!("✅ You now have the **{canonical}** role."),
            )
            .await;
        Ok(())
    }
}

/// Days before a requested log deletion is executed by the cleanup task
const LOG_DELETION_DELAY_DAYS: i64 = 7;

/// "Request Log Deletion" (message context): schedules the targeted log
/// message for deferred removal by the weekly cleanup task.
pub struct RequestLogDeletionCommand {
    deps: CommandDeps,
    store: Arc<dyn MemberStore>,
}

impl RequestLogDeletionCommand {
    #[must_use]
    pub fn new(deps: CommandDeps, store: Arc<dyn MemberStore>) -> Self {
        Self { deps, store }
    }
}

#[async_trait]
impl CommandExecutor for RequestLogDeletionCommand {
    async fn execute(&self, interaction: &InteractionEvent) -> Result<(), Error> {
        guild_of(interaction)?;
        let Some((channel_id, message_id)) = interaction.target_message else {
            self.deps
                .reply(interaction, "`No target message provided`")
                .await;
            return Ok(());
        };

        let request = DeferredDeletion::new(
            channel_id.get(),
            vec![message_id.get()],
            interaction.caller.user_id.get(),
            Utc::now() + chrono::Duration::days(LOG_DELETION_DELAY_DAYS),
        );
        let request_id = request.id.clone();
        self.store.schedule_deletion(request).await?;

        self.deps
            .staff_log(
                interaction,
                &format!(
                    "**{}** scheduled log message `{message_id}` for deletion (request `{request_id}`).",
                    interaction.caller.user_name
                ),
            )
            .await;
        self.deps
            .reply(
                interaction,
                &format!(
                    "✅ Scheduled for deletion in {LOG_DELETION_DELAY_DAYS} days \
                     (request `{request_id}`)."
                ),
            )
            .await;
        Ok(())
    }
}

/// Register every command with the dispatcher in its namespace
pub fn register_all(
    dispatcher: &Dispatcher,
    deps: &CommandDeps,
    data: &Data,
    store: &Arc<dyn MemberStore>,
) {
    dispatcher.register_command(
        CommandNamespace::Slash,
        CommandRegistration::new("hush", Arc::new(HushCommand::new(deps.clone())))
            .with_access(AccessCategory::ModAndAbove)
            .guild_only(),
    );
    dispatcher.register_command(
        CommandNamespace::Slash,
        CommandRegistration::new("unhush", Arc::new(UnhushCommand::new(deps.clone())))
            .with_access(AccessCategory::ModAndAbove)
            .guild_only(),
    );
    dispatcher.register_command(
        CommandNamespace::Slash,
        CommandRegistration::new("jail", Arc::new(JailCommand::new(deps.clone())))
            .with_access(AccessCategory::ModAndAbove)
            .guild_only(),
    );
    dispatcher.register_command(
        CommandNamespace::Slash,
        CommandRegistration::new("unjail", Arc::new(UnjailCommand::new(deps.clone())))
            .with_access(AccessCategory::ModAndAbove)
            .guild_only(),
    );
    dispatcher.register_command(
        CommandNamespace::Slash,
        CommandRegistration::new("verify", Arc::new(VerifyCommand::new(deps.clone())))
            .with_access(AccessCategory::ModAndAbove)
            .guild_only(),
    );
    dispatcher.register_command(
        CommandNamespace::Slash,
        CommandRegistration::new(
            "roles",
            Arc::new(RolesCommand::new(deps.clone(), data.clone())),
        )
        .guild_only(),
    );

    // Context-menu variants share the slash executors; the namespaces are
    // disjoint, so the repeated names never collide
    dispatcher.register_command(
        CommandNamespace::User,
        CommandRegistration::new("Jail User", Arc::new(JailCommand::new(deps.clone())))
            .with_access(AccessCategory::ModAndAbove)
            .guild_only(),
    );
    dispatcher.register_command(
        CommandNamespace::User,
        CommandRegistration::new("Unjail User", Arc::new(UnjailCommand::new(deps.clone())))
            .with_access(AccessCategory::ModAndAbove)
            .guild_only(),
    );
    dispatcher.register_command(
        CommandNamespace::Message,
        CommandRegistration::new(
            "Request Log Deletion",
            Arc::new(RequestLogDeletionCommand::new(
                deps.clone(),
                Arc::clone(store),
            )),
        )
        .with_access(AccessCategory::ModAndAbove)
        .guild_only(),
    );
}
