//! The dispatcher
//!
//! Fan-out for generic events, name resolution plus gating for command
//! interactions, and a failure boundary around every invocation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::platform::PlatformResult;
use crate::router::access::{AccessCategory, AccessPolicy};
use crate::router::event::{CommandNamespace, EventKind, GatewayEvent, InteractionEvent};
use crate::{COMMAND_TARGET, ERROR_TARGET, EVENT_TARGET, Error};

/// Reply for commands invoked in DMs while guild-only
pub const DM_DISABLED_REPLY: &str =
    "`This command has been disabled in DMs. Please try in a server.`";
/// Reply for callers failing a command's access category
pub const UNAUTHORIZED_REPLY: &str = "`Unauthorized`";
/// Reply when an executor fails; a command interaction is never left
/// unanswered
pub const INTERNAL_ERROR_REPLY: &str = "`Internal Server Error`";

/// Handler for generic gateway events
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Stable name used in dispatch logs
    fn label(&self) -> &'static str;

    async fn handle(&self, event: &GatewayEvent) -> Result<(), Error>;
}

/// Execute function of a registered command
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, interaction: &InteractionEvent) -> Result<(), Error>;
}

/// Sink for the router's own interaction replies
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply_ephemeral(
        &self,
        interaction: &InteractionEvent,
        content: &str,
    ) -> PlatformResult<()>;
}

struct ListenerRegistration {
    kind: EventKind,
    once: bool,
    listener: Arc<dyn EventListener>,
}

/// A named command with its gates
#[derive(Clone)]
pub struct CommandRegistration {
    name: String,
    access_control: Option<AccessCategory>,
    disabled_in_dm: bool,
    executor: Arc<dyn CommandExecutor>,
}

impl CommandRegistration {
    #[must_use]
    pub fn new(name: impl Into<String>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            name: name.into(),
            access_control: None,
            disabled_in_dm: false,
            executor,
        }
    }

    /// Require an access category before execution
    #[must_use]
    pub fn with_access(mut self, category: AccessCategory) -> Self {
        self.access_control = Some(category);
        self
    }

    /// Reject invocations outside a guild context
    #[must_use]
    pub fn guild_only(mut self) -> Self {
        self.disabled_in_dm = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Central event and command dispatcher
pub struct Dispatcher {
    listeners: RwLock<Vec<ListenerRegistration>>,
    slash_commands: RwLock<HashMap<String, CommandRegistration>>,
    user_commands: RwLock<HashMap<String, CommandRegistration>>,
    message_commands: RwLock<HashMap<String, CommandRegistration>>,
    access: Arc<dyn AccessPolicy>,
    responder: Arc<dyn Responder>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(access: Arc<dyn AccessPolicy>, responder: Arc<dyn Responder>) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            slash_commands: RwLock::new(HashMap::new()),
            user_commands: RwLock::new(HashMap::new()),
            message_commands: RwLock::new(HashMap::new()),
            access,
            responder,
        }
    }

    /// Register a listener invoked on every matching event
    pub fn listen(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.add_listener(kind, false, listener);
    }

    /// Register a listener delivered at most once. Delivery consumes the
    /// registration even if the handler errors.
    pub fn listen_once(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.add_listener(kind, true, listener);
    }

    fn add_listener(&self, kind: EventKind, once: bool, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .expect("listener registry poisoned")
            .push(ListenerRegistration {
                kind,
                once,
                listener,
            });
    }

    /// Number of live registrations for an event kind
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .expect("listener registry poisoned")
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Register a command in one of the three disjoint namespaces. A later
    /// registration under the same name replaces the earlier one.
    pub fn register_command(&self, namespace: CommandNamespace, registration: CommandRegistration) {
        let map = self.command_map(namespace);
        let previous = map
            .write()
            .expect("command registry poisoned")
            .insert(registration.name().to_string(), registration);
        if let Some(previous) = previous {
            warn!(
                target: EVENT_TARGET,
                command = previous.name(),
                namespace = %namespace,
                "Replaced existing command registration"
            );
        }
    }

    fn command_map(
        &self,
        namespace: CommandNamespace,
    ) -> &RwLock<HashMap<String, CommandRegistration>> {
        match namespace {
            CommandNamespace::Slash => &self.slash_commands,
            CommandNamespace::User => &self.user_commands,
            CommandNamespace::Message => &self.message_commands,
        }
    }

    /// Dispatch one gateway event
    pub async fn dispatch(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::InteractionCreated(ref interaction) => {
                self.dispatch_interaction(interaction).await;
            }
            ref event => self.dispatch_event(event).await,
        }
    }

    async fn dispatch_event(&self, event: &GatewayEvent) {
        let kind = event.kind();

        // Snapshot matching listeners and consume once-registrations before
        // any handler runs, so delivery is counted exactly once.
        let selected: Vec<Arc<dyn EventListener>> = {
            let mut listeners = self.listeners.write().expect("listener registry poisoned");
            let selected = listeners
                .iter()
                .filter(|r| r.kind == kind)
                .map(|r| Arc::clone(&r.listener))
                .collect();
            listeners.retain(|r| !(r.kind == kind && r.once));
            selected
        };

        if selected.is_empty() {
            tracing::debug!(
                target: EVENT_TARGET,
                event = %kind,
                "No listeners registered for event"
            );
            return;
        }

        for listener in selected {
            let started = Instant::now();
            match listener.handle(event).await {
                Ok(()) => {
                    info!(
                        target: EVENT_TARGET,
                        event = %kind,
                        listener = listener.label(),
                        duration_ms = u64::try_from(started.elapsed().as_millis())
                            .unwrap_or_default(),
                        "Event listener completed"
                    );
                }
                Err(err) => {
                    // Isolation boundary: one listener's failure never
                    // reaches the others
                    error!(
                        target: ERROR_TARGET,
                        event = %kind,
                        listener = listener.label(),
                        error = %err,
                        "Event listener failed"
                    );
                }
            }
        }
    }

    async fn dispatch_interaction(&self, interaction: &InteractionEvent) {
        let registration = {
            let map = self
                .command_map(interaction.namespace)
                .read()
                .expect("command registry poisoned");
            map.get(&interaction.command_name).cloned()
        };

        let Some(registration) = registration else {
            warn!(
                target: EVENT_TARGET,
                namespace = %interaction.namespace,
                command = %interaction.command_name,
                "No matching command registration"
            );
            return;
        };

        if registration.disabled_in_dm && interaction.guild_id.is_none() {
            self.respond(interaction, DM_DISABLED_REPLY).await;
            return;
        }

        if let Some(category) = registration.access_control {
            if !self.access.authenticate(&interaction.caller, category) {
                info!(
                    target: COMMAND_TARGET,
                    command = %interaction.command_name,
                    user_id = %interaction.caller.user_id,
                    category = %category,
                    "Rejected unauthorized command invocation"
                );
                self.respond(interaction, UNAUTHORIZED_REPLY).await;
                return;
            }
        }

        let started = Instant::now();
        match registration.executor.execute(interaction).await {
            Ok(()) => {
                info!(
                    target: COMMAND_TARGET,
                    command = %interaction.command_name,
                    namespace = %interaction.namespace,
                    guild_id = interaction.guild_id.map_or_else(|| "DM".to_string(), |id| id.to_string()),
                    user_id = %interaction.caller.user_id,
                    duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or_default(),
                    "Command execution completed"
                );
            }
            Err(err) => {
                error!(
                    target: ERROR_TARGET,
                    command = %interaction.command_name,
                    namespace = %interaction.namespace,
                    user_id = %interaction.caller.user_id,
                    error = %err,
                    "Command execution failed"
                );
                self.respond(interaction, INTERNAL_ERROR_REPLY).await;
            }
        }
    }

    async fn respond(&self, interaction: &InteractionEvent, content: &str) {
        if let Err(err) = self.responder.reply_ephemeral(interaction, content).await {
            error!(
                target: ERROR_TARGET,
                command = %interaction.command_name,
                error = %err,
                "Failed to send interaction reply"
            );
        }
    }
}
