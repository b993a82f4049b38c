use std::env;
use std::sync::Arc;

use serenity::all::{ClientBuilder, GatewayIntents, GuildId};
use serenity::http::Http;
use tracing::info;

use guild_warden::commands::{self, CommandDeps};
use guild_warden::data::Data;
use guild_warden::handlers::Handler;
use guild_warden::listeners::{
    MemberJoinListener, MemberLeaveListener, ReactionCleanupListener, RoleSyncListener,
    SlowmodeListener, VoiceLogListener,
};
use guild_warden::platform::{Platform, SerenityPlatform, SerenityResponder};
use guild_warden::resolver::{CacheDirectory, Resolver};
use guild_warden::router::{AccessPolicy, Dispatcher, EventKind, Responder, RoleAccessPolicy};
use guild_warden::slowmode::{HttpOverwriteFactory, SlowmodeEngine, SlowmodeEnforcer};
use guild_warden::store::{MemberStore, MemoryMemberStore};
use guild_warden::tasks::{
    DailyVerseTask, LogCleanupTask, MemberSyncTask, ScheduledTask, TaskInterval, TaskRunner,
};
use guild_warden::{Error, logging};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    // Load environment variables
    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN must be set");
    let default_guild = GuildId::new(
        env::var("WARDEN_GUILD_ID")
            .expect("WARDEN_GUILD_ID must be set")
            .parse()
            .expect("WARDEN_GUILD_ID must be a guild id"),
    );

    // Set up the bot's data and collaborators
    let data = Data::load().await;
    let store: Arc<dyn MemberStore> = Arc::new(MemoryMemberStore::new());

    // Configure the Serenity client
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::MESSAGE_CONTENT;
    let handler = Arc::new(Handler::new());
    let mut client = ClientBuilder::new_with_http(Http::new(&token), intents)
        .event_handler_arc(Arc::clone(&handler))
        .await
        .expect("Failed to create client");

    let http = Arc::clone(&client.http);
    let platform: Arc<dyn Platform> = Arc::new(SerenityPlatform::new(Arc::clone(&http)));
    let responder: Arc<dyn Responder> = Arc::new(SerenityResponder::new(Arc::clone(&http)));
    let access: Arc<dyn AccessPolicy> = Arc::new(RoleAccessPolicy::default());

    // Resolution runs against the client's gateway cache
    let resolver = Arc::new(Resolver::new(
        Arc::new(CacheDirectory::new(Arc::clone(&client.cache))),
        default_guild,
    ));

    // Slowmode: store constant first, then per-guild override, then default
    let mut engine = SlowmodeEngine::from_store(store.as_ref()).await;
    if let Some(interval) = data
        .get_guild_config(default_guild)
        .and_then(|config| config.slowmode_interval_secs)
    {
        engine = SlowmodeEngine::new(interval);
    }
    let engine = Arc::new(engine);
    let enforcer = Arc::new(SlowmodeEnforcer::new(
        Arc::clone(&engine),
        Arc::clone(&platform),
        Arc::new(HttpOverwriteFactory::new(Arc::clone(&client.http))),
    ));

    // Wire up the dispatcher
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&access), Arc::clone(&responder)));
    dispatcher.listen(
        EventKind::MessageCreated,
        Arc::new(SlowmodeListener::new(
            Arc::clone(&engine),
            enforcer,
            Arc::clone(&resolver),
        )),
    );
    dispatcher.listen(
        EventKind::ReactionAdded,
        Arc::new(ReactionCleanupListener::new(Arc::clone(&platform))),
    );
    dispatcher.listen(
        EventKind::VoiceStateChanged,
        Arc::new(VoiceLogListener::new(
            Arc::clone(&platform),
            Arc::clone(&resolver),
        )),
    );
    dispatcher.listen(
        EventKind::MemberJoined,
        Arc::new(MemberJoinListener::new(
            Arc::clone(&platform),
            Arc::clone(&store),
            Arc::clone(&resolver),
        )),
    );
    dispatcher.listen(
        EventKind::MemberLeft,
        Arc::new(MemberLeaveListener::new(
            Arc::clone(&platform),
            Arc::clone(&resolver),
        )),
    );
    dispatcher.listen(
        EventKind::RoleUpdated,
        Arc::new(RoleSyncListener::new(
            Arc::clone(&platform),
            Arc::clone(&store),
        )),
    );

    let deps = CommandDeps {
        platform: Arc::clone(&platform),
        resolver: Arc::clone(&resolver),
        responder,
        access,
    };
    commands::register_all(&dispatcher, &deps, &data, &store);
    handler.install(dispatcher);

    // Scheduled tasks
    let retention_days = data
        .get_guild_config(default_guild)
        .map(|config| config.new_member_retention_days)
        .unwrap_or(3);
    let mut runner = TaskRunner::new();
    runner.register(ScheduledTask {
        id: "MEMBER_SYNC",
        description: "Syncs member data and removes the New Member role after the retention window"
            .to_string(),
        interval: TaskInterval::EveryDay,
        action: Arc::new(MemberSyncTask::new(
            Arc::clone(&platform),
            Arc::clone(&store),
            Arc::clone(&resolver),
            default_guild,
            retention_days,
        )),
    });
    runner.register(ScheduledTask {
        id: "LOG_CLEANUP",
        description: "Purges expired message logs and executes due deletion requests".to_string(),
        interval: TaskInterval::EveryWeek,
        action: Arc::new(LogCleanupTask::new(
            Arc::clone(&platform),
            Arc::clone(&store),
            Arc::clone(&resolver),
            default_guild,
        )),
    });
    runner.register(ScheduledTask {
        id: "DAILY_VERSE",
        description: "Posts a random verse to the verse channel".to_string(),
        interval: TaskInterval::EveryDay,
        action: Arc::new(DailyVerseTask::new(
            Arc::clone(&platform),
            Arc::clone(&resolver),
            default_guild,
            data.verses.clone(),
        )),
    });
    logging::log_console(format!("Scheduled tasks: {}", runner.task_ids().join(", ")));
    let _task_handles = runner.spawn();

    info!("Starting bot...");
    // Start the bot
    if let Err(err) = client.start().await {
        eprintln!("Error starting the bot: {}", err);
    }

    Ok(())
}

fn main() {
    // Run the async main function
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async_main());

    // Handle any errors that occurred during execution
    if let Err(err) = result {
        eprintln!("Error: {}", err);
    }
}
