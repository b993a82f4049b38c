//! Recurring scheduled tasks
//!
//! One tokio interval loop per registered task; action failures are logged
//! and never stop the loop. The first tick after startup is skipped so a
//! restart does not immediately re-run every daily job.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use serenity::model::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::data::Verse;
use crate::platform::Platform;
use crate::resolver::Resolver;
use crate::store::MemberStore;
use crate::sync::snapshot_from_profile;
use crate::{
    CHANNEL_MESSAGE_LOGS, CHANNEL_STAFF_LOG, CHANNEL_VERSE, ERROR_TARGET, EVENT_TARGET, Error,
    ROLE_NEW_MEMBER,
};

/// Store constant controlling log retention, in days; unset or negative
/// disables the purge
pub const AUTO_DELETE_LOGS_KEY: &str = "AUTO_DELETE_LOGS_AFTER";

/// How often a task fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskInterval {
    EveryDay,
    EveryWeek,
    Every(Duration),
}

impl TaskInterval {
    #[must_use]
    pub fn period(self) -> Duration {
        match self {
            Self::EveryDay => Duration::from_secs(24 * 60 * 60),
            Self::EveryWeek => Duration::from_secs(7 * 24 * 60 * 60),
            Self::Every(duration) => duration,
        }
    }
}

/// Body of a scheduled task
#[async_trait]
pub trait ScheduledAction: Send + Sync {
    async fn run(&self) -> Result<(), Error>;
}

/// A registered recurring task
pub struct ScheduledTask {
    pub id: &'static str,
    pub description: String,
    pub interval: TaskInterval,
    pub action: Arc<dyn ScheduledAction>,
}

/// Spawns and owns the interval loops
#[derive(Default)]
pub struct TaskRunner {
    tasks: Vec<ScheduledTask>,
}

impl TaskRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: ScheduledTask) {
        self.tasks.push(task);
    }

    #[must_use]
    pub fn task_ids(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|task| task.id).collect()
    }

    /// Spawn one loop per task, returning their abort handles
    pub fn spawn(self) -> Vec<AbortHandle> {
        self.tasks
            .into_iter()
            .map(|task| {
                info!(
                    target: EVENT_TARGET,
                    task = task.id,
                    description = %task.description,
                    "Scheduled task registered"
                );
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(task.interval.period());
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    // The first tick completes immediately; skip it
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        info!(target: EVENT_TARGET, task = task.id, "Running scheduled task");
                        if let Err(err) = task.action.run().await {
                            error!(
                                target: ERROR_TARGET,
                                task = task.id,
                                error = %err,
                                "Scheduled task failed"
                            );
                        }
                    }
                })
                .abort_handle()
            })
            .collect()
    }
}

/// Daily member sync: prune the "New Member" role past the retention window
/// and mirror every member into the store.
pub struct MemberSyncTask {
    platform: Arc<dyn Platform>,
    store: Arc<dyn MemberStore>,
    resolver: Arc<Resolver>,
    guild: GuildId,
    retention_days: i64,
}

impl MemberSyncTask {
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn MemberStore>,
        resolver: Arc<Resolver>,
        guild: GuildId,
        retention_days: i64,
    ) -> Self {
        Self {
            platform,
            store,
            resolver,
            guild,
            retention_days,
        }
    }
}

#[async_trait]
impl ScheduledAction for MemberSyncTask {
    async fn run(&self) -> Result<(), Error> {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::days(self.retention_days);
        let new_member_role = self.resolver.role(Some(self.guild), ROLE_NEW_MEMBER);

        let members = self.platform.guild_members(self.guild).await?;
        let mut pruned = 0usize;
        for profile in &members {
            if let (Some(role), Some(joined)) = (new_member_role, profile.joined_at) {
                if profile.roles.contains(&role) && joined < cutoff {
                    match self
                        .platform
                        .remove_role(
                            self.guild,
                            profile.user_id,
                            role,
                            "New-member window expired",
                        )
                        .await
                    {
                        Ok(()) => pruned += 1,
                        Err(err) => {
                            error!(
                                target: ERROR_TARGET,
                                user_id = %profile.user_id,
                                error = %err,
                                "Failed to remove the New Member role"
                            );
                        }
                    }
                }
            }

            if let Err(err) = self
                .store
                .upsert_member(snapshot_from_profile(self.guild, profile, now))
                .await
            {
                error!(
                    target: ERROR_TARGET,
                    user_id = %profile.user_id,
                    error = %err,
                    "Failed to upsert member snapshot"
                );
            }
        }

        info!(
            target: EVENT_TARGET,
            guild_id = %self.guild,
            members = members.len(),
            pruned,
            "Member sync completed"
        );
        Ok(())
    }
}

/// Weekly log cleanup: purge expired message logs and execute due deferred
/// deletion requests.
pub struct LogCleanupTask {
    platform: Arc<dyn Platform>,
    store: Arc<dyn MemberStore>,
    resolver: Arc<Resolver>,
    guild: GuildId,
}

impl LogCleanupTask {
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn MemberStore>,
        resolver: Arc<Resolver>,
        guild: GuildId,
    ) -> Self {
        Self {
            platform,
            store,
            resolver,
            guild,
        }
    }

    async fn purge_expired_logs(&self, channel: ChannelId) -> Result<(), Error> {
        let retention_days: i64 = match self.store.get_constant(AUTO_DELETE_LOGS_KEY).await? {
            Some(value) => value.parse().unwrap_or(-1),
            None => -1,
        };
        if retention_days < 0 {
            return Ok(());
        }

        let now = Utc::now();
        let delete_before = now - ChronoDuration::days(retention_days);
        // Bulk deletion is limited to messages under two weeks old
        let bulk_limit = now - ChronoDuration::days(14);

        let mut last: Option<MessageId> = None;
        let mut total_deleted = 0usize;
        loop {
            let batch = self.platform.recent_messages(channel, last, 100).await?;
            if batch.is_empty() {
                break;
            }
            last = batch.last().map(|(id, _)| *id);

            let expired: Vec<_> = batch
                .into_iter()
                .filter(|(_, created)| *created < delete_before)
                .collect();
            if expired.is_empty() {
                continue;
            }

            let (bulk, single): (Vec<_>, Vec<_>) = expired
                .into_iter()
                .partition(|(_, created)| *created > bulk_limit);

            if !bulk.is_empty() {
                let ids: Vec<MessageId> = bulk.into_iter().map(|(id, _)| id).collect();
                total_deleted += ids.len();
                if let Err(err) = self.platform.delete_messages_bulk(channel, ids).await {
                    error!(
                        target: ERROR_TARGET,
                        channel_id = %channel,
                        error = %err,
                        "Bulk log deletion failed"
                    );
                }
            }
            for (id, _) in single {
                if self.platform.delete_message(channel, id).await.is_ok() {
                    total_deleted += 1;
                }
            }
        }

        info!(
            target: EVENT_TARGET,
            channel_id = %channel,
            total_deleted,
            retention_days,
            "Expired logs purged"
        );
        Ok(())
    }

    async fn process_deferred_deletions(&self) -> Result<(), Error> {
        let due = self.store.pending_deletions(Utc::now()).await?;
        for request in due {
            let channel = ChannelId::new(request.channel_id);
            let mut deleted = 0usize;
            for message_id in &request.message_ids {
                if self
                    .platform
                    .delete_message(channel, MessageId::new(*message_id))
                    .await
                    .is_ok()
                {
                    deleted += 1;
                }
            }
            self.store.mark_executed(&request.id).await?;

            let requester = UserId::new(request.requested_by);
            let notice = format!(
                "✅ Your log deletion request ({}) has been processed. \
                 {deleted} message(s) were removed.",
                request.id
            );
            let notified = self.platform.direct_message(requester, &notice).await.is_ok();

            if let Some(staff_log) = self
                .resolver
                .text_channel(Some(self.guild), CHANNEL_STAFF_LOG)
            {
                let summary = format!(
                    "Log deletion request `{}` by <@{requester}> processed: {deleted} message(s) removed.{}",
                    request.id,
                    if notified {
                        ""
                    } else {
                        " The requester could not be DM'd."
                    }
                );
                if let Err(err) = self.platform.send_message(staff_log, &summary).await {
                    error!(
                        target: ERROR_TARGET,
                        error = %err,
                        "Failed to post deletion summary"
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduledAction for LogCleanupTask {
    async fn run(&self) -> Result<(), Error> {
        let Some(channel) = self
            .resolver
            .text_channel(Some(self.guild), CHANNEL_MESSAGE_LOGS)
        else {
            warn!(
                target: ERROR_TARGET,
                guild_id = %self.guild,
                "message-logs channel not found; log cleanup skipped"
            );
            if let Some(staff_log) = self
                .resolver
                .text_channel(Some(self.guild), CHANNEL_STAFF_LOG)
            {
                let _ = self
                    .platform
                    .send_message(
                        staff_log,
                        "The `message-logs` channel does not exist. Log cleanup was skipped.",
                    )
                    .await;
            }
            return Ok(());
        };

        self.purge_expired_logs(channel).await?;
        self.process_deferred_deletions().await?;
        Ok(())
    }
}

/// Daily verse: posts a random entry from the configured rotation.
pub struct DailyVerseTask {
    platform: Arc<dyn Platform>,
    resolver: Arc<Resolver>,
    guild: GuildId,
    verses: Vec<Verse>,
}

impl DailyVerseTask {
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        resolver: Arc<Resolver>,
        guild: GuildId,
        verses: Vec<Verse>,
    ) -> Self {
        Self {
            platform,
            resolver,
            guild,
            verses,
        }
    }
}

#[async_trait]
impl ScheduledAction for DailyVerseTask {
    async fn run(&self) -> Result<(), Error> {
        if self.verses.is_empty() {
            return Ok(());
        }
        let Some(channel) = self.resolver.text_channel(Some(self.guild), CHANNEL_VERSE) else {
            warn!(
                target: ERROR_TARGET,
                guild_id = %self.guild,
                "Verse channel not found; daily verse skipped"
            );
            return Ok(());
        };

        let verse = {
            let mut rng = rand::rng();
            &self.verses[rng.random_range(0..self.verses.len())]
        };
        self.platform
            .send_message(
                channel,
                &format!(
                    "**Verse of the Day**\n**[{}]** {}",
                    verse.reference, verse.text
                ),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{PlatformCall, RecordingPlatform, profile};
    use crate::resolver::testing::MemoryDirectory;
    use crate::store::{DeferredDeletion, MemoryMemberStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GUILD: GuildId = GuildId::new(100);

    struct CountingAction {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledAction for CountingAction {
        async fn run(&self) -> Result<(), Error> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_interval_periods() {
        assert_eq!(
            TaskInterval::EveryDay.period(),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            TaskInterval::EveryWeek.period(),
            Duration::from_secs(604_800)
        );
        assert_eq!(
            TaskInterval::Every(Duration::from_secs(5)).period(),
            Duration::from_secs(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_fires_on_interval() {
        let action = Arc::new(CountingAction {
            runs: AtomicUsize::new(0),
        });
        let mut runner = TaskRunner::new();
        runner.register(ScheduledTask {
            id: "COUNTER",
            description: "counts".to_string(),
            interval: TaskInterval::Every(Duration::from_secs(10)),
            action: action.clone(),
        });
        assert_eq!(runner.task_ids(), vec!["COUNTER"]);

        let handles = runner.spawn();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        // Startup tick is skipped
        assert_eq!(action.runs.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(action.runs.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(20)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(action.runs.load(Ordering::SeqCst) >= 2);

        for handle in handles {
            handle.abort();
        }
    }

    fn resolver_with_staff_log() -> Arc<Resolver> {
        let directory = MemoryDirectory::new();
        directory.add_role(GUILD, RoleId::new(1), ROLE_NEW_MEMBER);
        directory.add_text_channel(GUILD, ChannelId::new(2), CHANNEL_STAFF_LOG);
        directory.add_text_channel(GUILD, ChannelId::new(3), CHANNEL_MESSAGE_LOGS);
        Arc::new(Resolver::new(Arc::new(directory), GUILD))
    }

    #[tokio::test]
    async fn test_member_sync_prunes_and_upserts() {
        let platform = Arc::new(RecordingPlatform::new());
        let store = Arc::new(MemoryMemberStore::new());

        // One stale new member, one fresh one
        let mut stale = profile(UserId::new(10), vec![RoleId::new(1)]);
        stale.joined_at = Some(Utc::now() - ChronoDuration::days(5));
        platform.insert_profile(GUILD, stale);
        let mut fresh = profile(UserId::new(11), vec![RoleId::new(1)]);
        fresh.joined_at = Some(Utc::now() - ChronoDuration::days(1));
        platform.insert_profile(GUILD, fresh);

        let task = MemberSyncTask::new(
            Arc::clone(&platform) as _,
            Arc::clone(&store) as _,
            resolver_with_staff_log(),
            GUILD,
            3,
        );
        task.run().await.unwrap();

        assert_eq!(
            platform.count(|c| matches!(
                c,
                PlatformCall::RemoveRole { user, .. } if *user == UserId::new(10)
            )),
            1
        );
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::RemoveRole { .. })),
            1
        );
        assert_eq!(store.member_count(), 2);
    }

    #[tokio::test]
    async fn test_log_cleanup_processes_deferred_deletions() {
        let platform = Arc::new(RecordingPlatform::new());
        let store = Arc::new(MemoryMemberStore::new());

        let request = DeferredDeletion::new(
            900,
            vec![1, 2, 3],
            42,
            Utc::now() - ChronoDuration::hours(1),
        );
        store.schedule_deletion(request).await.unwrap();

        let task = LogCleanupTask::new(
            Arc::clone(&platform) as _,
            Arc::clone(&store) as _,
            resolver_with_staff_log(),
            GUILD,
        );
        task.run().await.unwrap();

        assert_eq!(
            platform.count(|c| matches!(
                c,
                PlatformCall::DeleteMessage { channel, .. } if *channel == ChannelId::new(900)
            )),
            3
        );
        // Requester DM plus staff summary
        assert_eq!(
            platform.count(|c| matches!(c, PlatformCall::DirectMessage { .. })),
            1
        );
        assert_eq!(
            platform.count(|c| matches!(
                c,
                PlatformCall::SendMessage { channel, .. } if *channel == ChannelId::new(2)
            )),
            1
        );
        assert!(store.pending_deletions(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_daily_verse_posts_from_rotation() {
        let platform = Arc::new(RecordingPlatform::new());
        let directory = MemoryDirectory::new();
        directory.add_text_channel(GUILD, ChannelId::new(7), CHANNEL_VERSE);
        let resolver = Arc::new(Resolver::new(Arc::new(directory), GUILD));

        let task = DailyVerseTask::new(
            Arc::clone(&platform) as _,
            resolver,
            GUILD,
            vec![Verse {
                reference: "2:62".to_string(),
                text: "Surely, those who believe...".to_string(),
            }],
        );
        task.run().await.unwrap();

        assert_eq!(
            platform.count(|c| matches!(
                c,
                PlatformCall::SendMessage { channel, content }
                    if *channel == ChannelId::new(7) && content.contains("2:62")
            )),
            1
        );
    }

    #[tokio::test]
    async fn test_daily_verse_with_empty_rotation_is_noop() {
        let platform = Arc::new(RecordingPlatform::new());
        let task = DailyVerseTask::new(
            Arc::clone(&platform) as _,
            resolver_with_staff_log(),
            GUILD,
            Vec::new(),
        );
        task.run().await.unwrap();
        assert!(platform.calls().is_empty());
    }
}
