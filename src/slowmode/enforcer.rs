//! Applies the consequences of a slowmode rejection
//!
//! Everything here runs after the cooldown decision has already been made:
//! deleting the offending message, warning the member, installing the
//! channel lockout, and scheduling its timed restore. Failures of
//! best-effort steps are logged and swallowed.

use serenity::model::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::platform::Platform;
use crate::slowmode::channel::{OverwriteFactory, SupportsPermissionOverwrites};
use crate::slowmode::engine::{Enforcement, SlowmodeEngine};
use crate::{ERROR_TARGET, EVENT_TARGET};

/// How long a fallback in-channel warning stays up
pub const WARNING_TTL_SECS: u64 = 5;

/// The message a rejection applies to
#[derive(Debug, Clone, Copy)]
pub struct RejectedMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub remaining_secs: u64,
}

/// Side-effect applier for slowmode rejections
pub struct SlowmodeEnforcer {
    engine: Arc<SlowmodeEngine>,
    platform: Arc<dyn Platform>,
    overwrites: Arc<dyn OverwriteFactory>,
    warning_ttl: Duration,
}

impl SlowmodeEnforcer {
    #[must_use]
    pub fn new(
        engine: Arc<SlowmodeEngine>,
        platform: Arc<dyn Platform>,
        overwrites: Arc<dyn OverwriteFactory>,
    ) -> Self {
        Self {
            engine,
            platform,
            overwrites,
            warning_ttl: Duration::from_secs(WARNING_TTL_SECS),
        }
    }

    /// Apply a rejection: delete, warn, and for a freshly claimed lockout
    /// install the overwrite and schedule its restore.
    pub async fn enforce(&self, rejected: RejectedMessage, enforcement: Enforcement) {
        if let Err(err) = self
            .platform
            .delete_message(rejected.channel_id, rejected.message_id)
            .await
        {
            // The message may already be gone
            debug!(
                channel_id = %rejected.channel_id,
                message_id = %rejected.message_id,
                error = %err,
                "Could not delete rejected message"
            );
        }

        self.warn_member(rejected).await;

        if let Enforcement::Lockout { install: true } = enforcement {
            let channel = self.overwrites.for_channel(rejected.channel_id);
            match channel.deny_send(rejected.author_id).await {
                Ok(()) => {
                    info!(
                        target: EVENT_TARGET,
                        channel_id = %rejected.channel_id,
                        user_id = %rejected.author_id,
                        duration_secs = self.engine.threshold_secs(),
                        "Send lockout installed"
                    );
                    // The lockout lifts when the cooldown expires, i.e. the
                    // remaining interval, not a fresh full one. The handle is
                    // kept for a future early-unlock path; nothing aborts the
                    // timer today.
                    let _restore = self.schedule_restore(
                        channel,
                        rejected.author_id,
                        Duration::from_secs(rejected.remaining_secs),
                    );
                }
                Err(err) => {
                    error!(
                        target: ERROR_TARGET,
                        channel_id = %rejected.channel_id,
                        user_id = %rejected.author_id,
                        error = %err,
                        "Failed to install send lockout"
                    );
                    // Keep the lockout set honest: no overwrite, no membership
                    self.engine.release(rejected.author_id);
                }
            }
        }
    }

    /// Warn the member, preferring a DM and falling back to a short-lived
    /// message in the channel.
    async fn warn_member(&self, rejected: RejectedMessage) {
        let content = format!(
            "<@{}>, you must wait **{}s** before sending another message.",
            rejected.author_id, rejected.remaining_secs
        );

        if self
            .platform
            .direct_message(rejected.author_id, &content)
            .await
            .is_ok()
        {
            return;
        }

        match self
            .platform
            .send_message(rejected.channel_id, &content)
            .await
        {
            Ok(warning_id) => {
                let platform = Arc::clone(&self.platform);
                let channel_id = rejected.channel_id;
                let ttl = self.warning_ttl;
                tokio::spawn(async move {
                    tokio::time::sleep(ttl).await;
                    let _ = platform.delete_message(channel_id, warning_id).await;
                });
            }
            Err(err) => {
                warn!(
                    target: ERROR_TARGET,
                    channel_id = %rejected.channel_id,
                    user_id = %rejected.author_id,
                    error = %err,
                    "Could not deliver slowmode warning"
                );
            }
        }
    }

    /// Schedule the lockout restore. The timer is the sole authority for
    /// lifting the lockout; the handle allows a future early-unlock to
    /// abort it.
    pub fn schedule_restore(
        &self,
        channel: Arc<dyn SupportsPermissionOverwrites>,
        user: UserId,
        delay: Duration,
    ) -> AbortHandle {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = channel.restore_send(user).await {
                // Channel or overwrite may already be gone
                debug!(
                    channel_id = %channel.channel_id(),
                    user_id = %user,
                    error = %err,
                    "Lockout restore was a no-op"
                );
            }
            engine.release(user);
            info!(
                target: EVENT_TARGET,
                channel_id = %channel.channel_id(),
                user_id = %user,
                "Send lockout lifted"
            );
        })
        .abort_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{PlatformCall, RecordingPlatform};
    use crate::slowmode::channel::testing::RecordingOverwriteFactory;
    use crate::slowmode::engine::{Decision, Marker};
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    const CHANNEL: ChannelId = ChannelId::new(500);
    const USER: UserId = UserId::new(42);

    struct Fixture {
        engine: Arc<SlowmodeEngine>,
        platform: Arc<RecordingPlatform>,
        overwrites: Arc<RecordingOverwriteFactory>,
        enforcer: SlowmodeEnforcer,
    }

    fn fixture(threshold_secs: u64) -> Fixture {
        let engine = Arc::new(SlowmodeEngine::new(threshold_secs));
        let platform = Arc::new(RecordingPlatform::new());
        let overwrites = Arc::new(RecordingOverwriteFactory::new());
        let enforcer = SlowmodeEnforcer::new(
            Arc::clone(&engine),
            Arc::clone(&platform) as Arc<dyn Platform>,
            Arc::clone(&overwrites) as Arc<dyn OverwriteFactory>,
        );
        Fixture {
            engine,
            platform,
            overwrites,
            enforcer,
        }
    }

    fn rejected(remaining_secs: u64) -> RejectedMessage {
        RejectedMessage {
            channel_id: CHANNEL,
            message_id: MessageId::new(900),
            author_id: USER,
            remaining_secs,
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_delete_and_warn_prefers_dm() {
        let fx = fixture(10);

        fx.enforcer
            .enforce(rejected(5), Enforcement::DeleteAndWarn)
            .await;

        assert_eq!(
            fx.platform.count(|c| matches!(c, PlatformCall::DeleteMessage { .. })),
            1
        );
        let calls = fx.platform.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            PlatformCall::DirectMessage { user, content }
                if *user == USER && content.contains("**5s**")
        )));
        // No channel fallback and no lockout
        assert_eq!(
            fx.platform.count(|c| matches!(c, PlatformCall::SendMessage { .. })),
            0
        );
        assert_eq!(fx.overwrites.install_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_falls_back_to_expiring_channel_message() {
        let fx = fixture(10);
        fx.platform.fail_dm.store(true, Ordering::SeqCst);

        fx.enforcer
            .enforce(rejected(3), Enforcement::DeleteAndWarn)
            .await;

        assert_eq!(
            fx.platform.count(|c| matches!(
                c,
                PlatformCall::SendMessage { channel, .. } if *channel == CHANNEL
            )),
            1
        );
        // One delete so far: the rejected message itself
        assert_eq!(
            fx.platform.count(|c| matches!(c, PlatformCall::DeleteMessage { .. })),
            1
        );

        // Let the spawned cleanup task register its sleep before advancing
        settle().await;
        tokio::time::advance(Duration::from_secs(WARNING_TTL_SECS + 1)).await;
        settle().await;

        // The warning message was cleaned up after its TTL
        assert_eq!(
            fx.platform.count(|c| matches!(c, PlatformCall::DeleteMessage { .. })),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockout_installs_once_and_restores_on_schedule() {
        let fx = fixture(10);
        let t0 = Utc::now();

        assert_eq!(
            fx.engine.observe(USER, Some(Marker::Hush), t0),
            Decision::Allow
        );
        let decision = fx
            .engine
            .observe(USER, Some(Marker::Hush), t0 + chrono::Duration::seconds(2));
        let Decision::Reject {
            remaining_secs,
            enforcement,
        } = decision
        else {
            panic!("expected rejection");
        };
        assert_eq!(remaining_secs, 8);

        fx.enforcer.enforce(rejected(remaining_secs), enforcement).await;
        assert_eq!(fx.overwrites.install_count(), 1);
        assert!(fx.overwrites.is_denied(CHANNEL, USER));
        assert!(fx.engine.is_locked(USER));

        // A further rejection while locked does not reinstall
        let decision = fx
            .engine
            .observe(USER, Some(Marker::Hush), t0 + chrono::Duration::seconds(4));
        let Decision::Reject { enforcement, .. } = decision else {
            panic!("expected rejection");
        };
        fx.enforcer.enforce(rejected(6), enforcement).await;
        assert_eq!(fx.overwrites.install_count(), 1);

        // Let the spawned restore task register its sleep before advancing
        settle().await;
        // Still locked just before the cooldown expires
        tokio::time::advance(Duration::from_secs(7)).await;
        settle().await;
        assert!(fx.engine.is_locked(USER));

        // The restore timer fires once the original cooldown has elapsed:
        // installed at t=2 with 8s remaining, it lifts at t=10
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;

        assert!(!fx.overwrites.is_denied(CHANNEL, USER));
        assert!(!fx.engine.is_locked(USER));
        assert_eq!(fx.overwrites.restore_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_install_releases_lockout_membership() {
        let fx = fixture(10);
        fx.overwrites.fail_installs();

        let t0 = Utc::now();
        assert_eq!(
            fx.engine.observe(USER, Some(Marker::Hush), t0),
            Decision::Allow
        );
        let Decision::Reject { enforcement, .. } = fx
            .engine
            .observe(USER, Some(Marker::Hush), t0 + chrono::Duration::seconds(1))
        else {
            panic!("expected rejection");
        };

        fx.enforcer.enforce(rejected(9), enforcement).await;

        assert_eq!(fx.overwrites.install_count(), 0);
        assert!(!fx.engine.is_locked(USER));
    }
}
