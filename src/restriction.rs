//! Restriction lifecycle.
//!
//! Per violating message: delete it, warn publicly, snapshot the sender's
//! current permissions, mute them, and schedule a deferred task that removes
//! the warning and re-applies the snapshot once the window elapses. The
//! handling path itself never sleeps.
//!
//! There is deliberately no per-user mutual exclusion: overlapping
//! violations run independent lifecycles, each with its own snapshot, and
//! the last restore to run wins. The platform-side expiry on the restriction
//! is the safety net if the process dies before the restore fires.

use crate::api::{best_effort, ChatApi, PermissionSet};
use crate::gate::{compose_warning, Verdict};
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{ChatId, MessageId, UserId};
use tracing::{debug, warn};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Restrictor {
    api: Arc<dyn ChatApi>,
    window: Duration,
}

impl Restrictor {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self::with_window(api, DEFAULT_WINDOW)
    }

    pub fn with_window(api: Arc<dyn ChatApi>, window: Duration) -> Self {
        Self { api, window }
    }

    /// Run the full lifecycle for one violating message.
    ///
    /// Returns as soon as the restriction is applied; the restore runs on a
    /// spawned task after the window.
    pub async fn enforce(
        &self,
        chat: ChatId,
        user: UserId,
        offending: MessageId,
        verdict: &Verdict,
    ) {
        best_effort(
            "delete_message",
            self.api.delete_message(chat, offending).await,
        )
        .await;

        let warning = best_effort(
            "send_message",
            self.api
                .send_message(chat, compose_warning(user, verdict))
                .await,
        )
        .await;

        // Snapshot before muting; the restore must reproduce these exact
        // bits, not a blanket allow-all.
        let snapshot = match self.api.member_permissions(chat, user).await {
            Ok(perms) => perms,
            Err(e) => {
                warn!(user = user.0, "permission snapshot failed, assuming defaults: {e}");
                PermissionSet::all()
            }
        };

        let until = chrono::Utc::now()
            + chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::seconds(10));
        best_effort(
            "restrict_chat_member",
            self.api
                .restrict_member(chat, user, PermissionSet::muted(), Some(until))
                .await,
        )
        .await;

        debug!(chat = chat.0, user = user.0, "restriction applied");

        let api = Arc::clone(&self.api);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            if let Some(warning) = warning {
                best_effort("delete_message", api.delete_message(chat, warning).await).await;
            }

            best_effort(
                "restrict_chat_member",
                api.restrict_member(chat, user, snapshot, None).await,
            )
            .await;

            debug!(chat = chat.0, user = user.0, "restriction restored");
        });
    }
}
