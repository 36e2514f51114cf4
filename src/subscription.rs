//! Channel-subscription verification.
//!
//! Decides whether a user is a member of every channel the group requires.
//! Lookups the bot cannot complete never block the user: an inaccessible
//! channel counts as satisfied, and the group's administrators are told
//! about the misconfiguration at most once per (group, channel).

use crate::admin_cache::{AdminCache, ANONYMOUS_ADMIN};
use crate::api::{best_effort, ChatApi, MembershipStatus};
use crate::store::Store;
use dashmap::DashSet;
use std::sync::Arc;
use teloxide::types::{ChatId, Recipient, UserId};
use tracing::warn;

/// Outcome of checking every required channel for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCheck {
    /// Display names of required channels the user has not joined.
    pub unresolved: Vec<String>,
}

impl ChannelCheck {
    pub fn satisfied(&self) -> bool {
        self.unresolved.is_empty()
    }
}

pub struct SubscriptionVerifier {
    api: Arc<dyn ChatApi>,
    store: Store,
    admins: Arc<AdminCache>,
    /// (group, channel) pairs whose admins were already told the bot cannot
    /// see the channel.
    notified: DashSet<(i64, i64)>,
}

impl SubscriptionVerifier {
    pub fn new(api: Arc<dyn ChatApi>, store: Store, admins: Arc<AdminCache>) -> Self {
        Self {
            api,
            store,
            admins,
            notified: DashSet::new(),
        }
    }

    /// Check every required channel of `group` for `user`.
    pub async fn check_all(&self, group: ChatId, user: UserId) -> ChannelCheck {
        let channels = match self.store.required_channels(group.0).await {
            Ok(list) => list,
            Err(e) => {
                // No readable configuration means nothing to require.
                warn!(group = group.0, "required channels read failed: {e}");
                Vec::new()
            }
        };

        let mut unresolved = Vec::new();
        for channel_id in channels {
            let channel = ChatId(channel_id);
            match self.api.member_status(channel, user).await {
                Ok(status) if status.is_subscribed() => {}
                // Ambiguous pre-membership state, not a refusal.
                Ok(MembershipStatus::NotFound) => {}
                Ok(MembershipStatus::Unauthorized) => {
                    self.notify_admins_once(group, channel).await;
                }
                Ok(_) => unresolved.push(self.display_name(channel).await),
                Err(e) => {
                    // Fail-open: an unreachable platform must not gate users.
                    warn!(channel = channel_id, "membership lookup failed: {e}");
                }
            }
        }

        ChannelCheck { unresolved }
    }

    async fn display_name(&self, channel: ChatId) -> String {
        match self.api.chat_info(Recipient::Id(channel)).await {
            Ok(info) => info.display_name(),
            Err(e) => {
                warn!(channel = channel.0, "chat info lookup failed: {e}");
                channel.0.to_string()
            }
        }
    }

    /// Tell the group's admins the bot cannot see a required channel.
    /// Best-effort, once per (group, channel), and never affects verdicts.
    async fn notify_admins_once(&self, group: ChatId, channel: ChatId) {
        if !self.notified.insert((group.0, channel.0)) {
            return;
        }

        let name = self.display_name(channel).await;
        let text = format!(
            "I cannot check subscriptions for the required channel {name}. \
             Please add me to the channel or remove it from the requirements."
        );

        for admin in self.admins.resolve(group).await {
            if admin == ANONYMOUS_ADMIN {
                continue;
            }
            best_effort(
                "send_message",
                self.api
                    .send_message(ChatId(admin.0 as i64), text.clone())
                    .await,
            )
            .await;
        }
    }
}
