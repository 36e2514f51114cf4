//! Time-bounded cache of chat administrator sets.
//!
//! One entry per chat ever seen; entries are overwritten on refresh and never
//! evicted. Concurrent callers during a miss may each trigger a refresh,
//! which is fine because the overwrite is idempotent.

use crate::api::{ChatApi, best_effort};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::types::{ChatId, UserId};

/// Pseudo-identifier Telegram uses for admins posting anonymously
/// (@GroupAnonymousBot). Always treated as privileged.
pub const ANONYMOUS_ADMIN: UserId = UserId(1087968824);

/// Default freshness window for a cached administrator set.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

struct Entry {
    admins: HashSet<UserId>,
    fetched_at: Instant,
}

pub struct AdminCache {
    api: Arc<dyn ChatApi>,
    entries: DashMap<ChatId, Entry>,
    ttl: Duration,
}

impl AdminCache {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self::with_ttl(api, DEFAULT_TTL)
    }

    pub fn with_ttl(api: Arc<dyn ChatApi>, ttl: Duration) -> Self {
        Self {
            api,
            entries: DashMap::new(),
            ttl,
        }
    }

    /// The privileged user set for `chat`.
    ///
    /// Returns the cached set while it is fresh; otherwise refreshes from the
    /// platform and unions in [`ANONYMOUS_ADMIN`]. If the refresh fails, the
    /// stale set is kept and returned; with no prior set the result is empty.
    pub async fn resolve(&self, chat: ChatId) -> HashSet<UserId> {
        if let Some(entry) = self.entries.get(&chat) {
            if entry.fetched_at.elapsed() < self.ttl {
                return entry.admins.clone();
            }
        }

        match best_effort(
            "get_chat_administrators",
            self.api.list_administrators(chat).await,
        )
        .await
        {
            Some(ids) => {
                let mut admins: HashSet<UserId> = ids.into_iter().collect();
                admins.insert(ANONYMOUS_ADMIN);
                self.entries.insert(
                    chat,
                    Entry {
                        admins: admins.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                admins
            }
            // Keep serving the stale set; the next call retries the refresh.
            None => self
                .entries
                .get(&chat)
                .map(|e| e.admins.clone())
                .unwrap_or_default(),
        }
    }

    pub async fn is_privileged(&self, chat: ChatId, user: UserId) -> bool {
        self.resolve(chat).await.contains(&user)
    }
}
