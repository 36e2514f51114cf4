//! Referral requirement tracking.
//!
//! Wraps the store's ledger with the gating semantics: idempotent recording,
//! threshold evaluation, and the sticky satisfaction flag. Store failures
//! never propagate out of here; reads degrade to safe defaults and writes
//! are logged and abandoned.

use crate::store::Store;
use tracing::warn;

/// Outcome of a referral-requirement check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralCheck {
    pub satisfied: bool,
    /// How many more members the user must bring in. `None` when satisfied
    /// or when the group has no referral requirement.
    pub still_needed: Option<i64>,
}

impl ReferralCheck {
    fn satisfied() -> Self {
        Self {
            satisfied: true,
            still_needed: None,
        }
    }
}

#[derive(Clone)]
pub struct ReferralTracker {
    store: Store,
}

impl ReferralTracker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record that `adder` brought `member` into `group`.
    ///
    /// Duplicates are absorbed by the ledger's unique constraint. After the
    /// insert the adder's total is recomputed and, if it now meets the group
    /// threshold, their satisfaction flag is persisted.
    pub async fn record(&self, group: i64, adder: i64, member: i64) {
        if let Err(e) = self.store.record_referral(group, adder, member).await {
            warn!(group, adder, member, "referral insert failed: {e}");
            return;
        }

        let required = match self.store.required_count(group).await {
            Ok(Some(n)) => n,
            Ok(None) => return,
            Err(e) => {
                warn!(group, "requirement read failed: {e}");
                return;
            }
        };

        match self.store.referral_count(group, adder).await {
            Ok(count) if count >= required => {
                if let Err(e) = self.store.set_satisfied(group, adder, true).await {
                    warn!(group, adder, "status upsert failed: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(group, adder, "referral count failed: {e}"),
        }
    }

    /// Whether `user` meets the group's referral requirement.
    ///
    /// A persisted `satisfied` flag short-circuits recomputation and is never
    /// reverted here, even if ledger rows have since disappeared.
    pub async fn check(&self, group: i64, user: i64) -> ReferralCheck {
        let required = match self.store.required_count(group).await {
            Ok(Some(n)) => n,
            Ok(None) => return ReferralCheck::satisfied(),
            Err(e) => {
                // Unreadable configuration gates nobody.
                warn!(group, "requirement read failed: {e}");
                return ReferralCheck::satisfied();
            }
        };

        match self.store.is_satisfied(group, user).await {
            Ok(true) => return ReferralCheck::satisfied(),
            Ok(false) => {}
            Err(e) => warn!(group, user, "status read failed: {e}"),
        }

        let count = match self.store.referral_count(group, user).await {
            Ok(n) => n,
            Err(e) => {
                warn!(group, user, "referral count failed: {e}");
                0
            }
        };

        if count >= required {
            if let Err(e) = self.store.set_satisfied(group, user, true).await {
                warn!(group, user, "status upsert failed: {e}");
            }
            ReferralCheck::satisfied()
        } else {
            ReferralCheck {
                satisfied: false,
                still_needed: Some(required - count),
            }
        }
    }

    /// Administrative reset of one user's ledger and status.
    pub async fn reset_user(&self, group: i64, user: i64) {
        if let Err(e) = self.store.clear_user(group, user).await {
            warn!(group, user, "user reset failed: {e}");
        }
    }

    /// Administrative reset of the whole group.
    pub async fn reset_group(&self, group: i64) {
        if let Err(e) = self.store.clear_group(group).await {
            warn!(group, "group reset failed: {e}");
        }
    }
}
