//! Gate decision engine.
//!
//! Composes the subscription verifier and the referral tracker into a single
//! verdict. Both sub-checks always run so a failing user can be told every
//! deficiency at once.

use crate::referral::ReferralTracker;
use crate::subscription::SubscriptionVerifier;
use teloxide::types::{ChatId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub unresolved_channels: Vec<String>,
    pub still_needed: Option<i64>,
}

pub struct GateEngine {
    verifier: SubscriptionVerifier,
    referrals: ReferralTracker,
}

impl GateEngine {
    pub fn new(verifier: SubscriptionVerifier, referrals: ReferralTracker) -> Self {
        Self {
            verifier,
            referrals,
        }
    }

    /// Verdict for a non-privileged user. Privileged users are filtered out
    /// by the caller against the administrator cache and never reach here.
    pub async fn evaluate(&self, group: ChatId, user: UserId) -> Verdict {
        let channels = self.verifier.check_all(group, user).await;
        let referral = self.referrals.check(group.0, user.0 as i64).await;

        Verdict {
            allowed: channels.satisfied() && referral.satisfied,
            unresolved_channels: channels.unresolved,
            still_needed: referral.still_needed,
        }
    }
}

/// The public warning sent alongside a restriction, enumerating everything
/// the user still has to do before posting.
pub fn compose_warning(user: UserId, verdict: &Verdict) -> String {
    let mut text = format!("User {}: before posting in this group you must:", user.0);
    if !verdict.unresolved_channels.is_empty() {
        text.push_str(&format!(
            "\n- join: {}",
            verdict.unresolved_channels.join(", ")
        ));
    }
    if let Some(n) = verdict.still_needed {
        text.push_str(&format!("\n- invite {n} more member(s)"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_lists_every_deficiency() {
        let verdict = Verdict {
            allowed: false,
            unresolved_channels: vec!["@news".into(), "@updates".into()],
            still_needed: Some(2),
        };
        let text = compose_warning(UserId(42), &verdict);
        assert!(text.contains("@news, @updates"));
        assert!(text.contains("invite 2 more"));
    }

    #[test]
    fn warning_omits_satisfied_requirements() {
        let verdict = Verdict {
            allowed: false,
            unresolved_channels: Vec::new(),
            still_needed: Some(1),
        };
        let text = compose_warning(UserId(42), &verdict);
        assert!(!text.contains("join:"));
        assert!(text.contains("invite 1 more"));
    }
}
