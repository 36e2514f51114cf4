//! Restriction lifecycle: suppression, muting, and snapshot-exact restore.

mod common;

use common::MockApi;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{ChatId, MessageId, UserId};
use uzguard::api::PermissionSet;
use uzguard::gate::Verdict;
use uzguard::restriction::Restrictor;

const GROUP: ChatId = ChatId(-1001);
const USER: UserId = UserId(42);
const OFFENDING: MessageId = MessageId(7);

fn failing_verdict() -> Verdict {
    Verdict {
        allowed: false,
        unresolved_channels: vec!["@updates".into()],
        still_needed: Some(2),
    }
}

async fn settle(window: Duration) {
    // Under a paused clock this advances past the window and lets the
    // spawned restore task run to completion.
    tokio::time::sleep(window + Duration::from_millis(50)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn lifecycle_mutes_then_restores_exact_snapshot() {
    let api = Arc::new(MockApi::new());
    let window = Duration::from_secs(10);
    let restrictor = Restrictor::with_window(api.clone(), window);

    let snapshot = PermissionSet {
        can_send_messages: true,
        can_send_media_messages: true,
        can_send_polls: true,
        can_send_other_messages: true,
        can_add_web_page_previews: true,
        can_change_info: false,
        can_invite_users: false,
        can_pin_messages: true,
    };
    api.permissions.insert((GROUP, USER), snapshot);

    restrictor.enforce(GROUP, USER, OFFENDING, &failing_verdict()).await;

    // Offending message suppressed, warning posted, user muted with expiry.
    assert!(api.deleted().contains(&(GROUP, OFFENDING)));
    let warnings = api.sent_texts(GROUP);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("@updates"));
    assert!(warnings[0].contains("invite 2 more"));

    let restrictions = api.restrictions();
    assert_eq!(restrictions.len(), 1);
    assert_eq!(restrictions[0].permissions, PermissionSet::muted());
    assert!(restrictions[0].until.is_some());

    settle(window).await;

    // Warning removed and the exact prior bits re-applied, not allow-all.
    let restrictions = api.restrictions();
    assert_eq!(restrictions.len(), 2);
    assert_eq!(restrictions[1].permissions, snapshot);
    assert_eq!(restrictions[1].until, None);

    let deleted = api.deleted();
    assert_eq!(deleted.len(), 2, "warning message must be deleted too");
    assert_ne!(deleted[1].1, OFFENDING);
}

#[tokio::test(start_paused = true)]
async fn restore_defaults_to_full_permissions_when_snapshot_unavailable() {
    let api = Arc::new(MockApi::new());
    let window = Duration::from_secs(10);
    let restrictor = Restrictor::with_window(api.clone(), window);

    // No permissions configured in the mock: snapshot falls back to all-true.
    restrictor.enforce(GROUP, USER, OFFENDING, &failing_verdict()).await;
    settle(window).await;

    let restrictions = api.restrictions();
    assert_eq!(restrictions.len(), 2);
    assert_eq!(restrictions[1].permissions, PermissionSet::all());
}

#[tokio::test(start_paused = true)]
async fn overlapping_violations_run_independent_lifecycles() {
    let api = Arc::new(MockApi::new());
    let window = Duration::from_secs(10);
    let restrictor = Restrictor::with_window(api.clone(), window);

    restrictor.enforce(GROUP, USER, MessageId(7), &failing_verdict()).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    restrictor.enforce(GROUP, USER, MessageId(8), &failing_verdict()).await;

    settle(window).await;

    // Two mutes and two restores; the later restore is the last word.
    let restrictions = api.restrictions();
    assert_eq!(restrictions.len(), 4);
    assert_eq!(restrictions[0].permissions, PermissionSet::muted());
    assert_eq!(restrictions[1].permissions, PermissionSet::muted());
    assert_eq!(restrictions[2].until, None);
    assert_eq!(restrictions[3].until, None);
}
