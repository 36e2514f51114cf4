//! Thin seam over the Telegram Bot API.
//!
//! Every platform call the moderation core makes goes through [`ChatApi`], so
//! the gating and restriction logic can be exercised against a mock in tests
//! and so error mapping lives in exactly one place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{
    prelude::*,
    requests::Request,
    types::{ChatMemberKind, ChatPermissions, MessageId, Recipient},
    ApiError as TgApiError, RequestError,
};
use thiserror::Error;
use tracing::warn;

/// A platform call failed in transit (network, timeout, serialization).
///
/// Access-level failures do not surface here: `member_status` folds them
/// into [`MembershipStatus`] instead.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("telegram transport error: {0}")]
    Transport(String),
}

/// Membership of a user in a chat, as far as the bot can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Member,
    Administrator,
    Creator,
    Left,
    Kicked,
    Restricted,
    /// The platform does not know the user at all.
    NotFound,
    /// The bot itself cannot query the chat (not a member, kicked, hidden).
    Unauthorized,
}

impl MembershipStatus {
    /// Statuses that satisfy a channel-subscription requirement.
    pub fn is_subscribed(self) -> bool {
        matches!(
            self,
            MembershipStatus::Member | MembershipStatus::Administrator | MembershipStatus::Creator
        )
    }
}

/// A user's permission bits in one chat.
///
/// Mirrors the platform's `ChatPermissions` but stays constructible without a
/// live bot, so restriction snapshots can be asserted on in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSet {
    pub can_send_messages: bool,
    pub can_send_media_messages: bool,
    pub can_send_polls: bool,
    pub can_send_other_messages: bool,
    pub can_add_web_page_previews: bool,
    pub can_change_info: bool,
    pub can_invite_users: bool,
    pub can_pin_messages: bool,
}

impl PermissionSet {
    /// Everything allowed. This is what an ordinary unrestricted member has.
    pub fn all() -> Self {
        Self {
            can_send_messages: true,
            can_send_media_messages: true,
            can_send_polls: true,
            can_send_other_messages: true,
            can_add_web_page_previews: true,
            can_change_info: true,
            can_invite_users: true,
            can_pin_messages: true,
        }
    }

    /// The gating penalty: no sending of any kind, invites still allowed.
    pub fn muted() -> Self {
        Self {
            can_send_messages: false,
            can_send_media_messages: false,
            can_send_polls: false,
            can_send_other_messages: false,
            can_add_web_page_previews: false,
            can_change_info: false,
            can_invite_users: true,
            can_pin_messages: false,
        }
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::all()
    }
}

impl From<PermissionSet> for ChatPermissions {
    fn from(p: PermissionSet) -> Self {
        let mut perms = ChatPermissions::empty();
        if p.can_send_messages {
            perms.insert(ChatPermissions::SEND_MESSAGES);
        }
        if p.can_send_media_messages {
            perms.insert(ChatPermissions::SEND_MEDIA_MESSAGES);
        }
        if p.can_send_polls {
            perms.insert(ChatPermissions::SEND_POLLS);
        }
        if p.can_send_other_messages {
            perms.insert(ChatPermissions::SEND_OTHER_MESSAGES);
        }
        if p.can_add_web_page_previews {
            perms.insert(ChatPermissions::ADD_WEB_PAGE_PREVIEWS);
        }
        if p.can_change_info {
            perms.insert(ChatPermissions::CHANGE_INFO);
        }
        if p.can_invite_users {
            perms.insert(ChatPermissions::INVITE_USERS);
        }
        if p.can_pin_messages {
            perms.insert(ChatPermissions::PIN_MESSAGES);
        }
        perms
    }
}

/// Identity of a chat as needed for display and handle resolution.
#[derive(Debug, Clone)]
pub struct ChatInfo {
    pub id: ChatId,
    pub title: Option<String>,
    pub username: Option<String>,
}

impl ChatInfo {
    /// Preferred human-readable name: `@handle`, else title, else raw id.
    pub fn display_name(&self) -> String {
        if let Some(u) = &self.username {
            format!("@{}", u)
        } else if let Some(t) = &self.title {
            t.clone()
        } else {
            self.id.0.to_string()
        }
    }
}

/// The platform collaborators the moderation core consumes.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_administrators(&self, chat: ChatId) -> Result<Vec<UserId>, CallError>;

    async fn member_status(&self, chat: ChatId, user: UserId)
        -> Result<MembershipStatus, CallError>;

    /// The user's current effective permission bits in `chat`.
    async fn member_permissions(&self, chat: ChatId, user: UserId)
        -> Result<PermissionSet, CallError>;

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), CallError>;

    async fn send_message(&self, chat: ChatId, text: String) -> Result<MessageId, CallError>;

    async fn restrict_member(
        &self,
        chat: ChatId,
        user: UserId,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), CallError>;

    async fn chat_info(&self, chat: Recipient) -> Result<ChatInfo, CallError>;
}

/// The permission bits a chat member currently holds.
///
/// The platform only reports explicit bits for restricted members; everyone
/// else (owner, administrator, ordinary member) effectively has them all.
pub fn member_permission_set(kind: &ChatMemberKind) -> PermissionSet {
    match kind {
        ChatMemberKind::Restricted(r) => PermissionSet {
            can_send_messages: r.can_send_messages,
            // Per-media-type bits collapse into "any media at all".
            can_send_media_messages: r.can_send_photos
                || r.can_send_videos
                || r.can_send_audios
                || r.can_send_documents,
            can_send_polls: r.can_send_polls,
            can_send_other_messages: r.can_send_other_messages,
            can_add_web_page_previews: r.can_add_web_page_previews,
            can_change_info: r.can_change_info,
            can_invite_users: r.can_invite_users,
            can_pin_messages: r.can_pin_messages,
        },
        _ => PermissionSet::all(),
    }
}

/// Log-and-ignore wrapper for best-effort calls (deletes, callouts, restores).
pub async fn best_effort<T>(ctx: &str, result: Result<T, CallError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("API call failed ({ctx}): {e}");
            None
        }
    }
}

/// Production [`ChatApi`] backed by a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramApi {
    bot: Bot,
}

impl TelegramApi {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn transport(e: RequestError) -> CallError {
    CallError::Transport(e.to_string())
}

#[async_trait]
impl ChatApi for TelegramApi {
    async fn list_administrators(&self, chat: ChatId) -> Result<Vec<UserId>, CallError> {
        let members = self
            .bot
            .get_chat_administrators(chat)
            .send()
            .await
            .map_err(transport)?;
        Ok(members.into_iter().map(|m| m.user.id).collect())
    }

    async fn member_status(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<MembershipStatus, CallError> {
        match self.bot.get_chat_member(chat, user).send().await {
            Ok(member) => Ok(match member.kind {
                ChatMemberKind::Owner(_) => MembershipStatus::Creator,
                ChatMemberKind::Administrator(_) => MembershipStatus::Administrator,
                ChatMemberKind::Member => MembershipStatus::Member,
                ChatMemberKind::Restricted(_) => MembershipStatus::Restricted,
                ChatMemberKind::Left => MembershipStatus::Left,
                ChatMemberKind::Banned(_) => MembershipStatus::Kicked,
            }),
            Err(RequestError::Api(TgApiError::UserNotFound)) => Ok(MembershipStatus::NotFound),
            // Any other API-level rejection means the bot cannot resolve the
            // chat or is not allowed to look inside it.
            Err(RequestError::Api(_)) => Ok(MembershipStatus::Unauthorized),
            Err(e) => Err(transport(e)),
        }
    }

    async fn member_permissions(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<PermissionSet, CallError> {
        let member = self
            .bot
            .get_chat_member(chat, user)
            .send()
            .await
            .map_err(transport)?;
        Ok(member_permission_set(&member.kind))
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), CallError> {
        self.bot
            .delete_message(chat, message)
            .send()
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn send_message(&self, chat: ChatId, text: String) -> Result<MessageId, CallError> {
        let msg = self
            .bot
            .send_message(chat, text)
            .send()
            .await
            .map_err(transport)?;
        Ok(msg.id)
    }

    async fn restrict_member(
        &self,
        chat: ChatId,
        user: UserId,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), CallError> {
        let req = self.bot.restrict_chat_member(chat, user, permissions.into());
        let result = match until {
            Some(expiry) => req.until_date(expiry).send().await,
            None => req.send().await,
        };
        result.map_err(transport)?;
        Ok(())
    }

    async fn chat_info(&self, chat: Recipient) -> Result<ChatInfo, CallError> {
        let chat = self.bot.get_chat(chat).send().await.map_err(transport)?;
        Ok(ChatInfo {
            id: chat.id,
            title: chat.title().map(String::from),
            username: chat.username().map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muted_set_keeps_invites_only() {
        let muted = PermissionSet::muted();
        assert!(!muted.can_send_messages);
        assert!(!muted.can_send_media_messages);
        assert!(!muted.can_send_polls);
        assert!(!muted.can_send_other_messages);
        assert!(muted.can_invite_users);
    }

    #[test]
    fn permission_set_round_trips_to_platform_flags() {
        let perms: ChatPermissions = PermissionSet::all().into();
        assert!(perms.contains(ChatPermissions::SEND_MESSAGES));
        assert!(perms.contains(ChatPermissions::INVITE_USERS));

        let perms: ChatPermissions = PermissionSet::muted().into();
        assert!(!perms.contains(ChatPermissions::SEND_MESSAGES));
        assert!(perms.contains(ChatPermissions::INVITE_USERS));
    }

    #[test]
    fn display_name_prefers_handle() {
        let info = ChatInfo {
            id: ChatId(-100),
            title: Some("News".into()),
            username: Some("newsroom".into()),
        };
        assert_eq!(info.display_name(), "@newsroom");

        let info = ChatInfo {
            id: ChatId(-100),
            title: Some("News".into()),
            username: None,
        };
        assert_eq!(info.display_name(), "News");
    }

    fn member_from_json(value: serde_json::Value) -> teloxide::types::ChatMember {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn restricted_member_snapshot_reads_explicit_bits() {
        let member = member_from_json(serde_json::json!({
            "user": {"id": 42, "is_bot": false, "first_name": "U"},
            "status": "restricted",
            "is_member": true,
            "until_date": 0,
            "can_send_messages": true,
            "can_send_audios": false,
            "can_send_documents": false,
            "can_send_photos": true,
            "can_send_videos": false,
            "can_send_video_notes": false,
            "can_send_voice_notes": false,
            "can_send_polls": false,
            "can_send_other_messages": false,
            "can_add_web_page_previews": false,
            "can_change_info": false,
            "can_invite_users": true,
            "can_pin_messages": false,
            "can_manage_topics": false,
        }));

        let snapshot = member_permission_set(&member.kind);
        assert!(snapshot.can_send_messages);
        // One allowed media type is enough for the collapsed media bit.
        assert!(snapshot.can_send_media_messages);
        assert!(!snapshot.can_send_polls);
        assert!(!snapshot.can_change_info);
        assert!(snapshot.can_invite_users);
        assert!(!snapshot.can_pin_messages);
    }

    #[test]
    fn unrestricted_member_snapshot_is_all_permissions() {
        let member = member_from_json(serde_json::json!({
            "user": {"id": 42, "is_bot": false, "first_name": "U"},
            "status": "member",
        }));
        assert_eq!(member_permission_set(&member.kind), PermissionSet::all());

        let admin = member_from_json(serde_json::json!({
            "user": {"id": 43, "is_bot": false, "first_name": "A"},
            "status": "administrator",
            "can_be_edited": false,
            "is_anonymous": false,
            "can_manage_chat": true,
            "can_change_info": true,
            "can_delete_messages": true,
            "can_invite_users": true,
            "can_restrict_members": true,
            "can_pin_messages": true,
            "can_manage_topics": false,
            "can_promote_members": false,
            "can_manage_video_chats": true,
            "can_post_stories": false,
            "can_edit_stories": false,
            "can_delete_stories": false,
        }));
        assert_eq!(member_permission_set(&admin.kind), PermissionSet::all());
    }

    #[test]
    fn subscribed_statuses() {
        assert!(MembershipStatus::Member.is_subscribed());
        assert!(MembershipStatus::Creator.is_subscribed());
        assert!(!MembershipStatus::Left.is_subscribed());
        assert!(!MembershipStatus::Kicked.is_subscribed());
        assert!(!MembershipStatus::NotFound.is_subscribed());
    }
}
