//! Shared test fixtures: an in-memory [`ChatApi`] double that records every
//! outbound platform call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use teloxide::types::{ChatId, MessageId, Recipient, UserId};
use uzguard::api::{CallError, ChatApi, ChatInfo, MembershipStatus, PermissionSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub chat: ChatId,
    pub user: UserId,
    pub permissions: PermissionSet,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MockApi {
    pub admins: DashMap<ChatId, Vec<UserId>>,
    pub statuses: DashMap<(ChatId, UserId), MembershipStatus>,
    pub permissions: DashMap<(ChatId, UserId), PermissionSet>,
    pub chats: DashMap<ChatId, ChatInfo>,
    pub sent: Mutex<Vec<(ChatId, MessageId, String)>>,
    pub deleted: Mutex<Vec<(ChatId, MessageId)>>,
    pub restrictions: Mutex<Vec<Restriction>>,
    pub admin_list_calls: AtomicUsize,
    pub fail_admin_list: AtomicBool,
    next_message_id: AtomicI32,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_admins(&self, chat: ChatId, admins: &[u64]) {
        self.admins
            .insert(chat, admins.iter().map(|id| UserId(*id)).collect());
    }

    pub fn set_status(&self, chat: ChatId, user: UserId, status: MembershipStatus) {
        self.statuses.insert((chat, user), status);
    }

    pub fn set_chat(&self, id: ChatId, title: Option<&str>, username: Option<&str>) {
        self.chats.insert(
            id,
            ChatInfo {
                id,
                title: title.map(String::from),
                username: username.map(String::from),
            },
        );
    }

    pub fn sent_texts(&self, chat: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| *c == chat)
            .map(|(_, _, text)| text.clone())
            .collect()
    }

    pub fn restrictions(&self) -> Vec<Restriction> {
        self.restrictions.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(ChatId, MessageId)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn list_administrators(&self, chat: ChatId) -> Result<Vec<UserId>, CallError> {
        self.admin_list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_admin_list.load(Ordering::SeqCst) {
            return Err(CallError::Transport("mock outage".into()));
        }
        Ok(self.admins.get(&chat).map(|v| v.clone()).unwrap_or_default())
    }

    async fn member_status(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<MembershipStatus, CallError> {
        Ok(self
            .statuses
            .get(&(chat, user))
            .map(|s| *s)
            .unwrap_or(MembershipStatus::Left))
    }

    async fn member_permissions(
        &self,
        chat: ChatId,
        user: UserId,
    ) -> Result<PermissionSet, CallError> {
        Ok(self
            .permissions
            .get(&(chat, user))
            .map(|p| *p)
            .unwrap_or_default())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result<(), CallError> {
        self.deleted.lock().unwrap().push((chat, message));
        Ok(())
    }

    async fn send_message(&self, chat: ChatId, text: String) -> Result<MessageId, CallError> {
        let id = MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1000);
        self.sent.lock().unwrap().push((chat, id, text));
        Ok(id)
    }

    async fn restrict_member(
        &self,
        chat: ChatId,
        user: UserId,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), CallError> {
        self.restrictions.lock().unwrap().push(Restriction {
            chat,
            user,
            permissions,
            until,
        });
        Ok(())
    }

    async fn chat_info(&self, chat: Recipient) -> Result<ChatInfo, CallError> {
        match chat {
            Recipient::Id(id) => Ok(self.chats.get(&id).map(|c| c.clone()).unwrap_or(ChatInfo {
                id,
                title: None,
                username: None,
            })),
            Recipient::ChannelUsername(handle) => {
                let wanted = handle.trim_start_matches('@');
                for entry in self.chats.iter() {
                    if entry.username.as_deref() == Some(wanted) {
                        return Ok(entry.clone());
                    }
                }
                Err(CallError::Transport("chat not found".into()))
            }
        }
    }
}
