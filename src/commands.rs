//! In-group command surface.
//!
//! Management commands for administrators (channel list, referral threshold,
//! ledger resets) and statistics for everyone. Admin-only commands from
//! non-admins are silently dropped; replies are best-effort.

use crate::api::{best_effort, ChatApi, ChatInfo};
use crate::referral::ReferralTracker;
use crate::store::Store;
use std::sync::Arc;
use teloxide::types::{ChatId, Message, Recipient, UserId};
use tracing::warn;

const TOP_LIMIT: i64 = 20;

const HELP_TEXT: &str = "For everyone:\n\
/top\n\
/count\n\
/replycount\n\n\
For admins:\n\
/channels\n\
/addchannel @handle\n\
/delchannel @handle\n\
/setcount N\n\
/cleanuser (as reply)\n\
/cleangroup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Channels,
    AddChannel(String),
    DelChannel(String),
    SetCount(String),
    CleanUser,
    CleanGroup,
    Count,
    ReplyCount,
    Top,
}

impl Command {
    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            Command::Channels
                | Command::AddChannel(_)
                | Command::DelChannel(_)
                | Command::SetCount(_)
                | Command::CleanUser
                | Command::CleanGroup
        )
    }
}

/// Parse a group message into a command, tolerating the `@botname` suffix.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.trim().split_whitespace();
    let head = parts.next()?;
    if !head.starts_with('/') {
        return None;
    }
    let name = head.split('@').next().unwrap_or(head);
    let arg = parts.next().map(str::to_string);

    match name {
        "/help" | "/info" => Some(Command::Help),
        "/channels" => Some(Command::Channels),
        "/addchannel" => Some(Command::AddChannel(arg?)),
        "/delchannel" => Some(Command::DelChannel(arg?)),
        "/setcount" => Some(Command::SetCount(arg?)),
        "/cleanuser" => Some(Command::CleanUser),
        "/cleangroup" => Some(Command::CleanGroup),
        "/count" => Some(Command::Count),
        "/replycount" => Some(Command::ReplyCount),
        "/top" => Some(Command::Top),
        _ => None,
    }
}

pub struct CommandHandler {
    api: Arc<dyn ChatApi>,
    store: Store,
    referrals: ReferralTracker,
}

impl CommandHandler {
    pub fn new(api: Arc<dyn ChatApi>, store: Store, referrals: ReferralTracker) -> Self {
        Self {
            api,
            store,
            referrals,
        }
    }

    async fn reply(&self, chat: ChatId, text: String) {
        best_effort("send_message", self.api.send_message(chat, text).await).await;
    }

    async fn resolve_handle(&self, handle: &str) -> Option<ChatInfo> {
        let handle = handle.trim();
        if !handle.starts_with('@') {
            return None;
        }
        match self
            .api
            .chat_info(Recipient::ChannelUsername(handle.to_string()))
            .await
        {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(handle, "channel lookup failed: {e}");
                None
            }
        }
    }

    /// Execute `cmd` sent by `user` in `chat`. The caller has already done
    /// the privilege check for admin-only commands.
    pub async fn handle(&self, chat: ChatId, user: UserId, msg: &Message, cmd: Command) {
        match cmd {
            Command::Help => self.reply(chat, HELP_TEXT.to_string()).await,

            Command::Channels => {
                let channels = match self.store.required_channels(chat.0).await {
                    Ok(list) => list,
                    Err(e) => {
                        warn!(group = chat.0, "required channels read failed: {e}");
                        return;
                    }
                };
                if channels.is_empty() {
                    self.reply(chat, "No required channels configured.".into())
                        .await;
                    return;
                }
                let mut names = Vec::new();
                for id in channels {
                    match self.api.chat_info(Recipient::Id(ChatId(id))).await {
                        Ok(info) => names.push(info.display_name()),
                        Err(_) => names.push(id.to_string()),
                    }
                }
                self.reply(chat, format!("Required channels:\n{}", names.join("\n")))
                    .await;
            }

            Command::AddChannel(handle) => {
                let Some(info) = self.resolve_handle(&handle).await else {
                    self.reply(chat, "Channel not found. Usage: /addchannel @handle".into())
                        .await;
                    return;
                };
                if let Err(e) = self.store.add_required_channel(chat.0, info.id.0).await {
                    warn!(group = chat.0, "channel insert failed: {e}");
                    return;
                }
                self.reply(chat, format!("{} added to the requirements.", info.display_name()))
                    .await;
            }

            Command::DelChannel(handle) => {
                let Some(info) = self.resolve_handle(&handle).await else {
                    self.reply(chat, "Channel not found. Usage: /delchannel @handle".into())
                        .await;
                    return;
                };
                if let Err(e) = self.store.remove_required_channel(chat.0, info.id.0).await {
                    warn!(group = chat.0, "channel delete failed: {e}");
                    return;
                }
                self.reply(chat, format!("{} removed from the requirements.", info.display_name()))
                    .await;
            }

            Command::SetCount(arg) => {
                // Malformed administrative input is rejected here, before it
                // ever reaches the store.
                let Ok(count) = arg.parse::<i64>() else {
                    self.reply(chat, "Usage: /setcount N (0 disables)".into())
                        .await;
                    return;
                };
                if count < 0 {
                    self.reply(chat, "Usage: /setcount N (0 disables)".into())
                        .await;
                    return;
                }
                if let Err(e) = self.store.set_required_count(chat.0, count).await {
                    warn!(group = chat.0, "requirement upsert failed: {e}");
                    return;
                }
                let text = if count == 0 {
                    "Referral requirement disabled.".to_string()
                } else {
                    format!("Members must now invite {count} user(s) before posting.")
                };
                self.reply(chat, text).await;
            }

            Command::CleanUser => {
                let Some(target) = msg
                    .reply_to_message()
                    .and_then(|r| r.from.as_ref())
                    .map(|u| u.id)
                else {
                    self.reply(chat, "Send /cleanuser as a reply to the user.".into())
                        .await;
                    return;
                };
                self.referrals.reset_user(chat.0, target.0 as i64).await;
                self.reply(chat, format!("Referrals added by user {} were removed.", target.0))
                    .await;
            }

            Command::CleanGroup => {
                self.referrals.reset_group(chat.0).await;
                self.reply(chat, "All referral records for this group were removed.".into())
                    .await;
            }

            Command::Count => {
                let total = self
                    .store
                    .referral_count(chat.0, user.0 as i64)
                    .await
                    .unwrap_or(0);
                self.reply(chat, format!("You have added {total} user(s) to this group."))
                    .await;
            }

            Command::ReplyCount => {
                let Some(target) = msg
                    .reply_to_message()
                    .and_then(|r| r.from.as_ref())
                    .map(|u| u.id)
                else {
                    self.reply(chat, "Send /replycount as a reply to the user.".into())
                        .await;
                    return;
                };
                let total = self
                    .store
                    .referral_count(chat.0, target.0 as i64)
                    .await
                    .unwrap_or(0);
                self.reply(
                    chat,
                    format!("User {} has added {total} user(s) to this group.", target.0),
                )
                .await;
            }

            Command::Top => {
                let top = match self.store.top_adders(chat.0, TOP_LIMIT).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(group = chat.0, "top adders read failed: {e}");
                        return;
                    }
                };
                if top.is_empty() {
                    self.reply(chat, "Nobody has added any users yet.".into())
                        .await;
                    return;
                }
                let mut text = String::from("Top adders:\n");
                for (i, (adder, total)) in top.iter().enumerate() {
                    text.push_str(&format!("{}. {} — {}\n", i + 1, adder, total));
                }
                self.reply(chat, text).await;
            }
        }
    }
}
