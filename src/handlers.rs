//! Update routing.
//!
//! Every inbound group message flows through here: referral bookkeeping for
//! join events, then the link filter, then the gate, then commands. Each
//! message is an independent unit of work; nothing here blocks on the
//! restriction window.

use crate::admin_cache::AdminCache;
use crate::api::{best_effort, ChatApi};
use crate::commands::{parse_command, CommandHandler};
use crate::gate::GateEngine;
use crate::link_filter;
use crate::referral::ReferralTracker;
use crate::restriction::Restrictor;
use crate::store::Store;
use anyhow::Result;
use std::sync::Arc;
use teloxide::types::{Message, MessageOrigin};

pub struct App {
    pub api: Arc<dyn ChatApi>,
    pub store: Store,
    pub admins: Arc<AdminCache>,
    pub referrals: ReferralTracker,
    pub gate: GateEngine,
    pub restrictor: Restrictor,
    pub commands: CommandHandler,
    pub clean_service_messages: bool,
}

pub async fn handle_message(app: Arc<App>, msg: Message) -> Result<()> {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return Ok(());
    }
    let chat = msg.chat.id;

    // Join/leave service messages: ledger bookkeeping, then cleanup. This
    // runs before the privilege check so referrals by admins still count.
    if let Some(new_members) = msg.new_chat_members() {
        if let Some(adder) = msg.from.as_ref() {
            for member in new_members {
                if member.id != adder.id {
                    app.referrals
                        .record(chat.0, adder.id.0 as i64, member.id.0 as i64)
                        .await;
                }
            }
        }
        if app.clean_service_messages {
            best_effort("delete_message", app.api.delete_message(chat, msg.id).await).await;
        }
        return Ok(());
    }
    if msg.left_chat_member().is_some() {
        if app.clean_service_messages {
            best_effort("delete_message", app.api.delete_message(chat, msg.id).await).await;
        }
        return Ok(());
    }

    // Channel posts and anonymous senders carry a sender chat instead of a
    // user; they are exempt from both the link filter and the gate.
    if msg.sender_chat.is_some() {
        return Ok(());
    }
    let Some(user) = msg.from.as_ref().map(|u| u.id) else {
        return Ok(());
    };

    let command = msg.text().and_then(parse_command);

    if app.admins.is_privileged(chat, user).await {
        if let Some(cmd) = command {
            app.commands.handle(chat, user, &msg, cmd).await;
        }
        return Ok(());
    }

    // Posts forwarded from a channel are exempt from the link filter, like
    // the channel's own posts; the gate below still applies to the sender.
    let forwarded_channel_post = matches!(msg.forward_origin(), Some(MessageOrigin::Channel { .. }));
    if !forwarded_channel_post && link_filter::message_has_link(&msg) {
        link_filter::punish(app.api.as_ref(), chat, user, msg.id).await;
        return Ok(());
    }

    let verdict = app.gate.evaluate(chat, user).await;
    if !verdict.allowed {
        app.restrictor.enforce(chat, user, msg.id, &verdict).await;
        return Ok(());
    }

    if let Some(cmd) = command {
        if cmd.admin_only() {
            // Silently dropped, as for any other unauthorized action.
            return Ok(());
        }
        app.commands.handle(chat, user, &msg, cmd).await;
    }

    Ok(())
}
