//! uzguard — Telegram group gatekeeper.
//!
//! Gates posting on channel subscriptions and referral counts, and enforces
//! violations with a short auto-reverting write restriction.

pub mod admin_cache;
pub mod api;
pub mod commands;
pub mod config;
pub mod gate;
pub mod handlers;
pub mod link_filter;
pub mod referral;
pub mod restriction;
pub mod store;
pub mod subscription;
