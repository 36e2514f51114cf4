use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::{dispatching::UpdateHandler, dptree, prelude::*};
use tracing::info;

use uzguard::admin_cache::{AdminCache, DEFAULT_TTL};
use uzguard::api::TelegramApi;
use uzguard::commands::CommandHandler;
use uzguard::config::{load_config, parse_config_arg, validate_config};
use uzguard::gate::GateEngine;
use uzguard::handlers::{handle_message, App};
use uzguard::referral::ReferralTracker;
use uzguard::restriction::{Restrictor, DEFAULT_WINDOW};
use uzguard::store::Store;
use uzguard::subscription::SubscriptionVerifier;

fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry().branch(Update::filter_message().endpoint(
        |app: Arc<App>, msg: Message| async move {
            if let Err(e) = handle_message(app, msg).await {
                tracing::warn!("message handling failed: {e:?}");
            }
            Ok(())
        },
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = parse_config_arg(&args).unwrap_or_else(|| PathBuf::from("config.yaml"));

    let cfg = load_config(&config_path)?;
    validate_config(&cfg)?;

    let filter = cfg.bot.log_level.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Store::open(&cfg.database.path).await?;

    let bot = Bot::new(cfg.bot.token.clone());
    let api: Arc<dyn uzguard::api::ChatApi> = Arc::new(TelegramApi::new(bot.clone()));

    let cache_ttl = cfg
        .moderation
        .admin_cache_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TTL);
    let window = cfg
        .moderation
        .restriction_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_WINDOW);

    let admins = Arc::new(AdminCache::with_ttl(Arc::clone(&api), cache_ttl));
    let referrals = ReferralTracker::new(store.clone());
    let verifier = SubscriptionVerifier::new(Arc::clone(&api), store.clone(), Arc::clone(&admins));
    let gate = GateEngine::new(verifier, referrals.clone());
    let restrictor = Restrictor::with_window(Arc::clone(&api), window);
    let commands = CommandHandler::new(Arc::clone(&api), store.clone(), referrals.clone());

    let app = Arc::new(App {
        api,
        store,
        admins,
        referrals,
        gate,
        restrictor,
        commands,
        clean_service_messages: cfg.moderation.clean_service_messages.unwrap_or(true),
    });

    info!("starting dispatcher");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![app])
        .default_handler(|upd| async move {
            let _ = upd;
        })
        .error_handler(LoggingErrorHandler::with_custom_text("Dispatcher error"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
