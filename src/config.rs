use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub token: String,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModerationConfig {
    /// Seconds a gating-failed user loses write permissions for.
    pub restriction_secs: Option<u64>,
    /// Freshness window for the per-chat administrator cache, in seconds.
    pub admin_cache_secs: Option<u64>,
    /// Delete join/leave service messages after bookkeeping.
    pub clean_service_messages: Option<bool>,
}

pub fn load_config(path: &PathBuf) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: Config = serde_yaml::from_str(&text).context("parse yaml")?;
    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.bot.token.trim().is_empty() {
        return Err(anyhow!("bot.token is empty"));
    }
    if cfg.database.path.trim().is_empty() {
        return Err(anyhow!("database.path is empty"));
    }
    if let Some(secs) = cfg.moderation.restriction_secs {
        if secs < 1 || secs > 24 * 3600 {
            return Err(anyhow!(
                "moderation.restriction_secs={} out of range (1..=86400)",
                secs
            ));
        }
    }
    if let Some(secs) = cfg.moderation.admin_cache_secs {
        if secs == 0 {
            return Err(anyhow!("moderation.admin_cache_secs must be > 0"));
        }
    }
    Ok(())
}

pub fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        i += 1;
    }
    None
}
