use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `None` runs the engine on the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub require_principal: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            require_principal: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RulesConfig {
    pub conflict_retries: u32,
    pub strict_squad: bool,
    pub regulation_minutes: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 3,
            strict_squad: false,
            regulation_minutes: 90,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub rules: RulesConfig,
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.database.url = Some(url);
            }
        }
        if let Some(max) = parsed::<u32>("DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = max;
        }
        if let Ok(bind) = env::var("MATCH_ENGINE_BIND") {
            config.server.bind_addr = bind;
        }
        if let Some(require) = parsed::<bool>("MATCH_ENGINE_REQUIRE_PRINCIPAL") {
            config.server.require_principal = require;
        }
        if let Some(retries) = parsed::<u32>("MATCH_ENGINE_CONFLICT_RETRIES") {
            config.rules.conflict_retries = retries;
        }
        if let Some(strict) = parsed::<bool>("MATCH_ENGINE_STRICT_SQUAD") {
            config.rules.strict_squad = strict;
        }
        if let Some(minutes) = parsed::<u32>("MATCH_ENGINE_REGULATION_MINUTES") {
            config.rules.regulation_minutes = minutes;
        }

        config
    }
}
