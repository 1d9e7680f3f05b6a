use std::env;

use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub discord: DiscordConfig,
    pub scheduler: SchedulerConfig,
    pub roster: RosterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token used for REST calls. Without it every delivery is skipped.
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the reminder/recurrence worker runs at all.
    pub enabled: bool,
    /// How often (seconds) the worker polls for due reminders and schedules.
    pub poll_interval_seconds: u64,
    /// Zone used to read and print wall-clock times (`RAIDBOT_TIMEZONE`).
    pub timezone: Tz,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    pub promotion_policy: PromotionPolicy,
    /// Reminder offsets (seconds) applied when an event has none of its own.
    pub default_reminder_offsets: Vec<i64>,
}

/// What the promotion sweep does when the earliest waitlist entry targets a full role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPolicy {
    /// Stop at the blocked entry; nobody behind it is promoted.
    StrictFifo,
    /// Leave the blocked entry in place and keep walking.
    SkipBlocked,
}

pub const DEFAULT_REMINDER_OFFSETS: [i64; 3] = [3600, 900, 300];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let timezone = match env::var("RAIDBOT_TIMEZONE") {
            Ok(v) if !v.trim().is_empty() => v
                .trim()
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidValue("RAIDBOT_TIMEZONE".to_string()))?,
            _ => Tz::UTC,
        };

        let promotion_policy = match env::var("PROMOTION_POLICY") {
            Ok(v) => match v.to_lowercase().as_str() {
                "" | "strict_fifo" | "strict" => PromotionPolicy::StrictFifo,
                "skip_blocked" | "skip" => PromotionPolicy::SkipBlocked,
                _ => return Err(ConfigError::InvalidValue("PROMOTION_POLICY".to_string())),
            },
            Err(_) => PromotionPolicy::StrictFifo,
        };

        let default_reminder_offsets = match env::var("DEFAULT_REMINDER_OFFSETS") {
            Ok(v) => {
                let offsets = crate::services::parsing::parse_reminder_offsets(&v).map_err(|_| {
                    ConfigError::InvalidValue("DEFAULT_REMINDER_OFFSETS".to_string())
                })?;
                if offsets.is_empty() {
                    DEFAULT_REMINDER_OFFSETS.to_vec()
                } else {
                    offsets
                }
            }
            Err(_) => DEFAULT_REMINDER_OFFSETS.to_vec(),
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/raids.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            discord: DiscordConfig {
                bot_token: env::var("DISCORD_BOT_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty()),
            },
            scheduler: SchedulerConfig {
                enabled: match env::var("SCHEDULER_ENABLED") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "1" | "true" | "yes" => true,
                        "0" | "false" | "no" => false,
                        _ => true,
                    },
                    Err(_) => true,
                },
                poll_interval_seconds: env::var("SCHEDULER_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse::<u64>()
                    .unwrap_or(60)
                    .max(1),
                timezone,
            },
            roster: RosterConfig {
                promotion_policy,
                default_reminder_offsets,
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/raids.db".to_string(),
                max_connections: 5,
            },
            discord: DiscordConfig { bot_token: None },
            scheduler: SchedulerConfig {
                enabled: true,
                poll_interval_seconds: 60,
                timezone: Tz::UTC,
            },
            roster: RosterConfig {
                promotion_policy: PromotionPolicy::StrictFifo,
                default_reminder_offsets: DEFAULT_REMINDER_OFFSETS.to_vec(),
            },
        }
    }
}
