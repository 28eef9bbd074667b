use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use tracing::trace;

use crate::classifier::{Classifier, ThresholdRule, default_rules};
use crate::events::OwnerContact;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None {
        /// Device MAC → owner contact, used to route alerts
        #[serde(default)]
        owners: HashMap<String, OwnerContact>,
    },

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./easygrow.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub amqp: AmqpConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub contacts: ContactsConfig,

    /// Threshold table, the built-in table is used when absent
    pub thresholds: Option<Vec<ThresholdRule>>,
}

impl Config {
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.thresholds.clone().unwrap_or_else(default_rules))
    }

    pub fn queues(&self) -> Vec<String> {
        vec![
            self.amqp.sensor_queue.clone(),
            self.amqp.actuator_queue.clone(),
        ]
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.amqp.sensor_queue.trim().is_empty() || self.amqp.actuator_queue.trim().is_empty() {
            bail!("queue names must not be empty");
        }

        if self.amqp.sensor_queue == self.amqp.actuator_queue {
            bail!(
                "sensor and actuator queue are both `{}`",
                self.amqp.sensor_queue
            );
        }

        if self.alerts.provider_timeout_secs == 0 {
            bail!("alerts.provider_timeout_secs must be at least 1");
        }

        if let Some(rules) = &self.thresholds {
            for rule in rules {
                rule.validate()?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AmqpConfig {
    #[serde(default = "crate::util::get_amqp_url")]
    pub url: String,
    #[serde(default = "default_sensor_queue")]
    pub sensor_queue: String,
    #[serde(default = "default_actuator_queue")]
    pub actuator_queue: String,
    #[serde(default = "default_consumer_tag")]
    pub consumer_tag: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            url: crate::util::get_amqp_url(),
            sensor_queue: default_sensor_queue(),
            actuator_queue: default_actuator_queue(),
            consumer_tag: default_consumer_tag(),
        }
    }
}

fn default_sensor_queue() -> String {
    String::from("datos_sensores")
}

fn default_actuator_queue() -> String {
    String::from("eventos_bomba")
}

fn default_consumer_tag() -> String {
    String::from("easygrow-relay")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HttpConfig {
    #[serde(default = "crate::util::get_addr")]
    pub addr: IpAddr,
    #[serde(default = "crate::util::get_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: crate::util::get_addr(),
            port: crate::util::get_port(),
            enable_cors: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HubConfig {
    /// Per-viewer queue capacity before a slow viewer is dropped
    #[serde(default = "default_viewer_buffer")]
    pub viewer_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            viewer_buffer: default_viewer_buffer(),
        }
    }
}

fn default_viewer_buffer() -> usize {
    crate::hub::DEFAULT_VIEWER_BUFFER
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlertsConfig {
    /// Upper bound for a single provider attempt
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub actuator_notifications: ActuatorNotifyPolicy,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout(),
            channels: ChannelsConfig::default(),
            actuator_notifications: ActuatorNotifyPolicy::default(),
        }
    }
}

fn default_provider_timeout() -> u64 {
    30
}

/// Ordered provider lists, first entry is tried first
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub chat_bot: Vec<ProviderConfig>,
    #[serde(default)]
    pub email: Vec<ProviderConfig>,
    #[serde(default)]
    pub sms: Vec<ProviderConfig>,
    #[serde(default)]
    pub voice_message: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Telegram(Telegram),
    Discord(Discord),
    Smtp(Smtp),
    Vonage(Vonage),
    GreenApi(GreenApi),
    Webhook(Webhook),
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Telegram(_) => "telegram",
            ProviderConfig::Discord(_) => "discord",
            ProviderConfig::Smtp(_) => "smtp",
            ProviderConfig::Vonage(_) => "vonage",
            ProviderConfig::GreenApi(_) => "green_api",
            ProviderConfig::Webhook(_) => "webhook",
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Telegram {
    pub bot_token: String,
    /// Chat used for owners without an entry in `contacts.telegram_chats`
    pub default_chat_id: Option<String>,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String {
    String::from("https://api.telegram.org")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Smtp {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender address, defaults to `username`
    pub from: Option<String>,
}

fn default_smtp_host() -> String {
    String::from("smtp.gmail.com")
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Vonage {
    pub api_key: String,
    pub api_secret: String,
    pub from: String,
    #[serde(default = "default_vonage_api")]
    pub api_base: String,
}

fn default_vonage_api() -> String {
    String::from("https://rest.nexmo.com")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GreenApi {
    pub instance_id: String,
    pub token: String,
    #[serde(default = "default_green_api")]
    pub api_base: String,
}

fn default_green_api() -> String {
    String::from("https://api.green-api.com")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

/// Whether actuator events produce an informational chat-bot notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ActuatorNotifyPolicy {
    #[default]
    Always,
    Never,
    /// Only the first event per device and label within the window
    Window { window_secs: u64 },
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ContactsConfig {
    /// Phone number → Telegram chat id
    #[serde(default)]
    pub telegram_chats: HashMap<String, String>,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("could not read {path}"))?;
    parse_config(&file_content)
}

pub fn parse_config(raw: &str) -> anyhow::Result<Config> {
    let expanded = crate::util::expand_env(raw)?;
    let config: Config =
        serde_json::from_str(&expanded).context("invalid configuration file provided")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
