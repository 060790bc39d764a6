use config::{Config, ConfigError, Environment, File, Source};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v2.6";

/// How the reply dispatcher gates commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum BotMode {
    /// Owner-gated: nothing but `_INIT` works until someone claims the bot.
    #[default]
    Privileged,
    /// Everyone gets replies, no owner and no init step.
    Open,
}

impl FromStr for BotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "privileged" => Ok(Self::Privileged),
            "open" => Ok(Self::Open),
            other => Err(format!("unknown bot mode '{}' (expected privileged|open)", other)),
        }
    }
}

impl TryFrom<String> for BotMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for BotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Privileged => f.write_str("privileged"),
            Self::Open => f.write_str("open"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Shared secret for the subscription handshake (`VERIFY_TOKEN`).
    pub verify_token: String,
    /// Send API credential (`PAGE_ACCESS_TOKEN`).
    pub page_access_token: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default)]
    pub mode: BotMode,
    /// Image URLs cycled through by gopher replies.
    #[serde(default = "default_images")]
    pub images: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_send_timeout_secs() -> u64 {
    10
}

pub fn default_images() -> Vec<String> {
    [
        "https://pics.me.me/i-could-spat-gopher-a-beer-funny-c3-15199885.png",
        "https://i.pinimg.com/originals/b5/ac/dd/b5acdd83bb12c464bf9d28e107a8fec6.jpg",
        "https://www.memerewards.com/images/2017/12/20/Its__GOPHER_TIME_1513822263b5b3e402ab1a9650.png",
        "https://pics.me.me/vampire-gopher-strikes-again-34149257.png",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    /// Load from `custom_path` (or `~/.gopherbot/config.json` when present),
    /// then `GOPHERBOT_*` variables, then `VERIFY_TOKEN` / `PAGE_ACCESS_TOKEN`.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let file = match custom_path {
            Some(path) => File::from(path).required(true),
            None => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                File::from(PathBuf::from(home).join(".gopherbot/config.json")).required(false)
            }
        };

        Self::layered(
            Some(file),
            std::env::var("VERIFY_TOKEN").ok(),
            std::env::var("PAGE_ACCESS_TOKEN").ok(),
        )
    }

    pub fn layered<S>(
        file: Option<S>,
        verify_token: Option<String>,
        page_access_token: Option<String>,
    ) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(file);
        }

        let config: AppConfig = builder
            // GOPHERBOT_BIND, GOPHERBOT_MODE, GOPHERBOT_SEND_TIMEOUT_SECS, ...
            .add_source(Environment::with_prefix("GOPHERBOT").try_parsing(true))
            .set_override_option("verify_token", verify_token)?
            .set_override_option("page_access_token", page_access_token)?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_token.is_empty() {
            return Err(ConfigError::Message("verify_token must not be empty".to_string()));
        }
        if self.page_access_token.is_empty() {
            return Err(ConfigError::Message(
                "page_access_token must not be empty".to_string(),
            ));
        }
        if self.send_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "send_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy safe to print: both secrets masked.
    pub fn redacted(&self) -> Self {
        Self {
            verify_token: mask_secret(&self.verify_token),
            page_access_token: mask_secret(&self.page_access_token),
            ..self.clone()
        }
    }
}

/// Mask a secret value for safe display in logs.
/// Shows first 4 and last 4 chars, the rest as `****`.
pub fn mask_secret(value: &str) -> String {
    if value.chars().count() <= 8 {
        "****".to_string()
    } else {
        let head: String = value.chars().take(4).collect();
        let tail: String = value
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{}****{}", head, tail)
    }
}
