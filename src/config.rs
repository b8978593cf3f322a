use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub cli_path: String,
    pub elevate_path: String,
    pub poll_interval_secs: u64,
    pub admin_url: String,
    pub notify_command: String,
    pub console: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cli_path: "tailscale".into(),
            elevate_path: "pkexec".into(),
            poll_interval_secs: 10,
            admin_url: "https://login.tailscale.com/admin/machines".into(),
            notify_command: "notify-send".into(),
            console: true,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("tailtray.toml"))
                .merge(Json::file("tailtray.json"))
                .merge(Env::prefixed("TAILTRAY_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
