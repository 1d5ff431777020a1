use std::{fs::read_to_string, io::ErrorKind, path::Path, time::Duration};

#[cfg(unix)]
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{info, warn};

use crate::channel_record::CHANNEL_NAME;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub channel: ChannelConfig,
    pub patch: PatchConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelConfig {
    pub name: String,
    /// Directory holding the named regions.
    #[cfg(unix)]
    pub dir: PathBuf,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: CHANNEL_NAME.to_owned(),
            #[cfg(unix)]
            dir: PathBuf::from("/dev/shm"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PatchConfig {
    pub tick_ms: u64,
    pub interval_ticks: u64,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1,
            interval_ticks: 2000,
        }
    }
}

impl PatchConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn interval_ticks(&self) -> u64 {
        self.interval_ticks.max(1)
    }
}

impl AgentConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// A missing file means defaults. A broken file is logged and also means defaults.
    pub fn load(path: &Path) -> Self {
        let text = match read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!("failed to read {}: {}", path.display(), err);
                }
                return Self::default();
            }
        };
        match Self::from_toml(&text) {
            Ok(config) => {
                info!("loaded {}", path.display());
                config
            }
            Err(err) => {
                warn!("ignoring {}: {}", path.display(), err);
                Self::default()
            }
        }
    }
}
