use crate::ids::{ChannelId, GuildId, RoleId};
use crate::ladder::{RoleLadder, RoleLadderEntry};
use json_comments::StripComments;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_LINK_DB: &str = "vrc_name_db.csv";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

fn default_link_db() -> PathBuf {
    PathBuf::from(DEFAULT_LINK_DB)
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

/// Bot settings as stored in `settings/<name>.json`. Key names follow the
/// existing settings files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardSettings {
    #[serde(default)]
    pub bot_prefix: String,
    #[serde(rename = "Server_ID")]
    pub server_id: GuildId,
    #[serde(rename = "MPS_role")]
    pub mps_role: RoleId,
    #[serde(default)]
    pub role_ladder: Vec<RoleLadderEntry>,
    pub admin_bot_channel: ChannelId,
    pub general_bot_channel: ChannelId,
    #[serde(default)]
    pub bot_debug_channel: Option<ChannelId>,
    #[serde(default = "default_link_db")]
    pub link_db_path: PathBuf,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl GuardSettings {
    /// Parses settings JSON. `//`, `/* */` and `#` comments are allowed, as
    /// in the hand-edited settings files.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(StripComments::new(raw.as_bytes()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        debug!(path = %path.display(), rungs = settings.role_ladder.len(), "loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sweep_interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "sweep_interval_secs must be greater than zero".into(),
            ));
        }
        let dupes = self.ladder().duplicate_roles();
        if !dupes.is_empty() {
            return Err(SettingsError::Invalid(format!(
                "role_ladder repeats role ids {dupes:?}"
            )));
        }
        Ok(())
    }

    pub fn ladder(&self) -> RoleLadder {
        RoleLadder::new(self.role_ladder.clone(), self.mps_role)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Settings file name used when none is given explicitly: the hosted
/// deployment runs on Linux, everything else is a test bot.
pub fn default_settings_path() -> PathBuf {
    let name = if cfg!(target_os = "linux") {
        "remote_settings"
    } else {
        "test_settings"
    };
    Path::new("settings").join(format!("{name}.json"))
}
