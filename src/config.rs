//! Configuration shared with the settings UI.
//!
//! The agent only ever reads this store. Writes come from `page-bridge config
//! set`, which plays the part of the extension's options popup.

use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::types::OperatorInfo;

pub const DEFAULT_BACKEND_URL: &str = "https://recruiter-bridge.preview.emergentagent.com/api";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default = "default_backend_url")]
    pub backend_api_url: String,
    #[serde(default)]
    pub recruiter_info: Option<OperatorInfo>,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend_api_url: default_backend_url(),
            recruiter_info: None,
        }
    }
}

/// Fields to overwrite; `None` leaves the stored value alone. The operator
/// record is merged field by field, and `Some(None)` clears its id.
#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    pub backend_api_url: Option<String>,
    pub recruiter_id: Option<Option<String>>,
    pub recruiter_name: Option<String>,
}

pub trait ConfigStore: Send + Sync {
    fn get(&self) -> Result<BridgeConfig>;

    fn set(&self, patch: ConfigPatch) -> Result<()>;
}

pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/page-bridge/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| BridgeError::Config("no config directory on this platform".into()))?;
        Ok(base.join("page-bridge").join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self) -> Result<BridgeConfig> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no config file, using defaults");
            return Ok(BridgeConfig::default());
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    fn set(&self, patch: ConfigPatch) -> Result<()> {
        let mut config = self.get()?;
        if let Some(url) = patch.backend_api_url {
            config.backend_api_url = url.trim().to_string();
        }
        if patch.recruiter_id.is_some() || patch.recruiter_name.is_some() {
            let mut op = config.recruiter_info.take().unwrap_or(OperatorInfo {
                operator_id: None,
                operator_name: String::new(),
            });
            if let Some(id) = patch.recruiter_id {
                op.operator_id = id
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty());
            }
            if let Some(name) = patch.recruiter_name {
                op.operator_name = name.trim().to_string();
            }
            config.recruiter_info = Some(op);
        }
        validate(&config)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        serde_json::to_writer_pretty(file, &config)?;
        debug!(path = %self.path.display(), "saved config");
        Ok(())
    }
}

fn validate(config: &BridgeConfig) -> Result<()> {
    if config.backend_api_url.is_empty() {
        return Err(BridgeError::Config("Backend API URL is required".into()));
    }
    if config
        .recruiter_info
        .as_ref()
        .is_some_and(|op| op.operator_name.is_empty())
    {
        return Err(BridgeError::Config("Recruiter name is required".into()));
    }
    Ok(())
}
