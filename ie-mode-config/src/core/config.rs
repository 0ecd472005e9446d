/*!
Configuration management for the site list tool
*/

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sitelist_engine::policy::EDGE_POLICY_KEY;
use sitelist_engine::{JsonFilePolicyStore, PolicyNames, PolicyStore, StorageLayout};
use tracing::info;

use crate::core::registry::RegCommandStore;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteListConfig {
    /// Where the site list and ledger are stored
    pub storage: StorageConfig,
    /// Policy store settings
    pub policy: PolicyConfig,
    /// Notification outputs
    pub notifications: Vec<NotifierConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the site list, the ledger and the policy backup
    pub config_dir: PathBuf,
    /// File name of the XML site list
    pub site_list_file: String,
    /// File name of the deletion ledger
    pub ledger_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Registry key holding the policy values
    pub key: String,
    /// Value names under `key`
    pub values: PolicyNames,
    /// Where policy values are written
    pub backend: PolicyBackend,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum PolicyBackend {
    /// The Windows registry, through `reg.exe`
    Registry,
    /// A JSON file, for dry runs
    JsonFile { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    /// Notifier type
    pub sink: NotifierKind,
    /// Whether this notifier is enabled
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum NotifierKind {
    Terminal { format: TerminalFormat },
    JsonLog { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum TerminalFormat {
    Plain,
    Colored,
    Json,
}

impl SiteListConfig {
    /// Read a TOML config file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: SiteListConfig = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Use `explicit` if given, else the per-user config file if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ie-mode-config").join("config.toml"))
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::in_dir(
            &self.storage.config_dir,
            &self.storage.site_list_file,
            &self.storage.ledger_file,
        )
    }

    /// Notifiers used when the config file lists none.
    pub fn effective_notifications(&self) -> Vec<NotifierConfig> {
        if self.notifications.is_empty() {
            vec![NotifierConfig::default()]
        } else {
            self.notifications.clone()
        }
    }
}

impl PolicyConfig {
    /// Whether writing policy needs an elevated process.
    pub fn needs_elevation(&self) -> bool {
        self.backend == PolicyBackend::Registry
    }

    pub fn build_store(&self) -> Box<dyn PolicyStore> {
        match &self.backend {
            PolicyBackend::Registry => Box::new(RegCommandStore::new(&self.key)),
            PolicyBackend::JsonFile { path } => Box::new(JsonFilePolicyStore::new(&self.key, path)),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            site_list_file: "ie-sitelist.xml".to_string(),
            ledger_file: "old-site.txt".to_string(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let backend = if cfg!(windows) {
            PolicyBackend::Registry
        } else {
            PolicyBackend::JsonFile {
                path: default_config_dir().join("policy.json"),
            }
        };
        Self {
            key: EDGE_POLICY_KEY.to_string(),
            values: PolicyNames::default(),
            backend,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            sink: NotifierKind::Terminal {
                format: TerminalFormat::Colored,
            },
            enabled: true,
        }
    }
}

fn default_config_dir() -> PathBuf {
    if cfg!(windows) {
        std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
            .join("Microsoft")
            .join("Edge")
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ie-mode-config")
    }
}
