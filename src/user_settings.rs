use crate::config::{AllowanceReadPolicy, ANVIL_CHAIN_ID, DEFAULT_WALLET_TIMEOUT_SECS};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SETTINGS_FILE: &str = "tsender_settings.json";

/// Directory holding settings, drafts and the operation log.
pub fn app_data_dir() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        let app_dir = config_dir.join("tsender");
        if !app_dir.exists() {
            let _ = fs::create_dir_all(&app_dir);
        }
        app_dir
    } else {
        // Fall back to current directory
        PathBuf::from(".")
    }
}

fn default_selected_chain_id() -> u64 {
    ANVIL_CHAIN_ID
}

fn default_wallet_timeout_secs() -> u64 {
    DEFAULT_WALLET_TIMEOUT_SECS
}

/// User settings that persist between sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    /// Selected network chain ID
    #[serde(default = "default_selected_chain_id")]
    pub selected_chain_id: u64,
    /// Custom RPC overrides per chain ID
    #[serde(default)]
    pub custom_rpcs: HashMap<u64, String>,
    /// TSender deployments per chain ID, on top of the built-in ones
    #[serde(default)]
    pub distribution_contracts: HashMap<u64, String>,
    /// Seconds before a silent wallet triggers the timeout warning
    #[serde(default = "default_wallet_timeout_secs")]
    pub wallet_timeout_secs: u64,
    /// Behaviour when the allowance read fails
    #[serde(default)]
    pub allowance_read_policy: AllowanceReadPolicy,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            selected_chain_id: default_selected_chain_id(),
            custom_rpcs: HashMap::new(),
            distribution_contracts: HashMap::new(),
            wallet_timeout_secs: default_wallet_timeout_secs(),
            allowance_read_policy: AllowanceReadPolicy::default(),
        }
    }
}

impl UserSettings {
    /// Get the settings file path
    fn settings_path() -> PathBuf {
        app_data_dir().join(SETTINGS_FILE)
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        let path = Self::settings_path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => {
                        tracing::info!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse settings file: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read settings file: {}", e);
                }
            }
        }
        tracing::info!("Using default settings");
        Self::default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        tracing::info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Get the settings file path for display
    pub fn settings_path_display() -> String {
        Self::settings_path().display().to_string()
    }

    /// Get custom RPC for a chain, or None if using default
    pub fn get_custom_rpc(&self, chain_id: u64) -> Option<&String> {
        self.custom_rpcs.get(&chain_id).filter(|s| !s.is_empty())
    }

    /// Set custom RPC for a chain (empty string removes the override)
    pub fn set_custom_rpc(&mut self, chain_id: u64, rpc: String) {
        if rpc.trim().is_empty() {
            self.custom_rpcs.remove(&chain_id);
        } else {
            self.custom_rpcs.insert(chain_id, rpc.trim().to_string());
        }
    }

    /// Register a TSender deployment (empty string removes it)
    pub fn set_distribution_contract(&mut self, chain_id: u64, address: String) {
        if address.trim().is_empty() {
            self.distribution_contracts.remove(&chain_id);
        } else {
            self.distribution_contracts
                .insert(chain_id, address.trim().to_string());
        }
    }
}
