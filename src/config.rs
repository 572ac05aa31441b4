use crate::user_settings::UserSettings;
use anyhow::Result;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Network category for grouping in the network picker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkCategory {
    EthereumMainnet,
    EthereumTestnet,
    L2Mainnet,
    LocalDevelopment,
}

/// A supported EVM network with label, chain ID and default RPC.
#[derive(Clone, Debug)]
pub struct EvmNetwork {
    pub label: &'static str,
    pub chain_id: u64,
    pub native_token: &'static str,
    pub default_rpc: &'static str,
    pub category: NetworkCategory,
}

impl EvmNetwork {
    pub const fn new(
        label: &'static str,
        chain_id: u64,
        native_token: &'static str,
        default_rpc: &'static str,
        category: NetworkCategory,
    ) -> Self {
        Self {
            label,
            chain_id,
            native_token,
            default_rpc,
            category,
        }
    }
}

use NetworkCategory::*;

/// Chains the wallet connector offers.
pub const NETWORKS: &[EvmNetwork] = &[
    EvmNetwork::new("Ethereum", 1, "ETH", "https://ethereum-rpc.publicnode.com", EthereumMainnet),
    EvmNetwork::new("Sepolia", 11155111, "ETH", "https://ethereum-sepolia-rpc.publicnode.com", EthereumTestnet),
    EvmNetwork::new("Arbitrum One", 42161, "ETH", "https://arb1.arbitrum.io/rpc", L2Mainnet),
    EvmNetwork::new("Optimism", 10, "ETH", "https://mainnet.optimism.io", L2Mainnet),
    EvmNetwork::new("Base", 8453, "ETH", "https://mainnet.base.org", L2Mainnet),
    EvmNetwork::new("zkSync Era", 324, "ETH", "https://mainnet.era.zksync.io", L2Mainnet),
    EvmNetwork::new("Anvil", 31337, "ETH", "http://127.0.0.1:8545", LocalDevelopment),
];

pub const ANVIL_CHAIN_ID: u64 = 31337;
pub const GANACHE_CHAIN_ID: u64 = 1337;

/// First contract deployed by the default Anvil account (nonce 0).
pub const ANVIL_TSENDER_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

/// Default advisory wait for a wallet response.
pub const DEFAULT_WALLET_TIMEOUT_SECS: u64 = 30;

/// Find a network by chain ID
pub fn find_network_by_chain_id(chain_id: u64) -> Option<&'static EvmNetwork> {
    NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// Local development chains (Anvil/Hardhat, Ganache)
pub fn is_local_dev_chain(chain_id: u64) -> bool {
    chain_id == ANVIL_CHAIN_ID || chain_id == GANACHE_CHAIN_ID
}

/// Get the block explorer URL for a given chain ID
pub fn get_block_explorer_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        11155111 => Some("https://sepolia.etherscan.io"),
        42161 => Some("https://arbiscan.io"),
        10 => Some("https://optimistic.etherscan.io"),
        8453 => Some("https://basescan.org"),
        324 => Some("https://explorer.zksync.io"),
        _ => None,
    }
}

/// Get the full URL to view a transaction on the block explorer
pub fn get_tx_explorer_url(chain_id: u64, tx_hash: &str) -> Option<String> {
    get_block_explorer_url(chain_id).map(|base| format!("{}/tx/{}", base, tx_hash))
}

/// What to do when the allowance cannot be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowanceReadPolicy {
    /// Treat the allowance as insufficient and request approval.
    #[default]
    AssumeInsufficient,
    /// Abort the run with a read error.
    Abort,
}

/// Distribution (TSender) contract deployments per chain.
#[derive(Clone, Debug)]
pub struct ChainRegistry {
    deployments: HashMap<u64, Address>,
}

impl ChainRegistry {
    pub fn empty() -> Self {
        Self {
            deployments: HashMap::new(),
        }
    }

    /// Deployments known without any user configuration.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        if let Ok(anvil) = ANVIL_TSENDER_ADDRESS.parse() {
            registry.deployments.insert(ANVIL_CHAIN_ID, anvil);
        }
        registry
    }

    /// Built-in deployments overlaid with the user's configured ones.
    /// Unparseable entries are skipped with a warning.
    pub fn from_settings(settings: &UserSettings) -> Self {
        let mut registry = Self::builtin();
        for (chain_id, raw) in &settings.distribution_contracts {
            match raw.trim().parse::<Address>() {
                Ok(address) => registry = registry.with_deployment(*chain_id, address),
                Err(e) => warn!(
                    "Ignoring distribution contract {:?} for chain {}: {}",
                    raw, chain_id, e
                ),
            }
        }
        registry
    }

    pub fn with_deployment(mut self, chain_id: u64, address: Address) -> Self {
        self.deployments.insert(chain_id, address);
        self
    }

    pub fn distribution_contract(&self, chain_id: u64) -> Option<Address> {
        self.deployments.get(&chain_id).copied()
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

const WALLET_TIMEOUT_ENV: &str = "TSENDER_WALLET_TIMEOUT_SECS";

fn env_wallet_timeout() -> Option<String> {
    env::var(WALLET_TIMEOUT_ENV).ok()
}

/// Wallet timeout in seconds: a parseable env value wins over the stored
/// setting, which wins over the default.
fn wallet_timeout_secs(env_value: Option<&str>, setting: Option<u64>) -> u64 {
    env_value
        .and_then(|v| v.trim().parse().ok())
        .or(setting)
        .unwrap_or(DEFAULT_WALLET_TIMEOUT_SECS)
}

/// Runtime configuration. Built once by the host and passed by reference.
#[derive(Clone, Debug)]
pub struct Config {
    pub rpc_url: String,
    pub chain_id: u64,
    pub wallet_timeout: Duration,
    pub allowance_read_policy: AllowanceReadPolicy,
    pub receipt_poll_interval_ms: u64,
    pub confirmation_timeout_secs: u64,
}

impl Config {
    pub fn new(rpc_url: String, chain_id: u64) -> Self {
        let wallet_timeout_secs = wallet_timeout_secs(env_wallet_timeout().as_deref(), None);

        Self {
            rpc_url,
            chain_id,
            wallet_timeout: Duration::from_secs(wallet_timeout_secs),
            allowance_read_policy: AllowanceReadPolicy::default(),
            receipt_poll_interval_ms: 500,
            confirmation_timeout_secs: 120,
        }
    }

    pub fn from_network(network: &EvmNetwork) -> Self {
        Self::new(network.default_rpc.to_string(), network.chain_id)
    }

    /// Build config from persisted settings (selected chain, RPC override,
    /// timeout and allowance policy).
    pub fn from_settings(settings: &UserSettings) -> Self {
        let chain_id = settings.selected_chain_id;
        let rpc_url = settings
            .get_custom_rpc(chain_id)
            .cloned()
            .or_else(|| find_network_by_chain_id(chain_id).map(|n| n.default_rpc.to_string()))
            .unwrap_or_else(|| "http://127.0.0.1:8545".to_string());

        let mut config = Self::new(rpc_url, chain_id);
        config.wallet_timeout = Duration::from_secs(wallet_timeout_secs(
            env_wallet_timeout().as_deref(),
            Some(settings.wallet_timeout_secs),
        ));
        config.allowance_read_policy = settings.allowance_read_policy;
        config
    }

    pub fn with_allowance_read_policy(mut self, policy: AllowanceReadPolicy) -> Self {
        self.allowance_read_policy = policy;
        self
    }

    pub fn native_token(&self) -> &str {
        find_network_by_chain_id(self.chain_id)
            .map(|n| n.native_token)
            .unwrap_or("ETH")
    }

    pub fn network_label(&self) -> &str {
        find_network_by_chain_id(self.chain_id)
            .map(|n| n.label)
            .unwrap_or("Unknown")
    }

    pub async fn get_provider(&self) -> Result<Arc<Provider<Http>>> {
        let url = Url::parse(&self.rpc_url)?;
        let provider = Provider::<Http>::try_from(url.as_str())?;
        Ok(Arc::new(provider))
    }
}

impl Default for Config {
    fn default() -> Self {
        // Local Anvil node until settings select something else
        if let Some(anvil) = find_network_by_chain_id(ANVIL_CHAIN_ID) {
            Self::from_network(anvil)
        } else {
            Self::new("http://127.0.0.1:8545".to_string(), ANVIL_CHAIN_ID)
        }
    }
}
