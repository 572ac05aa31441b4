//! Error taxonomy for airdrop submissions and the user-facing classification
//! of those errors.

use ethers::types::TxHash;
use std::fmt;
use thiserror::Error;

/// Which wallet request a watchdog or failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStep {
    Approval,
    Distribution,
}

impl fmt::Display for WalletStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletStep::Approval => write!(f, "token approval"),
            WalletStep::Distribution => write!(f, "airdrop"),
        }
    }
}

/// Everything an airdrop submission can report to its caller.
#[derive(Debug, Error)]
pub enum AirdropError {
    #[error("{0}")]
    Validation(String),

    #[error("Failed to read token allowance: {0}")]
    Read(String),

    #[error("Network changed during transaction (started on chain {baseline}, now on chain {observed})")]
    NetworkChanged { baseline: u64, observed: u64 },

    #[error("Token approval failed: {reason}")]
    ApprovalFailed {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    #[error("Airdrop transaction failed: {reason}")]
    DistributionFailed {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    /// Advisory only, the wallet request is still pending.
    #[error("No response from wallet after {waited_secs}s while waiting for the {step}. Check your wallet for a pending request.")]
    WalletTimeout { step: WalletStep, waited_secs: u64 },

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

/// Discriminant of [`AirdropError`], carried by `Phase::Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Read,
    NetworkChanged,
    ApprovalFailed,
    DistributionFailed,
    WalletTimeout,
    Unknown,
}

impl AirdropError {
    pub fn validation(message: impl Into<String>) -> Self {
        AirdropError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AirdropError::Validation(_) => ErrorKind::Validation,
            AirdropError::Read(_) => ErrorKind::Read,
            AirdropError::NetworkChanged { .. } => ErrorKind::NetworkChanged,
            AirdropError::ApprovalFailed { .. } => ErrorKind::ApprovalFailed,
            AirdropError::DistributionFailed { .. } => ErrorKind::DistributionFailed,
            AirdropError::WalletTimeout { .. } => ErrorKind::WalletTimeout,
            AirdropError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Whether this error ends the run. Only the wallet watchdog is advisory.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AirdropError::WalletTimeout { .. })
    }
}

const NETWORK_CHANGED_MESSAGE: &str =
    "Network changed during transaction. Please ensure you stay on the same network and try again.";

const LOCAL_NODE_MESSAGE: &str = "Cannot connect to local development network. Please make sure your local Ethereum node (Anvil/Hardhat/Ganache) is running, or switch to a public network.";

fn mentions_network_change(message: &str) -> bool {
    message.contains("network") || message.contains("chain") || message.contains("MetaMask - RPC Error")
}

fn mentions_connection_refused(message: &str) -> bool {
    message.contains("CONNECTION_REFUSED")
        || message.contains("Connection refused")
        || message.contains("http://127.0.0.1:8545")
        || message.contains("could not detect network")
}

/// Classify an error into the single message shown to the user.
pub fn user_message(error: &AirdropError) -> String {
    match error {
        AirdropError::NetworkChanged { .. } => NETWORK_CHANGED_MESSAGE.to_string(),
        // Validation messages are written for the user already and often name
        // the chain, so they must not go through keyword matching.
        AirdropError::Validation(message) => message.clone(),
        AirdropError::WalletTimeout { .. } => error.to_string(),
        _ => {
            let message = error.to_string();
            // Connection checks first: "could not detect network" is not a network switch.
            if mentions_connection_refused(&message) {
                LOCAL_NODE_MESSAGE.to_string()
            } else if mentions_network_change(&message) {
                NETWORK_CHANGED_MESSAGE.to_string()
            } else {
                format!("Transaction failed: {}", message)
            }
        }
    }
}
