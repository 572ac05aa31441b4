//! Interfaces to the wallet and the chain.
//!
//! The orchestration core never talks to an RPC endpoint directly. It reads
//! the active chain and account through [`ChainProvider`] / [`AccountProvider`]
//! and issues contract calls through a [`ChainExecutor`]. Contract function
//! tables for the ERC20 token and the TSender distribution contract live here
//! as well, so every executor encodes calls the same way.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::types::{Address, Bytes, TxHash, U256};
use thiserror::Error;
use tokio::sync::watch;

pub const FN_ALLOWANCE: &str = "allowance";
pub const FN_APPROVE: &str = "approve";
pub const FN_NAME: &str = "name";
pub const FN_SYMBOL: &str = "symbol";
pub const FN_DECIMALS: &str = "decimals";
pub const FN_AIRDROP_ERC20: &str = "airdropERC20";

/// Contract ABIs the airdrop flow calls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractAbi {
    Erc20,
    TSender,
}

impl ContractAbi {
    pub fn name(&self) -> &'static str {
        match self {
            ContractAbi::Erc20 => "ERC20",
            ContractAbi::TSender => "TSender",
        }
    }

    /// Look up a function of this contract by name.
    pub fn function(&self, name: &str) -> Option<Function> {
        match (self, name) {
            (ContractAbi::Erc20, FN_ALLOWANCE) => Some(build_function(
                FN_ALLOWANCE,
                &[("owner", ParamType::Address), ("spender", ParamType::Address)],
                &[ParamType::Uint(256)],
                StateMutability::View,
            )),
            (ContractAbi::Erc20, FN_APPROVE) => Some(build_function(
                FN_APPROVE,
                &[("spender", ParamType::Address), ("amount", ParamType::Uint(256))],
                &[ParamType::Bool],
                StateMutability::NonPayable,
            )),
            (ContractAbi::Erc20, FN_NAME) => Some(build_function(
                FN_NAME,
                &[],
                &[ParamType::String],
                StateMutability::View,
            )),
            (ContractAbi::Erc20, FN_SYMBOL) => Some(build_function(
                FN_SYMBOL,
                &[],
                &[ParamType::String],
                StateMutability::View,
            )),
            (ContractAbi::Erc20, FN_DECIMALS) => Some(build_function(
                FN_DECIMALS,
                &[],
                &[ParamType::Uint(8)],
                StateMutability::View,
            )),
            // function airdropERC20(address tokenAddress, address[] recipients, uint256[] amounts, uint256 totalAmount)
            (ContractAbi::TSender, FN_AIRDROP_ERC20) => Some(build_function(
                FN_AIRDROP_ERC20,
                &[
                    ("tokenAddress", ParamType::Address),
                    ("recipients", ParamType::Array(Box::new(ParamType::Address))),
                    ("amounts", ParamType::Array(Box::new(ParamType::Uint(256)))),
                    ("totalAmount", ParamType::Uint(256)),
                ],
                &[],
                StateMutability::NonPayable,
            )),
            _ => None,
        }
    }
}

#[allow(deprecated)]
fn build_function(
    name: &str,
    inputs: &[(&str, ParamType)],
    outputs: &[ParamType],
    state_mutability: StateMutability,
) -> Function {
    Function {
        name: name.to_string(),
        inputs: inputs
            .iter()
            .map(|(param, kind)| Param {
                name: param.to_string(),
                kind: kind.clone(),
                internal_type: None,
            })
            .collect(),
        outputs: outputs
            .iter()
            .map(|kind| Param {
                name: String::new(),
                kind: kind.clone(),
                internal_type: None,
            })
            .collect(),
        constant: None,
        state_mutability,
    }
}

/// A contract call argument as the core sees it.
///
/// Addresses stay the strings the user typed; executors convert them when
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    Address(String),
    Addresses(Vec<String>),
    Uint(U256),
    Uints(Vec<U256>),
}

impl CallArg {
    pub fn address(address: Address) -> Self {
        CallArg::Address(format!("{:?}", address))
    }

    pub fn to_token(&self) -> Result<Token> {
        Ok(match self {
            CallArg::Address(raw) => Token::Address(parse_address(raw)?),
            CallArg::Addresses(raws) => Token::Array(
                raws.iter()
                    .map(|raw| parse_address(raw).map(Token::Address))
                    .collect::<Result<Vec<_>>>()?,
            ),
            CallArg::Uint(value) => Token::Uint(*value),
            CallArg::Uints(values) => Token::Array(values.iter().map(|v| Token::Uint(*v)).collect()),
        })
    }
}

pub fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("Invalid address format: {}", raw))
}

/// A call that could not be turned into calldata. Raised before anything
/// reaches the wallet.
#[derive(Debug, Error)]
#[error("Failed to encode {contract}.{function}: {reason}")]
pub struct EncodeError {
    pub contract: &'static str,
    pub function: String,
    pub reason: String,
}

impl EncodeError {
    pub fn new(contract: ContractAbi, function: &str, reason: impl ToString) -> Self {
        Self {
            contract: contract.name(),
            function: function.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Encode calldata for `contract.function(args)`. Failures are [`EncodeError`]s.
pub fn encode_call(contract: ContractAbi, function: &str, args: &[CallArg]) -> Result<Bytes> {
    let func = contract
        .function(function)
        .ok_or_else(|| EncodeError::new(contract, function, "no such function"))?;
    let tokens = args
        .iter()
        .map(CallArg::to_token)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| EncodeError::new(contract, function, e))?;
    let data = func
        .encode_input(&tokens)
        .map_err(|e| EncodeError::new(contract, function, e))?;
    Ok(data.into())
}

/// Decode the return data of `contract.function`.
pub fn decode_output(contract: ContractAbi, function: &str, data: &[u8]) -> Result<Vec<Token>> {
    let func = contract
        .function(function)
        .ok_or_else(|| anyhow!("{} has no function named {}", contract.name(), function))?;
    Ok(func.decode_output(data)?)
}

/// Confirmation record of a mined transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

/// Source of the wallet's active chain identifier.
pub trait ChainProvider: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Receiver that is notified whenever the active chain changes.
    fn watch_chain(&self) -> watch::Receiver<u64>;
}

/// Source of the connected account.
pub trait AccountProvider: Send + Sync {
    fn account(&self) -> Option<Address>;
}

/// Executes contract reads and wallet-signed writes.
#[async_trait]
pub trait ChainExecutor: Send + Sync {
    /// Read-only call against `chain_id`.
    async fn read(
        &self,
        contract: ContractAbi,
        address: &str,
        function: &str,
        args: Vec<CallArg>,
        chain_id: u64,
    ) -> Result<Vec<Token>>;

    /// Ask the wallet to sign and submit a transaction. Resolves once the
    /// wallet hands back a hash.
    async fn write(
        &self,
        contract: ContractAbi,
        address: &str,
        function: &str,
        args: Vec<CallArg>,
    ) -> Result<TxHash>;

    async fn await_receipt(&self, tx_hash: TxHash) -> Result<Receipt>;
}

/// Wallet connection state: active chain and account, observable for changes.
#[derive(Clone)]
pub struct WalletSession {
    chain: watch::Receiver<u64>,
    account: watch::Receiver<Option<Address>>,
}

/// Write side of a [`WalletSession`], held by whatever tracks the wallet.
pub struct SessionHandle {
    chain: watch::Sender<u64>,
    account: watch::Sender<Option<Address>>,
}

impl WalletSession {
    pub fn new(chain_id: u64, account: Option<Address>) -> (Self, SessionHandle) {
        let (chain_tx, chain_rx) = watch::channel(chain_id);
        let (account_tx, account_rx) = watch::channel(account);
        (
            Self {
                chain: chain_rx,
                account: account_rx,
            },
            SessionHandle {
                chain: chain_tx,
                account: account_tx,
            },
        )
    }
}

impl ChainProvider for WalletSession {
    fn chain_id(&self) -> u64 {
        *self.chain.borrow()
    }

    fn watch_chain(&self) -> watch::Receiver<u64> {
        self.chain.clone()
    }
}

impl AccountProvider for WalletSession {
    fn account(&self) -> Option<Address> {
        *self.account.borrow()
    }
}

impl SessionHandle {
    /// Publish the wallet's chain. Receivers are only woken on a real change.
    pub fn switch_chain(&self, chain_id: u64) {
        self.chain.send_if_modified(|current| {
            if *current == chain_id {
                false
            } else {
                *current = chain_id;
                true
            }
        });
    }

    pub fn connect(&self, account: Address) {
        self.account.send_replace(Some(account));
    }

    pub fn disconnect(&self) {
        self.account.send_replace(None);
    }
}
