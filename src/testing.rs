//! Scripted chain executor shared by the unit tests.

use crate::chain::{
    encode_call, CallArg, ChainExecutor, ContractAbi, Receipt, SessionHandle, FN_AIRDROP_ERC20, FN_ALLOWANCE,
    FN_APPROVE, FN_DECIMALS, FN_NAME, FN_SYMBOL,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{TxHash, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const OWNER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const SPENDER: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const TOKEN: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Read,
    Write,
    Receipt,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub address: String,
    pub function: String,
    pub args: Vec<CallArg>,
    pub chain_id: Option<u64>,
}

/// Executor call at which a scripted chain switch happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    AllowanceRead,
    ApprovalWrite,
    ApprovalReceipt,
    DistributionWrite,
    DistributionReceipt,
}

pub struct MockExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    allowance: std::result::Result<U256, String>,
    token_metadata: Option<(String, String, u8)>,
    failing_receipts: Vec<&'static str>,
    failing_writes: HashMap<&'static str, String>,
    write_delay: Option<Duration>,
    strict_encoding: bool,
    chain_switch: Option<(Trigger, Arc<SessionHandle>, u64)>,
    next_hash: AtomicU64,
    hashes: Mutex<HashMap<TxHash, String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            allowance: Ok(U256::zero()),
            token_metadata: None,
            failing_receipts: Vec::new(),
            failing_writes: HashMap::new(),
            write_delay: None,
            strict_encoding: false,
            chain_switch: None,
            next_hash: AtomicU64::new(1),
            hashes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_allowance(mut self, amount: U256) -> Self {
        self.allowance = Ok(amount);
        self
    }

    pub fn with_allowance_error(mut self, message: &str) -> Self {
        self.allowance = Err(message.to_string());
        self
    }

    pub fn with_token_metadata(mut self, name: &str, symbol: &str, decimals: u8) -> Self {
        self.token_metadata = Some((name.to_string(), symbol.to_string(), decimals));
        self
    }

    /// Receipts of writes to `function` report `status: false`.
    pub fn failing_receipt(mut self, function: &'static str) -> Self {
        self.failing_receipts.push(function);
        self
    }

    /// Writes to `function` are rejected by the wallet with `message`.
    pub fn failing_write(mut self, function: &'static str, message: &str) -> Self {
        self.failing_writes.insert(function, message.to_string());
        self
    }

    /// Every wallet write takes `delay` before handing back a hash.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Writes encode their calldata like a real executor, so unparseable
    /// addresses fail before the wallet is asked.
    pub fn strict_encoding(mut self) -> Self {
        self.strict_encoding = true;
        self
    }

    pub fn switch_chain_on(mut self, trigger: Trigger, handle: Arc<SessionHandle>, chain_id: u64) -> Self {
        self.chain_switch = Some((trigger, handle, chain_id));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, function: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.function == function)
            .collect()
    }

    /// Function names of wallet writes, in order.
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.kind == CallKind::Write)
            .map(|call| call.function)
            .collect()
    }

    fn record(&self, kind: CallKind, address: &str, function: &str, args: Vec<CallArg>, chain_id: Option<u64>) {
        self.calls.lock().unwrap().push(RecordedCall {
            kind,
            address: address.to_string(),
            function: function.to_string(),
            args,
            chain_id,
        });
    }

    fn fire(&self, trigger: Trigger) {
        if let Some((on, handle, chain_id)) = &self.chain_switch {
            if *on == trigger {
                handle.switch_chain(*chain_id);
            }
        }
    }
}

#[async_trait]
impl ChainExecutor for MockExecutor {
    async fn read(
        &self,
        _contract: ContractAbi,
        address: &str,
        function: &str,
        args: Vec<CallArg>,
        chain_id: u64,
    ) -> Result<Vec<Token>> {
        self.record(CallKind::Read, address, function, args, Some(chain_id));
        match function {
            FN_ALLOWANCE => {
                self.fire(Trigger::AllowanceRead);
                self.allowance
                    .clone()
                    .map(|amount| vec![Token::Uint(amount)])
                    .map_err(|e| anyhow!(e))
            }
            FN_NAME | FN_SYMBOL | FN_DECIMALS => {
                let (name, symbol, decimals) = self
                    .token_metadata
                    .clone()
                    .ok_or_else(|| anyhow!("execution reverted"))?;
                Ok(vec![match function {
                    FN_NAME => Token::String(name),
                    FN_SYMBOL => Token::String(symbol),
                    _ => Token::Uint(U256::from(decimals)),
                }])
            }
            other => Err(anyhow!("unexpected read of {}", other)),
        }
    }

    async fn write(
        &self,
        contract: ContractAbi,
        address: &str,
        function: &str,
        args: Vec<CallArg>,
    ) -> Result<TxHash> {
        self.record(CallKind::Write, address, function, args.clone(), None);
        if self.strict_encoding {
            encode_call(contract, function, &args)?;
        }
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        match function {
            FN_APPROVE => self.fire(Trigger::ApprovalWrite),
            FN_AIRDROP_ERC20 => self.fire(Trigger::DistributionWrite),
            _ => {}
        }
        if let Some(message) = self.failing_writes.get(function) {
            return Err(anyhow!(message.clone()));
        }
        let hash = TxHash::from_low_u64_be(self.next_hash.fetch_add(1, Ordering::SeqCst));
        self.hashes.lock().unwrap().insert(hash, function.to_string());
        Ok(hash)
    }

    async fn await_receipt(&self, tx_hash: TxHash) -> Result<Receipt> {
        let function = self
            .hashes
            .lock()
            .unwrap()
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| anyhow!("unknown transaction {:?}", tx_hash))?;
        self.record(CallKind::Receipt, "", &function, vec![], None);
        match function.as_str() {
            FN_APPROVE => self.fire(Trigger::ApprovalReceipt),
            FN_AIRDROP_ERC20 => self.fire(Trigger::DistributionReceipt),
            _ => {}
        }
        Ok(Receipt {
            tx_hash,
            success: !self.failing_receipts.iter().any(|f| *f == function),
            block_number: Some(1),
            gas_used: Some(U256::from(21_000)),
        })
    }
}
