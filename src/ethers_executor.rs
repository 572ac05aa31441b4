//! [`ChainExecutor`] backed by an HTTP JSON-RPC provider and a local signing key.

use crate::chain::{
    decode_output, encode_call, parse_address, CallArg, ChainExecutor, ContractAbi, EncodeError, Receipt,
};
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, TransactionRequest, TxHash, U64};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EthersExecutor {
    client: Arc<Client>,
    chain_id: u64,
    poll_interval: Duration,
    confirmation_timeout_secs: u64,
}

impl EthersExecutor {
    /// Build a signer for `config`'s chain from a hex private key.
    pub async fn connect(config: &Config, private_key: &str) -> Result<Self> {
        let provider = Provider::clone(&*config.get_provider().await?);
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .context("Invalid private key")?
            .with_chain_id(config.chain_id);
        info!("Signing as {:?} on chain {}", wallet.address(), config.chain_id);

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            chain_id: config.chain_id,
            poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
            confirmation_timeout_secs: config.confirmation_timeout_secs,
        })
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn request(&self, address: &str, contract: ContractAbi, function: &str, args: &[CallArg]) -> Result<TransactionRequest> {
        let to = parse_address(address).map_err(|e| EncodeError::new(contract, function, e))?;
        let data = encode_call(contract, function, args)?;
        Ok(TransactionRequest::new().to(to).data(data))
    }
}

#[async_trait]
impl ChainExecutor for EthersExecutor {
    async fn read(
        &self,
        contract: ContractAbi,
        address: &str,
        function: &str,
        args: Vec<CallArg>,
        chain_id: u64,
    ) -> Result<Vec<Token>> {
        if chain_id != self.chain_id {
            return Err(anyhow!(
                "RPC endpoint serves chain {}, cannot read on chain {}",
                self.chain_id,
                chain_id
            ));
        }
        let tx = self.request(address, contract, function, &args)?;
        let output = self.client.call(&tx.into(), None).await?;
        debug!("{}.{} returned {} bytes", contract.name(), function, output.len());
        decode_output(contract, function, &output)
    }

    async fn write(
        &self,
        contract: ContractAbi,
        address: &str,
        function: &str,
        args: Vec<CallArg>,
    ) -> Result<TxHash> {
        let tx = self.request(address, contract, function, &args)?;
        let pending = self.client.send_transaction(tx, None).await?;
        let tx_hash = pending.tx_hash();
        info!("{}.{} sent: {:?}", contract.name(), function, tx_hash);
        Ok(tx_hash)
    }

    async fn await_receipt(&self, tx_hash: TxHash) -> Result<Receipt> {
        let mut attempts = 0u64;
        let poll_ms = self.poll_interval.as_millis().max(1) as u64;
        let max_attempts = (self.confirmation_timeout_secs * 1000 / poll_ms).max(1);

        loop {
            if let Ok(Some(receipt)) = self.client.get_transaction_receipt(tx_hash).await {
                return Ok(to_receipt(receipt));
            }

            attempts += 1;
            if attempts >= max_attempts {
                return Err(anyhow!(
                    "Confirmation timeout after {} seconds for {:?}",
                    self.confirmation_timeout_secs,
                    tx_hash
                ));
            }

            sleep(self.poll_interval).await;
        }
    }
}

fn to_receipt(receipt: TransactionReceipt) -> Receipt {
    Receipt {
        tx_hash: receipt.transaction_hash,
        success: receipt.status == Some(U64::from(1)),
        block_number: receipt.block_number.map(|n| n.as_u64()),
        gas_used: receipt.gas_used,
    }
}
