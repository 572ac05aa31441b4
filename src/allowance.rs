//! ERC20 allowance lookup for the owner/token/spender triple.

use crate::chain::{CallArg, ChainExecutor, ContractAbi, FN_ALLOWANCE};
use crate::error::AirdropError;
use ethers::types::{Address, U256};
use tracing::{debug, warn};

/// Snapshot of an allowance read. Stale as soon as it is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceState {
    pub owner: Address,
    pub spender: Address,
    pub token: String,
    pub chain_id: u64,
    pub amount: U256,
}

impl AllowanceState {
    pub fn covers(&self, required: U256) -> bool {
        self.amount >= required
    }
}

pub struct AllowanceChecker<'a, E: ChainExecutor> {
    executor: &'a E,
}

impl<'a, E: ChainExecutor> AllowanceChecker<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// One read of `token.allowance(owner, spender)` on `chain_id`. No retry.
    pub async fn current_allowance(
        &self,
        owner: Address,
        token: &str,
        spender: Address,
        chain_id: u64,
    ) -> Result<AllowanceState, AirdropError> {
        let output = self
            .executor
            .read(
                ContractAbi::Erc20,
                token,
                FN_ALLOWANCE,
                vec![CallArg::address(owner), CallArg::address(spender)],
                chain_id,
            )
            .await
            .map_err(|e| {
                warn!("Allowance read failed for token {} on chain {}: {}", token, chain_id, e);
                AirdropError::Read(e.to_string())
            })?;

        let amount = output
            .into_iter()
            .next()
            .and_then(|token| token.into_uint())
            .ok_or_else(|| AirdropError::Read("allowance() returned no uint256 value".to_string()))?;

        debug!("Allowance of {:?} for spender {:?}: {}", owner, spender, amount);

        Ok(AllowanceState {
            owner,
            spender,
            token: token.to_string(),
            chain_id,
            amount,
        })
    }
}
