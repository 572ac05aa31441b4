//! Token metadata shown next to the live totals.

use crate::chain::{ChainExecutor, ContractAbi, FN_DECIMALS, FN_NAME, FN_SYMBOL};
use anyhow::{anyhow, Result};
use ethers::abi::Token;
use ethers::types::U256;

/// Decimals assumed until the token reports its own.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Placeholder shown while no metadata is known.
pub const PLACEHOLDER: &str = "---";

/// Minimum length of a complete `0x`-prefixed address.
pub const ADDRESS_LEN: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDetails {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenDetails {
    fn default() -> Self {
        Self {
            name: PLACEHOLDER.to_string(),
            symbol: PLACEHOLDER.to_string(),
            decimals: DEFAULT_DECIMALS,
        }
    }
}

impl TokenDetails {
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.symbol)
    }
}

/// Whether a typed token address is long enough to be worth a lookup.
pub fn looks_complete(token: &str) -> bool {
    token.trim().len() >= ADDRESS_LEN
}

/// Read name, symbol and decimals of an ERC20 token.
pub async fn fetch_token_details<E: ChainExecutor>(
    executor: &E,
    token: &str,
    chain_id: u64,
) -> Result<TokenDetails> {
    let name = read_string(executor, token, FN_NAME, chain_id).await?;
    let symbol = read_string(executor, token, FN_SYMBOL, chain_id).await?;
    let decimals = executor
        .read(ContractAbi::Erc20, token, FN_DECIMALS, vec![], chain_id)
        .await?
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| anyhow!("decimals() returned no value"))?;
    if decimals > U256::from(u8::MAX) {
        return Err(anyhow!("decimals() out of range: {}", decimals));
    }

    Ok(TokenDetails {
        name,
        symbol,
        decimals: decimals.as_u32() as u8,
    })
}

async fn read_string<E: ChainExecutor>(
    executor: &E,
    token: &str,
    function: &str,
    chain_id: u64,
) -> Result<String> {
    executor
        .read(ContractAbi::Erc20, token, function, vec![], chain_id)
        .await?
        .into_iter()
        .next()
        .and_then(Token::into_string)
        .ok_or_else(|| anyhow!("{}() returned no string", function))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockExecutor, TOKEN};

    #[test]
    fn test_default_details_are_placeholders() {
        let details = TokenDetails::default();
        assert_eq!(details.display_name(), "--- (---)");
        assert_eq!(details.decimals, 18);
    }

    #[test]
    fn test_looks_complete() {
        assert!(looks_complete(TOKEN));
        assert!(!looks_complete("0x1234"));
    }

    #[tokio::test]
    async fn test_fetch_token_details() {
        let executor = MockExecutor::new().with_token_metadata("Demo Token", "DEMO", 6);
        let details = fetch_token_details(&executor, TOKEN, 1).await.unwrap();
        assert_eq!(details.name, "Demo Token");
        assert_eq!(details.symbol, "DEMO");
        assert_eq!(details.decimals, 6);
    }

    #[tokio::test]
    async fn test_fetch_token_details_missing_metadata() {
        let executor = MockExecutor::new();
        assert!(fetch_token_details(&executor, TOKEN, 1).await.is_err());
    }
}
