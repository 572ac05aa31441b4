//! Chain pinning for a single orchestration run.

use crate::chain::ChainProvider;
use crate::error::AirdropError;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Named points in a run where the active chain is re-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    AfterAllowanceRead,
    BeforeApproval,
    ApprovalSubmitted,
    ApprovalConfirmed,
    BeforeDistribution,
    DistributionSubmitted,
    DistributionConfirmed,
}

/// Baseline chain captured at the start of a run. Any different chain seen at
/// a later checkpoint aborts the run. One guard per run, never reused.
#[derive(Debug)]
pub struct NetworkGuard {
    baseline: u64,
}

impl NetworkGuard {
    pub fn capture(chain: &impl ChainProvider) -> Self {
        let baseline = chain.chain_id();
        debug!("Network guard captured baseline chain {}", baseline);
        Self { baseline }
    }

    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    pub fn check(&self, observed: u64) -> Result<(), AirdropError> {
        if observed == self.baseline {
            Ok(())
        } else {
            Err(AirdropError::NetworkChanged {
                baseline: self.baseline,
                observed,
            })
        }
    }

    /// Read the active chain and check it against the baseline.
    pub fn verify(&self, chain: &impl ChainProvider, checkpoint: Checkpoint) -> Result<(), AirdropError> {
        let observed = chain.chain_id();
        self.check(observed).map_err(|e| {
            warn!(
                "Chain changed from {} to {} at {:?}, aborting",
                self.baseline, observed, checkpoint
            );
            e
        })
    }

    /// Resolves once `chain` reports a chain other than the baseline, whether
    /// the switch already happened or comes later. Never resolves if the
    /// session closes.
    pub async fn switched(&self, mut chain: watch::Receiver<u64>) -> AirdropError {
        loop {
            let observed = *chain.borrow_and_update();
            if observed != self.baseline {
                warn!(
                    "Chain changed from {} to {} while a chain call was pending, aborting",
                    self.baseline, observed
                );
                return AirdropError::NetworkChanged {
                    baseline: self.baseline,
                    observed,
                };
            }
            if chain.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
