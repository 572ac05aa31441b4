//! Airdrop transaction orchestration.
//!
//! One [`Orchestrator::run`] call drives one submission through
//!
//! ```text
//! Idle -> ValidatingInput -> CheckingAllowance -> [AwaitingApproval -> ConfirmingApproval]
//!      -> AwaitingDistribution -> ConfirmingDistribution -> Succeeded
//! ```
//!
//! with `Aborted(kind)` reachable from every non-terminal phase. The approval
//! leg only runs when the current allowance is below the exact submission
//! total. The active chain is pinned when allowance checking starts and
//! re-checked around every wallet request; any change aborts the run.
//! Nothing is retried: a failed run is restarted from scratch by a new submit.

use crate::allowance::{AllowanceChecker, AllowanceState};
use crate::amounts::{parse_amounts, submission_total};
use crate::chain::{
    AccountProvider, CallArg, ChainExecutor, ChainProvider, ContractAbi, EncodeError, FN_AIRDROP_ERC20,
    FN_APPROVE,
};
use crate::config::{AllowanceReadPolicy, ChainRegistry, Config};
use crate::draft::FormDraft;
use crate::error::{AirdropError, ErrorKind, WalletStep};
use crate::network_guard::{Checkpoint, NetworkGuard};
use crate::recipients::{parse_recipients, RecipientAddress};
use ethers::types::{Address, TxHash, U256};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ValidatingInput,
    CheckingAllowance,
    AwaitingApproval,
    ConfirmingApproval,
    AwaitingDistribution,
    ConfirmingDistribution,
    Succeeded,
    Aborted(ErrorKind),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Aborted(_))
    }

    /// A run is in flight and the submit action must stay disabled.
    pub fn is_busy(&self) -> bool {
        !self.is_terminal() && *self != Phase::Idle
    }

    /// Text for the submit button.
    pub fn button_label(&self) -> &'static str {
        match self {
            Phase::Idle | Phase::Succeeded | Phase::Aborted(_) => "Send Tokens",
            Phase::ValidatingInput | Phase::CheckingAllowance => "Processing...",
            Phase::AwaitingApproval => "Confirm approval in wallet...",
            Phase::ConfirmingApproval => "Waiting for approval...",
            Phase::AwaitingDistribution => "Confirm airdrop in wallet...",
            Phase::ConfirmingDistribution => "Sending tokens...",
        }
    }
}

/// Receives phase changes and advisory warnings while a run is in flight.
pub trait RunObserver: Send + Sync {
    fn phase_changed(&self, _phase: Phase) {}
    fn warning(&self, _warning: &AirdropError) {}
}

impl RunObserver for () {}

/// Event form of [`RunObserver`] callbacks, for channel-based consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Phase(Phase),
    Warning(String),
}

impl RunObserver for mpsc::UnboundedSender<RunEvent> {
    fn phase_changed(&self, phase: Phase) {
        let _ = self.send(RunEvent::Phase(phase));
    }

    fn warning(&self, warning: &AirdropError) {
        let _ = self.send(RunEvent::Warning(warning.to_string()));
    }
}

/// Validated submission built from the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirdropRequest {
    pub token: String,
    pub recipients: Vec<RecipientAddress>,
    pub amounts: Vec<U256>,
    pub total: U256,
}

impl AirdropRequest {
    pub fn from_draft(draft: &FormDraft) -> Result<Self, AirdropError> {
        let token = draft.token_address.trim();
        if token.is_empty() {
            return Err(AirdropError::validation("Token address is required"));
        }

        let recipients = parse_recipients(&draft.recipients);
        if recipients.is_empty() {
            return Err(AirdropError::validation("At least one recipient is required"));
        }

        let amounts = parse_amounts(&draft.amounts);
        if recipients.len() != amounts.len() {
            return Err(AirdropError::validation(format!(
                "Recipient count ({}) does not match amount count ({}). Amounts must be whole numbers in wei.",
                recipients.len(),
                amounts.len()
            )));
        }

        let total = submission_total(&amounts)
            .ok_or_else(|| AirdropError::validation("Total amount exceeds the uint256 range"))?;

        Ok(Self {
            token: token.to_string(),
            recipients,
            amounts,
            total,
        })
    }
}

/// State of one submission. Created per submit, dropped after it ends.
#[derive(Debug)]
pub struct OrchestrationRun {
    pub baseline_chain_id: Option<u64>,
    pub phase: Phase,
    pub last_error: Option<AirdropError>,
    /// Advisory warnings raised while the run continued.
    pub warnings: Vec<AirdropError>,
    pub request: Option<AirdropRequest>,
    /// `None` when the read failed and the approval path was forced.
    pub allowance: Option<AllowanceState>,
    /// Read failure that was tolerated under `AssumeInsufficient`.
    pub allowance_read_error: Option<AirdropError>,
    pub approval_tx: Option<TxHash>,
    pub distribution_tx: Option<TxHash>,
}

impl OrchestrationRun {
    fn new() -> Self {
        Self {
            baseline_chain_id: None,
            phase: Phase::Idle,
            last_error: None,
            warnings: Vec::new(),
            request: None,
            allowance: None,
            allowance_read_error: None,
            approval_tx: None,
            distribution_tx: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }

    pub fn succeeded(&self) -> bool {
        self.phase == Phase::Succeeded
    }

    pub fn abort_reason(&self) -> Option<ErrorKind> {
        match self.phase {
            Phase::Aborted(kind) => Some(kind),
            _ => None,
        }
    }
}

pub struct Orchestrator<'a, E, S> {
    config: &'a Config,
    registry: &'a ChainRegistry,
    executor: &'a E,
    session: &'a S,
}

impl<'a, E, S> Orchestrator<'a, E, S>
where
    E: ChainExecutor,
    S: ChainProvider + AccountProvider,
{
    pub fn new(config: &'a Config, registry: &'a ChainRegistry, executor: &'a E, session: &'a S) -> Self {
        Self {
            config,
            registry,
            executor,
            session,
        }
    }

    /// Drive one submission of `draft` to a terminal phase.
    pub async fn run(&self, draft: &FormDraft, observer: &dyn RunObserver) -> OrchestrationRun {
        let mut run = OrchestrationRun::new();
        match self.drive(draft, &mut run, observer).await {
            Ok(()) => {
                info!(
                    "Airdrop complete: approval {:?}, distribution {:?}",
                    run.approval_tx, run.distribution_tx
                );
                self.enter(&mut run, observer, Phase::Succeeded);
            }
            Err(e) => {
                error!("Airdrop aborted: {}", e);
                self.enter(&mut run, observer, Phase::Aborted(e.kind()));
                run.last_error = Some(e);
            }
        }
        run
    }

    async fn drive(
        &self,
        draft: &FormDraft,
        run: &mut OrchestrationRun,
        observer: &dyn RunObserver,
    ) -> Result<(), AirdropError> {
        self.enter(run, observer, Phase::ValidatingInput);

        let owner = self
            .session
            .account()
            .ok_or_else(|| AirdropError::validation("Connect a wallet before sending tokens"))?;
        let chain_id = self.session.chain_id();
        let spender = self.registry.distribution_contract(chain_id).ok_or_else(|| {
            AirdropError::validation(format!(
                "TSender not deployed on current chain (Chain ID: {})",
                chain_id
            ))
        })?;
        let request = AirdropRequest::from_draft(draft)?;
        run.request = Some(request.clone());

        info!(
            "Airdrop of {} to {} recipients via TSender {:?} on chain {}",
            request.total,
            request.recipients.len(),
            spender,
            chain_id
        );

        self.enter(run, observer, Phase::CheckingAllowance);
        let guard = NetworkGuard::capture(self.session);
        run.baseline_chain_id = Some(guard.baseline());
        guard.check(chain_id)?;

        let needs_approval = self
            .needs_approval(owner, &request, spender, &guard, run)
            .await?;
        guard.verify(self.session, Checkpoint::AfterAllowanceRead)?;

        if needs_approval {
            self.approve(&request, spender, &guard, run, observer).await?;
        } else {
            info!("Existing allowance covers {}, skipping approval", request.total);
        }

        self.distribute(&request, spender, &guard, run, observer).await
    }

    async fn needs_approval(
        &self,
        owner: Address,
        request: &AirdropRequest,
        spender: Address,
        guard: &NetworkGuard,
        run: &mut OrchestrationRun,
    ) -> Result<bool, AirdropError> {
        let checker = AllowanceChecker::new(self.executor);
        match checker
            .current_allowance(owner, &request.token, spender, guard.baseline())
            .await
        {
            Ok(state) => {
                let needs = !state.covers(request.total);
                info!(
                    "Current allowance {} vs required {}: approval {}",
                    state.amount,
                    request.total,
                    if needs { "required" } else { "not required" }
                );
                run.allowance = Some(state);
                Ok(needs)
            }
            Err(e) => match self.config.allowance_read_policy {
                AllowanceReadPolicy::Abort => Err(e),
                AllowanceReadPolicy::AssumeInsufficient => {
                    warn!("{}; requesting approval anyway", e);
                    run.allowance_read_error = Some(e);
                    Ok(true)
                }
            },
        }
    }

    async fn approve(
        &self,
        request: &AirdropRequest,
        spender: Address,
        guard: &NetworkGuard,
        run: &mut OrchestrationRun,
        observer: &dyn RunObserver,
    ) -> Result<(), AirdropError> {
        self.enter(run, observer, Phase::AwaitingApproval);
        guard.verify(self.session, Checkpoint::BeforeApproval)?;

        let submit = self.executor.write(
            ContractAbi::Erc20,
            &request.token,
            FN_APPROVE,
            vec![CallArg::address(spender), CallArg::Uint(request.total)],
        );
        let tx_hash = self
            .guarded(guard, Some(WalletStep::Approval), run, observer, submit)
            .await?
            .map_err(|e| write_failure(WalletStep::Approval, e))?;
        run.approval_tx = Some(tx_hash);
        info!("Approval submitted: {:?}", tx_hash);
        guard.verify(self.session, Checkpoint::ApprovalSubmitted)?;

        self.enter(run, observer, Phase::ConfirmingApproval);
        let receipt = self
            .guarded(guard, None, run, observer, self.executor.await_receipt(tx_hash))
            .await?
            .map_err(|e| AirdropError::ApprovalFailed {
                tx_hash: Some(tx_hash),
                reason: e.to_string(),
            })?;
        guard.verify(self.session, Checkpoint::ApprovalConfirmed)?;

        if !receipt.success {
            return Err(AirdropError::ApprovalFailed {
                tx_hash: Some(tx_hash),
                reason: format!("approval transaction {:?} reverted", tx_hash),
            });
        }
        Ok(())
    }

    async fn distribute(
        &self,
        request: &AirdropRequest,
        spender: Address,
        guard: &NetworkGuard,
        run: &mut OrchestrationRun,
        observer: &dyn RunObserver,
    ) -> Result<(), AirdropError> {
        self.enter(run, observer, Phase::AwaitingDistribution);
        guard.verify(self.session, Checkpoint::BeforeDistribution)?;

        let args = vec![
            CallArg::Address(request.token.clone()),
            CallArg::Addresses(request.recipients.iter().map(|r| r.as_str().to_string()).collect()),
            CallArg::Uints(request.amounts.clone()),
            CallArg::Uint(request.total),
        ];
        let tsender = format!("{:?}", spender);
        let submit = self
            .executor
            .write(ContractAbi::TSender, &tsender, FN_AIRDROP_ERC20, args);
        let tx_hash = self
            .guarded(guard, Some(WalletStep::Distribution), run, observer, submit)
            .await?
            .map_err(|e| write_failure(WalletStep::Distribution, e))?;
        run.distribution_tx = Some(tx_hash);
        info!("Airdrop submitted: {:?}", tx_hash);
        guard.verify(self.session, Checkpoint::DistributionSubmitted)?;

        self.enter(run, observer, Phase::ConfirmingDistribution);
        let receipt = self
            .guarded(guard, None, run, observer, self.executor.await_receipt(tx_hash))
            .await?
            .map_err(|e| AirdropError::DistributionFailed {
                tx_hash: Some(tx_hash),
                reason: e.to_string(),
            })?;
        guard.verify(self.session, Checkpoint::DistributionConfirmed)?;

        if !receipt.success {
            return Err(AirdropError::DistributionFailed {
                tx_hash: Some(tx_hash),
                reason: format!("airdrop transaction {:?} reverted", tx_hash),
            });
        }
        Ok(())
    }

    /// Await a chain call while watching the wallet's chain. A switch off the
    /// baseline aborts at once and the call's eventual result is dropped.
    /// Wallet requests (`step` set) raise one advisory warning if still
    /// pending after the configured timeout, then keep waiting.
    async fn guarded<T>(
        &self,
        guard: &NetworkGuard,
        step: Option<WalletStep>,
        run: &mut OrchestrationRun,
        observer: &dyn RunObserver,
        call: impl Future<Output = T>,
    ) -> Result<T, AirdropError> {
        tokio::pin!(call);
        let switched = guard.switched(self.session.watch_chain());
        tokio::pin!(switched);
        let timeout = self.config.wallet_timeout;
        let watchdog = tokio::time::sleep(timeout);
        tokio::pin!(watchdog);
        let mut watching = step.is_some();

        loop {
            tokio::select! {
                out = &mut call => return Ok(out),
                err = &mut switched => return Err(err),
                _ = &mut watchdog, if watching => {
                    watching = false;
                    if let Some(step) = step {
                        let warning = AirdropError::WalletTimeout {
                            step,
                            waited_secs: timeout.as_secs(),
                        };
                        warn!("{}", warning);
                        observer.warning(&warning);
                        run.warnings.push(warning);
                    }
                }
            }
        }
    }

    fn enter(&self, run: &mut OrchestrationRun, observer: &dyn RunObserver, phase: Phase) {
        info!("Airdrop phase {:?} -> {:?}", run.phase, phase);
        run.phase = phase;
        observer.phase_changed(phase);
    }
}

/// Calldata that cannot be encoded is an internal fault, not a wallet
/// failure.
fn write_failure(step: WalletStep, error: anyhow::Error) -> AirdropError {
    if error.downcast_ref::<EncodeError>().is_some() {
        return AirdropError::Unknown(error);
    }
    let reason = error.to_string();
    match step {
        WalletStep::Approval => AirdropError::ApprovalFailed { tx_hash: None, reason },
        WalletStep::Distribution => AirdropError::DistributionFailed { tx_hash: None, reason },
    }
}
