//! The airdrop form: draft fields, live transaction details, and the submit
//! action wired to the orchestrator.

use crate::amounts::{format_token_amount, parse_amounts, preview_total, submission_total};
use crate::chain::{AccountProvider, ChainExecutor, ChainProvider};
use crate::config::{get_tx_explorer_url, is_local_dev_chain};
use crate::draft::{CsvImport, DraftStore, FormDraft};
use crate::error::{user_message, AirdropError};
use crate::notifications::NotificationEntry;
use crate::operation_log::OperationLog;
use crate::orchestrator::{OrchestrationRun, Orchestrator, Phase, RunObserver};
use crate::recipients::parse_recipients;
use crate::token::{fetch_token_details, looks_complete, TokenDetails};
use ethers::types::U256;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const MAX_NOTIFICATIONS: usize = 50;

pub const LOCAL_NETWORK_NOTICE: &str = "You are connected to a local development network. Make sure your Anvil/Hardhat/Ganache node is running on http://127.0.0.1:8545.";

const NETWORK_SWITCH_WARNING: &str =
    "Warning: Network has changed. Please ensure you're on the correct network for your transaction.";

/// Notice shown before submitting on a local development chain.
pub fn local_network_notice(chain_id: u64) -> Option<&'static str> {
    is_local_dev_chain(chain_id).then_some(LOCAL_NETWORK_NOTICE)
}

/// Live summary shown under the form.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDetails {
    pub token: TokenDetails,
    pub recipient_count: usize,
    /// Recipient slots that are not 20-byte hex addresses.
    pub invalid_recipients: Vec<String>,
    /// `None` when the amounts overflow uint256.
    pub total_wei: Option<U256>,
    pub total_tokens: Option<String>,
    pub preview_total: Decimal,
}

pub struct AirdropForm {
    draft: Mutex<FormDraft>,
    store: Arc<dyn DraftStore>,
    operation_log: Option<OperationLog>,
    token: Mutex<TokenDetails>,
    busy: AtomicBool,
    phase: watch::Sender<Phase>,
    notifications: Mutex<VecDeque<NotificationEntry>>,
    last_seen_chain: Mutex<Option<u64>>,
}

/// Clears the busy flag when the submit future completes or is dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AirdropForm {
    /// Mount the form, restoring a stored draft if there is one.
    pub fn mount(store: Arc<dyn DraftStore>, operation_log: Option<OperationLog>) -> Self {
        let draft = match store.load() {
            Ok(Some(draft)) => {
                info!("Restored airdrop draft");
                draft
            }
            Ok(None) => FormDraft::default(),
            Err(e) => {
                warn!("Ignoring stored draft: {}", e);
                FormDraft::default()
            }
        };
        let (phase, _) = watch::channel(Phase::Idle);

        Self {
            draft: Mutex::new(draft),
            store,
            operation_log,
            token: Mutex::new(TokenDetails::default()),
            busy: AtomicBool::new(false),
            phase,
            notifications: Mutex::new(VecDeque::with_capacity(20)),
            last_seen_chain: Mutex::new(None),
        }
    }

    pub fn draft(&self) -> FormDraft {
        lock(&self.draft).clone()
    }

    pub fn set_token_address(&self, value: impl Into<String>) {
        self.edit(|draft| draft.token_address = value.into());
    }

    pub fn set_recipients(&self, value: impl Into<String>) {
        self.edit(|draft| draft.recipients = value.into());
    }

    pub fn set_amounts(&self, value: impl Into<String>) {
        self.edit(|draft| draft.amounts = value.into());
    }

    pub fn apply_import(&self, import: &CsvImport) {
        if import.skipped > 0 {
            self.notify(NotificationEntry::warning(format!(
                "Skipped {} CSV rows without an address and amount",
                import.skipped
            )));
        }
        self.edit(|draft| draft.apply_import(import));
    }

    /// Empty every field and forget the stored draft.
    pub fn clear(&self) {
        lock(&self.draft).clear();
        *lock(&self.token) = TokenDetails::default();
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear stored draft: {}", e);
        }
    }

    fn edit(&self, change: impl FnOnce(&mut FormDraft)) {
        let snapshot = {
            let mut draft = lock(&self.draft);
            change(&mut draft);
            draft.clone()
        };
        // Persistence is best-effort; the in-memory draft is authoritative.
        if let Err(e) = self.store.save(&snapshot) {
            warn!("Failed to save airdrop draft: {}", e);
        }
    }

    pub fn details(&self) -> TransactionDetails {
        let draft = self.draft();
        let token = lock(&self.token).clone();

        let recipients = parse_recipients(&draft.recipients);
        let invalid_recipients = recipients
            .iter()
            .filter(|r| r.to_address().is_none())
            .map(|r| r.as_str().to_string())
            .collect();
        let total_wei = submission_total(&parse_amounts(&draft.amounts));
        let total_tokens = total_wei.map(|wei| format_token_amount(wei, token.decimals));

        TransactionDetails {
            recipient_count: recipients.len(),
            invalid_recipients,
            total_wei,
            total_tokens,
            preview_total: preview_total(&draft.amounts),
            token,
        }
    }

    /// Look up name, symbol and decimals once the token address is complete.
    /// Failures leave the placeholders in place.
    pub async fn refresh_token_details<E: ChainExecutor>(&self, executor: &E, chain_id: u64) {
        let token_address = self.draft().token_address;
        let details = if looks_complete(&token_address) {
            match fetch_token_details(executor, token_address.trim(), chain_id).await {
                Ok(details) => {
                    debug!("Token {} is {}", token_address, details.display_name());
                    details
                }
                Err(e) => {
                    debug!("Token metadata unavailable for {}: {}", token_address, e);
                    TokenDetails::default()
                }
            }
        } else {
            TokenDetails::default()
        };
        *lock(&self.token) = details;
    }

    /// Report the wallet's current chain. Returns the warning raised when the
    /// chain moved while the user had started filling in the form.
    pub fn observe_chain(&self, chain_id: u64) -> Option<String> {
        let previous = lock(&self.last_seen_chain).replace(chain_id);
        match previous {
            Some(previous) if previous != chain_id && self.draft().is_dirty() => {
                warn!("Wallet switched from chain {} to {} with a filled form", previous, chain_id);
                self.notify(NotificationEntry::warning(NETWORK_SWITCH_WARNING));
                Some(NETWORK_SWITCH_WARNING.to_string())
            }
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn notifications(&self) -> Vec<NotificationEntry> {
        lock(&self.notifications).iter().cloned().collect()
    }

    fn notify(&self, entry: NotificationEntry) {
        let mut notifications = lock(&self.notifications);
        notifications.push_back(entry);
        while notifications.len() > MAX_NOTIFICATIONS {
            notifications.pop_front();
        }
    }

    /// Submit the current draft. Returns `None` without doing anything while
    /// another submission is in flight.
    pub async fn submit<E, S>(&self, orchestrator: &Orchestrator<'_, E, S>) -> Option<OrchestrationRun>
    where
        E: ChainExecutor,
        S: ChainProvider + AccountProvider,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Submit ignored, a run is already in flight");
            return None;
        }
        let _busy = BusyGuard(&self.busy);

        let draft = self.draft();
        let run = orchestrator.run(&draft, self).await;
        self.finish(&run);
        Some(run)
    }

    fn finish(&self, run: &OrchestrationRun) {
        match run.phase {
            Phase::Succeeded => {
                let chain_id = run.baseline_chain_id.unwrap_or_default();
                let recipients = run.request.as_ref().map_or(0, |r| r.recipients.len());
                let tx = run
                    .distribution_tx
                    .map(|hash| format!("{:?}", hash))
                    .unwrap_or_default();

                let mut message = format!("Tokens successfully sent to {} recipients!", recipients);
                if let Some(url) = get_tx_explorer_url(chain_id, &tx) {
                    message.push_str(&format!(" {}", url));
                }
                self.notify(NotificationEntry::info(message));

                if let Some(log) = &self.operation_log {
                    if let Err(e) = log.append("Airdrop", chain_id, success_log_details(run)) {
                        warn!("Failed to write operation log: {}", e);
                    }
                }
                self.clear();
            }
            Phase::Aborted(_) => {
                if let Some(error) = &run.last_error {
                    self.notify(NotificationEntry::error(user_message(error)));
                }
            }
            _ => {}
        }
    }
}

impl RunObserver for AirdropForm {
    fn phase_changed(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }

    fn warning(&self, warning: &AirdropError) {
        self.notify(NotificationEntry::warning(warning.to_string()));
    }
}

fn success_log_details(run: &OrchestrationRun) -> String {
    let mut lines = Vec::new();
    if let Some(request) = &run.request {
        lines.push(format!("Token: {}", request.token));
        lines.push(format!("Recipients: {}", request.recipients.len()));
        lines.push(format!("Total (wei): {}", request.total));
    }
    if let Some(tx) = run.approval_tx {
        lines.push(format!("Approval tx: {:?}", tx));
    }
    if let Some(tx) = run.distribution_tx {
        lines.push(format!("Airdrop tx: {:?}", tx));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::WalletSession;
    use crate::config::{ChainRegistry, Config};
    use crate::draft::{import_csv, MemoryDraftStore};
    use crate::error::ErrorKind;
    use crate::notifications::NotificationLevel;
    use crate::testing::{MockExecutor, OWNER, TOKEN};
    use std::str::FromStr;
    use std::task::Poll;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio_test::assert_pending;

    fn memory_form(draft: Option<FormDraft>) -> (AirdropForm, Arc<MemoryDraftStore>) {
        let store = Arc::new(match draft {
            Some(draft) => MemoryDraftStore::with_draft(draft),
            None => MemoryDraftStore::new(),
        });
        (AirdropForm::mount(store.clone(), None), store)
    }

    fn fill(form: &AirdropForm) {
        form.set_token_address(TOKEN);
        form.set_recipients("0xAAA,0xBBB");
        form.set_amounts("1000000000000000000,2000000000000000000");
    }

    fn session() -> WalletSession {
        WalletSession::new(31337, Some(OWNER.parse().unwrap())).0
    }

    // ==================== draft persistence ====================

    #[test]
    fn test_mount_restores_stored_draft() {
        let stored = FormDraft::new(TOKEN, "0xAAA", "5");
        let (form, _) = memory_form(Some(stored.clone()));
        assert_eq!(form.draft(), stored);
    }

    #[test]
    fn test_edits_write_through_to_store() {
        let (form, store) = memory_form(None);
        form.set_recipients("0xAAA");
        form.set_amounts("7");
        let saved = store.snapshot().unwrap();
        assert_eq!(saved.recipients, "0xAAA");
        assert_eq!(saved.amounts, "7");
    }

    #[test]
    fn test_apply_import_notifies_skipped_rows() {
        let (form, _) = memory_form(None);
        let import = import_csv("address,amount\n0xAAA,1\n".as_bytes()).unwrap();
        form.apply_import(&import);
        assert_eq!(form.draft().recipients, "0xAAA");
        assert_eq!(form.notifications()[0].level, NotificationLevel::Warning);
    }

    // ==================== live details ====================

    #[test]
    fn test_details_for_scenario_amounts() {
        let (form, _) = memory_form(None);
        fill(&form);

        let details = form.details();
        assert_eq!(details.recipient_count, 2);
        assert_eq!(details.invalid_recipients, vec!["0xAAA", "0xBBB"]);
        assert_eq!(details.total_wei, Some(U256::from_dec_str("3000000000000000000").unwrap()));
        assert_eq!(details.total_tokens.as_deref(), Some("3.000000"));
        assert_eq!(details.preview_total, Decimal::from_str("3000000000000000000").unwrap());
        assert_eq!(details.token.name, "---");
    }

    #[test]
    fn test_details_preview_keeps_decimals_the_total_drops() {
        let (form, _) = memory_form(None);
        form.set_amounts("1.5, 2, -0.5, abc");

        let details = form.details();
        assert_eq!(details.preview_total, Decimal::from_str("3.0").unwrap());
        assert_eq!(details.total_wei, Some(U256::from(2)));
    }

    #[tokio::test]
    async fn test_refresh_token_details() {
        let (form, _) = memory_form(None);
        let executor = MockExecutor::new().with_token_metadata("Mock Token", "MOCK", 6);

        form.set_token_address(TOKEN);
        form.set_amounts("1500000");
        form.refresh_token_details(&executor, 31337).await;

        let details = form.details();
        assert_eq!(details.token.display_name(), "Mock Token (MOCK)");
        assert_eq!(details.total_tokens.as_deref(), Some("1.500000"));
    }

    #[tokio::test]
    async fn test_refresh_token_details_skips_partial_address() {
        let (form, _) = memory_form(None);
        let executor = MockExecutor::new().with_token_metadata("Mock Token", "MOCK", 6);

        form.set_token_address("0xe7f1");
        form.refresh_token_details(&executor, 31337).await;

        assert!(executor.calls().is_empty());
        assert_eq!(form.details().token, TokenDetails::default());
    }

    #[tokio::test]
    async fn test_refresh_token_details_read_failure_keeps_placeholders() {
        let (form, _) = memory_form(None);
        let executor = MockExecutor::new();

        form.set_token_address(TOKEN);
        form.refresh_token_details(&executor, 31337).await;

        assert_eq!(form.details().token.symbol, "---");
    }

    // ==================== network change warning ====================

    #[test]
    fn test_chain_change_with_clean_form_is_silent() {
        let (form, _) = memory_form(None);
        assert!(form.observe_chain(31337).is_none());
        assert!(form.observe_chain(1).is_none());
        assert!(form.notifications().is_empty());
    }

    #[test]
    fn test_chain_change_with_dirty_form_warns() {
        let (form, _) = memory_form(None);
        form.observe_chain(31337);
        form.set_token_address("0x");

        assert!(form.observe_chain(31337).is_none());
        assert!(form.observe_chain(8453).is_some());
        assert!(form.observe_chain(8453).is_none());
        assert_eq!(form.notifications().len(), 1);
    }

    #[test]
    fn test_local_network_notice() {
        assert!(local_network_notice(31337).is_some());
        assert!(local_network_notice(1337).is_some());
        assert!(local_network_notice(1).is_none());
    }

    // ==================== submit ====================

    #[tokio::test]
    async fn test_successful_submit_clears_draft_and_logs() {
        let dir = tempdir().unwrap();
        let log = OperationLog::new(dir.path().join("operation_log.txt"));
        let store = Arc::new(MemoryDraftStore::new());
        let form = AirdropForm::mount(store.clone(), Some(log.clone()));
        fill(&form);

        let config = Config::new("http://127.0.0.1:8545".to_string(), 31337);
        let registry = ChainRegistry::builtin();
        let executor = MockExecutor::new();
        let session = session();
        let orchestrator = Orchestrator::new(&config, &registry, &executor, &session);

        let run = form.submit(&orchestrator).await.unwrap();

        assert!(run.succeeded());
        assert!(!form.draft().is_dirty());
        assert!(store.snapshot().is_none());
        assert_eq!(form.phase(), Phase::Succeeded);
        assert!(!form.is_busy());

        let notifications = form.notifications();
        assert!(notifications[0].message.contains("2 recipients"));
        let logged = log.read().unwrap();
        assert!(logged.contains("operation=Airdrop"));
        assert!(logged.contains("Total (wei): 3000000000000000000"));
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_draft_and_reports() {
        let (form, store) = memory_form(None);
        fill(&form);

        let config = Config::new("http://127.0.0.1:8545".to_string(), 31337);
        let registry = ChainRegistry::builtin();
        let executor = MockExecutor::new().failing_write("approve", "User rejected the request");
        let session = session();
        let orchestrator = Orchestrator::new(&config, &registry, &executor, &session);

        let run = form.submit(&orchestrator).await.unwrap();

        assert_eq!(run.abort_reason(), Some(ErrorKind::ApprovalFailed));
        assert!(form.draft().is_dirty());
        assert!(store.snapshot().is_some());
        assert_eq!(form.phase(), Phase::Aborted(ErrorKind::ApprovalFailed));
        let notifications = form.notifications();
        assert_eq!(notifications[0].level, NotificationLevel::Error);
        assert!(notifications[0].message.starts_with("Transaction failed:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_while_busy_is_ignored() {
        let (form, _) = memory_form(None);
        fill(&form);

        let config = Config::new("http://127.0.0.1:8545".to_string(), 31337);
        let registry = ChainRegistry::builtin();
        let executor = MockExecutor::new().with_write_delay(Duration::from_secs(1));
        let session = session();
        let orchestrator = Orchestrator::new(&config, &registry, &executor, &session);

        let (first, second) = tokio::join!(form.submit(&orchestrator), form.submit(&orchestrator));

        assert!(first.unwrap().succeeded());
        assert!(second.is_none());
        assert_eq!(executor.writes().len(), 2);
        assert!(!form.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_published_while_waiting_on_wallet() {
        let (form, _) = memory_form(None);
        fill(&form);

        let config = Config::new("http://127.0.0.1:8545".to_string(), 31337);
        let registry = ChainRegistry::builtin();
        let executor = MockExecutor::new().with_write_delay(Duration::from_secs(1));
        let session = session();
        let orchestrator = Orchestrator::new(&config, &registry, &executor, &session);

        let mut submit = tokio_test::task::spawn(form.submit(&orchestrator));
        assert_pending!(submit.poll());
        assert!(form.is_busy());
        assert_eq!(form.phase(), Phase::AwaitingApproval);
        assert_eq!(form.phase().button_label(), "Confirm approval in wallet...");

        let run = loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if let Poll::Ready(run) = submit.poll() {
                break run;
            }
        };
        assert!(run.unwrap().succeeded());
        assert!(!form.is_busy());
    }
}
