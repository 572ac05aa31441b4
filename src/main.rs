use anyhow::{anyhow, Context, Result};
use ethers::providers::{Http, Middleware, Provider};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tsender::chain::{ChainProvider, SessionHandle, WalletSession};
use tsender::config::{ChainRegistry, Config};
use tsender::draft::{import_csv_file, FileDraftStore};
use tsender::error::user_message;
use tsender::ethers_executor::EthersExecutor;
use tsender::form::{local_network_notice, AirdropForm};
use tsender::operation_log::OperationLog;
use tsender::orchestrator::Orchestrator;
use tsender::user_settings::UserSettings;

const CHAIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let settings = UserSettings::load();
    info!("Settings: {}", UserSettings::settings_path_display());
    let config = Config::from_settings(&settings);
    let registry = ChainRegistry::from_settings(&settings);
    info!(
        "Network: {} (chain {}) via {}",
        config.network_label(),
        config.chain_id,
        config.rpc_url
    );

    let private_key = env::var("PRIVATE_KEY").context("PRIVATE_KEY must be set to sign transactions")?;
    let executor = EthersExecutor::connect(&config, &private_key).await?;
    let (session, handle) = WalletSession::new(config.chain_id, Some(executor.address()));
    let chain_poll = tokio::spawn(poll_chain_id(config.get_provider().await?, handle));

    let form = AirdropForm::mount(
        Arc::new(FileDraftStore::default_location()),
        Some(OperationLog::default_location()),
    );
    form.observe_chain(session.chain_id());
    apply_env_overrides(&form)?;

    form.refresh_token_details(&executor, config.chain_id).await;
    let details = form.details();
    info!("Token: {}", details.token.display_name());
    info!("Recipients: {}", details.recipient_count);
    info!(
        "Total: {} wei ({} tokens)",
        details
            .total_wei
            .map(|w| w.to_string())
            .unwrap_or_else(|| "overflow".to_string()),
        details.total_tokens.as_deref().unwrap_or("-")
    );
    if !details.invalid_recipients.is_empty() {
        warn!("Not valid addresses: {}", details.invalid_recipients.join(", "));
    }
    if let Some(notice) = local_network_notice(config.chain_id) {
        warn!("{}", notice);
    }

    let mut phases = form.subscribe_phase();
    let progress = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow();
            info!("{}", phase.button_label());
            if phase.is_terminal() {
                break;
            }
        }
    });

    let orchestrator = Orchestrator::new(&config, &registry, &executor, &session);
    let run = form
        .submit(&orchestrator)
        .await
        .ok_or_else(|| anyhow!("An airdrop is already in progress"))?;
    let _ = progress.await;
    chain_poll.abort();

    for entry in form.notifications() {
        println!("[{}] {}", entry.time_ago(), entry.message);
    }

    match &run.last_error {
        Some(error) => Err(anyhow!(user_message(error))),
        None => Ok(()),
    }
}

/// Feed the endpoint's chain id into the session so a network change on the
/// RPC side aborts an in-flight airdrop.
async fn poll_chain_id(provider: Arc<Provider<Http>>, handle: SessionHandle) {
    let mut ticker = tokio::time::interval(CHAIN_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        match provider.get_chainid().await {
            Ok(id) => handle.switch_chain(id.as_u64()),
            Err(e) => debug!("Chain id poll failed: {}", e),
        }
    }
}

/// Fill draft fields from the environment, replacing what was stored.
fn apply_env_overrides(form: &AirdropForm) -> Result<()> {
    if let Ok(token) = env::var("TSENDER_TOKEN") {
        form.set_token_address(token);
    }
    if let Ok(path) = env::var("TSENDER_CSV") {
        let import = import_csv_file(Path::new(&path))?;
        info!("Imported {} rows from {}", import.recipients.len(), path);
        form.apply_import(&import);
    }
    if let Ok(recipients) = env::var("TSENDER_RECIPIENTS") {
        form.set_recipients(recipients);
    }
    if let Ok(amounts) = env::var("TSENDER_AMOUNTS") {
        form.set_amounts(amounts);
    }
    Ok(())
}
