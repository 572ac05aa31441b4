pub mod allowance;
pub mod amounts;
pub mod chain;
pub mod config;
pub mod draft;
pub mod error;
pub mod ethers_executor;
pub mod form;
pub mod network_guard;
pub mod notifications;
pub mod operation_log;
pub mod orchestrator;
pub mod recipients;
pub mod token;
pub mod user_settings;

#[cfg(test)]
mod testing;
