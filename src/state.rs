use crate::completion::CompletionClient;
use crate::config::AppConfig;
use crate::error::RelayError;
use crate::observability::usage::UsageReporter;

/// Shared application state accessible to all handlers.
///
/// Built once at startup and passed by `Arc`; nothing here is mutable
/// per-request beyond the reporter's internal counters.
pub struct AppState {
    pub config: AppConfig,
    pub client: CompletionClient,
    pub usage: UsageReporter,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, client: CompletionClient, usage: UsageReporter) -> Self {
        Self {
            config,
            client,
            usage,
        }
    }

    /// Convenience constructor wiring the client and reporter from config.
    ///
    /// # Errors
    ///
    /// Propagates client construction failures; startup-only.
    pub fn from_config(config: AppConfig) -> Result<Self, RelayError> {
        let client = CompletionClient::new(&config.upstream, &config.server)?;
        let usage = UsageReporter::new(&config.telemetry.service_name);
        Ok(Self::new(config, client, usage))
    }
}
