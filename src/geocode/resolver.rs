//! Postal code resolution over an ordered provider chain.
//!
//! Each provider is tried in turn. Rate-limit responses are retried on the
//! same provider after a fixed backoff, up to a bounded number of times;
//! every other failure is logged and the next provider is tried.

use super::error_log::ErrorLog;
use super::provider::{GeocodeProvider, HttpProvider, ProviderConfig, ProviderFailure, StatusClass};
use crate::domain::model::ResolutionResult;
use crate::domain::ports::Geocoder;
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first rate-limited attempt.
    pub max_rate_limit_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 5,
            backoff: Duration::from_secs(3),
        }
    }
}

pub struct GeocodeResolver {
    client: Client,
    providers: Vec<Box<dyn GeocodeProvider>>,
    retry: RetryPolicy,
    error_log: Arc<ErrorLog>,
}

impl GeocodeResolver {
    pub fn new(
        client: Client,
        providers: Vec<Box<dyn GeocodeProvider>>,
        retry: RetryPolicy,
        error_log: Arc<ErrorLog>,
    ) -> Self {
        Self {
            client,
            providers,
            retry,
            error_log,
        }
    }

    /// Builds the chain from configuration, skipping disabled providers.
    pub fn from_configs(
        client: Client,
        configs: &[ProviderConfig],
        retry: RetryPolicy,
        error_log: Arc<ErrorLog>,
    ) -> Self {
        let providers = configs
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .map(|c| Box::new(HttpProvider::new(c)) as Box<dyn GeocodeProvider>)
            .collect();
        Self::new(client, providers, retry, error_log)
    }

    pub fn build_client(timeout: Duration) -> Result<Client> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cep-sales-map/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    async fn query_provider(
        &self,
        provider: &dyn GeocodeProvider,
        code: &str,
    ) -> std::result::Result<ResolutionResult, ProviderFailure> {
        let url = provider.request_url(code)?;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!("{} attempt {} for CEP {}", provider.name(), attempt, code);

            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();

            match provider.classify(status) {
                StatusClass::RateLimited => {
                    if attempt > self.retry.max_rate_limit_retries {
                        return Err(ProviderFailure::RateLimited { attempts: attempt });
                    }
                    tracing::warn!(
                        "{} rate limited CEP {} (HTTP {}), retrying in {:?}",
                        provider.name(),
                        code,
                        status.as_u16(),
                        self.retry.backoff
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                StatusClass::Failed => {
                    let raw = response.text().await.ok().filter(|b| !b.is_empty());
                    return Err(ProviderFailure::Rejected {
                        status: status.as_u16(),
                        raw,
                    });
                }
                StatusClass::Success => {
                    let body = response.text().await?;
                    let result = provider.parse(&body)?;
                    if !result.is_resolved() {
                        return Err(ProviderFailure::NoCoordinates { raw: body });
                    }
                    return Ok(result);
                }
            }
        }
    }
}

#[async_trait]
impl Geocoder for GeocodeResolver {
    async fn resolve(&self, code: &str) -> ResolutionResult {
        let mut metadata = ResolutionResult::unresolved();

        for provider in &self.providers {
            match self.query_provider(provider.as_ref(), code).await {
                Ok(result) => {
                    tracing::debug!(
                        "CEP {} resolved by {}: ({:?}, {:?})",
                        code,
                        provider.name(),
                        result.lat,
                        result.lon
                    );
                    return result.merge_metadata(&metadata);
                }
                Err(failure) => {
                    let reason = format!("{}: {}", provider.name(), failure);
                    self.error_log
                        .record(code, &reason, failure.raw_response())
                        .await;
                    // address metadata without coordinates still fills gaps later
                    if let ProviderFailure::NoCoordinates { raw } = &failure {
                        if let Ok(partial) = provider.parse(raw) {
                            metadata = metadata.merge_metadata(&partial);
                        }
                    }
                }
            }
        }

        tracing::debug!("CEP {} unresolved after {} providers", code, self.providers.len());
        metadata
    }
}
