use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::http_client::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::provider_policy::{BackoffPolicy, ProviderPolicy};
use crate::source::{FundamentalEndpoint, FundamentalSource, QueryParams, SourceError};
use crate::Symbol;

pub const ALPHAVANTAGE_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const API_KEY_ENV: &str = "FAIRVAL_ALPHAVANTAGE_API_KEY";

const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Alpha Vantage fundamentals adapter.
///
/// Retries transient transport failures and retryable statuses per the
/// backoff policy, then classifies the body. Only clean payloads come back
/// as `Ok`.
#[derive(Clone)]
pub struct AlphaVantageSource {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    base_url: String,
    timeout: Duration,
    backoff: BackoffPolicy,
}

impl Default for AlphaVantageSource {
    fn default() -> Self {
        Self::from_policy(
            Arc::new(ReqwestHttpClient::default()),
            api_key_from_env(),
            &ProviderPolicy::alphavantage_default(),
        )
    }
}

impl AlphaVantageSource {
    pub fn from_policy(
        http_client: Arc<dyn HttpClient>,
        api_key: impl Into<String>,
        policy: &ProviderPolicy,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: String::from(ALPHAVANTAGE_BASE_URL),
            timeout: policy.request_timeout,
            backoff: policy.retry_backoff.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(
        &self,
        symbol: &Symbol,
        endpoint: FundamentalEndpoint,
        params: &QueryParams,
    ) -> HttpRequest {
        let mut request = HttpRequest::get(&self.base_url)
            .with_timeout(self.timeout)
            .with_query("function", endpoint.function())
            .with_query("symbol", symbol.as_str());
        for (name, value) in params {
            request = request.with_query(name, value);
        }
        request.with_query("apikey", &self.api_key)
    }

    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse, SourceError> {
        let mut retries = 0_u32;
        loop {
            let failure = match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if RETRYABLE_STATUSES.contains(&response.status) => {
                    format!("alphavantage returned status {}", response.status)
                }
                Ok(response) => {
                    return Err(SourceError::data_unavailable(format!(
                        "alphavantage returned status {}",
                        response.status
                    )));
                }
                Err(error) if error.retryable() => {
                    format!("alphavantage transport error: {}", error.message())
                }
                Err(error) => {
                    return Err(SourceError::data_unavailable(format!(
                        "alphavantage transport error: {}",
                        error.message()
                    )));
                }
            };

            let Some(delay) = self.backoff.delay(retries) else {
                return Err(SourceError::data_unavailable(failure));
            };
            retries += 1;
            warn!(
                url = %request.redacted_url(),
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "retrying provider call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl FundamentalSource for AlphaVantageSource {
    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
        endpoint: FundamentalEndpoint,
        params: &'a QueryParams,
    ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_request(symbol, endpoint, params);
            debug!(url = %request.redacted_url(), "calling provider");
            let response = self.execute_with_retry(request).await?;
            classify_payload(&response.body)?;
            Ok(response.body)
        })
    }
}

pub fn api_key_from_env() -> String {
    std::env::var(API_KEY_ENV).unwrap_or_else(|_| String::from("demo"))
}

/// Reject bodies that carry no data even though the status was 2xx.
pub fn classify_payload(body: &str) -> Result<(), SourceError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        SourceError::data_unavailable(format!("failed to parse alphavantage response: {e}"))
    })?;

    let Some(object) = value.as_object() else {
        return Err(SourceError::data_unavailable(
            "alphavantage response is not a JSON object",
        ));
    };
    if object.is_empty() {
        return Err(SourceError::data_unavailable("alphavantage returned no data"));
    }
    if let Some(message) = object.get("Error Message") {
        return Err(SourceError::data_unavailable(format!(
            "alphavantage error: {}",
            text_of(message)
        )));
    }
    for notice in ["Note", "Information"] {
        if let Some(message) = object.get(notice) {
            warn!(notice = %text_of(message), "provider throttle notice");
            return Err(SourceError::rate_limited(format!(
                "alphavantage throttled: {}",
                text_of(message)
            )));
        }
    }
    Ok(())
}

fn text_of(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_owned)
        .unwrap_or_else(|| value.to_string())
}
