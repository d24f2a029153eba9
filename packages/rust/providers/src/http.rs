//! HTTP plumbing shared by the provider clients.

use std::time::Duration;

use enricher_shared::{EnricherError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::ProviderKind;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("Enricher/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client with a per-request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EnricherError::Network(format!("failed to build HTTP client: {e}")))
}

/// Connection failures and timeouts.
pub(crate) fn transport_error(url: &str, e: reqwest::Error) -> EnricherError {
    EnricherError::Network(format!("{url}: {e}"))
}

/// Classify the status and decode a JSON body.
///
/// 400 and 422 mean the provider rejected the query; any other non-2xx is
/// treated as transport trouble and may be retried.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    kind: ProviderKind,
    url: &str,
    response: Response,
) -> Result<T> {
    let status = response.status();
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        return Err(EnricherError::malformed(
            kind.to_string(),
            format!("{url}: HTTP {status}"),
        ));
    }
    if !status.is_success() {
        return Err(EnricherError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| EnricherError::Network(format!("{url}: failed to read body: {e}")))?;

    serde_json::from_str(&body)
        .map_err(|e| EnricherError::parse(format!("{kind} response from {url}: {e}")))
}
