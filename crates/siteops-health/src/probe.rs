//! Single HTTP readiness probe.

use chrono::{DateTime, Utc};
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use siteops_common::{OrchestratorError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Outcome of one probe attempt. An unhealthy target is data, not an error;
/// only a malformed URL is surfaced as an error.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub healthy: bool,
    pub status: Option<u16>,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// Issue one GET against the endpoint, bounded by `attempt_timeout`.
///
/// Any success-class (2xx) status is healthy; any other status, a connection
/// error, or a timeout is an unhealthy result.
pub async fn probe_once(endpoint: &str, attempt_timeout: Duration) -> Result<ProbeResult> {
    let start = std::time::Instant::now();

    let uri: Uri = endpoint.parse().map_err(|e| {
        OrchestratorError::invalid_argument("health.url", format!("invalid URL '{endpoint}': {e}"))
    })?;

    let client = Client::builder(TokioExecutor::new()).build_http();
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("User-Agent", "siteops/0.1")
        .body(Empty::<Bytes>::new())
        .map_err(|e| {
            OrchestratorError::invalid_argument("health.url", format!("bad request: {e}"))
        })?;

    let outcome = timeout(attempt_timeout, client.request(request)).await;
    let checked_at = Utc::now();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(Ok(response)) => {
            let status = response.status();
            let healthy = status.is_success();
            debug!(
                "Probe {}: status={} healthy={} time={}ms",
                endpoint, status, healthy, elapsed_ms
            );
            ProbeResult {
                healthy,
                status: Some(status.as_u16()),
                checked_at,
                response_time_ms: elapsed_ms,
                error: if healthy {
                    None
                } else {
                    Some(format!("unexpected status {status}"))
                },
            }
        }
        Ok(Err(e)) => ProbeResult {
            healthy: false,
            status: None,
            checked_at,
            response_time_ms: elapsed_ms,
            error: Some(format!("connection failed: {e}")),
        },
        Err(_) => ProbeResult {
            healthy: false,
            status: None,
            checked_at,
            response_time_ms: attempt_timeout.as_millis() as u64,
            error: Some("timeout".to_string()),
        },
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_an_argument_error() {
        let err = probe_once("not a url", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unhealthy_not_fatal() {
        // Port 1 is essentially never listening.
        let result = probe_once("http://127.0.0.1:1/health", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!result.healthy);
        assert!(result.error.is_some());
        assert!(result.status.is_none());
    }
}
