//! Probe strategies: one operation `probe(service, check) -> ProbeResult` with three
//! built-in variants sharing a common GraphQL-style transport (§4.2).

mod authenticated;
mod basic;
mod query;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::model::{Check, ProbeResult, ServiceDescriptor, StrategyKind};

pub use authenticated::AuthenticatedStrategy;
pub use basic::BasicStrategy;
pub use query::QueryStrategy;

/// Common contract every strategy implements. `probe` must complete (successfully or
/// not) within `check.timeout()`, cancelling the underlying transport on expiry, and
/// must convert unexpected transport errors into a failed `ProbeResult` rather than
/// raising (§4.2).
#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    async fn probe(
        &self,
        client: &reqwest::Client,
        service: &ServiceDescriptor,
        check: &Check,
    ) -> ProbeResult;
}

/// Looks up a strategy implementation by `check.strategy` (§4.4 step 3).
#[derive(Clone)]
pub struct ProbeStrategyRegistry {
    strategies: HashMap<StrategyKind, Arc<dyn ProbeStrategy>>,
}

impl ProbeStrategyRegistry {
    pub fn with_defaults() -> Self {
        let mut strategies: HashMap<StrategyKind, Arc<dyn ProbeStrategy>> = HashMap::new();
        strategies.insert(StrategyKind::Basic, Arc::new(BasicStrategy));
        strategies.insert(StrategyKind::Authenticated, Arc::new(AuthenticatedStrategy));
        strategies.insert(StrategyKind::Query, Arc::new(QueryStrategy));
        ProbeStrategyRegistry { strategies }
    }

    pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn ProbeStrategy>> {
        self.strategies.get(&kind).cloned()
    }
}

#[derive(Debug, Serialize)]
struct GraphQlRequestBody {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<Value>,
}

/// Result of a raw transport round-trip, before strategy-specific interpretation of
/// the body.
struct RawResponse {
    status: u16,
    body: Option<Value>,
    parse_error: Option<String>,
}

/// Issues the shared GraphQL-shaped POST request used by all three strategies,
/// applying the per-check timeout and converting timeouts/transport errors into the
/// `ProbeResult` shape mandated by §4.2 rather than propagating them.
async fn execute_graphql_request(
    client: &reqwest::Client,
    service: &ServiceDescriptor,
    check: &Check,
    query: String,
    variables: Option<Value>,
    bearer_token: Option<&str>,
) -> Result<RawResponse, ProbeResult> {
    let body = GraphQlRequestBody { query, variables };

    let mut request = client
        .post(&service.url)
        .header("Content-Type", "application/json")
        .json(&body);

    if let Some(token) = bearer_token {
        request = request.bearer_auth(token);
    }

    let outcome = tokio::time::timeout(check.timeout(), request.send()).await;

    let response = match outcome {
        Err(_elapsed) => {
            return Err(ProbeResult {
                success: false,
                has_response: false,
                http_status: 0,
                data: None,
                error: Some("Request timeout".to_string()),
            });
        }
        Ok(Err(transport_err)) => {
            return Err(ProbeResult::transport_failure(describe_transport_error(
                &transport_err,
            )));
        }
        Ok(Ok(response)) => response,
    };

    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(transport_err) => {
            return Err(ProbeResult {
                success: false,
                has_response: true,
                http_status: status,
                data: None,
                error: Some(describe_transport_error(&transport_err)),
            });
        }
    };

    let (body, parse_error) = match serde_json::from_str::<Value>(&text) {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err.to_string())),
    };

    Ok(RawResponse {
        status,
        body,
        parse_error,
    })
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "Request timeout".to_string()
    } else if err.is_connect() {
        format!("Connection failed: {err}")
    } else {
        err.to_string()
    }
}

/// Extracts GraphQL-style `errors[]` messages from a parsed response body, if present
/// and non-empty.
fn graphql_error_messages(body: &Value) -> Vec<String> {
    body.get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn default_query(check: &Check) -> String {
    check
        .query
        .clone()
        .unwrap_or_else(|| "{ __typename }".to_string())
}
