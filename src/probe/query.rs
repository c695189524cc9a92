use async_trait::async_trait;

use crate::model::{Check, ProbeResult, ServiceDescriptor};

use super::{execute_graphql_request, graphql_error_messages, ProbeStrategy};

/// Like [`super::AuthenticatedStrategy`] but sends the caller-supplied
/// `check.query`/`check.variables` and marks `success = false` whenever the response
/// body carries a non-empty GraphQL-style `errors[]`, surfacing the first error
/// message regardless of its content (§4.2).
pub struct QueryStrategy;

#[async_trait]
impl ProbeStrategy for QueryStrategy {
    async fn probe(
        &self,
        client: &reqwest::Client,
        service: &ServiceDescriptor,
        check: &Check,
    ) -> ProbeResult {
        let query = check
            .query
            .clone()
            .unwrap_or_else(|| "{ __typename }".to_string());

        let response = match execute_graphql_request(
            client,
            service,
            check,
            query,
            check.variables.clone(),
            service.auth_token.as_deref(),
        )
        .await
        {
            Ok(response) => response,
            Err(result) => return result,
        };

        let mut result = match response.body.clone() {
            Some(body) if response.status == 200 => ProbeResult {
                success: true,
                has_response: true,
                http_status: response.status,
                data: Some(body),
                error: None,
            },
            Some(body) => ProbeResult {
                success: false,
                has_response: true,
                http_status: response.status,
                data: Some(body),
                error: Some(format!("unexpected status {}", response.status)),
            },
            None => ProbeResult {
                success: false,
                has_response: true,
                http_status: response.status,
                data: None,
                error: response.parse_error,
            },
        };

        if let Some(body) = &response.body {
            let messages = graphql_error_messages(body);
            if let Some(first) = messages.first() {
                result.success = false;
                result.error = Some(first.clone());
            }
        }

        result
    }
}
