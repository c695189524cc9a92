use async_trait::async_trait;

use crate::model::{Check, ProbeResult, ServiceDescriptor};

use super::{default_query, execute_graphql_request, ProbeStrategy};

/// POSTs `{query: check.query || "{ __typename }"}` as JSON. `success = (httpStatus ==
/// 200 && body is valid JSON)`; non-2xx, an unparseable body, or a timeout all map to
/// `success = false` (§4.2).
pub struct BasicStrategy;

#[async_trait]
impl ProbeStrategy for BasicStrategy {
    async fn probe(
        &self,
        client: &reqwest::Client,
        service: &ServiceDescriptor,
        check: &Check,
    ) -> ProbeResult {
        let response = match execute_graphql_request(
            client,
            service,
            check,
            default_query(check),
            None,
            None,
        )
        .await
        {
            Ok(response) => response,
            Err(result) => return result,
        };

        match response.body {
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
        }
    }
}
