use async_trait::async_trait;

use crate::model::{Check, ProbeResult, ServiceDescriptor};

use super::{default_query, execute_graphql_request, graphql_error_messages, ProbeStrategy};

/// Same transport as [`super::BasicStrategy`], adding `Authorization: Bearer <token>`
/// when `service.auth_token` is present, and additionally inspecting any returned
/// GraphQL-style `errors[]` for an authentication-shaped message (§4.2).
pub struct AuthenticatedStrategy;

#[async_trait]
impl ProbeStrategy for AuthenticatedStrategy {
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
            if messages.iter().any(|m| is_auth_error(m)) {
                result.success = false;
                result.error = Some("Authentication error".to_string());
            }
        }

        result
    }
}

fn is_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("auth") || lower.contains("unauthorized")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StrategyKind, Tier};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(url: String, token: Option<&str>) -> ServiceDescriptor {
        ServiceDescriptor {
            name: "svc".into(),
            url,
            tier: Tier::Standard,
            probe_interval: 60,
            checks: vec![],
            auth_token: token.map(str::to_string),
        }
    }

    fn check() -> Check {
        Check {
            name: "health".into(),
            strategy: StrategyKind::Authenticated,
            query: None,
            variables: None,
            timeout_ms: Some(2000),
        }
    }

    #[tokio::test]
    async fn sends_bearer_token_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("Authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result = AuthenticatedStrategy
            .probe(&client, &service(server.uri(), Some("secret-token")), &check())
            .await;

        assert!(result.success);
    }

    #[tokio::test]
    async fn auth_shaped_error_flips_success_to_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{"message": "Unauthorized access"}]
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result = AuthenticatedStrategy
            .probe(&client, &service(server.uri(), None), &check())
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Authentication error"));
    }

    #[tokio::test]
    async fn non_auth_error_does_not_flip_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{"message": "field not found"}]
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result = AuthenticatedStrategy
            .probe(&client, &service(server.uri(), None), &check())
            .await;

        assert!(result.success);
    }
}
