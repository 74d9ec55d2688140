use std::time::Duration;

use gatekeep_core::{Authenticator, Principal, VerificationError, constants::AUTHENTICATION_KEY};
use reqwest::{Client, StatusCode, Url};
use serde_json::{Map, Value};

const AUTHENTICATE_PATH: &str = "authenticate";

/// Verifies credentials against the service's own `authenticate` endpoint.
///
/// The credential is posted as `{"Authentication": "<credential>"}`; the
/// endpoint answers with the principal or with 401/403.
pub struct HttpAuthenticator {
    http_client: Client,
    endpoint: Url,
}

impl HttpAuthenticator {
    pub fn new(base_url: &str, http_client: Client) -> Result<Self, VerificationError> {
        let base = Url::parse(base_url).map_err(|e| VerificationError::Transport(e.to_string()))?;
        let endpoint = base
            .join(AUTHENTICATE_PATH)
            .map_err(|e| VerificationError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            endpoint,
        })
    }

    /// Build with a dedicated client bounded by `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, VerificationError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerificationError::Transport(e.to_string()))?;
        Self::new(base_url, http_client)
    }
}

#[async_trait::async_trait]
impl Authenticator for HttpAuthenticator {
    #[tracing::instrument(name = "Verifying credential remotely", skip_all, fields(endpoint = %self.endpoint))]
    async fn verify(&self, credential: &str) -> Result<Principal, VerificationError> {
        let mut body = Map::new();
        body.insert(AUTHENTICATION_KEY.to_owned(), Value::from(credential));

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| VerificationError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(VerificationError::Rejected(response.status().to_string()));
            }
            status if !status.is_success() => {
                return Err(VerificationError::Transport(format!(
                    "authenticate endpoint answered {status}"
                )));
            }
            _ => {}
        }

        response
            .json::<Principal>()
            .await
            .map_err(|e| VerificationError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    fn principal_body() -> Value {
        json!({
            "id": "u-1",
            "email": "ada@example.com",
            "roles": ["user"],
            "created": 1_700_000_000,
            "expires": 1_700_003_600,
        })
    }

    async fn authenticator(server: &MockServer) -> HttpAuthenticator {
        HttpAuthenticator::with_timeout(&server.uri(), Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_credential_resolves_principal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .and(body_json(json!({ "Authentication": "jwt" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(principal_body()))
            .expect(1)
            .mount(&server)
            .await;

        let principal = authenticator(&server).await.verify("jwt").await.unwrap();

        assert_eq!(principal.email, "ada@example.com");
        assert_eq!(principal.roles, ["user"]);
    }

    #[tokio::test]
    async fn test_unauthorized_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = authenticator(&server).await.verify("forged").await;
        assert!(matches!(result, Err(VerificationError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = authenticator(&server).await.verify("jwt").await;
        assert!(matches!(result, Err(VerificationError::Transport(_))));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(principal_body())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let result = authenticator(&server).await.verify("jwt").await;
        assert!(matches!(result, Err(VerificationError::Transport(_))));
    }

    #[tokio::test]
    async fn test_unexpected_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "nope": true })))
            .mount(&server)
            .await;

        let result = authenticator(&server).await.verify("jwt").await;
        assert!(matches!(result, Err(VerificationError::Malformed(_))));
    }
}
