//! HTTP clients for the two backend services.
//!
//! Status contract shared by both backends: 200 carries a JSON body, 405 is
//! a deliberate "no data" signal rather than an error, anything else is a
//! failure with the body echoed for diagnosis. Reads and writes use
//! independent per-request timeouts.
use crate::config::{ServiceConfig, Timeouts};
use crate::errors::{GatewayError, Result};
use crate::types::{DueToRecord, NewDueTo, NewPayment, NewUser, ProfileUpdate, UserData};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DATA_SERVICE: &str = "data-service";
pub const PAYMENT_SERVICE: &str = "payment-service";

/// Outcome of a write whose HTTP exchange completed. The backend may still
/// have reported a logical failure; the caller decides what that means,
/// after it has invalidated whatever the write may have superseded.
#[derive(Debug)]
pub struct WriteAck {
    pub status: StatusCode,
    pub body: String,
}

impl WriteAck {
    pub fn is_failure(&self) -> bool {
        !(self.status.is_success() || self.status == StatusCode::METHOD_NOT_ALLOWED)
    }
}

#[derive(Clone)]
struct Backend {
    name: &'static str,
    client: reqwest::Client,
    base: String,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl Backend {
    fn new(name: &'static str, config: &ServiceConfig, timeouts: &Timeouts) -> Self {
        let base = format!(
            "{}{}",
            config.url.as_str().trim_end_matches('/'),
            config.prefix
        );

        Backend {
            name,
            client: reqwest::Client::new(),
            base,
            read_timeout: timeouts.read(),
            write_timeout: timeouts.write(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// GET with the read timeout. Ok(None) is the deliberate empty result.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(query)
            .timeout(self.read_timeout)
            .send()
            .await
            .map_err(|e| transport_error(self.name, e))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .json::<T>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(self.name, e.to_string()))?;
                Ok(Some(body))
            }
            StatusCode::METHOD_NOT_ALLOWED => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::UpstreamStatus {
                    service: self.name,
                    status,
                    body,
                })
            }
        }
    }

    /// POST with the write timeout. Any completed exchange returns an ack;
    /// only transport-level failure is an error.
    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<WriteAck> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .timeout(self.write_timeout)
            .send()
            .await
            .map_err(|e| transport_error(self.name, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(WriteAck { status, body })
    }
}

fn transport_error(service: &'static str, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::UpstreamTimeout(service)
    } else {
        GatewayError::UpstreamRequestFailed(service, err.to_string())
    }
}

#[derive(Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Deserialize)]
struct LinkResponse {
    link: String,
}

/// Client for the user/profile data service.
#[derive(Clone)]
pub struct DataService {
    backend: Backend,
}

impl DataService {
    pub fn new(config: &ServiceConfig, timeouts: &Timeouts) -> Self {
        DataService {
            backend: Backend::new(DATA_SERVICE, config, timeouts),
        }
    }

    pub async fn fetch_user(&self, user_id: i64) -> Result<Option<UserData>> {
        self.backend
            .get_json("/users", &[("user_id", user_id.to_string())])
            .await
    }

    /// Fetches just one field of the user. The backend answers with an
    /// object containing the requested field.
    pub async fn fetch_user_field(
        &self,
        user_id: i64,
        target_field: &str,
    ) -> Result<Option<serde_json::Value>> {
        let query = [
            ("user_id", user_id.to_string()),
            ("target_field", target_field.to_string()),
        ];
        let body: Option<serde_json::Value> = self.backend.get_json("/users", &query).await?;
        Ok(body.and_then(|v| v.get(target_field).cloned()))
    }

    pub async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let body: Option<ExistsResponse> = self
            .backend
            .get_json("/user_exists", &[("user_id", user_id.to_string())])
            .await?;
        Ok(body.is_some_and(|r| r.exists))
    }

    pub async fn nickname_exists(&self, nickname: &str) -> Result<bool> {
        let body: Option<ExistsResponse> = self
            .backend
            .get_json("/nickname_exists", &[("nickname", nickname.to_string())])
            .await?;
        Ok(body.is_some_and(|r| r.exists))
    }

    pub async fn post_user(&self, user: &NewUser) -> Result<WriteAck> {
        self.backend.post_json("/users", user).await
    }

    pub async fn post_profile(&self, profile: &ProfileUpdate) -> Result<WriteAck> {
        self.backend.post_json("/profiles", profile).await
    }

    pub async fn health(&self) -> Result<()> {
        let _: Option<serde_json::Value> = self.backend.get_json("/health", &[]).await?;
        Ok(())
    }
}

/// Client for the payment service.
#[derive(Clone)]
pub struct PaymentService {
    backend: Backend,
}

impl PaymentService {
    pub fn new(config: &ServiceConfig, timeouts: &Timeouts) -> Self {
        PaymentService {
            backend: Backend::new(PAYMENT_SERVICE, config, timeouts),
        }
    }

    pub async fn due_to(&self, user_id: i64) -> Result<Option<DueToRecord>> {
        self.backend
            .get_json("/due_to", &[("user_id", user_id.to_string())])
            .await
    }

    pub async fn payment_link(&self, user_id: i64) -> Result<Option<String>> {
        let body: Option<LinkResponse> = self
            .backend
            .get_json("/link", &[("user_id", user_id.to_string())])
            .await?;
        Ok(body.map(|r| r.link))
    }

    pub async fn add_payment(&self, payment: &NewPayment) -> Result<WriteAck> {
        self.backend.post_json("/add", payment).await
    }

    pub async fn post_due_to(&self, due_to: &NewDueTo) -> Result<WriteAck> {
        self.backend.post_json("/due_to", due_to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::testutils::MockBackend;

    fn service_config(url: url::Url, prefix: &str) -> ServiceConfig {
        ServiceConfig {
            url,
            prefix: prefix.into(),
        }
    }

    #[tokio::test]
    async fn test_get_decodes_success_body() {
        let server = MockBackend::spawn().await;
        server.respond("GET", "/v1/user_exists", 200, r#"{"exists": true}"#);

        let client = DataService::new(&service_config(server.url(), "/v1"), &Timeouts::default());
        assert!(client.user_exists(7).await.unwrap());

        let call = &server.calls()[0];
        assert_eq!(call.path, "/v1/user_exists");
        assert_eq!(call.query, "user_id=7");
    }

    #[tokio::test]
    async fn test_405_is_an_empty_result() {
        let server = MockBackend::spawn().await;
        server.respond("GET", "/link", 405, "");

        let client = PaymentService::new(&service_config(server.url(), ""), &Timeouts::default());
        assert_eq!(client.payment_link(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_status_echoes_body() {
        let server = MockBackend::spawn().await;
        server.respond("GET", "/users", 500, "database exploded");

        let client = DataService::new(&service_config(server.url(), ""), &Timeouts::default());
        let err = client.fetch_user(7).await.unwrap_err();

        match err {
            GatewayError::UpstreamStatus {
                service,
                status,
                body,
            } => {
                assert_eq!(service, DATA_SERVICE);
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "database exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure() {
        // Bind and drop a listener so the port is closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = url::Url::parse(&format!("http://{addr}")).unwrap();
        let client = DataService::new(&service_config(url, ""), &Timeouts::default());

        assert!(matches!(
            client.fetch_user(7).await.unwrap_err(),
            GatewayError::UpstreamRequestFailed(DATA_SERVICE, _)
        ));
    }

    #[tokio::test]
    async fn test_write_ack_carries_logical_failure() {
        let server = MockBackend::spawn().await;
        server.respond("POST", "/add", 409, r#"{"status": "duplicate"}"#);

        let client = PaymentService::new(&service_config(server.url(), ""), &Timeouts::default());
        let payment = NewPayment::from_defaults(42, &crate::config::PaymentDefaults::default());
        let ack = client.add_payment(&payment).await.unwrap();

        assert!(ack.is_failure());
        assert_eq!(ack.status, StatusCode::CONFLICT);
        assert!(ack.body.contains("duplicate"));
    }
}
