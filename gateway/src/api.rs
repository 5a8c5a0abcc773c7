//! The gateway's own HTTP surface. Thin handlers that translate requests
//! into orchestrator calls; all caching decisions live in [`crate::Gateway`].
use crate::errors::GatewayError;
use crate::gateway::Gateway;
use crate::types::{DueToRecord, NewDueTo, NewPayment, NewUser, UpdatePayload};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/api/users/{user_id}", get(get_user))
        .route("/api/users", post(create_user))
        .route("/api/due_to", get(get_due_to).post(set_due_to))
        .route("/api/payments", post(create_payment))
        .route("/api/update", post(update))
        .route("/api/user_exists", get(user_exists))
        .route("/api/nickname_exists", get(nickname_exists))
        .route("/api/link", get(payment_link))
        .route("/api/health", get(health))
        .with_state(gateway)
}

pub async fn serve(listener: TcpListener, gateway: Gateway) -> Result<(), ApiError> {
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
    /// Set when the user record was committed but payment setup failed, so
    /// callers know to retry only the payment step.
    #[serde(skip_serializing_if = "Option::is_none")]
    user_created: Option<bool>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamRequestFailed(..)
            | GatewayError::UpstreamStatus { .. }
            | GatewayError::InvalidResponse(..)
            | GatewayError::PaymentSetupFailed { .. } => StatusCode::BAD_GATEWAY,
        };

        let user_created = match &self {
            GatewayError::PaymentSetupFailed { .. } => Some(true),
            _ => None,
        };

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
            user_created,
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
}

const SUCCESS: StatusBody = StatusBody { status: "success" };

#[derive(Deserialize)]
struct UserParams {
    target_field: Option<String>,
}

async fn get_user(
    State(gateway): State<Gateway>,
    Path(user_id): Path<i64>,
    Query(params): Query<UserParams>,
) -> Result<Response, GatewayError> {
    let response = match params.target_field {
        Some(field) => Json(gateway.user_field(user_id, &field).await?).into_response(),
        None => Json(gateway.user(user_id).await?).into_response(),
    };
    Ok(response)
}

#[derive(Deserialize)]
struct UserIdParams {
    user_id: i64,
}

async fn get_due_to(
    State(gateway): State<Gateway>,
    Query(params): Query<UserIdParams>,
) -> Result<Json<DueToRecord>, GatewayError> {
    Ok(Json(gateway.due_to(params.user_id).await?))
}

#[derive(Serialize)]
struct ExistsBody {
    exists: bool,
}

async fn user_exists(
    State(gateway): State<Gateway>,
    Query(params): Query<UserIdParams>,
) -> Result<Json<ExistsBody>, GatewayError> {
    let exists = gateway.user_exists(params.user_id).await?;
    Ok(Json(ExistsBody { exists }))
}

#[derive(Deserialize)]
struct NicknameParams {
    nickname: String,
}

async fn nickname_exists(
    State(gateway): State<Gateway>,
    Query(params): Query<NicknameParams>,
) -> Result<Json<ExistsBody>, GatewayError> {
    let exists = gateway.nickname_exists(&params.nickname).await?;
    Ok(Json(ExistsBody { exists }))
}

#[derive(Serialize)]
struct LinkBody {
    link: Option<String>,
}

async fn payment_link(
    State(gateway): State<Gateway>,
    Query(params): Query<UserIdParams>,
) -> Result<Json<LinkBody>, GatewayError> {
    let link = gateway.payment_link(params.user_id).await?;
    Ok(Json(LinkBody { link }))
}

async fn health(State(gateway): State<Gateway>) -> Result<StatusCode, GatewayError> {
    gateway.health().await?;
    Ok(StatusCode::OK)
}

async fn create_user(
    State(gateway): State<Gateway>,
    Json(user): Json<NewUser>,
) -> Result<Json<StatusBody>, GatewayError> {
    gateway.create_user(&user).await?;
    Ok(Json(SUCCESS))
}

async fn create_payment(
    State(gateway): State<Gateway>,
    Json(payment): Json<NewPayment>,
) -> Result<Json<StatusBody>, GatewayError> {
    gateway.create_payment(&payment).await?;
    Ok(Json(SUCCESS))
}

async fn update(
    State(gateway): State<Gateway>,
    Json(payload): Json<UpdatePayload>,
) -> Result<Json<StatusBody>, GatewayError> {
    gateway.update(&payload).await?;
    Ok(Json(SUCCESS))
}

async fn set_due_to(
    State(gateway): State<Gateway>,
    Json(due_to): Json<NewDueTo>,
) -> Result<Json<StatusBody>, GatewayError> {
    gateway.set_due_to(&due_to).await?;
    Ok(Json(SUCCESS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::config::{CacheConfig, Config, Listener, PaymentDefaults, ServiceConfig, Timeouts};
    use crate::testutils::MockBackend;
    use std::net::SocketAddr;
    use std::sync::Arc;

    async fn serve_api(data: &MockBackend, payments: &MockBackend) -> SocketAddr {
        let config = Config {
            listener: Listener::default(),
            data_service: ServiceConfig {
                url: data.url(),
                prefix: String::new(),
            },
            payment_service: ServiceConfig {
                url: payments.url(),
                prefix: String::new(),
            },
            cache: CacheConfig::Memory,
            timeouts: Timeouts::default(),
            payment_defaults: PaymentDefaults::default(),
        };
        let gateway = Gateway::new(&config, Arc::new(MemoryStore::default()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(gateway);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_health_passes_through() {
        let data = MockBackend::spawn().await;
        let payments = MockBackend::spawn().await;
        data.respond("GET", "/health", 200, r#"{"status": "ok"}"#);

        let addr = serve_api(&data, &payments).await;
        let response = reqwest::get(format!("http://{addr}/api/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_partial_saga_failure_is_distinguishable() {
        let data = MockBackend::spawn().await;
        let payments = MockBackend::spawn().await;
        data.respond("POST", "/users", 200, r#"{"status": "ok"}"#);
        payments.respond("POST", "/add", 500, "ledger unavailable");

        let addr = serve_api(&data, &payments).await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{addr}/api/users"))
            .json(&serde_json::json!({
                "user_id": 42,
                "username": "sam",
                "camefrom": "organic",
                "first_name": "Sam",
                "language": "en",
                "fluency": 3,
                "topics": ["music"],
                "lang_code": "en-US"
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["user_created"], true);
        assert!(
            body["error_message"]
                .as_str()
                .unwrap()
                .contains("payment setup failed")
        );
    }

    #[tokio::test]
    async fn test_due_to_read_roundtrip() {
        let data = MockBackend::spawn().await;
        let payments = MockBackend::spawn().await;
        payments.respond("GET", "/due_to", 200, r#"{"rent": "2024-05-01"}"#);

        let addr = serve_api(&data, &payments).await;
        let response = reqwest::get(format!("http://{addr}/api/due_to?user_id=7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["rent"], "2024-05-01");
    }
}
