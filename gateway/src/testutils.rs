//! In-process mock backends for exercising the gateway in tests.
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::response::Response;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
}

#[derive(Clone, Debug)]
struct CannedResponse {
    status: u16,
    body: String,
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<HashMap<String, CannedResponse>>,
}

/// A backend bound to an ephemeral port, serving canned responses and
/// recording every request it sees. Unknown routes get a 404.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend addr");

        let state = Arc::new(MockState::default());
        let app = axum::Router::new()
            .fallback(handle_any)
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        MockBackend {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> url::Url {
        url::Url::parse(&format!("http://{}", self.addr)).expect("mock backend url")
    }

    pub fn respond(&self, method: &str, path: &str, status: u16, body: &str) {
        self.state.responses.lock().insert(
            route_key(method, path),
            CannedResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|call| call.path == path)
            .count()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn route_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}

async fn handle_any(State(state): State<Arc<MockState>>, request: Request) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_else(|_| Bytes::new());

    state.calls.lock().push(RecordedCall {
        method: method.clone(),
        path: path.clone(),
        query,
        body: String::from_utf8_lossy(&body).to_string(),
    });

    let canned = state.responses.lock().get(&route_key(&method, &path)).cloned();
    match canned {
        Some(response) => Response::builder()
            .status(response.status)
            .header("content-type", "application/json")
            .body(Body::from(response.body))
            .expect("mock response"),
        None => Response::builder()
            .status(404)
            .body(Body::from("no canned response"))
            .expect("mock response"),
    }
}
