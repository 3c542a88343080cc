use crate::display::markup;
use crate::metrics::Metrics;
use crate::state::{now_unix, NodeSlot, SlotStatus, State as BoardState};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub state: Arc<RwLock<BoardState>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiNodes {
    pub started_at_unix: i64,
    pub cycles_completed: u64,
    pub last_cycle_finished_unix: Option<i64>,
    pub nodes: Vec<ApiNode>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiNode {
    pub address: String,
    pub status: SlotStatus,
    pub updated_at_unix: Option<i64>,
    pub last_error: Option<String>,
    pub text: String,
}

impl From<&NodeSlot> for ApiNode {
    fn from(value: &NodeSlot) -> Self {
        Self {
            address: value.address.clone(),
            status: value.status,
            updated_at_unix: value.updated_at_unix,
            last_error: value.last_error.clone(),
            text: markup::strip(&value.text),
        }
    }
}

impl From<&BoardState> for ApiNodes {
    fn from(value: &BoardState) -> Self {
        Self {
            started_at_unix: value.started_at_unix,
            cycles_completed: value.cycles_completed,
            last_cycle_finished_unix: value.last_cycle_finished_unix,
            nodes: value.slots.iter().map(ApiNode::from).collect(),
        }
    }
}

pub fn build_router(metrics: Arc<Metrics>, state: Arc<RwLock<BoardState>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/nodes", get(nodes_handler))
        .with_state(HttpAppState { metrics, state })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    state.metrics.update_uptime(now_unix());
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn nodes_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let guard = state.state.read().await;
    Json(ApiNodes::from(&*guard))
}
