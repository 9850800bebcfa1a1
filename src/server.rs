//! HTTP surface: health check, webhook intake, position snapshot.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::db::StateMap;
use crate::error::SignalError;
use crate::models::{PositionSide, WebhookRequest};
use crate::trading::{SignalOutcome, SignalProcessor};

pub fn router(processor: Arc<SignalProcessor>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook", post(webhook))
        .route("/positions", get(positions))
        .layer(TraceLayer::new_for_http())
        .with_state(processor)
}

/// Successful webhook reply.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WebhookResponse {
    Entered {
        ok: bool,
        symbol: String,
        side: PositionSide,
        step: i64,
        #[serde(with = "rust_decimal::serde::float")]
        filled_qty: Decimal,
        #[serde(with = "rust_decimal::serde::float")]
        qty: Decimal,
        #[serde(with = "rust_decimal::serde::float")]
        avg: Decimal,
        #[serde(with = "rust_decimal::serde::float")]
        tp: Decimal,
        tp_order_id: Option<String>,
    },
    Closed {
        ok: bool,
        symbol: String,
        result: &'static str,
    },
}

impl From<SignalOutcome> for WebhookResponse {
    fn from(outcome: SignalOutcome) -> Self {
        match outcome {
            SignalOutcome::Entered {
                symbol,
                side,
                step,
                filled_qty,
                qty,
                avg,
                tp,
                tp_order_id,
            } => WebhookResponse::Entered {
                ok: true,
                symbol,
                side,
                step,
                filled_qty,
                qty,
                avg,
                tp,
                tp_order_id,
            },
            SignalOutcome::Closed { symbol, .. } => WebhookResponse::Closed {
                ok: true,
                symbol,
                result: "closed",
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct PositionsResponse {
    ok: bool,
    positions: StateMap,
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({"ok": false, "error": self.to_string()}))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"ok": true, "msg": "bot running"}))
}

/// The body is parsed by hand so malformed JSON is reported in the usual
/// `{"ok": false, "error": ...}` shape.
async fn webhook(
    State(processor): State<Arc<SignalProcessor>>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, SignalError> {
    let request: WebhookRequest = serde_json::from_slice(&body)
        .map_err(|e| SignalError::BadRequest(format!("invalid JSON body: {}", e)))?;

    let outcome = processor.process(request).await?;
    Ok(Json(outcome.into()))
}

async fn positions(
    State(processor): State<Arc<SignalProcessor>>,
) -> Result<Json<PositionsResponse>, SignalError> {
    let positions = processor.positions().await?;
    Ok(Json(PositionsResponse {
        ok: true,
        positions,
    }))
}
