//! Inbound HTTP trigger.
//!
//! - `GET /health` reports liveness.
//! - `GET|POST /replywithorderid?orderid=<id>` runs the review-reply task for
//!   one order and streams its progress lines back as plain text. A failure
//!   is appended as the last line.

use std::convert::Infallible;
use std::sync::LazyLock;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use regex::Regex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::Context;
use crate::error::ServerError;
use crate::jobs::Services;
use crate::task::Executable;

static ORDER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^P?\d+$").expect("order id pattern is valid"));

#[derive(Clone)]
pub struct AppState {
    services: Services,
    root: Context,
    request_timeout: Duration,
}

/// Build the router. Runs started by requests are children of `root`.
pub fn routes(services: Services, root: Context, request_timeout: Duration) -> Router {
    let state = AppState {
        services,
        root,
        request_timeout,
    };

    Router::new()
        .route("/health", get(health))
        .route(
            "/replywithorderid",
            get(reply_with_order_id).post(reply_with_order_id),
        )
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Bind the listener on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener, ServerError> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| ServerError::Bind {
            port,
            reason: e.to_string(),
        })
}

/// Serve `app` until `root` is cancelled, then drain in-flight requests.
pub async fn serve(listener: TcpListener, app: Router, root: Context) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let cause = root.cancelled().await;
            info!(%cause, "HTTP server shutting down");
        })
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pulse-check"
    }))
}

#[derive(Debug, Deserialize)]
struct ReplyQuery {
    orderid: Option<String>,
}

fn plain_text(status: StatusCode, body: impl Into<Body>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

async fn reply_with_order_id(
    State(state): State<AppState>,
    Query(query): Query<ReplyQuery>,
) -> Response {
    let order_id = query.orderid.unwrap_or_default();
    let order_id = order_id.trim();
    if order_id.is_empty() {
        return plain_text(StatusCode::BAD_REQUEST, "orderid param not set properly\n");
    }
    if !ORDER_ID.is_match(order_id) {
        warn!(order_id, "Rejected malformed order id");
        return plain_text(
            StatusCode::BAD_REQUEST,
            format!("orderid {order_id:?} is not a valid order id\n"),
        );
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = state.root.with_timeout(state.request_timeout).with_progress(tx);
    let task = state.services.order_reply(order_id);
    let order_id = order_id.to_string();
    let run_id = Uuid::new_v4();

    tokio::spawn(async move {
        info!(%run_id, order_id = %order_id, "Reply run started");
        match task.execute(&ctx).await {
            Ok(()) => {
                info!(%run_id, "Reply run finished");
                ctx.report("done");
            }
            Err(e) => {
                warn!(%run_id, order_id = %order_id, error = %e, "Reply run failed");
                ctx.report(format!("error: {e}"));
            }
        }
        // Dropping the last sender ends the response body.
    });

    let lines = UnboundedReceiverStream::new(rx).map(|line| Ok::<_, Infallible>(format!("{line}\n")));
    plain_text(StatusCode::OK, Body::from_stream(lines))
}
