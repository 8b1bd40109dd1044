//! HTTP trigger for the scheduler.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::pipeline::{Pipeline, PipelineError};

pub const PUBLISH_PATH: &str = "/api/cron/publish";
pub const HEALTHZ_PATH: &str = "/healthz";

#[derive(Debug, Serialize)]
struct PublishResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    published: usize,
    revalidation_failures: usize,
    indexing_failures: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route(PUBLISH_PATH, get(publish).post(publish))
        .route(HEALTHZ_PATH, get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn publish(State(pipeline): State<Arc<Pipeline>>, headers: HeaderMap) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    match pipeline.run(authorization).await {
        Ok(summary) => Json(PublishResponse {
            message: (summary.published_count == 0).then_some("No drafts to publish"),
            published: summary.published_count,
            revalidation_failures: summary.revalidation_failures,
            indexing_failures: summary.indexing_failures,
        })
        .into_response(),
        Err(PipelineError::Unauthorized) => {
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
        Err(PipelineError::Store(err)) => {
            error!(%err, "publish run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Serve `app` on `listen_addr` until Ctrl-C.
pub async fn serve(listen_addr: &str, app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = listen_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}
