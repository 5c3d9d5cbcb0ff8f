//! HTTP trigger for sync jobs and a pass-through to the Compass query.
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::compass::{MetricsService, QueryVariables};
use crate::db::{MetricSink, ProjectStore};
use crate::sync::{SyncJob, SyncOptions};

pub struct AppState {
    projects: Arc<dyn ProjectStore>,
    remote: Arc<dyn MetricsService>,
    sink: Arc<dyn MetricSink>,
    options: SyncOptions,
    // One job at a time; a second trigger waits for the running job.
    job_lock: Mutex<()>,
}

impl AppState {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        remote: Arc<dyn MetricsService>,
        sink: Arc<dyn MetricSink>,
        options: SyncOptions,
    ) -> Self {
        Self {
            projects,
            remote,
            sink,
            options,
            job_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncAck {
    message: &'static str,
    pages: usize,
    projects: usize,
    records: u64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sync/compass", post(sync_compass))
        .route("/compass/metric-activity", post(metric_activity))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

/// Runs a full job before answering. The request body is ignored.
async fn sync_compass(State(state): State<Arc<AppState>>) -> Response {
    let _guard = state.job_lock.lock().await;
    let job = SyncJob::new(
        state.projects.as_ref(),
        state.remote.as_ref(),
        state.sink.as_ref(),
        state.options,
    );
    match job.run().await {
        Ok(report) => (
            StatusCode::OK,
            Json(SyncAck {
                message: "compass sync complete",
                pages: report.page_count(),
                projects: report.projects_processed(),
                records: report.records_persisted(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!(?err, "compass sync failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("{err:#}") })),
            )
                .into_response()
        }
    }
}

async fn metric_activity(
    State(state): State<Arc<AppState>>,
    Json(variables): Json<QueryVariables>,
) -> Response {
    match state.remote.metric_activity(&variables).await {
        Ok(series) => (StatusCode::OK, Json(json!({ "metricActivity": series }))).into_response(),
        Err(err) => {
            error!(label = %variables.label, %err, "compass query failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
