//! HTTP surface over [`Coordinator::snapshot`].
//!
//! `GET /get/{distribution}/{ref}.json` and `.yaml` return the snapshot
//! document; the ref may contain slashes.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use distrocache_core::{Coordinator, DistroError, ResolveError};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::{
    error::{CliError, CliResult},
    utils::{error_chain, OutputFormat},
};

#[derive(Clone)]
pub struct AppState {
    coordinator: Coordinator,
}

pub fn router(coordinator: Coordinator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/get/{distribution}/{*path}", get(get_snapshot))
        .with_state(AppState {
            coordinator,
        })
}

/// Serves until interrupted, then lets in-flight requests finish.
pub async fn serve(coordinator: Coordinator, host: &str, port: u16) -> CliResult<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await.map_err(|source| {
        CliError::Bind {
            addr: addr.clone(),
            source,
        }
    })?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(CliError::Serve)?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "unable to listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    debug!("shutdown requested");
}

async fn health() -> &'static str {
    "ok"
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path((distribution, path)): Path<(String, String)>,
) -> Response {
    let Some((set_ref, format)) = OutputFormat::split_extension(&path) else {
        return ErrorBody::new(format!("Could not find {path}"))
            .into_response(StatusCode::NOT_FOUND);
    };

    let snapshot = match state.coordinator.snapshot(&distribution, set_ref).await {
        Ok(snapshot) => snapshot,
        Err(err) => return error_response(&distribution, set_ref, err),
    };

    let body = match format.render(&snapshot) {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to encode snapshot");
            return ErrorBody::new(err.to_string())
                .into_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let filename = path.replace('/', "-");

    (
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, format.content_disposition(&filename)),
        ],
        body,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct FailureBody {
    name: String,
    kind: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<FailureBody>,
}

impl ErrorBody {
    fn new(error: String) -> Self {
        Self {
            error,
            failures: Vec::new(),
        }
    }

    fn into_response(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

fn status_for(err: &DistroError) -> StatusCode {
    match err {
        _ if err.is_not_found() => StatusCode::NOT_FOUND,
        DistroError::Store(_)
        | DistroError::Config(_)
        | DistroError::Io { .. }
        | DistroError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(distribution: &str, set_ref: &str, err: ResolveError) -> Response {
    match err {
        ResolveError::Entries {
            failures,
            total,
        } => {
            warn!(
                distribution,
                set_ref,
                failed = failures.len(),
                total,
                "snapshot incomplete"
            );
            let error = format!("{} of {total} repositories could not be resolved", failures.len());
            ErrorBody {
                error,
                failures: failures
                    .into_iter()
                    .map(|failure| {
                        FailureBody {
                            message: error_chain(failure.error.as_ref()),
                            name: failure.name,
                            kind: failure.error.category().to_string(),
                        }
                    })
                    .collect(),
            }
            .into_response(StatusCode::BAD_GATEWAY)
        }
        ResolveError::Distro(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                error!(distribution, set_ref, error = %error_chain(&err), "snapshot failed");
            } else {
                debug!(distribution, set_ref, error = %err, "snapshot not found");
            }
            ErrorBody::new(error_chain(&err)).into_response(status)
        }
    }
}
