//! The coordinator's HTTP surface.

use std::{
    fmt::{self, Display},
    sync::Arc,
};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use comms::{
    WeightVector,
    msg::{
        Ack, CLIENT_UPDATE_PATH, ClientUpdateRequest, ErrorKind, ErrorResponse,
        GLOBAL_MODEL_PATH, REGISTER_PATH, RegisterRequest, STATUS_PATH, Status, StatusResponse,
        UpdateResponse,
    },
};
use log::{debug, error, info};
use serde::Serialize;
use tokio::task;

use crate::{RoundCoordinator, error::CoordinatorErr};

/// Errors a handler answers with.
#[derive(Debug)]
pub enum ServiceErr {
    Coordinator(CoordinatorErr),
    /// The blocking task handling the request died.
    Internal(String),
}

impl From<CoordinatorErr> for ServiceErr {
    fn from(value: CoordinatorErr) -> Self {
        Self::Coordinator(value)
    }
}

impl From<task::JoinError> for ServiceErr {
    fn from(value: task::JoinError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl Display for ServiceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinator(e) => e.fmt(f),
            Self::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl IntoResponse for ServiceErr {
    fn into_response(self) -> Response {
        let (code, kind) = match &self {
            Self::Coordinator(e) => {
                let code = match e {
                    CoordinatorErr::UnregisteredClient(_) => StatusCode::NOT_FOUND,
                    CoordinatorErr::ShapeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    CoordinatorErr::EmptyAggregation { .. }
                    | CoordinatorErr::InconsistentRound { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (code, e.kind())
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal),
        };

        let body = ErrorResponse {
            status: Status::Error,
            kind,
            error: self.to_string(),
        };

        (code, Json(body)).into_response()
    }
}

/// Builds the coordinator's router.
///
/// # Arguments
/// * `coordinator` - The shared round coordinator.
/// * `max_body_bytes` - The largest request body accepted, weight vectors can be big.
pub fn router(coordinator: Arc<RoundCoordinator>, max_body_bytes: usize) -> Router {
    Router::new()
        .route(REGISTER_PATH, post(register_client))
        .route(GLOBAL_MODEL_PATH, get(global_model))
        .route(CLIENT_UPDATE_PATH, post(client_update))
        .route(STATUS_PATH, get(status))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(coordinator)
}

async fn register_client(
    State(coordinator): State<Arc<RoundCoordinator>>,
    Json(req): Json<RegisterRequest>,
) -> Json<Ack> {
    info!(client_id = req.client_id; "registration request");
    coordinator.register(req.client_id);
    Json(Ack::success())
}

/// Same layout as `GlobalModelResponse`, borrowing the snapshot instead of cloning it.
#[derive(Serialize)]
struct GlobalModelBody<'a> {
    weights: &'a WeightVector,
    round: u64,
}

async fn global_model(State(coordinator): State<Arc<RoundCoordinator>>) -> Response {
    let snapshot = coordinator.distribute_global_model();
    debug!(round = snapshot.round; "distributing global model");

    let body = GlobalModelBody {
        weights: &snapshot.weights,
        round: snapshot.round,
    };
    Json(body).into_response()
}

async fn client_update(
    State(coordinator): State<Arc<RoundCoordinator>>,
    Json(req): Json<ClientUpdateRequest>,
) -> Result<Json<UpdateResponse>, ServiceErr> {
    let ClientUpdateRequest {
        client_id,
        weights,
        metrics,
    } = req;
    debug!(client_id = client_id; "update request");

    // Closing a round averages every submission, keep that off the async workers.
    let receipt = task::spawn_blocking(move || {
        coordinator.receive_client_update(client_id, weights, metrics.unwrap_or_default())
    })
    .await?
    .inspect_err(|e| {
        if matches!(e.kind(), ErrorKind::EmptyAggregation | ErrorKind::Internal) {
            error!(client_id = client_id; "{e}");
        }
    })?;

    Ok(Json(UpdateResponse {
        status: Status::Success,
        round: receipt.round,
        aggregated: receipt.completed.is_some(),
    }))
}

async fn status(State(coordinator): State<Arc<RoundCoordinator>>) -> Json<StatusResponse> {
    Json(coordinator.round_view())
}
