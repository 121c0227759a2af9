//! The request/response contract between clients and the coordinator.

use serde::{Deserialize, Serialize};

use crate::{ClientId, SubmissionMetrics, WeightVector};

pub const REGISTER_PATH: &str = "/register_client";
pub const GLOBAL_MODEL_PATH: &str = "/global_model";
pub const CLIENT_UPDATE_PATH: &str = "/client_update";
pub const STATUS_PATH: &str = "/status";

/// The outcome tag every response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

/// Body of a client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub client_id: ClientId,
}

/// A bare acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub status: Status,
}

impl Ack {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
        }
    }
}

/// The current global snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalModelResponse {
    pub weights: WeightVector,
    #[serde(default)]
    pub round: u64,
}

/// Locally trained parameters submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientUpdateRequest {
    pub client_id: ClientId,
    pub weights: WeightVector,
    #[serde(default)]
    pub metrics: Option<SubmissionMetrics>,
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub status: Status,
    /// The round the submission was recorded in.
    #[serde(default)]
    pub round: u64,
    /// Whether this submission completed the round's barrier.
    #[serde(default)]
    pub aggregated: bool,
}

/// The kind of failure a coordinator reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnregisteredClient,
    ShapeMismatch,
    EmptyAggregation,
    Internal,
}

/// Body of every failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: Status,
    pub kind: ErrorKind,
    pub error: String,
}

/// Where a round is in it's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Waiting,
    Aggregating,
    Complete,
}

/// How a round was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Every expected client submitted.
    Aggregated,
    /// The round timed out and the submitted subset was averaged.
    PartialAggregated,
    /// The round timed out and was discarded, the global snapshot is unchanged.
    Failed,
}

/// The record of a finished round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRound {
    pub round: u64,
    pub status: RoundStatus,
    pub outcome: RoundOutcome,
    pub participants: Vec<ClientId>,
    pub missing: Vec<ClientId>,
    pub mean_metrics: SubmissionMetrics,
}

/// Observability view of the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub round: u64,
    pub status: RoundStatus,
    pub registered: Vec<ClientId>,
    pub expected: Vec<ClientId>,
    pub received: Vec<ClientId>,
    pub last_completed: Option<CompletedRound>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_without_metrics() {
        let req: ClientUpdateRequest =
            serde_json::from_str(r#"{"client_id": 3, "weights": [[1.0, 2.0]]}"#).unwrap();

        assert_eq!(req.client_id, 3);
        assert!(req.metrics.is_none());
        assert_eq!(req.weights.shape_signature().layers(), &[vec![2]]);
    }

    #[test]
    fn ack_is_the_success_contract() {
        let json = serde_json::to_string(&Ack::success()).unwrap();
        assert_eq!(json, r#"{"status":"success"}"#);
    }

    #[test]
    fn snapshot_without_round_defaults_to_zero() {
        let resp: GlobalModelResponse = serde_json::from_str(r#"{"weights": [[0.0]]}"#).unwrap();
        assert_eq!(resp.round, 0);
    }
}
