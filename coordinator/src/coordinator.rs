use std::{collections::BTreeSet, sync::Arc, time::Instant};

use comms::{
    ClientId, SubmissionMetrics, WeightVector,
    msg::{CompletedRound, RoundOutcome, StatusResponse},
};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::{
    aggregation::{self, AggregationErr},
    config::{RoundPolicy, TimeoutAction},
    error::CoordinatorErr,
    registry::ClientRegistry,
    round::{RoundState, Submission},
};

/// An immutable view of the global model as of the start of a round.
#[derive(Debug, Clone)]
pub struct GlobalSnapshot {
    pub round: u64,
    pub weights: Arc<WeightVector>,
}

/// The result of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    /// The round the submission was recorded in.
    pub round: u64,
    /// Whether it replaced an earlier submission of the same client.
    pub resubmitted: bool,
    /// The record of the round, if this submission closed it.
    pub completed: Option<CompletedRound>,
}

struct Inner {
    registry: ClientRegistry,
    round: RoundState,
    history: Vec<CompletedRound>,
}

/// Drives the synchronous federated rounds.
///
/// Registration, submissions and aggregation are serialized by a single lock, so a round is
/// closed exactly once. Readers of the global model only take the snapshot lock long enough
/// to clone an `Arc`, they never wait on an aggregation.
pub struct RoundCoordinator {
    inner: Mutex<Inner>,
    snapshot: RwLock<GlobalSnapshot>,
    policy: RoundPolicy,
}

impl RoundCoordinator {
    /// Creates a new `RoundCoordinator` at round 0.
    ///
    /// # Arguments
    /// * `initial` - The initial global model.
    /// * `policy` - The round deadline policy.
    pub fn new(initial: WeightVector, policy: RoundPolicy) -> Self {
        let weights = Arc::new(initial);

        let inner = Inner {
            registry: ClientRegistry::new(),
            round: RoundState::new(0, Arc::clone(&weights)),
            history: Vec::new(),
        };

        Self {
            inner: Mutex::new(inner),
            snapshot: RwLock::new(GlobalSnapshot { round: 0, weights }),
            policy,
        }
    }

    pub fn policy(&self) -> &RoundPolicy {
        &self.policy
    }

    /// Registers a client, registering it twice is a no-op.
    ///
    /// # Returns
    /// Whether the client was newly added.
    pub fn register(&self, client_id: ClientId) -> bool {
        let mut inner = self.inner.lock();
        let added = inner.registry.register(client_id);

        if added {
            info!(client_id = client_id, registered = inner.registry.len(); "client registered");
        } else {
            debug!(client_id = client_id; "client already registered");
        }

        added
    }

    pub fn is_registered(&self, client_id: ClientId) -> bool {
        self.inner.lock().registry.is_registered(client_id)
    }

    /// The clients the current round waits for.
    ///
    /// Before the barrier forms that's every registered client.
    pub fn expected_ids(&self) -> BTreeSet<ClientId> {
        let inner = self.inner.lock();
        match inner.round.expected() {
            Some(expected) => expected.clone(),
            None => inner.registry.ids(),
        }
    }

    /// Returns the current global model.
    ///
    /// The snapshot is never partially updated, it's either the model before or after an aggregation.
    pub fn distribute_global_model(&self) -> GlobalSnapshot {
        self.snapshot.read().clone()
    }

    /// Records a client's trained weights for the current round.
    ///
    /// If this submission completes the barrier the round is aggregated before returning.
    ///
    /// # Arguments
    /// * `client_id` - The submitting client.
    /// * `weights` - The locally trained weights.
    /// * `metrics` - The client's training metrics.
    ///
    /// # Returns
    /// A receipt of the submission or a `CoordinatorErr` if the client isn't registered or the
    /// weights don't have the global model's shape.
    pub fn receive_client_update(
        &self,
        client_id: ClientId,
        weights: WeightVector,
        metrics: SubmissionMetrics,
    ) -> Result<SubmissionReceipt, CoordinatorErr> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let (round, resubmitted, quorum) = {
            let Inner {
                registry, round, ..
            } = &mut *inner;

            if !registry.is_registered(client_id) {
                warn!(client_id = client_id; "rejected update from unregistered client");
                return Err(CoordinatorErr::UnregisteredClient(client_id));
            }

            if let Err(source) = weights.check_shape(round.signature()) {
                warn!(client_id = client_id; "rejected update: {source}");
                return Err(CoordinatorErr::ShapeMismatch { client_id, source });
            }

            if round.form_barrier(|| registry.ids(), now) {
                let expected = round.expected().map_or(0, BTreeSet::len);
                info!(round = round.round(), expected = expected; "barrier formed");
            }

            let submission = Submission {
                weights,
                metrics,
                received_at: now,
            };

            let resubmitted = round.record(client_id, submission);
            if resubmitted {
                info!(client_id = client_id, round = round.round(); "client resubmitted, keeping the latest update");
            } else {
                debug!(client_id = client_id, round = round.round(); "update received");
            }

            (round.round(), resubmitted, round.quorum_reached())
        };

        let completed = if quorum {
            info!(round = round; "every expected client reported, aggregating");
            Some(self.close_round(&mut inner, RoundOutcome::Aggregated)?)
        } else {
            None
        };

        Ok(SubmissionReceipt {
            round,
            resubmitted,
            completed,
        })
    }

    /// Averages whatever the current round received and starts the next one.
    ///
    /// # Returns
    /// The record of the closed round or `CoordinatorErr::EmptyAggregation` if nothing was
    /// submitted, in which case the round stays open.
    pub fn aggregate_models(&self) -> Result<CompletedRound, CoordinatorErr> {
        let mut inner = self.inner.lock();

        let outcome = match inner.round.quorum_reached() {
            true => RoundOutcome::Aggregated,
            false => RoundOutcome::PartialAggregated,
        };

        self.close_round(&mut inner, outcome)
    }

    /// Closes the current round if it's deadline passed at `now`.
    ///
    /// # Returns
    /// `None` if there is no deadline, the barrier isn't formed or it hasn't expired yet,
    /// otherwise the result of closing the round as the policy says.
    pub fn expire_round(&self, now: Instant) -> Option<Result<CompletedRound, CoordinatorErr>> {
        let timeout = self.policy.timeout?;
        let mut inner = self.inner.lock();

        let formed_at = inner.round.barrier_formed_at()?;
        if now.saturating_duration_since(formed_at) < timeout {
            return None;
        }

        let missing = inner.round.missing();
        warn!(
            round = inner.round.round(),
            received = inner.round.received_len();
            "round deadline passed, missing clients {missing:?}"
        );

        let outcome = match self.policy.on_timeout {
            TimeoutAction::AggregateReceived => RoundOutcome::PartialAggregated,
            TimeoutAction::FailRound => RoundOutcome::Failed,
        };

        Some(self.close_round(&mut inner, outcome))
    }

    /// A summary of the coordinator's state.
    pub fn round_view(&self) -> StatusResponse {
        let inner = self.inner.lock();

        let expected = match inner.round.expected() {
            Some(expected) => expected.iter().copied().collect(),
            None => inner.registry.ids().into_iter().collect(),
        };

        StatusResponse {
            round: inner.round.round(),
            status: inner.round.status(),
            registered: inner.registry.ids().into_iter().collect(),
            expected,
            received: inner.round.received_ids().collect(),
            last_completed: inner.history.last().cloned(),
        }
    }

    /// Every closed round, oldest first.
    pub fn history(&self) -> Vec<CompletedRound> {
        self.inner.lock().history.clone()
    }

    fn close_round(
        &self,
        inner: &mut Inner,
        outcome: RoundOutcome,
    ) -> Result<CompletedRound, CoordinatorErr> {
        let round = inner.round.round();

        let next_global = match outcome {
            RoundOutcome::Failed => Arc::clone(inner.round.global()),
            RoundOutcome::Aggregated | RoundOutcome::PartialAggregated => {
                inner.round.begin_aggregation();

                let weights: Vec<_> = inner.round.submissions().map(|s| &s.weights).collect();
                match aggregation::aggregate(&weights) {
                    Ok(aggregated) => Arc::new(aggregated),
                    Err(e) => {
                        inner.round.abort_aggregation();
                        error!(round = round; "aggregation failed: {e}");

                        return Err(match e {
                            AggregationErr::Empty => CoordinatorErr::EmptyAggregation { round },
                            AggregationErr::ShapeMismatch(source) => {
                                CoordinatorErr::InconsistentRound { round, source }
                            }
                        });
                    }
                }
            }
        };

        let next = RoundState::new(round + 1, Arc::clone(&next_global));
        let finished = std::mem::replace(&mut inner.round, next);
        let record = finished.complete(outcome);

        *self.snapshot.write() = GlobalSnapshot {
            round: round + 1,
            weights: next_global,
        };

        info!(
            round = round,
            participants = record.participants.len(),
            missing = record.missing.len();
            "round closed: {:?}", record.outcome
        );

        inner.history.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use comms::msg::ErrorKind;
    use ndarray::arr1;

    use super::*;

    fn weights(values: &[f32]) -> WeightVector {
        WeightVector::new(vec![arr1(values).into_dyn()])
    }

    fn coordinator(policy: RoundPolicy) -> RoundCoordinator {
        RoundCoordinator::new(weights(&[0.]), policy)
    }

    fn metrics(loss: f64) -> SubmissionMetrics {
        let mut metrics = SubmissionMetrics::new();
        metrics.insert("loss", loss);
        metrics
    }

    #[test]
    fn two_clients_one_round() {
        let coordinator = coordinator(RoundPolicy::default());
        coordinator.register(1);
        coordinator.register(2);

        let receipt = coordinator
            .receive_client_update(1, weights(&[1.]), metrics(1.))
            .unwrap();
        assert_eq!(receipt.round, 0);
        assert!(receipt.completed.is_none());
        assert_eq!(coordinator.distribute_global_model().round, 0);

        let receipt = coordinator
            .receive_client_update(2, weights(&[3.]), metrics(3.))
            .unwrap();
        let completed = receipt.completed.unwrap();
        assert_eq!(completed.outcome, RoundOutcome::Aggregated);
        assert_eq!(completed.participants, [1, 2]);
        assert_eq!(completed.mean_metrics.get("loss"), Some(2.));

        let snapshot = coordinator.distribute_global_model();
        assert_eq!(snapshot.round, 1);
        assert_eq!(*snapshot.weights, weights(&[2.]));
        assert_eq!(coordinator.history().len(), 1);
    }

    #[test]
    fn unregistered_client_is_rejected() {
        let coordinator = coordinator(RoundPolicy::default());
        coordinator.register(1);

        let err = coordinator
            .receive_client_update(5, weights(&[1.]), SubmissionMetrics::new())
            .unwrap_err();
        assert_eq!(err, CoordinatorErr::UnregisteredClient(5));
        assert_eq!(coordinator.round_view().received, Vec::<ClientId>::new());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let coordinator = coordinator(RoundPolicy::default());
        coordinator.register(1);

        let err = coordinator
            .receive_client_update(1, weights(&[1., 2.]), SubmissionMetrics::new())
            .unwrap_err();
        assert!(matches!(err, CoordinatorErr::ShapeMismatch { client_id: 1, .. }));
        assert!(coordinator.expected_ids().contains(&1));
    }

    #[test]
    fn resubmission_keeps_the_latest() {
        let coordinator = coordinator(RoundPolicy::default());
        coordinator.register(1);
        coordinator.register(2);

        coordinator
            .receive_client_update(1, weights(&[10.]), SubmissionMetrics::new())
            .unwrap();
        let receipt = coordinator
            .receive_client_update(1, weights(&[2.]), SubmissionMetrics::new())
            .unwrap();
        assert!(receipt.resubmitted);
        assert!(receipt.completed.is_none());

        coordinator
            .receive_client_update(2, weights(&[4.]), SubmissionMetrics::new())
            .unwrap();
        assert_eq!(*coordinator.distribute_global_model().weights, weights(&[3.]));
    }

    #[test]
    fn late_joiner_does_not_gate_the_round() {
        let coordinator = coordinator(RoundPolicy::default());
        coordinator.register(1);
        coordinator.register(2);

        coordinator
            .receive_client_update(1, weights(&[1.]), SubmissionMetrics::new())
            .unwrap();

        coordinator.register(3);
        assert_eq!(coordinator.expected_ids(), BTreeSet::from([1, 2]));

        let receipt = coordinator
            .receive_client_update(3, weights(&[5.]), SubmissionMetrics::new())
            .unwrap();
        assert!(receipt.completed.is_none());

        let receipt = coordinator
            .receive_client_update(2, weights(&[3.]), SubmissionMetrics::new())
            .unwrap();
        assert_eq!(receipt.completed.unwrap().participants, [1, 2, 3]);
        assert_eq!(*coordinator.distribute_global_model().weights, weights(&[3.]));

        // The next barrier includes the late joiner.
        assert_eq!(coordinator.expected_ids(), BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn empty_aggregation_keeps_the_round_open() {
        let coordinator = coordinator(RoundPolicy::default());

        let err = coordinator.aggregate_models().unwrap_err();
        assert_eq!(err, CoordinatorErr::EmptyAggregation { round: 0 });
        assert_eq!(coordinator.distribute_global_model().round, 0);
        assert!(coordinator.history().is_empty());
    }

    #[test]
    fn mixed_shapes_keep_the_round_open() {
        let coordinator = coordinator(RoundPolicy::default());
        coordinator.register(1);
        coordinator.register(2);
        coordinator
            .receive_client_update(1, weights(&[1.]), metrics(1.))
            .unwrap();

        // Bypasses the per submission shape check.
        coordinator.inner.lock().round.record(
            2,
            Submission {
                weights: weights(&[1., 2.]),
                metrics: metrics(2.),
                received_at: Instant::now(),
            },
        );

        let err = coordinator.aggregate_models().unwrap_err();
        assert!(matches!(err, CoordinatorErr::InconsistentRound { round: 0, .. }));
        assert_eq!(err.kind(), ErrorKind::Internal);

        assert!(coordinator.history().is_empty());
        assert_eq!(coordinator.distribute_global_model().round, 0);
        assert_eq!(coordinator.round_view().received, [1, 2]);
    }

    #[test]
    fn forced_aggregation_is_partial() {
        let coordinator = coordinator(RoundPolicy::default());
        coordinator.register(1);
        coordinator.register(2);

        coordinator
            .receive_client_update(2, weights(&[8.]), SubmissionMetrics::new())
            .unwrap();

        let completed = coordinator.aggregate_models().unwrap();
        assert_eq!(completed.outcome, RoundOutcome::PartialAggregated);
        assert_eq!(completed.missing, [1]);
        assert_eq!(*coordinator.distribute_global_model().weights, weights(&[8.]));
    }

    #[test]
    fn deadline_aggregates_received() {
        let policy = RoundPolicy {
            timeout: Some(Duration::from_secs(10)),
            on_timeout: TimeoutAction::AggregateReceived,
        };
        let coordinator = coordinator(policy);
        coordinator.register(1);
        coordinator.register(2);

        let start = Instant::now();
        assert!(coordinator.expire_round(start + Duration::from_secs(60)).is_none());

        coordinator
            .receive_client_update(1, weights(&[4.]), SubmissionMetrics::new())
            .unwrap();
        assert!(coordinator.expire_round(Instant::now()).is_none());

        let later = Instant::now() + Duration::from_secs(11);
        let completed = coordinator.expire_round(later).unwrap().unwrap();
        assert_eq!(completed.outcome, RoundOutcome::PartialAggregated);
        assert_eq!(completed.missing, [2]);

        let snapshot = coordinator.distribute_global_model();
        assert_eq!(snapshot.round, 1);
        assert_eq!(*snapshot.weights, weights(&[4.]));
    }

    #[test]
    fn deadline_fails_round() {
        let policy = RoundPolicy {
            timeout: Some(Duration::from_secs(1)),
            on_timeout: TimeoutAction::FailRound,
        };
        let coordinator = coordinator(policy);
        coordinator.register(1);
        coordinator.register(2);

        coordinator
            .receive_client_update(1, weights(&[4.]), SubmissionMetrics::new())
            .unwrap();

        let later = Instant::now() + Duration::from_secs(2);
        let completed = coordinator.expire_round(later).unwrap().unwrap();
        assert_eq!(completed.outcome, RoundOutcome::Failed);

        let snapshot = coordinator.distribute_global_model();
        assert_eq!(snapshot.round, 1);
        assert_eq!(*snapshot.weights, weights(&[0.]));
    }

    #[test]
    fn no_deadline_never_expires() {
        let coordinator = coordinator(RoundPolicy::default());
        coordinator.register(1);
        coordinator.register(2);
        coordinator
            .receive_client_update(1, weights(&[4.]), SubmissionMetrics::new())
            .unwrap();

        let later = Instant::now() + Duration::from_secs(3600);
        assert!(coordinator.expire_round(later).is_none());
    }

    #[test]
    fn concurrent_submissions_close_the_round_once() {
        const CLIENTS: u64 = 16;

        let coordinator = Arc::new(coordinator(RoundPolicy::default()));
        for id in 0..CLIENTS {
            coordinator.register(id);
        }

        let handles: Vec<_> = (0..CLIENTS)
            .map(|id| {
                let coordinator = Arc::clone(&coordinator);
                thread::spawn(move || {
                    coordinator
                        .receive_client_update(id, weights(&[id as f32]), SubmissionMetrics::new())
                        .unwrap()
                })
            })
            .collect();

        let closed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|receipt| receipt.completed.is_some())
            .count();

        assert_eq!(closed, 1);
        assert_eq!(coordinator.history().len(), 1);

        let snapshot = coordinator.distribute_global_model();
        assert_eq!(snapshot.round, 1);
        assert_eq!(*snapshot.weights, weights(&[7.5]));
    }
}
