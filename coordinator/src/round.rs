use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Instant,
};

use comms::{
    ClientId, ShapeSignature, SubmissionMetrics, WeightVector,
    msg::{CompletedRound, RoundOutcome, RoundStatus},
};

/// A client's contribution to a round.
#[derive(Debug, Clone)]
pub struct Submission {
    pub weights: WeightVector,
    pub metrics: SubmissionMetrics,
    pub received_at: Instant,
}

/// The bookkeeping of the round in progress.
///
/// The barrier (the set of clients the round waits for) is formed lazily, out of the
/// registered clients at the time of the first accepted submission.
#[derive(Debug)]
pub struct RoundState {
    round: u64,
    global: Arc<WeightVector>,
    signature: ShapeSignature,
    expected: Option<BTreeSet<ClientId>>,
    barrier_formed_at: Option<Instant>,
    received: BTreeMap<ClientId, Submission>,
    status: RoundStatus,
}

impl RoundState {
    /// Creates a new `RoundState`.
    ///
    /// # Arguments
    /// * `round` - The number of this round.
    /// * `global` - The global model clients start this round from.
    pub fn new(round: u64, global: Arc<WeightVector>) -> Self {
        let signature = global.shape_signature();

        Self {
            round,
            global,
            signature,
            expected: None,
            barrier_formed_at: None,
            received: BTreeMap::new(),
            status: RoundStatus::Waiting,
        }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn global(&self) -> &Arc<WeightVector> {
        &self.global
    }

    /// The shape every submission of this round must have.
    pub fn signature(&self) -> &ShapeSignature {
        &self.signature
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    /// The clients this round waits for, `None` if the barrier isn't formed yet.
    pub fn expected(&self) -> Option<&BTreeSet<ClientId>> {
        self.expected.as_ref()
    }

    pub fn barrier_formed_at(&self) -> Option<Instant> {
        self.barrier_formed_at
    }

    /// The ids of the clients that already submitted, in ascending order.
    pub fn received_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.received.keys().copied()
    }

    pub fn received_len(&self) -> usize {
        self.received.len()
    }

    /// Every submission, ordered by client id.
    pub fn submissions(&self) -> impl Iterator<Item = &Submission> {
        self.received.values()
    }

    /// Forms the barrier out of `registered` unless it's already formed.
    ///
    /// # Returns
    /// Whether this call formed it.
    pub fn form_barrier<F>(&mut self, registered: F, now: Instant) -> bool
    where
        F: FnOnce() -> BTreeSet<ClientId>,
    {
        if self.expected.is_some() {
            return false;
        }

        self.expected = Some(registered());
        self.barrier_formed_at = Some(now);
        true
    }

    /// Records `submission` for `client_id`, replacing any previous one.
    ///
    /// # Returns
    /// Whether a previous submission was replaced.
    pub fn record(&mut self, client_id: ClientId, submission: Submission) -> bool {
        self.received.insert(client_id, submission).is_some()
    }

    /// Whether every expected client submitted.
    pub fn quorum_reached(&self) -> bool {
        match &self.expected {
            Some(expected) => expected.iter().all(|id| self.received.contains_key(id)),
            None => false,
        }
    }

    /// The expected clients that haven't submitted.
    pub fn missing(&self) -> Vec<ClientId> {
        let Some(expected) = &self.expected else {
            return Vec::new();
        };

        expected
            .iter()
            .filter(|id| !self.received.contains_key(id))
            .copied()
            .collect()
    }

    pub fn begin_aggregation(&mut self) {
        self.status = RoundStatus::Aggregating;
    }

    /// Puts the round back to waiting after a failed aggregation.
    pub fn abort_aggregation(&mut self) {
        self.status = RoundStatus::Waiting;
    }

    /// Closes this round, consuming it into it's record.
    ///
    /// # Arguments
    /// * `outcome` - How the round was closed.
    pub fn complete(self, outcome: RoundOutcome) -> CompletedRound {
        let missing = self.missing();
        let mean_metrics = SubmissionMetrics::mean(self.received.values().map(|s| &s.metrics));

        CompletedRound {
            round: self.round,
            status: RoundStatus::Complete,
            outcome,
            participants: self.received.into_keys().collect(),
            missing,
            mean_metrics,
        }
    }
}
