use std::{sync::Arc, time::Duration};

use comms::{
    ClientId, SubmissionMetrics, WeightVector,
    msg::{ClientUpdateRequest, GlobalModelResponse},
};
use log::{debug, error, info, warn};
use tokio::{task, time};

use crate::{
    error::{ClientErr, TransportErr},
    trainer::{LocalTrainer, TrainerErr},
    transport::Transport,
};

/// Where a client session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Registered,
    Fetch { round: usize },
    Train { round: usize },
    Submit { round: usize },
    Done,
    Aborted,
}

/// How a single round ended for the client.
#[derive(Debug)]
pub enum RoundOutcome {
    Completed,
    /// The coordinator couldn't be reached or refused the request, the session moves on to the
    /// next round.
    Skipped(TransportErr),
    /// The session can't go on.
    Aborted(ClientErr),
}

/// Session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// The amount of rounds to take part in.
    pub rounds: usize,
    /// How long to wait after a skipped round.
    pub backoff: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            rounds: 10,
            backoff: Duration::from_secs(5),
        }
    }
}

/// The summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub completed: Vec<usize>,
    pub skipped: Vec<usize>,
    pub final_state: SessionState,
}

/// Drives a client through it's rounds: register once, then fetch, train and submit every round.
///
/// Transport failures during a round skip that round after a backoff, they are never retried
/// within it. Any other failure aborts the session.
pub struct ClientRuntime<T: LocalTrainer, X: Transport> {
    client_id: ClientId,
    settings: RuntimeSettings,
    transport: X,
    trainer: Option<T>,
    model: Option<T::Model>,
    dataset: Arc<T::Dataset>,
    state: SessionState,
}

impl<T: LocalTrainer, X: Transport> ClientRuntime<T, X> {
    /// Creates a new `ClientRuntime`.
    ///
    /// # Arguments
    /// * `client_id` - This client's id.
    /// * `settings` - The amount of rounds and the backoff.
    /// * `transport` - How to reach the coordinator.
    /// * `trainer` - The local trainer.
    /// * `dataset` - The client's private data.
    pub fn new(
        client_id: ClientId,
        settings: RuntimeSettings,
        transport: X,
        trainer: T,
        dataset: T::Dataset,
    ) -> Self {
        Self {
            client_id,
            settings,
            transport,
            trainer: Some(trainer),
            model: None,
            dataset: Arc::new(dataset),
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the whole session.
    ///
    /// # Returns
    /// The session's report, or the error that aborted it.
    pub async fn run(&mut self) -> Result<SessionReport, ClientErr> {
        let client_id = self.client_id;

        if let Err(e) = self.init() {
            return Err(self.abort(e));
        }

        info!(client_id = client_id; "registering with the coordinator");
        if let Err(e) = self.transport.register(client_id).await {
            error!(client_id = client_id; "failed to reach the coordinator: {e}");
            return Err(self.abort(ClientErr::Registration(e)));
        }
        self.state = SessionState::Registered;

        let rounds = self.settings.rounds;
        let mut completed = Vec::new();
        let mut skipped = Vec::new();

        for round in 0..rounds {
            info!(client_id = client_id; "starting round {}/{rounds}", round + 1);

            match self.round(round).await {
                RoundOutcome::Completed => {
                    info!(client_id = client_id; "round {} completed", round + 1);
                    completed.push(round);
                }
                RoundOutcome::Skipped(e) => {
                    warn!(client_id = client_id; "communication error in round {}: {e}", round + 1);
                    skipped.push(round);
                    time::sleep(self.settings.backoff).await;
                }
                RoundOutcome::Aborted(e) => {
                    error!(client_id = client_id; "error in round {}: {e}", round + 1);
                    return Err(self.abort(e));
                }
            }
        }

        self.state = SessionState::Done;
        info!(
            client_id = client_id,
            completed = completed.len(),
            skipped = skipped.len();
            "training finished"
        );

        Ok(SessionReport {
            completed,
            skipped,
            final_state: self.state,
        })
    }

    fn init(&mut self) -> Result<(), ClientErr> {
        let Some(trainer) = self.trainer.as_mut() else {
            return Err(ClientErr::Initialization("trainer is gone".into()));
        };

        let model = trainer
            .initialize()
            .map_err(|e| ClientErr::Initialization(e.to_string()))?;
        self.model = Some(model);
        Ok(())
    }

    async fn round(&mut self, round: usize) -> RoundOutcome {
        self.state = SessionState::Fetch { round };
        debug!(client_id = self.client_id; "fetching global model");

        let GlobalModelResponse {
            weights,
            round: global_round,
        } = match self.transport.fetch_global().await {
            Ok(global) => global,
            Err(e) => return Self::transport_failure(e),
        };

        self.state = SessionState::Train { round };
        debug!(client_id = self.client_id, global_round = global_round; "training local model");

        let (weights, metrics) = match self.train(weights).await {
            Ok(trained) => trained,
            Err(e) => return RoundOutcome::Aborted(ClientErr::Trainer(e)),
        };

        self.state = SessionState::Submit { round };
        debug!(client_id = self.client_id; "sending update");

        let update = ClientUpdateRequest {
            client_id: self.client_id,
            weights,
            metrics: Some(metrics),
        };

        match self.transport.submit(&update).await {
            Ok(res) => {
                debug!(
                    client_id = self.client_id,
                    round = res.round,
                    aggregated = res.aggregated;
                    "update accepted"
                );
                RoundOutcome::Completed
            }
            Err(e) => Self::transport_failure(e),
        }
    }

    fn transport_failure(err: TransportErr) -> RoundOutcome {
        match err.is_transient() {
            true => RoundOutcome::Skipped(err),
            false => RoundOutcome::Aborted(ClientErr::Transport(err)),
        }
    }

    /// Trains on the blocking pool, moving the trainer and model out and back.
    async fn train(
        &mut self,
        global: WeightVector,
    ) -> Result<(WeightVector, SubmissionMetrics), TrainerErr> {
        let (Some(mut trainer), Some(mut model)) = (self.trainer.take(), self.model.take()) else {
            return Err(TrainerErr::Panicked("a previous training task died".into()));
        };
        let dataset = Arc::clone(&self.dataset);

        let (trainer, model, result) = task::spawn_blocking(move || {
            let result = trainer.train(&mut model, &global, &dataset);
            (trainer, model, result)
        })
        .await
        .map_err(|e| TrainerErr::Panicked(e.to_string()))?;

        self.trainer = Some(trainer);
        self.model = Some(model);
        result
    }

    fn abort(&mut self, err: ClientErr) -> ClientErr {
        self.state = SessionState::Aborted;
        err
    }
}
