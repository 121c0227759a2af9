use std::{sync::Arc, time::Duration};

use log::{debug, error, info};
use tokio::{
    task,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::RoundCoordinator;

/// Periodically closes rounds whose deadline passed, until `token` is cancelled.
///
/// # Arguments
/// * `coordinator` - The shared round coordinator.
/// * `interval` - How often to check the deadline.
/// * `token` - Cancelled on shutdown.
pub async fn run(coordinator: Arc<RoundCoordinator>, interval: Duration, token: CancellationToken) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now().into_std();
        let coordinator = Arc::clone(&coordinator);

        match task::spawn_blocking(move || coordinator.expire_round(now)).await {
            Ok(None) => {}
            Ok(Some(Ok(completed))) => {
                info!(round = completed.round; "round closed by deadline: {:?}", completed.outcome)
            }
            Ok(Some(Err(e))) => error!("failed to close expired round: {e}"),
            Err(e) => error!("deadline check panicked: {e}"),
        }
    }

    debug!("watchdog stopped");
}

#[cfg(test)]
mod tests {
    use comms::{SubmissionMetrics, WeightVector, msg::RoundOutcome};
    use ndarray::arr1;

    use super::*;
    use crate::config::{RoundPolicy, TimeoutAction};

    fn weights(values: &[f32]) -> WeightVector {
        WeightVector::new(vec![arr1(values).into_dyn()])
    }

    #[tokio::test(start_paused = true)]
    async fn closes_a_stalled_round() {
        let policy = RoundPolicy {
            timeout: Some(Duration::from_secs(5)),
            on_timeout: TimeoutAction::FailRound,
        };
        let coordinator = Arc::new(RoundCoordinator::new(weights(&[1.]), policy));
        coordinator.register(1);
        coordinator.register(2);
        coordinator
            .receive_client_update(1, weights(&[3.]), SubmissionMetrics::new())
            .unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&coordinator),
            Duration::from_millis(100),
            token.clone(),
        ));

        time::sleep(Duration::from_secs(6)).await;
        token.cancel();
        handle.await.unwrap();

        let history = coordinator.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, RoundOutcome::Failed);
        assert_eq!(*coordinator.distribute_global_model().weights, weights(&[1.]));
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let coordinator = Arc::new(RoundCoordinator::new(weights(&[0.]), RoundPolicy::default()));
        let token = CancellationToken::new();
        token.cancel();

        run(coordinator, Duration::from_millis(10), token).await;
    }
}
