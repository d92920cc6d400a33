use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Replays the actual history as a live stream: each tick reveals one more
/// daily point and runs one evaluation cycle. Failures keep the previous
/// good tables; the next tick tries again.
pub struct StreamService {
    state: AppState,
    interval: Duration,
}

impl StreamService {
    pub fn new(state: AppState, interval: Duration) -> Self {
        Self { state, interval }
    }

    pub fn start(self, cancel: CancellationToken) {
        let state = self.state.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = tick_once(&state).await {
                            tracing::warn!("stream tick failed: {err:#}");
                        }
                    }
                }
            }
        });
    }
}

async fn tick_once(state: &AppState) -> Result<()> {
    let mut runtime = state.runtime.write().await;
    if !runtime.advance() {
        tracing::debug!("actual history fully replayed");
        return Ok(());
    }
    runtime.run_cycle()?;
    tracing::debug!(
        observed = runtime.observed_points(),
        total = runtime.total_points(),
        "evaluation cycle complete"
    );
    Ok(())
}
