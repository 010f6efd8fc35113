//! Stop signal for one run: manual cancellation or an elapsed wall-clock
//! budget.  Checked between nodes and raced against the node in flight.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::EngineError;

#[derive(Debug, Clone)]
pub struct RunSignal {
    cancel: CancellationToken,
    budget: Duration,
    /// `None` when the budget is too large to represent as an instant.
    deadline: Option<Instant>,
}

impl RunSignal {
    /// Start the budget clock now.
    pub fn new(cancel: CancellationToken, budget: Duration) -> Self {
        Self {
            cancel,
            budget,
            deadline: Instant::now().checked_add(budget),
        }
    }

    /// A signal that never trips on its own.
    pub fn unbounded() -> Self {
        Self {
            cancel: CancellationToken::new(),
            budget: Duration::MAX,
            deadline: None,
        }
    }

    /// `Err` once the token is cancelled or the deadline has passed.
    /// Cancellation wins when both hold.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(EngineError::TimedOut(self.budget));
        }
        Ok(())
    }

    /// Run `fut` until it finishes or the signal trips, whichever is first.
    /// A tripped signal drops `fut` where it stands.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, EngineError> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            _ = deadline => Err(EngineError::TimedOut(self.budget)),
            out = fut => Ok(out),
        }
    }
}
