use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Every queue slot is taken.  Nothing was persisted.
    #[error("execution queue is full ({capacity} slots)")]
    Backpressure { capacity: usize },

    #[error("worker pool is shut down")]
    Closed,

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Engine(#[from] engine::EngineError),
}
