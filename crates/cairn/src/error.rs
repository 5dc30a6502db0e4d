use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to allocate a command list on queue {queue}")]
    CommandListAllocation { queue: u32 },
    #[error("Failed to create a fence")]
    FenceCreation,
    #[error("Submission to queue {queue} failed: {reason}")]
    SubmitFailed { queue: u32, reason: String },
    #[error("The device was lost")]
    DeviceLost,
}
