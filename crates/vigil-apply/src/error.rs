use thiserror::Error;

use vigil_repo::RepoError;

/// Reasons a save or apply stopped before any restarts were polled.
///
/// Convergence failures are not errors: they come back as
/// `ApplyOutcome::NotConverged`.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Another apply on this orchestrator has not reached a terminal state.
    #[error("an apply is already in progress")]
    InFlight,

    /// The persisted config changed since the draft was initialized. The draft
    /// has been re-initialized from the newer config.
    #[error("configuration was changed elsewhere; draft reloaded, review and retry")]
    StaleConfig,

    #[error("failed to save configuration: {0}")]
    Save(#[source] RepoError),

    #[error("failed to trigger restart: {0}")]
    RestartTrigger(#[source] RepoError),

    #[error("apply cancelled")]
    Cancelled,
}

impl ApplyError {
    /// True if the draft was kept as the user left it.
    pub fn preserves_draft(&self) -> bool {
        !matches!(self, ApplyError::StaleConfig)
    }
}
