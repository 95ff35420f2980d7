use vigil_common::{PreviewResult, Strategy};
use vigil_repo::{ConfigRepository, RepoResult};

use crate::draft::DraftReconciler;

/// Asks the backend what a strategy would assign, without applying it.
///
/// Holds at most one result. A failed preview keeps the previous result.
pub struct StrategyPreviewer<R> {
    repo: R,
    last: Option<(u64, PreviewResult)>,
}

impl<R: ConfigRepository> StrategyPreviewer<R> {
    pub fn new(repo: R) -> Self {
        Self { repo, last: None }
    }

    /// Preview `strategy` for the draft's current strategy epoch.
    ///
    /// `manual` is passed through; the backend answers with the current assignments.
    pub async fn preview(&mut self, strategy: Strategy, draft: &DraftReconciler) -> RepoResult<&PreviewResult> {
        let epoch = draft.strategy_epoch();
        match self.repo.preview_strategy(strategy).await {
            Ok(result) => {
                tracing::debug!(%strategy, proposed = result.proposed_assignments.len(), "strategy preview");
                let (_, stored) = self.last.insert((epoch, result));
                Ok(stored)
            }
            Err(e) => {
                tracing::warn!(%strategy, error = %e, "strategy preview failed");
                Err(e)
            }
        }
    }

    /// The retained preview, if the draft strategy has not changed since it was taken.
    pub fn current(&self, draft: &DraftReconciler) -> Option<&PreviewResult> {
        self.last
            .as_ref()
            .filter(|(epoch, _)| *epoch == draft.strategy_epoch())
            .map(|(_, r)| r)
    }

    /// The retained preview regardless of staleness.
    pub fn last(&self) -> Option<&PreviewResult> {
        self.last.as_ref().map(|(_, r)| r)
    }

    pub fn dismiss(&mut self) {
        self.last = None;
    }
}
