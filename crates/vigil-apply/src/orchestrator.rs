use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_common::{all_settled, ApplyResult, ServiceHealthStatus, UpdateConfigResult};
use vigil_repo::{ConfigRepository, RepoError};

use crate::clock::{Clock, TokioClock};
use crate::draft::DraftReconciler;
use crate::error::ApplyError;

/// Default delay between health polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default limit on how long polling waits for convergence.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Idle,
    Saving,
    Applying,
    /// `tick` counts health fetches issued so far in this apply.
    Polling { tick: u32 },
    Converged,
    Failed,
}

impl ApplyState {
    pub fn is_busy(&self) -> bool {
        matches!(self, ApplyState::Saving | ApplyState::Applying | ApplyState::Polling { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplyState::Converged | ApplyState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Measured from the start of polling; the last tick lands exactly on it.
    pub timeout: Duration,
    /// Stop as soon as any service reports a failed restart instead of waiting out the timeout.
    pub fail_fast: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
            fail_fast: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyFailure {
    /// Services were still unsettled when the poll deadline passed.
    Timeout { waited: Duration },
    /// These services reported a terminal restart failure.
    RestartFailed { services: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub result: ApplyResult,
    pub ticks: u32,
    /// Health fetches that failed at the transport level and were retried.
    pub poll_errors: u32,
    pub elapsed: Duration,
}

/// How far an apply got once the config was saved and restarts were triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Converged(ApplyReport),
    NotConverged {
        failure: ApplyFailure,
        report: ApplyReport,
    },
}

impl ApplyOutcome {
    pub fn report(&self) -> &ApplyReport {
        match self {
            ApplyOutcome::Converged(r) => r,
            ApplyOutcome::NotConverged { report, .. } => report,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, ApplyOutcome::Converged(_))
    }
}

enum PollEnd {
    Converged,
    RestartFailed(Vec<String>),
    Timeout(Duration),
    Cancelled,
}

struct PollRun {
    end: PollEnd,
    statuses: Vec<ServiceHealthStatus>,
    ticks: u32,
    poll_errors: u32,
}

/// Clears the in-flight slot when an apply or save finishes, however it exits.
struct Flight<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Drives save → restart → poll until the services converge.
///
/// One sequence runs at a time per orchestrator; a second `apply` or `save`
/// while one is running is rejected with [`ApplyError::InFlight`]. Cancelling
/// the orchestrator's shutdown token (session teardown) or calling
/// [`cancel`](Self::cancel) stops polling before the next health fetch.
pub struct ApplyOrchestrator<R, C = TokioClock> {
    repo: R,
    clock: C,
    options: PollOptions,
    state: watch::Sender<ApplyState>,
    shutdown: CancellationToken,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl<R: ConfigRepository, C: Clock> ApplyOrchestrator<R, C> {
    pub fn new(repo: R, clock: C, options: PollOptions) -> Self {
        let (state, _rx) = watch::channel(ApplyState::Idle);
        Self {
            repo,
            clock,
            options,
            state,
            shutdown: CancellationToken::new(),
            in_flight: Mutex::new(None),
        }
    }

    /// Tie the orchestrator to an outer lifetime; cancelling `token` tears it down.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    pub fn state(&self) -> ApplyState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ApplyState> {
        self.state.subscribe()
    }

    pub fn state_stream(&self) -> WatchStream<ApplyState> {
        WatchStream::new(self.state.subscribe())
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Stop the in-flight apply, if any. Later applies are unaffected.
    pub fn cancel(&self) {
        if let Some(token) = self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            info!("cancelling in-flight apply");
            token.cancel();
        }
    }

    /// Tear down: cancel the in-flight apply and every future one.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn set_state(&self, next: ApplyState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(?prev, ?next, "apply state");
        }
    }

    fn begin(&self) -> Result<(Flight<'_>, CancellationToken), ApplyError> {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            warn!("rejecting request: an apply is already in progress");
            return Err(ApplyError::InFlight);
        }
        let token = self.shutdown.child_token();
        *slot = Some(token.clone());
        Ok((
            Flight {
                slot: &self.in_flight,
            },
            token,
        ))
    }

    /// Persist the draft without restarting anything.
    ///
    /// On success the draft is re-initialized from the re-fetched config. On a
    /// transport or validation error the draft keeps the user's edits.
    pub async fn save(&self, draft: &mut DraftReconciler) -> Result<UpdateConfigResult, ApplyError> {
        let _flight = self.begin()?.0;
        self.persist(draft).await
    }

    async fn persist(&self, draft: &mut DraftReconciler) -> Result<UpdateConfigResult, ApplyError> {
        let current = self.repo.get_config().await.map_err(ApplyError::Save)?;
        if current.updated_at != draft.base().updated_at {
            warn!(
                base = ?draft.base().updated_at,
                current = ?current.updated_at,
                "persisted config changed underneath the draft, reloading"
            );
            draft.initialize(current);
            return Err(ApplyError::StaleConfig);
        }

        let result = self
            .repo
            .update_config(draft.draft())
            .await
            .map_err(ApplyError::Save)?;
        if !result.success {
            let reason = if result.warnings.is_empty() {
                "backend rejected configuration".to_string()
            } else {
                result.warnings.join("; ")
            };
            return Err(ApplyError::Save(RepoError::Validation(reason)));
        }
        for w in &result.warnings {
            warn!(warning = %w, "config saved with warning");
        }
        info!(strategy = %draft.draft().strategy, "config saved");

        match self.repo.get_config().await {
            Ok(fresh) => draft.initialize(fresh),
            Err(e) => warn!(error = %e, "config saved but re-fetch failed; draft not reloaded"),
        }
        Ok(result)
    }

    /// Save the draft, restart affected services and wait for them to converge.
    ///
    /// `Err` means nothing was restarted (or the apply was cancelled);
    /// `Ok(NotConverged)` means restarts were triggered but the services did not
    /// all come back healthy.
    pub async fn apply(&self, draft: &mut DraftReconciler) -> Result<ApplyOutcome, ApplyError> {
        let (_flight, token) = self.begin()?;
        let started = self.clock.now();

        if token.is_cancelled() {
            return self.cancelled();
        }

        self.set_state(ApplyState::Saving);
        let saved = match self.persist(draft).await {
            Ok(s) => s,
            Err(e) => {
                self.set_state(ApplyState::Failed);
                return Err(e);
            }
        };
        if token.is_cancelled() {
            return self.cancelled();
        }

        self.set_state(ApplyState::Applying);
        let trigger = match self.repo.apply_config().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "restart trigger failed");
                self.set_state(ApplyState::Failed);
                return Err(ApplyError::RestartTrigger(e));
            }
        };
        info!(restarted = ?trigger.restarted_services, "restarts triggered");
        if token.is_cancelled() {
            return self.cancelled();
        }

        self.set_state(ApplyState::Polling { tick: 0 });
        let run = self.poll(&token, trigger.service_statuses.clone()).await;

        let mut warnings = saved.warnings;
        for w in trigger.warnings {
            if !warnings.contains(&w) {
                warnings.push(w);
            }
        }
        let converged = matches!(run.end, PollEnd::Converged);
        let report = ApplyReport {
            result: ApplyResult {
                success: converged,
                warnings,
                restarted_services: trigger.restarted_services,
                service_statuses: run.statuses,
            },
            ticks: run.ticks,
            poll_errors: run.poll_errors,
            elapsed: self.clock.now().saturating_sub(started),
        };

        let failure = match run.end {
            PollEnd::Cancelled => return self.cancelled(),
            PollEnd::Converged => {
                info!(ticks = report.ticks, "services converged");
                self.set_state(ApplyState::Converged);
                return Ok(ApplyOutcome::Converged(report));
            }
            PollEnd::RestartFailed(services) => {
                warn!(?services, ticks = report.ticks, "restart failed");
                ApplyFailure::RestartFailed { services }
            }
            PollEnd::Timeout(waited) => {
                warn!(ticks = report.ticks, waited_ms = waited.as_millis() as u64, "services did not converge before timeout");
                ApplyFailure::Timeout { waited }
            }
        };
        self.set_state(ApplyState::Failed);
        Ok(ApplyOutcome::NotConverged { failure, report })
    }

    fn cancelled<T>(&self) -> Result<T, ApplyError> {
        info!("apply cancelled");
        self.set_state(ApplyState::Idle);
        Err(ApplyError::Cancelled)
    }

    async fn poll(&self, token: &CancellationToken, initial: Vec<ServiceHealthStatus>) -> PollRun {
        let opts = &self.options;
        let deadline = self
            .clock
            .now()
            .checked_add(opts.timeout)
            .unwrap_or(Duration::MAX);
        let mut run = PollRun {
            end: PollEnd::Timeout(Duration::ZERO),
            statuses: initial,
            ticks: 0,
            poll_errors: 0,
        };
        let poll_start = self.clock.now();

        loop {
            let now = self.clock.now();
            if now >= deadline {
                run.end = PollEnd::Timeout(now.saturating_sub(poll_start));
                return run;
            }

            let wait = opts.interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    run.end = PollEnd::Cancelled;
                    return run;
                }
                _ = self.clock.sleep(wait) => {}
            }
            if token.is_cancelled() {
                run.end = PollEnd::Cancelled;
                return run;
            }

            run.ticks += 1;
            self.set_state(ApplyState::Polling { tick: run.ticks });
            let fetched = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    run.end = PollEnd::Cancelled;
                    return run;
                }
                r = self.repo.get_service_health() => r,
                _ = self.clock.sleep(deadline.saturating_sub(self.clock.now())) => {
                    run.poll_errors += 1;
                    warn!(tick = run.ticks, "health poll still pending at deadline, abandoning it");
                    run.end = PollEnd::Timeout(self.clock.now().saturating_sub(poll_start));
                    return run;
                }
            };

            match fetched {
                Ok(statuses) => {
                    run.statuses = statuses;
                    if all_settled(&run.statuses) {
                        run.end = PollEnd::Converged;
                        return run;
                    }
                    if opts.fail_fast {
                        let failed: Vec<String> = run
                            .statuses
                            .iter()
                            .filter(|s| s.restart_failed())
                            .map(|s| s.name.clone())
                            .collect();
                        if !failed.is_empty() {
                            run.end = PollEnd::RestartFailed(failed);
                            return run;
                        }
                    }
                    debug!(
                        tick = run.ticks,
                        pending = run.statuses.iter().filter(|s| !s.is_settled()).count(),
                        "waiting for services"
                    );
                }
                // a missed poll says nothing about the services themselves
                Err(e) => {
                    run.poll_errors += 1;
                    warn!(tick = run.ticks, error = %e, "health poll failed, retrying next tick");
                }
            }
        }
    }
}
