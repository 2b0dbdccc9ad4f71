use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::warnings::{AttemptState, CheatingWarning, CountSource, Transition, WarningCounter};
use crate::cloud_reporter::reporter::{ReportJob, ReporterActor};
use crate::cloud_reporter::{ActionType, AttemptApi, WarningSummary};
use crate::config::ClientConfig;
use crate::environment::{BrowserEvent, Detection, ViolationDetector};
use crate::error::ApiError;

const SIGNAL_CAPACITY: usize = 16;

struct Session {
    attempt_id: Option<String>,
    // bumped on every start and stop, stale reports carry an older value
    epoch: u64,
    counter: WarningCounter,
}

/// State shared between the service handle and the reporter task.
pub(crate) struct Shared {
    detector: ViolationDetector,
    session: Mutex<Session>,
    warnings: broadcast::Sender<CheatingWarning>,
    auto_submit: broadcast::Sender<bool>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        let session = self.session();
        self.detector.is_active() && session.epoch == epoch && session.attempt_id.is_some()
    }

    /// Folds the outcome of one violation report into the counter and emits
    /// the resulting warning or auto-submit signal.
    pub(crate) fn settle(&self, epoch: u64, action: ActionType, outcome: Result<WarningSummary, ApiError>) {
        // emitted under the lock so a concurrent stop cannot slip in between
        let mut session = self.session();
        if !self.detector.is_active() || session.epoch != epoch {
            debug!(%action, "[reporter] report resolved after monitoring stopped, discarding");
            return;
        }

        let source = match outcome {
            Ok(summary) => CountSource::Server(server_count(&summary, session.counter.max())),
            Err(e) => {
                warn!(error = %e, %action, "[reporter] violation sync failed, counting locally");
                CountSource::LocalIncrement
            }
        };
        let transition = session.counter.apply(source, action);
        self.emit(transition);
    }

    fn emit(&self, transition: Transition) {
        match transition {
            Transition::Warning(warning) => {
                info!(
                    warning_count = warning.warning_count,
                    remaining = warning.remaining_warnings,
                    action = %warning.action_type,
                    "[monitor] cheating warning"
                );
                // no subscribers is fine
                let _ = self.warnings.send(warning);
            }
            Transition::AutoSubmit => {
                info!("[monitor] warning limit reached, auto-submitting attempt");
                let _ = self.auto_submit.send(true);
            }
            Transition::Ignored => {}
        }
    }
}

/// Resolves the backend's view to a count, saturating when the backend
/// already decided the attempt must be submitted.
fn server_count(summary: &WarningSummary, max: u32) -> u32 {
    if summary.max_warnings != max {
        debug!(server_max = summary.max_warnings, max, "[monitor] backend uses a different warning limit");
    }
    if summary.warning_count > max {
        warn!(warning_count = summary.warning_count, max, "[monitor] backend count above limit, clamping");
    }
    if summary.should_auto_submit {
        max
    } else {
        summary.warning_count
    }
}

/// Anti-cheating monitor for one exam attempt at a time.
///
/// Must be created inside a tokio runtime: it spawns the reporter task that
/// serialises violation reports.
#[derive(Clone)]
pub struct AntiCheatingService {
    shared: Arc<Shared>,
    api: Arc<dyn AttemptApi>,
    reports: mpsc::UnboundedSender<ReportJob>,
}

impl AntiCheatingService {
    pub fn new(api: Arc<dyn AttemptApi>, config: &ClientConfig) -> Self {
        let (warnings, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (auto_submit, _) = broadcast::channel(SIGNAL_CAPACITY);

        let shared = Arc::new(Shared {
            detector: ViolationDetector::new(),
            session: Mutex::new(Session {
                attempt_id: None,
                epoch: 0,
                counter: WarningCounter::new(config.max_warnings),
            }),
            warnings,
            auto_submit,
        });

        let reports = ReporterActor::spawn(api.clone(), shared.clone(), config.user_agent.clone());

        Self { shared, api, reports }
    }

    pub fn detector(&self) -> &ViolationDetector {
        &self.shared.detector
    }

    pub fn subscribe_warnings(&self) -> broadcast::Receiver<CheatingWarning> {
        self.shared.warnings.subscribe()
    }

    pub fn subscribe_auto_submit(&self) -> broadcast::Receiver<bool> {
        self.shared.auto_submit.subscribe()
    }

    /// Resumes the attempt's warning count from the backend and starts
    /// watching for violations.
    pub async fn start_monitoring(&self, attempt_id: &str) {
        self.shared.detector.deactivate();
        let epoch = {
            let mut session = self.shared.session();
            session.epoch += 1;
            session.attempt_id = Some(attempt_id.to_string());
            session.counter.reset();
            session.epoch
        };

        let max = self.shared.session().counter.max();
        let resumed = match self.api.fetch_warnings(attempt_id).await {
            Ok(summary) => server_count(&summary, max),
            Err(e) => {
                error!(attempt_id, error = %e, "[monitor] could not load existing warnings, starting from zero");
                0
            }
        };

        let mut session = self.shared.session();
        if session.epoch != epoch {
            debug!(attempt_id, "[monitor] start superseded before warnings loaded");
            return;
        }
        let transition = session.counter.resume(resumed);
        self.shared.detector.activate();

        info!(attempt_id, warning_count = resumed.min(max), "[monitor] monitoring started");
        self.shared.emit(transition);
    }

    /// Stops watching. Safe to call repeatedly; reports still in flight are
    /// discarded when they resolve.
    pub fn stop_monitoring(&self) {
        let mut session = self.shared.session();
        self.shared.detector.deactivate();
        session.epoch += 1;
        session.counter.reset();
        if let Some(attempt_id) = session.attempt_id.take() {
            info!(attempt_id = %attempt_id, "[monitor] monitoring stopped");
        }
    }

    /// Runs an event through the detector and queues a report for any
    /// violation it finds.
    pub fn handle_event(&self, event: &BrowserEvent) -> Detection {
        let detection = self.shared.detector.inspect(event);
        if let Some(action) = detection.action {
            self.handle_cheating_attempt(action);
        }
        detection
    }

    /// Queues a violation report. Returns false when no attempt is monitored.
    pub fn handle_cheating_attempt(&self, action: ActionType) -> bool {
        let job = {
            let session = self.shared.session();
            if !self.shared.detector.is_active() {
                return false;
            }
            let Some(attempt_id) = session.attempt_id.clone() else {
                return false;
            };
            ReportJob::Violation {
                attempt_id,
                epoch: session.epoch,
                action,
            }
        };

        if self.reports.send(job).is_err() {
            warn!(%action, "[monitor] reporter is gone, violation not reported");
            return false;
        }
        debug!(%action, "[monitor] violation queued");
        true
    }

    /// Waits until every report queued so far has been settled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.reports.send(ReportJob::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    pub fn should_auto_submit(&self) -> bool {
        self.shared.session().counter.should_auto_submit()
    }

    /// Fires the auto-submit signal without waiting for more violations.
    /// Returns false when nothing is monitored or it already fired for this
    /// attempt.
    pub fn force_auto_submit(&self) -> bool {
        let mut session = self.shared.session();
        if !self.shared.detector.is_active() || session.attempt_id.is_none() {
            debug!("[monitor] forced auto-submit with no active attempt");
            return false;
        }
        let transition = session.counter.saturate();
        let fired = transition == Transition::AutoSubmit;
        self.shared.emit(transition);
        fired
    }

    /// The attempt hit the warning limit but has not been submitted yet,
    /// e.g. because an earlier submit call failed.
    pub fn forced_submit_pending(&self) -> bool {
        self.is_monitoring() && self.should_auto_submit()
    }

    /// Submits the monitored attempt and stops monitoring once the backend
    /// accepted it. Monitoring stays on when the submit fails.
    pub async fn submit_attempt(&self) -> Result<(), ApiError> {
        self.flush().await;
        let Some(attempt_id) = self.attempt_id() else {
            return Err(ApiError::NoAttempt);
        };

        self.api.submit_attempt(&attempt_id).await?;
        info!(attempt_id = %attempt_id, "[monitor] attempt submitted");
        self.stop_monitoring();
        Ok(())
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.detector.is_active()
    }

    pub fn attempt_id(&self) -> Option<String> {
        self.shared.session().attempt_id.clone()
    }

    pub fn warning_count(&self) -> u32 {
        self.shared.session().counter.count()
    }

    pub fn remaining_warnings(&self) -> u32 {
        self.shared.session().counter.remaining()
    }

    pub fn state(&self) -> AttemptState {
        self.shared.session().counter.state()
    }
}
