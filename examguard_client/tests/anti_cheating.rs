use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use examguard_client::{
    ActionType, AntiCheatingService, ApiError, AttemptApi, AttemptState, BrowserEvent, CheatingViolation,
    CheatingWarning, ClientConfig, Key, KeyStroke, ViolationType, WarningSummary,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::Semaphore;
use tokio::time::timeout;

#[derive(Default)]
struct FakeApi {
    recorded: AtomicU32,
    resume_count: AtomicU32,
    fail_fetch: AtomicBool,
    fail_reports: AtomicBool,
    // number of submit calls that fail before one succeeds
    failing_submits: AtomicU32,
    // reported instead of the real count when set
    count_override: Mutex<Option<u32>>,
    // reports wait for a permit when set
    gate: Option<Arc<Semaphore>>,
    violations: Mutex<Vec<(String, CheatingViolation)>>,
    submitted: Mutex<Vec<String>>,
}

impl FakeApi {
    fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: Some(gate.clone()), ..Self::default() }, gate)
    }

    fn summary(count: u32) -> WarningSummary {
        WarningSummary {
            warning_count: count,
            max_warnings: 3,
            remaining_warnings: 3u32.saturating_sub(count),
            should_auto_submit: count >= 3,
            violations: None,
        }
    }

    fn reports(&self) -> usize {
        self.violations.lock().unwrap().len()
    }
}

#[async_trait]
impl AttemptApi for FakeApi {
    async fn report_violation(
        &self,
        attempt_id: &str,
        violation: &CheatingViolation,
    ) -> Result<WarningSummary, ApiError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.violations
            .lock()
            .unwrap()
            .push((attempt_id.to_string(), violation.clone()));

        if self.fail_reports.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected {
                endpoint: format!("/attempts/{attempt_id}/cheating-violation"),
                status: 503,
            });
        }

        let count = self.recorded.fetch_add(1, Ordering::SeqCst) + 1;
        let reported = self.count_override.lock().unwrap().unwrap_or(count);
        Ok(Self::summary(reported))
    }

    async fn fetch_warnings(&self, attempt_id: &str) -> Result<WarningSummary, ApiError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected {
                endpoint: format!("/attempts/{attempt_id}/cheating-warnings"),
                status: 500,
            });
        }
        let count = self.resume_count.load(Ordering::SeqCst);
        self.recorded.store(count, Ordering::SeqCst);
        Ok(Self::summary(count))
    }

    async fn submit_attempt(&self, attempt_id: &str) -> Result<(), ApiError> {
        let failing = self.failing_submits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_submits.store(failing - 1, Ordering::SeqCst);
            return Err(ApiError::Rejected {
                endpoint: format!("/attempts/{attempt_id}/submit"),
                status: 503,
            });
        }
        self.submitted.lock().unwrap().push(attempt_id.to_string());
        Ok(())
    }
}

fn service_with(api: Arc<FakeApi>) -> AntiCheatingService {
    AntiCheatingService::new(api, &ClientConfig::default())
}

async fn next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("signal timed out")
        .expect("signal channel closed")
}

fn assert_silent<T: Clone + std::fmt::Debug>(rx: &mut broadcast::Receiver<T>) {
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn blur_after_fresh_start_emits_first_warning() {
    let api = Arc::new(FakeApi::default());
    let service = service_with(api.clone());
    let mut warnings = service.subscribe_warnings();

    service.start_monitoring("A1").await;
    let detection = service.handle_event(&BrowserEvent::WindowBlur);
    assert_eq!(detection.action, Some(ActionType::TabSwitch));

    let warning = next(&mut warnings).await;
    assert_eq!(
        warning,
        CheatingWarning {
            warning_count: 1,
            max_warnings: 3,
            action_type: ActionType::TabSwitch,
            remaining_warnings: 2,
        }
    );

    let violations = api.violations.lock().unwrap();
    assert_eq!(violations[0].0, "A1");
    assert_eq!(violations[0].1.kind, ViolationType::TabSwitch);
    assert_eq!(violations[0].1.metadata.original_action, ActionType::TabSwitch);
}

#[tokio::test]
async fn third_blur_auto_submits_once_without_warning() {
    let api = Arc::new(FakeApi::default());
    let service = service_with(api.clone());
    let mut warnings = service.subscribe_warnings();
    let mut auto_submit = service.subscribe_auto_submit();

    service.start_monitoring("A2").await;
    for _ in 0..3 {
        service.handle_event(&BrowserEvent::WindowBlur);
    }
    service.flush().await;

    assert_eq!(next(&mut warnings).await.warning_count, 1);
    assert_eq!(next(&mut warnings).await.warning_count, 2);
    assert_silent(&mut warnings);
    assert!(next(&mut auto_submit).await);
    assert_silent(&mut auto_submit);
    assert_eq!(service.state(), AttemptState::Exhausted);

    // a fourth violation is still reported but emits nothing
    service.handle_event(&BrowserEvent::WindowBlur);
    service.flush().await;
    assert_eq!(api.reports(), 4);
    assert_silent(&mut warnings);
    assert_silent(&mut auto_submit);
    assert_eq!(service.warning_count(), 3);
    assert_eq!(service.remaining_warnings(), 0);
}

#[tokio::test]
async fn failed_report_falls_back_to_local_count() {
    let api = Arc::new(FakeApi::default());
    api.fail_reports.store(true, Ordering::SeqCst);
    let service = service_with(api.clone());
    let mut warnings = service.subscribe_warnings();

    service.start_monitoring("A3").await;
    service.handle_event(&BrowserEvent::KeyDown(KeyStroke::plain(Key::F5)));

    assert_eq!(
        next(&mut warnings).await,
        CheatingWarning {
            warning_count: 1,
            max_warnings: 3,
            action_type: ActionType::Refresh,
            remaining_warnings: 2,
        }
    );
    assert_eq!(api.reports(), 1);
}

#[tokio::test]
async fn local_fallback_never_exceeds_limit() {
    let api = Arc::new(FakeApi::default());
    api.fail_reports.store(true, Ordering::SeqCst);
    let service = service_with(api.clone());
    let mut auto_submit = service.subscribe_auto_submit();

    service.start_monitoring("A4").await;
    for _ in 0..5 {
        service.handle_cheating_attempt(ActionType::TabSwitch);
    }
    service.flush().await;

    assert!(next(&mut auto_submit).await);
    assert_silent(&mut auto_submit);
    assert_eq!(service.warning_count(), 3);
}

#[tokio::test]
async fn resume_with_exhausted_count_requires_submit() {
    let api = Arc::new(FakeApi::default());
    api.resume_count.store(3, Ordering::SeqCst);
    let service = service_with(api.clone());
    let mut auto_submit = service.subscribe_auto_submit();

    service.start_monitoring("A5").await;

    assert!(service.should_auto_submit());
    assert!(next(&mut auto_submit).await);
    assert_eq!(api.reports(), 0);
    assert!(!service.force_auto_submit());
    assert_silent(&mut auto_submit);
}

#[tokio::test]
async fn resume_continues_from_backend_count() {
    let api = Arc::new(FakeApi::default());
    api.resume_count.store(2, Ordering::SeqCst);
    let service = service_with(api.clone());
    let mut warnings = service.subscribe_warnings();
    let mut auto_submit = service.subscribe_auto_submit();

    service.start_monitoring("A6").await;
    assert_eq!(service.state(), AttemptState::Monitoring { count: 2 });

    service.handle_event(&BrowserEvent::VisibilityChange { hidden: true });
    assert!(next(&mut auto_submit).await);
    assert_silent(&mut warnings);
}

#[tokio::test]
async fn failed_resume_starts_from_zero() {
    let api = Arc::new(FakeApi::default());
    api.fail_fetch.store(true, Ordering::SeqCst);
    let service = service_with(api);

    service.start_monitoring("A7").await;

    assert!(service.is_monitoring());
    assert_eq!(service.warning_count(), 0);
    assert!(!service.should_auto_submit());
}

#[tokio::test]
async fn events_after_stop_are_not_reported() {
    let api = Arc::new(FakeApi::default());
    let service = service_with(api.clone());
    let mut warnings = service.subscribe_warnings();

    service.start_monitoring("A8").await;
    service.stop_monitoring();
    service.stop_monitoring();

    let detection = service.handle_event(&BrowserEvent::WindowBlur);
    assert_eq!(detection.action, None);
    assert!(!service.handle_cheating_attempt(ActionType::TabSwitch));
    service.flush().await;

    assert_eq!(api.reports(), 0);
    assert_silent(&mut warnings);
    assert_eq!(service.attempt_id(), None);
}

#[tokio::test]
async fn report_resolving_after_stop_is_discarded() {
    let (api, gate) = FakeApi::gated();
    let api = Arc::new(api);
    let service = service_with(api.clone());
    let mut warnings = service.subscribe_warnings();

    service.start_monitoring("A9").await;
    service.handle_event(&BrowserEvent::WindowBlur);
    tokio::task::yield_now().await;
    service.stop_monitoring();

    gate.add_permits(1);
    service.flush().await;

    assert_silent(&mut warnings);
    assert_eq!(service.warning_count(), 0);
    assert!(!service.is_monitoring());
}

#[tokio::test]
async fn report_from_previous_attempt_does_not_leak_into_next() {
    let (api, gate) = FakeApi::gated();
    let api = Arc::new(api);
    let service = service_with(api.clone());
    let mut warnings = service.subscribe_warnings();

    service.start_monitoring("old").await;
    service.handle_event(&BrowserEvent::WindowBlur);
    service.start_monitoring("new").await;

    gate.add_permits(1);
    service.flush().await;

    assert_silent(&mut warnings);
    assert_eq!(service.warning_count(), 0);
    assert_eq!(service.attempt_id().as_deref(), Some("new"));
}

#[tokio::test]
async fn inconsistent_backend_count_is_clamped() {
    let api = Arc::new(FakeApi::default());
    *api.count_override.lock().unwrap() = Some(7);
    let service = service_with(api);
    let mut warnings = service.subscribe_warnings();
    let mut auto_submit = service.subscribe_auto_submit();

    service.start_monitoring("A10").await;
    service.handle_cheating_attempt(ActionType::DevtoolsAccess);
    service.flush().await;

    assert!(next(&mut auto_submit).await);
    assert_silent(&mut warnings);
    assert_eq!(service.warning_count(), 3);
    assert_eq!(service.remaining_warnings(), 0);
}

#[tokio::test]
async fn queued_reports_apply_in_arrival_order() {
    let (api, gate) = FakeApi::gated();
    let api = Arc::new(api);
    let service = service_with(api.clone());
    let mut warnings = service.subscribe_warnings();

    service.start_monitoring("A11").await;
    service.handle_event(&BrowserEvent::WindowBlur);
    service.handle_event(&BrowserEvent::ContextMenu);

    gate.add_permits(2);
    service.flush().await;

    let first = next(&mut warnings).await;
    let second = next(&mut warnings).await;
    assert_eq!((first.warning_count, first.action_type), (1, ActionType::TabSwitch));
    assert_eq!((second.warning_count, second.action_type), (2, ActionType::RightClick));
}

#[tokio::test]
async fn unload_during_attempt_asks_for_confirmation() {
    let api = Arc::new(FakeApi::default());
    let service = service_with(api.clone());

    let before = service.handle_event(&BrowserEvent::BeforeUnload);
    assert!(!before.confirm_unload);

    service.start_monitoring("A12").await;
    let during = service.handle_event(&BrowserEvent::BeforeUnload);
    assert!(during.confirm_unload);
    assert!(during.suppress);
    service.flush().await;

    let violations = api.violations.lock().unwrap();
    assert_eq!(violations[0].1.kind, ViolationType::TabClose);
}

#[tokio::test]
async fn force_auto_submit_bypasses_counting_once() {
    let api = Arc::new(FakeApi::default());
    let service = service_with(api.clone());
    let mut auto_submit = service.subscribe_auto_submit();

    service.start_monitoring("A13").await;
    assert!(service.force_auto_submit());
    assert!(!service.force_auto_submit());

    assert!(next(&mut auto_submit).await);
    assert_silent(&mut auto_submit);
    assert!(service.should_auto_submit());
    assert_eq!(api.reports(), 0);
}

#[tokio::test]
async fn submit_stops_monitoring() {
    let api = Arc::new(FakeApi::default());
    let service = service_with(api.clone());

    service.start_monitoring("A14").await;
    service.submit_attempt().await.unwrap();

    assert_eq!(api.submitted.lock().unwrap().as_slice(), ["A14".to_string()]);
    assert!(!service.is_monitoring());
    assert!(!service.handle_cheating_attempt(ActionType::TabSwitch));
}

#[tokio::test]
async fn failed_forced_submit_stays_pending_until_retry_succeeds() {
    let api = Arc::new(FakeApi::default());
    api.failing_submits.store(1, Ordering::SeqCst);
    let service = service_with(api.clone());
    let mut auto_submit = service.subscribe_auto_submit();

    service.start_monitoring("A15").await;
    for _ in 0..3 {
        service.handle_event(&BrowserEvent::WindowBlur);
    }
    service.flush().await;
    assert!(next(&mut auto_submit).await);

    let err = service.submit_attempt().await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { status: 503, .. }));
    assert!(service.is_monitoring());
    assert!(service.forced_submit_pending());

    // later violations do not re-fire the signal, the pending flag is what drives the retry
    service.handle_event(&BrowserEvent::WindowBlur);
    service.flush().await;
    assert_silent(&mut auto_submit);
    assert!(service.forced_submit_pending());

    service.submit_attempt().await.unwrap();
    assert_eq!(api.submitted.lock().unwrap().as_slice(), ["A15".to_string()]);
    assert!(!service.forced_submit_pending());
    assert!(!service.is_monitoring());
}

#[tokio::test]
async fn force_auto_submit_without_attempt_does_nothing() {
    let service = service_with(Arc::new(FakeApi::default()));
    let mut auto_submit = service.subscribe_auto_submit();

    assert!(!service.force_auto_submit());
    assert_silent(&mut auto_submit);
    assert_eq!(service.warning_count(), 0);
    assert!(!service.should_auto_submit());

    service.start_monitoring("A16").await;
    service.stop_monitoring();
    assert!(!service.force_auto_submit());
    assert_silent(&mut auto_submit);
}

#[tokio::test]
async fn submit_without_attempt_is_an_error() {
    let api = Arc::new(FakeApi::default());
    let service = service_with(api.clone());

    let err = service.submit_attempt().await.unwrap_err();
    assert!(matches!(err, ApiError::NoAttempt));
    assert!(api.submitted.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_signal_arrives_after_stop_returns() {
    for round in 0..20 {
        let (api, gate) = FakeApi::gated();
        let service = service_with(Arc::new(api));
        let mut warnings = service.subscribe_warnings();

        service.start_monitoring(&format!("R{round}")).await;
        service.handle_event(&BrowserEvent::WindowBlur);

        let release = gate.clone();
        let releaser = tokio::spawn(async move { release.add_permits(1) });
        service.stop_monitoring();

        // anything sent before stop took the lock is already queued
        while warnings.try_recv().is_ok() {}
        releaser.await.unwrap();
        service.flush().await;
        assert_silent(&mut warnings);
    }
}
