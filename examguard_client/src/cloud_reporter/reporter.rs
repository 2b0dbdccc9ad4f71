use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::api::AttemptApi;
use super::logger::{ActionType, CheatingViolation};
use crate::attempt::service::Shared;

pub(crate) enum ReportJob {
    Violation {
        attempt_id: String,
        epoch: u64,
        action: ActionType,
    },
    // answered once every job queued before it has been handled
    Flush(oneshot::Sender<()>),
}

/// Single consumer of violation reports. Reports are sent one at a time in
/// arrival order, so each count update sees the result of the previous one.
pub(crate) struct ReporterActor {
    rx: mpsc::UnboundedReceiver<ReportJob>,
    api: Arc<dyn AttemptApi>,
    shared: Arc<Shared>,
    user_agent: String,
}

impl ReporterActor {
    pub(crate) fn spawn(
        api: Arc<dyn AttemptApi>,
        shared: Arc<Shared>,
        user_agent: String,
    ) -> mpsc::UnboundedSender<ReportJob> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut actor = Self {
                rx,
                api,
                shared,
                user_agent,
            };
            actor.run().await;
        });

        tx
    }

    async fn run(&mut self) {
        while let Some(job) = self.rx.recv().await {
            match job {
                ReportJob::Violation {
                    attempt_id,
                    epoch,
                    action,
                } => self.report(&attempt_id, epoch, action).await,
                ReportJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!("[reporter] queue closed, reporter exiting");
    }

    async fn report(&self, attempt_id: &str, epoch: u64, action: ActionType) {
        if !self.shared.is_current(epoch) {
            tracing::debug!(attempt_id, %action, "[reporter] monitoring stopped, dropping queued report");
            return;
        }

        let violation = CheatingViolation::from_action(action, &self.user_agent);
        let outcome = self.api.report_violation(attempt_id, &violation).await;
        self.shared.settle(epoch, action, outcome);
    }
}
