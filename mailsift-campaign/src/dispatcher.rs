//! Sequential, rate-limited campaign sending.
//!
//! A [`Dispatcher`] runs at most one campaign at a time. Each campaign is a
//! single background task that sends to its targets in order, pausing
//! `delay_between` between messages, and is controlled through the
//! [`CampaignHandle`] returned when it starts.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use mailsift_common::internal;
use parking_lot::Mutex;
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::{
    error::CampaignError,
    settings::SmtpSettings,
    template,
    transport::{OutgoingMail, SmtpTransport, Transport},
    types::{
        CampaignMessage, CampaignProgress, CampaignReport, CampaignStats, CampaignTarget,
        DispatcherStatus, SendOutcome,
    },
};

/// How long [`CampaignHandle::cancel_and_wait`] is usually given.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// State of one campaign, shared between its task, its handle and the dispatcher.
#[derive(Debug)]
struct CampaignState {
    id: Ulid,
    stats: Mutex<CampaignStats>,
    outcomes: Mutex<Vec<SendOutcome>>,
    cancel: CancellationToken,
}

impl CampaignState {
    fn new(capacity: usize) -> Self {
        Self {
            id: Ulid::new(),
            stats: Mutex::new(CampaignStats::started_now()),
            outcomes: Mutex::new(Vec::with_capacity(capacity)),
            cancel: CancellationToken::new(),
        }
    }

    fn record(&self, outcome: SendOutcome) -> CampaignStats {
        let mut stats = self.stats.lock();
        stats.record(outcome.status);
        self.outcomes.lock().push(outcome);
        *stats
    }

    fn report(&self) -> CampaignReport {
        CampaignReport {
            campaign_id: self.id,
            stats: *self.stats.lock(),
            outcomes: self.outcomes.lock().clone(),
        }
    }
}

pub struct Dispatcher {
    settings: SmtpSettings,
    transport: Arc<dyn Transport>,
    busy: Arc<AtomicBool>,
    current: Mutex<Option<Arc<CampaignState>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(settings: SmtpSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
            busy: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        }
    }

    /// A dispatcher that submits over SMTP with `settings`.
    #[must_use]
    pub fn smtp(settings: SmtpSettings) -> Self {
        let transport = Arc::new(SmtpTransport::new(settings.clone()));
        Self::new(settings, transport)
    }

    #[must_use]
    pub const fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Starts sending `message` to every target, in order, on a background task.
    ///
    /// # Errors
    ///
    /// Returns `CampaignError::Configuration` for unusable settings and
    /// `CampaignError::AlreadySending` while another campaign is running. In
    /// both cases nothing is started and no state changes.
    pub fn send_campaign(
        &self,
        targets: Vec<CampaignTarget>,
        message: CampaignMessage,
        progress: Option<UnboundedSender<CampaignProgress>>,
    ) -> Result<CampaignHandle, CampaignError> {
        self.settings.validate()?;
        let from = self
            .settings
            .from_address()
            .ok_or_else(|| CampaignError::Configuration("no sender address".to_string()))?
            .to_string();

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CampaignError::AlreadySending);
        }

        let state = Arc::new(CampaignState::new(targets.len()));
        *self.current.lock() = Some(Arc::clone(&state));

        let delay = self.settings.delay_between();
        internal!(
            level = INFO,
            "Starting campaign {} to {} target(s), {delay:?} apart",
            state.id,
            targets.len()
        );

        let guard = FinishGuard {
            busy: Arc::clone(&self.busy),
            state: Arc::clone(&state),
            progress: progress.clone(),
        };
        let job = SendLoop {
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&state),
            targets,
            message,
            from,
            delay,
            progress,
        };

        let task = tokio::spawn(async move {
            let _guard = guard;
            job.run().await;
        });

        Ok(CampaignHandle { state, task })
    }

    /// Requests cancellation of the running campaign, if any.
    pub fn cancel(&self) {
        if let Some(state) = self.current.lock().as_ref() {
            state.cancel.cancel();
        }
    }

    /// Statistics of the running campaign, or of the last one.
    #[must_use]
    pub fn stats(&self) -> CampaignStats {
        self.current
            .lock()
            .as_ref()
            .map(|state| *state.stats.lock())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn status(&self) -> DispatcherStatus {
        let cancelled = self
            .current
            .lock()
            .as_ref()
            .is_some_and(|state| state.cancel.is_cancelled());

        DispatcherStatus {
            is_sending: self.is_sending(),
            cancelled,
            stats: self.stats(),
            server: self.settings.server.clone(),
            port: self.settings.port,
            username: self.settings.username.clone(),
            delay_between: self.settings.delay_between(),
        }
    }
}

/// Releases the dispatcher however the send loop ends, including abort.
struct FinishGuard {
    busy: Arc<AtomicBool>,
    state: Arc<CampaignState>,
    progress: Option<UnboundedSender<CampaignProgress>>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let stats = {
            let mut stats = self.state.stats.lock();
            stats.end_time = Some(Utc::now());
            *stats
        };
        // Cleared before Finished is sent; listeners may start the next campaign.
        self.busy.store(false, Ordering::Release);

        internal!(
            level = INFO,
            "Campaign {} finished: {} sent, {} succeeded, {} failed",
            self.state.id,
            stats.total_sent,
            stats.successful,
            stats.failed
        );

        if let Some(progress) = &self.progress {
            let _ = progress.send(CampaignProgress::Finished { stats });
        }
    }
}

struct SendLoop {
    transport: Arc<dyn Transport>,
    state: Arc<CampaignState>,
    targets: Vec<CampaignTarget>,
    message: CampaignMessage,
    from: String,
    delay: Duration,
    progress: Option<UnboundedSender<CampaignProgress>>,
}

impl SendLoop {
    async fn run(self) {
        let total = self.targets.len();
        let cancel = self.state.cancel.clone();

        for (index, target) in self.targets.iter().enumerate() {
            if cancel.is_cancelled() {
                internal!(
                    level = INFO,
                    "Campaign {} cancelled after {index} of {total}",
                    self.state.id
                );
                break;
            }

            let outcome = self.send_one(target).await;
            self.state.record(outcome.clone());

            let current = index + 1;
            if let Some(progress) = &self.progress {
                let _ = progress.send(CampaignProgress::Sent {
                    percent: percent(current, total),
                    current,
                    total,
                    outcome,
                });
            }

            if current < total {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(self.delay) => {}
                }
            }
        }
    }

    async fn send_one(&self, target: &CampaignTarget) -> SendOutcome {
        let rendered = template::personalize(&self.message, target);
        let mail = OutgoingMail {
            from: self.from.clone(),
            to: target.address.clone(),
            subject: rendered.subject,
            body: rendered.body,
            html: rendered.html,
            attachments: self.message.attachments.clone(),
        };

        match self.transport.send(&mail).await {
            Ok(()) => {
                internal!(level = DEBUG, "Sent to {}", target.address);
                SendOutcome::success(target.clone())
            }
            Err(err) => {
                internal!(level = WARN, "Sending to {} failed: {err}", target.address);
                SendOutcome::failure(target.clone(), &err.to_string())
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(current: usize, total: usize) -> f64 {
    current as f64 / total as f64 * 100.0
}

/// How a campaign ended after [`CampaignHandle::cancel_and_wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The send loop observed the cancellation and exited.
    Stopped(CampaignReport),
    /// The grace period elapsed and the task was aborted.
    TimedOut(CampaignReport),
}

impl Termination {
    #[must_use]
    pub const fn report(&self) -> &CampaignReport {
        match self {
            Self::Stopped(report) | Self::TimedOut(report) => report,
        }
    }

    #[must_use]
    pub fn into_report(self) -> CampaignReport {
        match self {
            Self::Stopped(report) | Self::TimedOut(report) => report,
        }
    }
}

/// Control over one running campaign.
#[derive(Debug)]
pub struct CampaignHandle {
    state: Arc<CampaignState>,
    task: JoinHandle<()>,
}

impl CampaignHandle {
    #[must_use]
    pub fn id(&self) -> Ulid {
        self.state.id
    }

    /// Requests cancellation. The message in flight, if any, completes.
    pub fn cancel(&self) {
        self.state.cancel.cancel();
    }

    #[must_use]
    pub fn stats(&self) -> CampaignStats {
        *self.state.stats.lock()
    }

    /// Waits for the campaign to end on its own.
    pub async fn join(self) -> CampaignReport {
        if let Err(err) = self.task.await {
            internal!(level = ERROR, "Campaign {} task failed: {err}", self.state.id);
        }
        self.state.report()
    }

    /// Cancels, then waits up to `grace` for the send loop to exit before
    /// aborting it. Either way the outcomes recorded so far are returned.
    pub async fn cancel_and_wait(mut self, grace: Duration) -> Termination {
        self.cancel();

        if tokio::time::timeout(grace, &mut self.task).await.is_ok() {
            return Termination::Stopped(self.state.report());
        }

        internal!(
            level = WARN,
            "Campaign {} did not stop within {grace:?}, aborting",
            self.state.id
        );
        self.task.abort();
        let _ = (&mut self.task).await;
        Termination::TimedOut(self.state.report())
    }
}
