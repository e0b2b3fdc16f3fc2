//! Bounded-concurrency driver for the verification pipeline.
//!
//! Every address runs the same short-circuiting pipeline:
//!
//! 1. syntax, with no I/O
//! 2. MX lookup on the domain
//! 3. SMTP recipient probe
//!
//! At most [`MAX_WORKERS`] pipelines run at once. Results are collected in
//! completion order, not submission order.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures_util::FutureExt;
use mailsift_common::{VerificationStatus, internal, parse_address};
use serde::Serialize;
use tokio::{sync::mpsc::UnboundedSender, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    dns::{DnsResolver, LookupBudgets, MailExchangerLookup, has_mx},
    error::VerifyError,
    probe::{ProbeConfig, Prober},
    report::VerificationReport,
    types::{CheckDepth, VerificationResult, VerifierConfig, VerifyOptions},
};

/// Hard ceiling on concurrent pipelines, whatever `max_workers` asks for.
pub const MAX_WORKERS: usize = 50;

/// Emitted once per completed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyProgress {
    pub completed: usize,
    pub total: usize,
    pub address: String,
    pub status: VerificationStatus,
}

pub struct Verifier {
    resolver: Arc<dyn MailExchangerLookup>,
    probe: ProbeConfig,
    budgets: LookupBudgets,
    options: VerifyOptions,
}

impl Verifier {
    #[must_use]
    pub fn new(resolver: Arc<dyn MailExchangerLookup>, options: VerifyOptions) -> Self {
        Self {
            resolver,
            probe: ProbeConfig::default(),
            budgets: LookupBudgets::default(),
            options,
        }
    }

    /// Builds a verifier backed by the system resolver.
    #[must_use]
    pub fn from_config(config: &VerifierConfig) -> Self {
        let resolver = DnsResolver::new(config.dns.clone());
        let budgets = resolver.budgets();

        Self::new(Arc::new(resolver), config.options())
            .with_probe_config(config.probe.clone())
            .with_budgets(budgets)
    }

    #[must_use]
    pub fn with_probe_config(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub const fn with_budgets(mut self, budgets: LookupBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    #[must_use]
    pub const fn options(&self) -> &VerifyOptions {
        &self.options
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline {
            resolver: Arc::clone(&self.resolver),
            prober: Prober::new(Arc::clone(&self.resolver), self.probe.clone())
                .with_budgets(self.budgets),
            budgets: self.budgets,
            options: self.options,
        }
    }

    fn validate(&self) -> Result<(), VerifyError> {
        if self.options.max_workers == 0 {
            return Err(VerifyError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.options.timeout.is_zero() {
            return Err(VerifyError::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Verifies a single address outside of any batch.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Configuration` for unusable options.
    pub async fn verify_one(&self, address: &str) -> Result<VerificationResult, VerifyError> {
        self.validate()?;
        Ok(self
            .pipeline()
            .run(address, &CancellationToken::new())
            .await)
    }

    /// Verifies every address, running at most
    /// `min(max_workers, addresses.len(), MAX_WORKERS)` pipelines at once.
    ///
    /// The cancellation token is checked as each pipeline starts; pipelines
    /// already in flight run to completion, and the rest report `cancelled`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Configuration` before any work for unusable
    /// options. Failures of individual addresses never fail the batch.
    pub async fn verify_batch(
        &self,
        addresses: Vec<String>,
        progress: Option<UnboundedSender<VerifyProgress>>,
        cancel: CancellationToken,
    ) -> Result<VerificationReport, VerifyError> {
        self.validate()?;

        if addresses.is_empty() {
            return Ok(VerificationReport::default());
        }

        let total = addresses.len();
        let workers = self.options.max_workers.min(total).min(MAX_WORKERS);
        internal!(
            level = INFO,
            "Verifying {total} address(es) with {workers} worker(s) in {} mode",
            self.options.mode
        );

        let pipeline = Arc::new(self.pipeline());
        let completed = Arc::new(AtomicUsize::new(0));
        let mut pending = addresses.into_iter();
        let mut join_set: JoinSet<VerificationResult> = JoinSet::new();

        let spawn = |join_set: &mut JoinSet<VerificationResult>, address: String| {
            let task = Task {
                pipeline: Arc::clone(&pipeline),
                cancel: cancel.clone(),
                completed: Arc::clone(&completed),
                progress: progress.clone(),
                total,
            };
            join_set.spawn(task.run(address));
        };

        for address in pending.by_ref().take(workers) {
            spawn(&mut join_set, address);
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => internal!(level = ERROR, "Verification task did not complete: {err}"),
            }

            if let Some(address) = pending.next() {
                spawn(&mut join_set, address);
            }
        }

        let report = VerificationReport::new(results);
        internal!(level = INFO, "{}", report.summary());
        Ok(report)
    }
}

struct Pipeline {
    resolver: Arc<dyn MailExchangerLookup>,
    prober: Prober,
    budgets: LookupBudgets,
    options: VerifyOptions,
}

impl Pipeline {
    async fn run(&self, address: &str, cancel: &CancellationToken) -> VerificationResult {
        if cancel.is_cancelled() {
            return VerificationResult::cancelled(address.to_string());
        }

        let mut result = VerificationResult::new(address.to_string());

        let mailbox = match parse_address(address) {
            Ok(mailbox) => mailbox,
            Err(err) => {
                internal!(level = DEBUG, "{address}: {err}");
                return result;
            }
        };
        result.format = true;

        if self.options.depth == CheckDepth::Syntax {
            result.status = VerificationStatus::Valid;
            return result;
        }

        result.mx = has_mx(self.resolver.as_ref(), &mailbox.domain, self.budgets.mx_check).await;
        if !result.mx {
            internal!(level = DEBUG, "{address}: no MX for {}", mailbox.domain);
            return result;
        }

        if self.options.depth == CheckDepth::Mx {
            result.status = VerificationStatus::Valid;
            return result;
        }

        let outcome = self
            .prober
            .probe(address, self.options.mode, self.options.timeout)
            .await;
        result.with_probe(outcome)
    }
}

/// One spawned pipeline plus its share of the batch bookkeeping.
struct Task {
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
    completed: Arc<AtomicUsize>,
    progress: Option<UnboundedSender<VerifyProgress>>,
    total: usize,
}

impl Task {
    async fn run(self, address: String) -> VerificationResult {
        let result = AssertUnwindSafe(self.pipeline.run(&address, &self.cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let err = VerifyError::Pipeline {
                    address: address.clone(),
                    reason: panic_reason(panic.as_ref()),
                };
                internal!(level = ERROR, "{err}");
                VerificationResult::error(address.clone())
            });

        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = &self.progress {
            // The receiver may have gone away; the batch still completes.
            let _ = progress.send(VerifyProgress {
                completed,
                total: self.total,
                address,
                status: result.status,
            });
        }

        result
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}
