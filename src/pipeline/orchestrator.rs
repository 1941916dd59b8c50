use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use crate::browser::SessionFactory;
use crate::config::defaults;
use crate::errors::ProbeError;
use crate::payloads::{Corpus, PayloadRecord};
use crate::store::FindingStore;
use crate::worker::{PayloadReport, ScanContext, SessionWorker, WorkerSettings};
use super::progress::{format_duration, ScanProgress};
use super::state::{RunSummary, Tally};

#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Requested pool size, clamped to 1..=10.
    pub threads: usize,
    pub output: PathBuf,
    pub worker: WorkerSettings,
    pub show_progress: bool,
    /// HEAD the attacker server before starting.
    pub check_reachability: bool,
}

/// Drives the whole corpus through a bounded pool of session workers.
pub struct ScanOrchestrator {
    context: Arc<ScanContext>,
    payloads: Arc<Vec<PayloadRecord>>,
    factory: Arc<dyn SessionFactory>,
    settings: ScanSettings,
    cancel_token: CancellationToken,
    run_id: String,
}

/// Applies finished reports: persists findings, keeps tallies, moves the
/// progress bar. Only the orchestrator task touches it.
struct Aggregator {
    store: FindingStore,
    tally: Tally,
    progress: ScanProgress,
}

impl Aggregator {
    async fn absorb(&mut self, report: PayloadReport) {
        for finding in &report.findings {
            match self.store.append(finding).await {
                Ok(()) => {
                    self.tally.findings_written += 1;
                    self.progress.println(&format!(
                        "  {} Payload ID: {} ({})",
                        console::style(finding.status_tag()).green().bold(),
                        finding.id,
                        finding.location
                    ));
                }
                Err(e) => {
                    self.tally.findings_failed += 1;
                    warn!(position = finding.id, error = %e, "Could not persist finding");
                }
            }
        }
        if let Some(err) = &report.error {
            let pass = report.failed_pass.map(|l| l.to_string()).unwrap_or_default();
            warn!(
                position = report.position,
                outcome = report.outcome.as_str(),
                pass = %pass,
                error = %err,
                "Payload did not complete"
            );
        }
        self.tally.record(&report);
        self.progress.advance(self.tally.confirmed());
    }
}

/// Pool size actually used: the request clamped to the hard cap and to the
/// number of payloads.
pub fn effective_workers(requested: usize, payloads: usize) -> usize {
    if requested > defaults::MAX_THREADS {
        warn!(requested, max = defaults::MAX_THREADS, "Thread count above cap, clamping");
    }
    requested.clamp(1, defaults::MAX_THREADS).min(payloads.max(1))
}

impl ScanOrchestrator {
    pub fn new(
        context: ScanContext,
        corpus: Corpus,
        factory: Arc<dyn SessionFactory>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            context: Arc::new(context),
            payloads: Arc::new(corpus.records().to_vec()),
            factory,
            settings,
            cancel_token: CancellationToken::new(),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Share a cancel token with the caller (Ctrl-C handler). Cancelling stops
    /// dispatch; payloads already in flight still finish.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn header_lines(&self, workers: usize) -> Vec<String> {
        let rule = "=".repeat(68);
        let mut lines = vec![
            "xssprobe - Findings".to_string(),
            rule.clone(),
            format!("Run: {}", self.run_id),
            format!("Request: {}", self.context.template.descriptor()),
        ];
        if let Some(secondary) = &self.context.secondary {
            lines.push(format!("Second-order: {}", secondary.descriptor()));
        }
        lines.push(format!("Attacker server: {}", self.context.attacker.url()));
        if workers > 1 {
            lines.push(format!("Multi-threaded mode: {} threads", workers));
        }
        lines.push(rule);
        lines
    }

    /// Warn early when the callback server cannot be reached; never fatal.
    async fn check_attacker_reachable(&self) {
        if self.context.attacker.is_placeholder() {
            warn!(server = self.context.attacker.url(), "Attacker server is the placeholder, callbacks will not reach you");
            return;
        }
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .danger_accept_invalid_certs(true)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Could not build reachability client");
                return;
            }
        };
        match client.head(self.context.attacker.url()).send().await {
            Ok(resp) => info!(server = self.context.attacker.url(), status = resp.status().as_u16(), "Attacker server reachable"),
            Err(e) => warn!(server = self.context.attacker.url(), error = %e, "Attacker server unreachable, callbacks may be lost"),
        }
    }

    pub async fn run(self) -> Result<RunSummary, ProbeError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let total = self.payloads.len();
        let workers = effective_workers(self.settings.threads, total);

        info!(
            run_id = %self.run_id,
            payloads = total,
            workers,
            server = self.context.attacker.url(),
            "Starting scan"
        );

        if self.settings.check_reachability {
            self.check_attacker_reachable().await;
        }

        let store = FindingStore::create(&self.settings.output, &self.header_lines(workers)).await?;
        let mut aggregator = Aggregator {
            store,
            tally: Tally::default(),
            progress: ScanProgress::new(total, self.settings.show_progress),
        };

        if workers == 1 {
            self.run_sequential(&mut aggregator).await?;
        } else {
            self.run_pool(workers, &mut aggregator).await?;
        }

        let cancelled = self.cancel_token.is_cancelled();
        if cancelled {
            warn!(processed = aggregator.tally.processed(), total, "Scan interrupted, drained in-flight payloads");
        }

        if let Err(e) = aggregator.store.canonicalize().await {
            warn!(error = %e, "Findings left in completion order");
        }

        let elapsed = clock.elapsed();
        aggregator.progress.finish(format!(
            "{} confirmed in {}",
            aggregator.tally.confirmed(),
            format_duration(elapsed)
        ));

        let tally = aggregator.tally;
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            duration_ms: elapsed.as_millis() as u64,
            workers,
            total_payloads: total,
            processed: tally.processed(),
            cancelled,
            outcomes: tally.outcomes,
            first_order: tally.first_order,
            second_order: tally.second_order,
            findings_written: tally.findings_written,
            prompts_seen: tally.prompts_seen,
            retried_payloads: tally.retried,
            attacker_server: self.context.attacker.url().to_string(),
            output: self.settings.output.clone(),
        };
        write_summary(&summary).await;
        Ok(summary)
    }

    /// Single worker, no pool.
    async fn run_sequential(&self, aggregator: &mut Aggregator) -> Result<(), ProbeError> {
        let mut worker = SessionWorker::new(
            1,
            Arc::clone(&self.factory),
            Arc::clone(&self.context),
            self.settings.worker.clone(),
        );
        worker.start().await?;

        for record in self.payloads.iter() {
            if self.cancel_token.is_cancelled() {
                break;
            }
            let report = worker.process(record).await;
            aggregator.absorb(report).await;
        }
        worker.shutdown().await;
        debug!(worker = worker.id(), sessions = worker.sessions_created(), "Worker finished");
        Ok(())
    }

    async fn run_pool(&self, workers: usize, aggregator: &mut Aggregator) -> Result<(), ProbeError> {
        let (tx, mut rx) = mpsc::channel::<PayloadReport>(workers * 2);
        let next_index = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(workers);

        for id in 1..=workers {
            let mut worker = SessionWorker::new(
                id,
                Arc::clone(&self.factory),
                Arc::clone(&self.context),
                self.settings.worker.clone(),
            );
            let payloads = Arc::clone(&self.payloads);
            let next_index = Arc::clone(&next_index);
            let started = Arc::clone(&started);
            let cancel = self.cancel_token.clone();
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                if let Err(e) = worker.start().await {
                    error!(worker = id, error = %e, "Worker could not start a browser session");
                    return Err(e);
                }
                started.fetch_add(1, Ordering::SeqCst);

                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let index = next_index.fetch_add(1, Ordering::SeqCst);
                    let Some(record) = payloads.get(index) else {
                        break;
                    };
                    let report = worker.process(record).await;
                    if tx.send(report).await.is_err() {
                        break;
                    }
                }
                worker.shutdown().await;
                debug!(worker = worker.id(), sessions = worker.sessions_created(), "Worker finished");
                Ok(())
            }));
        }
        drop(tx);

        while let Some(report) = rx.recv().await {
            aggregator.absorb(report).await;
        }

        let mut last_error = None;
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => last_error = Some(e),
                Err(e) => error!(error = %e, "Worker task panicked"),
            }
        }

        if started.load(Ordering::SeqCst) == 0 {
            return Err(last_error.unwrap_or_else(|| {
                ProbeError::SessionCreation("No worker could start a browser session".into())
            }));
        }
        Ok(())
    }
}

async fn write_summary(summary: &RunSummary) {
    let path = RunSummary::path_for(&summary.output);
    let json = match serde_json::to_string_pretty(summary) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "Could not serialize run summary");
            return;
        }
    };
    if let Err(e) = tokio::fs::write(&path, json).await {
        warn!(path = %path.display(), error = %e, "Could not write run summary");
    }
}
