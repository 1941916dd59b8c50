use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::browser::{InteractionLimits, SessionFactory, WebDriverFactory};
use crate::cli::commands::ScanArgs;
use crate::config::{self, defaults, BrowserKind, ProbeConfig};
use crate::errors::{ProbeError, RetryPolicy};
use crate::payloads::{AttackerServer, Corpus};
use crate::pipeline::{RunSummary, ScanOrchestrator, ScanSettings};
use crate::template::RequestTemplate;
use crate::worker::{ScanContext, WorkerSettings};

pub async fn handle_scan(args: ScanArgs, config_path: Option<&Path>) -> Result<(), ProbeError> {
    let file_config = match config_path {
        Some(path) => config::parse_config(path).await?,
        None => ProbeConfig::default(),
    };
    let plan = resolve_plan(&args, &file_config)?;

    let template = match (&args.target, &args.request) {
        (Some(url), _) => RequestTemplate::from_target_url(url)?,
        (None, Some(path)) => RequestTemplate::from_file(path, true).await?,
        (None, None) => return Err(ProbeError::Config("Either --target or --request is required".into())),
    };
    let secondary = match &args.second_order {
        Some(path) => Some(RequestTemplate::from_file(path, false).await?),
        None => None,
    };

    let corpus = Corpus::load(&plan.wordlist).await?;
    let attacker = AttackerServer::resolve(plan.server.as_deref(), &corpus);
    info!(
        request = %template.descriptor(),
        payloads = corpus.len(),
        server = attacker.url(),
        second_order = secondary.is_some(),
        "Scan configured"
    );

    let factory: Arc<dyn SessionFactory> = Arc::new(WebDriverFactory::new(
        &plan.webdriver_url,
        plan.browser,
        plan.worker.page_load_timeout,
    )?);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let context = ScanContext { template, secondary, attacker };
    let settings = ScanSettings {
        threads: plan.threads,
        output: plan.output,
        worker: plan.worker,
        show_progress: true,
        check_reachability: true,
    };
    let summary = ScanOrchestrator::new(context, corpus, factory, settings)
        .with_cancel_token(cancel)
        .run()
        .await?;

    print_summary(&summary);
    Ok(())
}

/// Scan parameters after merging CLI flags over the config file over the
/// built-in defaults.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub wordlist: PathBuf,
    pub threads: usize,
    pub output: PathBuf,
    pub server: Option<String>,
    pub webdriver_url: String,
    pub browser: BrowserKind,
    pub worker: WorkerSettings,
}

pub fn resolve_plan(args: &ScanArgs, file: &ProbeConfig) -> Result<ScanPlan, ProbeError> {
    let scan = file.scan.clone().unwrap_or_default();
    let browser = file.browser.clone().unwrap_or_default();

    let threads = args.threads.or(scan.threads).unwrap_or(defaults::THREADS);
    if threads == 0 {
        return Err(ProbeError::Config("--threads must be at least 1".into()));
    }
    let delay = args.delay.or(scan.delay_secs).unwrap_or(defaults::DELAY_SECS);
    if !delay.is_finite() || delay < 0.0 {
        return Err(ProbeError::Config(format!("--delay must be a non-negative number, got {}", delay)));
    }

    let worker = WorkerSettings {
        headless: args.headless_flag().or(browser.headless).unwrap_or(true),
        page_load_timeout: Duration::from_secs(
            browser.page_load_timeout_secs.unwrap_or(defaults::PAGE_LOAD_TIMEOUT_SECS),
        ),
        settle: Duration::from_millis(browser.settle_ms.unwrap_or(defaults::SETTLE_MS)),
        callback_window: Duration::from_secs_f64(delay),
        retry: RetryPolicy {
            max_attempts: scan.retry_attempts.unwrap_or(defaults::RETRY_ATTEMPTS),
            ..RetryPolicy::default()
        },
        interactions: InteractionLimits::default(),
    };

    Ok(ScanPlan {
        wordlist: args
            .wordlist
            .clone()
            .or(scan.wordlist)
            .unwrap_or_else(|| PathBuf::from(defaults::WORDLIST)),
        threads,
        output: args
            .output
            .clone()
            .or(scan.output)
            .unwrap_or_else(|| PathBuf::from(defaults::OUTPUT)),
        server: args.server.clone().or(scan.server),
        webdriver_url: args
            .webdriver
            .clone()
            .or(browser.webdriver_url)
            .unwrap_or_else(|| defaults::WEBDRIVER_URL.to_string()),
        browser: args.browser.or(browser.browser).unwrap_or_default(),
        worker,
    })
}

/// First Ctrl-C drains the run; a second one exits immediately.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight payloads (Ctrl-C again to abort)");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });
}

fn print_summary(summary: &RunSummary) {
    use console::style;

    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("{}", style("Scan summary").bold());
    println!("{}", rule);
    println!("Run:            {}", summary.run_id);
    println!(
        "Processed:      {}/{}{}",
        summary.processed,
        summary.total_payloads,
        if summary.cancelled { " (interrupted)" } else { "" }
    );
    println!(
        "Outcomes:       {} completed, {} timeout, {} skipped, {} error",
        summary.outcomes.completed, summary.outcomes.timeout, summary.outcomes.skipped, summary.outcomes.error
    );
    println!(
        "First-order:    {} reflected, {} dom, {} escaped, {} url-injection",
        style(summary.first_order.html_reflected).green(),
        style(summary.first_order.dom_executed).green(),
        summary.first_order.html_escaped,
        style(summary.first_order.url_injection).yellow(),
    );
    println!(
        "Second-order:   {} reflected, {} dom, {} escaped, {} url-injection",
        style(summary.second_order.html_reflected).green(),
        style(summary.second_order.dom_executed).green(),
        summary.second_order.html_escaped,
        style(summary.second_order.url_injection).yellow(),
    );
    println!("Prompts seen:   {}", summary.prompts_seen);
    println!("Findings:       {} -> {}", summary.findings_written, summary.output.display());
    println!("Callbacks:      check the listener at {}", summary.attacker_server);
    println!("{}", rule);
}
