use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use crate::browser::{run_interactions, BrowserSession, InteractionLimits, SessionFactory};
use crate::detection::{inspect, DetectionKind};
use crate::errors::{ProbeError, Recovery, RetryPolicy};
use crate::models::{Finding, Location};
use crate::payloads::{AttackerServer, PayloadRecord};
use crate::template::{PreparedRequest, RequestTemplate};
use super::report::{PayloadOutcome, PayloadReport, Verdict};
use super::stage::Stage;

/// Read-only inputs every worker shares for the whole run.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub template: RequestTemplate,
    pub secondary: Option<RequestTemplate>,
    pub attacker: AttackerServer,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub headless: bool,
    pub page_load_timeout: Duration,
    /// Pause after a load before prompts are collected and detection runs.
    pub settle: Duration,
    /// Sleep after each pass so out-of-band callbacks can land.
    pub callback_window: Duration,
    pub retry: RetryPolicy,
    pub interactions: InteractionLimits,
}

/// What the attempts at one payload have produced so far.
#[derive(Debug, Default)]
struct AttemptOutput {
    verdicts: Vec<Verdict>,
    findings: Vec<Finding>,
    prompts: Vec<String>,
    timed_out: bool,
    /// Set once the first-order callback window has elapsed.
    first_order_done: bool,
    first_order_prompts: usize,
}

impl AttemptOutput {
    /// Where the next attempt picks up. A finished first-order pass is never
    /// injected again, so its findings are recorded once.
    fn resume_stage(&self) -> Stage {
        if self.first_order_done {
            Stage::Revisit
        } else {
            Stage::Start
        }
    }

    /// Drop whatever a failed attempt left behind that a retry would
    /// produce again.
    fn discard_partial(&mut self) {
        if self.first_order_done {
            self.verdicts.retain(|v| v.location == Location::FirstOrder);
            self.findings.retain(|f| f.location == Location::FirstOrder);
            self.prompts.truncate(self.first_order_prompts);
        } else {
            *self = AttemptOutput::default();
        }
    }

    fn into_report(
        self,
        position: u64,
        outcome: PayloadOutcome,
        attempts: u32,
        error: Option<String>,
    ) -> PayloadReport {
        let failed_pass = match (&error, self.first_order_done) {
            (None, _) => None,
            (Some(_), true) => Some(Location::SecondOrder),
            (Some(_), false) => Some(Location::FirstOrder),
        };
        PayloadReport {
            position,
            outcome,
            verdicts: self.verdicts,
            findings: self.findings,
            prompts: self.prompts,
            attempts,
            error,
            failed_pass,
        }
    }
}

/// Owns at most one browser session and runs payloads through it one at a
/// time.
pub struct SessionWorker {
    id: usize,
    factory: Arc<dyn SessionFactory>,
    context: Arc<ScanContext>,
    settings: WorkerSettings,
    session: Option<Box<dyn BrowserSession>>,
    sessions_created: u32,
}

impl SessionWorker {
    pub fn new(
        id: usize,
        factory: Arc<dyn SessionFactory>,
        context: Arc<ScanContext>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id,
            factory,
            context,
            settings,
            session: None,
            sessions_created: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Sessions created so far, recreations included.
    pub fn sessions_created(&self) -> u32 {
        self.sessions_created
    }

    /// Create the first session up front so a backend that cannot start is
    /// reported before any payload is taken.
    pub async fn start(&mut self) -> Result<(), ProbeError> {
        let session = self.create_session().await?;
        self.session = Some(session);
        Ok(())
    }

    async fn create_session(&mut self) -> Result<Box<dyn BrowserSession>, ProbeError> {
        let session = self.factory.create(self.settings.headless).await?;
        self.sessions_created += 1;
        debug!(worker = self.id, backend = self.factory.backend_name(), "Session ready");
        Ok(session)
    }

    /// Hand out the current session, replacing it first if it died.
    async fn checkout_session(&mut self) -> Result<Box<dyn BrowserSession>, ProbeError> {
        match self.session.take() {
            Some(mut session) => {
                if session.is_alive().await {
                    Ok(session)
                } else {
                    debug!(worker = self.id, "Session no longer alive, recreating");
                    session.close().await;
                    self.create_session().await
                }
            }
            None => self.create_session().await,
        }
    }

    /// Run one payload end to end. Never fails: every problem ends up in the
    /// report's outcome.
    pub async fn process(&mut self, record: &PayloadRecord) -> PayloadReport {
        let mut attempts = 0u32;
        let mut output = AttemptOutput::default();
        loop {
            attempts += 1;
            let session = match self.checkout_session().await {
                Ok(s) => s,
                Err(e) => {
                    warn!(worker = self.id, position = record.position, error = %e, "No browser session available");
                    return self.give_up(output, record, PayloadOutcome::Skipped, attempts, e);
                }
            };

            let start = output.resume_stage();
            let (mut session, result) =
                run_attempt(session, record, &self.context, &self.settings, &mut output, start).await;
            match result {
                Ok(()) => {
                    self.session = Some(session);
                    let outcome = if output.timed_out {
                        PayloadOutcome::Timeout
                    } else {
                        PayloadOutcome::Completed
                    };
                    return output.into_report(record.position, outcome, attempts, None);
                }
                Err(e) => {
                    output.discard_partial();
                    let classification = e.classify();
                    match classification.recovery {
                        Recovery::RecreateSession => {
                            // The crashed session is discarded, the next
                            // checkout creates a fresh one.
                            session.close().await;
                            drop(session);
                            if self.settings.retry.has_attempts_left(attempts) {
                                if attempts == 1 {
                                    warn!(worker = self.id, position = record.position, error = %e, "Browser crashed, retrying payload");
                                }
                                tokio::time::sleep(self.settings.retry.retry_delay(attempts)).await;
                                continue;
                            }
                            warn!(worker = self.id, position = record.position, attempts, "Payload skipped after retries");
                            return self.give_up(output, record, PayloadOutcome::Skipped, attempts, e);
                        }
                        _ => {
                            warn!(
                                worker = self.id,
                                position = record.position,
                                error_type = classification.error_type,
                                error = %e,
                                "Payload failed"
                            );
                            self.session = Some(session);
                            return self.give_up(output, record, PayloadOutcome::Error, attempts, e);
                        }
                    }
                }
            }
        }
    }

    fn give_up(
        &self,
        output: AttemptOutput,
        record: &PayloadRecord,
        outcome: PayloadOutcome,
        attempts: u32,
        error: ProbeError,
    ) -> PayloadReport {
        if output.first_order_done {
            warn!(
                worker = self.id,
                position = record.position,
                outcome = outcome.as_str(),
                findings = output.findings.len(),
                "Second-order pass failed, keeping first-order results"
            );
        }
        output.into_report(record.position, outcome, attempts, Some(error.to_string()))
    }

    /// Close the owned session, if any.
    pub async fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }
}

/// One attempt at a payload. The session goes in and comes back out, crashed
/// or not, so the caller decides its fate.
async fn run_attempt(
    mut session: Box<dyn BrowserSession>,
    record: &PayloadRecord,
    context: &ScanContext,
    settings: &WorkerSettings,
    output: &mut AttemptOutput,
    start: Stage,
) -> (Box<dyn BrowserSession>, Result<(), ProbeError>) {
    let result = drive(session.as_mut(), record, context, settings, output, start).await;
    (session, result)
}

async fn drive(
    session: &mut dyn BrowserSession,
    record: &PayloadRecord,
    context: &ScanContext,
    settings: &WorkerSettings,
    output: &mut AttemptOutput,
    start: Stage,
) -> Result<(), ProbeError> {
    let mut page_ready = true;
    let mut stage = start;

    while stage != Stage::Done {
        let follow_up = context.secondary.is_some() && !output.timed_out;
        trace!(position = record.position, stage = stage.name(), "Stage");
        stage = match stage {
            Stage::Inject => {
                let request = context.template.substitute(&record.raw);
                match load_request(session, &request, settings).await {
                    Ok(()) => stage.next(follow_up),
                    Err(ProbeError::NavigationTimeout(msg)) => {
                        debug!(position = record.position, %msg, "Page load timeout (payload might still fire)");
                        output.timed_out = true;
                        collect_prompt(session, output).await;
                        Stage::AwaitWindow(Location::FirstOrder)
                    }
                    Err(e) => return Err(e),
                }
            }
            Stage::Revisit => {
                let secondary = match &context.secondary {
                    Some(t) => t,
                    None => return Ok(()),
                };
                match load_request(session, &secondary.prepare(), settings).await {
                    Ok(()) => {
                        page_ready = true;
                        stage.next(follow_up)
                    }
                    Err(ProbeError::NavigationTimeout(msg)) => {
                        debug!(position = record.position, %msg, "Second-order page load timeout");
                        page_ready = false;
                        collect_prompt(session, output).await;
                        Stage::AwaitWindow(Location::SecondOrder)
                    }
                    Err(e) => return Err(e),
                }
            }
            Stage::WaitSettle(_) => {
                tokio::time::sleep(settings.settle).await;
                collect_prompt(session, output).await;
                stage.next(follow_up)
            }
            Stage::Detect(location) if page_ready => {
                let result = inspect(session, &record.raw, &context.attacker).await;
                let page_url = session.current_url().await.unwrap_or_default();
                output.verdicts.push(Verdict { location, kind: result.kind });

                let descriptor = match location {
                    Location::FirstOrder => context.template.descriptor(),
                    Location::SecondOrder => context
                        .secondary
                        .as_ref()
                        .map(|t| t.descriptor())
                        .unwrap_or_default(),
                };
                match Finding::from_detection(record.position, &record.raw, &descriptor, location, &result, &page_url) {
                    Some(finding) => {
                        info!(
                            position = record.position,
                            location = %location,
                            kind = %result.kind,
                            reflections = finding.reflection_count,
                            "{}",
                            finding.status_tag()
                        );
                        output.findings.push(finding);
                    }
                    None if result.kind == DetectionKind::HtmlEscaped => {
                        debug!(position = record.position, location = %location, reflections = result.evidence.reflection_count, "Reflected but escaped");
                    }
                    None => {
                        debug!(position = record.position, location = %location, kind = %result.kind, "No detection");
                    }
                }
                stage.next(follow_up)
            }
            Stage::Interact(_) if page_ready => {
                let prompts = run_interactions(session, &settings.interactions).await;
                output.prompts.extend(prompts);
                stage.next(follow_up)
            }
            Stage::AwaitWindow(location) => {
                if !settings.callback_window.is_zero() {
                    tokio::time::sleep(settings.callback_window).await;
                }
                if location == Location::FirstOrder {
                    output.first_order_done = true;
                    output.first_order_prompts = output.prompts.len();
                }
                stage.next(follow_up)
            }
            other => other.next(follow_up),
        };
    }

    Ok(())
}

/// Seed cookies when needed, then navigate (GET) or submit (anything else).
async fn load_request(
    session: &mut dyn BrowserSession,
    request: &PreparedRequest,
    settings: &WorkerSettings,
) -> Result<(), ProbeError> {
    // Cookies need a document on their domain, and a synthetic submit
    // document must live on the target origin to be same-origin.
    if !request.cookies.is_empty() || request.needs_submit() {
        match session.navigate(&request.origin(), settings.page_load_timeout).await {
            Ok(()) => {}
            Err(ProbeError::NavigationTimeout(_)) => {
                debug!(origin = %request.origin(), "Origin load timed out, continuing");
            }
            Err(e) => return Err(e),
        }
        let domain = request.cookie_domain();
        for (name, value) in &request.cookies {
            if let Err(e) = session.add_cookie(name, value, &domain).await {
                if e.classify().recovery == Recovery::RecreateSession {
                    return Err(e);
                }
                debug!(cookie = %name, error = %e, "Could not set cookie");
            }
        }
    }

    if request.needs_submit() {
        session.submit(request).await
    } else {
        session.navigate(&request.url, settings.page_load_timeout).await
    }
}

async fn collect_prompt(session: &mut dyn BrowserSession, output: &mut AttemptOutput) {
    if let Some(text) = session.dismiss_prompt().await {
        debug!(prompt = %text, "Prompt dismissed");
        output.prompts.push(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(location: Location) -> Verdict {
        Verdict { location, kind: DetectionKind::HtmlReflected }
    }

    #[test]
    fn test_partial_first_pass_is_dropped_entirely() {
        let mut output = AttemptOutput {
            verdicts: vec![verdict(Location::FirstOrder)],
            prompts: vec!["1".to_string()],
            ..AttemptOutput::default()
        };
        output.discard_partial();
        assert!(output.verdicts.is_empty());
        assert!(output.prompts.is_empty());
        assert_eq!(output.resume_stage(), Stage::Start);
    }

    #[test]
    fn test_finished_first_pass_survives_second_pass_failure() {
        let mut output = AttemptOutput {
            verdicts: vec![verdict(Location::FirstOrder), verdict(Location::SecondOrder)],
            prompts: vec!["first".to_string(), "second".to_string()],
            first_order_done: true,
            first_order_prompts: 1,
            ..AttemptOutput::default()
        };
        output.discard_partial();
        assert_eq!(output.verdicts, vec![verdict(Location::FirstOrder)]);
        assert_eq!(output.prompts, vec!["first".to_string()]);
        assert_eq!(output.resume_stage(), Stage::Revisit);

        let report = output.into_report(4, PayloadOutcome::Skipped, 2, Some("crash".to_string()));
        assert_eq!(report.failed_pass, Some(Location::SecondOrder));
        assert_eq!(report.verdicts.len(), 1);
    }

    #[test]
    fn test_completed_report_has_no_failed_pass() {
        let output = AttemptOutput { first_order_done: true, ..AttemptOutput::default() };
        let report = output.into_report(1, PayloadOutcome::Completed, 1, None);
        assert_eq!(report.failed_pass, None);
        assert!(report.error.is_none());
    }
}
