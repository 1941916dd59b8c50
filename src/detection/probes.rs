//! In-page execution probes and the browser-facing half of detection.

use tracing::warn;
use crate::browser::BrowserSession;
use crate::browser::submit::js_string;
use crate::payloads::AttackerServer;
use super::engine::{classify, DetectionInput, ProbeResults};
use super::verdict::DetectionResult;

/// True when any loaded resource was fetched from the attacker domain.
pub fn resource_probe_script(domain: &str) -> String {
    format!(
        "var d = {}; try {{ return performance.getEntriesByType('resource').some(function (e) {{ return e.name.indexOf(d) !== -1; }}); }} catch (e) {{ return false; }}",
        js_string(domain)
    )
}

/// True when a live `<script src>` points at the attacker domain.
pub fn script_src_probe_script(domain: &str) -> String {
    format!(
        "var d = {}; return Array.prototype.some.call(document.querySelectorAll('script[src]'), function (s) {{ return (s.src || '').indexOf(d) !== -1; }});",
        js_string(domain)
    )
}

/// Read the rendered page and classify it for `payload`.
///
/// A page that cannot be read yields an `error` verdict rather than an
/// error, so the payload still completes.
pub async fn inspect(
    session: &mut dyn BrowserSession,
    payload: &str,
    attacker: &AttackerServer,
) -> DetectionResult {
    let document = match session.current_document().await {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "Could not read rendered document");
            return DetectionResult::error();
        }
    };
    let page_url = session.current_url().await.unwrap_or_default();

    let domain = attacker.domain();
    let resource_hit = session.run_inspection_script(&resource_probe_script(domain)).await;
    let script_hit = session.run_inspection_script(&script_src_probe_script(domain)).await;

    classify(&DetectionInput {
        payload,
        document: &document,
        page_url: &page_url,
        attacker_domain: domain,
        probes: ProbeResults {
            resource_hit: Some(resource_hit),
            script_src_hit: script_hit.then_some(true),
        },
    })
}
