//! Verdict classification.
//!
//! Everything here is pure: the browser-facing half lives in `probes` and
//! hands over a [`DetectionInput`] snapshot. Rules in [`POLICY`] are evaluated
//! top to bottom and the first one that fires decides the verdict.

use super::verdict::{DetectionKind, DetectionResult, Evidence};

/// Escape sequences that mark a reflection as neutralised. Checked against
/// the whole document, not just the vicinity of the match.
pub const ESCAPE_MARKERS: &[&str] = &[
    "&lt;",
    "&gt;",
    "&quot;",
    "&#39;",
    "\\u003c",
    "\\u003e",
    "\\u0022",
];

/// Results of the two in-page execution probes. `None` means the probe
/// gave no usable answer; for the script probe that triggers a scan of the
/// serialized document instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeResults {
    /// A performance resource entry names the attacker domain.
    pub resource_hit: Option<bool>,
    /// A `<script src>` in the live DOM points at the attacker domain.
    pub script_src_hit: Option<bool>,
}

/// Snapshot of a rendered page, everything classification needs.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub payload: &'a str,
    pub document: &'a str,
    pub page_url: &'a str,
    pub attacker_domain: &'a str,
    pub probes: ProbeResults,
}

/// Signals derived once from the input; rules only read these.
#[derive(Debug, Clone, Default)]
struct Signals {
    matched_variant: Option<String>,
    reflection_count: usize,
    escaped: bool,
    dom_signal: bool,
    script_tag_signal: bool,
    url_signal: bool,
}

type Rule = fn(&Signals) -> Option<DetectionKind>;

/// Ordered policy table.
const POLICY: &[(&str, Rule)] = &[
    ("escaped-reflection", escaped_reflection),
    ("unescaped-reflection", unescaped_reflection),
    ("execution-probe", execution_probe),
    ("url-reflection", url_reflection),
];

fn escaped_reflection(s: &Signals) -> Option<DetectionKind> {
    (s.matched_variant.is_some() && s.escaped).then_some(DetectionKind::HtmlEscaped)
}

fn unescaped_reflection(s: &Signals) -> Option<DetectionKind> {
    (s.matched_variant.is_some() && !s.escaped).then_some(DetectionKind::HtmlReflected)
}

fn execution_probe(s: &Signals) -> Option<DetectionKind> {
    (s.dom_signal || s.script_tag_signal).then_some(DetectionKind::DomExecuted)
}

fn url_reflection(s: &Signals) -> Option<DetectionKind> {
    s.url_signal.then_some(DetectionKind::UrlInjection)
}

/// Percent-decode when the payload looks URL-encoded.
pub fn decode_payload(payload: &str) -> String {
    let looks_encoded = payload.contains('%')
        && ["%2", "%3", "%0"].iter().any(|p| payload.contains(p));
    if !looks_encoded {
        return payload.to_string();
    }
    match urlencoding::decode(payload) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => payload.to_string(),
    }
}

/// Reverse JSON string escaping of quotes and backslashes.
pub fn json_unescape(payload: &str) -> String {
    payload.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// Search variants in precedence order, duplicates and empties removed.
pub fn payload_variants(payload: &str) -> Vec<String> {
    let decoded = decode_payload(payload);
    let unescaped = json_unescape(&decoded);
    let mut variants: Vec<String> = Vec::with_capacity(3);
    for candidate in [payload.to_string(), decoded, unescaped] {
        if !candidate.is_empty() && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

fn derive_signals(input: &DetectionInput<'_>) -> Signals {
    let mut signals = Signals::default();

    for variant in payload_variants(input.payload) {
        if input.document.contains(variant.as_str()) {
            signals.reflection_count = input.document.matches(variant.as_str()).count();
            signals.matched_variant = Some(variant);
            break;
        }
    }

    if signals.matched_variant.is_some() {
        signals.escaped = ESCAPE_MARKERS.iter().any(|m| input.document.contains(m));
    }

    signals.dom_signal = input.probes.resource_hit.unwrap_or(false);
    signals.script_tag_signal = match input.probes.script_src_hit {
        Some(hit) => hit,
        None => static_script_src_hit(input.document, input.attacker_domain),
    };

    let decoded_payload = decode_payload(input.payload);
    if !decoded_payload.is_empty() {
        let decoded_url = urlencoding::decode(input.page_url)
            .map(|u| u.into_owned())
            .unwrap_or_else(|_| input.page_url.to_string());
        signals.url_signal = decoded_url.contains(decoded_payload.as_str());
    }

    signals
}

/// Fallback for when the live script probe could not run: look for a
/// `<script ... src=...domain...>` tag in the serialized document.
fn static_script_src_hit(document: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }
    let lower = document.to_lowercase();
    let domain = domain.to_lowercase();
    lower.split("<script").skip(1).any(|tag| {
        let head = tag.split('>').next().unwrap_or("");
        head.contains("src") && head.contains(domain.as_str())
    })
}

/// Classify a page snapshot into a single verdict.
pub fn classify(input: &DetectionInput<'_>) -> DetectionResult {
    let signals = derive_signals(input);
    let kind = POLICY
        .iter()
        .find_map(|(_, rule)| rule(&signals))
        .unwrap_or(DetectionKind::NotDetected);

    let reflection_count = match kind {
        DetectionKind::HtmlReflected | DetectionKind::HtmlEscaped => signals.reflection_count,
        _ => 0,
    };

    DetectionResult::new(
        kind,
        Evidence {
            matched_variant: signals.matched_variant,
            reflection_count,
            dom_signal: signals.dom_signal,
            script_tag_signal: signals.script_tag_signal,
            url_signal: signals.url_signal,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "cb.example.net";

    fn input<'a>(payload: &'a str, document: &'a str, url: &'a str, probes: ProbeResults) -> DetectionInput<'a> {
        DetectionInput {
            payload,
            document,
            page_url: url,
            attacker_domain: DOMAIN,
            probes,
        }
    }

    fn probes(resource: bool, script: bool) -> ProbeResults {
        ProbeResults {
            resource_hit: Some(resource),
            script_src_hit: Some(script),
        }
    }

    #[test]
    fn test_unescaped_reflection_counts_occurrences() {
        let payload = "<script>alert(1)</script>";
        let doc = "<html><body><script>alert(1)</script><p><script>alert(1)</script></p></body></html>";
        let result = classify(&input(payload, doc, "http://t/", probes(false, false)));
        assert_eq!(result.kind, DetectionKind::HtmlReflected);
        assert_eq!(result.evidence.reflection_count, 2);
        assert_eq!(result.evidence.matched_variant.as_deref(), Some(payload));
        assert!(result.executed);
    }

    #[test]
    fn test_escaped_reflection_wins_over_probes() {
        let payload = "<script>alert(1)</script>";
        let doc = "<p>you searched: &lt;script&gt;alert(1)&lt;/script&gt;</p><!-- <script>alert(1)</script> -->";
        let result = classify(&input(payload, doc, "http://t/", probes(true, true)));
        assert_eq!(result.kind, DetectionKind::HtmlEscaped);
        assert!(result.escaped);
        assert!(!result.executed);
    }

    #[test]
    fn test_escaped_only_form_is_not_a_reflection_match() {
        // The raw payload never appears, only its escaped rendering.
        let payload = "<script>alert(1)</script>";
        let doc = "<p>&lt;script&gt;alert(1)&lt;/script&gt;</p>";
        let result = classify(&input(payload, doc, "http://t/", probes(false, false)));
        assert_ne!(result.kind, DetectionKind::HtmlReflected);
        assert_eq!(result.kind, DetectionKind::NotDetected);
    }

    #[test]
    fn test_probe_hit_without_reflection_is_dom_executed() {
        let payload = "<script src=https://cb.example.net/?id=4></script>";
        let doc = "<html><body>nothing here</body></html>";
        let result = classify(&input(payload, doc, "http://t/", probes(true, false)));
        assert_eq!(result.kind, DetectionKind::DomExecuted);
        assert_eq!(result.evidence.reflection_count, 0);
        assert!(result.evidence.dom_signal);
    }

    #[test]
    fn test_script_probe_alone_is_enough() {
        let result = classify(&input("zzz", "<html></html>", "http://t/", probes(false, true)));
        assert_eq!(result.kind, DetectionKind::DomExecuted);
        assert!(result.evidence.script_tag_signal);
    }

    #[test]
    fn test_url_injection_when_only_in_url() {
        let payload = "\"><svg onload=alert(1)>";
        let url = "http://t/search?q=%22%3E%3Csvg%20onload%3Dalert(1)%3E";
        let result = classify(&input(payload, "<html>clean</html>", url, probes(false, false)));
        assert_eq!(result.kind, DetectionKind::UrlInjection);
        assert!(result.evidence.url_signal);
        assert!(!result.executed);
    }

    #[test]
    fn test_not_detected() {
        let result = classify(&input("<x>", "<html></html>", "http://t/", probes(false, false)));
        assert_eq!(result.kind, DetectionKind::NotDetected);
        assert_eq!(result.evidence, Evidence::default());
    }

    #[test]
    fn test_percent_encoded_payload_matches_decoded_variant() {
        let payload = "%3Cimg%20src%3Dx%20onerror%3Dalert(1)%3E";
        let doc = "<div><img src=x onerror=alert(1)></div>";
        let result = classify(&input(payload, doc, "http://t/", probes(false, false)));
        assert_eq!(result.kind, DetectionKind::HtmlReflected);
        assert_eq!(result.evidence.matched_variant.as_deref(), Some("<img src=x onerror=alert(1)>"));
    }

    #[test]
    fn test_json_escaped_payload_matches_unescaped_variant() {
        let payload = r#"<img src=\"x\" onerror=alert(1)>"#;
        let doc = r#"<div><img src="x" onerror=alert(1)></div>"#;
        let result = classify(&input(payload, doc, "http://t/", probes(false, false)));
        assert_eq!(result.kind, DetectionKind::HtmlReflected);
        assert_eq!(result.evidence.matched_variant.as_deref(), Some(r#"<img src="x" onerror=alert(1)>"#));
    }

    #[test]
    fn test_raw_variant_checked_first() {
        let variants = payload_variants("%3Cb%3E");
        assert_eq!(variants, vec!["%3Cb%3E".to_string(), "<b>".to_string()]);
    }

    #[test]
    fn test_plain_percent_sign_not_decoded() {
        assert_eq!(decode_payload("100%"), "100%");
        assert_eq!(decode_payload("50%off"), "50%off");
    }

    #[test]
    fn test_unicode_escape_marker_counts_as_escaped() {
        let payload = "<b>x</b>";
        let doc = "<b>x</b><script>var s = \"\\u003cb\\u003e\";</script>";
        let result = classify(&input(payload, doc, "http://t/", probes(false, false)));
        assert_eq!(result.kind, DetectionKind::HtmlEscaped);
        assert_eq!(result.evidence.reflection_count, 1);
    }

    #[test]
    fn test_missing_script_probe_falls_back_to_document_scan() {
        let no_probes = ProbeResults::default();
        let doc = "<html><script async src=\"https://CB.example.net/x.js\"></script></html>";
        let result = classify(&input("qqq", doc, "http://t/", no_probes));
        assert_eq!(result.kind, DetectionKind::DomExecuted);
        assert!(result.evidence.script_tag_signal);
    }
}
