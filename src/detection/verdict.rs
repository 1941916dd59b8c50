use serde::{Deserialize, Serialize};

/// Outcome of inspecting a rendered page for one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionKind {
    /// Payload present verbatim and unescaped in the document.
    HtmlReflected,
    /// A resource from the attacker domain was loaded or injected.
    DomExecuted,
    /// Payload present but the document carries HTML/unicode escapes.
    HtmlEscaped,
    /// Payload only made it into the page URL.
    UrlInjection,
    NotDetected,
    /// Inspection itself failed; counts as not-detected in tallies.
    Error,
}

impl DetectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HtmlReflected => "html-reflected",
            Self::DomExecuted => "dom-executed",
            Self::HtmlEscaped => "html-escaped",
            Self::UrlInjection => "url-injection",
            Self::NotDetected => "not-detected",
            Self::Error => "error",
        }
    }

    /// Verdicts that count as confirmed execution evidence.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::HtmlReflected | Self::DomExecuted)
    }

    /// Verdicts worth persisting: confirmed ones plus the weak url signal.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::HtmlReflected | Self::DomExecuted | Self::UrlInjection)
    }
}

impl std::fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The individual signals behind a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub matched_variant: Option<String>,
    pub reflection_count: usize,
    pub dom_signal: bool,
    pub script_tag_signal: bool,
    pub url_signal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub kind: DetectionKind,
    pub executed: bool,
    pub escaped: bool,
    pub evidence: Evidence,
}

impl DetectionResult {
    pub fn new(kind: DetectionKind, evidence: Evidence) -> Self {
        Self {
            kind,
            executed: kind.is_confirmed(),
            escaped: kind == DetectionKind::HtmlEscaped,
            evidence,
        }
    }

    pub fn error() -> Self {
        Self::new(DetectionKind::Error, Evidence::default())
    }

    pub fn not_detected() -> Self {
        Self::new(DetectionKind::NotDetected, Evidence::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_follow_kind() {
        let r = DetectionResult::new(DetectionKind::HtmlEscaped, Evidence::default());
        assert!(r.escaped);
        assert!(!r.executed);
        let r = DetectionResult::new(DetectionKind::DomExecuted, Evidence::default());
        assert!(r.executed);
        assert!(!r.escaped);
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&DetectionKind::UrlInjection).unwrap();
        assert_eq!(json, "\"url-injection\"");
    }
}
