use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::detection::{DetectionKind, DetectionResult};

/// Where a verdict was observed relative to the injection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
    /// The response to the request that carried the payload.
    FirstOrder,
    /// A different page revisited after planting (stored XSS).
    SecondOrder,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::FirstOrder => "first-order",
            Location::SecondOrder => "second-order",
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted detection for one payload at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Corpus position of the payload.
    pub id: u64,
    pub payload: String,
    pub matched_variant: Option<String>,
    pub reflection_count: usize,
    /// `METHOD PATH` of the template that planted the payload.
    pub request_descriptor: String,
    pub location: Location,
    pub kind: DetectionKind,
    pub page_url: String,
    pub timestamp: DateTime<Utc>,
}

impl Finding {
    /// Build a finding from a verdict. Returns `None` for verdicts that are
    /// not worth persisting.
    pub fn from_detection(
        id: u64,
        payload: &str,
        request_descriptor: &str,
        location: Location,
        result: &DetectionResult,
        page_url: &str,
    ) -> Option<Self> {
        if !result.kind.is_reportable() {
            return None;
        }
        Some(Self {
            id,
            payload: payload.to_string(),
            matched_variant: result.evidence.matched_variant.clone(),
            reflection_count: result.evidence.reflection_count,
            request_descriptor: request_descriptor.to_string(),
            location,
            kind: result.kind,
            page_url: page_url.to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Leading tag of the persisted block, fixed per (kind, location).
    pub fn status_tag(&self) -> &'static str {
        match (self.kind, self.location) {
            (DetectionKind::HtmlReflected, Location::FirstOrder) => "[CONFIRMED-HTML-REFLECTED]",
            (DetectionKind::HtmlReflected, Location::SecondOrder) => "[CONFIRMED-STORED-XSS]",
            (DetectionKind::DomExecuted, Location::FirstOrder) => "[CONFIRMED-DOM-BASED]",
            (DetectionKind::DomExecuted, Location::SecondOrder) => "[CONFIRMED-STORED-DOM]",
            (_, Location::FirstOrder) => "[NEED-TO-VERIFY]",
            (_, Location::SecondOrder) => "[NEED-TO-VERIFY-SECOND-ORDER]",
        }
    }

    /// The matched variant when it differs from the raw payload.
    pub fn decoded_payload(&self) -> Option<&str> {
        self.matched_variant
            .as_deref()
            .filter(|variant| *variant != self.payload)
    }

    /// Body lines of the persisted block, separators excluded.
    pub fn block_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("{} Payload ID: {}", self.status_tag(), self.id),
            format!("URL/Request: {}", self.request_descriptor),
            format!("Location: {}", self.location),
            format!("Detection Type: {}", self.kind),
        ];
        if !self.page_url.is_empty() {
            lines.push(format!("Page URL: {}", self.page_url));
        }
        lines.push(format!("Reflections: {}", self.reflection_count));
        lines.push(format!("Timestamp: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S")));
        lines.push("Payload (original):".to_string());
        lines.push(self.payload.clone());
        if let Some(decoded) = self.decoded_payload() {
            lines.push("Payload (decoded/matched):".to_string());
            lines.push(decoded.to_string());
        }
        lines
    }
}
