use std::sync::LazyLock;
use regex::Regex;
use super::corpus::Corpus;

/// Placeholder used until a real callback server is configured or detected.
pub const DEFAULT_ATTACKER_SERVER: &str = "https://attacker.com";

static SERVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(https?)://([^/\s"'\)<>]+)"#).expect("static regex")
});

/// The attacker-controlled callback origin payloads phone home to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackerServer {
    url: String,
    domain: String,
}

impl AttackerServer {
    pub fn from_url(url: &str) -> Self {
        let trimmed = url.trim().trim_end_matches('/');
        let domain = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed)
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            url: trimmed.to_string(),
            domain,
        }
    }

    /// First `scheme://host` found in the corpus, in corpus order.
    pub fn detect(corpus: &Corpus) -> Option<Self> {
        corpus.records().iter().find_map(|record| {
            let decoded = if record.raw.contains('%') {
                urlencoding::decode(&record.raw)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| record.raw.clone())
            } else {
                record.raw.clone()
            };
            SERVER_RE
                .captures(&decoded)
                .map(|caps| Self::from_url(&format!("{}://{}", &caps[1], &caps[2])))
        })
    }

    /// Configured server if any, otherwise whatever the corpus references,
    /// otherwise the placeholder.
    pub fn resolve(configured: Option<&str>, corpus: &Corpus) -> Self {
        match configured.filter(|s| !s.trim().is_empty()) {
            Some(url) => Self::from_url(url),
            None => Self::detect(corpus).unwrap_or_else(|| Self::from_url(DEFAULT_ATTACKER_SERVER)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Host (and port) part, what the execution probes look for.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn is_placeholder(&self) -> bool {
        self.url == DEFAULT_ATTACKER_SERVER
    }
}
