use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::errors::ProbeError;
use tracing::info;

/// One payload and its stable 1-based position in the corpus.
///
/// The position is the only key shared between a finding, a corpus line and a
/// callback hit, so it must never be renumbered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRecord {
    pub position: u64,
    pub raw: String,
}

/// Ordered, read-only payload list.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<PayloadRecord>,
}

impl Corpus {
    /// Parse newline-delimited payloads. Blank lines and lines starting with
    /// `#` are skipped and do not consume a position.
    pub fn parse(content: &str) -> Self {
        let records = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .enumerate()
            .map(|(i, line)| PayloadRecord {
                position: i as u64 + 1,
                raw: line.to_string(),
            })
            .collect();
        Self { records }
    }

    pub async fn load(path: &Path) -> Result<Self, ProbeError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProbeError::Config(format!("Cannot read wordlist {}: {}", path.display(), e))
        })?;
        let corpus = Self::parse(&content);
        if corpus.is_empty() {
            return Err(ProbeError::Config(format!(
                "Wordlist {} contains no payloads",
                path.display()
            )));
        }
        info!(path = %path.display(), payloads = corpus.len(), "Loaded payload corpus");
        Ok(corpus)
    }

    /// Payload at a 1-based position.
    pub fn get(&self, position: u64) -> Option<&PayloadRecord> {
        if position == 0 {
            return None;
        }
        self.records.get((position - 1) as usize)
    }

    pub fn records(&self) -> &[PayloadRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
