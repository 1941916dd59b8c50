use std::path::{Path, PathBuf};
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use crate::config::defaults;
use crate::errors::ProbeError;
use crate::models::CallbackEvent;
use crate::store::{canonicalize_file, sort_hit_log_file, BlockStyle};

/// Whether a hit gets recorded, and where it stands against the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Uncapped mode, always recorded.
    Open,
    /// Capped mode, `hit` of `max`. The hit that reaches `max` confirms the
    /// payload.
    Counted { hit: u32, max: u32 },
    /// Cap already reached: answered, not recorded.
    Suppressed,
}

impl Admission {
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Admission::Suppressed)
    }

    pub fn confirms(&self) -> bool {
        matches!(self, Admission::Counted { hit, max } if hit == max)
    }
}

/// Per-position hit counts plus the two files hits are persisted to.
///
/// Counts live for the lifetime of the process only; a restart starts every
/// position from zero.
pub struct HitLedger {
    counts: DashMap<u64, u32>,
    max_hits: Option<u32>,
    result_file: PathBuf,
    hit_log: PathBuf,
    write_lock: Mutex<()>,
}

impl HitLedger {
    /// `max_hits = None` disables capped mode.
    pub fn new(result_file: &Path, max_hits: Option<u32>) -> Self {
        let hit_log = result_file
            .parent()
            .map(|dir| dir.join(defaults::HIT_LOG_NAME))
            .unwrap_or_else(|| PathBuf::from(defaults::HIT_LOG_NAME));
        Self {
            counts: DashMap::new(),
            max_hits: max_hits.map(|m| m.max(1)),
            result_file: result_file.to_path_buf(),
            hit_log,
            write_lock: Mutex::new(()),
        }
    }

    pub fn result_file(&self) -> &Path {
        &self.result_file
    }

    pub fn hit_log(&self) -> &Path {
        &self.hit_log
    }

    pub fn max_hits(&self) -> Option<u32> {
        self.max_hits
    }

    /// Decide and count in one step; concurrent hits for one position are
    /// serialized on its map entry.
    pub fn admit(&self, position: u64) -> Admission {
        let Some(max) = self.max_hits else {
            return Admission::Open;
        };
        let mut count = self.counts.entry(position).or_insert(0);
        if *count >= max {
            return Admission::Suppressed;
        }
        *count += 1;
        Admission::Counted { hit: *count, max }
    }

    pub fn hits_for(&self, position: u64) -> u32 {
        self.counts.get(&position).map(|c| *c).unwrap_or(0)
    }

    fn result_header(&self) -> String {
        let rule = "=".repeat(80);
        let mut header = format!("{}\nWORKING XSS PAYLOADS - CALLBACK RESULTS\n", rule);
        if let Some(max) = self.max_hits {
            header.push_str(&format!("CTF Mode: Max {} hits per payload\n", max));
        }
        header.push_str(&rule);
        header.push_str("\n\n");
        header
    }

    fn result_block(&self, event: &CallbackEvent, payload: &str, admission: Admission) -> String {
        let ts = event.timestamp.format("%Y-%m-%d %H:%M:%S");
        let status = match admission {
            Admission::Counted { hit, max } if hit == max => {
                format!("[{}] [CONFIRMED] Payload ID: {} (Hit {}/{})", ts, event.position, hit, max)
            }
            Admission::Counted { hit, max } => {
                format!("[{}] Payload ID: {} (Hit {}/{})", ts, event.position, hit, max)
            }
            _ => format!("[{}] Payload ID: {}", ts, event.position),
        };
        BlockStyle::CALLBACK_RESULTS.render_block(&[
            status,
            format!("From IP: {}", event.source_ip),
            format!("Referer: {}", event.referer),
            "Payload:".to_string(),
            payload.to_string(),
        ])
    }

    /// Append an admitted hit to the hit log and, when the position maps to a
    /// corpus payload, to the result file.
    pub async fn persist(
        &self,
        event: &CallbackEvent,
        payload: Option<&str>,
        admission: Admission,
    ) -> Result<(), ProbeError> {
        if !admission.is_recorded() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;

        append(&self.hit_log, &format!("{}\n", event.log_line())).await?;

        if let Some(payload) = payload {
            let mut content = String::new();
            if !tokio::fs::try_exists(&self.result_file).await.unwrap_or(false) {
                content.push_str(&self.result_header());
            }
            content.push_str(&self.result_block(event, payload, admission));
            append(&self.result_file, &content).await?;
        }
        Ok(())
    }

    /// Sort both files by payload id. Run once at shutdown.
    pub async fn finalize(&self) {
        let _guard = self.write_lock.lock().await;
        match canonicalize_file(&self.result_file, BlockStyle::CALLBACK_RESULTS).await {
            Ok(true) => info!(path = %self.result_file.display(), "Result file sorted by payload id"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not sort result file"),
        }
        match sort_hit_log_file(&self.hit_log).await {
            Ok(true) => info!(path = %self.hit_log.display(), "Hit log sorted by payload id"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not sort hit log"),
        }
    }
}

async fn append(path: &Path, content: &str) -> Result<(), ProbeError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ProbeError::Persistence(format!("Cannot create {}: {}", dir.display(), e)))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| ProbeError::Persistence(format!("Cannot open {}: {}", path.display(), e)))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| ProbeError::Persistence(format!("Cannot append to {}: {}", path.display(), e)))?;
    file.flush().await?;
    Ok(())
}
