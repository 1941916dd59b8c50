use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use crate::errors::ProbeError;
use crate::models::Finding;
use super::blocks::{canonicalize_file, BlockStyle};

/// Append-only findings file shared by every worker.
///
/// Writes are serialized by one lock and land in completion order; the
/// final [`FindingStore::canonicalize`] pass restores id order.
pub struct FindingStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FindingStore {
    /// Create (or truncate) the findings file and write `header` lines,
    /// each prefixed with `# `.
    pub async fn create(path: &Path, header: &[String]) -> Result<Self, ProbeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProbeError::Persistence(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }
        let mut content = String::new();
        for line in header {
            content.push_str("# ");
            content.push_str(line);
            content.push('\n');
        }
        if !content.is_empty() {
            content.push('\n');
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ProbeError::Persistence(format!("Cannot initialise {}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Findings file initialised");
        Ok(Self::open(path))
    }

    /// Append to an existing file without touching its contents.
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Append one finding block. The whole block is written under the lock so
    /// concurrent appends never interleave inside a block.
    pub async fn append(&self, finding: &Finding) -> Result<(), ProbeError> {
        let block = BlockStyle::FINDINGS.render_block(&finding.block_lines());
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ProbeError::Persistence(format!("Cannot open {}: {}", self.path.display(), e)))?;
        file.write_all(block.as_bytes())
            .await
            .map_err(|e| ProbeError::Persistence(format!("Cannot append to {}: {}", self.path.display(), e)))?;
        file.flush().await?;
        debug!(id = finding.id, location = %finding.location, kind = %finding.kind, "Finding persisted");
        Ok(())
    }

    /// Sort persisted blocks by payload id. Taken under the write lock so it
    /// never races an append.
    pub async fn canonicalize(&self) -> Result<(), ProbeError> {
        let _guard = self.write_lock.lock().await;
        match canonicalize_file(&self.path, BlockStyle::FINDINGS).await {
            Ok(true) => {
                info!(path = %self.path.display(), "Findings sorted by payload id");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Could not sort findings");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionKind, DetectionResult, Evidence};
    use crate::models::Location;
    use crate::store::blocks::block_ids;
    use std::sync::Arc;

    fn finding(id: u64) -> Finding {
        let result = DetectionResult::new(
            DetectionKind::HtmlReflected,
            Evidence {
                matched_variant: Some(format!("<i>{}</i>", id)),
                reflection_count: 1,
                ..Evidence::default()
            },
        );
        Finding::from_detection(id, &format!("<i>{}</i>", id), "GET /q?x=FUZZ", Location::FirstOrder, &result, "")
            .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_appends_then_canonicalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("findings.txt");
        let store = Arc::new(
            FindingStore::create(&path, &["XSS findings".to_string()]).await.unwrap(),
        );

        let mut handles = Vec::new();
        for id in [7u64, 3, 9, 1, 5] {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.append(&finding(id)).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        store.canonicalize().await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# XSS findings\n\n"));
        assert_eq!(block_ids(&content, BlockStyle::FINDINGS), vec![1, 3, 5, 7, 9]);

        store.canonicalize().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }

    #[tokio::test]
    async fn test_create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("findings.txt");
        std::fs::write(&path, "old content\n").unwrap();
        let store = FindingStore::create(&path, &[]).await.unwrap();
        store.append(&finding(2)).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("old content"));
        assert!(content.contains("Payload ID: 2"));
    }
}
