use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_core::config::SourceConfig;
use docflow_core::ItemMeta;
use docflow_store::{InsertOutcome, SharedItemStore};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::scheduler::{StageError, StageProcessor, StageReport};

/// A candidate document reported by a [`DocumentSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDocument {
    pub path: String,
    pub size: Option<u64>,
    /// RFC 3339 modification time.
    pub last_modified: Option<String>,
}

impl DiscoveredDocument {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            last_modified: None,
        }
    }

    fn initial_meta(&self) -> ItemMeta {
        ItemMeta {
            size: self.size,
            last_modified: self.last_modified.clone(),
            ..ItemMeta::default()
        }
    }
}

/// Where candidate documents come from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn scan(&self) -> Result<Vec<DiscoveredDocument>, StageError>;
}

/// Recursively walks the configured directories for files with a matching
/// extension. Symlinks are not followed.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    config: SourceConfig,
}

impl DirectorySource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn scan(&self) -> Result<Vec<DiscoveredDocument>, StageError> {
        if self.config.directories.is_empty() {
            warn!("No document source directories configured");
            return Ok(Vec::new());
        }
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || walk_sources(&config))
            .await
            .map_err(|e| StageError::Failed(format!("directory scan aborted: {e}")))
    }
}

fn walk_sources(config: &SourceConfig) -> Vec<DiscoveredDocument> {
    let mut found = Vec::new();

    for root in &config.directories {
        if !root.is_dir() {
            warn!(dir = %root.display(), "Document source is not a readable directory");
            continue;
        }

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !config.matches(entry.path()) {
                continue;
            }
            let Some(path) = entry.path().to_str() else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 path");
                continue;
            };

            let metadata = entry.metadata().ok();
            found.push(DiscoveredDocument {
                path: path.to_string(),
                size: metadata.as_ref().map(|m| m.len()),
                last_modified: metadata
                    .and_then(|m| m.modified().ok())
                    .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
            });
        }
    }

    found
}

/// Registers every newly seen document as an item.
pub struct DiscoverStage {
    store: SharedItemStore,
    source: Arc<dyn DocumentSource>,
}

impl DiscoverStage {
    pub fn new(store: SharedItemStore, source: Arc<dyn DocumentSource>) -> Self {
        Self { store, source }
    }
}

#[async_trait]
impl StageProcessor for DiscoverStage {
    async fn run(&self) -> Result<StageReport, StageError> {
        let candidates = self.source.scan().await?;
        let mut report = StageReport::default();

        for doc in candidates {
            match self.store.insert_if_absent(&doc.path, doc.initial_meta()).await {
                Ok(InsertOutcome::Inserted(item)) => {
                    info!(item_id = item.id, path = %item.path, "Discovered document");
                    report.processed += 1;
                }
                Ok(InsertOutcome::AlreadyExists(_)) => report.skipped += 1,
                Err(e) => {
                    error!(path = %doc.path, error = %e, "Failed to register document");
                    report.failed += 1;
                }
            }
        }

        debug!(
            new = report.processed,
            known = report.skipped,
            failed = report.failed,
            "Discovery pass finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use docflow_store::{ItemStore, MemoryItemStore};

    use super::*;

    struct FixedSource(Vec<&'static str>);

    #[async_trait]
    impl DocumentSource for FixedSource {
        async fn scan(&self) -> Result<Vec<DiscoveredDocument>, StageError> {
            Ok(self.0.iter().map(|p| DiscoveredDocument::new(*p)).collect())
        }
    }

    fn source_config(dirs: Vec<std::path::PathBuf>) -> SourceConfig {
        SourceConfig {
            directories: dirs,
            extensions: vec!["pdf".into()],
        }
    }

    #[tokio::test]
    async fn duplicate_paths_yield_one_item_each() {
        let store = Arc::new(MemoryItemStore::new());
        let stage = DiscoverStage::new(
            store.clone(),
            Arc::new(FixedSource(vec!["/a.pdf", "/b.pdf", "/a.pdf"])),
        );

        let report = stage.run().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 1);

        let paths: Vec<_> = store.list().await.unwrap().into_iter().map(|i| i.path).collect();
        assert_eq!(paths, vec!["/a.pdf", "/b.pdf"]);
    }

    #[tokio::test]
    async fn walks_directories_for_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.4").unwrap();
        fs::write(dir.path().join("B.PDF"), b"%PDF-1.4").unwrap();
        fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.pdf"), b"%PDF-1.4 longer").unwrap();

        let store = Arc::new(MemoryItemStore::new());
        let source = DirectorySource::new(source_config(vec![dir.path().to_path_buf()]));
        let stage = DiscoverStage::new(store.clone(), Arc::new(source));

        assert_eq!(stage.run().await.unwrap().processed, 3);
        let items = store.list().await.unwrap();
        assert!(items.iter().all(|i| !i.path.ends_with(".txt")));

        let nested = items.iter().find(|i| i.path.ends_with("c.pdf")).unwrap();
        assert_eq!(nested.meta.size, Some(15));
        assert!(nested.meta.last_modified.is_some());

        // Second pass finds nothing new.
        let again = stage.run().await.unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(again.skipped, 3);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn missing_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF").unwrap();

        let source = DirectorySource::new(source_config(vec![
            dir.path().join("does-not-exist"),
            dir.path().to_path_buf(),
        ]));
        let found = source.scan().await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn no_directories_configured() {
        let source = DirectorySource::new(source_config(Vec::new()));
        assert!(source.scan().await.unwrap().is_empty());
    }
}
