use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::config::PollConfig;
use crate::error::{Result, SupernoteError};
use crate::models::{FileIndexStatus, IndexedFile, VectorStoreFile, VectorStoreRef};
use crate::transport::Provider;

/// Admits local files into the knowledge store, idempotently per filename.
///
/// Identity is by filename only: two different files with the same name are
/// one logical document, and re-uploading under the same name after a failed
/// attempt is the intended recovery path.
pub struct IngestionPipeline {
    provider: Arc<dyn Provider>,
    poll: PollConfig,
    /// Per-filename locks held across the exists-check/upload window, so two
    /// concurrent ingestions of the same new filename cannot both observe
    /// "not found" and race to upload.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Extract the store-identity filename from a local path.
pub(crate) fn filename_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| {
            SupernoteError::Internal(format!("Path has no usable filename: {}", path.display()))
        })
}

impl IngestionPipeline {
    pub fn new(provider: Arc<dyn Provider>, poll: PollConfig) -> Self {
        Self {
            provider,
            poll,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn filename_lock(&self, filename: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(filename.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ingest a local file. Returns the existing reference without any upload
    /// when an equivalently-named file is already indexed; otherwise uploads,
    /// attaches, and blocks until the store reports the file processed.
    pub async fn ingest(&self, store: &VectorStoreRef, path: &Path) -> Result<IndexedFile> {
        let filename = filename_of(path)?;

        // Local readability check before any remote call.
        std::fs::metadata(path)?;

        let outcome = {
            let lock = self.filename_lock(&filename).await;
            let _guard = lock.lock().await;
            self.ingest_locked(store, path, &filename).await
        };
        self.prune_filename_lock(&filename).await;
        outcome
    }

    async fn ingest_locked(
        &self,
        store: &VectorStoreRef,
        path: &Path,
        filename: &str,
    ) -> Result<IndexedFile> {
        if let Some(existing) = self.find_indexed(store, filename).await? {
            tracing::info!(
                "File '{}' already indexed as {}, skipping upload",
                filename,
                existing.file_id
            );
            return Ok(existing);
        }

        tracing::info!("Uploading '{}' to store {}", filename, store.id);
        let uploaded = self.provider.upload_file(path).await?;
        let attached = self.provider.attach_file(&store.id, &uploaded.id).await?;
        self.wait_for_indexing(store, filename, attached).await?;

        tracing::info!("File '{}' indexed as {}", filename, uploaded.id);
        Ok(IndexedFile {
            file_id: uploaded.id,
            filename: filename.to_string(),
        })
    }

    /// Drop the filename's lock entry once nothing else holds a clone.
    /// Clones are only handed out under the map lock, so a strong count of
    /// one cannot change while the entry is being inspected here.
    async fn prune_filename_lock(&self, filename: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(filename)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(filename);
        }
    }

    #[cfg(test)]
    pub(crate) async fn pending_filename_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Look up a fully processed store file by exact, case-sensitive
    /// filename. Entries that failed indexing do not count, which is what
    /// keeps a failed filename retryable.
    async fn find_indexed(
        &self,
        store: &VectorStoreRef,
        filename: &str,
    ) -> Result<Option<IndexedFile>> {
        for entry in self.provider.list_store_files(&store.id).await? {
            let details = self.provider.retrieve_file(&entry.id).await?;
            if details.filename == filename && entry.status == FileIndexStatus::Completed {
                return Ok(Some(IndexedFile {
                    file_id: details.id,
                    filename: filename.to_string(),
                }));
            }
        }
        Ok(None)
    }

    /// Poll the store until it reports the file processed. Couples ingestion
    /// latency to indexing latency on purpose: callers never see a
    /// half-indexed file.
    async fn wait_for_indexing(
        &self,
        store: &VectorStoreRef,
        filename: &str,
        mut entry: VectorStoreFile,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            match entry.status {
                FileIndexStatus::Completed => return Ok(()),
                FileIndexStatus::Failed | FileIndexStatus::Cancelled => {
                    return Err(SupernoteError::IngestionFailed {
                        filename: filename.to_string(),
                        reason: format!("store reported indexing status '{:?}'", entry.status),
                    });
                }
                FileIndexStatus::InProgress => {}
            }

            if started.elapsed() >= self.poll.timeout() {
                return Err(SupernoteError::IngestionFailed {
                    filename: filename.to_string(),
                    reason: format!(
                        "indexing did not finish within {}s",
                        self.poll.timeout().as_secs()
                    ),
                });
            }

            sleep(self.poll.interval()).await;
            entry = self
                .provider
                .retrieve_store_file(&store.id, &entry.id)
                .await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileObject;
    use crate::transport::MockProvider;
    use std::io::Write;
    use tempfile::TempDir;

    fn fast_poll() -> PollConfig {
        PollConfig {
            interval_ms: 1,
            timeout_secs: 5,
        }
    }

    fn store_ref() -> VectorStoreRef {
        VectorStoreRef {
            id: "vs_1".to_string(),
            name: "BioNotes".to_string(),
        }
    }

    fn store_file(id: &str, status: FileIndexStatus) -> VectorStoreFile {
        VectorStoreFile {
            id: id.to_string(),
            status,
        }
    }

    fn file_object(id: &str, filename: &str) -> FileObject {
        FileObject {
            id: id.to_string(),
            filename: filename.to_string(),
        }
    }

    fn write_local_file(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "photosynthesis notes").unwrap();
        path
    }

    #[tokio::test]
    async fn test_ingest_uploads_and_waits_for_completion() {
        let dir = TempDir::new().unwrap();
        let path = write_local_file(&dir, "chapter1.pdf");

        let mut mock = MockProvider::new();
        mock.expect_list_store_files().times(1).returning(|_| Ok(vec![]));
        mock.expect_upload_file()
            .times(1)
            .returning(|_| Ok(file_object("file_1", "chapter1.pdf")));
        mock.expect_attach_file()
            .times(1)
            .withf(|store_id, file_id| store_id == "vs_1" && file_id == "file_1")
            .returning(|_, file_id| Ok(store_file(file_id, FileIndexStatus::InProgress)));
        mock.expect_retrieve_store_file()
            .times(1)
            .returning(|_, file_id| Ok(store_file(file_id, FileIndexStatus::Completed)));

        let pipeline = IngestionPipeline::new(Arc::new(mock), fast_poll());
        let indexed = pipeline.ingest(&store_ref(), &path).await.unwrap();
        assert_eq!(indexed.file_id, "file_1");
        assert_eq!(indexed.filename, "chapter1.pdf");
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent_per_filename() {
        let dir = TempDir::new().unwrap();
        let path = write_local_file(&dir, "chapter1.pdf");

        let mut mock = MockProvider::new();
        mock.expect_list_store_files()
            .times(1)
            .returning(|_| Ok(vec![store_file("file_1", FileIndexStatus::Completed)]));
        mock.expect_retrieve_file()
            .times(1)
            .returning(|id| Ok(file_object(id, "chapter1.pdf")));
        mock.expect_upload_file().times(0);
        mock.expect_attach_file().times(0);

        let pipeline = IngestionPipeline::new(Arc::new(mock), fast_poll());
        let indexed = pipeline.ingest(&store_ref(), &path).await.unwrap();
        assert_eq!(indexed.file_id, "file_1");
    }

    #[tokio::test]
    async fn test_filename_match_is_exact_and_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let path = write_local_file(&dir, "Chapter1.pdf");

        let mut mock = MockProvider::new();
        mock.expect_list_store_files()
            .times(1)
            .returning(|_| Ok(vec![store_file("file_1", FileIndexStatus::Completed)]));
        mock.expect_retrieve_file()
            .times(1)
            .returning(|id| Ok(file_object(id, "chapter1.pdf")));
        // lowercase entry does not match, so a fresh upload happens
        mock.expect_upload_file()
            .times(1)
            .returning(|_| Ok(file_object("file_2", "Chapter1.pdf")));
        mock.expect_attach_file()
            .times(1)
            .returning(|_, file_id| Ok(store_file(file_id, FileIndexStatus::Completed)));

        let pipeline = IngestionPipeline::new(Arc::new(mock), fast_poll());
        let indexed = pipeline.ingest(&store_ref(), &path).await.unwrap();
        assert_eq!(indexed.file_id, "file_2");
    }

    #[tokio::test]
    async fn test_failed_indexing_surfaces_and_stays_retryable() {
        let dir = TempDir::new().unwrap();
        let path = write_local_file(&dir, "bad.txt");

        let mut mock = MockProvider::new();
        // First attempt: nothing indexed, upload, store rejects the file.
        // Second attempt: the failed entry does not count as indexed, so the
        // whole upload path runs again and succeeds.
        mock.expect_list_store_files().times(1).returning(|_| Ok(vec![]));
        mock.expect_list_store_files()
            .times(1)
            .returning(|_| Ok(vec![store_file("file_1", FileIndexStatus::Failed)]));
        mock.expect_retrieve_file()
            .times(1)
            .returning(|id| Ok(file_object(id, "bad.txt")));
        mock.expect_upload_file()
            .times(2)
            .returning(|_| Ok(file_object("file_2", "bad.txt")));
        let mut attach_calls = 0;
        mock.expect_attach_file().times(2).returning(move |_, file_id| {
            attach_calls += 1;
            if attach_calls == 1 {
                Ok(store_file(file_id, FileIndexStatus::Failed))
            } else {
                Ok(store_file(file_id, FileIndexStatus::Completed))
            }
        });

        let pipeline = IngestionPipeline::new(Arc::new(mock), fast_poll());

        let err = pipeline.ingest(&store_ref(), &path).await.unwrap_err();
        assert!(matches!(err, SupernoteError::IngestionFailed { ref filename, .. } if filename == "bad.txt"));

        let retried = pipeline.ingest(&store_ref(), &path).await.unwrap();
        assert_eq!(retried.filename, "bad.txt");
    }

    #[tokio::test]
    async fn test_failure_isolation_between_filenames() {
        let dir = TempDir::new().unwrap();
        let bad = write_local_file(&dir, "bad.txt");
        let good = write_local_file(&dir, "good.txt");

        let mut mock = MockProvider::new();
        mock.expect_list_store_files().times(2).returning(|_| Ok(vec![]));
        let mut uploads = 0;
        mock.expect_upload_file().times(2).returning(move |path| {
            uploads += 1;
            let name = filename_of(path).unwrap();
            Ok(file_object(&format!("file_{uploads}"), &name))
        });
        mock.expect_attach_file().times(2).returning(|_, file_id| {
            if file_id == "file_1" {
                Ok(store_file(file_id, FileIndexStatus::Failed))
            } else {
                Ok(store_file(file_id, FileIndexStatus::Completed))
            }
        });

        let pipeline = IngestionPipeline::new(Arc::new(mock), fast_poll());

        assert!(pipeline.ingest(&store_ref(), &bad).await.is_err());
        let indexed = pipeline.ingest(&store_ref(), &good).await.unwrap();
        assert_eq!(indexed.filename, "good.txt");
    }

    #[tokio::test]
    async fn test_filename_locks_are_pruned_after_ingest() {
        let dir = TempDir::new().unwrap();
        let good = write_local_file(&dir, "good.txt");
        let bad = write_local_file(&dir, "bad.txt");

        let mut mock = MockProvider::new();
        mock.expect_list_store_files().times(2).returning(|_| Ok(vec![]));
        let mut uploads = 0;
        mock.expect_upload_file().times(2).returning(move |path| {
            uploads += 1;
            let name = filename_of(path).unwrap();
            Ok(file_object(&format!("file_{uploads}"), &name))
        });
        mock.expect_attach_file().times(2).returning(|_, file_id| {
            if file_id == "file_1" {
                Ok(store_file(file_id, FileIndexStatus::Completed))
            } else {
                Ok(store_file(file_id, FileIndexStatus::Failed))
            }
        });

        let pipeline = IngestionPipeline::new(Arc::new(mock), fast_poll());

        pipeline.ingest(&store_ref(), &good).await.unwrap();
        assert_eq!(pipeline.pending_filename_locks().await, 0);

        pipeline.ingest(&store_ref(), &bad).await.unwrap_err();
        assert_eq!(pipeline.pending_filename_locks().await, 0);
    }

    #[tokio::test]
    async fn test_missing_local_file_fails_before_any_remote_call() {
        let mock = MockProvider::new();
        let pipeline = IngestionPipeline::new(Arc::new(mock), fast_poll());

        let err = pipeline
            .ingest(&store_ref(), Path::new("/nonexistent/notes.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupernoteError::Io(_)));
    }

    #[tokio::test]
    async fn test_indexing_timeout_is_ingestion_failure() {
        let dir = TempDir::new().unwrap();
        let path = write_local_file(&dir, "slow.pdf");

        let mut mock = MockProvider::new();
        mock.expect_list_store_files().times(1).returning(|_| Ok(vec![]));
        mock.expect_upload_file()
            .times(1)
            .returning(|_| Ok(file_object("file_1", "slow.pdf")));
        mock.expect_attach_file()
            .times(1)
            .returning(|_, file_id| Ok(store_file(file_id, FileIndexStatus::InProgress)));
        mock.expect_retrieve_store_file()
            .returning(|_, file_id| Ok(store_file(file_id, FileIndexStatus::InProgress)));

        let poll = PollConfig {
            interval_ms: 1,
            timeout_secs: 0,
        };
        let pipeline = IngestionPipeline::new(Arc::new(mock), poll);
        let err = pipeline.ingest(&store_ref(), &path).await.unwrap_err();
        assert!(matches!(err, SupernoteError::IngestionFailed { .. }));
    }
}
