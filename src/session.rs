use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use tokio::{
    sync::watch,
    task::{AbortHandle, JoinHandle},
};
use tracing::debug;

use crate::{
    batch::{BatchConfig, run_batch},
    local_file::LocalFileRef,
    model::UploadOptions,
    state::{BatchUploadState, StateSink},
    transport::UploadTransport,
};

/// Observable upload state plus the options the next batch will use.
///
/// At most one batch runs at a time and it is the only writer of the state
/// channel. Submitting, cancelling or resetting retires the running batch
/// first; a retired batch can no longer publish, even if it is still
/// unwinding on another worker.
pub struct UploadSession<T: UploadTransport + 'static> {
    transport: Arc<T>,
    config: BatchConfig,
    state: Arc<watch::Sender<BatchUploadState>>,
    options: watch::Sender<UploadOptions>,
    generation: Arc<AtomicU64>,
    running: Mutex<Option<AbortHandle>>,
}

impl<T: UploadTransport + 'static> UploadSession<T> {
    pub fn new(transport: Arc<T>, config: BatchConfig) -> Self {
        let (state, _) = watch::channel(BatchUploadState::Idle);
        let (options, _) = watch::channel(UploadOptions::default());

        Self {
            transport,
            config,
            state: Arc::new(state),
            options,
            generation: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchUploadState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> BatchUploadState {
        self.state.borrow().clone()
    }

    pub fn options(&self) -> UploadOptions {
        self.options.borrow().clone()
    }

    /// Replaces the options used by the next submission. A running batch keeps its snapshot.
    pub fn update_options(&self, options: UploadOptions) {
        self.options.send_replace(options);
    }

    /// Starts uploading `files` in the background with a snapshot of the current options.
    ///
    /// Returns `None` for an empty selection, which leaves the state untouched.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, files: Vec<LocalFileRef>) -> Option<JoinHandle<()>> {
        if files.is_empty() {
            return None;
        }

        // Held until the new handle is stored, so concurrent submissions
        // cannot leave an unreachable batch behind.
        let mut running = self.lock_running();
        let id = self.retire(&mut running);
        let options = self.options();
        let config = self.config.clone();
        let transport = Arc::clone(&self.transport);
        let sink = SessionSink {
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
            id,
        };

        debug!(batch = id, files = files.len(), "submitting upload batch");

        let handle = tokio::spawn(async move {
            run_batch(transport.as_ref(), &files, &options, &config, &sink).await;
        });

        *running = Some(handle.abort_handle());
        Some(handle)
    }

    /// Aborts the running batch, dropping any in-flight request. The last
    /// published state stays as it is. Returns whether a batch was running.
    pub fn cancel(&self) -> bool {
        let mut running = self.lock_running();
        let was_running = running
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        self.retire(&mut running);
        was_running
    }

    /// Cancels any running batch and returns to `Idle`.
    pub fn reset(&self) {
        let mut running = self.lock_running();
        if let Some(handle) = running.take() {
            handle.abort();
        }
        self.state.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = BatchUploadState::Idle;
        });
    }

    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Aborts the running batch and bumps the generation under the channel
    /// lock, so no publish from the old batch can land afterwards.
    fn retire(&self, running: &mut Option<AbortHandle>) -> u64 {
        if let Some(handle) = running.take() {
            debug!("aborting running upload batch");
            handle.abort();
        }

        let mut id = 0;
        self.state.send_if_modified(|_| {
            id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            false
        });
        id
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct SessionSink {
    state: Arc<watch::Sender<BatchUploadState>>,
    generation: Arc<AtomicU64>,
    id: u64,
}

impl StateSink for SessionSink {
    fn publish(&self, new_state: BatchUploadState) {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != self.id {
                return false;
            }
            *state = new_state;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ApiError, ApiResult},
        model::{FileOptions, RetentionPeriod, UploadedFile},
    };
    use async_trait::async_trait;
    use std::{path::PathBuf, sync::Barrier, time::Duration};

    /// Never finishes uploads of files named `stall` and rejects files named `fail`.
    #[derive(Default)]
    struct StallingTransport {
        seen_options: Mutex<Vec<UploadOptions>>,
    }

    #[async_trait]
    impl UploadTransport for StallingTransport {
        async fn upload(
            &self,
            file: &LocalFileRef,
            options: &UploadOptions,
        ) -> ApiResult<UploadedFile> {
            self.seen_options.lock().unwrap().push(options.clone());
            if file.display_name == "stall" {
                std::future::pending::<()>().await;
            }
            if file.display_name == "fail" {
                return Err(ApiError::Rejected { operation: "Upload" });
            }
            Ok(UploadedFile {
                token: format!("token-{}", file.display_name),
                url: format!("https://waifuvault.moe/f/{}", file.display_name),
                options: FileOptions::default(),
                retention_period: RetentionPeriod::Millis(60_000),
                bucket: None,
                id: None,
                views: None,
                album: None,
            })
        }
    }

    fn local(name: &str) -> LocalFileRef {
        LocalFileRef {
            path: PathBuf::from(name),
            display_name: name.to_string(),
            size_bytes: 0,
        }
    }

    fn session() -> UploadSession<StallingTransport> {
        UploadSession::new(Arc::new(StallingTransport::default()), BatchConfig::default())
    }

    #[tokio::test]
    async fn test_starts_idle_and_ignores_empty_batches() {
        let session = session();
        let rx = session.subscribe();
        assert!(session.submit(Vec::new()).is_none());
        assert_eq!(session.current(), BatchUploadState::Idle);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_reset_from_terminal_returns_to_idle() {
        let session = session();
        let handle = session.submit(vec![local("a.jpg")]).unwrap();
        handle.await.unwrap();
        assert!(session.current().is_terminal());

        let mut rx = session.subscribe();
        session.reset();
        assert_eq!(*rx.borrow_and_update(), BatchUploadState::Idle);

        tokio::task::yield_now().await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(session.current(), BatchUploadState::Idle);
    }

    #[tokio::test]
    async fn test_reset_from_error_returns_to_idle() {
        let session = session();
        session.submit(vec![local("fail")]).unwrap().await.unwrap();
        assert_eq!(
            session.current(),
            BatchUploadState::Error {
                message: "fail: Upload was rejected by the server".to_string(),
                cause: Some("fail: Upload was rejected by the server".to_string()),
            }
        );

        let rx = session.subscribe();
        session.reset();
        assert_eq!(session.current(), BatchUploadState::Idle);

        tokio::task::yield_now().await;
        assert_eq!(*rx.borrow(), BatchUploadState::Idle);
        assert!(!session.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_submissions_stay_cancellable() {
        let runtime = tokio::runtime::Handle::current();

        for _ in 0..200 {
            let session = Arc::new(session());
            let barrier = Arc::new(Barrier::new(2));

            let submitters: Vec<_> = (0..2)
                .map(|_| {
                    let session = Arc::clone(&session);
                    let barrier = Arc::clone(&barrier);
                    let runtime = runtime.clone();
                    std::thread::spawn(move || {
                        let _guard = runtime.enter();
                        barrier.wait();
                        session.submit(vec![local("stall")]).unwrap()
                    })
                })
                .collect();
            let handles: Vec<_> = submitters
                .into_iter()
                .map(|submitter| submitter.join().unwrap())
                .collect();

            session.cancel();

            for handle in handles {
                let result = tokio::time::timeout(Duration::from_secs(1), handle)
                    .await
                    .expect("batch still running after cancel");
                assert!(result.unwrap_err().is_cancelled());
            }
            assert!(!session.is_running());
        }
    }

    #[tokio::test]
    async fn test_cancel_keeps_last_snapshot() {
        let session = session();
        let mut rx = session.subscribe();
        let handle = session.submit(vec![local("stall"), local("b")]).unwrap();

        rx.wait_for(|state| {
            matches!(state, BatchUploadState::UploadingMultiple(files)
                if files[0].status == crate::state::FileUploadStatus::Uploading)
        })
        .await
        .unwrap();

        assert!(session.is_running());
        assert!(session.cancel());
        assert!(handle.await.unwrap_err().is_cancelled());

        let BatchUploadState::UploadingMultiple(files) = session.current() else {
            panic!("expected the last snapshot to remain");
        };
        assert_eq!(files.len(), 2);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_new_submission_replaces_running_batch() {
        let session = session();
        let mut rx = session.subscribe();
        let stalled = session.submit(vec![local("stall")]).unwrap();
        rx.wait_for(|state| *state == BatchUploadState::UploadingSingle(0))
            .await
            .unwrap();

        let replacement = session.submit(vec![local("ok.png")]).unwrap();
        replacement.await.unwrap();
        assert!(stalled.await.unwrap_err().is_cancelled());

        match session.current() {
            BatchUploadState::Success { file, all_files } => {
                assert_eq!(file.token, "token-ok.png");
                assert_eq!(all_files.len(), 1);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submission_snapshots_options() {
        let session = session();
        let options = UploadOptions {
            expiry: Some("2d".to_string()),
            hide_filename: true,
            password: Some("secure123".to_string()),
            one_time_download: true,
            bucket_token: None,
        };
        session.update_options(options.clone());
        assert_eq!(session.options(), options);

        session.submit(vec![local("a")]).unwrap().await.unwrap();
        session.update_options(UploadOptions::default());

        let seen = session.transport.seen_options.lock().unwrap().clone();
        assert_eq!(seen, vec![options]);
    }
}
