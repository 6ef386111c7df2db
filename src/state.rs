use std::sync::Mutex;

use tokio::sync::watch;

use crate::model::UploadedFile;

/// Status of a single file within a multi-file batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileUploadStatus {
    Pending,
    Uploading,
    Success(UploadedFile),
    Error(String),
}

impl FileUploadStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, FileUploadStatus::Success(_) | FileUploadStatus::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUploadProgress {
    pub file_name: String,
    pub status: FileUploadStatus,
}

impl FileUploadProgress {
    pub fn pending(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            status: FileUploadStatus::Pending,
        }
    }
}

/// Observable state of an upload session.
///
/// `Idle` is the initial state and the only one reached by a reset. `Success`
/// and `Error` are terminal and stay put until the session is reset or a new
/// batch is submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BatchUploadState {
    #[default]
    Idle,
    /// Coarse progress for a one-file batch: 0 before the request, 100 once it returns.
    UploadingSingle(u8),
    /// One entry per file, in selection order.
    UploadingMultiple(Vec<FileUploadProgress>),
    Processing,
    Success {
        file: UploadedFile,
        all_files: Vec<UploadedFile>,
    },
    Error {
        message: String,
        cause: Option<String>,
    },
}

impl BatchUploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchUploadState::Success { .. } | BatchUploadState::Error { .. }
        )
    }

    /// `(finished, total)` for the current batch, if one is running.
    pub fn completed_count(&self) -> Option<(usize, usize)> {
        match self {
            BatchUploadState::UploadingSingle(percent) => Some((usize::from(*percent >= 100), 1)),
            BatchUploadState::UploadingMultiple(files) => Some((
                files.iter().filter(|f| f.status.is_finished()).count(),
                files.len(),
            )),
            _ => None,
        }
    }
}

/// Receives every state the orchestrator produces, in order.
pub trait StateSink: Send + Sync {
    fn publish(&self, state: BatchUploadState);
}

impl StateSink for watch::Sender<BatchUploadState> {
    fn publish(&self, state: BatchUploadState) {
        self.send_replace(state);
    }
}

/// Keeps the full history of published states. Watch receivers only see the
/// latest value, so this is what to use when every transition matters.
#[derive(Debug, Default)]
pub struct StateRecorder {
    states: Mutex<Vec<BatchUploadState>>,
}

impl StateRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<BatchUploadState> {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl StateSink for StateRecorder {
    fn publish(&self, state: BatchUploadState) {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(state);
    }
}
