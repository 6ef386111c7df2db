use futures::{StreamExt, stream::FuturesUnordered};
use tracing::{debug, info, warn};

use crate::{
    error::ApiResult,
    local_file::LocalFileRef,
    model::{UploadOptions, UploadedFile},
    state::{BatchUploadState, FileUploadProgress, FileUploadStatus, StateSink},
    transport::UploadTransport,
};

pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 1;

/// How a batch with some failed files is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialFailurePolicy {
    /// Any success makes the batch a success; failed files are left out of the result.
    #[default]
    BestEffort,
    /// Any failure makes the batch an error.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_concurrent: usize,
    pub partial_failure: PartialFailurePolicy,
    /// Publish `Processing` between the last upload and the terminal state.
    pub emit_processing: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_UPLOADS,
            partial_failure: PartialFailurePolicy::default(),
            emit_processing: false,
        }
    }
}

/// Uploads `files` with `options` and publishes every state change to `sink`.
///
/// A one-file batch reports `UploadingSingle(0)` then `UploadingSingle(100)`;
/// larger batches report a full `UploadingMultiple` snapshot on every change.
/// The final state is always `Success` or `Error`. Nothing is published for an
/// empty batch.
pub async fn run_batch<T, S>(
    transport: &T,
    files: &[LocalFileRef],
    options: &UploadOptions,
    config: &BatchConfig,
    sink: &S,
) where
    T: UploadTransport + ?Sized,
    S: StateSink + ?Sized,
{
    if files.is_empty() {
        return;
    }

    info!(files = files.len(), "starting upload batch");

    let outcomes = if let [file] = files {
        sink.publish(BatchUploadState::UploadingSingle(0));
        let outcome = upload_one(transport, file, options).await;
        sink.publish(BatchUploadState::UploadingSingle(100));
        vec![outcome]
    } else {
        upload_many(transport, files, options, config.max_concurrent.max(1), sink).await
    };

    if config.emit_processing {
        sink.publish(BatchUploadState::Processing);
    }

    let terminal = classify(files, outcomes, config.partial_failure);
    match &terminal {
        BatchUploadState::Success { all_files, .. } => {
            info!(succeeded = all_files.len(), total = files.len(), "upload batch finished")
        }
        BatchUploadState::Error { message, .. } => {
            warn!(total = files.len(), %message, "upload batch failed")
        }
        _ => {}
    }
    sink.publish(terminal);
}

async fn upload_one<T: UploadTransport + ?Sized>(
    transport: &T,
    file: &LocalFileRef,
    options: &UploadOptions,
) -> ApiResult<UploadedFile> {
    debug!(file = %file.display_name, "upload started");
    let result = transport.upload(file, options).await;
    match &result {
        Ok(uploaded) => debug!(file = %file.display_name, token = %uploaded.token, "upload finished"),
        Err(e) => warn!(file = %file.display_name, error = %e, "upload failed"),
    }
    result
}

/// Admits files in selection order, at most `limit` at a time. Every admission
/// and every completion publishes one whole snapshot.
async fn upload_many<T, S>(
    transport: &T,
    files: &[LocalFileRef],
    options: &UploadOptions,
    limit: usize,
    sink: &S,
) -> Vec<ApiResult<UploadedFile>>
where
    T: UploadTransport + ?Sized,
    S: StateSink + ?Sized,
{
    let mut entries: Vec<FileUploadProgress> = files
        .iter()
        .map(|file| FileUploadProgress::pending(file.display_name.clone()))
        .collect();
    sink.publish(BatchUploadState::UploadingMultiple(entries.clone()));

    let mut outcomes: Vec<Option<ApiResult<UploadedFile>>> = files.iter().map(|_| None).collect();
    let mut queue = files.iter().enumerate();
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < limit {
            let Some((index, file)) = queue.next() else {
                break;
            };
            entries[index].status = FileUploadStatus::Uploading;
            sink.publish(BatchUploadState::UploadingMultiple(entries.clone()));
            in_flight.push(async move { (index, upload_one(transport, file, options).await) });
        }

        let Some((index, result)) = in_flight.next().await else {
            break;
        };

        entries[index].status = match &result {
            Ok(uploaded) => FileUploadStatus::Success(uploaded.clone()),
            Err(e) => FileUploadStatus::Error(e.to_string()),
        };
        sink.publish(BatchUploadState::UploadingMultiple(entries.clone()));
        outcomes[index] = Some(result);
    }

    outcomes.into_iter().flatten().collect()
}

fn classify(
    files: &[LocalFileRef],
    outcomes: Vec<ApiResult<UploadedFile>>,
    policy: PartialFailurePolicy,
) -> BatchUploadState {
    let mut uploaded = Vec::new();
    let mut errors = Vec::new();

    for (file, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(uploaded_file) => uploaded.push(uploaded_file),
            Err(e) => errors.push(format!("{}: {}", file.display_name, e)),
        }
    }

    let fail = uploaded.is_empty() || (policy == PartialFailurePolicy::Strict && !errors.is_empty());

    if fail {
        BatchUploadState::Error {
            message: errors.join("\n"),
            cause: errors.first().cloned(),
        }
    } else {
        let first = uploaded[0].clone();
        BatchUploadState::Success {
            file: first,
            all_files: uploaded,
        }
    }
}
