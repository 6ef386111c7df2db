//! Client library for uploading to and managing files on a WaifuVault server.
//!
//! [`session::UploadSession`] runs upload batches in the background and
//! publishes [`state::BatchUploadState`] snapshots; [`client::VaultClient`]
//! talks to the REST API.

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod local_file;
pub mod model;
pub mod rest_types;
mod serde_utils;
pub mod session;
pub mod state;
pub mod transport;

pub use batch::{BatchConfig, PartialFailurePolicy, run_batch};
pub use client::VaultClient;
pub use error::{ApiError, ApiResult};
pub use local_file::LocalFileRef;
pub use model::{UploadOptions, UploadedFile};
pub use session::UploadSession;
pub use state::{BatchUploadState, FileUploadProgress, FileUploadStatus};
