use async_trait::async_trait;

use crate::{
    client::VaultClient,
    error::ApiResult,
    local_file::LocalFileRef,
    model::{UploadOptions, UploadedFile},
};

/// Sends one file in one request. Implementations make a single attempt and do not retry.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, file: &LocalFileRef, options: &UploadOptions) -> ApiResult<UploadedFile>;
}

#[async_trait]
impl UploadTransport for VaultClient {
    async fn upload(&self, file: &LocalFileRef, options: &UploadOptions) -> ApiResult<UploadedFile> {
        self.upload_file(file, options).await
    }
}

