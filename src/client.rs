use std::time::Duration;

use reqwest::{
    Client, Response, StatusCode,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{ApiError, ApiResult},
    local_file::LocalFileRef,
    model::{Album, Bucket, Restrictions, UploadOptions, UploadedFile},
    rest_types::{AssociateFilesRequest, CreateAlbumRequest, ErrorResponse, ModifyEntryRequest},
};

pub const DEFAULT_BASE_URL: &str = "https://waifuvault.moe";

const REST_ROOT: &str = "rest";
const FILE_PART_MIME: &str = "application/octet-stream";

/// HTTP client for the WaifuVault REST API.
#[derive(Clone, Debug)]
pub struct VaultClient {
    client: Client,
    base_url: Url,
}

impl VaultClient {
    pub fn new(base_url: Url) -> ApiResult<Self> {
        Self::build(base_url, None)
    }

    pub fn with_timeout(base_url: Url, timeout: Duration) -> ApiResult<Self> {
        Self::build(base_url, Some(timeout))
    }

    fn build(mut base_url: Url, timeout: Option<Duration>) -> ApiResult<Self> {
        let mut builder = Client::builder().user_agent(concat!("wvault/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(REST_ROOT)
            .extend(segments);
        Ok(url)
    }

    pub async fn upload_file(
        &self,
        file: &LocalFileRef,
        options: &UploadOptions,
    ) -> ApiResult<UploadedFile> {
        let url = self.endpoint(&[])?;

        let file_part = Part::file(&file.path)
            .await
            .map_err(|source| ApiError::Io {
                path: file.path.clone(),
                source,
            })?
            .file_name(file.display_name.clone())
            .mime_str(FILE_PART_MIME)?;

        debug!(
            file = %file.display_name,
            size_bytes = file.size_bytes,
            "uploading file"
        );

        let response = self
            .client
            .put(url)
            .multipart(upload_form(file_part, options))
            .send()
            .await?;

        let response = check_status(response, "Upload").await?;
        read_json(response).await
    }

    pub async fn file_info(&self, token: &str, formatted: bool) -> ApiResult<UploadedFile> {
        let url = self.endpoint(&[token])?;

        let response = self
            .client
            .get(url)
            .query(&[("formatted", formatted)])
            .send()
            .await?;

        let response = check_status(response, "File lookup").await?;
        read_json(response).await
    }

    pub async fn delete_file(&self, token: &str) -> ApiResult<()> {
        let url = self.endpoint(&[token])?;
        let response = self.client.delete(url).send().await?;
        expect_confirmation(response, "Delete").await
    }

    pub async fn download_file(
        &self,
        identifier: &str,
        password: Option<&str>,
    ) -> ApiResult<Vec<u8>> {
        let url = self.endpoint(&[identifier])?;

        let mut request = self.client.get(url);
        if let Some(password) = password {
            request = request.query(&[("password", password)]);
        }

        let response = check_status(request.send().await?, "Download").await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn modify_entry(
        &self,
        token: &str,
        request: &ModifyEntryRequest,
    ) -> ApiResult<UploadedFile> {
        let url = self.endpoint(&[token])?;
        let response = self.client.patch(url).json(request).send().await?;

        let response = check_status(response, "Modify").await?;
        read_json(response).await
    }

    pub async fn create_bucket(&self) -> ApiResult<Bucket> {
        let url = self.endpoint(&["bucket", "create"])?;
        let response = self.client.post(url).send().await?;

        let response = check_status(response, "Bucket creation").await?;
        read_json(response).await
    }

    pub async fn get_bucket(&self, token: &str) -> ApiResult<Bucket> {
        let url = self.endpoint(&["bucket", token])?;
        let response = self.client.get(url).send().await?;

        let response = check_status(response, "Bucket lookup").await?;
        read_json(response).await
    }

    pub async fn delete_bucket(&self, token: &str) -> ApiResult<()> {
        let url = self.endpoint(&["bucket", token])?;
        let response = self.client.delete(url).send().await?;
        expect_confirmation(response, "Bucket deletion").await
    }

    pub async fn create_album(&self, bucket_token: &str, name: &str) -> ApiResult<Album> {
        let url = self.endpoint(&["album", "create"])?;
        let request = CreateAlbumRequest {
            name: name.to_string(),
            bucket_token: bucket_token.to_string(),
        };

        let response = self.client.post(url).json(&request).send().await?;

        let response = check_status(response, "Album creation").await?;
        read_json(response).await
    }

    pub async fn get_album(&self, token: &str) -> ApiResult<Album> {
        let url = self.endpoint(&["album", token])?;
        let response = self.client.get(url).send().await?;

        let response = check_status(response, "Album lookup").await?;
        read_json(response).await
    }

    pub async fn delete_album(&self, token: &str, delete_files: bool) -> ApiResult<()> {
        let url = self.endpoint(&["album", token])?;
        let response = self
            .client
            .delete(url)
            .query(&[("deleteFiles", delete_files)])
            .send()
            .await?;
        expect_confirmation(response, "Album deletion").await
    }

    pub async fn share_album(&self, token: &str) -> ApiResult<Album> {
        let url = self.endpoint(&["album", "share", token])?;
        let response = self.client.put(url).send().await?;

        let response = check_status(response, "Album sharing").await?;
        read_json(response).await
    }

    pub async fn revoke_album(&self, token: &str) -> ApiResult<()> {
        let url = self.endpoint(&["album", "share", token])?;
        let response = self.client.delete(url).send().await?;
        expect_confirmation(response, "Album revocation").await
    }

    pub async fn associate_files(&self, album_token: &str, file_tokens: &[String]) -> ApiResult<Album> {
        let url = self.endpoint(&["album", album_token, "files"])?;
        let request = AssociateFilesRequest {
            file_tokens: file_tokens.to_vec(),
        };

        let response = self.client.put(url).json(&request).send().await?;

        let response = check_status(response, "Adding files to album").await?;
        read_json(response).await
    }

    pub async fn disassociate_files(
        &self,
        album_token: &str,
        file_tokens: &[String],
    ) -> ApiResult<Album> {
        let url = self.endpoint(&["album", album_token, "files"])?;
        let request = AssociateFilesRequest {
            file_tokens: file_tokens.to_vec(),
        };

        let response = self.client.delete(url).json(&request).send().await?;

        let response = check_status(response, "Removing files from album").await?;
        read_json(response).await
    }

    /// Fetches an album as a zip archive, optionally limited to some file ids.
    pub async fn download_album(&self, token: &str, file_ids: &[i64]) -> ApiResult<Vec<u8>> {
        let url = self.endpoint(&["album", "download", token])?;

        let mut request = self.client.get(url);
        if !file_ids.is_empty() {
            let ids = file_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            request = request.query(&[("fileIds", ids)]);
        }

        let response = check_status(request.send().await?, "Album download").await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn restrictions(&self) -> ApiResult<Restrictions> {
        let url = self.endpoint(&["resources", "restrictions"])?;
        let response = self.client.get(url).send().await?;

        let response = check_status(response, "Restrictions lookup").await?;
        read_json(response).await
    }
}

/// Builds the multipart body for one upload. Boolean flags are always sent as
/// `"true"`/`"false"`; optional text fields only when present.
fn upload_form(file_part: Part, options: &UploadOptions) -> Form {
    let mut form = Form::new().part("file", file_part);

    if let Some(expiry) = &options.expiry {
        form = form.text("expires", expiry.clone());
    }
    form = form.text("hide_filename", options.hide_filename.to_string());
    if let Some(password) = &options.password {
        form = form.text("password", password.clone());
    }
    form = form.text("one_time_download", options.one_time_download.to_string());
    if let Some(bucket_token) = &options.bucket_token {
        form = form.text("bucket_token", bucket_token.clone());
    }

    form
}

async fn check_status(response: Response, operation: &'static str) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = error_from_body(status, &body, operation);
    warn!(%status, operation, error = %error, "request failed");
    Err(error)
}

fn error_from_body(status: StatusCode, body: &str, operation: &'static str) -> ApiError {
    if let Ok(response) = serde_json::from_str::<ErrorResponse>(body)
        && !response.message.trim().is_empty()
    {
        return ApiError::Server {
            status,
            message: response.message,
        };
    }

    let reason = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    ApiError::Status {
        operation,
        status,
        reason,
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Delete-style endpoints answer with a bare `true`/`false`.
async fn expect_confirmation(response: Response, operation: &'static str) -> ApiResult<()> {
    let response = check_status(response, operation).await?;
    let body = response.text().await?;

    match serde_json::from_str::<bool>(body.trim()) {
        Ok(false) => Err(ApiError::Rejected { operation }),
        _ => Ok(()),
    }
}
