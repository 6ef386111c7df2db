use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub name: Option<String>,
    pub message: String,
    #[serde(default)]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyEntryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_expiry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_filename: Option<bool>,
}

impl ModifyEntryRequest {
    pub fn is_empty(&self) -> bool {
        self.password.is_none()
            && self.previous_password.is_none()
            && self.custom_expiry.is_none()
            && self.hide_filename.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlbumRequest {
    pub name: String,
    pub bucket_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociateFilesRequest {
    pub file_tokens: Vec<String>,
}
