use std::{fmt::Display, time::SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::serde_utils;

/// Options sent alongside every file in an upload.
///
/// Absent optional fields are left out of the request so the server defaults apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub expiry: Option<String>,
    pub hide_filename: bool,
    pub password: Option<String>,
    pub one_time_download: bool,
    pub bucket_token: Option<String>,
}

/// Flags as echoed back by the server for a stored file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOptions {
    #[serde(default)]
    pub hide_filename: bool,
    #[serde(default)]
    pub one_time_download: bool,
    #[serde(default)]
    pub protected: bool,
}

/// Lifetime of an uploaded file: a human string when requested formatted, raw milliseconds otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetentionPeriod {
    Millis(u64),
    Formatted(String),
}

impl Display for RetentionPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionPeriod::Formatted(s) => write!(f, "{}", s),
            RetentionPeriod::Millis(ms) => {
                let duration = std::time::Duration::from_secs(ms / 1000);
                write!(f, "{}", humantime::format_duration(duration))
            }
        }
    }
}

/// A file record as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub token: String,
    pub url: String,
    #[serde(default)]
    pub options: FileOptions,
    pub retention_period: RetentionPeriod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumInfo {
    pub token: String,
    #[serde(default)]
    pub public_token: Option<String>,
    pub name: String,
    #[serde(default, alias = "bucket")]
    pub bucket_token: Option<String>,
    #[serde(
        default,
        skip_serializing,
        deserialize_with = "serde_utils::deserialize_optional_timestamp_millis"
    )]
    pub date_created: Option<SystemTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub token: String,
    #[serde(default, deserialize_with = "serde_utils::deserialize_null_default")]
    pub files: Vec<UploadedFile>,
    #[serde(default, deserialize_with = "serde_utils::deserialize_null_default")]
    pub albums: Vec<AlbumInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub token: String,
    pub bucket_token: String,
    #[serde(default)]
    pub public_token: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "serde_utils::deserialize_null_default")]
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Restriction {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

pub const MAX_FILE_SIZE: &str = "MAX_FILE_SIZE";
pub const BANNED_MIME_TYPE: &str = "BANNED_MIME_TYPE";

/// Server-side upload limits from the restrictions endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Restrictions(pub Vec<Restriction>);

impl Restrictions {
    pub fn get(&self, kind: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|restriction| restriction.kind == kind)
            .map(|restriction| &restriction.value)
    }

    pub fn max_file_size(&self) -> Option<u64> {
        match self.get(MAX_FILE_SIZE)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn banned_mime_types(&self) -> Vec<String> {
        match self.get(BANNED_MIME_TYPE) {
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn exceeds_max_size(&self, size_bytes: u64) -> bool {
        self.max_file_size().is_some_and(|max| size_bytes > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploaded_file_from_formatted_response() {
        let json = r#"{
            "token": "token123",
            "url": "https://waifuvault.moe/f/1700000000/test.jpg",
            "options": {"hideFilename": true, "oneTimeDownload": true, "protected": true},
            "retentionPeriod": "1 hour 2 minutes",
            "id": 1,
            "views": 0
        }"#;
        let file: UploadedFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.token, "token123");
        assert!(file.options.hide_filename);
        assert!(file.options.protected);
        assert_eq!(
            file.retention_period,
            RetentionPeriod::Formatted("1 hour 2 minutes".to_string())
        );
        assert_eq!(file.bucket, None);
        assert_eq!(file.views, Some(0));
    }

    #[test]
    fn test_uploaded_file_with_millis_retention() {
        let json = r#"{
            "token": "t",
            "url": "u",
            "options": {},
            "retentionPeriod": 3600000,
            "bucket": "bucket-token"
        }"#;
        let file: UploadedFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.retention_period, RetentionPeriod::Millis(3_600_000));
        assert_eq!(file.retention_period.to_string(), "1h");
        assert_eq!(file.options, FileOptions::default());
        assert_eq!(file.bucket.as_deref(), Some("bucket-token"));
    }

    #[test]
    fn test_bucket_with_null_collections() {
        let bucket: Bucket =
            serde_json::from_str(r#"{"token": "b", "files": null, "albums": null}"#).unwrap();
        assert!(bucket.files.is_empty());
        assert!(bucket.albums.is_empty());
    }

    #[test]
    fn test_restrictions_accessors() {
        let json = r#"[
            {"type": "MAX_FILE_SIZE", "value": 536870912},
            {"type": "BANNED_MIME_TYPE", "value": "application/x-dosexec, application/x-executable"}
        ]"#;
        let restrictions: Restrictions = serde_json::from_str(json).unwrap();
        assert_eq!(restrictions.max_file_size(), Some(536_870_912));
        assert_eq!(
            restrictions.banned_mime_types(),
            vec!["application/x-dosexec", "application/x-executable"]
        );
        assert!(restrictions.exceeds_max_size(536_870_913));
        assert!(!restrictions.exceeds_max_size(1024));
        assert!(restrictions.get("UNKNOWN").is_none());
    }

    #[test]
    fn test_empty_restrictions_never_exceed() {
        let restrictions = Restrictions::default();
        assert_eq!(restrictions.max_file_size(), None);
        assert!(!restrictions.exceeds_max_size(u64::MAX));
        assert!(restrictions.banned_mime_types().is_empty());
    }
}
