// src/metadata.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored image as the API describes it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub upload_date: String,
}

impl Image {
    /// Key used for merging, updating and deleting. The API addresses
    /// images by their file reference, so that is what identifies them.
    pub fn key(&self) -> &str {
        &self.file_id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImagePage {
    pub images: Vec<Image>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
    pub title: String,
    pub description: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageEdit {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    if bytes < 1024 {
        format!("{} B", bytes)
    } else if (bytes as f64) < MB {
        format!("{:.2} KB", bytes as f64 / KB)
    } else {
        format!("{:.2} MB", bytes as f64 / MB)
    }
}

/// Renders an upload timestamp as e.g. "March 5, 2024". Anything that is not
/// RFC 3339 is returned untouched.
pub fn format_upload_date(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(date) => date.with_timezone(&Utc).format("%B %-d, %Y").to_string(),
        Err(_) => raw.to_string(),
    }
}
