use crate::config::AppConfig;
use crate::error::AppError;
use crate::metadata::{Image, ImageEdit, ImagePage, ImageUpload};
use crate::processor;
use crate::service::ImageService;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::sync::Mutex;

struct StoredImage {
    seq: u64,
    image: Image,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct Catalog {
    entries: Vec<StoredImage>,
    next_seq: u64,
}

/// An image service that lives in memory. Pages are cut newest first and
/// the cursor is the id of the last image handed out, so uploads made
/// between page requests never shift later pages.
#[derive(Default)]
pub struct LocalImageService {
    catalog: Mutex<Catalog>,
}

fn encode_id(seq: u64) -> String {
    format!("{:024x}", seq)
}

fn decode_cursor(cursor: &str) -> Result<u64, AppError> {
    if cursor.len() != 24 {
        return Err(AppError::Request(format!("Invalid cursor: {}", cursor)));
    }
    u64::from_str_radix(cursor, 16).map_err(|_| AppError::Request(format!("Invalid cursor: {}", cursor)))
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn matches_search(image: &Image, needle: &str) -> bool {
    [&image.title, &image.description, &image.filename]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

impl LocalImageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_uploads(uploads: Vec<ImageUpload>) -> Result<Self, AppError> {
        let service = Self::new();
        for upload in uploads {
            service.upload_image(upload).await?;
        }
        Ok(service)
    }

    pub async fn from_directory(root: PathBuf, config: &AppConfig) -> Result<Self, AppError> {
        log::info!("Seeding local gallery from {:?}", root);
        let allowed = config.allowed_extensions.clone();
        let workers = config.num_workers;

        let mut uploads = tokio::task::spawn_blocking(move || {
            processor::prepare_directory(&root, &allowed, workers)
        })
        .await??;
        uploads.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let mut service = Self::new();
        for upload in uploads {
            match service.upload_image(upload).await {
                Ok(image) => log::debug!("Seeded {} ({})", image.title, image.file_id),
                Err(e) => log::warn!("Skipping seed image: {}", e),
            }
        }
        let count = service.catalog.get_mut().entries.len();
        log::info!("Local gallery holds {} images", count);
        Ok(service)
    }

    pub async fn count_images(&self) -> usize {
        self.catalog.lock().await.entries.len()
    }
}

#[async_trait]
impl ImageService for LocalImageService {
    async fn list_images(
        &self,
        cursor: Option<String>,
        limit: u32,
        search: Option<String>,
    ) -> Result<ImagePage, AppError> {
        let before = cursor.as_deref().map(decode_cursor).transpose()?;
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let limit = limit.max(1) as usize;

        let catalog = self.catalog.lock().await;
        let mut matching = catalog
            .entries
            .iter()
            .filter(|entry| before.map_or(true, |seq| entry.seq < seq))
            .filter(|entry| {
                needle
                    .as_deref()
                    .map_or(true, |needle| matches_search(&entry.image, needle))
            });

        let page: Vec<&StoredImage> = matching.by_ref().take(limit).collect();
        let has_more = matching.next().is_some();
        let next_cursor = if has_more {
            page.last().map(|entry| encode_id(entry.seq))
        } else {
            None
        };

        log::debug!(
            "Local page: {} images after {:?} (has_more: {})",
            page.len(),
            cursor,
            has_more
        );
        Ok(ImagePage {
            images: page.into_iter().map(|entry| entry.image.clone()).collect(),
            next_cursor,
            has_more,
        })
    }

    async fn upload_image(&self, upload: ImageUpload) -> Result<Image, AppError> {
        if upload.title.trim().is_empty() {
            return Err(AppError::Request("Title is required".into()));
        }
        if upload.bytes.is_empty() {
            return Err(AppError::Request("No image file provided".into()));
        }

        let file_id = content_hash(&upload.bytes);
        let mut catalog = self.catalog.lock().await;
        if catalog.entries.iter().any(|e| e.image.file_id == file_id) {
            return Err(AppError::Request(format!(
                "An identical image already exists: {}",
                file_id
            )));
        }

        let seq = catalog.next_seq;
        catalog.next_seq += 1;
        let image = Image {
            id: encode_id(seq),
            title: upload.title.trim().to_string(),
            description: upload.description.trim().to_string(),
            filename: upload.file_name,
            size: upload.bytes.len() as u64,
            content_type: upload.content_type,
            file_id,
            width: upload.width,
            height: upload.height,
            upload_date: chrono::Utc::now().to_rfc3339(),
        };
        log::debug!("Stored {} as {}", image.filename, image.file_id);

        catalog.entries.insert(
            0,
            StoredImage {
                seq,
                image: image.clone(),
                bytes: upload.bytes,
            },
        );
        Ok(image)
    }

    async fn update_image_metadata(&self, id: &str, edit: ImageEdit) -> Result<Image, AppError> {
        if edit.title.trim().is_empty() {
            return Err(AppError::Request("Title is required".into()));
        }

        let mut catalog = self.catalog.lock().await;
        let entry = catalog
            .entries
            .iter_mut()
            .find(|e| e.image.file_id == id)
            .ok_or_else(|| AppError::Request("Image not found".into()))?;

        entry.image.title = edit.title.trim().to_string();
        entry.image.description = edit.description.trim().to_string();
        if edit.width.is_some() {
            entry.image.width = edit.width;
        }
        if edit.height.is_some() {
            entry.image.height = edit.height;
        }
        Ok(entry.image.clone())
    }

    async fn delete_image(&self, id: &str) -> Result<(), AppError> {
        let mut catalog = self.catalog.lock().await;
        let before = catalog.entries.len();
        catalog.entries.retain(|e| e.image.file_id != id);
        if catalog.entries.len() == before {
            return Err(AppError::Request("Image not found".into()));
        }
        log::debug!("Deleted image {}", id);
        Ok(())
    }

    async fn fetch_image_bytes(&self, file_id: &str) -> Result<Vec<u8>, AppError> {
        let catalog = self.catalog.lock().await;
        catalog
            .entries
            .iter()
            .find(|e| e.image.file_id == file_id)
            .map(|e| e.bytes.clone())
            .ok_or_else(|| AppError::Request("Image not found".into()))
    }
}
