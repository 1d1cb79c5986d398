use crate::error::AppError;
use crate::metadata::{Image, ImageEdit, ImagePage, ImageUpload};
use async_trait::async_trait;

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn list_images(
        &self,
        cursor: Option<String>,
        limit: u32,
        search: Option<String>,
    ) -> Result<ImagePage, AppError>;
    async fn upload_image(&self, upload: ImageUpload) -> Result<Image, AppError>;
    async fn update_image_metadata(&self, id: &str, edit: ImageEdit) -> Result<Image, AppError>;
    async fn delete_image(&self, id: &str) -> Result<(), AppError>;
    async fn fetch_image_bytes(&self, file_id: &str) -> Result<Vec<u8>, AppError>;
}
