use crate::config::AppConfig;
use crate::coordinator::{FetchRequest, PaginationCoordinator, Settled};
use crate::error::AppError;
use crate::metadata::{Image, ImageEdit, ImageUpload};
use crate::service::ImageService;
use crate::store::{GalleryEvent, GalleryState, Operation};
use crate::viewport::Viewport;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// The coordinator lock is never held across a service call, so triggers
/// fired while a request is outstanding are rejected immediately.
pub struct Gallery<V: Viewport> {
    service: Arc<dyn ImageService>,
    coordinator: Mutex<PaginationCoordinator>,
    viewport: Mutex<V>,
    scroll_restore_delay: Duration,
}

impl<V: Viewport> Gallery<V> {
    pub fn new(service: Arc<dyn ImageService>, viewport: V, config: &AppConfig) -> Self {
        Self {
            service,
            coordinator: Mutex::new(PaginationCoordinator::new(
                config.page_size,
                config.proximity_margin,
            )),
            viewport: Mutex::new(viewport),
            scroll_restore_delay: config.scroll_restore_delay(),
        }
    }

    pub async fn snapshot(&self) -> GalleryState {
        self.coordinator.lock().await.state().clone()
    }

    pub async fn viewport(&self) -> MutexGuard<'_, V> {
        self.viewport.lock().await
    }

    pub async fn sentinel_armed(&self) -> bool {
        self.coordinator.lock().await.sentinel_armed()
    }

    pub async fn mount(&self) -> Option<Settled> {
        let request = self.coordinator.lock().await.bootstrap();
        self.run(request).await
    }

    /// Checks the viewport's current geometry against the sentinel and loads
    /// the next page if it came into range.
    pub async fn poll_sentinel(&self) -> Option<Settled> {
        let geometry = self.viewport.lock().await.geometry();
        let request = self.coordinator.lock().await.sentinel_check(geometry);
        self.run(request).await
    }

    /// Explicit "load more", e.g. a retry after a failure.
    pub async fn load_more(&self) -> Option<Settled> {
        let offset = self.viewport.lock().await.scroll_offset();
        let request = self.coordinator.lock().await.load_more(offset);
        self.run(request).await
    }

    pub async fn search(&self, term: Option<String>) -> Option<Settled> {
        let request = self.coordinator.lock().await.search_changed(term);
        self.run(request).await
    }

    pub async fn render_complete(&self) {
        self.coordinator.lock().await.render_complete();
    }

    async fn run(&self, request: Option<FetchRequest>) -> Option<Settled> {
        let request = request?;
        let result = self
            .service
            .list_images(request.cursor.clone(), request.limit, request.search.clone())
            .await;

        let settled = self.coordinator.lock().await.complete(&request, result);
        if let Some(offset) = settled.restore_scroll() {
            // Give layout a moment to absorb the new items first.
            tokio::time::sleep(self.scroll_restore_delay).await;
            if self.coordinator.lock().await.is_latest(&request) {
                log::trace!("Restoring scroll offset {:.0}", offset);
                self.viewport.lock().await.scroll_to(offset);
            } else {
                log::debug!(
                    "Skipping scroll restore for fetch {}: a newer request was issued",
                    request.id
                );
            }
        }
        Some(settled)
    }

    pub async fn upload(&self, upload: ImageUpload) -> Result<Image, AppError> {
        self.begin(Operation::Upload).await;
        let result = self.service.upload_image(upload).await;
        self.settle(Operation::Upload, result, |image| {
            GalleryEvent::UploadSucceeded(image.clone())
        })
        .await
    }

    pub async fn update(&self, id: &str, edit: ImageEdit) -> Result<Image, AppError> {
        self.begin(Operation::Update).await;
        let result = self.service.update_image_metadata(id, edit).await;
        self.settle(Operation::Update, result, |image| {
            GalleryEvent::UpdateSucceeded(image.clone())
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.begin(Operation::Delete).await;
        let result = self.service.delete_image(id).await;
        self.settle(Operation::Delete, result, |_| {
            GalleryEvent::DeleteSucceeded(id.to_string())
        })
        .await
    }

    /// Saves an image's bytes to `destination`. Does not touch the store.
    pub async fn download(&self, file_id: &str, destination: &Path) -> Result<u64, AppError> {
        let bytes = self.service.fetch_image_bytes(file_id).await?;
        tokio::fs::write(destination, &bytes).await?;
        log::info!("Saved {} bytes to {:?}", bytes.len(), destination);
        Ok(bytes.len() as u64)
    }

    async fn begin(&self, operation: Operation) {
        self.coordinator.lock().await.begin_operation(operation);
    }

    async fn settle<T>(
        &self,
        operation: Operation,
        result: Result<T, AppError>,
        on_success: impl FnOnce(&T) -> GalleryEvent,
    ) -> Result<T, AppError> {
        let deferred = {
            let mut coordinator = self.coordinator.lock().await;
            match &result {
                Ok(value) => coordinator.apply(on_success(value)),
                Err(e) => {
                    let message = operation.describe_failure(&e.to_string());
                    log::warn!("{:?} failed: {}", operation, message);
                    coordinator.apply(GalleryEvent::FetchFailed(message));
                }
            }
            coordinator.resume_bootstrap()
        };
        // A mount that arrived while this operation was pending still owes
        // the view its first page.
        self.run(deferred).await;
        result
    }
}
