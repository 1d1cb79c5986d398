use crate::metadata::{Image, ImagePage};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fetch,
    Upload,
    Update,
    Delete,
}

impl Operation {
    pub fn failure_message(self) -> &'static str {
        match self {
            Operation::Fetch => "Failed to fetch images",
            Operation::Upload => "Failed to upload image",
            Operation::Update => "Failed to update image",
            Operation::Delete => "Failed to delete image",
        }
    }

    pub fn describe_failure(self, message: &str) -> String {
        if message.trim().is_empty() {
            self.failure_message().to_string()
        } else {
            message.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GalleryEvent {
    FetchStarted,
    FetchSucceeded { page: ImagePage, first_page: bool },
    FetchFailed(String),
    UploadSucceeded(Image),
    UpdateSucceeded(Image),
    DeleteSucceeded(String),
    SearchChanged(Option<String>),
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryState {
    pub images: Vec<Image>,
    pub loading: bool,
    pub error: Option<String>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub search_query: Option<String>,
}

impl Default for GalleryState {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            loading: false,
            error: None,
            has_more: true,
            next_cursor: None,
            search_query: None,
        }
    }
}

impl GalleryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: GalleryEvent) {
        match event {
            GalleryEvent::FetchStarted => {
                self.loading = true;
                self.error = None;
            }
            GalleryEvent::FetchSucceeded { page, first_page } => {
                if first_page {
                    self.images.clear();
                }
                self.merge(page.images);
                self.has_more = page.has_more;
                self.next_cursor = if page.has_more { page.next_cursor } else { None };
                self.loading = false;
            }
            GalleryEvent::FetchFailed(message) => {
                self.loading = false;
                self.error = Some(message);
            }
            GalleryEvent::UploadSucceeded(image) => {
                self.images.retain(|i| i.key() != image.key());
                self.images.insert(0, image);
                self.loading = false;
            }
            GalleryEvent::UpdateSucceeded(image) => {
                if let Some(slot) = self.images.iter_mut().find(|i| i.key() == image.key()) {
                    *slot = image;
                } else {
                    log::trace!("Updated image {} is not loaded; nothing to replace", image.key());
                }
                self.loading = false;
            }
            GalleryEvent::DeleteSucceeded(id) => {
                self.images.retain(|i| i.key() != id);
                self.loading = false;
            }
            GalleryEvent::SearchChanged(term) => {
                self.search_query = normalize_search(term);
            }
            GalleryEvent::Reset => {
                self.images.clear();
                self.next_cursor = None;
                self.has_more = true;
            }
        }
    }

    /// Appends `incoming`, dropping anything whose key is already present
    /// (including repeats inside `incoming` itself).
    fn merge(&mut self, incoming: Vec<Image>) {
        let mut seen: HashSet<String> = self.images.iter().map(|i| i.key().to_string()).collect();
        let before = self.images.len();
        let offered = incoming.len();

        self.images.extend(
            incoming
                .into_iter()
                .filter(|image| seen.insert(image.key().to_string())),
        );

        let added = self.images.len() - before;
        if added < offered {
            log::debug!("Merge skipped {} duplicate images", offered - added);
        }
    }
}

/// Blank search terms mean "no filter".
pub fn normalize_search(term: Option<String>) -> Option<String> {
    term.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
