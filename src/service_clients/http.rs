use crate::config::AppConfig;
use crate::error::AppError;
use crate::metadata::{Image, ImageEdit, ImagePage, ImageUpload};
use crate::service::ImageService;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const SUCCESS_CODE: &str = "200";

pub struct HttpImageService {
    client: Client,
    api_base: Url,
    image_base: Url,
}

#[derive(Serialize)]
struct ListQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
}

impl HttpImageService {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        log::debug!("Creating HTTP image service client for API: {}", config.api_base_url);
        let api_base = Url::parse(&config.api_base_url)?;
        let image_base = Url::parse(&config.image_base_url)?;
        if api_base.cannot_be_a_base() || image_base.cannot_be_a_base() {
            return Err(AppError::Generic(format!(
                "Base URLs must be hierarchical: {} / {}",
                api_base, image_base
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        log::trace!("HTTP image service client created successfully.");
        Ok(Self {
            client,
            api_base,
            image_base,
        })
    }

    pub fn image_url(&self, file_id: &str) -> Url {
        join_segments(&self.image_base, &[file_id])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        join_segments(&self.api_base, segments)
    }

    fn list_request(
        &self,
        cursor: Option<&str>,
        limit: u32,
        search: Option<&str>,
    ) -> RequestBuilder {
        let url = self.endpoint(&["images"]);
        log::debug!(
            "GET {} (cursor: {:?}, limit: {}, search: {:?})",
            url,
            cursor,
            limit,
            search
        );
        self.client.get(url).query(&ListQuery {
            cursor,
            limit,
            search,
        })
    }

    fn upload_request(&self, upload: ImageUpload) -> Result<RequestBuilder, AppError> {
        let url = self.endpoint(&["images", "upload"]);
        log::debug!("POST {} ({} bytes, title: {})", url, upload.bytes.len(), upload.title);

        let fields = upload_fields(&upload);
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)?;
        let form = fields
            .into_iter()
            .fold(Form::new().part("image", part), |form, (name, value)| {
                form.text(name, value)
            });
        Ok(self.client.post(url).multipart(form))
    }

    fn update_request(&self, id: &str, edit: &ImageEdit) -> RequestBuilder {
        let url = self.endpoint(&["images", id]);
        log::debug!("PUT {} (title: {})", url, edit.title);
        self.client.put(url).json(edit)
    }

    fn delete_request(&self, id: &str) -> RequestBuilder {
        let url = self.endpoint(&["images", id]);
        log::debug!("DELETE {}", url);
        self.client.delete(url)
    }
}

/// Text fields sent next to the `image` part. Dimensions go only when known.
pub(crate) fn upload_fields(upload: &ImageUpload) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("title", upload.title.clone()),
        ("description", upload.description.clone()),
    ];
    if let Some(width) = upload.width {
        fields.push(("width", width.to_string()));
    }
    if let Some(height) = upload.height {
        fields.push(("height", height.to_string()));
    }
    fields
}

fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    // Both bases are checked for cannot_be_a_base at construction.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Reads the `{ returncode, message, ... }` envelope and turns anything but a
/// "200" into a request error carrying the server's message.
async fn read_envelope(response: Response, fallback: &str) -> Result<Value, AppError> {
    let status = response.status();
    let body = match response.json::<Value>().await {
        Ok(body) => body,
        Err(e) if status.is_success() => return Err(AppError::Http(e)),
        Err(_) => {
            return Err(AppError::Request(format!(
                "{}: server responded with {}",
                fallback, status
            )))
        }
    };
    log::trace!("Image service response ({}): {:?}", status, body);
    check_envelope(body, fallback)
}

pub(crate) fn check_envelope(body: Value, fallback: &str) -> Result<Value, AppError> {
    let code = match &body["returncode"] {
        Value::String(code) => code.clone(),
        Value::Number(code) => code.to_string(),
        _ => String::new(),
    };

    if code != SUCCESS_CODE {
        let message = body["message"]
            .as_str()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(fallback)
            .to_string();
        log::debug!("Image service returned code {:?}: {}", code, message);
        return Err(AppError::Request(message));
    }

    Ok(body)
}

pub(crate) fn parse_page(body: &Value) -> Result<ImagePage, AppError> {
    let data = &body["data"];
    let images: Vec<Image> = match data.get("images") {
        Some(images) => serde_json::from_value(images.clone())?,
        None => Vec::new(),
    };
    let pagination = &data["pagination"];
    let next_cursor = pagination["next_cursor"].as_str().map(|s| s.to_string());
    let has_more = pagination["has_more"].as_bool().unwrap_or(false);

    Ok(ImagePage {
        images,
        next_cursor,
        has_more,
    })
}

pub(crate) fn parse_image(body: &Value, fallback: &str) -> Result<Image, AppError> {
    match body.get("image") {
        Some(image) if !image.is_null() => Ok(serde_json::from_value(image.clone())?),
        _ => Err(AppError::Request(fallback.to_string())),
    }
}

#[async_trait]
impl ImageService for HttpImageService {
    async fn list_images(
        &self,
        cursor: Option<String>,
        limit: u32,
        search: Option<String>,
    ) -> Result<ImagePage, AppError> {
        let response = self
            .list_request(cursor.as_deref(), limit, search.as_deref())
            .send()
            .await?;

        let body = read_envelope(response, "Failed to fetch images").await?;
        let page = parse_page(&body)?;
        log::debug!(
            "Fetched {} images (has_more: {}, next_cursor: {:?})",
            page.images.len(),
            page.has_more,
            page.next_cursor
        );
        Ok(page)
    }

    async fn upload_image(&self, upload: ImageUpload) -> Result<Image, AppError> {
        let response = self.upload_request(upload)?.send().await?;
        let body = read_envelope(response, "Failed to upload image").await?;
        parse_image(&body, "Failed to upload image")
    }

    async fn update_image_metadata(&self, id: &str, edit: ImageEdit) -> Result<Image, AppError> {
        let response = self.update_request(id, &edit).send().await?;
        let body = read_envelope(response, "Failed to update image").await?;
        parse_image(&body, "Failed to update image")
    }

    async fn delete_image(&self, id: &str) -> Result<(), AppError> {
        let response = self.delete_request(id).send().await?;
        read_envelope(response, "Failed to delete image").await?;
        Ok(())
    }

    async fn fetch_image_bytes(&self, file_id: &str) -> Result<Vec<u8>, AppError> {
        let url = self.image_url(file_id);
        log::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Request(format!(
                "Failed to fetch file: server responded with {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Engine;
    use reqwest::header::CONTENT_TYPE;
    use reqwest::Method;
    use serde_json::json;

    fn service() -> HttpImageService {
        let config = AppConfig {
            engine: Engine::Http,
            api_base_url: "http://localhost:8000/api/".into(),
            image_base_url: "http://localhost:8000/files".into(),
            ..AppConfig::default()
        };
        HttpImageService::new(&config).unwrap()
    }

    #[test]
    fn non_success_returncode_carries_message() {
        let body = json!({ "returncode": "400", "message": "Title is required" });
        let err = check_envelope(body, "Failed to upload image").unwrap_err();
        assert!(matches!(err, AppError::Request(ref m) if m == "Title is required"));
    }

    #[test]
    fn missing_message_falls_back() {
        let body = json!({ "returncode": "500" });
        let err = check_envelope(body, "Failed to fetch images").unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch images");
    }

    #[test]
    fn numeric_returncode_is_accepted() {
        let body = json!({ "returncode": 200, "message": "ok" });
        assert!(check_envelope(body, "x").is_ok());
    }

    #[test]
    fn page_is_decoded_with_cursor_verbatim() {
        let body = json!({
            "returncode": "200",
            "message": "ok",
            "data": {
                "images": [{
                    "_id": "1",
                    "title": "a",
                    "description": "",
                    "filename": "a.png",
                    "size": 10,
                    "contentType": "image/png",
                    "fileId": "f1",
                    "uploadDate": "2024-01-01T00:00:00Z"
                }],
                "pagination": { "next_cursor": "opaque==", "has_more": true }
            }
        });

        let page = parse_page(&body).unwrap();
        assert_eq!(page.images.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("opaque=="));
        assert!(page.has_more);
    }

    #[test]
    fn last_page_has_no_cursor() {
        let body = json!({
            "returncode": "200",
            "data": { "images": [], "pagination": { "next_cursor": null, "has_more": false } }
        });
        let page = parse_page(&body).unwrap();
        assert_eq!(page.next_cursor, None);
        assert!(!page.has_more);
    }

    #[test]
    fn missing_image_in_success_envelope_is_an_error() {
        let body = json!({ "returncode": "200", "message": "ok" });
        assert!(parse_image(&body, "Failed to update image").is_err());
    }

    #[test]
    fn endpoints_join_onto_base_path() {
        let service = service();
        assert_eq!(
            service.endpoint(&["images", "a b"]).as_str(),
            "http://localhost:8000/api/images/a%20b"
        );
        assert_eq!(
            service.image_url("f1").as_str(),
            "http://localhost:8000/files/f1"
        );
    }

    fn upload(width: Option<u32>, height: Option<u32>) -> ImageUpload {
        ImageUpload {
            bytes: vec![1, 2, 3],
            file_name: "sunset.png".into(),
            content_type: "image/png".into(),
            title: "Sunset".into(),
            description: "Over the bay".into(),
            width,
            height,
        }
    }

    #[test]
    fn list_query_omits_absent_parameters() {
        let request = service().list_request(None, 12, None).build().unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().path(), "/api/images");
        assert_eq!(request.url().query(), Some("limit=12"));
    }

    #[test]
    fn list_query_encodes_cursor_and_search() {
        let request = service()
            .list_request(Some("a+b/="), 12, Some("sun set"))
            .build()
            .unwrap();
        assert_eq!(
            request.url().query(),
            Some("cursor=a%2Bb%2F%3D&limit=12&search=sun+set")
        );
    }

    #[test]
    fn upload_is_multipart_post() {
        let request = service()
            .upload_request(upload(Some(640), Some(480)))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/api/images/upload");
        let content_type = request.headers()[CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
    }

    #[test]
    fn upload_fields_include_dimensions_only_when_known() {
        let names: Vec<&str> = upload_fields(&upload(None, None))
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["title", "description"]);

        let fields = upload_fields(&upload(Some(640), None));
        assert_eq!(fields.last(), Some(&("width", "640".to_string())));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn invalid_content_type_is_rejected_before_sending() {
        let mut bad = upload(None, None);
        bad.content_type = "not a mime".into();
        assert!(service().upload_request(bad).is_err());
    }

    #[test]
    fn update_is_json_put_by_id() {
        let edit = ImageEdit {
            title: "New".into(),
            description: "Desc".into(),
            width: None,
            height: None,
        };
        let request = service().update_request("f1", &edit).build().unwrap();
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.url().path(), "/api/images/f1");

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let json: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json, json!({ "title": "New", "description": "Desc" }));
    }

    #[test]
    fn delete_addresses_image_by_id() {
        let request = service().delete_request("f1").build().unwrap();
        assert_eq!(request.method(), Method::DELETE);
        assert_eq!(request.url().as_str(), "http://localhost:8000/api/images/f1");
    }
}
