//! Client for the annotation server.
//!
//! Three endpoints plus static image fetch:
//!   `POST {base}/upload`       — multipart `file` field, returns `{filename}`
//!   `POST {base}/save`         — JSON of data-URL PNG payloads
//!   `POST {base}/get_credits`  — bearer-authorized, returns `{credits}`
//!   `GET  {base}/static/images/{filename}` — previously uploaded images
//!
//! All calls are blocking; the app runs them on worker threads and collects
//! results over channels, never on the UI thread.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ureq::Agent;

/// Path prefix the server exposes uploaded images under.
pub const SERVER_IMAGE_PREFIX: &str = "/static/images/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for annotation server calls.
#[derive(Debug)]
pub enum ApiError {
    /// Transport failure or non-2xx status.
    Http(String),
    /// The server answered with an application-level `{error}` message.
    Server(String),
    /// A response body did not match the expected shape.
    Payload(String),
    /// Credits were requested but no API key is configured.
    MissingApiKey,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "request failed: {}", e),
            ApiError::Server(e) => write!(f, "server error: {}", e),
            ApiError::Payload(e) => write!(f, "unexpected response: {}", e),
            ApiError::MissingApiKey => write!(f, "no API key configured"),
        }
    }
}

impl From<ureq::Error> for ApiError {
    fn from(e: ureq::Error) -> Self {
        ApiError::Http(e.to_string())
    }
}

/// The `/save` request body.  `mask_image` is only present when the widget
/// runs with the mask capability on.
#[derive(Serialize, Debug)]
pub struct SavePayload {
    pub merged_image: String,
    pub drawing_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_image: Option<String>,
}

impl SavePayload {
    /// Encode the three surfaces into the request body.  Pass `None` for the
    /// mask when the mask capability is off; the field is then omitted from
    /// the JSON entirely rather than sent as null.
    pub fn from_surfaces(
        merged: &image::RgbaImage,
        ink: &image::RgbaImage,
        mask: Option<&image::RgbaImage>,
    ) -> Result<Self, ApiError> {
        let encode = |img| crate::io::to_data_url(img).map_err(|e| ApiError::Payload(e.to_string()));
        Ok(Self {
            merged_image: encode(merged)?,
            drawing_image: encode(ink)?,
            mask_image: mask.map(encode).transpose()?,
        })
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    filename: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct CreditsResponse {
    credits: i64,
}

/// Blocking client bound to one server base URL.  Cloning shares the
/// underlying agent, so clones are cheap to hand to worker threads.
#[derive(Clone)]
pub struct ApiClient {
    agent: Agent,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        Self {
            agent: config.new_agent(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Upload raw image bytes as multipart form data.  Returns the filename
    /// the server stored the image under.
    pub fn upload_image(&self, filename: &str, bytes: &[u8]) -> Result<String, ApiError> {
        let (body, content_type) = multipart_file("file", filename, bytes);
        let mut resp = self
            .agent
            .post(&self.endpoint("/upload"))
            .header("Content-Type", &content_type)
            .send(&body[..])?;

        let parsed: UploadResponse = resp
            .body_mut()
            .read_json()
            .map_err(|e| ApiError::Payload(e.to_string()))?;

        match (parsed.filename, parsed.error) {
            (Some(name), _) => Ok(name),
            (None, Some(error)) => Err(ApiError::Server(error)),
            (None, None) => Err(ApiError::Payload("neither filename nor error".into())),
        }
    }

    /// Fetch a previously uploaded image from the server's static path.
    /// The read is capped at `max_bytes`, mirroring the local load limit.
    pub fn fetch_image(&self, filename: &str, max_bytes: u64) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{}{}", self.base_url, SERVER_IMAGE_PREFIX, filename);
        let mut resp = self.agent.get(&url).call()?;
        resp.body_mut()
            .with_config()
            .limit(max_bytes)
            .read_to_vec()
            .map_err(|e| ApiError::Http(e.to_string()))
    }

    /// Submit the annotation payloads.  Any 2xx means accepted.
    pub fn save_annotation(&self, payload: &SavePayload) -> Result<(), ApiError> {
        self.agent
            .post(&self.endpoint("/save"))
            .send_json(payload)?;
        Ok(())
    }

    /// Query the remaining credits for the configured API key.
    pub fn fetch_credits(&self) -> Result<i64, ApiError> {
        let key = self.api_key.as_deref().ok_or(ApiError::MissingApiKey)?;
        let mut resp = self
            .agent
            .post(&self.endpoint("/get_credits"))
            .header("Authorization", &format!("Bearer {}", key))
            .send_json(&serde_json::json!({}))?;

        let parsed: CreditsResponse = resp
            .body_mut()
            .read_json()
            .map_err(|e| ApiError::Payload(e.to_string()))?;
        Ok(parsed.credits)
    }
}

/// Assemble a single-file `multipart/form-data` body.  Returns the body and
/// the Content-Type header value carrying the boundary.
fn multipart_file(field: &str, filename: &str, bytes: &[u8]) -> (Vec<u8>, String) {
    let boundary = format!("maskpad-{:x}", boundary_stamp());
    let safe_name = filename.replace('"', "_");

    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, safe_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let content_type = format!("multipart/form-data; boundary={}", boundary);
    (body, content_type)
}

fn boundary_stamp() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_carries_field_and_bytes() {
        let payload = b"\x89PNG fake bytes";
        let (body, content_type) = multipart_file("file", "photo.png", payload);
        let text = String::from_utf8_lossy(&body);

        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .expect("content type shape");
        assert!(text.starts_with(&format!("--{}\r\n", boundary)));
        assert!(text.contains("Content-Disposition: form-data; name=\"file\"; filename=\"photo.png\""));
        assert!(body.windows(payload.len()).any(|w| w == payload));
        assert!(text.ends_with(&format!("\r\n--{}--\r\n", boundary)));
    }

    #[test]
    fn multipart_sanitizes_quoted_filenames() {
        let (body, _) = multipart_file("file", "we\"ird.png", b"x");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("filename=\"we_ird.png\""));
    }

    #[test]
    fn save_payload_omits_mask_when_absent() {
        let without = SavePayload {
            merged_image: "data:image/png;base64,AA==".into(),
            drawing_image: "data:image/png;base64,BB==".into(),
            mask_image: None,
        };
        let v = serde_json::to_value(&without).unwrap();
        assert!(v.get("merged_image").is_some());
        assert!(v.get("drawing_image").is_some());
        assert!(v.get("mask_image").is_none());

        let with = SavePayload {
            mask_image: Some("data:image/png;base64,CC==".into()),
            ..without
        };
        let v = serde_json::to_value(&with).unwrap();
        assert_eq!(v["mask_image"], "data:image/png;base64,CC==");
    }

    #[test]
    fn endpoints_join_without_double_slash() {
        let client = ApiClient::new("http://localhost:5000/", None);
        assert_eq!(client.endpoint("/save"), "http://localhost:5000/save");
        let client = ApiClient::new("http://localhost:5000", None);
        assert_eq!(client.endpoint("/upload"), "http://localhost:5000/upload");
    }
}
