use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::work_item::{Classification, Description, DescriptionMeta};
use crate::services::vision::{ServiceError, VisionService};

const API_BASE: &str = "https://api.cloudflare.com/client/v4";
const MAX_LABELS: usize = 10;

/// Client for Cloudflare Workers AI: a LLaVA vision model for classification
/// and an instruct text model for listing blurbs.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
    classify_model: String,
    describe_model: String,
    allow_local_files: bool,
}

#[derive(Serialize)]
struct LlavaRequest {
    /// Base64-encoded image bytes.
    image: String,
    prompt: &'static str,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct LlavaResult {
    description: String,
}

#[derive(Deserialize)]
struct ChatResult {
    response: String,
}

/// Classification as the model writes it, before normalization.
#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    category: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct RawDescription {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    blurb: String,
}

const CLASSIFY_PROMPT: &str = concat!(
    "You are cataloguing a photo for a second-hand marketplace listing. ",
    "Return ONLY valid JSON with these exact fields: ",
    "category (a single marketplace category such as Furniture, Electronics, Clothing), ",
    "confidence (a number between 0 and 1), ",
    "labels (up to 10 short descriptive tags: material, colour, brand, condition)."
);

const DESCRIBE_SYSTEM_PROMPT: &str = concat!(
    "You write short, honest marketplace listing descriptions. ",
    "Return ONLY valid JSON with fields title (max 60 characters) ",
    "and blurb (2-3 sentences, no prices, no contact details)."
);

impl WorkersAiClient {
    pub fn new(
        account_id: &str,
        api_token: &str,
        classify_model: &str,
        describe_model: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            classify_model: classify_model.to_string(),
            describe_model: describe_model.to_string(),
            allow_local_files: false,
        })
    }

    /// Also accept `file://` and plain filesystem paths as image references.
    /// Only for trusted, local callers such as the batch CLI.
    pub fn with_local_files(mut self) -> Self {
        self.allow_local_files = true;
        self
    }

    /// Load image bytes behind a reference: `http(s)://`, inline `data:` URI,
    /// or (when enabled) a local `file://`/plain path.
    async fn load_image(&self, image_uri: &str) -> Result<Vec<u8>, ServiceError> {
        let bytes = if image_uri.starts_with("http://") || image_uri.starts_with("https://") {
            let response = self.http.get(image_uri).send().await?.error_for_status()?;
            response.bytes().await?.to_vec()
        } else if image_uri.starts_with("data:") {
            decode_data_uri(image_uri)?
        } else if self.allow_local_files {
            let path = image_uri.strip_prefix("file://").unwrap_or(image_uri);
            tokio::fs::read(path).await.map_err(|e| {
                tracing::debug!(path, error = %e, "Local image read failed");
                ServiceError::server(format!("failed to read local image: {path}"))
            })?
        } else {
            return Err(ServiceError::server(
                "unsupported image reference: expected an http(s) URL or data URI",
            ));
        };

        image::guess_format(&bytes)
            .map_err(|_| ServiceError::server(format!("unsupported image format: {image_uri}")))?;
        Ok(bytes)
    }

    async fn run_model<B, T>(&self, model: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/accounts/{}/ai/run/{}", API_BASE, self.account_id, model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Server {
                status: Some(status.as_u16()),
                message: format!("{model} returned {status}: {}", truncate(&body, 200)),
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl VisionService for WorkersAiClient {
    async fn classify(&self, image_uri: &str) -> Result<Classification, ServiceError> {
        let image = self.load_image(image_uri).await?;

        let request = LlavaRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image),
            prompt: CLASSIFY_PROMPT,
            max_tokens: 256,
        };
        let result: LlavaResult = self.run_model(&self.classify_model, &request).await?;
        parse_classification(&result.description)
    }

    async fn describe(
        &self,
        category: &str,
        labels: &[String],
    ) -> Result<Description, ServiceError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: DESCRIBE_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Category: {}\nTags: {}", category, labels.join(", ")),
                },
            ],
            max_tokens: 256,
        };
        let result: ChatResult = self.run_model(&self.describe_model, &request).await?;
        parse_description(&result.response, &self.describe_model)
    }
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ServiceError> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| ServiceError::server("malformed data URI"))?;
    if !header.ends_with(";base64") {
        return Err(ServiceError::server("data URI must be base64-encoded"));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ServiceError::server(format!("invalid base64 image data: {e}")))
}

/// Models often wrap JSON in prose or code fences; take the outermost object.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn parse_classification(text: &str) -> Result<Classification, ServiceError> {
    let json = extract_json(text)
        .ok_or_else(|| ServiceError::server("classifier returned no JSON object"))?;
    let raw: RawClassification = serde_json::from_str(json)
        .map_err(|e| ServiceError::server(format!("unparseable classification: {e}")))?;

    let category = raw.category.trim().to_string();
    if category.is_empty() {
        return Err(ServiceError::server("classifier returned no category"));
    }

    let mut labels: Vec<String> = Vec::new();
    for label in raw.labels {
        let label = label.trim().to_lowercase();
        if !label.is_empty() && !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels.truncate(MAX_LABELS);

    Ok(Classification {
        category,
        confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        labels,
    })
}

fn parse_description(text: &str, model: &str) -> Result<Description, ServiceError> {
    let parsed = extract_json(text).and_then(|j| serde_json::from_str::<RawDescription>(j).ok());
    let (title, blurb) = match parsed {
        Some(raw) => (raw.title, raw.blurb),
        // Plain prose is still a usable blurb.
        None => (None, text.to_string()),
    };

    let blurb = blurb.trim().to_string();
    if blurb.is_empty() {
        return Err(ServiceError::server("describer returned an empty blurb"));
    }

    Ok(Description {
        blurb,
        meta: DescriptionMeta {
            model: model.to_string(),
            suggested_title: title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            generated_at: Utc::now(),
        },
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
