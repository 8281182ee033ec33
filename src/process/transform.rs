//! Transform processing function and the chat-completions image transformer.
//!
//! [`TransformProcessor`] reads an item's source bytes, hands them to a
//! [`Transformer`], and stores the returned image as `<id>.png`.
//! [`ChatImageTransformer`] implements the transformer against an
//! OpenAI-compatible `/chat/completions` endpoint that answers with an image
//! either inline (base64 data URL) or as a link.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::client::HttpClient;
use super::error::{ProcessError, TransformError};
use super::storage::write_bytes_atomically;
use super::{Artifact, Processor};
use crate::item::WorkItem;

/// Extension of every transformed output.
pub const TRANSFORM_EXTENSION: &str = ".png";

/// Prompt used when no prompt file is given.
pub const DEFAULT_PROMPT: &str = "Image 1 is the source picture and image 2 (if present) is the \
reference character. Replace the main character of image 1 with the reference character, \
keeping its position, scale, pose, expression and lighting. Leave the background, text and \
canvas size of image 1 unchanged. Return only the final image.";

/// Default chat model for image editing.
pub const DEFAULT_MODEL: &str = "gpt-image-1";

/// Characters of the reply kept in error messages.
const EXCERPT_CHARS: usize = 200;

#[allow(clippy::expect_used)]
static DATA_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:image/[A-Za-z0-9.+-]+;base64,([A-Za-z0-9+/=]+)")
        .expect("data URL regex is valid")
});

#[allow(clippy::expect_used)]
static MARKDOWN_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\((https?://[^\s)]+)\)").expect("markdown image regex is valid")
});

#[allow(clippy::expect_used)]
static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"']+"#).expect("bare URL regex is valid")
});

/// External image-to-image transformation.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Transforms `input` image bytes into output image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] if the external call fails or its reply
    /// carries no usable image.
    async fn transform(&self, input: Vec<u8>) -> Result<Vec<u8>, TransformError>;
}

/// Fetches the source, transforms it and stores the result as `<id>.png`.
#[derive(Clone)]
pub struct TransformProcessor {
    client: HttpClient,
    transformer: Arc<dyn Transformer>,
    output_dir: PathBuf,
}

impl std::fmt::Debug for TransformProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformProcessor")
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl TransformProcessor {
    /// Creates a transform processor writing into `output_dir`.
    #[must_use]
    pub fn new(
        client: HttpClient,
        transformer: Arc<dyn Transformer>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            transformer,
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Processor for TransformProcessor {
    fn name(&self) -> &'static str {
        "transform"
    }

    #[instrument(level = "debug", skip(self), fields(id = %item.id()))]
    async fn process(&self, item: &WorkItem) -> Result<Artifact, ProcessError> {
        let body = self.client.read_source(item.source_locator()).await?;
        let output = self.transformer.transform(body.bytes).await?;
        let path = self
            .output_dir
            .join(format!("{}{TRANSFORM_EXTENSION}", item.id()));
        let size_bytes = write_bytes_atomically(&path, &output).await?;
        Ok(Artifact { path, size_bytes })
    }
}

/// Image formats recognized from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// PNG.
    Png,
    /// JPEG.
    Jpeg,
    /// WebP.
    Webp,
    /// GIF.
    Gif,
    /// Anything else.
    Unknown,
}

impl ImageKind {
    /// Sniffs the format from the leading bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Self::Png
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Self::Webp
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Self::Gif
        } else {
            Self::Unknown
        }
    }

    /// MIME type used in data URLs.
    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Unknown => "application/octet-stream",
        }
    }
}

/// Encodes image bytes as a `data:` URL with a sniffed MIME type.
#[must_use]
pub fn data_url(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        ImageKind::sniff(bytes).mime(),
        STANDARD.encode(bytes)
    )
}

/// Where the reply put the generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Base64 data from a `data:image/...` URL.
    Inline(String),
    /// A link to download.
    Remote(String),
}

/// Finds the generated image in a reply: an inline data URL first, then a
/// markdown image link, then any bare URL.
#[must_use]
pub fn extract_image_payload(reply: &str) -> Option<ImagePayload> {
    if let Some(captures) = DATA_URL_RE.captures(reply) {
        return Some(ImagePayload::Inline(captures[1].to_string()));
    }
    if let Some(captures) = MARKDOWN_IMAGE_RE.captures(reply) {
        return Some(ImagePayload::Remote(captures[1].to_string()));
    }
    BARE_URL_RE
        .find(reply)
        .map(|m| m.as_str().trim_end_matches([')', '.', ',', ']', '"', '\'']))
        .filter(|url| !url.is_empty())
        .map(|url| ImagePayload::Remote(url.to_string()))
}

/// Collects the text of `choices[0].message.content`, which may be a string
/// or an array of typed parts.
fn reply_text(response: &Value) -> Option<String> {
    let content = response.pointer("/choices/0/message/content")?;
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let joined: Vec<&str> = parts
                .iter()
                .filter_map(|part| {
                    part.get("text")
                        .and_then(Value::as_str)
                        .or_else(|| part.pointer("/image_url/url").and_then(Value::as_str))
                })
                .collect();
            Some(joined.join("\n"))
        }
        _ => None,
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Transformer backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct ChatImageTransformer {
    http: HttpClient,
    endpoint: String,
    api_key: String,
    model: String,
    prompt: String,
    reference: Option<String>,
}

impl std::fmt::Debug for ChatImageTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatImageTransformer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("has_reference", &self.reference.is_some())
            .finish_non_exhaustive()
    }
}

impl ChatImageTransformer {
    /// Creates a transformer for `{base_url}/chat/completions`.
    #[must_use]
    pub fn new(http: HttpClient, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            reference: None,
        }
    }

    /// Overrides the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the instruction prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Sends `bytes` as a second reference image with every request.
    #[must_use]
    pub fn with_reference_image(mut self, bytes: &[u8]) -> Self {
        self.reference = Some(data_url(bytes));
        self
    }

    /// The full endpoint URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, input: &[u8]) -> Value {
        let mut content = vec![
            json!({ "type": "text", "text": self.prompt }),
            json!({ "type": "image_url", "image_url": { "url": data_url(input) } }),
        ];
        if let Some(reference) = &self.reference {
            content.push(json!({ "type": "image_url", "image_url": { "url": reference } }));
        }
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": content }],
        })
    }
}

#[async_trait]
impl Transformer for ChatImageTransformer {
    #[instrument(level = "debug", skip(self, input), fields(endpoint = %self.endpoint, input_bytes = input.len()))]
    async fn transform(&self, input: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        let body = self.request_body(&input);
        let response = self
            .http
            .inner()
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| TransformError::Request {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransformError::HttpStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| TransformError::InvalidResponse {
                reason: e.to_string(),
            })?;
        let text = reply_text(&reply).ok_or_else(|| TransformError::InvalidResponse {
            reason: "missing choices[0].message.content".to_string(),
        })?;

        match extract_image_payload(&text) {
            Some(ImagePayload::Inline(encoded)) => {
                debug!("reply carried inline image data");
                STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|source| TransformError::InvalidPayload { source })
            }
            Some(ImagePayload::Remote(url)) => {
                debug!(url = %url, "downloading transformed image");
                self.http
                    .fetch_bytes(&url)
                    .await
                    .map(|body| body.bytes)
                    .map_err(|source| TransformError::ResultDownload { source })
            }
            None => Err(TransformError::MissingImage {
                excerpt: excerpt(&text),
            }),
        }
    }
}
