//! Gemini (Google) prompt and edit sources.

use crate::error::{parse_retry_after, sanitize_error_message, FeedError, Result};
use crate::image::ImagePayload;
use crate::source::{EditOutcome, EditSource, PromptSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Nominal number of instructions requested per session.
pub const DEFAULT_PROMPT_COUNT: usize = 20;

/// Gemini text models used to write edit instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiTextModel {
    /// Gemini 2.5 Flash.
    #[default]
    Flash,
    /// Gemini 2.5 Flash-Lite (cheapest).
    FlashLite,
    /// Gemini 2.5 Pro.
    Pro,
}

impl GeminiTextModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flash => "gemini-2.5-flash",
            Self::FlashLite => "gemini-2.5-flash-lite",
            Self::Pro => "gemini-2.5-pro",
        }
    }
}

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "nano-banana-pro-preview",
        }
    }
}

/// Builder for GeminiProvider.
#[derive(Debug, Clone)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    text_model: GeminiTextModel,
    model: GeminiModel,
    prompt_count: usize,
    base_url: String,
    timeout: Option<Duration>,
}

impl Default for GeminiProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            text_model: GeminiTextModel::default(),
            model: GeminiModel::default(),
            prompt_count: DEFAULT_PROMPT_COUNT,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY`, then `API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model that writes edit instructions.
    pub fn text_model(mut self, model: GeminiTextModel) -> Self {
        self.text_model = model;
        self
    }

    /// Sets the image model that performs edits.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Sets how many instructions to ask for (at least 1).
    pub fn prompt_count(mut self, count: usize) -> Self {
        self.prompt_count = count.max(1);
        self
    }

    /// Overrides the API root, e.g. for a proxy.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets a per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                FeedError::Auth("GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        let mut client = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }

        Ok(GeminiProvider {
            client: client.build()?,
            api_key,
            text_model: self.text_model,
            model: self.model,
            prompt_count: self.prompt_count,
            base_url: self.base_url,
        })
    }
}

/// Gemini-backed prompt and edit source.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    text_model: GeminiTextModel,
    model: GeminiModel,
    prompt_count: usize,
    base_url: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    /// The image model used for edits.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    /// The text model used for instructions.
    pub fn text_model(&self) -> GeminiTextModel {
        self.text_model
    }

    async fn generate_content(&self, model: &str, body: &impl Serialize) -> Result<GeminiResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text, &headers));
        }

        let text = response.text().await?;
        decode_response(&text)
    }

    async fn instructions_impl(&self) -> Result<Vec<String>> {
        let start = Instant::now();
        let body = PromptRequest::new(self.prompt_count);
        let response = self
            .generate_content(self.text_model.as_str(), &body)
            .await?;
        let instructions = instructions_from_response(response)?;
        tracing::debug!(
            model = self.text_model.as_str(),
            count = instructions.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "generated edit instructions"
        );
        Ok(instructions)
    }

    async fn edit_impl(&self, source: &ImagePayload, instruction: &str) -> Result<EditOutcome> {
        let start = Instant::now();
        let body = EditRequest::new(source, instruction);
        let response = self.generate_content(self.model.as_str(), &body).await?;
        let outcome = outcome_from_response(response);
        if !outcome.has_image() {
            tracing::warn!(
                model = self.model.as_str(),
                text = outcome.text.as_deref().unwrap_or(""),
                "edit model returned no image"
            );
        }
        tracing::debug!(
            model = self.model.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "edit finished"
        );
        Ok(outcome)
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> FeedError {
        let text = sanitize_error_message(text);
        if status == 402 {
            return FeedError::Billing(
                "Gemini billing issue: enable billing at https://aistudio.google.com".into(),
            );
        }
        if status == 404 {
            return FeedError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            );
        }
        if status == 429 {
            let retry_after = parse_retry_after(headers).map(Duration::from_secs);
            return FeedError::RateLimited { retry_after };
        }
        if status == 401 || status == 403 {
            return FeedError::Auth(text);
        }
        let lower = text.to_lowercase();
        if lower.contains("safety")
            || lower.contains("blocked")
            || lower.contains("content_policy")
            || lower.contains("prohibited")
        {
            return FeedError::ContentBlocked(text);
        }
        FeedError::Api {
            status,
            message: text,
        }
    }

    /// Checks that the key is valid and the edit model is reachable.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(FeedError::Auth("Invalid API key".into())),
            404 => Err(FeedError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            )),
            s if !(200..300).contains(&s) => Err(FeedError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PromptSource for GeminiProvider {
    async fn instructions(&self) -> Result<Vec<String>> {
        self.instructions_impl().await.map_err(|e| match e {
            FeedError::PromptGeneration(_) => e,
            other => FeedError::PromptGeneration(other.to_string()),
        })
    }
}

#[async_trait]
impl EditSource for GeminiProvider {
    async fn edit(&self, source: &ImagePayload, instruction: &str) -> Result<EditOutcome> {
        self.edit_impl(source, instruction).await
    }
}

/// Reads the `{"prompts": [...]}` document out of a JSON-mode response.
/// Parses a successful `generateContent` body.
fn decode_response(body: &str) -> Result<GeminiResponse> {
    Ok(serde_json::from_str(body)?)
}

fn instructions_from_response(response: GeminiResponse) -> Result<Vec<String>> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .concat()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(FeedError::PromptGeneration(
            "empty response from prompt model".into(),
        ));
    }

    let doc: PromptDocument = serde_json::from_str(text.trim()).map_err(|e| {
        FeedError::PromptGeneration(format!("invalid response format from prompt model: {e}"))
    })?;

    let instructions: Vec<String> = doc
        .prompts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    if instructions.is_empty() {
        return Err(FeedError::PromptGeneration(
            "prompt model returned no instructions".into(),
        ));
    }
    Ok(instructions)
}

/// Collapses an edit response into text and image.
///
/// Blocks and safety stops come back as HTTP 200; they become refusals so
/// the feed can show the reason on the item instead of failing the call.
fn outcome_from_response(response: GeminiResponse) -> EditOutcome {
    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            return EditOutcome::refused(
                feedback
                    .block_reason_message
                    .unwrap_or_else(|| format!("Prompt blocked: {}", reason)),
            );
        }
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return EditOutcome::default();
    };

    let mut outcome = EditOutcome::default();
    if let Some(content) = candidate.content {
        for part in content.parts {
            if let Some(text) = part.text {
                outcome.text = Some(text);
            } else if let Some(inline) = part.inline_data {
                outcome.image = Some(ImagePayload::new(inline.data, inline.mime_type));
            }
        }
    }

    if outcome.image.is_none() && outcome.text.is_none() {
        if let Some(reason) = candidate.finish_reason {
            match reason.as_str() {
                "SAFETY"
                | "IMAGE_SAFETY"
                | "IMAGE_PROHIBITED_CONTENT"
                | "IMAGE_RECITATION"
                | "RECITATION"
                | "PROHIBITED_CONTENT"
                | "BLOCKLIST" => {
                    outcome.text = Some(format!(
                        "Content blocked by Gemini safety filter: {}",
                        reason
                    ));
                }
                "IMAGE_OTHER" | "NO_IMAGE" => {
                    outcome.text = Some(format!(
                        "Generation failed: {}. Try a different prompt.",
                        reason
                    ));
                }
                _ => {}
            }
        }
    }

    outcome
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptRequest {
    contents: Vec<GeminiContent>,
    generation_config: PromptConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

impl PromptRequest {
    fn new(count: usize) -> Self {
        let text = format!(
            "Generate {count} short, creative, and varied prompts to wildly edit a user's photo. \
             Phrase every prompt as a command, for example: 'Turn the background into a \
             psychedelic vortex', 'Add a cute cartoon robot waving', 'Make it look like a \
             vintage comic book panel', 'Cover everything in glitter', 'Reimagine this in a \
             vaporwave aesthetic'. Be imaginative and fun."
        );

        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiRequestPart::Text { text }],
            }],
            generation_config: PromptConfig {
                response_mime_type: "application/json",
                response_schema: json!({
                    "type": "OBJECT",
                    "properties": {
                        "prompts": {
                            "type": "ARRAY",
                            "items": {
                                "type": "STRING",
                                "description": "A creative command to edit an image."
                            }
                        }
                    },
                    "required": ["prompts"]
                }),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditRequest {
    contents: Vec<GeminiContent>,
    generation_config: EditConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditConfig {
    response_modalities: Vec<String>,
}

impl EditRequest {
    fn new(source: &ImagePayload, instruction: &str) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiRequestPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type: source.mime_type.clone(),
                            data: source.data.clone(),
                        },
                    },
                    GeminiRequestPart::Text {
                        text: instruction.to_string(),
                    },
                ],
            }],
            generation_config: EditConfig {
                response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct PromptDocument {
    prompts: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GeminiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_model_as_str() {
        assert_eq!(GeminiModel::NanoBanana.as_str(), "gemini-2.5-flash-image");
        assert_eq!(
            GeminiModel::NanoBananaPro.as_str(),
            "nano-banana-pro-preview"
        );
        assert_eq!(GeminiTextModel::default().as_str(), "gemini-2.5-flash");
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let provider = GeminiProviderBuilder::new()
            .api_key("test-key")
            .model(GeminiModel::NanoBananaPro)
            .text_model(GeminiTextModel::FlashLite)
            .prompt_count(0)
            .base_url("http://localhost:8080/v1beta/")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();

        assert_eq!(provider.model(), GeminiModel::NanoBananaPro);
        assert_eq!(provider.text_model(), GeminiTextModel::FlashLite);
        assert_eq!(provider.prompt_count, 1);
        assert_eq!(provider.base_url, "http://localhost:8080/v1beta");
    }

    #[test]
    fn test_prompt_request_shape() {
        let req = PromptRequest::new(20);
        let json = serde_json::to_value(&req).unwrap();

        let text = json["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Generate 20 short"));
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            json["generationConfig"]["responseSchema"]["required"][0],
            "prompts"
        );
    }

    #[test]
    fn test_edit_request_shape() {
        let source = ImagePayload::new("aGVsbG8=", "image/jpeg");
        let req = EditRequest::new(&source, "add a hat");
        let json = serde_json::to_value(&req).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "aGVsbG8=");
        assert_eq!(parts[1]["text"], "add a hat");
        assert_eq!(
            json["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        assert!(json.get("generation_config").is_none());
    }

    #[test]
    fn test_instructions_from_response() {
        let resp = parse(
            r#"{
            "candidates": [{
                "content": {
                    "parts": [{"text": "{\"prompts\": [\"make it blue\", \"  \", \" add a hat \"]}"}]
                },
                "finishReason": "STOP"
            }]
        }"#,
        );
        let instructions = instructions_from_response(resp).unwrap();
        assert_eq!(instructions, vec!["make it blue", "add a hat"]);
    }

    #[test]
    fn test_instructions_bad_format() {
        let resp = parse(r#"{"candidates": [{"content": {"parts": [{"text": "[1, 2]"}]}}]}"#);
        assert!(matches!(
            instructions_from_response(resp),
            Err(FeedError::PromptGeneration(_))
        ));

        let resp = parse(r#"{"candidates": []}"#);
        assert!(matches!(
            instructions_from_response(resp),
            Err(FeedError::PromptGeneration(_))
        ));

        let resp = parse(r#"{"candidates": [{"content": {"parts": [{"text": "{\"prompts\": []}"}]}}]}"#);
        assert!(matches!(
            instructions_from_response(resp),
            Err(FeedError::PromptGeneration(_))
        ));
    }

    #[test]
    fn test_outcome_with_image_and_text() {
        let resp = parse(
            r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here you go"},
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#,
        );
        let outcome = outcome_from_response(resp);
        assert_eq!(outcome.text.as_deref(), Some("Here you go"));
        let image = outcome.image.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "iVBORw0KGgo=");
    }

    #[test]
    fn test_outcome_text_only() {
        let resp = parse(
            r#"{"candidates": [{"content": {"parts": [{"text": "I can't edit that photo."}]}}]}"#,
        );
        let outcome = outcome_from_response(resp);
        assert!(!outcome.has_image());
        assert_eq!(outcome.text.as_deref(), Some("I can't edit that photo."));
    }

    #[test]
    fn test_outcome_prompt_blocked() {
        let resp = parse(
            r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "Prompt was blocked due to safety"
            }
        }"#,
        );
        let outcome = outcome_from_response(resp);
        assert!(!outcome.has_image());
        assert_eq!(
            outcome.text.as_deref(),
            Some("Prompt was blocked due to safety")
        );

        let resp = parse(r#"{"promptFeedback": {"blockReason": "OTHER"}}"#);
        assert_eq!(
            outcome_from_response(resp).text.as_deref(),
            Some("Prompt blocked: OTHER")
        );
    }

    #[test]
    fn test_outcome_safety_finish_reason() {
        let resp = parse(r#"{"candidates": [{"finishReason": "IMAGE_SAFETY"}]}"#);
        let outcome = outcome_from_response(resp);
        assert!(!outcome.has_image());
        assert_eq!(
            outcome.text.as_deref(),
            Some("Content blocked by Gemini safety filter: IMAGE_SAFETY")
        );
    }

    #[test]
    fn test_outcome_no_candidates() {
        let outcome = outcome_from_response(parse(r#"{"candidates": []}"#));
        assert_eq!(outcome, EditOutcome::default());

        let outcome = outcome_from_response(parse("{}"));
        assert!(!outcome.has_image());
        assert!(outcome.text.is_none());
    }

    #[test]
    fn test_decode_response_errors_are_json() {
        let resp = decode_response(r#"{"candidates": []}"#).unwrap();
        assert!(resp.candidates.is_empty());

        let err = decode_response("<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, FeedError::Json(_)));
        assert!(err.to_string().starts_with("JSON error:"));

        let err = decode_response(r#"{"candidates": "nope"}"#).unwrap_err();
        assert!(matches!(err, FeedError::Json(_)));
    }

    #[test]
    fn test_outcome_empty_candidate() {
        let resp = parse(r#"{"candidates": [{"content": {"parts": [{}]}}]}"#);
        let outcome = outcome_from_response(resp);
        assert_eq!(outcome, EditOutcome::default());
    }

    #[test]
    fn test_parse_error_mapping() {
        let provider = GeminiProvider::builder().api_key("k").build().unwrap();
        let headers = reqwest::header::HeaderMap::new();

        assert!(matches!(
            provider.parse_error(401, "bad key", &headers),
            FeedError::Auth(_)
        ));
        assert!(matches!(
            provider.parse_error(402, "", &headers),
            FeedError::Billing(_)
        ));
        assert!(matches!(
            provider.parse_error(429, "", &headers),
            FeedError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            provider.parse_error(400, "request blocked by policy", &headers),
            FeedError::ContentBlocked(_)
        ));
        assert!(matches!(
            provider.parse_error(500, "internal", &headers),
            FeedError::Api { status: 500, .. }
        ));
    }
}
