// src/llm_client.rs
//
// Async HTTP client for the vision model's generateContent endpoint.
//
// Each call sends one text prompt plus one inline JPEG and returns the
// concatenated text of the first candidate together with the token counts
// the server reports. Prompt wording and answer parsing live in the
// detector / verifier modules.

use crate::config::{read_secret, ModelConfig};
use crate::error::ClientError;
use crate::usage::{ModelReply, TokenUsage};

use base64::Engine;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-encoded image bytes
    pub data: String,
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<ResponseCandidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCandidate {
    pub content: Option<ResponseContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}

impl GenerateContentResponse {
    /// Text of the first candidate plus reported usage.
    pub fn into_reply(self) -> Result<ModelReply<String>, ClientError> {
        let usage = self
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Decode("response has no candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ClientError::Decode(format!(
                "empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(ModelReply::new(text, usage))
    }
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct VisionModelClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    jpeg_quality: u8,
}

impl VisionModelClient {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            api_key,
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Build a client with the key taken from the configured env variables.
    pub fn from_env(config: &ModelConfig) -> Result<Self, ClientError> {
        let api_key = read_secret(&config.api_key_envs)
            .ok_or_else(|| ClientError::MissingCredential(config.api_key_envs.join(" or ")))?;
        Self::new(config, api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `prompt` with `image` and return the model's text answer.
    pub async fn generate(
        &self,
        prompt: &str,
        image: &RgbImage,
    ) -> Result<ModelReply<String>, ClientError> {
        let jpeg = encode_jpeg(image, self.jpeg_quality)?;
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Text {
                        text: prompt.to_string(),
                    },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(&jpeg),
                        },
                    },
                ],
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(
            "🤖 generateContent {} ({}x{}, {} KB jpeg)",
            self.model,
            image.width(),
            image.height(),
            jpeg.len() / 1024
        );

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("🤖 Model server error {}: {}", status, body);
            return Err(ClientError::Status { status, body });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed.into_reply()
    }
}

// ============================================================================
// JPEG ENCODING HELPER
// ============================================================================

/// Encode an RGB raster as JPEG for inline upload.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ClientError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    image.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_in_api_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Text {
                        text: "find pools".to_string(),
                    },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: "AAAA".to_string(),
                        },
                    },
                ],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "find pools");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "AAAA");
    }

    #[test]
    fn test_response_text_and_usage() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "[{\"box_2d\": "}, {"text": "[1,2,3,4]}]"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 1290, "candidatesTokenCount": 31, "totalTokenCount": 1321}
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(body).unwrap();
        let reply = resp.into_reply().unwrap();
        assert_eq!(reply.value, r#"[{"box_2d": [1,2,3,4]}]"#);
        assert_eq!(reply.usage, TokenUsage::new(1290, 31));
    }

    #[test]
    fn test_response_without_candidates_is_error() {
        let resp: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(matches!(resp.into_reply(), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([20, 120, 220]));
        let bytes = encode_jpeg(&img, 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
