use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, instrument};
use vision_common::{ImageAnalyzer, Result, VisionError};

const ANALYSIS_PROMPT: &str = "Analyze this image professionally.
Provide exactly 3 sections. Use this EXACT format for every section:

### Objects
- First object description
- Second object description

### Colors
- First color description
- Second color description

### Mood
- Description of the overall mood

Important: Start every bullet point with ' - ' on a NEW LINE.
Do not use bolding within the bullet points.";

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 250,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible vision models.
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    config: AnalyzerConfig,
}

impl OpenAiAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisionError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn request_body(&self, image: &[u8], media_type: &str) -> ChatRequest<'_> {
        let data_url = format!("data:{media_type};base64,{}", STANDARD.encode(image));
        ChatRequest {
            model: &self.config.model,
            messages: vec![json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": ANALYSIS_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            })],
            max_tokens: self.config.max_tokens,
        }
    }
}

fn failed(err: impl std::fmt::Display) -> VisionError {
    VisionError::AnalysisFailed(err.to_string())
}

#[async_trait]
impl ImageAnalyzer for OpenAiAnalyzer {
    #[instrument(skip(self, image), fields(bytes = image.len(), model = %self.config.model))]
    async fn analyze(&self, image: &[u8], media_type: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(image, media_type))
            .send()
            .await
            .map_err(failed)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Vision model returned {}: {}", status, body);
            return Err(failed(format!("upstream returned {status}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(failed)?;
        let description = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| failed("upstream returned no description"))?;

        debug!(chars = description.len(), "Received image description");
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_embeds_image() {
        let analyzer = OpenAiAnalyzer::new(AnalyzerConfig::default()).unwrap();
        let body = serde_json::to_value(analyzer.request_body(b"\x89PNG", "image/png")).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 250);
        let content = &body["messages"][0]["content"];
        assert!(content[0]["text"].as_str().unwrap().contains("### Objects"));
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_response_parsing() {
        let raw = serde_json::json!({
            "id": "x",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "### Objects\n - a cat" }
            }]
        });
        let parsed: ChatResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("### Objects\n - a cat")
        );
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_analysis_failure() {
        let analyzer = OpenAiAnalyzer::new(AnalyzerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            ..AnalyzerConfig::default()
        })
        .unwrap();

        let result = analyzer.analyze(b"bytes", "image/jpeg").await;
        assert!(matches!(result, Err(VisionError::AnalysisFailed(_))));
    }
}
