use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::error::{Result, ScrapeError};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ScrapeError::InvalidInput("empty model API key".to_string()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

fn response_text(response: GenerateResponse) -> Option<String> {
    let text = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<String>();
    if text.trim().is_empty() { None } else { Some(text) }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let url = Url::parse(&self.request_url())?;
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| err.without_url())?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Completion(format!(
                "status {}: {}",
                status.as_u16(),
                detail.chars().take(300).collect::<String>()
            )));
        }
        let parsed = response
            .json::<GenerateResponse>()
            .await
            .map_err(|err| err.without_url())?;
        response_text(parsed)
            .ok_or_else(|| ScrapeError::Completion("response carried no text".to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    pub(crate) struct MockCompletion {
        answer: std::result::Result<String, String>,
        pub(crate) prompts: Mutex<Vec<String>>,
    }

    impl MockCompletion {
        pub(crate) fn answering(text: impl Into<String>) -> Self {
            Self {
                answer: Ok(text.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(reason: impl Into<String>) -> Self {
            Self {
                answer: Err(reason.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionService for MockCompletion {
        async fn complete(&self, prompt: &str) -> Result<String> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            self.answer.clone().map_err(ScrapeError::Completion)
        }
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let parsed: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "```json\n[" }, { "text": "]\n```" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .expect("response json");
        assert_eq!(response_text(parsed).as_deref(), Some("```json\n[]\n```"));
    }

    #[test]
    fn empty_response_has_no_text() {
        let parsed: GenerateResponse =
            serde_json::from_value(json!({ "candidates": [] })).expect("response json");
        assert!(response_text(parsed).is_none());
    }

    #[tokio::test]
    async fn transport_error_does_not_reveal_api_key() {
        let client =
            GeminiClient::new("http://127.0.0.1:9", "m", "SECRET-KEY-123", Duration::from_secs(2))
                .expect("client");
        let err = client.complete("prompt").await.expect_err("nothing listens on port 9");
        let message = err.to_string();
        assert!(!message.contains("SECRET-KEY-123"), "{message}");
        assert!(!format!("{err:?}").contains("SECRET-KEY-123"));
    }

    #[test]
    fn client_requires_api_key_and_builds_model_url() {
        assert!(GeminiClient::new("https://api.test", "m", " ", Duration::from_secs(5)).is_err());
        let client = GeminiClient::new("https://api.test/", "gemini-2.0-flash", "k", Duration::from_secs(5))
            .expect("client");
        assert_eq!(
            client.request_url(),
            "https://api.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
