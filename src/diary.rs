use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{CatMoodError, Result};

/// Inputs to the diary-line prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiaryPrompt {
    pub mood: String,
    pub time_of_day: String,
    pub personality: String,
}

impl DiaryPrompt {
    pub fn new(
        mood: impl Into<String>,
        time_of_day: impl Into<String>,
        personality: impl Into<String>,
    ) -> Self {
        Self {
            mood: mood.into(),
            time_of_day: time_of_day.into(),
            personality: personality.into(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "你是个会模仿猫咪说话的软萌作家。已知猫咪正在“{}”，是在“{}”，是个“{}”的猫。请写一句今日日记风格的话，不超过50字，软萌、自然、能打动人。",
            self.mood, self.time_of_day, self.personality
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    result: Option<String>,
    error: Option<String>,
}

/// Client for a text-generation endpoint that turns a prompt into one diary line.
#[derive(Debug, Clone)]
pub struct DiaryClient {
    endpoint: String,
    client: reqwest::Client,
}

impl DiaryClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn generate(&self, prompt: &DiaryPrompt) -> Result<String> {
        let rendered = prompt.render();
        debug!(endpoint = %self.endpoint, mood = %prompt.mood, "requesting diary line");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest { prompt: &rendered })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CatMoodError::Fetch {
                url: self.endpoint.clone(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body: GenerateResponse = response.json().await?;
        match (body.result, body.error) {
            (_, Some(error)) => Err(CatMoodError::Fetch {
                url: self.endpoint.clone(),
                reason: error,
            }),
            (Some(text), None) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(CatMoodError::Fetch {
                url: self.endpoint.clone(),
                reason: "empty diary response".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_all_fields() {
        let prompt = DiaryPrompt::new("Joy", "傍晚", "黏人");
        let text = prompt.render();
        assert!(text.contains("猫咪正在“Joy”"));
        assert!(text.contains("是在“傍晚”"));
        assert!(text.contains("是个“黏人”的猫"));
        assert!(text.contains("不超过50字"));
    }

    #[test]
    fn test_response_shape() {
        let ok: GenerateResponse = serde_json::from_str(r#"{"result": "喵～"}"#).unwrap();
        assert_eq!(ok.result.as_deref(), Some("喵～"));
        assert!(ok.error.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fetch_error() {
        let client = DiaryClient::new("http://127.0.0.1:9/api/generate");
        let result = client.generate(&DiaryPrompt::new("Joy", "早上", "好奇")).await;
        assert!(matches!(result, Err(CatMoodError::Fetch { .. })));
    }
}
