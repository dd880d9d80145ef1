/// Hosted generative-language client (Gemini REST API)
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::Settings;
use crate::error::OracleError;

/// Text generation and embedding oracle. Everything model-backed goes through here.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError>;
}

pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    embed_model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<Embedding>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    #[serde(default)]
    values: Vec<f32>,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(settings.oracle_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_key: settings.gemini_api_key.clone(),
            base_url: settings.gemini_base_url.trim_end_matches('/').to_string(),
            model: settings.gemini_model.clone(),
            embed_model: settings.gemini_embed_model.clone(),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<String, OracleError> {
        let key = self.api_key.as_deref().ok_or(OracleError::MissingApiKey)?;
        Ok(format!("{}/models/{}:{}?key={}", self.base_url, model, method, key))
    }

    async fn post(&self, url: String, body: serde_json::Value) -> Result<reqwest::Response, OracleError> {
        let resp = self.http.post(url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout
            } else {
                OracleError::Transport(e)
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                message: message.chars().take(300).collect(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let url = self.endpoint(&self.model, "generateContent")?;
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let resp: GenerateResponse = self.post(url, body).await?.json().await?;
        first_candidate_text(resp).ok_or(OracleError::EmptyResponse)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        let url = self.endpoint(&self.embed_model, "embedContent")?;
        let body = json!({
            "model": format!("models/{}", self.embed_model),
            "content": { "parts": [{ "text": text }] },
        });
        let resp: EmbedResponse = self.post(url, body).await?.json().await?;
        resp.embedding
            .map(|e| e.values)
            .filter(|v| !v.is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}

fn first_candidate_text(resp: GenerateResponse) -> Option<String> {
    resp.candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .find_map(|p| p.text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
