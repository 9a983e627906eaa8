//! OpenAI-compatible chat completions (`/v1/chat/completions`).
//!
//! Works against any endpoint speaking the OpenAI chat schema (OpenAI,
//! Moonshot, DeepSeek, Zhipu, local gateways). One bounded retry loop with a
//! fixed delay wraps every request; the caller sees a single tagged result.

use async_trait::async_trait;
use {
    keepsake_common::{ModelError, RetryPolicy, endpoint::api_endpoint, retry_fixed},
    secrecy::ExposeSecret,
    serde_json::json,
};

use crate::{completion::CompletionProvider, transport::classify_transport};

pub struct OpenAiCompletionProvider {
    client: reqwest::Client,
    api_key: secrecy::Secret<String>,
    base_url: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAiCompletionProvider {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: secrecy::Secret::new(api_key),
            base_url: "https://api.openai.com".to_string(),
            model: model.into(),
            temperature: 0.95,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send a raw message array. Message values must already follow the
    /// OpenAI chat schema; the vision provider uses this for multi-part
    /// image content.
    pub async fn complete_messages(
        &self,
        model: &str,
        messages: &[serde_json::Value],
    ) -> Result<String, ModelError> {
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
        });
        retry_fixed(self.retry, || self.request_completion(&body)).await
    }

    async fn request_completion(&self, body: &serde_json::Value) -> Result<String, ModelError> {
        let resp = self
            .client
            .post(api_endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), text));
        }

        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ModelError::Permanent(format!("malformed completion response: {e}")))?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ModelError::Permanent("completion response without content".into()))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> Result<String, ModelError> {
        let messages = [
            json!({"role": "system", "content": system_prompt}),
            json!({"role": "user", "content": user_prompt}),
        ];
        self.complete_messages(model, &messages).await
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
