//! Image description capability: images in, one text description out.

use {
    async_trait::async_trait,
    base64::Engine as _,
    keepsake_common::ModelError,
    serde_json::json,
};

use crate::openai_compat::OpenAiCompletionProvider;

const VISION_SYSTEM_PROMPT: &str = "You are an image understanding assistant.";
const VISION_USER_PROMPT: &str = "Describe the content of the image(s).";

#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Describe the given images as a single piece of text.
    async fn describe(&self, images: &[Vec<u8>]) -> Result<String, ModelError>;
}

/// Vision over an OpenAI-compatible chat endpoint: images are inlined as
/// base64 `data:` URLs in a multi-part user message.
pub struct OpenAiVisionProvider {
    completion: OpenAiCompletionProvider,
    model: String,
}

impl OpenAiVisionProvider {
    pub fn new(completion: OpenAiCompletionProvider, model: impl Into<String>) -> Self {
        Self {
            completion,
            model: model.into(),
        }
    }
}

/// Sniff the image format from magic bytes; PNG is the fallback since the
/// data URL only needs a plausible media type for the model to accept it.
fn image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() > 11 && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

fn data_url(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        image_mime(bytes),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[async_trait]
impl VisionProvider for OpenAiVisionProvider {
    async fn describe(&self, images: &[Vec<u8>]) -> Result<String, ModelError> {
        if images.is_empty() {
            return Err(ModelError::Permanent("no images to describe".into()));
        }

        let mut content = vec![json!({"type": "text", "text": VISION_USER_PROMPT})];
        for image in images {
            content.push(json!({
                "type": "image_url",
                "image_url": {"url": data_url(image)},
            }));
        }

        let messages = [
            json!({"role": "system", "content": VISION_SYSTEM_PROMPT}),
            json!({"role": "user", "content": content}),
        ];
        self.completion.complete_messages(&self.model, &messages).await
    }
}
