use crate::client::ServiceClient;
use crate::config::ServiceConfig;
use crate::error::{AppError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TITAN_TEXT_EMBEDDINGS: &str = "amazon.titan-embed-text-v1";
pub const TITAN_MULTIMODAL_EMBEDDINGS: &str = "amazon.titan-embed-image-v1";

/// Longest text input the Titan text embedding model accepts, in tokens
pub const MAX_INPUT_TOKENS: usize = 8192;

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// What to embed: text, image bytes, or both fused into one vector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingInput {
    pub text: Option<String>,
    pub image: Option<Vec<u8>>,
}

impl EmbeddingInput {
    pub fn text(text: impl Into<String>) -> Self {
        EmbeddingInput {
            text: Some(text.into()),
            image: None,
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        EmbeddingInput {
            text: None,
            image: Some(bytes),
        }
    }

    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    /// Reject inputs that carry nothing to embed
    pub fn validate(&self) -> Result<()> {
        if let Some(text) = &self.text {
            if text.trim().is_empty() {
                return Err(AppError::input("query text is empty"));
            }
        }
        if let Some(image) = &self.image {
            if image.is_empty() {
                return Err(AppError::input("image is empty"));
            }
        }
        if self.text.is_none() && self.image.is_none() {
            return Err(AppError::input("nothing to embed: provide text, an image, or both"));
        }
        Ok(())
    }
}

/// Maps text and images to dense vectors
#[allow(async_fn_in_trait)]
pub trait Embedder {
    async fn embed(&self, input: &EmbeddingInput) -> Result<Embedding>;

    /// Embed several inputs one after another
    async fn embed_all(&self, inputs: &[EmbeddingInput]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            embeddings.push(self.embed(input).await?);
            if (i + 1) % 10 == 0 {
                info!("Embedded {}/{} items", i + 1, inputs.len());
            }
        }
        Ok(embeddings)
    }
}

/// Embedder backed by a hosted embedding model
#[derive(Clone)]
pub struct BedrockEmbedder {
    client: ServiceClient,
    model_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    input_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_image: Option<String>,
}

impl BedrockEmbedder {
    /// Create a new embedder for the given model
    pub fn new(config: ServiceConfig, model_id: impl Into<String>) -> Result<Self> {
        Ok(BedrockEmbedder {
            client: ServiceClient::new(config)?,
            model_id: model_id.into(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl Embedder for BedrockEmbedder {
    async fn embed(&self, input: &EmbeddingInput) -> Result<Embedding> {
        const OPERATION: &str = "embed";
        input.validate()?;

        let request = EmbeddingRequest {
            input_text: input.text.as_deref(),
            input_image: input.image.as_ref().map(|bytes| STANDARD.encode(bytes)),
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| AppError::service(OPERATION, format!("failed to encode request: {e}")))?;

        let response = self
            .client
            .invoke_model(&self.model_id, &body, OPERATION)
            .await?;

        let embedding = parse_embedding(&response)?;
        debug!(
            "Generated embedding with {} dimensions using {}",
            embedding.dimension(),
            self.model_id
        );
        Ok(embedding)
    }
}

fn parse_embedding(response: &Value) -> Result<Embedding> {
    const OPERATION: &str = "embed";

    let field = response
        .get("embedding")
        .ok_or_else(|| AppError::malformed(OPERATION, "missing `embedding` field"))?;

    let values: Vec<f32> = serde_json::from_value(field.clone()).map_err(|e| {
        AppError::malformed(OPERATION, format!("`embedding` is not a list of numbers: {e}"))
    })?;

    if values.is_empty() {
        return Err(AppError::malformed(OPERATION, "`embedding` is empty"));
    }

    Ok(Embedding { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_only_present_fields() {
        let request = EmbeddingRequest {
            input_text: Some("red shoes"),
            input_image: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"inputText": "red shoes"})
        );

        let request = EmbeddingRequest {
            input_text: Some("red shoes"),
            input_image: Some(STANDARD.encode([1u8, 2, 3])),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"inputText": "red shoes", "inputImage": "AQID"})
        );
    }

    #[test]
    fn test_parse_embedding() {
        let embedding = parse_embedding(&json!({"embedding": [0.5, -1.0, 2.0]})).unwrap();
        assert_eq!(embedding.values, vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_parse_embedding_missing_field() {
        let err = parse_embedding(&json!({"inputTextTokenCount": 3})).unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse { .. }));
    }

    #[test]
    fn test_parse_embedding_wrong_shape() {
        assert!(parse_embedding(&json!({"embedding": "nope"})).is_err());
        assert!(parse_embedding(&json!({"embedding": []})).is_err());
    }

    #[test]
    fn test_input_validation() {
        assert!(EmbeddingInput::text("disk space issue").validate().is_ok());
        assert!(EmbeddingInput::text("   ").validate().is_err());
        assert!(EmbeddingInput::image(Vec::new()).validate().is_err());
        assert!(EmbeddingInput::default().validate().is_err());
        assert!(EmbeddingInput::text("cat")
            .with_image(vec![1, 2])
            .validate()
            .is_ok());
    }
}
