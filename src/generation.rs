use crate::client::ServiceClient;
use crate::config::ServiceConfig;
use crate::corpus::read_image;
use crate::error::{AppError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const JURASSIC_ULTRA: &str = "ai21.j2-ultra-v1";
pub const TITAN_TEXT_PREMIER: &str = "amazon.titan-text-premier-v1:0";
pub const CLAUDE_3_SONNET: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Request/response layout of a hosted model family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// AI21 Jurassic-2 completions
    Jurassic,
    /// Amazon Titan text
    Titan,
    /// Anthropic messages API (accepts images)
    ClaudeMessages,
    /// Anthropic legacy text completions
    ClaudeCompletion,
}

/// Cross-region inference profile prefixes, e.g. `us.anthropic.claude-3-...`
const PROFILE_PREFIXES: [&str; 5] = ["us", "eu", "apac", "us-gov", "global"];

impl ModelFamily {
    /// Guess the family from a model or inference profile identifier
    pub fn from_model_id(model_id: &str) -> Option<Self> {
        let base = match model_id.split_once('.') {
            Some((prefix, rest)) if PROFILE_PREFIXES.contains(&prefix) => rest,
            _ => model_id,
        };

        if base.starts_with("ai21.") {
            Some(ModelFamily::Jurassic)
        } else if base.starts_with("amazon.titan-text") || base.starts_with("amazon.titan-tg1") {
            Some(ModelFamily::Titan)
        } else if let Some(claude) = base.strip_prefix("anthropic.claude-") {
            // Only the pre-3 generation speaks the text completions API
            if claude.starts_with("v1") || claude.starts_with("v2") || claude.starts_with("instant") {
                Some(ModelFamily::ClaudeCompletion)
            } else {
                Some(ModelFamily::ClaudeMessages)
            }
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Jurassic => "jurassic",
            ModelFamily::Titan => "titan",
            ModelFamily::ClaudeMessages => "claude-messages",
            ModelFamily::ClaudeCompletion => "claude-completion",
        }
    }

    pub fn supports_images(&self) -> bool {
        matches!(self, ModelFamily::ClaudeMessages)
    }

    pub fn normalizer(&self) -> &'static dyn ResponseNormalizer {
        match self {
            ModelFamily::Jurassic => &JurassicNormalizer,
            ModelFamily::Titan => &TitanNormalizer,
            ModelFamily::ClaudeMessages => &ClaudeMessagesNormalizer,
            ModelFamily::ClaudeCompletion => &ClaudeCompletionNormalizer,
        }
    }

    /// Build the request body for this family
    pub fn request_body(&self, prompt: &Prompt, config: &GenerationConfig) -> Result<Value> {
        let body = match self {
            ModelFamily::Jurassic => {
                let text = prompt.flattened();
                serde_json::to_value(JurassicRequest {
                    prompt: &text,
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                    top_p: config.top_p,
                    stop_sequences: &config.stop_sequences,
                    count_penalty: Penalty {
                        scale: config.count_penalty,
                    },
                    presence_penalty: Penalty {
                        scale: config.presence_penalty,
                    },
                    frequency_penalty: Penalty {
                        scale: config.frequency_penalty,
                    },
                })
            }
            ModelFamily::Titan => {
                let text = prompt.flattened();
                serde_json::to_value(TitanRequest {
                    input_text: &text,
                    text_generation_config: TitanGenerationConfig {
                        max_token_count: config.max_tokens,
                        stop_sequences: &config.stop_sequences,
                        temperature: config.temperature,
                        top_p: config.top_p,
                    },
                })
            }
            ModelFamily::ClaudeMessages => {
                let mut content: Vec<ClaudeContent<'_>> = prompt
                    .images
                    .iter()
                    .map(|image| ClaudeContent::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: &image.media_type,
                            data: STANDARD.encode(&image.data),
                        },
                    })
                    .collect();
                content.push(ClaudeContent::Text { text: &prompt.text });

                serde_json::to_value(ClaudeMessagesRequest {
                    anthropic_version: ANTHROPIC_VERSION,
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                    top_p: config.top_p,
                    stop_sequences: &config.stop_sequences,
                    system: prompt.system.as_deref(),
                    messages: vec![ClaudeMessage {
                        role: "user",
                        content,
                    }],
                })
            }
            ModelFamily::ClaudeCompletion => {
                let text = format!("\n\nHuman: {}\n\nAssistant:", prompt.flattened());
                serde_json::to_value(ClaudeCompletionRequest {
                    prompt: &text,
                    max_tokens_to_sample: config.max_tokens,
                    temperature: config.temperature,
                    top_p: config.top_p,
                    stop_sequences: &config.stop_sequences,
                })
            }
        };

        body.map_err(|e| AppError::service("generate", format!("failed to encode request: {e}")))
    }
}

/// Pulls the generated text out of a family-specific response body
pub trait ResponseNormalizer: Send + Sync {
    fn extract_text(&self, raw: &Value) -> Result<String>;
}

fn parse_as<T: for<'de> Deserialize<'de>>(raw: &Value, shape: &str) -> Result<T> {
    serde_json::from_value(raw.clone())
        .map_err(|e| AppError::malformed("generate", format!("expected {shape}: {e}")))
}

/// `completions[0].data.text`
pub struct JurassicNormalizer;

impl ResponseNormalizer for JurassicNormalizer {
    fn extract_text(&self, raw: &Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Response {
            completions: Vec<Completion>,
        }
        #[derive(Deserialize)]
        struct Completion {
            data: CompletionData,
        }
        #[derive(Deserialize)]
        struct CompletionData {
            text: String,
        }

        let response: Response = parse_as(raw, "a `completions` list")?;
        response
            .completions
            .into_iter()
            .next()
            .map(|c| c.data.text)
            .ok_or_else(|| AppError::malformed("generate", "`completions` is empty"))
    }
}

/// `results[0].outputText`
pub struct TitanNormalizer;

impl ResponseNormalizer for TitanNormalizer {
    fn extract_text(&self, raw: &Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Response {
            results: Vec<TitanResult>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TitanResult {
            output_text: String,
        }

        let response: Response = parse_as(raw, "a `results` list")?;
        response
            .results
            .into_iter()
            .next()
            .map(|r| r.output_text)
            .ok_or_else(|| AppError::malformed("generate", "`results` is empty"))
    }
}

/// Every `text` block of `content`, joined
pub struct ClaudeMessagesNormalizer;

impl ResponseNormalizer for ClaudeMessagesNormalizer {
    fn extract_text(&self, raw: &Value) -> Result<String> {
        #[derive(Deserialize)]
        struct Response {
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: Option<String>,
        }

        let response: Response = parse_as(raw, "a `content` list")?;
        let texts: Vec<String> = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        if texts.is_empty() {
            return Err(AppError::malformed(
                "generate",
                "`content` has no text blocks",
            ));
        }
        Ok(texts.join(""))
    }
}

/// Top-level `completion`
pub struct ClaudeCompletionNormalizer;

impl ResponseNormalizer for ClaudeCompletionNormalizer {
    fn extract_text(&self, raw: &Value) -> Result<String> {
        raw.get("completion")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::malformed("generate", "missing `completion` string"))
    }
}

/// An image sent alongside the prompt text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl ImageAttachment {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (data, media_type) = read_image(path)?;
        Ok(ImageAttachment { media_type, data })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub system: Option<String>,
    pub images: Vec<ImageAttachment>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Prompt {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    /// System text folded in front of the prompt for families without a
    /// dedicated system field
    fn flattened(&self) -> String {
        match &self.system {
            Some(system) => format!("{}\n\n{}", system, self.text),
            None => self.text.clone(),
        }
    }
}

/// Sampling parameters passed through to the model
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop_sequences: Vec<String>,
    pub count_penalty: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig::analysis()
    }
}

impl GenerationConfig {
    /// Deterministic settings used for log, invoice and sentiment analysis
    pub fn analysis() -> Self {
        GenerationConfig {
            max_tokens: 1024,
            temperature: 0.0,
            top_p: 0.5,
            stop_sequences: Vec::new(),
            count_penalty: 0.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }

    /// Short summaries of structured service output
    pub fn summary() -> Self {
        GenerationConfig {
            max_tokens: 512,
            top_p: 0.9,
            ..GenerationConfig::analysis()
        }
    }

    /// Free-form image descriptions
    pub fn description() -> Self {
        GenerationConfig {
            max_tokens: 1000,
            temperature: 0.5,
            top_p: 0.9,
            ..GenerationConfig::analysis()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_OUTPUT_TOKENS).contains(&self.max_tokens) {
            return Err(AppError::invalid_config(
                "max_tokens",
                format!("must be between 1 and {MAX_OUTPUT_TOKENS}, got {}", self.max_tokens),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(AppError::invalid_config(
                "temperature",
                format!("must be between 0 and 1, got {}", self.temperature),
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(AppError::invalid_config(
                "top_p",
                format!("must be between 0 and 1, got {}", self.top_p),
            ));
        }
        if self.stop_sequences.iter().any(|s| s.is_empty()) {
            return Err(AppError::invalid_config(
                "stop_sequences",
                "stop sequences must not be empty strings",
            ));
        }
        for (field, value) in [
            ("count_penalty", self.count_penalty),
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::invalid_config(
                    field,
                    format!("must be a non-negative number, got {}", value),
                ));
            }
        }
        Ok(())
    }
}

/// Maps a prompt to generated text
#[allow(async_fn_in_trait)]
pub trait Generator {
    async fn generate(&self, prompt: &Prompt, config: &GenerationConfig) -> Result<String>;
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        [
            ModelFamily::Jurassic,
            ModelFamily::Titan,
            ModelFamily::ClaudeMessages,
            ModelFamily::ClaudeCompletion,
        ]
        .into_iter()
        .find(|family| family.name() == value.trim().to_ascii_lowercase())
        .ok_or_else(|| {
            AppError::invalid_config(
                "family",
                format!(
                    "unknown model family '{}' (expected jurassic, titan, claude-messages or claude-completion)",
                    value
                ),
            )
        })
    }
}

/// Client for a hosted text generation model
#[derive(Clone)]
pub struct BedrockGenerator {
    client: ServiceClient,
    model_id: String,
    family: ModelFamily,
}

impl BedrockGenerator {
    pub fn new(config: ServiceConfig, model_id: impl Into<String>, family: ModelFamily) -> Result<Self> {
        Ok(BedrockGenerator {
            client: ServiceClient::new(config)?,
            model_id: model_id.into(),
            family,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }
}

impl Generator for BedrockGenerator {
    async fn generate(&self, prompt: &Prompt, config: &GenerationConfig) -> Result<String> {
        config.validate()?;
        if prompt.text.trim().is_empty() && prompt.images.is_empty() {
            return Err(AppError::input("prompt is empty"));
        }
        if !prompt.images.is_empty() && !self.family.supports_images() {
            return Err(AppError::invalid_config(
                "images",
                format!("{:?} models do not accept image attachments", self.family),
            ));
        }

        let body = self.family.request_body(prompt, config)?;
        debug!(
            "Generating with {} ({:?}), {} image(s)",
            self.model_id,
            self.family,
            prompt.images.len()
        );

        let response = self
            .client
            .invoke_model(&self.model_id, &body, "generate")
            .await?;

        self.family.normalizer().extract_text(&response)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JurassicRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stop_sequences: &'a [String],
    count_penalty: Penalty,
    presence_penalty: Penalty,
    frequency_penalty: Penalty,
}

#[derive(Serialize)]
struct Penalty {
    scale: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanRequest<'a> {
    input_text: &'a str,
    text_generation_config: TitanGenerationConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanGenerationConfig<'a> {
    max_token_count: u32,
    stop_sequences: &'a [String],
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct ClaudeMessagesRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: Vec<ClaudeContent<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContent<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Serialize)]
struct ClaudeCompletionRequest<'a> {
    prompt: &'a str,
    max_tokens_to_sample: u32,
    temperature: f32,
    top_p: f32,
    stop_sequences: &'a [String],
}
