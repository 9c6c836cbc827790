//! Vision-model interaction: send the map image with the extraction prompt.
//!
//! [`VisionModel`] is the capability the Extractor depends on, so tests can
//! substitute a canned reply. [`LlmVisionModel`] adapts any
//! `edgequake-llm` provider to it.
//!
//! There is deliberately no retry loop here: a failed or malformed reply
//! fails the invocation, and re-delivery is the trigger's business.

use crate::config::{PipelineConfig, MODEL_TEMPERATURE};
use crate::error::GeoRefError;
use crate::pipeline::encode::encode_for_model;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Fallback model when the configuration names none.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Everything sent to the model for one map.
#[derive(Clone)]
pub struct ModelRequest {
    /// Base64 PNG attachment.
    pub image: ImageData,
    pub instruction: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl std::fmt::Debug for ModelRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRequest")
            .field("image", &format_args!("<{} bytes base64>", self.image.data.len()))
            .field("instruction", &format_args!("<{} chars>", self.instruction.len()))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ModelRequest {
    /// Build the request for a compressed PNG under `config`.
    pub fn for_png(png: &[u8], config: &PipelineConfig) -> Self {
        Self {
            image: encode_for_model(png),
            instruction: config
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTRACTION_PROMPT.to_string()),
            max_tokens: config.max_tokens,
            temperature: MODEL_TEMPERATURE,
        }
    }
}

/// A multimodal model that answers one image + instruction with text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Identifier used in logs and error messages.
    fn model_id(&self) -> &str;

    async fn invoke(&self, request: &ModelRequest) -> Result<String, GeoRefError>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Resolve the provider from the configuration, most specific first.
    ///
    /// 1. **Named provider** (`config.provider_name`) with `config.model`
    ///    or [`DEFAULT_MODEL`]; the factory reads that provider's API key.
    /// 2. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
    /// 3. **Auto-detection** (`ProviderFactory::from_env`).
    pub fn from_config(config: &PipelineConfig) -> Result<Self, GeoRefError> {
        let model = config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        if let Some(region) = &config.model_region {
            debug!("Model region {} (informational, not sent to the provider)", region);
        }

        if let Some(name) = &config.provider_name {
            return Ok(Self::new(create_provider(name, &model)?, model));
        }

        if let (Ok(prov), Ok(env_model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !env_model.is_empty() {
                return Ok(Self::new(create_provider(&prov, &env_model)?, env_model));
            }
        }

        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| GeoRefError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No model provider could be auto-detected from environment.\n\
                    Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                    Error: {}",
                    e
                ),
            })?;
        Ok(Self::new(provider, model))
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, GeoRefError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        GeoRefError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    /// One user turn: the image attachment followed by the instruction.
    async fn invoke(&self, request: &ModelRequest) -> Result<String, GeoRefError> {
        let messages = vec![ChatMessage::user_with_images(
            request.instruction.as_str(),
            vec![request.image.clone()],
        )];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| GeoRefError::ModelInvocation {
                model: self.model.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.model, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content.trim().to_string())
    }
}
