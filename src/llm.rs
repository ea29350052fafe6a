//! Proveedores de embeddings y de completado.
//!
//! El núcleo sólo ve los traits `EmbeddingProvider` y `CompletionProvider`;
//! `LlmManager` los implementa sobre Rig (OpenAI). Los tests sustituyen
//! ambos por fakes deterministas.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use serde_json::json;
use tracing::debug;

use crate::config::{AppConfig, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};

/// Texto → vector de dimensión fija.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Un vector vacío o un error se tratan aguas arriba como fallo blando.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Formato de respuesta pedido al modelo de chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Prompt estructurado → texto generado.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str, format: ResponseFormat) -> Result<String>;
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub embedding_model: String,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        if cfg.openai_api_key.is_none() {
            return Err(anyhow!(
                "Falta la API key de OpenAI: usa --api-key o la variable OPENAI_API_KEY"
            ));
        }
        Ok(Self {
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    fn embedding_model_name(&self) -> &str {
        if self.embedding_model.is_empty() {
            DEFAULT_EMBEDDING_MODEL
        } else {
            self.embedding_model.as_str()
        }
    }

    fn chat_model_name(&self) -> &str {
        if self.chat_model.is_empty() {
            DEFAULT_CHAT_MODEL
        } else {
            self.chat_model.as_str()
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LlmManager {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use rig::providers::openai;
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = openai::Client::from_env();
        let embedding_model = client.embedding_model(self.embedding_model_name());

        let embeddings = embedding_model.embed_texts(vec![text.to_string()]).await?;
        let vector = embeddings
            .into_iter()
            .next()
            .map(|e| e.vec.into_iter().map(|v| v as f32).collect::<Vec<f32>>())
            .ok_or_else(|| anyhow!("El proveedor no devolvió ningún embedding"))?;

        debug!("Embedding de {} dimensiones generado.", vector.len());
        Ok(vector)
    }
}

#[async_trait]
impl CompletionProvider for LlmManager {
    async fn complete(&self, system: &str, prompt: &str, format: ResponseFormat) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();
        let builder = client.agent(self.chat_model_name()).preamble(system);
        let agent = match format {
            ResponseFormat::Text => builder.build(),
            ResponseFormat::JsonObject => builder
                .additional_params(json!({ "response_format": { "type": "json_object" } }))
                .build(),
        };

        let answer = agent.prompt(prompt).await?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(key: Option<&str>) -> AppConfig {
        AppConfig {
            openai_api_key: key.map(str::to_string),
            llm_chat_model: String::new(),
            llm_embedding_model: "text-embedding-3-small".into(),
            embedding_dimensions: 1536,
            data_dir: PathBuf::from("data"),
            server_addr: "127.0.0.1:0".into(),
        }
    }

    #[test]
    fn manager_requires_api_key() {
        assert!(LlmManager::from_config(&config(None)).is_err());
    }

    #[test]
    fn empty_model_names_fall_back_to_defaults() {
        let mgr = LlmManager::from_config(&config(Some("sk-test"))).unwrap();
        assert_eq!(mgr.chat_model_name(), DEFAULT_CHAT_MODEL);
        assert_eq!(mgr.embedding_model_name(), "text-embedding-3-small");
    }
}
