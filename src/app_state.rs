use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{config::AppConfig, llm::LlmManager, qa::ThemeQa, tokenizer::Tokenizer};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: Arc<LlmManager>,
    pub tokenizer: Arc<Tokenizer>,
    pub status: Arc<Mutex<Status>>,
    /// Motor de preguntas de la empresa activa (uno solo a la vez).
    pub qa_engine: Arc<tokio::sync::Mutex<Option<ThemeQa>>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl Status {
    pub fn idle(message: &str) -> Self {
        Self {
            is_busy: false,
            message: message.to_string(),
            progress: 0.0,
        }
    }
}

/// Actualiza el estado compartido si hay alguien escuchando.
pub fn report(status: Option<&Arc<Mutex<Status>>>, message: String, progress: f32) {
    if let Some(status) = status {
        if let Ok(mut s) = status.lock() {
            s.message = message;
            s.progress = progress.clamp(0.0, 1.0);
        }
    }
}
