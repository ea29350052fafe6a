//! Extracción de temas por chunk y fusión con la lista persistida.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    error::PipelineError,
    llm::{CompletionProvider, ResponseFormat},
    models::{Theme, DEFAULT_CATEGORY},
    prompts,
};

/// `"<fichero> (part i/n)"` con `i` desde 1.
pub fn source_label(file_name: &str, chunk_index: usize, total_chunks: usize) -> String {
    format!("{} (part {}/{})", file_name, chunk_index + 1, total_chunks)
}

/// Candidato tal como lo devuelve el modelo.
#[derive(Debug, Deserialize)]
struct CandidateTheme {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    evidence: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Quita las vallas ```json ... ``` que a veces envuelven la respuesta.
fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Acepta `{"themes": [...]}` o directamente `[...]`.
fn parse_candidates(response: &str) -> Result<Vec<CandidateTheme>, serde_json::Error> {
    let value: Value = serde_json::from_str(strip_code_fences(response))?;
    let list = match value {
        Value::Object(mut obj) => obj.remove("themes").unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    serde_json::from_value(list)
}

/// Motor de extracción: una llamada de completado en modo JSON por chunk.
#[derive(Clone)]
pub struct ThemeExtractor {
    completion: Arc<dyn CompletionProvider>,
    company_id: String,
    company_name: String,
}

impl ThemeExtractor {
    pub fn new(completion: Arc<dyn CompletionProvider>, company_id: &str, company_name: &str) -> Self {
        Self {
            completion,
            company_id: company_id.to_string(),
            company_name: company_name.to_string(),
        }
    }

    /// Temas candidatos de un chunk. Cualquier fallo devuelve una lista vacía.
    pub async fn extract(&self, chunk_text: &str, source: &str) -> Vec<Theme> {
        info!("Extrayendo temas de: {source}");
        let prompt = prompts::theme_extraction(&self.company_name, source, chunk_text);

        let response = match self
            .completion
            .complete(prompts::SYSTEM_PROMPT, &prompt, ResponseFormat::JsonObject)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let err = PipelineError::Completion {
                    context: source.to_string(),
                    reason: format!("{e:#}"),
                };
                warn!(kind = err.kind(), "{err}");
                return Vec::new();
            }
        };

        let candidates = match parse_candidates(&response) {
            Ok(c) => c,
            Err(e) => {
                let err = PipelineError::Completion {
                    context: source.to_string(),
                    reason: format!("respuesta JSON inválida: {e}"),
                };
                warn!(kind = err.kind(), "{err}. Respuesta LLM: '{response}'");
                return Vec::new();
            }
        };

        candidates
            .into_iter()
            .filter(|c| !c.name.trim().is_empty())
            .map(|c| Theme {
                name: c.name.trim().to_string(),
                description: c.description,
                category: c.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                company_id: self.company_id.clone(),
                evidence: c.evidence,
                source: Some(source.to_string()),
            })
            .collect()
    }
}

/// Dos temas son el mismo si sus nombres coinciden sin distinguir mayúsculas.
pub fn are_similar(a: &Theme, b: &Theme) -> bool {
    a.name.to_lowercase() == b.name.to_lowercase()
}

/// Fusiona los temas nuevos con los existentes.
///
/// Orden del resultado: temas manuales, temas con fuente existentes que no
/// se repiten en `new_themes`, y los nuevos que no se repiten en lo ya fusionado.
pub fn merge_themes(existing: &[Theme], new_themes: &[Theme]) -> Vec<Theme> {
    let mut merged: Vec<Theme> = existing.iter().filter(|t| t.is_manual()).cloned().collect();

    for theme in existing.iter().filter(|t| !t.is_manual()) {
        if !new_themes.iter().any(|n| are_similar(theme, n)) {
            merged.push(theme.clone());
        }
    }

    for candidate in new_themes {
        if !merged.iter().any(|t| are_similar(t, candidate)) {
            merged.push(candidate.clone());
        }
    }

    merged
}
