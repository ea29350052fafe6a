//! Proveedores falsos y fixtures compartidos por los tests de integración.
#![allow(dead_code)]

use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use filings_themes::{
    config::RunConfig,
    llm::{CompletionProvider, EmbeddingProvider, ResponseFormat},
    tokenizer::Tokenizer,
};
use tempfile::TempDir;

pub const DIM: usize = 8;

/// Embeddings deterministas: bolsa de palabras repartida en `DIM` cubos.
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAIL_EMBED") {
            return Err(anyhow!("proveedor caído"));
        }
        let mut v = vec![0.0f32; DIM];
        for word in text.split_whitespace() {
            let bucket = word.bytes().map(usize::from).sum::<usize>() % DIM;
            v[bucket] += 1.0;
        }
        Ok(v)
    }
}

/// Completado con respuesta fija (o fallo) que guarda los prompts recibidos.
pub struct FakeCompletion {
    response: Result<String, String>,
    pub prompts: Mutex<Vec<(String, ResponseFormat)>>,
}

impl FakeCompletion {
    pub fn answering(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().map(|(p, _)| p.clone())
    }
}

#[async_trait]
impl CompletionProvider for FakeCompletion {
    async fn complete(&self, _system: &str, prompt: &str, format: ResponseFormat) -> Result<String> {
        self.prompts.lock().unwrap().push((prompt.to_string(), format));
        self.response.clone().map_err(|e| anyhow!(e))
    }
}

pub fn tokenizer() -> Arc<Tokenizer> {
    Arc::new(Tokenizer::cl100k().unwrap())
}

/// Directorio temporal con `input/` y `output/` y su `RunConfig` para Netflix.
pub fn workspace() -> (TempDir, RunConfig) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    let run = RunConfig::new("netflix", input, dir.path().join("output"), None);
    (dir, run)
}

/// Escribe un JSON de la SEC con una lista de filings `(form, fecha, descripción)`.
pub fn write_filings(path: &Path, filings: &[(&str, &str, &str)]) {
    let recent: Vec<serde_json::Value> = filings
        .iter()
        .map(|(form, date, description)| {
            serde_json::json!({"form": form, "filingDate": date, "description": description})
        })
        .collect();
    let body = serde_json::json!({"cik": "0001065280", "filings": {"recent": recent}});
    fs::write(path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
}
