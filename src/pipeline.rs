//! Pipeline de extracción de temas de una empresa.
//!
//! Flujo:
//!   1. Cargar los temas existentes y el registro `processed_files.json`.
//!   2. Descubrir PDFs y después JSON en `input_dir`.
//!   3. Saltar los ficheros cuyo hash coincide con el registro.
//!   4. Extraer, trocear y pedir temas chunk a chunk.
//!   5. Fusionar, guardar temas y registro, y generar el markdown.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    app_state::{report, Status},
    chunk::TextChunker,
    config::RunConfig,
    error::PipelineError,
    extract::extract_text,
    ingest::discover_documents,
    llm::CompletionProvider,
    theme_store::{write_markdown, ThemeStore},
    themes::{merge_themes, source_label, ThemeExtractor},
    tokenizer::Tokenizer,
};

/// Registro `ruta → hash` de los ficheros ya procesados.
pub type ProcessedFiles = BTreeMap<String, String>;

pub fn load_processed_files(path: &Path) -> ProcessedFiles {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return ProcessedFiles::new(),
        Err(e) => {
            warn!("No se pudo leer {}: {e}", path.display());
            return ProcessedFiles::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        let err = PipelineError::CacheCorruption {
            artifact: path.display().to_string(),
            reason: e.to_string(),
        };
        warn!(kind = err.kind(), "{err}");
        ProcessedFiles::new()
    })
}

pub fn save_processed_files(path: &Path, processed: &ProcessedFiles) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(processed)?)
        .with_context(|| format!("Error guardando {}", path.display()))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files_scanned: u32,
    pub files_processed: u32,
    pub files_unchanged: u32,
    pub files_failed: u32,
    pub chunks_analyzed: usize,
    pub candidates_found: usize,
    pub themes_total: usize,
}

impl std::fmt::Display for ExtractionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} procesados, {} sin cambios, {} con error. {} chunks analizados, {} temas candidatos, {} temas en total.",
            self.files_scanned,
            self.files_processed,
            self.files_unchanged,
            self.files_failed,
            self.chunks_analyzed,
            self.candidates_found,
            self.themes_total
        )
    }
}

pub struct ThemePipeline {
    run: RunConfig,
    chunker: TextChunker,
    extractor: ThemeExtractor,
    store: ThemeStore,
    status: Option<Arc<Mutex<Status>>>,
}

impl ThemePipeline {
    pub fn new(
        run: RunConfig,
        tokenizer: Arc<Tokenizer>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let chunker = TextChunker::new(
            tokenizer,
            run.chunking.max_tokens,
            run.chunking.overlap_tokens,
        );
        let extractor = ThemeExtractor::new(completion, &run.company_id, &run.company_name);
        let store = ThemeStore::new(&run.output_dir);
        Self {
            run,
            chunker,
            extractor,
            store,
            status: None,
        }
    }

    /// Publica el progreso en el estado compartido del servidor.
    pub fn with_status(mut self, status: Arc<Mutex<Status>>) -> Self {
        self.status = Some(status);
        self
    }

    pub async fn run(&self) -> Result<ExtractionSummary> {
        info!("Iniciando extracción de temas para {}", self.run.company_name);

        let existing = self.store.load(&self.run.company_id);
        let processed_path = self.run.processed_files_path();
        let processed = load_processed_files(&processed_path);
        let mut updated = processed.clone();

        let documents = discover_documents(&self.run.input_dir)?;
        let total_files = documents.len().max(1) as f32;
        let mut summary = ExtractionSummary::default();
        let mut new_themes = Vec::new();

        for (index, doc) in documents.iter().enumerate() {
            summary.files_scanned += 1;
            let key = doc.key();
            let file_name = doc.file_name();
            let progress = (index + 1) as f32 / total_files;

            if processed.get(&key) == Some(&doc.content_hash) {
                info!("Saltando fichero sin cambios: {}", doc.path.display());
                summary.files_unchanged += 1;
                report(
                    self.status.as_ref(),
                    format!("[{}/{}] Sin cambios: {}", index + 1, documents.len(), file_name),
                    progress,
                );
                continue;
            }

            report(
                self.status.as_ref(),
                format!("[{}/{}] Procesando: {}...", index + 1, documents.len(), file_name),
                progress,
            );

            let text = match extract_text(&doc.path, doc.kind) {
                Ok(text) => text,
                Err(e) => {
                    let err = PipelineError::Extraction {
                        path: doc.path.display().to_string(),
                        reason: e.to_string(),
                    };
                    warn!(kind = err.kind(), "{err}");
                    summary.files_failed += 1;
                    continue;
                }
            };

            let chunks = self.chunker.chunk(&text);
            let total_chunks = chunks.len();
            for (i, chunk) in chunks.iter().enumerate() {
                let label = source_label(&file_name, i, total_chunks);
                let themes = self.extractor.extract(chunk, &label).await;
                summary.candidates_found += themes.len();
                new_themes.extend(themes);
            }

            summary.chunks_analyzed += total_chunks;
            summary.files_processed += 1;
            updated.insert(key, doc.content_hash.clone());
        }

        let merged = merge_themes(&existing, &new_themes);
        summary.themes_total = merged.len();

        self.store.save(&self.run.company_id, &merged)?;
        save_processed_files(&processed_path, &updated)?;
        write_markdown(&self.run.themes_markdown_file(), &self.run.company_id, &merged)?;

        info!("Extracción de temas completada. {summary}");
        Ok(summary)
    }
}
